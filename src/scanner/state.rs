use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum ScanStatus {
    Idle,
    Starting,
    Scanning,
    Switching,
}

impl Default for ScanStatus {
    fn default() -> Self {
        ScanStatus::Idle
    }
}

/// One continuous camera-scanning activity, from start to stop. The live
/// stream itself lives on the worker thread; this is the bookkeeping half.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanSession {
    pub id: String,
    pub device_id: String,
    pub started_at: DateTime<Utc>,
}

/// Snapshot handed to the frontend on every transition.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanState {
    pub status: ScanStatus,
    pub session: Option<ScanSession>,
    pub selected_device_id: Option<String>,
    pub last_result: Option<String>,
    /// Decoded text awaiting explicit confirmation in delivery mode.
    /// Cleared on successful delivery or user cancel, never on failure.
    pub pending_payment: Option<String>,
}

impl ScanState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_active(&self) -> bool {
        self.status != ScanStatus::Idle
    }

    pub fn begin_start(&mut self, device_id: String) {
        self.status = ScanStatus::Starting;
        self.selected_device_id = Some(device_id);
        self.session = None;
    }

    pub fn begin_session(&mut self, session: ScanSession) {
        self.status = ScanStatus::Scanning;
        self.session = Some(session);
    }

    pub fn begin_switch(&mut self, device_id: String) {
        self.status = ScanStatus::Switching;
        self.selected_device_id = Some(device_id);
    }

    /// Back to Idle. Selection, last result and any pending payment
    /// survive so the user can restart or retry.
    pub fn settle_idle(&mut self) {
        self.status = ScanStatus::Idle;
        self.session = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(device: &str) -> ScanSession {
        ScanSession {
            id: "s-1".into(),
            device_id: device.into(),
            started_at: Utc::now(),
        }
    }

    #[test]
    fn full_cycle_idle_starting_scanning_idle() {
        let mut state = ScanState::new();
        assert_eq!(state.status, ScanStatus::Idle);
        assert!(!state.is_active());

        state.begin_start("cam-0".into());
        assert_eq!(state.status, ScanStatus::Starting);
        assert!(state.is_active());

        state.begin_session(session("cam-0"));
        assert_eq!(state.status, ScanStatus::Scanning);
        assert!(state.session.is_some());

        state.settle_idle();
        assert_eq!(state.status, ScanStatus::Idle);
        assert!(state.session.is_none());
    }

    #[test]
    fn settle_idle_preserves_selection_result_and_pending() {
        let mut state = ScanState::new();
        state.begin_start("cam-1".into());
        state.begin_session(session("cam-1"));
        state.last_result = Some("hello".into());
        state.pending_payment = Some("hello".into());

        state.settle_idle();
        assert_eq!(state.selected_device_id.as_deref(), Some("cam-1"));
        assert_eq!(state.last_result.as_deref(), Some("hello"));
        assert_eq!(state.pending_payment.as_deref(), Some("hello"));
    }

    #[test]
    fn switch_keeps_the_session_until_the_restart() {
        let mut state = ScanState::new();
        state.begin_start("cam-0".into());
        state.begin_session(session("cam-0"));

        state.begin_switch("cam-1".into());
        assert_eq!(state.status, ScanStatus::Switching);
        assert_eq!(state.selected_device_id.as_deref(), Some("cam-1"));
        assert!(state.is_active());
    }
}
