use std::sync::Arc;

use log::{error, info};
use serde_json::json;
use tokio::sync::Mutex;

use crate::audio::ChimeHandle;
use crate::history::HistoryStore;

use super::state::ScanState;
use super::{emit_json, EventSink};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ScanMode {
    /// Every hit goes to history and scanning continues.
    Continuous,
    /// A hit parks the text for explicit confirmation and ends the loop.
    Delivery,
}

/// Receives decoded text from the scan worker and fans it out: display
/// state, chime, history or the pending-payment slot. Runs on the worker
/// thread, so state access uses blocking locks.
pub(crate) struct ResultRouter {
    state: Arc<Mutex<ScanState>>,
    history: Arc<HistoryStore>,
    chime: ChimeHandle,
    events: Arc<dyn EventSink>,
    mode: ScanMode,
    chime_enabled: bool,
}

impl ResultRouter {
    pub(crate) fn new(
        state: Arc<Mutex<ScanState>>,
        history: Arc<HistoryStore>,
        chime: ChimeHandle,
        events: Arc<dyn EventSink>,
        mode: ScanMode,
        chime_enabled: bool,
    ) -> Self {
        Self {
            state,
            history,
            chime,
            events,
            mode,
            chime_enabled,
        }
    }

    /// Returns whether the scan loop should keep running.
    pub(crate) fn on_result(&self, text: &str) -> bool {
        info!("qr code recognized ({} bytes)", text.len());

        if self.chime_enabled {
            self.chime.play();
        }

        let keep_scanning = self.mode == ScanMode::Continuous;
        let snapshot = {
            let mut state = self.state.blocking_lock();
            state.last_result = Some(text.to_string());
            if !keep_scanning {
                state.pending_payment = Some(text.to_string());
                // The loop ends with this hit; settle the session now so
                // the confirmation step opens over an idle scanner.
                state.settle_idle();
            }
            state.clone()
        };

        self.events.emit("scan-result", json!({ "text": text }));
        emit_json(self.events.as_ref(), "scan-state-changed", &snapshot);

        match self.mode {
            ScanMode::Continuous => {
                if let Err(err) = self.history.append(text) {
                    error!("failed to persist history entry: {err:#}");
                }
            }
            ScanMode::Delivery => {
                self.events.emit("payment-pending", json!({ "text": text }));
                self.events.emit("host-haptic", json!({ "kind": "impact" }));
            }
        }

        keep_scanning
    }
}
