pub mod commands;
mod controller;
mod loop_worker;
mod router;
mod state;

pub use controller::ScanController;
pub use state::{ScanSession, ScanState, ScanStatus};

use serde::Serialize;
use tauri::{AppHandle, Emitter};

/// Where scanner events go. The production sink forwards them to the
/// webview; tests substitute a recording sink.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: &str, payload: serde_json::Value);
}

pub struct TauriEventSink {
    app: AppHandle,
}

impl TauriEventSink {
    pub fn new(app: AppHandle) -> Self {
        Self { app }
    }
}

impl EventSink for TauriEventSink {
    fn emit(&self, event: &str, payload: serde_json::Value) {
        let _ = self.app.emit(event, payload);
    }
}

pub(crate) fn emit_json<T: Serialize>(events: &dyn EventSink, event: &str, payload: &T) {
    match serde_json::to_value(payload) {
        Ok(value) => events.emit(event, value),
        Err(err) => log::error!("failed to serialize {event} payload: {err}"),
    }
}
