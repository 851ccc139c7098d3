use serde::Serialize;
use serde_json::json;
use std::sync::RwLock;
use std::time::Duration;
use tauri::{AppHandle, Emitter};

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum HapticKind {
    Impact,
    Success,
    Error,
}

/// Bridge to the optional mini-app host embedding the webview. Every call
/// is an emitted event the frontend forwards to the host when one is
/// present; with no listener the events vanish, which is the supported
/// plain-browser mode.
pub struct HostBridge {
    app: AppHandle,
    /// Host-provided user/chat context, attached to delivery payloads.
    context: RwLock<Option<serde_json::Value>>,
}

impl HostBridge {
    pub fn new(app: AppHandle) -> Self {
        Self {
            app,
            context: RwLock::new(None),
        }
    }

    pub fn set_context(&self, context: Option<serde_json::Value>) {
        *self.context.write().unwrap() = context;
    }

    pub fn context(&self) -> Option<serde_json::Value> {
        self.context.read().unwrap().clone()
    }

    pub fn expand(&self) {
        let _ = self.app.emit("host-expand", ());
    }

    pub fn show_main_button(&self, label: &str) {
        let _ = self.app.emit(
            "host-main-button",
            json!({ "visible": true, "label": label }),
        );
    }

    pub fn hide_main_button(&self) {
        let _ = self.app.emit("host-main-button", json!({ "visible": false }));
    }

    pub fn haptic(&self, kind: HapticKind) {
        let _ = self.app.emit("host-haptic", json!({ "kind": kind }));
    }

    /// Asks the host to close the app after `delay`, giving the frontend
    /// time to show the final message first.
    pub fn request_close(&self, delay: Duration) {
        let app = self.app.clone();
        tauri::async_runtime::spawn(async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            let _ = app.emit("host-close", ());
        });
    }
}
