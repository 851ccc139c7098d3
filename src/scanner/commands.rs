use chrono::Utc;
use serde::Serialize;
use serde_json::json;
use std::time::Duration;
use tauri::{AppHandle, Emitter, State};

use crate::camera::DeviceInfo;
use crate::delivery::DeliveryPayload;
use crate::host::HapticKind;
use crate::AppState;

use super::ScanState;

/// How long the final success message stays visible before the host is
/// asked to close.
const CLOSE_AFTER_DELIVERY: Duration = Duration::from_millis(1500);

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CameraList {
    pub devices: Vec<DeviceInfo>,
    pub selected_device_id: Option<String>,
}

#[tauri::command]
pub async fn get_scan_state(state: State<'_, AppState>) -> Result<ScanState, String> {
    Ok(state.scanner.snapshot().await)
}

#[tauri::command]
pub async fn list_cameras(state: State<'_, AppState>) -> Result<CameraList, String> {
    let devices = state
        .scanner
        .refresh_devices()
        .await
        .map_err(|err| err.user_message())?;
    let snapshot = state.scanner.snapshot().await;
    Ok(CameraList {
        devices,
        selected_device_id: snapshot.selected_device_id,
    })
}

#[tauri::command]
pub async fn start_scanning(
    state: State<'_, AppState>,
    device_id: Option<String>,
) -> Result<ScanState, String> {
    let snapshot = state
        .scanner
        .start(device_id)
        .await
        .map_err(|err| err.user_message())?;
    state.host.show_main_button("Close");
    Ok(snapshot)
}

#[tauri::command]
pub async fn stop_scanning(state: State<'_, AppState>) -> Result<ScanState, String> {
    let snapshot = state.scanner.stop().await;
    state.host.hide_main_button();
    Ok(snapshot)
}

#[tauri::command]
pub async fn switch_camera(state: State<'_, AppState>) -> Result<Option<DeviceInfo>, String> {
    state
        .scanner
        .switch_camera()
        .await
        .map_err(|err| err.user_message())
}

#[tauri::command]
pub async fn select_camera(
    state: State<'_, AppState>,
    device_id: String,
) -> Result<ScanState, String> {
    state
        .scanner
        .select_device(device_id)
        .await
        .map_err(|err| err.user_message())
}

/// Sends the pending decoded text to the webhook. The pending text is
/// cleared only when the server accepted it; any failure keeps it parked
/// so the user can retry.
#[tauri::command]
pub async fn confirm_payment(
    state: State<'_, AppState>,
    app_handle: AppHandle,
) -> Result<String, String> {
    let pending = state
        .scanner
        .pending_payment()
        .await
        .ok_or_else(|| "Nothing scanned to deliver.".to_string())?;

    let settings = state.settings.scanner();
    let payload = DeliveryPayload::new(pending, state.host.context());

    match state.delivery.send(&settings.webhook_url, &payload).await {
        Ok(body) => {
            state.scanner.clear_pending().await;
            state.host.haptic(HapticKind::Success);
            let _ = app_handle.emit("payment-result", json!({ "ok": true }));
            state.host.request_close(CLOSE_AFTER_DELIVERY);
            Ok(body)
        }
        Err(err) => {
            state.host.haptic(HapticKind::Error);
            let message = err.user_message();
            let _ = app_handle.emit("payment-result", json!({ "ok": false, "message": message }));
            Err(message)
        }
    }
}

#[tauri::command]
pub async fn cancel_payment(state: State<'_, AppState>) -> Result<(), String> {
    state.scanner.cancel_pending().await;
    Ok(())
}

/// Posts a throwaway payload so the webhook wiring can be verified without
/// scanning anything.
#[tauri::command]
pub async fn test_webhook(state: State<'_, AppState>) -> Result<String, String> {
    let settings = state.settings.scanner();
    let payload = DeliveryPayload::new(
        format!("TEST_QR_DATA_{}", Utc::now().timestamp_millis()),
        state.host.context(),
    );

    state
        .delivery
        .send(&settings.webhook_url, &payload)
        .await
        .map_err(|err| err.user_message())
}

#[tauri::command]
pub async fn check_webhook(state: State<'_, AppState>) -> Result<Option<u16>, String> {
    let settings = state.settings.scanner();
    Ok(state.delivery.check_availability(&settings.webhook_url).await)
}
