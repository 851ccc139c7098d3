mod audio;
mod camera;
mod decode;
mod delivery;
mod history;
mod host;
mod scanner;
mod settings;

use std::sync::Arc;
use std::time::Duration;

use audio::ChimeHandle;
use camera::backend::NokhwaBackend;
use decode::RqrrDecoder;
use delivery::DeliveryClient;
use history::{HistoryEntry, HistoryStore};
use host::HostBridge;
use log::warn;
use scanner::commands::{
    cancel_payment, check_webhook, confirm_payment, get_scan_state, list_cameras, select_camera,
    start_scanning, stop_scanning, switch_camera, test_webhook,
};
use scanner::{ScanController, TauriEventSink};
use settings::{ScannerSettings, SettingsStore};
use tauri::{Emitter, Manager, State};

pub(crate) struct AppState {
    pub(crate) scanner: ScanController,
    pub(crate) delivery: DeliveryClient,
    pub(crate) history: Arc<HistoryStore>,
    pub(crate) settings: Arc<SettingsStore>,
    pub(crate) host: HostBridge,
}

#[tauri::command]
fn get_scan_history(state: State<AppState>) -> Result<Vec<HistoryEntry>, String> {
    Ok(state.history.entries())
}

#[tauri::command]
fn clear_scan_history(state: State<AppState>) -> Result<(), String> {
    state.history.clear().map_err(|e| e.to_string())
}

#[tauri::command]
fn get_settings(state: State<AppState>) -> Result<ScannerSettings, String> {
    Ok(state.settings.scanner())
}

#[tauri::command]
fn update_settings(
    settings: ScannerSettings,
    state: State<AppState>,
    app_handle: tauri::AppHandle,
) -> Result<(), String> {
    state
        .settings
        .update(settings.clone())
        .map_err(|e| e.to_string())?;

    app_handle
        .emit("settings-updated", &settings)
        .map_err(|e| e.to_string())?;

    Ok(())
}

/// Stores the host-provided user/chat context the frontend extracted from
/// the embedding mini-app; attached to delivery payloads from then on.
#[tauri::command]
fn set_host_context(
    context: Option<serde_json::Value>,
    state: State<AppState>,
) -> Result<(), String> {
    state.host.set_context(context);
    Ok(())
}

#[tauri::command]
async fn close_app(state: State<'_, AppState>) -> Result<(), String> {
    state.scanner.stop().await;
    state.host.request_close(Duration::ZERO);
    Ok(())
}

#[cfg_attr(mobile, tauri::mobile_entry_point)]
pub fn run() {
    // Initialize logging (reads RUST_LOG env var)
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();

    log::info!("QRLens starting up...");

    tauri::Builder::default()
        .plugin(tauri_plugin_opener::init())
        .setup(|app| {
            let result = (|| -> anyhow::Result<()> {
                let app_data_dir = app
                    .path()
                    .app_data_dir()
                    .map_err(|err| anyhow::anyhow!(err))?;
                std::fs::create_dir_all(&app_data_dir)?;

                let history = Arc::new(HistoryStore::new(app_data_dir.join("history.json"))?);
                let settings = Arc::new(SettingsStore::new(app_data_dir.join("settings.json"))?);

                let scanner = ScanController::new(
                    Arc::new(NokhwaBackend::new()),
                    Arc::new(RqrrDecoder::new()),
                    Arc::new(TauriEventSink::new(app.handle().clone())),
                    history.clone(),
                    ChimeHandle::new(),
                    settings.clone(),
                );

                let host = HostBridge::new(app.handle().clone());
                host.expand();

                let startup_settings = settings.scanner();
                let delivery = DeliveryClient::new();

                app.manage(AppState {
                    scanner: scanner.clone(),
                    delivery: delivery.clone(),
                    history,
                    settings,
                    host,
                });

                // Early diagnostic only; an unreachable webhook never
                // blocks the scanner.
                if startup_settings.delivery_mode && !startup_settings.webhook_url.trim().is_empty()
                {
                    let url = startup_settings.webhook_url.clone();
                    tauri::async_runtime::spawn(async move {
                        delivery.check_availability(&url).await;
                    });
                }

                // Mirrors the embedded-host flow where the camera comes up
                // by itself shortly after launch.
                if startup_settings.auto_start {
                    tauri::async_runtime::spawn(async move {
                        tokio::time::sleep(Duration::from_millis(500)).await;
                        if let Err(err) = scanner.refresh_devices().await {
                            warn!("auto-start enumeration failed: {err}");
                            return;
                        }
                        if let Err(err) = scanner.start(None).await {
                            warn!("auto-start failed: {err}");
                        }
                    });
                }

                Ok(())
            })();

            result.map_err(|err| err.into())
        })
        .invoke_handler(tauri::generate_handler![
            get_scan_state,
            list_cameras,
            start_scanning,
            stop_scanning,
            switch_camera,
            select_camera,
            confirm_payment,
            cancel_payment,
            test_webhook,
            check_webhook,
            get_scan_history,
            clear_scan_history,
            get_settings,
            update_settings,
            set_host_context,
            close_app,
        ])
        .run(tauri::generate_context!())
        .expect("error while running tauri application");
}
