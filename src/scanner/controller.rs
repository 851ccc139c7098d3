use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use log::{error, info, warn};
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::audio::ChimeHandle;
use crate::camera::backend::CameraBackend;
use crate::camera::{negotiator, picker, CameraError, DeviceInfo};
use crate::decode::FrameDecoder;
use crate::history::HistoryStore;
use crate::settings::SettingsStore;

use super::loop_worker::scan_loop;
use super::router::{ResultRouter, ScanMode};
use super::state::{ScanSession, ScanState};
use super::{emit_json, EventSink};

/// Pause between releasing one stream and acquiring the next; two live
/// camera streams at once is undefined behavior on many hosts.
const SETTLE_DELAY: Duration = Duration::from_millis(100);

/// Delay before scanning resumes after a cancelled confirmation.
const CANCEL_RESTART_DELAY: Duration = Duration::from_millis(500);

/// Owns the scanning lifecycle: start, the decode loop, stop, and camera
/// switching. At most one session is live at a time; a new start is always
/// preceded by a full stop of the prior one, enforced here and not by
/// callers.
#[derive(Clone)]
pub struct ScanController {
    state: Arc<Mutex<ScanState>>,
    devices: Arc<Mutex<Vec<DeviceInfo>>>,
    worker: Arc<Mutex<Option<JoinHandle<()>>>>,
    cancel: Arc<Mutex<Option<CancellationToken>>>,
    backend: Arc<dyn CameraBackend>,
    decoder: Arc<dyn FrameDecoder>,
    events: Arc<dyn EventSink>,
    history: Arc<HistoryStore>,
    chime: ChimeHandle,
    settings: Arc<SettingsStore>,
}

impl ScanController {
    pub fn new(
        backend: Arc<dyn CameraBackend>,
        decoder: Arc<dyn FrameDecoder>,
        events: Arc<dyn EventSink>,
        history: Arc<HistoryStore>,
        chime: ChimeHandle,
        settings: Arc<SettingsStore>,
    ) -> Self {
        Self {
            state: Arc::new(Mutex::new(ScanState::new())),
            devices: Arc::new(Mutex::new(Vec::new())),
            worker: Arc::new(Mutex::new(None)),
            cancel: Arc::new(Mutex::new(None)),
            backend,
            decoder,
            events,
            history,
            chime,
            settings,
        }
    }

    pub async fn snapshot(&self) -> ScanState {
        self.state.lock().await.clone()
    }

    /// Re-enumerates cameras and establishes a default selection when the
    /// current one is missing or absent. Descriptors are transient; only
    /// the selected id is kept across refreshes.
    pub async fn refresh_devices(&self) -> Result<Vec<DeviceInfo>, CameraError> {
        let backend = self.backend.clone();
        let devices = tokio::task::spawn_blocking(move || backend.list_devices())
            .await
            .map_err(|err| CameraError::Backend(err.to_string()))??;

        *self.devices.lock().await = devices.clone();

        let prefer_rear = self.settings.scanner().prefer_rear_camera;
        let snapshot = {
            let mut state = self.state.lock().await;
            let selection_valid = state
                .selected_device_id
                .as_ref()
                .is_some_and(|id| devices.iter().any(|device| &device.id == id));
            if !selection_valid {
                state.selected_device_id =
                    picker::pick_default(&devices, prefer_rear).map(|device| device.id.clone());
            }
            state.clone()
        };
        emit_json(self.events.as_ref(), "scan-state-changed", &snapshot);

        Ok(devices)
    }

    pub async fn start(&self, device: Option<String>) -> Result<ScanState, CameraError> {
        let requested = device.filter(|id| !id.trim().is_empty());
        let device_id = {
            let state = self.state.lock().await;
            match requested.or_else(|| state.selected_device_id.clone()) {
                Some(id) => id,
                None => {
                    drop(state);
                    self.emit_message(&CameraError::NoDeviceSelected.user_message());
                    return Err(CameraError::NoDeviceSelected);
                }
            }
        };

        // Full stop of any prior session before a new acquisition.
        self.stop_worker().await;

        let snapshot = {
            let mut state = self.state.lock().await;
            state.begin_start(device_id.clone());
            state.clone()
        };
        emit_json(self.events.as_ref(), "scan-state-changed", &snapshot);

        let settings = self.settings.scanner();

        // Acquire-then-release probe so the permission prompt happens
        // before the worker takes ownership of the device.
        let granted = {
            let backend = self.backend.clone();
            let id = device_id.clone();
            let prefer_rear = settings.prefer_rear_camera;
            let probe = tokio::task::spawn_blocking(move || {
                negotiator::acquire_probe(backend.as_ref(), &id, prefer_rear)
            })
            .await;
            match probe {
                Ok(Ok(granted)) => granted,
                Ok(Err(err)) => return self.fail_start(err).await,
                Err(join_err) => {
                    return self
                        .fail_start(CameraError::Backend(join_err.to_string()))
                        .await
                }
            }
        };

        let mode = if settings.delivery_mode && !settings.webhook_url.trim().is_empty() {
            ScanMode::Delivery
        } else {
            ScanMode::Continuous
        };
        let router = Arc::new(ResultRouter::new(
            self.state.clone(),
            self.history.clone(),
            self.chime.clone(),
            self.events.clone(),
            mode,
            settings.chime_enabled,
        ));

        let token = CancellationToken::new();
        let (ready_tx, ready_rx) = oneshot::channel();

        // The worker thread opens the stream itself and owns it for the
        // whole session; nothing else may read or stop it.
        let worker = {
            let backend = self.backend.clone();
            let decoder = self.decoder.clone();
            let id = device_id.clone();
            let loop_token = token.clone();
            tokio::task::spawn_blocking(move || {
                let source = match backend.open(&id, &granted) {
                    Ok(source) => {
                        let _ = ready_tx.send(Ok(()));
                        source
                    }
                    Err(err) => {
                        let _ = ready_tx.send(Err(err));
                        return;
                    }
                };
                scan_loop(source, decoder, router, loop_token);
            })
        };

        match ready_rx.await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                let _ = worker.await;
                return self.fail_start(err).await;
            }
            Err(_) => {
                let _ = worker.await;
                return self
                    .fail_start(CameraError::Backend("scan worker died during startup".into()))
                    .await;
            }
        }

        *self.cancel.lock().await = Some(token);
        *self.worker.lock().await = Some(worker);

        let snapshot = {
            let mut state = self.state.lock().await;
            let session = ScanSession {
                id: Uuid::new_v4().to_string(),
                device_id: device_id.clone(),
                started_at: Utc::now(),
            };
            info!("scan session {} started on device {}", session.id, device_id);
            state.begin_session(session);
            state.clone()
        };
        emit_json(self.events.as_ref(), "scan-state-changed", &snapshot);

        Ok(snapshot)
    }

    async fn fail_start(&self, err: CameraError) -> Result<ScanState, CameraError> {
        warn!("scan start failed: {err}");
        let snapshot = {
            let mut state = self.state.lock().await;
            state.settle_idle();
            state.clone()
        };
        emit_json(self.events.as_ref(), "scan-state-changed", &snapshot);
        self.emit_message(&err.user_message());
        Err(err)
    }

    /// Idempotent; safe to call when already Idle. Returns once the worker
    /// has joined, i.e. the stream is fully released.
    pub async fn stop(&self) -> ScanState {
        self.stop_worker().await;
        let snapshot = {
            let mut state = self.state.lock().await;
            state.settle_idle();
            state.clone()
        };
        emit_json(self.events.as_ref(), "scan-state-changed", &snapshot);
        snapshot
    }

    async fn stop_worker(&self) {
        if let Some(token) = self.cancel.lock().await.take() {
            token.cancel();
        }
        if let Some(handle) = self.worker.lock().await.take() {
            if let Err(err) = handle.await {
                error!("scan worker failed to join: {err}");
            }
        }
    }

    /// Rotates to the next device in enumeration order, wrapping. The
    /// rotation covers real devices only. While scanning this is a
    /// stop → settle → restart, never an overlapping second acquisition.
    pub async fn switch_camera(&self) -> Result<Option<DeviceInfo>, CameraError> {
        let devices = {
            let cached = self.devices.lock().await.clone();
            if cached.is_empty() {
                self.refresh_devices().await?
            } else {
                cached
            }
        };
        if devices.len() <= 1 {
            return Ok(None);
        }

        let (was_active, current) = {
            let state = self.state.lock().await;
            (state.is_active(), state.selected_device_id.clone())
        };

        let current_index = current
            .and_then(|id| devices.iter().position(|device| device.id == id))
            .unwrap_or(0);
        let next = devices[(current_index + 1) % devices.len()].clone();

        if was_active {
            self.restart_on(next.id.clone()).await?;
        } else {
            let snapshot = {
                let mut state = self.state.lock().await;
                state.selected_device_id = Some(next.id.clone());
                state.clone()
            };
            emit_json(self.events.as_ref(), "scan-state-changed", &snapshot);
        }

        Ok(Some(next))
    }

    /// Explicit re-selection from the device list; while scanning it uses
    /// the same stop → settle → restart pattern as switching.
    pub async fn select_device(&self, device_id: String) -> Result<ScanState, CameraError> {
        let was_active = self.state.lock().await.is_active();

        if was_active {
            self.restart_on(device_id).await
        } else {
            let snapshot = {
                let mut state = self.state.lock().await;
                state.selected_device_id = Some(device_id);
                state.clone()
            };
            emit_json(self.events.as_ref(), "scan-state-changed", &snapshot);
            Ok(snapshot)
        }
    }

    async fn restart_on(&self, device_id: String) -> Result<ScanState, CameraError> {
        let snapshot = {
            let mut state = self.state.lock().await;
            state.begin_switch(device_id.clone());
            state.clone()
        };
        emit_json(self.events.as_ref(), "scan-state-changed", &snapshot);

        self.stop_worker().await;
        // Let the released stream settle before the next acquisition.
        tokio::time::sleep(SETTLE_DELAY).await;
        self.start(Some(device_id)).await
    }

    pub async fn pending_payment(&self) -> Option<String> {
        self.state.lock().await.pending_payment.clone()
    }

    /// Success path only; a failed delivery keeps the text available for a
    /// manual retry.
    pub async fn clear_pending(&self) {
        let snapshot = {
            let mut state = self.state.lock().await;
            state.pending_payment = None;
            state.clone()
        };
        emit_json(self.events.as_ref(), "scan-state-changed", &snapshot);
    }

    /// Discards the pending text and resumes scanning after a short delay.
    pub async fn cancel_pending(&self) {
        let snapshot = {
            let mut state = self.state.lock().await;
            state.pending_payment = None;
            state.clone()
        };
        emit_json(self.events.as_ref(), "scan-state-changed", &snapshot);

        let controller = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(CANCEL_RESTART_DELAY).await;
            if let Err(err) = controller.start(None).await {
                warn!("could not resume scanning after cancel: {err}");
            }
        });
    }

    fn emit_message(&self, text: &str) {
        self.events
            .emit("scan-message", serde_json::json!({ "text": text }));
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Mutex as StdMutex;
    use std::time::Duration;

    use tempfile::TempDir;

    use super::*;
    use crate::camera::backend::{FrameSource, LumaFrame};
    use crate::camera::ConstraintSet;
    use crate::scanner::state::ScanStatus;
    use crate::settings::ScannerSettings;

    struct MockBackend {
        devices: Vec<DeviceInfo>,
        deny_open: AtomicBool,
        live: Arc<AtomicUsize>,
        max_live: Arc<AtomicUsize>,
        opens: AtomicUsize,
    }

    impl MockBackend {
        fn with_devices(count: usize) -> Self {
            let devices = (0..count)
                .map(|i| DeviceInfo {
                    id: i.to_string(),
                    label: format!("Mock Camera {i}"),
                })
                .collect();
            Self {
                devices,
                deny_open: AtomicBool::new(false),
                live: Arc::new(AtomicUsize::new(0)),
                max_live: Arc::new(AtomicUsize::new(0)),
                opens: AtomicUsize::new(0),
            }
        }
    }

    struct MockSource {
        live: Arc<AtomicUsize>,
    }

    impl FrameSource for MockSource {
        fn grab(&mut self) -> Result<LumaFrame, CameraError> {
            Ok(LumaFrame {
                width: 16,
                height: 16,
                data: vec![255; 256],
            })
        }
    }

    impl Drop for MockSource {
        fn drop(&mut self) {
            self.live.fetch_sub(1, Ordering::SeqCst);
        }
    }

    impl CameraBackend for MockBackend {
        fn list_devices(&self) -> Result<Vec<DeviceInfo>, CameraError> {
            Ok(self.devices.clone())
        }

        fn open(
            &self,
            _device_id: &str,
            _constraints: &ConstraintSet,
        ) -> Result<Box<dyn FrameSource>, CameraError> {
            self.opens.fetch_add(1, Ordering::SeqCst);
            if self.deny_open.load(Ordering::SeqCst) {
                return Err(CameraError::PermissionDenied);
            }
            let live = self.live.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_live.fetch_max(live, Ordering::SeqCst);
            Ok(Box::new(MockSource {
                live: self.live.clone(),
            }))
        }
    }

    /// Decoder fed from a script; exhausted scripts report misses forever.
    struct ScriptedDecoder {
        script: StdMutex<VecDeque<Option<String>>>,
    }

    impl ScriptedDecoder {
        fn misses_only() -> Self {
            Self {
                script: StdMutex::new(VecDeque::new()),
            }
        }

        fn hits(hits: &[&str]) -> Self {
            Self {
                script: StdMutex::new(hits.iter().map(|h| Some(h.to_string())).collect()),
            }
        }
    }

    impl FrameDecoder for ScriptedDecoder {
        fn decode(
            &self,
            _frame: &LumaFrame,
        ) -> Result<Option<String>, crate::decode::DecodeError> {
            Ok(self.script.lock().unwrap().pop_front().flatten())
        }
    }

    #[derive(Default)]
    struct RecordingSink {
        events: StdMutex<Vec<(String, serde_json::Value)>>,
    }

    impl RecordingSink {
        fn count(&self, name: &str) -> usize {
            self.events
                .lock()
                .unwrap()
                .iter()
                .filter(|(event, _)| event == name)
                .count()
        }
    }

    impl EventSink for RecordingSink {
        fn emit(&self, event: &str, payload: serde_json::Value) {
            self.events
                .lock()
                .unwrap()
                .push((event.to_string(), payload));
        }
    }

    struct Rig {
        controller: ScanController,
        backend: Arc<MockBackend>,
        sink: Arc<RecordingSink>,
        history: Arc<HistoryStore>,
        _dir: TempDir,
    }

    fn rig(backend: MockBackend, decoder: ScriptedDecoder, settings: ScannerSettings) -> Rig {
        let dir = TempDir::new().unwrap();
        let history = Arc::new(HistoryStore::new(dir.path().join("history.json")).unwrap());
        let store = Arc::new(SettingsStore::new(dir.path().join("settings.json")).unwrap());
        store.update(settings).unwrap();

        let backend = Arc::new(backend);
        let sink = Arc::new(RecordingSink::default());
        let controller = ScanController::new(
            backend.clone(),
            Arc::new(decoder),
            sink.clone(),
            history.clone(),
            ChimeHandle::new(),
            store,
        );

        Rig {
            controller,
            backend,
            sink,
            history,
            _dir: dir,
        }
    }

    fn delivery_settings() -> ScannerSettings {
        ScannerSettings {
            delivery_mode: true,
            webhook_url: "http://127.0.0.1:9/webhook".into(),
            chime_enabled: false,
            ..ScannerSettings::default()
        }
    }

    fn quiet_settings() -> ScannerSettings {
        ScannerSettings {
            chime_enabled: false,
            ..ScannerSettings::default()
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn start_without_selection_fails_and_stays_idle() {
        let rig = rig(
            MockBackend::with_devices(1),
            ScriptedDecoder::misses_only(),
            quiet_settings(),
        );

        let err = rig.controller.start(None).await.unwrap_err();
        assert!(matches!(err, CameraError::NoDeviceSelected));

        let state = rig.controller.snapshot().await;
        assert_eq!(state.status, ScanStatus::Idle);
        assert_eq!(rig.backend.opens.load(Ordering::SeqCst), 0);
        assert_eq!(rig.sink.count("scan-message"), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn start_scans_and_stop_releases_the_stream() {
        let rig = rig(
            MockBackend::with_devices(1),
            ScriptedDecoder::misses_only(),
            quiet_settings(),
        );

        rig.controller.refresh_devices().await.unwrap();
        let state = rig.controller.start(None).await.unwrap();
        assert_eq!(state.status, ScanStatus::Scanning);
        assert!(state.session.is_some());

        rig.controller.stop().await;
        let state = rig.controller.snapshot().await;
        assert_eq!(state.status, ScanStatus::Idle);
        assert!(state.session.is_none());
        assert_eq!(rig.backend.live.load(Ordering::SeqCst), 0);
        assert_eq!(rig.backend.max_live.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn stop_twice_is_a_quiet_noop() {
        let rig = rig(
            MockBackend::with_devices(1),
            ScriptedDecoder::misses_only(),
            quiet_settings(),
        );

        rig.controller.refresh_devices().await.unwrap();
        rig.controller.start(Some("0".into())).await.unwrap();
        rig.controller.stop().await;
        let state = rig.controller.stop().await;
        assert_eq!(state.status, ScanStatus::Idle);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn misses_never_stop_the_loop_or_emit_results() {
        let rig = rig(
            MockBackend::with_devices(1),
            ScriptedDecoder::misses_only(),
            quiet_settings(),
        );

        rig.controller.refresh_devices().await.unwrap();
        rig.controller.start(None).await.unwrap();
        tokio::time::sleep(Duration::from_millis(350)).await;

        let state = rig.controller.snapshot().await;
        assert_eq!(state.status, ScanStatus::Scanning);
        assert_eq!(rig.sink.count("scan-result"), 0);

        rig.controller.stop().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn continuous_hit_lands_in_history_and_scanning_goes_on() {
        let rig = rig(
            MockBackend::with_devices(1),
            ScriptedDecoder::hits(&["ticket-42"]),
            quiet_settings(),
        );

        rig.controller.refresh_devices().await.unwrap();
        rig.controller.start(None).await.unwrap();
        tokio::time::sleep(Duration::from_millis(400)).await;

        let state = rig.controller.snapshot().await;
        assert_eq!(state.status, ScanStatus::Scanning);
        assert_eq!(state.last_result.as_deref(), Some("ticket-42"));
        assert_eq!(rig.history.entries()[0].text, "ticket-42");
        assert_eq!(rig.sink.count("scan-result"), 1);

        rig.controller.stop().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn delivery_hit_parks_pending_and_ends_the_session() {
        let rig = rig(
            MockBackend::with_devices(1),
            ScriptedDecoder::hits(&["PAY-777"]),
            delivery_settings(),
        );

        rig.controller.refresh_devices().await.unwrap();
        rig.controller.start(None).await.unwrap();
        tokio::time::sleep(Duration::from_millis(400)).await;

        let state = rig.controller.snapshot().await;
        assert_eq!(state.status, ScanStatus::Idle);
        assert_eq!(state.pending_payment.as_deref(), Some("PAY-777"));
        assert_eq!(rig.sink.count("payment-pending"), 1);
        assert!(rig.history.entries().is_empty());
        assert_eq!(rig.backend.live.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn switching_never_overlaps_two_streams() {
        let rig = rig(
            MockBackend::with_devices(2),
            ScriptedDecoder::misses_only(),
            quiet_settings(),
        );

        rig.controller.refresh_devices().await.unwrap();
        rig.controller.start(None).await.unwrap();

        let next = rig.controller.switch_camera().await.unwrap().unwrap();
        assert_eq!(next.id, "1");

        let state = rig.controller.snapshot().await;
        assert_eq!(state.status, ScanStatus::Scanning);
        assert_eq!(state.selected_device_id.as_deref(), Some("1"));
        assert_eq!(rig.backend.max_live.load(Ordering::SeqCst), 1);

        rig.controller.stop().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn switch_wraps_back_to_the_first_device() {
        let rig = rig(
            MockBackend::with_devices(2),
            ScriptedDecoder::misses_only(),
            quiet_settings(),
        );

        rig.controller.refresh_devices().await.unwrap();
        let next = rig.controller.switch_camera().await.unwrap().unwrap();
        assert_eq!(next.id, "1");
        let next = rig.controller.switch_camera().await.unwrap().unwrap();
        assert_eq!(next.id, "0");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn switch_with_a_single_device_does_nothing() {
        let rig = rig(
            MockBackend::with_devices(1),
            ScriptedDecoder::misses_only(),
            quiet_settings(),
        );

        rig.controller.refresh_devices().await.unwrap();
        assert!(rig.controller.switch_camera().await.unwrap().is_none());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn cancelled_confirmation_resumes_scanning_after_the_delay() {
        let rig = rig(
            MockBackend::with_devices(1),
            ScriptedDecoder::hits(&["PAY-1"]),
            delivery_settings(),
        );

        rig.controller.refresh_devices().await.unwrap();
        rig.controller.start(None).await.unwrap();
        tokio::time::sleep(Duration::from_millis(400)).await;
        assert!(rig.controller.pending_payment().await.is_some());

        rig.controller.cancel_pending().await;
        tokio::time::sleep(Duration::from_millis(900)).await;

        let state = rig.controller.snapshot().await;
        assert!(state.pending_payment.is_none());
        assert_eq!(state.status, ScanStatus::Scanning);

        rig.controller.stop().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn denied_probe_settles_idle_with_a_message() {
        let backend = MockBackend::with_devices(1);
        backend.deny_open.store(true, Ordering::SeqCst);
        let rig = rig(backend, ScriptedDecoder::misses_only(), quiet_settings());

        rig.controller.refresh_devices().await.unwrap();
        let err = rig.controller.start(None).await.unwrap_err();
        assert!(matches!(err, CameraError::PermissionDenied));

        let state = rig.controller.snapshot().await;
        assert_eq!(state.status, ScanStatus::Idle);
        assert_eq!(rig.backend.live.load(Ordering::SeqCst), 0);
        assert_eq!(rig.sink.count("scan-message"), 1);
    }
}
