use std::sync::Arc;
use std::thread;
use std::time::Duration;

use log::{info, warn};
use tokio_util::sync::CancellationToken;

use crate::camera::backend::FrameSource;
use crate::decode::FrameDecoder;

use super::router::ResultRouter;

/// Pause between decode attempts; frames arrive faster than this, so the
/// loop samples rather than drains.
const SCAN_INTERVAL: Duration = Duration::from_millis(100);

/// Cooperative poll loop: grab one frame, run one decode, reschedule.
///
/// Runs on a dedicated blocking thread that exclusively owns the stream
/// (the capture handle is not Send-safe across every backend). A miss is
/// the expected per-frame outcome and is swallowed; any other grab or
/// decode failure is logged and scanning continues. The cancellation token
/// is checked before each attempt and before each reschedule, and the
/// stream is dropped — releasing the device — before the thread exits.
pub(crate) fn scan_loop(
    mut source: Box<dyn FrameSource>,
    decoder: Arc<dyn FrameDecoder>,
    router: Arc<ResultRouter>,
    cancel: CancellationToken,
) {
    loop {
        if cancel.is_cancelled() {
            break;
        }

        match source.grab() {
            Ok(frame) => match decoder.decode(&frame) {
                Ok(Some(text)) => {
                    if !router.on_result(&text) {
                        break;
                    }
                }
                Ok(None) => {} // no code in this frame, keep scanning
                Err(err) => warn!("decode failed on this frame: {err}"),
            },
            Err(err) => warn!("frame grab failed: {err}"),
        }

        if cancel.is_cancelled() {
            break;
        }
        thread::sleep(SCAN_INTERVAL);
    }

    info!("scan loop shutting down");
    drop(source);
}
