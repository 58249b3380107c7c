use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use super::backend::ColorCapture;
use crate::frame::{CameraId, FrameSet};

/// Single-slot holder for the most recent frame of a blocking source.
///
/// Writers overwrite whatever is there; readers take the frame so each
/// frame is handed out at most once.
#[derive(Debug, Default)]
pub struct LatestFrameSlot {
    frame: Mutex<Option<FrameSet>>,
    written: AtomicU64,
    overwritten: AtomicU64,
}

impl LatestFrameSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn store(&self, frame: FrameSet) {
        let previous = self.frame.lock().replace(frame);
        self.written.fetch_add(1, Ordering::Relaxed);
        if previous.is_some() {
            self.overwritten.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Non-blocking: returns the pending frame, if any
    pub fn take(&self) -> Option<FrameSet> {
        self.frame.lock().take()
    }

    pub fn frames_written(&self) -> u64 {
        self.written.load(Ordering::Relaxed)
    }

    /// Frames replaced before the scheduler consumed them
    pub fn frames_overwritten(&self) -> u64 {
        self.overwritten.load(Ordering::Relaxed)
    }
}

/// Dedicated thread that performs blocking reads and feeds a [`LatestFrameSlot`]
pub struct BlockingCaptureTask {
    source_id: CameraId,
    slot: Arc<LatestFrameSlot>,
    cancellation_token: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl BlockingCaptureTask {
    /// Time allowed for the capture thread to notice cancellation before it is detached
    const JOIN_GRACE: Duration = Duration::from_millis(500);

    pub fn spawn(
        source_id: CameraId,
        mut capture: Box<dyn ColorCapture>,
        retry_delay: Duration,
    ) -> std::io::Result<Self> {
        let slot = Arc::new(LatestFrameSlot::new());
        let cancellation_token = CancellationToken::new();

        let thread_slot = Arc::clone(&slot);
        let thread_token = cancellation_token.clone();

        let handle = std::thread::Builder::new()
            .name(format!("capture-{}", source_id))
            .spawn(move || {
                info!("Capture task for {} started", source_id);

                while !thread_token.is_cancelled() {
                    match capture.read() {
                        Ok(image) => {
                            trace!("Captured {}x{} frame from {}", image.width, image.height, source_id);
                            thread_slot.store(FrameSet::color(source_id, image));
                        }
                        Err(e) => {
                            warn!("Failed to capture frame from {}: {}", source_id, e);
                            std::thread::sleep(retry_delay);
                        }
                    }
                }

                capture.release();
                info!("Capture task for {} stopped", source_id);
            })?;

        Ok(Self {
            source_id,
            slot,
            cancellation_token,
            handle: Some(handle),
        })
    }

    pub fn slot(&self) -> Arc<LatestFrameSlot> {
        Arc::clone(&self.slot)
    }

    pub fn take_frame(&self) -> Option<FrameSet> {
        self.slot.take()
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Cancel the thread and wait briefly for it; a read stuck in the driver is left detached
    pub fn stop(&mut self) {
        self.cancellation_token.cancel();

        let Some(handle) = self.handle.take() else {
            return;
        };

        let deadline = Instant::now() + Self::JOIN_GRACE;
        while !handle.is_finished() && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(5));
        }

        if handle.is_finished() {
            let _ = handle.join();
            debug!("Capture task for {} joined", self.source_id);
        } else {
            warn!(
                "Capture task for {} is blocked in the driver; detaching it",
                self.source_id
            );
        }
    }
}

impl Drop for BlockingCaptureTask {
    fn drop(&mut self) {
        self.cancellation_token.cancel();
    }
}
