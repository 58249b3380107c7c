use std::collections::BTreeMap;
use std::time::{Duration, SystemTime};
use tracing::{debug, error, info, warn};

use super::backend::{
    CameraBackend, ColorCapture, DepthPipeline, DepthStreamConfig, WebcamStreamConfig,
};
use super::latest::BlockingCaptureTask;
use super::source::{CameraSource, SourceStatus};
use crate::config::CamerasConfig;
use crate::error::{RovercamError, Result};
use crate::frame::{CameraId, FrameSet, SourceKind};

/// Result of asking a source for a frame
#[derive(Debug)]
pub enum PollOutcome {
    Frame(FrameSet),
    NoFrameAvailable,
}

impl PollOutcome {
    pub fn into_frame(self) -> Option<FrameSet> {
        match self {
            PollOutcome::Frame(frame) => Some(frame),
            PollOutcome::NoFrameAvailable => None,
        }
    }
}

enum SourceHandle {
    Depth(Box<dyn DepthPipeline>),
    /// Blocking reads performed on the scheduling task
    DirectColor(Box<dyn ColorCapture>),
    /// Blocking reads moved to a capture thread
    IsolatedColor(BlockingCaptureTask),
}

struct SourceEntry {
    source: CameraSource,
    status: SourceStatus,
    handle: Option<SourceHandle>,
}

/// Owns every camera slot, its activation state and its capture handle
pub struct CameraSourceManager {
    entries: BTreeMap<CameraId, SourceEntry>,
}

impl CameraSourceManager {
    /// Attempt to bring every slot online once.
    ///
    /// Individual failures are logged and leave the slot inactive for the rest of
    /// the run. Fails with [`RovercamError::NoCamerasDetected`] when nothing activates.
    pub fn initialize(backend: &mut dyn CameraBackend, config: &CamerasConfig) -> Result<Self> {
        info!("Initializing camera sources with {} backend", backend.name());

        let mut entries = BTreeMap::new();

        for id in CameraId::ALL {
            let (mut source, handle) = match id {
                CameraId::DepthA | CameraId::DepthB => {
                    let camera = if id == CameraId::DepthA {
                        &config.depth_a
                    } else {
                        &config.depth_b
                    };
                    let source =
                        CameraSource::new(id, camera.serial.clone(), camera.resolution, camera.fps);
                    let handle = Self::activate_depth(backend, id, &DepthStreamConfig::from(camera));
                    (source, handle)
                }
                CameraId::WebcamA | CameraId::WebcamB => {
                    let camera = if id == CameraId::WebcamA {
                        &config.webcam_a
                    } else {
                        &config.webcam_b
                    };
                    let source =
                        CameraSource::new(id, camera.path.clone(), camera.resolution, camera.fps);
                    let handle = Self::activate_color(
                        backend,
                        id,
                        &WebcamStreamConfig::from(camera),
                        config.isolate_blocking_sources,
                    );
                    (source, handle)
                }
            };

            source.active = handle.is_some();
            entries.insert(
                id,
                SourceEntry {
                    source,
                    status: SourceStatus::default(),
                    handle,
                },
            );
        }

        let manager = Self { entries };

        for entry in manager.entries.values() {
            warn!(
                "Camera {} ({}) status: {}",
                entry.source.id,
                entry.source.identity,
                entry.source.status_label()
            );
        }

        if manager.active_count() == 0 {
            error!("No cameras detected");
            return Err(RovercamError::NoCamerasDetected);
        }

        info!(
            "{} of {} camera sources active",
            manager.active_count(),
            CameraId::ALL.len()
        );
        Ok(manager)
    }

    fn activate_depth(
        backend: &mut dyn CameraBackend,
        id: CameraId,
        stream: &DepthStreamConfig,
    ) -> Option<SourceHandle> {
        info!("Attempting to connect pipeline for {} ({})", id, stream.serial);

        let required = id.index() + 1;
        if backend.device_count() < required {
            warn!("Depth camera {} not connected", id);
            return None;
        }

        match backend.start_depth_pipeline(stream) {
            Ok(pipeline) => {
                info!(
                    "Depth camera {} started: {}x{} @ {}fps",
                    stream.serial, stream.width, stream.height, stream.fps
                );
                Some(SourceHandle::Depth(pipeline))
            }
            Err(e) => {
                error!("Error connecting to camera {}, ERROR: {}", stream.serial, e);
                None
            }
        }
    }

    fn activate_color(
        backend: &mut dyn CameraBackend,
        id: CameraId,
        stream: &WebcamStreamConfig,
        isolate: bool,
    ) -> Option<SourceHandle> {
        info!("Attempting to connect to {} at {}", id, stream.path);

        let capture = match backend.open_color_capture(stream) {
            Ok(capture) => capture,
            Err(e) => {
                warn!("Webcam not found at {}: {}", stream.path, e);
                return None;
            }
        };

        info!("Webcam at {} connected successfully", stream.path);

        if !isolate {
            return Some(SourceHandle::DirectColor(capture));
        }

        let retry_delay = Duration::from_millis(1000 / stream.fps.max(1) as u64);
        match BlockingCaptureTask::spawn(id, capture, retry_delay) {
            Ok(task) => Some(SourceHandle::IsolatedColor(task)),
            Err(e) => {
                error!("Failed to spawn capture task for {}: {}", id, e);
                None
            }
        }
    }

    /// Ask a source for a frame.
    ///
    /// Depth sources and isolated webcams never wait. A webcam in direct mode
    /// performs a blocking read. Inactive sources always report no frame.
    pub fn poll(&mut self, id: CameraId) -> PollOutcome {
        let Some(entry) = self.entries.get_mut(&id) else {
            return PollOutcome::NoFrameAvailable;
        };

        let frame = match entry.handle.as_mut() {
            None => return PollOutcome::NoFrameAvailable,
            Some(SourceHandle::Depth(pipeline)) => pipeline.poll_for_frames().map(|frames| FrameSet {
                source_id: id,
                color_frame: frames.color,
                depth_frame: frames.depth,
                captured_at: SystemTime::now(),
            }),
            Some(SourceHandle::DirectColor(capture)) => match capture.read() {
                Ok(image) => Some(FrameSet::color(id, image)),
                Err(e) => {
                    debug!("Failed to capture frame from {}: {}", id, e);
                    None
                }
            },
            Some(SourceHandle::IsolatedColor(task)) => task.take_frame(),
        };

        match frame {
            Some(frame) => {
                entry.status.record_frame(frame.captured_at);
                PollOutcome::Frame(frame)
            }
            None => {
                debug!("No frames available from {}", id);
                entry.status.record_miss();
                PollOutcome::NoFrameAvailable
            }
        }
    }

    pub fn is_active(&self, id: CameraId) -> bool {
        self.entries.get(&id).is_some_and(|e| e.source.active)
    }

    pub fn source(&self, id: CameraId) -> Option<&CameraSource> {
        self.entries.get(&id).map(|e| &e.source)
    }

    pub fn sources(&self) -> impl Iterator<Item = &CameraSource> {
        self.entries.values().map(|e| &e.source)
    }

    /// Active slots in scheduling order
    pub fn active_sources(&self) -> Vec<CameraId> {
        self.entries
            .values()
            .filter(|e| e.source.active)
            .map(|e| e.source.id)
            .collect()
    }

    pub fn active_count(&self) -> usize {
        self.entries.values().filter(|e| e.source.active).count()
    }

    pub fn active_depth_sources(&self) -> Vec<CameraId> {
        self.entries
            .values()
            .filter(|e| e.source.active && e.source.kind == SourceKind::Depth)
            .map(|e| e.source.id)
            .collect()
    }

    pub fn status(&self, id: CameraId) -> Option<&SourceStatus> {
        self.entries.get(&id).map(|e| &e.status)
    }

    /// Take every capture handle out of its slot without releasing it.
    ///
    /// Releasing can block on a driver, so callers on the async runtime hand the
    /// result to a blocking thread. Sources are never reactivated.
    pub fn detach_handles(&mut self) -> DetachedSources {
        let handles = self
            .entries
            .values_mut()
            .filter_map(|entry| {
                entry
                    .handle
                    .take()
                    .map(|handle| (entry.source.identity.clone(), handle))
            })
            .collect();
        DetachedSources { handles }
    }

    /// Stop pipelines and release capture handles on the calling thread
    pub fn shutdown(&mut self) {
        self.detach_handles().release();
    }
}

/// Capture handles removed from a [`CameraSourceManager`], still holding their devices
pub struct DetachedSources {
    handles: Vec<(String, SourceHandle)>,
}

impl DetachedSources {
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Stop and release every handle. May block while capture threads wind down.
    pub fn release(self) {
        for (identity, handle) in self.handles {
            match handle {
                SourceHandle::Depth(mut pipeline) => {
                    pipeline.stop();
                    info!("Stopped depth pipeline for {}", identity);
                }
                SourceHandle::DirectColor(mut capture) => {
                    capture.release();
                    info!("Released webcam {}", identity);
                }
                SourceHandle::IsolatedColor(mut task) => {
                    task.stop();
                    info!("Stopped capture task for {}", identity);
                }
            }
        }
    }
}

impl Drop for CameraSourceManager {
    fn drop(&mut self) {
        self.shutdown();
    }
}
