mod backend;
mod composite;
#[cfg(all(feature = "camera", target_os = "linux"))]
mod gst;
mod latest;
mod manager;
#[cfg(all(feature = "realsense", target_os = "linux"))]
mod realsense;
mod simulated;
mod source;

pub use backend::{
    CameraBackend, ColorCapture, DepthFrames, DepthPipeline, DepthStreamConfig,
    WebcamStreamConfig,
};
pub use composite::CompositeBackend;
#[cfg(all(feature = "camera", target_os = "linux"))]
pub use gst::GstreamerBackend;
pub use latest::{BlockingCaptureTask, LatestFrameSlot};
pub use manager::{CameraSourceManager, DetachedSources, PollOutcome};
#[cfg(all(feature = "realsense", target_os = "linux"))]
pub use realsense::RealsenseBackend;
pub use simulated::{DeliveryPattern, SimulatedBackend, SimulatedObstacle, SimulatedScene};
pub use source::{CameraSource, SourceStatus};
