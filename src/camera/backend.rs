use crate::config::{DepthCameraConfig, WebcamConfig};
use crate::error::CameraError;
use crate::frame::{ColorImage, DepthImage};

/// Requested streams for a depth camera: one color and one depth stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DepthStreamConfig {
    pub serial: String,
    pub width: u32,
    pub height: u32,
    pub fps: u32,
}

impl From<&DepthCameraConfig> for DepthStreamConfig {
    fn from(config: &DepthCameraConfig) -> Self {
        Self {
            serial: config.serial.clone(),
            width: config.resolution.0,
            height: config.resolution.1,
            fps: config.fps,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebcamStreamConfig {
    pub path: String,
    pub width: u32,
    pub height: u32,
    pub fps: u32,
}

impl From<&WebcamConfig> for WebcamStreamConfig {
    fn from(config: &WebcamConfig) -> Self {
        Self {
            path: config.path.clone(),
            width: config.resolution.0,
            height: config.resolution.1,
            fps: config.fps,
        }
    }
}

/// One successful depth-camera poll
#[derive(Debug, Clone)]
pub struct DepthFrames {
    pub color: Option<ColorImage>,
    pub depth: Option<DepthImage>,
}

/// Running capture pipeline of a depth camera
pub trait DepthPipeline: Send {
    /// Return the next frame pair if one is ready. Must not wait for hardware.
    fn poll_for_frames(&mut self) -> Option<DepthFrames>;

    fn stop(&mut self);
}

/// Opened color-only camera
pub trait ColorCapture: Send {
    /// Read the next frame, blocking until the driver delivers one
    fn read(&mut self) -> Result<ColorImage, CameraError>;

    fn release(&mut self);
}

/// Hardware access used by the source manager during initialization
pub trait CameraBackend {
    /// Number of depth devices currently attached to the shared device context
    fn device_count(&self) -> usize;

    fn start_depth_pipeline(
        &mut self,
        config: &DepthStreamConfig,
    ) -> Result<Box<dyn DepthPipeline>, CameraError>;

    fn open_color_capture(
        &mut self,
        config: &WebcamStreamConfig,
    ) -> Result<Box<dyn ColorCapture>, CameraError>;

    fn name(&self) -> &str;
}
