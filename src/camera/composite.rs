use tracing::debug;

use super::backend::{
    CameraBackend, ColorCapture, DepthPipeline, DepthStreamConfig, WebcamStreamConfig,
};
use crate::error::CameraError;

/// Routes depth slots to one backend and webcam slots to another
pub struct CompositeBackend {
    depth: Box<dyn CameraBackend>,
    color: Box<dyn CameraBackend>,
    name: String,
}

impl CompositeBackend {
    pub fn new(depth: Box<dyn CameraBackend>, color: Box<dyn CameraBackend>) -> Self {
        let name = format!("{}+{}", depth.name(), color.name());
        Self { depth, color, name }
    }
}

impl CameraBackend for CompositeBackend {
    fn device_count(&self) -> usize {
        self.depth.device_count()
    }

    fn start_depth_pipeline(
        &mut self,
        config: &DepthStreamConfig,
    ) -> Result<Box<dyn DepthPipeline>, CameraError> {
        debug!("Starting {} through {}", config.serial, self.depth.name());
        self.depth.start_depth_pipeline(config)
    }

    fn open_color_capture(
        &mut self,
        config: &WebcamStreamConfig,
    ) -> Result<Box<dyn ColorCapture>, CameraError> {
        debug!("Opening {} through {}", config.path, self.color.name());
        self.color.open_color_capture(config)
    }

    fn name(&self) -> &str {
        &self.name
    }
}
