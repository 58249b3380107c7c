use realsense_rust::config::Config;
use realsense_rust::context::Context;
use realsense_rust::frame::{ColorFrame, DepthFrame, PixelKind};
use realsense_rust::kind::{Rs2Format, Rs2Option, Rs2StreamKind};
use realsense_rust::pipeline::{ActivePipeline, InactivePipeline};
use std::collections::HashSet;
use std::ffi::CString;
use tracing::{debug, info, warn};

use super::backend::{
    CameraBackend, ColorCapture, DepthFrames, DepthPipeline, DepthStreamConfig,
    WebcamStreamConfig,
};
use crate::error::CameraError;
use crate::frame::{ColorImage, DepthImage, PixelFormat};

/// Meters per Z16 unit when the sensor does not report its own scale
const DEFAULT_DEPTH_SCALE: f32 = 0.001;

/// Hardware backend: Intel RealSense depth cameras through librealsense.
///
/// Every pipeline is created from one shared device context. Webcams are not
/// handled here; pair this with a color backend through [`super::CompositeBackend`].
pub struct RealsenseBackend {
    context: Context,
}

impl RealsenseBackend {
    pub fn new() -> Result<Self, CameraError> {
        let context = Context::new().map_err(|e| CameraError::Configuration {
            details: format!("Failed to create RealSense context: {}", e),
        })?;
        Ok(Self { context })
    }

    fn stream_config(config: &DepthStreamConfig) -> Result<Config, CameraError> {
        let start_err = |details: String| CameraError::PipelineStart {
            serial: config.serial.clone(),
            details,
        };

        let serial = CString::new(config.serial.as_str())
            .map_err(|e| start_err(format!("Invalid serial: {}", e)))?;
        let width = config.width as usize;
        let height = config.height as usize;
        let fps = config.fps as usize;

        let mut stream = Config::new();
        stream
            .enable_device_from_serial(&serial)
            .and_then(|c| c.disable_all_streams())
            .and_then(|c| c.enable_stream(Rs2StreamKind::Color, None, width, height, Rs2Format::Bgr8, fps))
            .and_then(|c| c.enable_stream(Rs2StreamKind::Depth, None, width, height, Rs2Format::Z16, fps))
            .map_err(|e| start_err(format!("Failed to configure streams: {}", e)))?;
        Ok(stream)
    }
}

impl CameraBackend for RealsenseBackend {
    fn device_count(&self) -> usize {
        self.context.query_devices(HashSet::new()).len()
    }

    fn start_depth_pipeline(
        &mut self,
        config: &DepthStreamConfig,
    ) -> Result<Box<dyn DepthPipeline>, CameraError> {
        let start_err = |details: String| CameraError::PipelineStart {
            serial: config.serial.clone(),
            details,
        };

        let stream = Self::stream_config(config)?;
        let pipeline = InactivePipeline::try_from(&self.context)
            .map_err(|e| start_err(format!("Failed to create pipeline: {}", e)))?
            .start(Some(stream))
            .map_err(|e| start_err(format!("Failed to start pipeline: {}", e)))?;

        let depth_scale = pipeline
            .profile()
            .device()
            .sensors()
            .iter()
            .find_map(|sensor| sensor.get_option(Rs2Option::DepthUnits))
            .unwrap_or_else(|| {
                warn!(
                    "Camera {} reports no depth scale; assuming {} m per unit",
                    config.serial, DEFAULT_DEPTH_SCALE
                );
                DEFAULT_DEPTH_SCALE
            });

        info!("RealSense {} depth scale {} m per unit", config.serial, depth_scale);

        Ok(Box::new(RealsensePipeline {
            serial: config.serial.clone(),
            pipeline: Some(SendPipeline(pipeline)),
            depth_scale,
        }))
    }

    fn open_color_capture(
        &mut self,
        config: &WebcamStreamConfig,
    ) -> Result<Box<dyn ColorCapture>, CameraError> {
        Err(CameraError::DeviceOpen {
            device: config.path.clone(),
            details: "webcams are not available through the RealSense backend".to_string(),
        })
    }

    fn name(&self) -> &str {
        "realsense"
    }
}

/// librealsense pipelines may be used from any thread, one caller at a time
struct SendPipeline(ActivePipeline);

// SAFETY: the handle is only reached through `&mut RealsensePipeline`, so calls
// into librealsense are never concurrent.
unsafe impl Send for SendPipeline {}

struct RealsensePipeline {
    serial: String,
    pipeline: Option<SendPipeline>,
    depth_scale: f32,
}

impl RealsensePipeline {
    fn convert_depth(&self, frame: &DepthFrame) -> Option<DepthImage> {
        let (width, height) = (frame.width(), frame.height());
        let mut raw = Vec::with_capacity(width * height);

        for row in 0..height {
            for col in 0..width {
                match frame.get(col, row) {
                    Some(PixelKind::Z16 { depth }) => raw.push(*depth),
                    _ => raw.push(0),
                }
            }
        }

        match DepthImage::from_z16(width as u32, height as u32, &raw, self.depth_scale) {
            Ok(image) => Some(image),
            Err(e) => {
                warn!("Dropping depth frame from {}: {}", self.serial, e);
                None
            }
        }
    }

    fn convert_color(frame: &ColorFrame) -> ColorImage {
        let (width, height) = (frame.width(), frame.height());
        let mut data = Vec::with_capacity(width * height * 3);

        for row in 0..height {
            for col in 0..width {
                match frame.get(col, row) {
                    Some(PixelKind::Bgr8 { b, g, r }) => data.extend_from_slice(&[*b, *g, *r]),
                    _ => data.extend_from_slice(&[0, 0, 0]),
                }
            }
        }

        ColorImage::new(width as u32, height as u32, PixelFormat::Bgr8, data)
    }
}

impl DepthPipeline for RealsensePipeline {
    fn poll_for_frames(&mut self) -> Option<DepthFrames> {
        let pipeline = &mut self.pipeline.as_mut()?.0;

        let frames = match pipeline.poll() {
            Ok(Some(frames)) => frames,
            Ok(None) => return None,
            Err(e) => {
                debug!("Poll of {} failed: {}", self.serial, e);
                return None;
            }
        };

        let color = frames
            .frames_of_type::<ColorFrame>()
            .first()
            .map(Self::convert_color);
        let depth = frames
            .frames_of_type::<DepthFrame>()
            .first()
            .and_then(|frame| self.convert_depth(frame));

        Some(DepthFrames { color, depth })
    }

    fn stop(&mut self) {
        if let Some(SendPipeline(pipeline)) = self.pipeline.take() {
            let _ = pipeline.stop();
            debug!("RealSense pipeline {} stopped", self.serial);
        }
    }
}

impl Drop for RealsensePipeline {
    fn drop(&mut self) {
        self.stop();
    }
}
