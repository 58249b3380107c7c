use gstreamer::prelude::*;
use gstreamer::Pipeline;
use gstreamer_app::AppSink;
use tracing::{debug, info, warn};

use super::backend::{
    CameraBackend, ColorCapture, DepthPipeline, DepthStreamConfig, WebcamStreamConfig,
};
use crate::error::CameraError;
use crate::frame::{ColorImage, PixelFormat};

/// Hardware backend: V4L2 webcams through GStreamer.
///
/// Depth cameras are left to the RealSense backend; on its own this backend
/// reports zero depth devices and both depth slots stay inactive.
pub struct GstreamerBackend {
    _private: (),
}

impl GstreamerBackend {
    pub fn new() -> Result<Self, CameraError> {
        gstreamer::init().map_err(|e| CameraError::Configuration {
            details: format!("Failed to initialize GStreamer: {}", e),
        })?;
        Ok(Self { _private: () })
    }

    fn build_pipeline_string(config: &WebcamStreamConfig) -> String {
        format!(
            "v4l2src device={} io-mode=mmap ! \
             video/x-raw,width={},height={},framerate={}/1 ! \
             videoconvert ! video/x-raw,format=BGR ! \
             appsink name=sink sync=false max-buffers=1 drop=true enable-last-sample=false",
            config.path, config.width, config.height, config.fps
        )
    }
}

impl CameraBackend for GstreamerBackend {
    fn device_count(&self) -> usize {
        0
    }

    fn start_depth_pipeline(
        &mut self,
        config: &DepthStreamConfig,
    ) -> Result<Box<dyn DepthPipeline>, CameraError> {
        Err(CameraError::PipelineStart {
            serial: config.serial.clone(),
            details: "depth cameras are not available through the GStreamer backend".to_string(),
        })
    }

    fn open_color_capture(
        &mut self,
        config: &WebcamStreamConfig,
    ) -> Result<Box<dyn ColorCapture>, CameraError> {
        let pipeline_desc = Self::build_pipeline_string(config);
        debug!("Creating GStreamer pipeline: {}", pipeline_desc);

        let open_err = |details: String| CameraError::DeviceOpen {
            device: config.path.clone(),
            details,
        };

        let pipeline = gstreamer::parse::launch(&pipeline_desc)
            .map_err(|e| open_err(format!("Failed to create pipeline: {}", e)))?
            .downcast::<Pipeline>()
            .map_err(|_| open_err("Failed to downcast to Pipeline".to_string()))?;

        let appsink = pipeline
            .by_name("sink")
            .ok_or_else(|| open_err("Failed to get appsink element".to_string()))?
            .downcast::<AppSink>()
            .map_err(|_| open_err("Failed to downcast to AppSink".to_string()))?;

        pipeline
            .set_state(gstreamer::State::Playing)
            .map_err(|e| open_err(format!("Failed to start pipeline: {}", e)))?;

        // Device errors surface during the state change; wait for it so open is synchronous
        let (result, _, _) = pipeline.state(gstreamer::ClockTime::from_seconds(5));
        if let Err(e) = result {
            let _ = pipeline.set_state(gstreamer::State::Null);
            return Err(open_err(format!("Pipeline failed to reach PLAYING: {}", e)));
        }

        info!(
            "GStreamer webcam pipeline playing for {} ({}x{} @ {}fps)",
            config.path, config.width, config.height, config.fps
        );

        Ok(Box::new(GstColorCapture {
            path: config.path.clone(),
            pipeline,
            appsink,
        }))
    }

    fn name(&self) -> &str {
        "gstreamer"
    }
}

struct GstColorCapture {
    path: String,
    pipeline: Pipeline,
    appsink: AppSink,
}

impl GstColorCapture {
    fn read_err(&self, details: String) -> CameraError {
        CameraError::Read {
            device: self.path.clone(),
            details,
        }
    }
}

impl ColorCapture for GstColorCapture {
    fn read(&mut self) -> Result<ColorImage, CameraError> {
        let sample = self
            .appsink
            .pull_sample()
            .map_err(|_| self.read_err("end of stream".to_string()))?;

        let caps = sample
            .caps()
            .ok_or_else(|| self.read_err("sample has no caps".to_string()))?;
        let structure = caps
            .structure(0)
            .ok_or_else(|| self.read_err("caps have no structure".to_string()))?;
        let width = structure
            .get::<i32>("width")
            .map_err(|e| self.read_err(format!("missing width: {}", e)))? as u32;
        let height = structure
            .get::<i32>("height")
            .map_err(|e| self.read_err(format!("missing height: {}", e)))? as u32;

        let buffer = sample
            .buffer()
            .ok_or_else(|| self.read_err("sample has no buffer".to_string()))?;
        let map = buffer
            .map_readable()
            .map_err(|e| self.read_err(format!("failed to map buffer: {}", e)))?;

        let row_bytes = width as usize * 3;
        let bytes = map.as_slice();
        let data = if height == 0 || bytes.len() == row_bytes * height as usize {
            bytes.to_vec()
        } else {
            // Rows are padded; drop the stride padding
            let stride = bytes.len() / height as usize;
            if stride < row_bytes {
                return Err(self.read_err(format!(
                    "buffer of {} bytes too small for {}x{}",
                    bytes.len(),
                    width,
                    height
                )));
            }
            bytes
                .chunks(stride)
                .take(height as usize)
                .flat_map(|row| &row[..row_bytes])
                .copied()
                .collect()
        };

        Ok(ColorImage::new(width, height, PixelFormat::Bgr8, data))
    }

    fn release(&mut self) {
        if let Err(e) = self.pipeline.set_state(gstreamer::State::Null) {
            warn!("Failed to stop GStreamer pipeline for {}: {}", self.path, e);
        }
    }
}
