use std::collections::HashSet;
use std::time::{Duration, Instant};
use tracing::debug;

use super::backend::{
    CameraBackend, ColorCapture, DepthFrames, DepthPipeline, DepthStreamConfig,
    WebcamStreamConfig,
};
use crate::config::CamerasConfig;
use crate::error::CameraError;
use crate::frame::{ColorImage, DepthImage, PixelFormat};

/// Rectangular region rendered closer than the floor
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimulatedObstacle {
    pub x: (u32, u32),
    pub y: (u32, u32),
    pub distance_m: f32,
}

/// Synthetic depth scene: a flat floor, an optional obstacle and optional dropouts
#[derive(Debug, Clone, PartialEq)]
pub struct SimulatedScene {
    pub depth_resolution: (u32, u32),
    pub floor_m: f32,
    pub obstacle: Option<SimulatedObstacle>,
    /// Every n-th pixel reports no reading
    pub hole_every: Option<u32>,
    /// Peak-to-peak ripple added to valid readings
    pub noise_m: f32,
}

impl Default for SimulatedScene {
    fn default() -> Self {
        Self {
            depth_resolution: (848, 480),
            floor_m: 0.7,
            obstacle: None,
            hole_every: None,
            noise_m: 0.0,
        }
    }
}

impl SimulatedScene {
    /// Floor with a box in the lower left of the image, close enough to trip detection
    pub fn with_obstacle() -> Self {
        Self {
            obstacle: Some(SimulatedObstacle {
                x: (60, 360),
                y: (260, 470),
                distance_m: 0.35,
            }),
            hole_every: Some(97),
            noise_m: 0.01,
            ..Self::default()
        }
    }

    pub fn render(&self, frame_index: u64) -> DepthImage {
        let (width, height) = self.depth_resolution;
        let mut depth = DepthImage::filled(width, height, self.floor_m);
        let data = depth.data_mut();

        for y in 0..height {
            for x in 0..width {
                let i = (y * width + x) as usize;

                let mut d = match self.obstacle {
                    Some(o) if (o.x.0..o.x.1).contains(&x) && (o.y.0..o.y.1).contains(&y) => {
                        o.distance_m
                    }
                    _ => self.floor_m,
                };

                if self.noise_m > 0.0 {
                    let phase = (x as u64 * 7 + y as u64 * 13 + frame_index * 31) % 11;
                    d += self.noise_m * (phase as f32 / 10.0 - 0.5);
                }

                if let Some(n) = self.hole_every {
                    if n > 0 && (i as u64 + frame_index) % n as u64 == 0 {
                        d = 0.0;
                    }
                }

                data[i] = d;
            }
        }

        depth
    }
}

/// How often a simulated depth pipeline has frames ready
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DeliveryPattern {
    Always,
    Never,
    /// At most one frame per period
    Paced(Duration),
}

/// In-process camera backend for tests and `--simulate` runs
#[derive(Debug, Clone)]
pub struct SimulatedBackend {
    device_count: usize,
    depth_serials: HashSet<String>,
    webcam_paths: HashSet<String>,
    scene: SimulatedScene,
    delivery: DeliveryPattern,
    webcam_delay: Duration,
    started: Vec<String>,
}

impl SimulatedBackend {
    pub fn new(device_count: usize) -> Self {
        Self {
            device_count,
            depth_serials: HashSet::new(),
            webcam_paths: HashSet::new(),
            scene: SimulatedScene::default(),
            delivery: DeliveryPattern::Always,
            webcam_delay: Duration::ZERO,
            started: Vec::new(),
        }
    }

    /// Every configured camera reachable, frames paced at the configured rates
    pub fn from_config(config: &CamerasConfig, scene: SimulatedScene) -> Self {
        let fps = config.depth_a.fps.max(1);
        Self::new(2)
            .with_depth_serial(&config.depth_a.serial)
            .with_depth_serial(&config.depth_b.serial)
            .with_webcam(&config.webcam_a.path)
            .with_webcam(&config.webcam_b.path)
            .with_scene(scene)
            .with_delivery(DeliveryPattern::Paced(Duration::from_millis(1000 / fps as u64)))
            .with_webcam_delay(Duration::from_millis(1000 / config.webcam_a.fps.max(1) as u64))
    }

    pub fn with_depth_serial(mut self, serial: &str) -> Self {
        self.depth_serials.insert(serial.to_string());
        self
    }

    pub fn with_webcam(mut self, path: &str) -> Self {
        self.webcam_paths.insert(path.to_string());
        self
    }

    pub fn with_scene(mut self, scene: SimulatedScene) -> Self {
        self.scene = scene;
        self
    }

    pub fn with_delivery(mut self, delivery: DeliveryPattern) -> Self {
        self.delivery = delivery;
        self
    }

    /// Time each webcam read blocks for
    pub fn with_webcam_delay(mut self, delay: Duration) -> Self {
        self.webcam_delay = delay;
        self
    }

    /// Identities successfully started or opened, in order
    pub fn started(&self) -> &[String] {
        &self.started
    }
}

impl CameraBackend for SimulatedBackend {
    fn device_count(&self) -> usize {
        self.device_count
    }

    fn start_depth_pipeline(
        &mut self,
        config: &DepthStreamConfig,
    ) -> Result<Box<dyn DepthPipeline>, CameraError> {
        if !self.depth_serials.contains(&config.serial) {
            return Err(CameraError::PipelineStart {
                serial: config.serial.clone(),
                details: "No device connected with this serial".to_string(),
            });
        }

        debug!("Simulated depth pipeline started for {}", config.serial);
        self.started.push(config.serial.clone());

        Ok(Box::new(SimulatedDepthPipeline {
            color_size: (config.width, config.height),
            scene: self.scene.clone(),
            delivery: self.delivery,
            last_frame: None,
            frame_index: 0,
            running: true,
        }))
    }

    fn open_color_capture(
        &mut self,
        config: &WebcamStreamConfig,
    ) -> Result<Box<dyn ColorCapture>, CameraError> {
        if !self.webcam_paths.contains(&config.path) {
            return Err(CameraError::DeviceOpen {
                device: config.path.clone(),
                details: "No such device".to_string(),
            });
        }

        self.started.push(config.path.clone());

        Ok(Box::new(SimulatedColorCapture {
            path: config.path.clone(),
            size: (config.width, config.height),
            delay: self.webcam_delay,
            frame_index: 0,
            released: false,
        }))
    }

    fn name(&self) -> &str {
        "simulated"
    }
}

struct SimulatedDepthPipeline {
    color_size: (u32, u32),
    scene: SimulatedScene,
    delivery: DeliveryPattern,
    last_frame: Option<Instant>,
    frame_index: u64,
    running: bool,
}

impl DepthPipeline for SimulatedDepthPipeline {
    fn poll_for_frames(&mut self) -> Option<DepthFrames> {
        if !self.running {
            return None;
        }

        let ready = match self.delivery {
            DeliveryPattern::Always => true,
            DeliveryPattern::Never => false,
            DeliveryPattern::Paced(period) => self
                .last_frame
                .map_or(true, |last| last.elapsed() >= period),
        };
        if !ready {
            return None;
        }

        self.last_frame = Some(Instant::now());
        let index = self.frame_index;
        self.frame_index += 1;

        let shade = (index % 200) as u8;
        Some(DepthFrames {
            color: Some(ColorImage::filled(
                self.color_size.0,
                self.color_size.1,
                PixelFormat::Bgr8,
                [shade, 64, 128],
            )),
            depth: Some(self.scene.render(index)),
        })
    }

    fn stop(&mut self) {
        self.running = false;
    }
}

struct SimulatedColorCapture {
    path: String,
    size: (u32, u32),
    delay: Duration,
    frame_index: u64,
    released: bool,
}

impl ColorCapture for SimulatedColorCapture {
    fn read(&mut self) -> Result<ColorImage, CameraError> {
        if self.released {
            return Err(CameraError::Read {
                device: self.path.clone(),
                details: "capture released".to_string(),
            });
        }

        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }

        self.frame_index += 1;
        let shade = (self.frame_index % 256) as u8;
        Ok(ColorImage::filled(
            self.size.0,
            self.size.1,
            PixelFormat::Bgr8,
            [32, shade, 200],
        ))
    }

    fn release(&mut self) {
        self.released = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scene_renders_obstacle_and_holes() {
        let scene = SimulatedScene {
            depth_resolution: (100, 100),
            obstacle: Some(SimulatedObstacle {
                x: (10, 20),
                y: (10, 20),
                distance_m: 0.3,
            }),
            hole_every: Some(10),
            ..SimulatedScene::default()
        };

        let depth = scene.render(1);
        assert_eq!(depth.width(), 100);
        assert_eq!(depth.distance(15, 15), 0.3);
        assert_eq!(depth.distance(50, 50), 0.7);
        // (y * w + x + frame) % 10 == 0 at x=9, y=0
        assert_eq!(depth.distance(9, 0), 0.0);
    }

    #[test]
    fn test_paced_pipeline_does_not_wait() {
        let mut backend = SimulatedBackend::new(1)
            .with_depth_serial("A")
            .with_delivery(DeliveryPattern::Paced(Duration::from_secs(60)));

        let mut pipeline = backend
            .start_depth_pipeline(&DepthStreamConfig {
                serial: "A".to_string(),
                width: 424,
                height: 240,
                fps: 15,
            })
            .unwrap();

        let start = Instant::now();
        assert!(pipeline.poll_for_frames().is_some());
        assert!(pipeline.poll_for_frames().is_none());
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn test_unknown_devices_fail() {
        let mut backend = SimulatedBackend::new(2);
        assert!(backend
            .start_depth_pipeline(&DepthStreamConfig {
                serial: "missing".to_string(),
                width: 424,
                height: 240,
                fps: 15,
            })
            .is_err());
        assert!(backend
            .open_color_capture(&WebcamStreamConfig {
                path: "/dev/video99".to_string(),
                width: 640,
                height: 480,
                fps: 15,
            })
            .is_err());
        assert!(backend.started().is_empty());
    }
}
