use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct RovercamConfig {
    #[serde(default)]
    pub cameras: CamerasConfig,
    #[serde(default)]
    pub filter: FilterConfig,
    #[serde(default)]
    pub detector: DetectorConfig,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
}

/// Hardware slots. Each slot is attempted once at startup.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct CamerasConfig {
    /// Run blocking webcam reads in their own capture task feeding a latest-frame slot
    #[serde(default = "default_isolate_blocking_sources")]
    pub isolate_blocking_sources: bool,

    #[serde(default = "default_depth_a")]
    pub depth_a: DepthCameraConfig,

    #[serde(default = "default_depth_b")]
    pub depth_b: DepthCameraConfig,

    #[serde(default = "default_webcam_a")]
    pub webcam_a: WebcamConfig,

    #[serde(default = "default_webcam_b")]
    pub webcam_b: WebcamConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct DepthCameraConfig {
    /// Device serial number used to select the camera
    pub serial: String,

    /// Stream resolution (width, height) for both color and depth
    #[serde(default = "default_depth_resolution")]
    pub resolution: (u32, u32),

    #[serde(default = "default_camera_fps")]
    pub fps: u32,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct WebcamConfig {
    /// Device node, e.g. /dev/video6
    pub path: String,

    #[serde(default = "default_webcam_resolution")]
    pub resolution: (u32, u32),

    #[serde(default = "default_camera_fps")]
    pub fps: u32,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct FilterConfig {
    /// Smoothing weight of the edge-preserving spatial pass (1.0 = no smoothing)
    #[serde(default = "default_spatial_alpha")]
    pub spatial_alpha: f32,

    /// Neighbor differences above this (meters) are treated as edges and not smoothed
    #[serde(default = "default_spatial_delta_m")]
    pub spatial_delta_m: f32,

    /// Maximum horizontal distance (pixels) searched for a valid value when filling holes
    #[serde(default = "default_hole_fill_radius")]
    pub hole_fill_radius: u32,

    #[serde(default = "default_temporal_alpha")]
    pub temporal_alpha: f32,

    #[serde(default = "default_temporal_delta_m")]
    pub temporal_delta_m: f32,

    /// Keep the last valid value for pixels that drop out of the current frame
    #[serde(default = "default_temporal_persistence")]
    pub temporal_persistence: bool,

    /// Consecutive invalid frames a pixel keeps its last valid value for
    #[serde(default = "default_temporal_persistence_frames")]
    pub temporal_persistence_frames: u32,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct DetectorConfig {
    /// Assumed distance to the floor directly ahead
    #[serde(default = "default_ground_depth_mm")]
    pub ground_depth_mm: i32,

    /// Samples closer than ground by more than this count as positive
    #[serde(default = "default_positive_threshold_mm")]
    pub positive_threshold_mm: i32,

    /// Samples farther than ground by more than this count as negative
    #[serde(default = "default_negative_threshold_mm")]
    pub negative_threshold_mm: i32,

    /// Global positive/negative count that must be exceeded to raise a flag
    #[serde(default = "default_obstacle_count_threshold")]
    pub obstacle_count_threshold: u32,

    /// Inclusive row range of the proximity window
    #[serde(default = "default_proximity_rows")]
    pub proximity_rows: (u32, u32),

    /// Inclusive column range of the proximity window
    #[serde(default = "default_proximity_cols")]
    pub proximity_cols: (u32, u32),

    #[serde(default = "default_proximity_step")]
    pub proximity_step: u32,

    #[serde(default = "default_classification_stride")]
    pub classification_stride: u32,

    /// Resolution the sampling coordinates were calibrated for
    #[serde(default = "default_calibration_resolution")]
    pub calibration_resolution: (u32, u32),

    #[serde(default)]
    pub debounce: DebounceConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct DebounceConfig {
    #[serde(default)]
    pub enabled: bool,

    /// Consecutive blocked frames before a side is reported blocked
    #[serde(default = "default_debounce_frames")]
    pub enter_frames: u32,

    /// Consecutive clear frames before a blocked side is released
    #[serde(default = "default_debounce_frames")]
    pub exit_frames: u32,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct OutputConfig {
    #[serde(default = "default_jpeg_quality")]
    pub jpeg_quality: u8,

    /// Capacity of the in-process broadcast transport
    #[serde(default = "default_signal_capacity")]
    pub signal_capacity: usize,

    #[serde(default = "default_color_frame_id")]
    pub color_frame_id: String,

    #[serde(default = "default_webcam_frame_id")]
    pub webcam_frame_id: String,

    #[serde(default)]
    pub topics: TopicConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct TopicConfig {
    pub depth_a_color: String,
    pub depth_a_depth: String,
    pub depth_b_color: String,
    pub depth_b_depth: String,
    pub webcam_a: String,
    pub webcam_b: String,
    pub left_obstacle: String,
    pub right_obstacle: String,
    pub proximity: String,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct SchedulerConfig {
    /// Tick period in milliseconds (66 ms is roughly 15 Hz)
    #[serde(default = "default_tick_ms")]
    pub tick_ms: u64,
}

impl RovercamConfig {
    /// Load configuration from default sources (file + environment variables)
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_file("rovercam.toml")
    }

    /// Load configuration from a specific file path.
    ///
    /// Environment overrides use the `ROVERCAM_` prefix and `__` between nested keys,
    /// e.g. `ROVERCAM_SCHEDULER__TICK_MS=50`.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path_str = path.as_ref().to_string_lossy();
        debug!("Loading configuration from: {}", path_str);

        let settings = Config::builder()
            .add_source(Config::try_from(&Self::default())?)
            .add_source(File::with_name(&path_str).required(false))
            .add_source(
                Environment::with_prefix("ROVERCAM")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()?;

        let config: RovercamConfig = settings.try_deserialize()?;

        info!("Configuration loaded successfully");
        debug!("Final configuration: {:#?}", config);

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, resolution, fps) in [
            ("depth_a", self.cameras.depth_a.resolution, self.cameras.depth_a.fps),
            ("depth_b", self.cameras.depth_b.resolution, self.cameras.depth_b.fps),
            ("webcam_a", self.cameras.webcam_a.resolution, self.cameras.webcam_a.fps),
            ("webcam_b", self.cameras.webcam_b.resolution, self.cameras.webcam_b.fps),
        ] {
            if resolution.0 == 0 || resolution.1 == 0 {
                return Err(ConfigError::Message(format!(
                    "Camera {} resolution must be greater than 0",
                    name
                )));
            }
            if fps == 0 {
                return Err(ConfigError::Message(format!(
                    "Camera {} fps must be greater than 0",
                    name
                )));
            }
        }

        if !(self.filter.spatial_alpha > 0.0 && self.filter.spatial_alpha <= 1.0) {
            return Err(ConfigError::Message(
                "Filter spatial_alpha must be in (0, 1]".to_string(),
            ));
        }

        if !(self.filter.temporal_alpha > 0.0 && self.filter.temporal_alpha <= 1.0) {
            return Err(ConfigError::Message(
                "Filter temporal_alpha must be in (0, 1]".to_string(),
            ));
        }

        if self.filter.spatial_delta_m < 0.0 || self.filter.temporal_delta_m < 0.0 {
            return Err(ConfigError::Message(
                "Filter delta thresholds must not be negative".to_string(),
            ));
        }

        if self.filter.temporal_persistence && self.filter.temporal_persistence_frames == 0 {
            return Err(ConfigError::Message(
                "Filter temporal_persistence_frames must be greater than 0 when persistence is on"
                    .to_string(),
            ));
        }

        if self.detector.proximity_step == 0 || self.detector.classification_stride == 0 {
            return Err(ConfigError::Message(
                "Detector sampling steps must be greater than 0".to_string(),
            ));
        }

        if self.detector.proximity_rows.0 > self.detector.proximity_rows.1
            || self.detector.proximity_cols.0 > self.detector.proximity_cols.1
        {
            return Err(ConfigError::Message(
                "Detector proximity window bounds are inverted".to_string(),
            ));
        }

        if self.detector.debounce.enter_frames == 0 || self.detector.debounce.exit_frames == 0 {
            return Err(ConfigError::Message(
                "Debounce frame counts must be greater than 0".to_string(),
            ));
        }

        if self.output.jpeg_quality == 0 || self.output.jpeg_quality > 100 {
            return Err(ConfigError::Message(
                "Output jpeg_quality must be between 1 and 100".to_string(),
            ));
        }

        if self.output.signal_capacity == 0 {
            return Err(ConfigError::Message(
                "Output signal_capacity must be greater than 0".to_string(),
            ));
        }

        if self.scheduler.tick_ms == 0 {
            return Err(ConfigError::Message(
                "Scheduler tick_ms must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

impl SchedulerConfig {
    pub fn tick_period(&self) -> Duration {
        Duration::from_millis(self.tick_ms)
    }
}

impl Default for RovercamConfig {
    fn default() -> Self {
        Self {
            cameras: CamerasConfig::default(),
            filter: FilterConfig::default(),
            detector: DetectorConfig::default(),
            output: OutputConfig::default(),
            scheduler: SchedulerConfig::default(),
        }
    }
}

impl Default for CamerasConfig {
    fn default() -> Self {
        Self {
            depth_a: default_depth_a(),
            depth_b: default_depth_b(),
            webcam_a: default_webcam_a(),
            webcam_b: default_webcam_b(),
            isolate_blocking_sources: default_isolate_blocking_sources(),
        }
    }
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            spatial_alpha: default_spatial_alpha(),
            spatial_delta_m: default_spatial_delta_m(),
            hole_fill_radius: default_hole_fill_radius(),
            temporal_alpha: default_temporal_alpha(),
            temporal_delta_m: default_temporal_delta_m(),
            temporal_persistence: default_temporal_persistence(),
            temporal_persistence_frames: default_temporal_persistence_frames(),
        }
    }
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            ground_depth_mm: default_ground_depth_mm(),
            positive_threshold_mm: default_positive_threshold_mm(),
            negative_threshold_mm: default_negative_threshold_mm(),
            obstacle_count_threshold: default_obstacle_count_threshold(),
            proximity_rows: default_proximity_rows(),
            proximity_cols: default_proximity_cols(),
            proximity_step: default_proximity_step(),
            classification_stride: default_classification_stride(),
            calibration_resolution: default_calibration_resolution(),
            debounce: DebounceConfig::default(),
        }
    }
}

impl Default for DebounceConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            enter_frames: default_debounce_frames(),
            exit_frames: default_debounce_frames(),
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            jpeg_quality: default_jpeg_quality(),
            signal_capacity: default_signal_capacity(),
            color_frame_id: default_color_frame_id(),
            webcam_frame_id: default_webcam_frame_id(),
            topics: TopicConfig::default(),
        }
    }
}

impl Default for TopicConfig {
    fn default() -> Self {
        Self {
            depth_a_color: "rs_node/camera1/compressed_video".to_string(),
            depth_a_depth: "rs_node/camera1/depth_video".to_string(),
            depth_b_color: "rs_node/camera2/compressed_video".to_string(),
            depth_b_depth: "rs_node/camera2/depth_video".to_string(),
            webcam_a: "rgb_cam1/compressed".to_string(),
            webcam_b: "rgb_cam2/compressed".to_string(),
            left_obstacle: "obstacle_detection/left".to_string(),
            right_obstacle: "obstacle_detection/right".to_string(),
            proximity: "depth_detection".to_string(),
        }
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_ms: default_tick_ms(),
        }
    }
}

// Default value functions
fn default_depth_a() -> DepthCameraConfig {
    DepthCameraConfig {
        serial: "318122303486".to_string(),
        resolution: default_depth_resolution(),
        fps: default_camera_fps(),
    }
}
fn default_depth_b() -> DepthCameraConfig {
    DepthCameraConfig {
        serial: "308222300472".to_string(),
        resolution: default_depth_resolution(),
        fps: default_camera_fps(),
    }
}
fn default_webcam_a() -> WebcamConfig {
    WebcamConfig {
        path: "/dev/video6".to_string(),
        resolution: default_webcam_resolution(),
        fps: default_camera_fps(),
    }
}
fn default_webcam_b() -> WebcamConfig {
    WebcamConfig {
        path: "/dev/video8".to_string(),
        resolution: default_webcam_resolution(),
        fps: default_camera_fps(),
    }
}
fn default_isolate_blocking_sources() -> bool {
    true
}
fn default_depth_resolution() -> (u32, u32) {
    (424, 240)
}
fn default_webcam_resolution() -> (u32, u32) {
    (640, 480)
}
fn default_camera_fps() -> u32 {
    15
}

fn default_spatial_alpha() -> f32 {
    0.5
}
fn default_spatial_delta_m() -> f32 {
    0.02
}
fn default_hole_fill_radius() -> u32 {
    4
}
fn default_temporal_alpha() -> f32 {
    0.4
}
fn default_temporal_delta_m() -> f32 {
    0.02
}
fn default_temporal_persistence() -> bool {
    true
}
fn default_temporal_persistence_frames() -> u32 {
    2
}

fn default_ground_depth_mm() -> i32 {
    700
}
fn default_positive_threshold_mm() -> i32 {
    250
}
fn default_negative_threshold_mm() -> i32 {
    800
}
fn default_obstacle_count_threshold() -> u32 {
    200
}
fn default_proximity_rows() -> (u32, u32) {
    (228, 252)
}
fn default_proximity_cols() -> (u32, u32) {
    (412, 436)
}
fn default_proximity_step() -> u32 {
    4
}
fn default_classification_stride() -> u32 {
    5
}
fn default_calibration_resolution() -> (u32, u32) {
    (848, 480)
}
fn default_debounce_frames() -> u32 {
    3
}

fn default_jpeg_quality() -> u8 {
    40
} // Low quality keeps encode time inside the tick
fn default_signal_capacity() -> usize {
    64
}
fn default_color_frame_id() -> String {
    "camera_rgb_optical_frame".to_string()
}
fn default_webcam_frame_id() -> String {
    "rgb_camera_frame".to_string()
}

fn default_tick_ms() -> u64 {
    66
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = RovercamConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.cameras.depth_a.resolution, (424, 240));
        assert_eq!(config.cameras.webcam_b.path, "/dev/video8");
        assert_eq!(config.scheduler.tick_period(), Duration::from_millis(66));
        assert!(!config.detector.debounce.enabled);
    }

    #[test]
    fn test_config_validation() {
        let mut config = RovercamConfig::default();

        // Should fail validation due to invalid resolution
        config.cameras.webcam_a.resolution = (0, 480);
        assert!(config.validate().is_err());

        config.cameras.webcam_a.resolution = (640, 480);
        assert!(config.validate().is_ok());

        config.output.jpeg_quality = 0;
        assert!(config.validate().is_err());
        config.output.jpeg_quality = 40;

        config.filter.temporal_persistence_frames = 0;
        assert!(config.validate().is_err());
        config.filter.temporal_persistence = false;
        assert!(config.validate().is_ok());
        config.filter.temporal_persistence = true;
        config.filter.temporal_persistence_frames = 2;

        config.filter.temporal_alpha = 1.5;
        assert!(config.validate().is_err());
        config.filter.temporal_alpha = 0.4;

        config.scheduler.tick_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_file_and_environment_layers() {
        let mut file = tempfile::Builder::new()
            .suffix(".toml")
            .tempfile()
            .unwrap();
        writeln!(
            file,
            r#"
[cameras.depth_a]
serial = "A"

[cameras.webcam_b]
path = "/dev/video42"

[detector]
ground_depth_mm = 650
"#
        )
        .unwrap();

        let config = RovercamConfig::load_from_file(file.path()).unwrap();
        assert_eq!(config.cameras.depth_a.serial, "A");
        assert_eq!(config.cameras.depth_a.resolution, (424, 240));
        assert_eq!(config.cameras.depth_b.serial, "308222300472");
        assert_eq!(config.cameras.webcam_b.path, "/dev/video42");
        assert_eq!(config.detector.ground_depth_mm, 650);
        assert_eq!(config.detector.positive_threshold_mm, 250);

        env::set_var("ROVERCAM_SCHEDULER__TICK_MS", "50");
        let config = RovercamConfig::load_from_file(file.path());
        env::remove_var("ROVERCAM_SCHEDULER__TICK_MS");

        assert_eq!(config.unwrap().scheduler.tick_ms, 50);
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = RovercamConfig::load_from_file(dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.cameras, CamerasConfig::default());
        assert_eq!(config.output.topics.proximity, "depth_detection");
    }
}
