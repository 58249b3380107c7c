use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::SystemTime;

use crate::error::CameraError;

/// The four known hardware slots, in scheduling order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum CameraId {
    DepthA,
    DepthB,
    WebcamA,
    WebcamB,
}

impl CameraId {
    /// All slots in the order they are initialized and polled
    pub const ALL: [CameraId; 4] = [
        CameraId::DepthA,
        CameraId::DepthB,
        CameraId::WebcamA,
        CameraId::WebcamB,
    ];

    pub fn kind(&self) -> SourceKind {
        match self {
            CameraId::DepthA | CameraId::DepthB => SourceKind::Depth,
            CameraId::WebcamA | CameraId::WebcamB => SourceKind::Color,
        }
    }

    /// Position of the slot; a depth slot needs `index() + 1` attached devices
    pub fn index(&self) -> usize {
        match self {
            CameraId::DepthA => 0,
            CameraId::DepthB => 1,
            CameraId::WebcamA => 2,
            CameraId::WebcamB => 3,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            CameraId::DepthA => "depth_a",
            CameraId::DepthB => "depth_b",
            CameraId::WebcamA => "webcam_a",
            CameraId::WebcamB => "webcam_b",
        }
    }
}

impl fmt::Display for CameraId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SourceKind {
    /// Color stream plus per-pixel distance stream
    Depth,
    /// Color stream only
    Color,
}

/// Pixel layout of a color frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PixelFormat {
    /// 8-bit blue, green, red (camera native)
    Bgr8,
    /// 8-bit red, green, blue
    Rgb8,
}

/// Uncompressed color frame
#[derive(Debug, Clone)]
pub struct ColorImage {
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    /// Packed pixel data, shared so frames can be handed between tasks cheaply
    pub data: Arc<Vec<u8>>,
}

impl ColorImage {
    pub fn new(width: u32, height: u32, format: PixelFormat, data: Vec<u8>) -> Self {
        Self {
            width,
            height,
            format,
            data: Arc::new(data),
        }
    }

    /// Solid color frame, mostly useful for simulation and tests
    pub fn filled(width: u32, height: u32, format: PixelFormat, pixel: [u8; 3]) -> Self {
        let data = pixel
            .iter()
            .copied()
            .cycle()
            .take(width as usize * height as usize * 3)
            .collect();
        Self::new(width, height, format, data)
    }

    pub fn expected_size(&self) -> usize {
        self.width as usize * self.height as usize * 3
    }

    pub fn validate_size(&self) -> bool {
        self.data.len() == self.expected_size()
    }
}

/// Per-pixel distance in meters. Values <= 0 mean "no valid reading".
#[derive(Debug, Clone, PartialEq)]
pub struct DepthImage {
    width: u32,
    height: u32,
    data: Vec<f32>,
}

impl DepthImage {
    pub fn new(width: u32, height: u32, data: Vec<f32>) -> Result<Self, CameraError> {
        let expected = width as usize * height as usize;
        if data.len() != expected {
            return Err(CameraError::InvalidFrame {
                details: format!(
                    "depth buffer has {} values, expected {} for {}x{}",
                    data.len(),
                    expected,
                    width,
                    height
                ),
            });
        }
        Ok(Self {
            width,
            height,
            data,
        })
    }

    pub fn filled(width: u32, height: u32, distance_m: f32) -> Self {
        Self {
            width,
            height,
            data: vec![distance_m; width as usize * height as usize],
        }
    }

    /// Build from raw Z16 units; `depth_scale` is meters per unit (0.001 on most sensors)
    pub fn from_z16(
        width: u32,
        height: u32,
        raw: &[u16],
        depth_scale: f32,
    ) -> Result<Self, CameraError> {
        let data = raw.iter().map(|&v| v as f32 * depth_scale).collect();
        Self::new(width, height, data)
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn data(&self) -> &[f32] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [f32] {
        &mut self.data
    }

    /// Distance at (x, y). Coordinates outside the frame read as 0.0 (no reading).
    #[inline]
    pub fn distance(&self, x: u32, y: u32) -> f32 {
        if x >= self.width || y >= self.height {
            return 0.0;
        }
        self.data[y as usize * self.width as usize + x as usize]
    }

    #[inline]
    pub fn set_distance(&mut self, x: u32, y: u32, distance_m: f32) {
        if x < self.width && y < self.height {
            self.data[y as usize * self.width as usize + x as usize] = distance_m;
        }
    }

    pub fn valid_count(&self) -> usize {
        self.data.iter().filter(|&&d| is_valid_depth(d)).count()
    }

    pub fn same_dimensions(&self, other: &DepthImage) -> bool {
        self.width == other.width && self.height == other.height
    }
}

/// A reading is usable only when strictly positive (NaN is never valid)
#[inline]
pub fn is_valid_depth(distance_m: f32) -> bool {
    distance_m > 0.0
}

/// Frames delivered by one successful poll of a source
#[derive(Debug, Clone)]
pub struct FrameSet {
    pub source_id: CameraId,
    pub color_frame: Option<ColorImage>,
    pub depth_frame: Option<DepthImage>,
    pub captured_at: SystemTime,
}

impl FrameSet {
    pub fn color(source_id: CameraId, frame: ColorImage) -> Self {
        Self {
            source_id,
            color_frame: Some(frame),
            depth_frame: None,
            captured_at: SystemTime::now(),
        }
    }

    pub fn depth(source_id: CameraId, color: Option<ColorImage>, depth: DepthImage) -> Self {
        Self {
            source_id,
            color_frame: color,
            depth_frame: Some(depth),
            captured_at: SystemTime::now(),
        }
    }
}
