use crate::config::FilterConfig;
use crate::frame::{is_valid_depth, DepthImage};

/// Hole filling followed by edge-preserving recursive smoothing.
///
/// Holes are filled from the nearest valid pixel on the same row within
/// `hole_fill_radius`, left neighbor first. Smoothing runs forward and backward
/// along rows, then along columns; two neighbors are only blended when they
/// differ by less than `delta_m`, so depth edges survive.
#[derive(Debug, Clone)]
pub struct SpatialFilter {
    alpha: f32,
    delta_m: f32,
    hole_fill_radius: u32,
}

impl SpatialFilter {
    pub fn new(config: &FilterConfig) -> Self {
        Self {
            alpha: config.spatial_alpha,
            delta_m: config.spatial_delta_m,
            hole_fill_radius: config.hole_fill_radius,
        }
    }

    pub fn process(&self, frame: &DepthImage) -> DepthImage {
        let mut out = frame.clone();
        let width = out.width() as usize;
        let height = out.height() as usize;
        if width == 0 || height == 0 {
            return out;
        }

        let data = out.data_mut();

        if self.hole_fill_radius > 0 {
            self.fill_holes(data, width);
        }

        if self.alpha < 1.0 {
            for row in data.chunks_mut(width) {
                self.smooth_line(row.iter_mut());
                self.smooth_line(row.iter_mut().rev());
            }
            for x in 0..width {
                self.smooth_line(data.iter_mut().skip(x).step_by(width));
                self.smooth_line(data.iter_mut().skip(x).step_by(width).rev());
            }
        }

        out
    }

    fn fill_holes(&self, data: &mut [f32], width: usize) {
        let radius = self.hole_fill_radius as usize;

        for row in data.chunks_mut(width) {
            let source = row.to_vec();
            for x in 0..width {
                if is_valid_depth(source[x]) {
                    continue;
                }

                for k in 1..=radius {
                    if x >= k && is_valid_depth(source[x - k]) {
                        row[x] = source[x - k];
                        break;
                    }
                    if x + k < width && is_valid_depth(source[x + k]) {
                        row[x] = source[x + k];
                        break;
                    }
                }
            }
        }
    }

    fn smooth_line<'a>(&self, line: impl Iterator<Item = &'a mut f32>) {
        let mut previous: Option<f32> = None;

        for value in line {
            if !is_valid_depth(*value) {
                previous = None;
                continue;
            }

            if let Some(prev) = previous {
                if (*value - prev).abs() < self.delta_m {
                    *value = prev + self.alpha * (*value - prev);
                }
            }
            previous = Some(*value);
        }
    }
}
