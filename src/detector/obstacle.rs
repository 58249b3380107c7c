use serde::Serialize;

use crate::config::DetectorConfig;
use crate::frame::{is_valid_depth, DepthImage};

/// Avoidance flags and proximity derived from one filtered depth frame
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ObstacleSignal {
    pub left_blocked: bool,
    pub right_blocked: bool,
    pub average_proximity_m: f32,
}

impl ObstacleSignal {
    pub fn clear(average_proximity_m: f32) -> Self {
        Self {
            left_blocked: false,
            right_blocked: false,
            average_proximity_m,
        }
    }

    pub fn is_blocked(&self) -> bool {
        self.left_blocked || self.right_blocked
    }
}

/// Sample tallies from the classification pass.
///
/// `pos_count` and `neg_count` accumulate over both image halves and are the
/// only counts that drive the decision. The per-half counts are diagnostics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SampleCounts {
    pub pos_count: u32,
    pub neg_count: u32,
    /// Classified samples from the left image half (columns width/2..width)
    pub left_count: u32,
    /// Classified samples from the right image half (columns 0..width/2)
    pub right_count: u32,
    pub valid_samples: u32,
    pub total_samples: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Detection {
    pub signal: ObstacleSignal,
    pub counts: SampleCounts,
    pub proximity_samples: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Half {
    Left,
    Right,
}

/// Stateless ground-plane thresholding over fixed sampling windows
#[derive(Debug, Clone)]
pub struct ObstacleDetector {
    config: DetectorConfig,
}

impl ObstacleDetector {
    pub fn new(config: DetectorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    pub fn detect(&self, frame: &DepthImage) -> ObstacleSignal {
        self.analyze(frame).signal
    }

    /// Full detection pass, including the sample tallies behind the decision
    pub fn analyze(&self, frame: &DepthImage) -> Detection {
        let (average_proximity_m, proximity_samples) = self.average_proximity(frame);
        let counts = self.classify(frame);
        let threshold = self.config.obstacle_count_threshold;

        let signal = if counts.pos_count > threshold {
            ObstacleSignal {
                left_blocked: false,
                right_blocked: true,
                average_proximity_m,
            }
        } else if counts.neg_count > threshold {
            ObstacleSignal {
                left_blocked: true,
                right_blocked: false,
                average_proximity_m,
            }
        } else {
            ObstacleSignal::clear(average_proximity_m)
        };

        Detection {
            signal,
            counts,
            proximity_samples,
        }
    }

    /// Whether the frame has the resolution the sampling windows were chosen for
    pub fn matches_calibration(&self, frame: &DepthImage) -> bool {
        (frame.width(), frame.height()) == self.config.calibration_resolution
    }

    /// Mean of the valid readings in the proximity window, sampled at literal
    /// coordinates. Returns 0.0 when the window holds no valid reading.
    ///
    /// The sum is divided by the number of valid samples, not the 49 grid
    /// points, so dropouts in the window do not pull the average toward zero.
    fn average_proximity(&self, frame: &DepthImage) -> (f32, u32) {
        let step = self.config.proximity_step.max(1) as usize;
        let (row_start, row_end) = self.config.proximity_rows;
        let (col_start, col_end) = self.config.proximity_cols;

        let mut sum = 0.0f64;
        let mut samples = 0u32;

        for y in (row_start..=row_end).step_by(step) {
            for x in (col_start..=col_end).step_by(step) {
                let distance = frame.distance(x, y);
                if is_valid_depth(distance) {
                    sum += distance as f64;
                    samples += 1;
                }
            }
        }

        if samples == 0 {
            (0.0, 0)
        } else {
            ((sum / samples as f64) as f32, samples)
        }
    }

    fn classify(&self, frame: &DepthImage) -> SampleCounts {
        let mut counts = SampleCounts::default();
        let width = frame.width();
        let height = frame.height();
        let mid_x = width / 2;

        // Image columns 0..width/2 are attributed to the right side
        self.classify_region(frame, 0..mid_x, height / 2..height, Half::Right, &mut counts);
        self.classify_region(frame, mid_x..width, height / 2..height, Half::Left, &mut counts);

        counts
    }

    fn classify_region(
        &self,
        frame: &DepthImage,
        columns: std::ops::Range<u32>,
        rows: std::ops::Range<u32>,
        half: Half,
        counts: &mut SampleCounts,
    ) {
        let stride = self.config.classification_stride.max(1) as usize;

        for y in rows.step_by(stride) {
            for x in columns.clone().step_by(stride) {
                counts.total_samples += 1;

                let distance = frame.distance(x, y);
                if !is_valid_depth(distance) {
                    continue;
                }
                counts.valid_samples += 1;

                let depth_mm = (distance * 1000.0) as i32;
                let delta = self.config.ground_depth_mm - depth_mm;

                let classified = if delta > self.config.positive_threshold_mm {
                    counts.pos_count += 1;
                    true
                } else if -delta > self.config.negative_threshold_mm {
                    counts.neg_count += 1;
                    true
                } else {
                    false
                };

                if classified {
                    match half {
                        Half::Left => counts.left_count += 1,
                        Half::Right => counts.right_count += 1,
                    }
                }
            }
        }
    }
}
