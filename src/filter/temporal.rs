use crate::config::FilterConfig;
use crate::frame::{is_valid_depth, DepthImage};

/// Per-source history carried between frames
#[derive(Debug, Clone, Default)]
pub struct FilterState {
    previous: Option<DepthImage>,
    /// Consecutive frames each pixel has had no valid reading
    invalid_runs: Vec<u32>,
    frames: u64,
}

impl FilterState {
    pub fn frames_processed(&self) -> u64 {
        self.frames
    }

    pub fn previous(&self) -> Option<&DepthImage> {
        self.previous.as_ref()
    }
}

/// Exponential blending of each pixel with its smoothed history.
///
/// Only changes smaller than `delta_m` are blended; larger jumps are taken as
/// real motion and pass straight through. With persistence on, a pixel that
/// drops out keeps its last value for at most `persistence_frames` consecutive
/// frames and then reads invalid again.
#[derive(Debug, Clone)]
pub struct TemporalFilter {
    alpha: f32,
    delta_m: f32,
    persistence: bool,
    persistence_frames: u32,
}

impl TemporalFilter {
    pub fn new(config: &FilterConfig) -> Self {
        Self {
            alpha: config.temporal_alpha,
            delta_m: config.temporal_delta_m,
            persistence: config.temporal_persistence,
            persistence_frames: config.temporal_persistence_frames,
        }
    }

    pub fn process(&self, frame: &DepthImage, state: &mut FilterState) -> DepthImage {
        state.frames += 1;

        let out = match state.previous.as_ref() {
            Some(previous) if previous.same_dimensions(frame) => {
                self.blend(frame, previous, &mut state.invalid_runs)
            }
            _ => {
                state.invalid_runs = frame
                    .data()
                    .iter()
                    .map(|&d| u32::from(!is_valid_depth(d)))
                    .collect();
                frame.clone()
            }
        };

        state.previous = Some(out.clone());
        out
    }

    fn blend(&self, frame: &DepthImage, previous: &DepthImage, runs: &mut [u32]) -> DepthImage {
        let mut out = frame.clone();

        for ((value, &prev), run) in out
            .data_mut()
            .iter_mut()
            .zip(previous.data())
            .zip(runs.iter_mut())
        {
            let current = *value;
            if is_valid_depth(current) {
                *run = 0;
                if is_valid_depth(prev) && (current - prev).abs() < self.delta_m {
                    *value = prev + self.alpha * (current - prev);
                }
                continue;
            }

            *run = run.saturating_add(1);
            if self.persistence && is_valid_depth(prev) && *run <= self.persistence_frames {
                *value = prev;
            }
        }

        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filter(persistence: bool) -> TemporalFilter {
        TemporalFilter::new(&FilterConfig {
            temporal_alpha: 0.4,
            temporal_delta_m: 0.02,
            temporal_persistence: persistence,
            temporal_persistence_frames: 2,
            ..FilterConfig::default()
        })
    }

    #[test]
    fn test_first_frame_passes_through() {
        let mut state = FilterState::default();
        let frame = DepthImage::filled(4, 4, 1.2);
        assert_eq!(filter(true).process(&frame, &mut state), frame);
        assert_eq!(state.frames_processed(), 1);
        assert!(state.previous().is_some());
    }

    #[test]
    fn test_steady_scene_unchanged() {
        let mut state = FilterState::default();
        let frame = DepthImage::filled(4, 4, 0.7);
        let f = filter(true);
        for _ in 0..5 {
            assert_eq!(f.process(&frame, &mut state), frame);
        }
    }

    #[test]
    fn test_small_flicker_is_damped() {
        let mut state = FilterState::default();
        let f = filter(true);
        f.process(&DepthImage::filled(1, 1, 1.00), &mut state);
        let out = f.process(&DepthImage::filled(1, 1, 1.01), &mut state);
        assert!((out.distance(0, 0) - 1.004).abs() < 1e-5);
    }

    #[test]
    fn test_large_change_passes_through() {
        let mut state = FilterState::default();
        let f = filter(true);
        f.process(&DepthImage::filled(1, 1, 1.0), &mut state);
        let out = f.process(&DepthImage::filled(1, 1, 0.4), &mut state);
        assert_eq!(out.distance(0, 0), 0.4);
    }

    #[test]
    fn test_persistence_fills_dropouts() {
        let f = filter(true);
        let mut state = FilterState::default();
        f.process(&DepthImage::filled(1, 1, 1.0), &mut state);
        let out = f.process(&DepthImage::filled(1, 1, 0.0), &mut state);
        assert_eq!(out.distance(0, 0), 1.0);

        let f = filter(false);
        let mut state = FilterState::default();
        f.process(&DepthImage::filled(1, 1, 1.0), &mut state);
        let out = f.process(&DepthImage::filled(1, 1, 0.0), &mut state);
        assert_eq!(out.distance(0, 0), 0.0);
    }

    #[test]
    fn test_resolution_change_replaces_history() {
        let f = filter(true);
        let mut state = FilterState::default();
        f.process(&DepthImage::filled(2, 2, 1.0), &mut state);
        let frame = DepthImage::filled(3, 3, 1.01);
        assert_eq!(f.process(&frame, &mut state), frame);
        assert_eq!(state.previous().unwrap().width(), 3);
    }

    #[test]
    fn test_persistence_expires_after_limit() {
        let f = filter(true);
        let mut state = FilterState::default();
        f.process(&DepthImage::filled(2, 1, 0.3), &mut state);

        let blind = DepthImage::filled(2, 1, 0.0);
        assert_eq!(f.process(&blind, &mut state).distance(0, 0), 0.3);
        assert_eq!(f.process(&blind, &mut state).distance(0, 0), 0.3);
        for _ in 0..1000 {
            assert_eq!(f.process(&blind, &mut state).distance(0, 0), 0.0);
        }
        assert_eq!(state.previous().unwrap().distance(1, 0), 0.0);

        // A fresh reading is taken as is and restarts the hold window
        let out = f.process(&DepthImage::filled(2, 1, 0.9), &mut state);
        assert_eq!(out.distance(0, 0), 0.9);
        assert_eq!(f.process(&blind, &mut state).distance(0, 0), 0.9);
    }

    #[test]
    fn test_intermittent_dropouts_keep_value() {
        let f = filter(true);
        let mut state = FilterState::default();
        let valid = DepthImage::filled(1, 1, 1.0);
        let blind = DepthImage::filled(1, 1, 0.0);

        f.process(&valid, &mut state);
        for _ in 0..10 {
            assert_eq!(f.process(&blind, &mut state).distance(0, 0), 1.0);
            assert_eq!(f.process(&valid, &mut state).distance(0, 0), 1.0);
        }
    }
}
