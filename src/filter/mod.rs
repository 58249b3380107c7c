mod spatial;
mod temporal;

pub use spatial::SpatialFilter;
pub use temporal::{FilterState, TemporalFilter};

use std::collections::HashMap;
use tracing::{trace, warn};

use crate::config::FilterConfig;
use crate::frame::{CameraId, DepthImage};

/// Noise reduction applied to every raw depth frame before detection.
///
/// Spatial hole filling and smoothing run first, then temporal smoothing
/// against the history of the same source. History is kept for the whole run.
pub struct DepthFilterChain {
    spatial: SpatialFilter,
    temporal: TemporalFilter,
    states: HashMap<CameraId, FilterState>,
}

impl DepthFilterChain {
    pub fn new(config: &FilterConfig) -> Self {
        Self {
            spatial: SpatialFilter::new(config),
            temporal: TemporalFilter::new(config),
            states: HashMap::new(),
        }
    }

    pub fn filter(&mut self, raw: &DepthImage, source_id: CameraId) -> DepthImage {
        let spatial = self.spatial.process(raw);

        let state = self.states.entry(source_id).or_default();
        if let Some(previous) = state.previous() {
            if !previous.same_dimensions(&spatial) {
                warn!(
                    "Depth resolution of {} changed from {}x{} to {}x{}; temporal history replaced",
                    source_id,
                    previous.width(),
                    previous.height(),
                    spatial.width(),
                    spatial.height()
                );
            }
        }

        let filtered = self.temporal.process(&spatial, state);
        trace!(
            "Filtered depth frame {} for {} ({} valid pixels)",
            state.frames_processed(),
            source_id,
            filtered.valid_count()
        );
        filtered
    }

    pub fn state(&self, source_id: CameraId) -> Option<&FilterState> {
        self.states.get(&source_id)
    }
}
