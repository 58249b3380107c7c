use serde::Serialize;
use std::collections::BTreeMap;
use std::time::SystemTime;

use crate::frame::CameraId;

/// Frame scheduler statistics
#[derive(Debug, Clone, Default, Serialize)]
pub struct SchedulerStats {
    pub ticks: u64,
    pub overruns: u64,
    pub frames: BTreeMap<CameraId, u64>,
    pub misses: BTreeMap<CameraId, u64>,
    pub images_published: u64,
    pub signals_published: u64,
    pub encode_failures: u64,
    pub publish_failures: u64,
    pub last_tick_time: Option<SystemTime>,
}

impl SchedulerStats {
    pub fn record_tick(&mut self) {
        self.ticks += 1;
        self.last_tick_time = Some(SystemTime::now());
    }

    pub fn record_overrun(&mut self) {
        self.overruns += 1;
    }

    pub fn record_frame(&mut self, source: CameraId) {
        *self.frames.entry(source).or_default() += 1;
    }

    pub fn record_miss(&mut self, source: CameraId) {
        *self.misses.entry(source).or_default() += 1;
    }

    pub fn record_image(&mut self) {
        self.images_published += 1;
    }

    pub fn record_signal(&mut self) {
        self.signals_published += 1;
    }

    pub fn record_encode_failure(&mut self) {
        self.encode_failures += 1;
    }

    pub fn record_publish_failure(&mut self) {
        self.publish_failures += 1;
    }

    pub fn frames_for(&self, source: CameraId) -> u64 {
        self.frames.get(&source).copied().unwrap_or(0)
    }

    pub fn misses_for(&self, source: CameraId) -> u64 {
        self.misses.get(&source).copied().unwrap_or(0)
    }

    /// Fraction of polls of `source` that delivered a frame
    pub fn hit_rate(&self, source: CameraId) -> f64 {
        let frames = self.frames_for(source);
        let total = frames + self.misses_for(source);
        if total == 0 {
            0.0
        } else {
            frames as f64 / total as f64
        }
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
