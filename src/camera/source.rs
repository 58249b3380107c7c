use serde::Serialize;
use std::time::SystemTime;

use crate::frame::{CameraId, SourceKind};

/// Static description of a hardware slot plus its activation outcome
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CameraSource {
    pub id: CameraId,
    pub kind: SourceKind,
    /// Serial number for depth cameras, device path for webcams
    pub identity: String,
    pub active: bool,
    pub resolution: (u32, u32),
    pub target_fps: u32,
}

impl CameraSource {
    pub fn new(id: CameraId, identity: String, resolution: (u32, u32), target_fps: u32) -> Self {
        Self {
            id,
            kind: id.kind(),
            identity,
            active: false,
            resolution,
            target_fps,
        }
    }

    pub fn status_label(&self) -> &'static str {
        if self.active {
            "ON"
        } else {
            "OFF"
        }
    }
}

/// Per-source liveness counters
#[derive(Debug, Clone, Default, Serialize)]
pub struct SourceStatus {
    pub frames_received: u64,
    pub misses: u64,
    pub consecutive_misses: u64,
    pub last_frame_at: Option<SystemTime>,
}

impl SourceStatus {
    pub fn record_frame(&mut self, captured_at: SystemTime) {
        self.frames_received += 1;
        self.consecutive_misses = 0;
        self.last_frame_at = Some(captured_at);
    }

    pub fn record_miss(&mut self) {
        self.misses += 1;
        self.consecutive_misses += 1;
    }

    pub fn hit_rate(&self) -> f64 {
        let total = self.frames_received + self.misses;
        if total == 0 {
            0.0
        } else {
            self.frames_received as f64 / total as f64
        }
    }
}
