use serde::Serialize;

use super::obstacle::ObstacleSignal;
use crate::config::DebounceConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DebounceState {
    Clear,
    BlockedLeft,
    BlockedRight,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Side {
    Left,
    Right,
}

impl Side {
    fn of(signal: &ObstacleSignal) -> Option<Side> {
        if signal.right_blocked {
            Some(Side::Right)
        } else if signal.left_blocked {
            Some(Side::Left)
        } else {
            None
        }
    }

    fn blocked_state(self) -> DebounceState {
        match self {
            Side::Left => DebounceState::BlockedLeft,
            Side::Right => DebounceState::BlockedRight,
        }
    }
}

/// Optional hysteresis over per-frame signals of one depth source.
///
/// A side is reported blocked after `enter_frames` consecutive frames blocked on
/// that side, and released after `exit_frames` consecutive frames that are not.
/// Proximity is never altered.
#[derive(Debug, Clone)]
pub struct ObstacleDebouncer {
    enter_frames: u32,
    exit_frames: u32,
    state: DebounceState,
    candidate: Option<(Side, u32)>,
    release_count: u32,
}

impl ObstacleDebouncer {
    pub fn new(config: &DebounceConfig) -> Self {
        Self {
            enter_frames: config.enter_frames.max(1),
            exit_frames: config.exit_frames.max(1),
            state: DebounceState::Clear,
            candidate: None,
            release_count: 0,
        }
    }

    pub fn state(&self) -> DebounceState {
        self.state
    }

    pub fn update(&mut self, raw: ObstacleSignal) -> ObstacleSignal {
        let side = Side::of(&raw);

        match self.state {
            DebounceState::Clear => self.track_candidate(side),
            DebounceState::BlockedLeft | DebounceState::BlockedRight => {
                let held = if self.state == DebounceState::BlockedLeft {
                    Side::Left
                } else {
                    Side::Right
                };

                if side == Some(held) {
                    self.release_count = 0;
                } else {
                    self.release_count += 1;
                    if self.release_count >= self.exit_frames {
                        self.state = DebounceState::Clear;
                        self.release_count = 0;
                        self.candidate = None;
                        self.track_candidate(side);
                    }
                }
            }
        }

        ObstacleSignal {
            left_blocked: self.state == DebounceState::BlockedLeft,
            right_blocked: self.state == DebounceState::BlockedRight,
            average_proximity_m: raw.average_proximity_m,
        }
    }

    fn track_candidate(&mut self, side: Option<Side>) {
        let Some(side) = side else {
            self.candidate = None;
            return;
        };

        let count = match self.candidate {
            Some((candidate, count)) if candidate == side => count + 1,
            _ => 1,
        };

        if count >= self.enter_frames {
            self.state = side.blocked_state();
            self.candidate = None;
            self.release_count = 0;
        } else {
            self.candidate = Some((side, count));
        }
    }
}
