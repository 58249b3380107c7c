mod debounce;
mod obstacle;

pub use debounce::{DebounceState, ObstacleDebouncer};
pub use obstacle::{Detection, ObstacleDetector, ObstacleSignal, SampleCounts};
