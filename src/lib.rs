pub mod app;
pub mod camera;
pub mod config;
pub mod detector;
pub mod error;
pub mod filter;
pub mod frame;
pub mod output;
pub mod scheduler;

pub use app::{Component, ComponentState, RovercamOrchestrator, ShutdownHandle, ShutdownReason};
pub use camera::{CameraBackend, CameraSourceManager, PollOutcome, SimulatedBackend, SimulatedScene};
pub use config::RovercamConfig;
pub use detector::{ObstacleDetector, ObstacleSignal};
pub use error::{Result, RovercamError};
pub use filter::DepthFilterChain;
pub use frame::{CameraId, ColorImage, DepthImage, FrameSet};
pub use output::{BroadcastSink, JsonLinesSink, OutputMessage, OutputSink};
pub use scheduler::{FrameScheduler, SchedulerStats, TickReport};
