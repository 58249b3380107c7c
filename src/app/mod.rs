mod orchestrator;
mod runtime;
mod shutdown;
mod startup;
mod types;

#[cfg(test)]
mod tests;

pub use orchestrator::{RovercamOrchestrator, ShutdownHandle};
pub use types::{Component, ComponentState, ShutdownReason};
