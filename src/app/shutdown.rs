use super::types::{Component, ComponentState};
use super::RovercamOrchestrator;
use crate::error::Result;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{error, info, warn};

const SCHEDULER_STOP_TIMEOUT: Duration = Duration::from_secs(10);

impl RovercamOrchestrator {
    /// Stop the scheduler and release every camera; returns the process exit code
    pub async fn shutdown(&mut self) -> Result<i32> {
        info!("Beginning graceful shutdown");

        self.cancellation_token.cancel();

        let mut exit_code = 0;

        if let Some(task) = self.scheduler_task.take() {
            self.set_component_state(Component::Scheduler, ComponentState::Stopping)
                .await;

            match timeout(SCHEDULER_STOP_TIMEOUT, task).await {
                Ok(Ok(stats)) => {
                    info!(
                        "Scheduler stopped after {} ticks, {} encode failures, {} publish failures",
                        stats.ticks, stats.encode_failures, stats.publish_failures
                    );
                    self.final_stats = Some(stats);
                    self.set_component_state(Component::Scheduler, ComponentState::Stopped)
                        .await;
                }
                Ok(Err(e)) => {
                    error!("Scheduler task failed: {}", e);
                    self.set_component_state(Component::Scheduler, ComponentState::Failed)
                        .await;
                    exit_code = 1;
                }
                Err(_) => {
                    error!("Scheduler stop timeout");
                    self.set_component_state(Component::Scheduler, ComponentState::Failed)
                        .await;
                    exit_code = 1;
                }
            }
        }

        // Initialized but never started; dropping it releases the cameras
        if let Some(scheduler) = self.scheduler.take() {
            warn!("Releasing cameras of a scheduler that never ran");
            self.final_stats = Some(scheduler.stats().clone());
            drop(scheduler);
            self.set_component_state(Component::Scheduler, ComponentState::Stopped)
                .await;
        }

        if self.component_state(Component::Cameras).await == Some(ComponentState::Running) {
            self.set_component_state(Component::Cameras, ComponentState::Stopped)
                .await;
        }

        info!("Graceful shutdown completed with exit code: {}", exit_code);
        Ok(exit_code)
    }
}
