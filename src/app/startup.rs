use super::types::{Component, ComponentState};
use super::RovercamOrchestrator;
use crate::camera::{CameraBackend, CameraSourceManager};
use crate::error::{Result, RovercamError};
use crate::scheduler::FrameScheduler;
use std::sync::Arc;
use tracing::{error, info};

impl RovercamOrchestrator {
    /// Bring up the camera sources and build the scheduler.
    ///
    /// Fails with [`RovercamError::NoCamerasDetected`] when no source activates;
    /// no scheduler exists afterwards.
    pub async fn initialize(&mut self, backend: &mut dyn CameraBackend) -> Result<()> {
        info!("Initializing cameras with the {} backend", backend.name());
        self.set_component_state(Component::Cameras, ComponentState::Starting)
            .await;

        let manager = match CameraSourceManager::initialize(backend, &self.config.cameras) {
            Ok(manager) => manager,
            Err(e) => {
                self.set_component_state(Component::Cameras, ComponentState::Failed)
                    .await;
                error!("Failed to initialize cameras: {}", e);
                return Err(e);
            }
        };

        info!("{} camera sources active", manager.active_count());
        self.set_component_state(Component::Cameras, ComponentState::Running)
            .await;

        let scheduler = FrameScheduler::new(manager, &self.config, Arc::clone(&self.sink));
        scheduler.announce_channels();
        self.scheduler = Some(scheduler);
        self.set_component_state(Component::Scheduler, ComponentState::Stopped)
            .await;

        Ok(())
    }

    /// Spawn the frame scheduler on the runtime
    pub async fn start(&mut self) -> Result<()> {
        let mut scheduler = self.scheduler.take().ok_or_else(|| {
            RovercamError::system("Frame scheduler not initialized or already started")
        })?;

        self.set_component_state(Component::Scheduler, ComponentState::Starting)
            .await;

        let token = self.cancellation_token.child_token();
        self.scheduler_task = Some(tokio::spawn(async move { scheduler.run(token).await }));

        self.set_component_state(Component::Scheduler, ComponentState::Running)
            .await;
        info!("Frame scheduler running");
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.scheduler.is_some() || self.scheduler_task.is_some()
    }
}
