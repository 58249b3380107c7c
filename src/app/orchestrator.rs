use super::types::{Component, ComponentState, ShutdownReason};
use crate::config::RovercamConfig;
use crate::output::OutputSink;
use crate::scheduler::{FrameScheduler, SchedulerStats};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

pub(super) type SharedShutdownSender = Arc<Mutex<Option<oneshot::Sender<ShutdownReason>>>>;

#[derive(Clone)]
pub struct ShutdownHandle {
    sender: SharedShutdownSender,
}

impl ShutdownHandle {
    /// Only the first request, from here or a signal handler, counts
    pub async fn request(&self, reason: ShutdownReason) -> bool {
        match self.sender.lock().await.take() {
            Some(sender) => sender.send(reason).is_ok(),
            None => false,
        }
    }
}

/// Owns the camera manager and frame scheduler for one run of the process
pub struct RovercamOrchestrator {
    pub(super) config: RovercamConfig,
    pub(super) sink: Arc<dyn OutputSink>,

    pub(super) scheduler: Option<FrameScheduler>,
    pub(super) scheduler_task: Option<JoinHandle<SchedulerStats>>,
    pub(super) final_stats: Option<SchedulerStats>,

    // Lifecycle management
    pub(super) component_states: Mutex<BTreeMap<Component, ComponentState>>,
    pub(super) shutdown_sender: SharedShutdownSender,
    pub(super) shutdown_receiver: Option<oneshot::Receiver<ShutdownReason>>,
    pub(super) cancellation_token: CancellationToken,
}

impl RovercamOrchestrator {
    pub fn new(config: RovercamConfig, sink: Arc<dyn OutputSink>) -> Self {
        let (shutdown_sender, shutdown_receiver) = oneshot::channel();

        Self {
            config,
            sink,
            scheduler: None,
            scheduler_task: None,
            final_stats: None,
            component_states: Mutex::new(BTreeMap::new()),
            shutdown_sender: Arc::new(Mutex::new(Some(shutdown_sender))),
            shutdown_receiver: Some(shutdown_receiver),
            cancellation_token: CancellationToken::new(),
        }
    }

    pub fn config(&self) -> &RovercamConfig {
        &self.config
    }

    /// Handle that asks [`RovercamOrchestrator::run`] to return
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            sender: Arc::clone(&self.shutdown_sender),
        }
    }

    /// Statistics of the finished scheduler, available after shutdown
    pub fn final_stats(&self) -> Option<&SchedulerStats> {
        self.final_stats.as_ref()
    }

    pub(super) async fn set_component_state(&self, component: Component, state: ComponentState) {
        self.component_states.lock().await.insert(component, state);
        debug!("Component '{}' state changed to: {:?}", component, state);
    }

    pub async fn component_state(&self, component: Component) -> Option<ComponentState> {
        self.component_states.lock().await.get(&component).copied()
    }

    pub async fn component_states(&self) -> BTreeMap<Component, ComponentState> {
        self.component_states.lock().await.clone()
    }
}
