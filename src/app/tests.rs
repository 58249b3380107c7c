use super::*;
use crate::camera::{DeliveryPattern, SimulatedBackend};
use crate::config::RovercamConfig;
use crate::error::RovercamError;
use crate::output::BroadcastSink;
use std::sync::Arc;
use std::time::Duration;

fn create_test_config() -> RovercamConfig {
    let mut config = RovercamConfig::default();
    config.cameras.depth_a.serial = "A".to_string();
    config.cameras.depth_b.serial = "B".to_string();
    config.cameras.isolate_blocking_sources = false;
    config
}

fn create_orchestrator() -> (RovercamOrchestrator, Arc<BroadcastSink>) {
    let sink = Arc::new(BroadcastSink::new(256));
    let orchestrator = RovercamOrchestrator::new(create_test_config(), sink.clone());
    (orchestrator, sink)
}

#[tokio::test]
async fn test_orchestrator_creation() {
    let (orchestrator, _sink) = create_orchestrator();
    assert!(!orchestrator.is_initialized());
    assert!(orchestrator.component_states().await.is_empty());
    assert!(orchestrator.final_stats().is_none());
}

#[tokio::test]
async fn test_no_cameras_prevents_scheduler() {
    let (mut orchestrator, _sink) = create_orchestrator();
    let mut backend = SimulatedBackend::new(0);

    let result = orchestrator.initialize(&mut backend).await;
    assert!(matches!(result, Err(RovercamError::NoCamerasDetected)));
    assert!(!orchestrator.is_initialized());
    assert_eq!(
        orchestrator.component_state(Component::Cameras).await,
        Some(ComponentState::Failed)
    );

    // Nothing to start
    assert!(orchestrator.start().await.is_err());
}

#[tokio::test]
async fn test_initialize_then_shutdown_without_start() {
    let (mut orchestrator, _sink) = create_orchestrator();
    let mut backend = SimulatedBackend::new(1).with_depth_serial("A");

    orchestrator.initialize(&mut backend).await.unwrap();
    assert!(orchestrator.is_initialized());
    assert_eq!(
        orchestrator.component_state(Component::Cameras).await,
        Some(ComponentState::Running)
    );

    let exit_code = orchestrator.shutdown().await.unwrap();
    assert_eq!(exit_code, 0);
    assert_eq!(orchestrator.final_stats().map(|s| s.ticks), Some(0));
    assert_eq!(
        orchestrator.component_state(Component::Cameras).await,
        Some(ComponentState::Stopped)
    );
}

#[tokio::test(start_paused = true)]
async fn test_run_until_shutdown_requested() {
    let (mut orchestrator, sink) = create_orchestrator();
    let mut receiver = sink.subscribe();
    let mut backend = SimulatedBackend::new(1)
        .with_depth_serial("A")
        .with_delivery(DeliveryPattern::Always);

    orchestrator.initialize(&mut backend).await.unwrap();
    orchestrator.start().await.unwrap();
    assert_eq!(
        orchestrator.component_state(Component::Scheduler).await,
        Some(ComponentState::Running)
    );

    let handle = orchestrator.shutdown_handle();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert!(handle.request(ShutdownReason::UserRequest).await);
        // A second request is ignored
        assert!(!handle.request(ShutdownReason::UserRequest).await);
    });

    let exit_code = orchestrator.run().await.unwrap();
    assert_eq!(exit_code, 0);

    let stats = orchestrator.final_stats().cloned().unwrap();
    assert!(stats.ticks >= 4);
    assert_eq!(stats.signals_published, stats.ticks);
    assert_eq!(
        orchestrator.component_state(Component::Scheduler).await,
        Some(ComponentState::Stopped)
    );

    let first = receiver.recv().await.unwrap();
    assert_eq!(first.channel, "rs_node/camera1/compressed_video");
}

#[tokio::test]
async fn test_start_twice_fails() {
    let (mut orchestrator, _sink) = create_orchestrator();
    let mut backend = SimulatedBackend::new(1).with_depth_serial("A");

    orchestrator.initialize(&mut backend).await.unwrap();
    orchestrator.start().await.unwrap();
    assert!(matches!(
        orchestrator.start().await,
        Err(RovercamError::System { .. })
    ));
    assert_eq!(orchestrator.shutdown().await.unwrap(), 0);
}
