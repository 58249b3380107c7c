use super::*;
use crate::camera::{
    CameraBackend, ColorCapture, DeliveryPattern, DepthFrames, DepthPipeline, DepthStreamConfig,
    SimulatedBackend, SimulatedScene, WebcamStreamConfig,
};
use crate::config::RovercamConfig;
use crate::error::CameraError;
use crate::frame::{ColorImage, DepthImage, PixelFormat};
use crate::output::tests::RecordingSink;
use crate::output::Payload;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

fn create_test_config() -> RovercamConfig {
    let mut config = RovercamConfig::default();
    config.cameras.depth_a.serial = "A".to_string();
    config.cameras.depth_b.serial = "B".to_string();
    config.cameras.isolate_blocking_sources = false;
    config
}

fn scheduler_with(
    backend: &mut dyn CameraBackend,
    config: &RovercamConfig,
) -> (FrameScheduler, Arc<RecordingSink>) {
    let manager = CameraSourceManager::initialize(backend, &config.cameras).unwrap();
    let sink = Arc::new(RecordingSink::default());
    let scheduler = FrameScheduler::new(manager, config, sink.clone());
    (scheduler, sink)
}

#[tokio::test]
async fn test_no_frame_means_no_signal() {
    let config = create_test_config();
    let mut backend = SimulatedBackend::new(2)
        .with_depth_serial("A")
        .with_depth_serial("B")
        .with_delivery(DeliveryPattern::Never);
    let (mut scheduler, sink) = scheduler_with(&mut backend, &config);

    for _ in 0..5 {
        let report = scheduler.tick().await;
        assert!(report.signals.is_empty());
        assert_eq!(report.no_frame, vec![CameraId::DepthA, CameraId::DepthB]);
    }

    assert!(sink.messages.lock().is_empty());
    assert_eq!(scheduler.stats().misses_for(CameraId::DepthA), 5);
    assert_eq!(scheduler.stats().signals_published, 0);
    assert!(scheduler.filters().state(CameraId::DepthA).is_none());
}

#[tokio::test]
async fn test_depth_frame_publishes_color_and_signal() {
    let config = create_test_config();
    let mut backend = SimulatedBackend::new(1).with_depth_serial("A");
    let (mut scheduler, sink) = scheduler_with(&mut backend, &config);

    let report = scheduler.tick().await;
    assert_eq!(report.color_published, vec![CameraId::DepthA]);
    assert_eq!(report.signals.len(), 1);

    let (id, signal) = report.signals[0];
    assert_eq!(id, CameraId::DepthA);
    assert!(!signal.is_blocked());
    assert_eq!(signal.average_proximity_m, 0.7);

    assert_eq!(
        sink.channels(),
        vec![
            "rs_node/camera1/compressed_video",
            "depth_detection",
            "obstacle_detection/left",
            "obstacle_detection/right",
        ]
    );
}

#[tokio::test]
async fn test_obstacle_scene_blocks_right() {
    let config = create_test_config();
    let mut backend = SimulatedBackend::new(1)
        .with_depth_serial("A")
        .with_scene(SimulatedScene::with_obstacle());
    let (mut scheduler, sink) = scheduler_with(&mut backend, &config);

    for _ in 0..3 {
        let report = scheduler.tick().await;
        let (_, signal) = report.signals[0];
        assert!(signal.right_blocked);
        assert!(!signal.left_blocked);
    }

    let messages = sink.messages.lock();
    let right: Vec<_> = messages
        .iter()
        .filter(|m| m.channel == "obstacle_detection/right")
        .collect();
    assert_eq!(right.len(), 3);
    assert!(matches!(right[0].payload, Payload::Bool(true)));
}

#[tokio::test]
async fn test_sources_visited_in_fixed_order() {
    let config = create_test_config();
    let mut backend = SimulatedBackend::new(2)
        .with_depth_serial("A")
        .with_depth_serial("B")
        .with_webcam(&config.cameras.webcam_a.path)
        .with_webcam(&config.cameras.webcam_b.path);
    let (mut scheduler, sink) = scheduler_with(&mut backend, &config);

    let report = scheduler.tick().await;
    assert_eq!(report.color_published, CameraId::ALL.to_vec());
    assert_eq!(
        report.signals.iter().map(|(id, _)| *id).collect::<Vec<_>>(),
        vec![CameraId::DepthA, CameraId::DepthB]
    );

    let images: Vec<_> = sink
        .messages
        .lock()
        .iter()
        .filter(|m| m.is_image())
        .map(|m| m.channel.clone())
        .collect();
    assert_eq!(
        images,
        vec![
            "rs_node/camera1/compressed_video",
            "rs_node/camera2/compressed_video",
            "rgb_cam1/compressed",
            "rgb_cam2/compressed",
        ]
    );
}

#[tokio::test]
async fn test_inactive_sources_are_skipped() {
    let config = create_test_config();
    let mut backend = SimulatedBackend::new(2).with_webcam(&config.cameras.webcam_b.path);
    let (mut scheduler, _sink) = scheduler_with(&mut backend, &config);

    let report = scheduler.tick().await;
    assert_eq!(report.color_published, vec![CameraId::WebcamB]);
    assert!(report.signals.is_empty());
    assert!(report.no_frame.is_empty());
    assert_eq!(scheduler.stats().misses_for(CameraId::DepthA), 0);
}

#[tokio::test(start_paused = true)]
async fn test_run_ticks_at_fixed_rate_until_cancelled() {
    let config = create_test_config();
    let mut backend = SimulatedBackend::new(1)
        .with_depth_serial("A")
        .with_scene(SimulatedScene {
            depth_resolution: (64, 48),
            ..SimulatedScene::default()
        });
    let (mut scheduler, sink) = scheduler_with(&mut backend, &config);
    assert_eq!(scheduler.tick_period(), Duration::from_millis(66));

    let token = CancellationToken::new();
    let cancel = token.clone();
    tokio::spawn(async move {
        // Ticks fire at 0, 66, ..., 594 ms
        tokio::time::sleep(Duration::from_millis(630)).await;
        cancel.cancel();
    });

    let stats = scheduler.run(token).await;
    assert_eq!(stats.ticks, 10);
    assert_eq!(stats.overruns, 0);
    assert_eq!(stats.signals_published, 10);
    assert_eq!(sink.channels().len(), 10 * 4);

    // Cameras are released once the loop ends
    assert!(scheduler.manager().is_active(CameraId::DepthA));
    assert!(scheduler.tick().await.signals.is_empty());
}

/// Depth camera whose color stream delivers truncated buffers
struct TruncatedColorBackend;

struct TruncatedColorPipeline;

impl DepthPipeline for TruncatedColorPipeline {
    fn poll_for_frames(&mut self) -> Option<DepthFrames> {
        Some(DepthFrames {
            color: Some(ColorImage::new(16, 16, PixelFormat::Bgr8, vec![0; 7])),
            depth: Some(DepthImage::filled(848, 480, 1.0)),
        })
    }

    fn stop(&mut self) {}
}

impl CameraBackend for TruncatedColorBackend {
    fn device_count(&self) -> usize {
        1
    }

    fn start_depth_pipeline(
        &mut self,
        _config: &DepthStreamConfig,
    ) -> Result<Box<dyn DepthPipeline>, CameraError> {
        Ok(Box::new(TruncatedColorPipeline))
    }

    fn open_color_capture(
        &mut self,
        config: &WebcamStreamConfig,
    ) -> Result<Box<dyn ColorCapture>, CameraError> {
        Err(CameraError::DeviceOpen {
            device: config.path.clone(),
            details: "not present".to_string(),
        })
    }

    fn name(&self) -> &str {
        "truncated"
    }
}

#[tokio::test]
async fn test_encode_failure_does_not_suppress_signal() {
    let config = create_test_config();
    let mut backend = TruncatedColorBackend;
    let (mut scheduler, sink) = scheduler_with(&mut backend, &config);

    let report = scheduler.tick().await;
    assert!(report.color_published.is_empty());
    assert_eq!(report.signals.len(), 1);
    assert_eq!(report.signals[0].1.average_proximity_m, 1.0);
    assert_eq!(scheduler.stats().encode_failures, 1);
    assert!(sink.messages.lock().iter().all(|m| !m.is_image()));
}

#[tokio::test]
async fn test_debounced_signals_through_scheduler() {
    let mut config = create_test_config();
    config.detector.debounce.enabled = true;
    config.detector.debounce.enter_frames = 2;
    let mut backend = SimulatedBackend::new(1)
        .with_depth_serial("A")
        .with_scene(SimulatedScene::with_obstacle());
    let (mut scheduler, _sink) = scheduler_with(&mut backend, &config);

    let first = scheduler.tick().await;
    assert!(!first.signals[0].1.right_blocked);
    let second = scheduler.tick().await;
    assert!(second.signals[0].1.right_blocked);
}

#[tokio::test]
async fn test_camera_release_keeps_runtime_responsive() {
    let mut config = create_test_config();
    config.cameras.isolate_blocking_sources = true;
    let mut backend = SimulatedBackend::new(0)
        .with_webcam(&config.cameras.webcam_a.path)
        .with_webcam_delay(Duration::from_millis(300));
    let (mut scheduler, _sink) = scheduler_with(&mut backend, &config);

    let beats = Arc::new(std::sync::atomic::AtomicU32::new(0));
    let counter = Arc::clone(&beats);
    let heartbeat = tokio::spawn(async move {
        loop {
            tokio::time::sleep(Duration::from_millis(5)).await;
            counter.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        }
    });

    let token = CancellationToken::new();
    token.cancel();
    let started = std::time::Instant::now();
    let stats = scheduler.run(token).await;
    let elapsed = started.elapsed();
    heartbeat.abort();

    assert_eq!(stats.ticks, 0);
    // The capture thread was mid-read, so release had to wait for it
    assert!(elapsed >= Duration::from_millis(100));
    assert!(beats.load(std::sync::atomic::Ordering::SeqCst) >= 5);
    assert!(scheduler.tick().await.color_published.is_empty());
}
