use super::*;
use crate::config::{DebounceConfig, OutputConfig};
use crate::detector::ObstacleSignal;
use crate::error::OutputError;
use crate::frame::{CameraId, ColorImage, PixelFormat};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;

/// Sink that keeps every message, optionally failing on one channel
#[derive(Default)]
pub(crate) struct RecordingSink {
    pub messages: Mutex<Vec<OutputMessage>>,
    pub fail_channel: Option<String>,
}

impl RecordingSink {
    pub(crate) fn channels(&self) -> Vec<String> {
        self.messages
            .lock()
            .iter()
            .map(|m| m.channel.clone())
            .collect()
    }
}

#[async_trait]
impl OutputSink for RecordingSink {
    async fn publish(&self, message: OutputMessage) -> Result<(), OutputError> {
        if self.fail_channel.as_deref() == Some(message.channel.as_str()) {
            return Err(OutputError::PublishFailed {
                channel: message.channel,
                details: "refused".to_string(),
            });
        }
        self.messages.lock().push(message);
        Ok(())
    }

    fn name(&self) -> &str {
        "recording"
    }
}

fn signal(left: bool, right: bool, proximity: f32) -> ObstacleSignal {
    ObstacleSignal {
        left_blocked: left,
        right_blocked: right,
        average_proximity_m: proximity,
    }
}

#[tokio::test]
async fn test_signal_published_on_three_channels() {
    let sink = Arc::new(RecordingSink::default());
    let config = OutputConfig::default();
    let mut publisher = SignalPublisher::new(&config.topics, &DebounceConfig::default(), sink.clone());

    let published = publisher
        .publish(CameraId::DepthA, signal(false, true, 0.42))
        .await
        .unwrap();
    assert!(published.right_blocked);

    assert_eq!(
        sink.channels(),
        vec!["depth_detection", "obstacle_detection/left", "obstacle_detection/right"]
    );

    let messages = sink.messages.lock();
    assert!(matches!(messages[0].payload, Payload::Float32(p) if p == 0.42));
    assert!(matches!(messages[1].payload, Payload::Bool(false)));
    assert!(matches!(messages[2].payload, Payload::Bool(true)));
}

#[tokio::test]
async fn test_debounced_signal_per_source() {
    let sink = Arc::new(RecordingSink::default());
    let config = OutputConfig::default();
    let debounce = DebounceConfig {
        enabled: true,
        enter_frames: 2,
        exit_frames: 1,
    };
    let mut publisher = SignalPublisher::new(&config.topics, &debounce, sink.clone());
    assert!(publisher.debouncing());

    let first = publisher.publish(CameraId::DepthA, signal(false, true, 1.0)).await.unwrap();
    assert!(!first.right_blocked);
    // The other source has its own history
    let other = publisher.publish(CameraId::DepthB, signal(false, true, 1.0)).await.unwrap();
    assert!(!other.right_blocked);
    let second = publisher.publish(CameraId::DepthA, signal(false, true, 1.0)).await.unwrap();
    assert!(second.right_blocked);
}

#[tokio::test]
async fn test_signal_publish_failure_is_reported() {
    let sink = Arc::new(RecordingSink {
        fail_channel: Some("obstacle_detection/left".to_string()),
        ..RecordingSink::default()
    });
    let config = OutputConfig::default();
    let mut publisher = SignalPublisher::new(&config.topics, &DebounceConfig::default(), sink.clone());

    let result = publisher.publish(CameraId::DepthB, signal(true, false, 2.0)).await;
    assert!(matches!(result, Err(OutputError::PublishFailed { .. })));
    assert_eq!(sink.channels(), vec!["depth_detection"]);
}

#[tokio::test]
async fn test_color_frames_routed_per_source() {
    let sink = Arc::new(RecordingSink::default());
    let publisher = ImagePublisher::new(&OutputConfig::default(), sink.clone());
    let image = ColorImage::filled(32, 24, PixelFormat::Bgr8, [1, 2, 3]);

    for id in CameraId::ALL {
        publisher.publish_color(id, &image).await.unwrap();
    }

    assert_eq!(
        sink.channels(),
        vec![
            "rs_node/camera1/compressed_video",
            "rs_node/camera2/compressed_video",
            "rgb_cam1/compressed",
            "rgb_cam2/compressed",
        ]
    );

    let messages = sink.messages.lock();
    let frame_ids: Vec<_> = messages
        .iter()
        .map(|m| match &m.payload {
            Payload::CompressedImage(img) => {
                assert_eq!(img.format, "jpeg");
                assert_eq!(img.size_bytes, img.data.len());
                img.frame_id.clone()
            }
            other => panic!("unexpected payload {:?}", other),
        })
        .collect();
    assert_eq!(
        frame_ids,
        vec![
            "camera_rgb_optical_frame",
            "camera_rgb_optical_frame",
            "rgb_camera_frame",
            "rgb_camera_frame",
        ]
    );
}

#[tokio::test]
async fn test_encode_failure_publishes_nothing() {
    let sink = Arc::new(RecordingSink::default());
    let publisher = ImagePublisher::new(&OutputConfig::default(), sink.clone());
    let broken = ColorImage::new(8, 8, PixelFormat::Bgr8, vec![0; 5]);

    let result = publisher.publish_color(CameraId::WebcamA, &broken).await;
    assert!(matches!(result, Err(ImagePublishError::Encode(_))));
    assert!(sink.messages.lock().is_empty());
}

#[test]
fn test_depth_channels_only_for_depth_sources() {
    let publisher = ImagePublisher::new(&OutputConfig::default(), Arc::new(RecordingSink::default()));
    assert_eq!(
        publisher.depth_channel(CameraId::DepthB),
        Some("rs_node/camera2/depth_video")
    );
    assert_eq!(publisher.depth_channel(CameraId::WebcamB), None);
}

#[tokio::test]
async fn test_broadcast_sink_without_subscribers() {
    let sink = BroadcastSink::new(4);
    assert_eq!(sink.subscriber_count(), 0);
    sink.publish(OutputMessage::new("depth_detection", Payload::Float32(1.0)))
        .await
        .unwrap();

    let mut rx = sink.subscribe();
    sink.publish(OutputMessage::new("obstacle_detection/left", Payload::Bool(true)))
        .await
        .unwrap();
    let received = rx.recv().await.unwrap();
    assert_eq!(received.channel, "obstacle_detection/left");
}

#[tokio::test]
async fn test_json_lines_sink_skips_images() {
    let sink = JsonLinesSink::new(Vec::new());
    sink.publish(OutputMessage::new(
        "rgb_cam1/compressed",
        Payload::CompressedImage(CompressedImage::jpeg("rgb_camera_frame", vec![0xFF, 0xD8])),
    ))
    .await
    .unwrap();
    sink.publish(OutputMessage::new("obstacle_detection/right", Payload::Bool(true)))
        .await
        .unwrap();

    let output = String::from_utf8(sink.into_inner()).unwrap();
    let lines: Vec<_> = output.lines().collect();
    assert_eq!(lines.len(), 1);

    let value: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
    assert_eq!(value["channel"], "obstacle_detection/right");
    assert_eq!(value["payload"]["type"], "Bool");
    assert_eq!(value["payload"]["value"], true);
}

#[tokio::test]
async fn test_fanout_continues_past_failing_sink() {
    let failing = Arc::new(RecordingSink {
        fail_channel: Some("depth_detection".to_string()),
        ..RecordingSink::default()
    });
    let healthy = Arc::new(RecordingSink::default());
    let sinks: Vec<Arc<dyn OutputSink>> = vec![failing.clone(), healthy.clone()];
    let fanout = FanoutSink::new(sinks);

    let result = fanout
        .publish(OutputMessage::new("depth_detection", Payload::Float32(0.5)))
        .await;
    assert!(result.is_err());
    assert_eq!(healthy.channels(), vec!["depth_detection"]);
}
