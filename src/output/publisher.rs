use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, error};

use super::encode::ImageEncoder;
use super::sink::{CompressedImage, OutputMessage, OutputSink, Payload};
use crate::config::{DebounceConfig, OutputConfig, TopicConfig};
use crate::detector::{ObstacleDebouncer, ObstacleSignal};
use crate::error::{EncodeError, OutputError};
use crate::frame::{CameraId, ColorImage, SourceKind};

/// Publishes compressed color frames on the per-source image channels
pub struct ImagePublisher {
    topics: TopicConfig,
    color_frame_id: String,
    webcam_frame_id: String,
    encoder: ImageEncoder,
    sink: Arc<dyn OutputSink>,
}

#[derive(Debug, thiserror::Error)]
pub enum ImagePublishError {
    #[error(transparent)]
    Encode(#[from] EncodeError),

    #[error(transparent)]
    Output(#[from] OutputError),
}

impl ImagePublisher {
    pub fn new(config: &OutputConfig, sink: Arc<dyn OutputSink>) -> Self {
        Self {
            topics: config.topics.clone(),
            color_frame_id: config.color_frame_id.clone(),
            webcam_frame_id: config.webcam_frame_id.clone(),
            encoder: ImageEncoder::new(config.jpeg_quality),
            sink,
        }
    }

    pub fn color_channel(&self, source: CameraId) -> &str {
        match source {
            CameraId::DepthA => &self.topics.depth_a_color,
            CameraId::DepthB => &self.topics.depth_b_color,
            CameraId::WebcamA => &self.topics.webcam_a,
            CameraId::WebcamB => &self.topics.webcam_b,
        }
    }

    /// Depth-derived image channel; advertised but never populated
    pub fn depth_channel(&self, source: CameraId) -> Option<&str> {
        match source {
            CameraId::DepthA => Some(&self.topics.depth_a_depth),
            CameraId::DepthB => Some(&self.topics.depth_b_depth),
            CameraId::WebcamA | CameraId::WebcamB => None,
        }
    }

    fn frame_id(&self, source: CameraId) -> &str {
        match source.kind() {
            SourceKind::Depth => &self.color_frame_id,
            SourceKind::Color => &self.webcam_frame_id,
        }
    }

    pub async fn publish_color(
        &self,
        source: CameraId,
        image: &ColorImage,
    ) -> Result<(), ImagePublishError> {
        let jpeg = self.encoder.encode_jpeg(image)?;
        let channel = self.color_channel(source);
        let payload = Payload::CompressedImage(CompressedImage::jpeg(self.frame_id(source), jpeg));

        self.sink.publish(OutputMessage::new(channel, payload)).await?;
        debug!("Published {} color frame on {}", source, channel);
        Ok(())
    }
}

/// Routes obstacle signals to the left, right and proximity channels.
///
/// Both depth sources publish on the same signal channels. When debouncing is
/// enabled each source keeps its own debouncer.
pub struct SignalPublisher {
    left_channel: String,
    right_channel: String,
    proximity_channel: String,
    debounce: DebounceConfig,
    debouncers: HashMap<CameraId, ObstacleDebouncer>,
    sink: Arc<dyn OutputSink>,
}

impl SignalPublisher {
    pub fn new(topics: &TopicConfig, debounce: &DebounceConfig, sink: Arc<dyn OutputSink>) -> Self {
        Self {
            left_channel: topics.left_obstacle.clone(),
            right_channel: topics.right_obstacle.clone(),
            proximity_channel: topics.proximity.clone(),
            debounce: debounce.clone(),
            debouncers: HashMap::new(),
            sink,
        }
    }

    pub fn channels(&self) -> [&str; 3] {
        [&self.left_channel, &self.right_channel, &self.proximity_channel]
    }

    pub fn debouncing(&self) -> bool {
        self.debounce.enabled
    }

    /// Publishes proximity, left and right in that order and returns the
    /// signal as published.
    pub async fn publish(
        &mut self,
        source: CameraId,
        raw: ObstacleSignal,
    ) -> Result<ObstacleSignal, OutputError> {
        let signal = if self.debounce.enabled {
            let debounce = &self.debounce;
            self.debouncers
                .entry(source)
                .or_insert_with(|| ObstacleDebouncer::new(debounce))
                .update(raw)
        } else {
            raw
        };

        let messages = [
            OutputMessage::new(
                &self.proximity_channel,
                Payload::Float32(signal.average_proximity_m),
            ),
            OutputMessage::new(&self.left_channel, Payload::Bool(signal.left_blocked)),
            OutputMessage::new(&self.right_channel, Payload::Bool(signal.right_blocked)),
        ];

        for message in messages {
            let channel = message.channel.clone();
            if let Err(e) = self.sink.publish(message).await {
                error!("Failed to publish {} signal on {}: {}", source, channel, e);
                return Err(e);
            }
        }

        debug!(
            "{} signal: left={} right={} proximity={:.3}m",
            source, signal.left_blocked, signal.right_blocked, signal.average_proximity_m
        );
        Ok(signal)
    }
}
