use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::io::Write;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, trace, warn};

use crate::error::OutputError;

/// Encoded image as handed to the transport
#[derive(Debug, Clone, Serialize)]
pub struct CompressedImage {
    pub format: String,
    pub frame_id: String,
    pub size_bytes: usize,
    #[serde(skip)]
    pub data: Arc<Vec<u8>>,
}

impl CompressedImage {
    pub fn jpeg(frame_id: &str, data: Vec<u8>) -> Self {
        Self {
            format: "jpeg".to_string(),
            frame_id: frame_id.to_string(),
            size_bytes: data.len(),
            data: Arc::new(data),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "value")]
pub enum Payload {
    CompressedImage(CompressedImage),
    Bool(bool),
    Float32(f32),
}

#[derive(Debug, Clone, Serialize)]
pub struct OutputMessage {
    pub channel: String,
    pub stamp: DateTime<Utc>,
    pub payload: Payload,
}

impl OutputMessage {
    pub fn new(channel: &str, payload: Payload) -> Self {
        Self {
            channel: channel.to_string(),
            stamp: Utc::now(),
            payload,
        }
    }

    pub fn is_image(&self) -> bool {
        matches!(self.payload, Payload::CompressedImage(_))
    }
}

/// Transport the scheduler publishes images and signals through
#[async_trait]
pub trait OutputSink: Send + Sync {
    async fn publish(&self, message: OutputMessage) -> Result<(), OutputError>;

    fn name(&self) -> &str;
}

/// In-process publish/subscribe transport over a tokio broadcast channel
pub struct BroadcastSink {
    sender: broadcast::Sender<OutputMessage>,
}

impl BroadcastSink {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<OutputMessage> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

#[async_trait]
impl OutputSink for BroadcastSink {
    async fn publish(&self, message: OutputMessage) -> Result<(), OutputError> {
        // No subscribers is not an error; the message is simply not observed
        match self.sender.send(message) {
            Ok(receivers) => trace!("Message delivered to {} subscribers", receivers),
            Err(e) => trace!("No subscribers for {}", e.0.channel),
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "broadcast"
    }
}

/// Writes signal messages as JSON lines; images are skipped
pub struct JsonLinesSink<W: Write + Send> {
    writer: Mutex<W>,
}

impl<W: Write + Send> JsonLinesSink<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }

    pub fn into_inner(self) -> W {
        self.writer.into_inner()
    }
}

#[async_trait]
impl<W: Write + Send> OutputSink for JsonLinesSink<W> {
    async fn publish(&self, message: OutputMessage) -> Result<(), OutputError> {
        if message.is_image() {
            return Ok(());
        }

        let line = serde_json::to_string(&message)?;
        let mut writer = self.writer.lock();
        writeln!(writer, "{}", line)
            .and_then(|_| writer.flush())
            .map_err(|e| OutputError::PublishFailed {
                channel: message.channel.clone(),
                details: e.to_string(),
            })
    }

    fn name(&self) -> &str {
        "json-lines"
    }
}

/// Publishes to several sinks; a failing sink does not stop the others
pub struct FanoutSink {
    sinks: Vec<Arc<dyn OutputSink>>,
}

impl FanoutSink {
    pub fn new(sinks: Vec<Arc<dyn OutputSink>>) -> Self {
        Self { sinks }
    }
}

#[async_trait]
impl OutputSink for FanoutSink {
    async fn publish(&self, message: OutputMessage) -> Result<(), OutputError> {
        let mut first_error = None;

        for sink in &self.sinks {
            if let Err(e) = sink.publish(message.clone()).await {
                warn!("Sink {} failed to publish {}: {}", sink.name(), message.channel, e);
                first_error.get_or_insert(e);
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => {
                debug!("Published {} to {} sinks", message.channel, self.sinks.len());
                Ok(())
            }
        }
    }

    fn name(&self) -> &str {
        "fanout"
    }
}
