mod encode;
mod publisher;
mod sink;
#[cfg(test)]
pub(crate) mod tests;

pub use encode::ImageEncoder;
pub use publisher::{ImagePublishError, ImagePublisher, SignalPublisher};
pub use sink::{BroadcastSink, CompressedImage, FanoutSink, JsonLinesSink, OutputMessage, OutputSink, Payload};
