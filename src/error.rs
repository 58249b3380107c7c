use thiserror::Error;

#[derive(Error, Debug)]
pub enum RovercamError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("Deserialization error: {0}")]
    Deserialization(#[from] toml::de::Error),

    #[error("Camera error: {0}")]
    Camera(#[from] CameraError),

    #[error("Encoding error: {0}")]
    Encode(#[from] EncodeError),

    #[error("Output error: {0}")]
    Output(#[from] OutputError),

    #[error("No cameras detected")]
    NoCamerasDetected,

    #[error("System error: {message}")]
    System { message: String },
}

/// Failures raised by camera backends and the source manager
#[derive(Error, Debug)]
pub enum CameraError {
    #[error("Failed to open device {device}: {details}")]
    DeviceOpen { device: String, details: String },

    #[error("Failed to start pipeline for {serial}: {details}")]
    PipelineStart { serial: String, details: String },

    #[error("Camera configuration error: {details}")]
    Configuration { details: String },

    #[error("Frame read failed on {device}: {details}")]
    Read { device: String, details: String },

    #[error("Invalid frame: {details}")]
    InvalidFrame { details: String },
}

#[derive(Error, Debug)]
pub enum EncodeError {
    #[error("JPEG encoding failed: {details}")]
    Jpeg { details: String },

    #[error("Frame buffer size {actual} does not match {width}x{height}x3")]
    BufferSize {
        width: u32,
        height: u32,
        actual: usize,
    },
}

#[derive(Error, Debug)]
pub enum OutputError {
    #[error("Publish to {channel} failed: {details}")]
    PublishFailed { channel: String, details: String },

    #[error("Serialization of output message failed: {0}")]
    Json(#[from] serde_json::Error),
}

impl RovercamError {
    pub fn system<S: Into<String>>(message: S) -> Self {
        Self::System {
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, RovercamError>;
