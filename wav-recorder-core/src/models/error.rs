use thiserror::Error;

/// Errors that can occur while recording or writing a WAV file.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CaptureError {
    /// The output file could not be created, written, or seeked.
    #[error("io error: {0}")]
    Io(String),

    #[error("no capture device available")]
    DeviceNotAvailable,

    /// The capture device failed to open or start.
    #[error("device error: {0}")]
    Device(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A lifecycle call that the current state does not allow.
    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<std::io::Error> for CaptureError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e.to_string())
    }
}

impl CaptureError {
    /// Whether this error came from the capture device rather than the file.
    pub fn is_device_error(&self) -> bool {
        matches!(self, Self::DeviceNotAvailable | Self::Device(_))
    }
}
