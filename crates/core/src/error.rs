/// Result alias that carries the custom [`VisualiserError`] type.
pub type Result<T> = std::result::Result<T, VisualiserError>;

/// Common error type for the core crate.
#[derive(Debug, thiserror::Error)]
pub enum VisualiserError {
    /// Free-form failure that does not belong to a more specific category.
    #[error("{0}")]
    Message(String),
    #[error(transparent)]
    Source(#[from] SourceError),
    #[error(transparent)]
    Recording(#[from] RecordingError),
    #[error(transparent)]
    Mode(#[from] ModeError),
    /// Wrapper around standard IO errors.
    #[error("{0}")]
    Io(#[from] std::io::Error),
    #[error("invalid configuration: {0}")]
    Json(#[from] serde_json::Error),
    #[error("image encoding failed: {0}")]
    Image(#[from] image::ImageError),
}

impl VisualiserError {
    /// Creates a new error that simply wraps the provided message.
    pub fn msg<T: Into<String>>(msg: T) -> Self {
        Self::Message(msg.into())
    }
}

impl From<&str> for VisualiserError {
    fn from(value: &str) -> Self {
        Self::msg(value)
    }
}

impl From<String> for VisualiserError {
    fn from(value: String) -> Self {
        Self::Message(value)
    }
}

/// Failures while attaching an audio source.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SourceError {
    /// The user (or platform) refused access to the capture device.
    #[error("permission denied")]
    PermissionDenied,
    /// The file or stream could not be fetched or decoded into samples.
    #[error("unable to decode audio: {0}")]
    DecodeFailure(String),
}

impl SourceError {
    pub(crate) fn decode<T: std::fmt::Display>(reason: T) -> Self {
        Self::DecodeFailure(reason.to_string())
    }
}

/// Failures while starting a recording.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RecordingError {
    #[error("no audio source is attached")]
    NoSource,
    #[error("a recording is already in progress")]
    AlreadyRecording,
    #[error("recording is not permitted for this session")]
    NotPermitted,
    #[error("failed to create the combined stream: {0}")]
    StreamCreationFailure(String),
}

/// Mode lookup failures. The renderer resolves these by keeping the current
/// mode, so they only surface through parsing helpers.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ModeError {
    #[error("unknown mode `{0}`")]
    UnknownMode(String),
}
