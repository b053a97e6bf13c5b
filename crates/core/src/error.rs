use serde::{Deserialize, Serialize};

/// Result alias that carries the custom [`StudioError`] type.
pub type Result<T> = std::result::Result<T, StudioError>;

/// Failures raised while turning an opaque byte buffer into an [`AudioAsset`].
///
/// [`AudioAsset`]: crate::AudioAsset
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    /// The container or codec could not be recognised.
    #[error("unsupported audio format: {0}")]
    UnsupportedFormat(String),
    /// Decoding finished without producing a single sample frame.
    #[error("audio data contains no samples")]
    Empty,
    /// The stream ended before all declared frames were decoded.
    #[error("audio data is truncated: {0}")]
    Truncated(String),
    /// A newer load superseded this decode before it finished.
    #[error("decode was cancelled")]
    Cancelled,
}

/// Failures raised by transport commands. A failed command never mutates the
/// transport state.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TransportError {
    #[error("no audio asset is loaded")]
    NoAsset,
    #[error("invalid seek target {0}")]
    InvalidSeekTarget(f64),
}

/// Recoverable problems found while analysing a single sample window.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AnalysisFault {
    #[error("non-finite sample at window index {index}")]
    NonFiniteSample { index: usize },
    #[error("non-finite magnitude in bucket {bucket}")]
    NonFiniteBucket { bucket: usize },
    #[error("frequency transform failed: {0}")]
    Transform(String),
}

/// Coarse classification forwarded to observers alongside error messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorKind {
    Decode,
    Transport,
    Analysis,
    Config,
}

/// Common error type for the core crate.
#[derive(Debug, thiserror::Error)]
pub enum StudioError {
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Analysis(#[from] AnalysisFault),
    /// Rejected configuration value.
    #[error("invalid configuration: {0}")]
    Config(String),
    /// A mode identifier that does not name any visualisation mode.
    #[error("unknown visualisation mode `{0}`")]
    UnknownMode(String),
    /// Free-form message for failures without a dedicated variant.
    #[error("{0}")]
    Message(String),
    /// Wrapper around standard IO errors.
    #[error("{0}")]
    Io(#[from] std::io::Error),
    #[error("{0}")]
    Json(#[from] serde_json::Error),
}

impl StudioError {
    /// Creates a new error that simply wraps the provided message.
    pub fn msg<T: Into<String>>(msg: T) -> Self {
        Self::Message(msg.into())
    }

    pub fn config<T: Into<String>>(msg: T) -> Self {
        Self::Config(msg.into())
    }

    /// Returns the category reported to observers for this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Decode(_) | Self::Io(_) => ErrorKind::Decode,
            Self::Transport(_) => ErrorKind::Transport,
            Self::Analysis(_) => ErrorKind::Analysis,
            Self::Config(_) | Self::UnknownMode(_) | Self::Json(_) | Self::Message(_) => {
                ErrorKind::Config
            }
        }
    }
}

impl From<&str> for StudioError {
    fn from(value: &str) -> Self {
        Self::msg(value)
    }
}

impl From<String> for StudioError {
    fn from(value: String) -> Self {
        Self::Message(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_wrapped_errors() {
        assert_eq!(StudioError::from(DecodeError::Empty).kind(), ErrorKind::Decode);
        assert_eq!(
            StudioError::from(TransportError::NoAsset).kind(),
            ErrorKind::Transport
        );
        assert_eq!(StudioError::config("bad").kind(), ErrorKind::Config);
    }

    #[test]
    fn messages_are_readable() {
        let err = StudioError::from(TransportError::InvalidSeekTarget(f64::NAN));
        assert!(err.to_string().contains("invalid seek target"));
        assert_eq!(
            StudioError::UnknownMode("laser".into()).to_string(),
            "unknown visualisation mode `laser`"
        );
    }
}
