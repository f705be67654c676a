//! Stream error types.

use thiserror::Error;

/// An error surfaced by the model stream.
///
/// Reported through [`StreamCallbacks::on_error`](crate::StreamCallbacks::on_error);
/// the bridge itself never fails.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum StreamError {
    /// An `error` part emitted by the model layer.
    #[error("model stream error: {0}")]
    Part(String),

    /// The transport failed while producing the next part.
    #[error("stream transport error: {0}")]
    Transport(String),
}

impl StreamError {
    /// The message without the variant prefix.
    pub fn message(&self) -> &str {
        match self {
            Self::Part(m) | Self::Transport(m) => m,
        }
    }
}
