use thiserror::Error;

use crate::audio::CaptureError;

/// Errors surfaced by the live voice session.
#[derive(Debug, Error)]
pub enum LiveError {
    /// The user is not entitled to live voice.
    #[error("live voice is a premium feature")]
    NotEntitled,

    /// A session is already connecting or open.
    #[error("a live session is already active")]
    AlreadyActive,

    /// The microphone could not be acquired.
    #[error("microphone unavailable: {0}")]
    PermissionDenied(#[source] CaptureError),

    /// The capture stream failed after the session opened.
    #[error("audio capture failed: {0}")]
    Capture(#[source] CaptureError),

    /// The configured audio formats cannot be streamed.
    #[error("invalid audio settings: {0}")]
    InvalidAudio(&'static str),

    /// The remote session could not be established.
    #[error("live connection failed: {0}")]
    Connection(String),

    #[error("no Gemini API key configured (set GEMINI_API_KEY)")]
    MissingApiKey,

    /// The link was closed before the message could be queued.
    #[error("live link is closed")]
    LinkClosed,

    #[error("failed to encode live message: {0}")]
    Encode(#[from] serde_json::Error),
}
