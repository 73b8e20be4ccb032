use crate::providers::scrub::sanitize_api_error;
use thiserror::Error;

// ─── Pipeline error taxonomy ─────────────────────────────────────────────────

/// Errors surfaced by the generation pipeline.
///
/// Stage-local failures (`Decode` on a single frame, `Upstream` for OCR and
/// search) are recovered inside the pipeline and never reach the caller as a
/// failed turn. `Cancelled` is a distinct terminal path, not a failure.
#[derive(Debug, Error)]
pub enum ChatError {
    // ── Fails fast, before any network call ─────────────────────────────
    #[error("configuration: {0}")]
    Configuration(String),

    // ── Transport ───────────────────────────────────────────────────────
    #[error("provider returned HTTP {status}: {body}")]
    Transport { status: u16, body: String },

    #[error("connection failed: {0}")]
    Connection(String),

    // ── Decoding ────────────────────────────────────────────────────────
    #[error("decode: {0}")]
    Decode(String),

    // ── Degraded pre-stages (OCR, search) ───────────────────────────────
    #[error("upstream stage degraded: {0}")]
    Upstream(String),

    #[error("generation cancelled")]
    Cancelled,

    // ── Persistence and other plumbing ──────────────────────────────────
    #[error("storage: {0}")]
    Storage(#[from] anyhow::Error),
}

impl ChatError {
    /// Build a transport error from a raw response body. Secrets are
    /// scrubbed and the body is truncated.
    pub fn transport(status: u16, raw_body: &str) -> Self {
        Self::Transport {
            status,
            body: sanitize_api_error(raw_body),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Short diagnostic shown to the user inside an error sentinel message.
    pub fn user_summary(&self) -> String {
        match self {
            Self::Configuration(message) => format!("Configuration problem: {message}"),
            Self::Transport { status, body } => match *status {
                401 | 403 => format!("The provider rejected the credentials (HTTP {status})."),
                404 => format!("The provider endpoint or model was not found (HTTP 404): {body}"),
                429 => "The provider is rate limiting requests (HTTP 429). Try again shortly."
                    .to_string(),
                500..=599 => format!("The provider had an internal error (HTTP {status})."),
                200..=299 => format!("The provider reported an error mid-stream: {body}"),
                _ => format!("The provider returned HTTP {status}: {body}"),
            },
            Self::Connection(message) => format!("Could not reach the provider: {message}"),
            Self::Decode(message) => format!("The provider response could not be read: {message}"),
            Self::Upstream(message) => format!("A preparation step failed: {message}"),
            Self::Cancelled => "Generation cancelled.".to_string(),
            Self::Storage(_) => "The conversation could not be saved.".to_string(),
        }
    }
}

impl From<reqwest::Error> for ChatError {
    fn from(error: reqwest::Error) -> Self {
        match error.status() {
            Some(status) => Self::Transport {
                status: status.as_u16(),
                body: sanitize_api_error(&error.to_string()),
            },
            None => Self::Connection(sanitize_api_error(&error.to_string())),
        }
    }
}

/// Shorthand result type for the pipeline.
pub type Result<T> = std::result::Result<T, ChatError>;
