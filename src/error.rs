//! Error types for the fetch pipelines

use std::time::Duration;

use thiserror::Error;

use crate::render::Readiness;

/// Result type alias for pipeline operations
pub type Result<T> = std::result::Result<T, Error>;

/// Broad classification of an [`Error`], used by callers to decide whether
/// re-running the whole pipeline makes sense.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The rendering backend could not be started. Fatal for the run.
    Startup,
    /// A bounded wait or request ran out of time.
    Timeout,
    /// The page or protocol did not look the way we expected.
    Structural,
    /// Connection or filesystem trouble outside the page itself.
    Transport,
    /// Bad input from the caller.
    Config,
}

/// Errors that can occur while fetching, decoding or normalizing a page
#[derive(Error, Debug)]
pub enum Error {
    /// The browser session could not be started
    #[error("Session start failed: {0}")]
    SessionStartFailure(String),

    /// Navigation to the target failed
    #[error("Navigation failed: {0}")]
    NavigationFailure(String),

    /// No unique frame with the given title appeared in time
    #[error("Frame titled '{title}' not found ({matches} matching frames)")]
    FrameNotFound { title: String, matches: usize },

    /// The current frame path does not resolve to a live frame right now.
    /// Bounded waits treat this as "not ready yet".
    #[error("Frame '{0}' is not available")]
    FrameUnavailable(String),

    /// The element id is not present in the current frame
    #[error("Element '{0}' not found")]
    ElementNotFound(String),

    /// An element never satisfied a readiness predicate
    #[error(
        "Timed out after {:.2}s waiting for '{element_id}' to become {predicate}",
        .elapsed.as_secs_f64()
    )]
    WaitTimeout {
        predicate: Readiness,
        element_id: String,
        elapsed: Duration,
    },

    /// A UI action could not be performed
    #[error("Interaction failed: {0}")]
    InteractionFailure(String),

    /// In-page evaluation returned something unusable
    #[error("Script execution failed: {0}")]
    ScriptError(String),

    /// The HTTP request did not complete in time
    #[error("Fetching {url} timed out after {seconds}s")]
    FetchTimeout { url: String, seconds: u64 },

    /// The server answered with a non-2xx status
    #[error("HTTP {status} {reason}")]
    HttpStatusFailure { status: u16, reason: String },

    /// Network error
    #[error("Network error: {0}")]
    NetworkError(String),

    /// The response declared a content encoding we do not decode
    #[error("Unsupported content encoding '{0}'")]
    UnsupportedEncoding(String),

    /// The compressed body was corrupt
    #[error("Failed to decode response body: {0}")]
    DecodeFailure(String),

    /// The markup could not be read as text
    #[error("Failed to parse markup: {0}")]
    ParseFailure(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    ConfigError(String),

    /// Writing the output failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::SessionStartFailure(_) => ErrorKind::Startup,
            Error::WaitTimeout { .. } | Error::FetchTimeout { .. } => ErrorKind::Timeout,
            Error::NetworkError(_) | Error::Io(_) => ErrorKind::Transport,
            Error::ConfigError(_) => ErrorKind::Config,
            Error::NavigationFailure(_)
            | Error::FrameNotFound { .. }
            | Error::FrameUnavailable(_)
            | Error::ElementNotFound(_)
            | Error::InteractionFailure(_)
            | Error::ScriptError(_)
            | Error::HttpStatusFailure { .. }
            | Error::UnsupportedEncoding(_)
            | Error::DecodeFailure(_)
            | Error::ParseFailure(_) => ErrorKind::Structural,
        }
    }

    /// Whether re-running the pipeline unchanged could plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self.kind(), ErrorKind::Timeout | ErrorKind::Transport)
    }

    /// Name of the pipeline stage that produced this error.
    pub fn stage(&self) -> &'static str {
        match self {
            Error::SessionStartFailure(_)
            | Error::NavigationFailure(_)
            | Error::FrameNotFound { .. }
            | Error::FrameUnavailable(_)
            | Error::ElementNotFound(_)
            | Error::WaitTimeout { .. }
            | Error::InteractionFailure(_)
            | Error::ScriptError(_) => "render",
            Error::FetchTimeout { .. }
            | Error::HttpStatusFailure { .. }
            | Error::NetworkError(_) => "fetch",
            Error::UnsupportedEncoding(_) | Error::DecodeFailure(_) => "decode",
            Error::ParseFailure(_) => "normalize",
            Error::ConfigError(_) => "config",
            Error::Io(_) => "write",
        }
    }
}
