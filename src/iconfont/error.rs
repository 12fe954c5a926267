//! Error types for iconfont.cn operations.
//!
//! # Security Note
//!
//! No variant carries the session token. Messages describe what failed,
//! never the credential that was used.

use std::path::PathBuf;

use thiserror::Error;

/// Result type for iconfont operations.
pub type IconfontResult<T> = Result<T, IconfontError>;

/// Errors that can occur while talking to iconfont.cn or logging in.
#[derive(Debug, Error)]
pub enum IconfontError {
    /// The operation needs a session token and none is available.
    #[error("Not logged in: call `login` with a session token, run `auto_login`, or pass `token`")]
    AuthenticationRequired,

    /// The service rejected the session token (HTTP 401/403).
    #[error("Authentication failed (HTTP {status}): the session token is invalid or expired")]
    AuthenticationFailed {
        /// HTTP status returned by the service.
        status: u16,
    },

    /// The HTTP request did not complete within the configured timeout.
    #[error("Request timed out")]
    RequestTimedOut,

    /// The requested icon or project does not exist.
    #[error("Not found: {what}")]
    NotFound {
        /// Description of the missing resource.
        what: String,
    },

    /// Caller input was malformed.
    #[error("Invalid input: {message}")]
    ValidationFailed {
        /// Description of what is wrong.
        message: String,
    },

    /// Auto-login did not observe a session token before its deadline.
    #[error("Login timed out after {} seconds without receiving a session token", timeout_ms / 1000)]
    LoginTimedOut {
        /// The overall timeout that elapsed.
        timeout_ms: u64,
    },

    /// The scriptable browser could not be started.
    ///
    /// Recoverable: the login flow falls back to the system browser.
    #[error("Browser automation unavailable: {reason}")]
    AutomationUnavailable {
        /// Why the browser could not be launched.
        reason: String,
    },

    /// Non-success HTTP status other than authentication failures.
    #[error("HTTP error {status}")]
    Http {
        /// HTTP status returned by the service.
        status: u16,
    },

    /// The service answered with an error envelope.
    #[error("iconfont.cn returned error {code}: {message}")]
    Remote {
        /// Application-level code from the response envelope.
        code: i64,
        /// Message from the response envelope.
        message: String,
    },

    /// The response body could not be decoded.
    #[error("Failed to decode response")]
    Decode {
        /// The underlying JSON error.
        #[source]
        source: serde_json::Error,
    },

    /// Connection-level failure other than a timeout.
    #[error("Request failed: {message}")]
    Transport {
        /// Description of the failure.
        message: String,
    },

    /// Local file I/O failed.
    #[error("Failed to write file: {path}")]
    Io {
        /// Path being written.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },
}

impl IconfontError {
    /// Creates a not found error.
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound { what: what.into() }
    }

    /// Creates a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::ValidationFailed {
            message: message.into(),
        }
    }

    /// Creates an automation unavailable error.
    pub fn automation_unavailable(reason: impl Into<String>) -> Self {
        Self::AutomationUnavailable {
            reason: reason.into(),
        }
    }

    /// Creates a transport error.
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    /// Maps a non-success HTTP status to its error kind.
    #[must_use]
    pub fn from_status(status: u16) -> Self {
        match status {
            401 | 403 => Self::AuthenticationFailed { status },
            404 => Self::not_found("resource (HTTP 404)"),
            _ => Self::Http { status },
        }
    }

    /// Returns `true` for errors caused by a missing or rejected token.
    #[must_use]
    pub const fn is_auth_error(&self) -> bool {
        matches!(
            self,
            Self::AuthenticationRequired | Self::AuthenticationFailed { .. }
        )
    }
}
