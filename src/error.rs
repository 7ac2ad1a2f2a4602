//! Error taxonomy for the session layer.
//!
//! DESIGN
//! ======
//! `SessionError` is what callers of [`crate::SessionClient`] see.
//! `RefreshError` describes a failed refresh exchange and is `Clone` because
//! one exchange outcome is handed to every request queued behind it.

/// Why a refresh exchange did not produce a new access token.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RefreshError {
    /// No refresh token was stored when the exchange was needed.
    #[error("no refresh token stored")]
    MissingRefreshToken,

    /// The backend answered the refresh call with a non-success status.
    #[error("refresh rejected: status {status}")]
    Rejected { status: u16, body: String },

    /// The refresh call never got a response.
    #[error("refresh request failed: {0}")]
    Transport(String),

    /// The refresh token could not be read from storage.
    #[error("refresh token unreadable: {0}")]
    Storage(String),

    /// The refresh response had no usable `access` field.
    #[error("malformed refresh response: {0}")]
    MalformedResponse(String),

    /// The task driving the exchange was dropped before it finished.
    #[error("refresh abandoned before completion")]
    Abandoned,
}

/// Failures reading or writing persisted credentials.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("token store io failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("token store is corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),

    #[error("token store lock poisoned")]
    Poisoned,
}

/// Errors produced by session client operations.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// A configuration value could not be parsed.
    #[error("config parse failed: {0}")]
    Config(String),

    /// Credential storage could not be read or written.
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// The HTTP request failed before a response arrived.
    #[error("request failed: {0}")]
    Transport(String),

    /// The backend rejected the credentials and no recovery was possible.
    #[error("unauthorized: {body}")]
    Unauthorized { body: String },

    /// The access token expired and refreshing it failed. The session is gone.
    #[error("session expired: {0}")]
    RefreshFailed(#[from] RefreshError),

    /// The backend returned a non-success status.
    #[error("API response error: status {status}")]
    Status { status: u16, body: String },

    /// A response body could not be deserialized.
    #[error("response decode failed: {0}")]
    Decode(String),

    /// A header value contained characters HTTP does not allow.
    #[error("invalid header value: {0}")]
    InvalidHeader(#[from] reqwest::header::InvalidHeaderValue),

    /// Username/password login did not produce a session.
    #[error("login failed: {0}")]
    LoginFailed(String),

    /// Input was rejected locally before any request was sent.
    #[error("validation failed: {0}")]
    Validation(String),
}

impl SessionError {
    /// Stable machine-readable code for the error class.
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Config(_) => "E_CONFIG_PARSE",
            Self::Storage(_) => "E_STORAGE",
            Self::Transport(_) => "E_TRANSPORT",
            Self::Unauthorized { .. } => "E_UNAUTHORIZED",
            Self::RefreshFailed(_) => "E_SESSION_EXPIRED",
            Self::Status { .. } => "E_API_RESPONSE",
            Self::Decode(_) => "E_DECODE",
            Self::InvalidHeader(_) => "E_INVALID_HEADER",
            Self::LoginFailed(_) => "E_LOGIN_FAILED",
            Self::Validation(_) => "E_VALIDATION",
        }
    }

    /// Whether repeating the same call later could succeed.
    #[must_use]
    pub fn retryable(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::Status { status: 429 | 500..=599, .. })
    }

    /// True when the error means the user has to log in again.
    #[must_use]
    pub fn requires_login(&self) -> bool {
        matches!(self, Self::Unauthorized { .. } | Self::RefreshFailed(_))
    }
}

#[cfg(test)]
#[path = "error_test.rs"]
mod tests;
