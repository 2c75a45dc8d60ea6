use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Session is not connected")]
    NotConnected,

    #[error("Credential has expired")]
    CredentialExpired,

    #[error("Invalid credential: {0}")]
    InvalidCredential(String),

    #[error("Unsupported media type: {0}")]
    UnsupportedMediaType(String),

    #[error("File exceeds size limit: {size} bytes (max {max})")]
    FileTooLarge { size: u64, max: u64 },

    #[error("Invalid transition: {0}")]
    InvalidTransition(String),

    #[error("Task not found: {0}")]
    TaskNotFound(String),

    #[error("Message not found: {0}")]
    MessageNotFound(u64),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(anyhow::Error),

    #[error("Validation error: {0}")]
    Validation(#[from] validator::ValidationErrors),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl From<config::ConfigError> for ClientError {
    fn from(err: config::ConfigError) -> Self {
        ClientError::Config(anyhow::Error::new(err))
    }
}

impl ClientError {
    /// Whether a retry of the same call may succeed.
    ///
    /// Network failures, timeouts, rate limiting and 5xx responses are
    /// transient; everything else is a permanent failure for the caller.
    pub fn is_transient(&self) -> bool {
        match self {
            ClientError::Transport(_) => true,
            ClientError::Http(err) => {
                err.is_timeout()
                    || err.is_connect()
                    || err
                        .status()
                        .map(|s| s.is_server_error() || s.as_u16() == 429)
                        .unwrap_or(false)
            }
            ClientError::Api { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }

    /// Whether the error means the user has to authenticate again.
    pub fn requires_reauth(&self) -> bool {
        match self {
            ClientError::CredentialExpired | ClientError::InvalidCredential(_) => true,
            ClientError::Api { status, .. } => *status == 401,
            _ => false,
        }
    }
}
