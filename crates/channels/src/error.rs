/// Crate-wide result type for channel operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Typed channel errors shared across the per-channel crates.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Input payload or parameter is invalid.
    #[error("invalid channel input: {message}")]
    InvalidInput { message: String },

    /// Credential blob is missing or does not match the channel kind.
    #[error("malformed credentials for {channel}: {message}")]
    BadCredentials { channel: String, message: String },

    /// The provider returned a non-success response.
    #[error("{channel} API error (status {status}): {body}")]
    Api {
        channel: String,
        status: u16,
        body: String,
    },

    /// JSON (de)serialization failed.
    #[error(transparent)]
    SerdeJson(#[from] serde_json::Error),
}

impl Error {
    #[must_use]
    pub fn invalid_input(message: impl std::fmt::Display) -> Self {
        Self::InvalidInput {
            message: message.to_string(),
        }
    }

    #[must_use]
    pub fn bad_credentials(channel: impl Into<String>, message: impl std::fmt::Display) -> Self {
        Self::BadCredentials {
            channel: channel.into(),
            message: message.to_string(),
        }
    }

    #[must_use]
    pub fn api(channel: impl Into<String>, status: u16, body: impl Into<String>) -> Self {
        Self::Api {
            channel: channel.into(),
            status,
            body: body.into(),
        }
    }
}
