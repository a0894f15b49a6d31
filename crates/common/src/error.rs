use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Exchange API error: {0}")]
    Exchange(String),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    #[error("Notifier error: {0}")]
    Notifier(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Failures fetching market data that the next poll cycle may clear.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Error::Exchange(_)
                | Error::Http(_)
                | Error::Timeout(_)
                | Error::Json(_)
                | Error::MalformedResponse(_)
        )
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
