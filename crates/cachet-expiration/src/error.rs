//! Error types for the expiration crate.

use thiserror::Error;

/// Errors that can occur while maintaining cache bounds.
#[derive(Debug, Error)]
pub enum ExpirationError {
    /// Database connection or operation failed.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Expiration bounds are missing or invalid.
    #[error("Invalid expiration config: {0}")]
    InvalidConfig(String),

    /// A URL could not be normalized.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// `is_entry_expired` was called on an engine without a max age.
    #[error("Expiration check requires max_age to be configured")]
    MissingMaxAge,

    /// The response cache failed.
    #[error(transparent)]
    Cache(#[from] cachet_types::Error),

    /// A blocking index task could not complete.
    #[error("Index task failed: {0}")]
    Task(String),

    /// Creating the index directory failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for expiration operations.
pub type Result<T> = std::result::Result<T, ExpirationError>;

impl From<ExpirationError> for cachet_types::Error {
    fn from(err: ExpirationError) -> Self {
        match err {
            ExpirationError::MissingMaxAge => cachet_types::Error::ExpirationWithoutMaxAge,
            ExpirationError::InvalidConfig(message) => cachet_types::Error::InvalidConfig(message),
            ExpirationError::InvalidUrl(e) => cachet_types::Error::InvalidUrl(e.to_string()),
            ExpirationError::Cache(e) => e,
            other => cachet_types::Error::Store(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conversion_into_shared_error() {
        let missing: cachet_types::Error = ExpirationError::MissingMaxAge.into();
        assert_eq!(missing, cachet_types::Error::ExpirationWithoutMaxAge);

        let task: cachet_types::Error = ExpirationError::Task("cancelled".into()).into();
        assert!(matches!(task, cachet_types::Error::Store(m) if m.contains("cancelled")));
    }
}
