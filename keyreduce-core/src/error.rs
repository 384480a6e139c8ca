//! Error types for keyreduce

use thiserror::Error;

/// Main error type for keyreduce operations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// Malformed options or a source curve that cannot be reduced at all.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Invalid sampling range: {0}")]
    InvalidRange(String),

    /// The normal equations of a fit are degenerate. Only a zero-length
    /// segment produces this, so it signals a broken controller invariant.
    #[error("Singular fit: {0}")]
    SingularFit(String),

    #[error("Fit failed: {0}")]
    FitFailed(String),

    #[error("Thread pool error: {0}")]
    ThreadPool(String),
}

impl Error {
    /// Internal invariant violations, as opposed to per-curve failures.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::SingularFit(_))
    }
}

/// Result type alias for keyreduce operations
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_classification() {
        assert!(Error::SingularFit("zero-length segment".into()).is_fatal());
        assert!(!Error::FitFailed("nan".into()).is_fatal());
        assert!(!Error::InvalidInput("error < 0".into()).is_fatal());
    }

    #[test]
    fn test_display() {
        let err = Error::InvalidRange("step must be positive".into());
        assert_eq!(err.to_string(), "Invalid sampling range: step must be positive");
    }
}
