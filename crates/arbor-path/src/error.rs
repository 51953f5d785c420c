//! Errors raised while constructing or navigating paths.

use thiserror::Error;

/// Result type for path construction.
pub type PathResult<T> = Result<T, PathError>;

/// Path construction errors.
///
/// Both variants are raised synchronously by the call that was handed the
/// bad input; nothing in this crate defers an error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PathError {
    /// Malformed escaped path text.
    #[error("invalid path {input:?}: {reason}")]
    Parse { input: String, reason: String },
    /// An argument outside the domain of the operation, such as a negative
    /// ascent count.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

impl PathError {
    pub(crate) fn parse(input: &str, reason: impl Into<String>) -> Self {
        PathError::Parse {
            input: input.to_string(),
            reason: reason.into(),
        }
    }
}
