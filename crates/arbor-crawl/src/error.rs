//! Crawl and resource errors.

use thiserror::Error;

/// Result type for resource operations.
pub type ResourceResult<T> = Result<T, ResourceError>;

/// Failure to retrieve the status of one resource.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResourceError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("permission denied: {0}")]
    PermissionDenied(String),
    #[error("not a directory: {0}")]
    NotDirectory(String),
    #[error("io error: {0}")]
    Io(String),
}

impl From<std::io::Error> for ResourceError {
    fn from(err: std::io::Error) -> Self {
        use std::io::ErrorKind;
        match err.kind() {
            ErrorKind::NotFound => ResourceError::NotFound(err.to_string()),
            ErrorKind::PermissionDenied => ResourceError::PermissionDenied(err.to_string()),
            ErrorKind::NotADirectory => ResourceError::NotDirectory(err.to_string()),
            _ => ResourceError::Io(err.to_string()),
        }
    }
}

/// Terminal failure of a crawl.
///
/// Only the root can fail a crawl. Failures below the root are logged,
/// counted in [`crate::CrawlProgress`], and otherwise skipped.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CrawlError {
    #[error("cannot stat crawl root: {0}")]
    RootStatus(#[source] ResourceError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn io_errors_map_by_kind() {
        let err: ResourceError = io::Error::new(io::ErrorKind::NotFound, "gone").into();
        assert!(matches!(err, ResourceError::NotFound(_)));

        let err: ResourceError = io::Error::new(io::ErrorKind::PermissionDenied, "no").into();
        assert!(matches!(err, ResourceError::PermissionDenied(_)));

        let err: ResourceError = io::Error::other("disk on fire").into();
        assert_eq!(err, ResourceError::Io("disk on fire".into()));
    }

    #[test]
    fn root_failure_keeps_cause() {
        use std::error::Error as _;

        let err = CrawlError::RootStatus(ResourceError::NotFound("/srv".into()));
        assert_eq!(err.to_string(), "cannot stat crawl root: not found: /srv");
        assert!(err.source().is_some());
    }
}
