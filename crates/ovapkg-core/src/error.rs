//! Error types for the ovapkg core library.

use std::path::PathBuf;

/// The main error type for ovapkg operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// I/O error with optional path context.
    #[error("I/O error{}: {source}", path.as_ref().map(|p| format!(" at '{}'", p.display())).unwrap_or_default())]
    Io {
        source: std::io::Error,
        path: Option<PathBuf>,
    },

    /// Malformed input: XML, TAR, a descriptor missing required sections,
    /// a property value out of range for its qualifier.
    #[error("invalid input: {message}")]
    InvalidInput { message: String },

    /// A referenced file-id, disk-id, profile, network, or property key
    /// does not exist in the descriptor.
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    /// InstanceID collision, duplicate file-id without `--force`, or an
    /// attempted self-overwrite of an open input package.
    #[error("conflict: {message}")]
    Conflict { message: String },

    /// A required helper tool is not installed and could not be located.
    #[error("required helper tool not available: {tool}")]
    Capability { tool: String },

    /// Environmental failure: insufficient disk space, permission denied,
    /// or another I/O failure the caller should treat as infrastructural
    /// rather than a malformed-input error.
    #[error("environmental error{}: {source}", path.as_ref().map(|p| format!(" at '{}'", p.display())).unwrap_or_default())]
    Environmental {
        source: std::io::Error,
        path: Option<PathBuf>,
    },

    /// The caller's cancellation token was observed set at a checkpoint.
    #[error("operation cancelled")]
    Cancelled,

    /// An internal invariant was violated. This indicates a bug in the
    /// factorization engine or descriptor model, not a user error.
    #[error("internal error: {message}")]
    Internal { message: String },
}

/// A specialized Result type for ovapkg operations.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Create an I/O error with path context.
    pub fn io(source: std::io::Error, path: impl Into<PathBuf>) -> Self {
        Self::Io {
            source,
            path: Some(path.into()),
        }
    }

    /// Create an I/O error without path context.
    pub fn io_simple(source: std::io::Error) -> Self {
        Self::Io { source, path: None }
    }

    /// Create an invalid-input error.
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    /// Create a not-found error for the given lookup kind (e.g. `"disk"`,
    /// `"property"`) and the id that was not found.
    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            id: id.into(),
        }
    }

    /// Create a conflict error.
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict {
            message: message.into(),
        }
    }

    /// Create a capability error for a missing helper tool.
    pub fn capability(tool: impl Into<String>) -> Self {
        Self::Capability { tool: tool.into() }
    }

    /// Create an environmental error with path context.
    pub fn environmental(source: std::io::Error, path: impl Into<PathBuf>) -> Self {
        Self::Environmental {
            source,
            path: Some(path.into()),
        }
    }

    /// Create an internal-invariant error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(source: std::io::Error) -> Self {
        Self::io_simple(source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_error_with_path() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err = Error::io(io_err, "/path/to/file.ovf");
        let msg = err.to_string();
        assert!(msg.contains("I/O error"));
        assert!(msg.contains("/path/to/file.ovf"));
    }

    #[test]
    fn test_io_error_without_path() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err = Error::io_simple(io_err);
        let msg = err.to_string();
        assert!(msg.contains("I/O error"));
        assert!(!msg.contains("at '"));
    }

    #[test]
    fn test_invalid_input_error() {
        let err = Error::invalid_input("malformed XML");
        assert!(err.to_string().contains("invalid input"));
        assert!(err.to_string().contains("malformed XML"));
    }

    #[test]
    fn test_not_found_error() {
        let err = Error::not_found("disk", "vmdisk9");
        let msg = err.to_string();
        assert!(msg.contains("disk"));
        assert!(msg.contains("vmdisk9"));
    }

    #[test]
    fn test_conflict_error() {
        let err = Error::conflict("duplicate InstanceID 7");
        assert!(err.to_string().contains("conflict"));
    }

    #[test]
    fn test_capability_error() {
        let err = Error::capability("qemu-img");
        assert!(err.to_string().contains("qemu-img"));
    }

    #[test]
    fn test_internal_error() {
        let err = Error::internal("profile sets overlap");
        assert!(err.to_string().contains("internal error"));
    }

    #[test]
    fn test_from_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "access denied");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io { path: None, .. }));
    }
}
