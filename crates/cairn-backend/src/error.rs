use std::io;
use std::path::PathBuf;

use cairn_types::{Handle, HandleError};

/// Errors from backend operations.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    /// The handle failed validation; storage was never touched.
    #[error("invalid handle: {0}")]
    InvalidHandle(#[from] HandleError),

    /// The addressed blob does not exist.
    #[error("{handle} not found")]
    NotFound { handle: Handle },

    /// Exclusive create failed because the blob is already stored.
    #[error("{handle} already exists")]
    AlreadyExists { handle: Handle },

    /// `create` was called on a root that already holds a repository.
    #[error("repository already initialized at {}", .path.display())]
    AlreadyInitialized { path: PathBuf },

    /// The configured layout name is not recognized.
    #[error("unknown layout {name:?}")]
    UnknownLayout { name: String },

    /// An I/O failure, tagged with the stage it happened in.
    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: io::Error,
    },
}

impl BackendError {
    /// Wrap an I/O error with the stage it happened in.
    pub fn io(context: impl Into<String>, source: io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Whether this error means "the blob does not exist".
    ///
    /// Covers the typed [`BackendError::NotFound`] variant and wrapped I/O
    /// errors whose kind is `NotFound`. This is the only condition callers
    /// are expected to branch on; everything else is terminal for the
    /// operation that raised it.
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::NotFound { .. } => true,
            Self::Io { source, .. } => source.kind() == io::ErrorKind::NotFound,
            _ => false,
        }
    }
}

/// Result alias for backend operations.
pub type BackendResult<T> = Result<T, BackendError>;

#[cfg(test)]
mod tests {
    use super::*;
    use cairn_types::FileType;

    #[test]
    fn not_found_classification() {
        let handle = Handle::new(FileType::Data, "ab12");
        assert!(BackendError::NotFound { handle }.is_not_found());

        let io_missing = BackendError::io(
            "open <data/ab12>",
            io::Error::new(io::ErrorKind::NotFound, "gone"),
        );
        assert!(io_missing.is_not_found());

        let io_denied = BackendError::io(
            "open <data/ab12>",
            io::Error::new(io::ErrorKind::PermissionDenied, "nope"),
        );
        assert!(!io_denied.is_not_found());
    }

    #[test]
    fn exists_conditions_are_not_not_found() {
        let handle = Handle::new(FileType::Snapshot, "cd34");
        assert!(!BackendError::AlreadyExists { handle }.is_not_found());
        assert!(!BackendError::AlreadyInitialized {
            path: PathBuf::from("/repo")
        }
        .is_not_found());
    }

    #[test]
    fn validation_error_converts() {
        let err = Handle::new(FileType::Index, "").valid().unwrap_err();
        let backend_err: BackendError = err.into();
        assert!(matches!(backend_err, BackendError::InvalidHandle(_)));
        assert!(!backend_err.is_not_found());
    }

    #[test]
    fn display_names_the_stage() {
        let err = BackendError::io(
            "sync <data/ab12>",
            io::Error::new(io::ErrorKind::Other, "disk full"),
        );
        let text = err.to_string();
        assert!(text.contains("sync <data/ab12>"));
        assert!(text.contains("disk full"));
    }

    #[test]
    fn unknown_layout_display() {
        let err = BackendError::UnknownLayout {
            name: "s3legacy".to_string(),
        };
        assert_eq!(err.to_string(), "unknown layout \"s3legacy\"");
    }
}
