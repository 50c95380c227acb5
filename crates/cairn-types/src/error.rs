use thiserror::Error;

use crate::handle::FileType;

/// Errors produced by handle validation.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum HandleError {
    /// A named blob type was given an empty name.
    #[error("handle of type {kind} requires a name")]
    MissingName { kind: FileType },

    /// The config blob is a singleton and carries no name.
    #[error("config handle must not carry a name")]
    UnexpectedName,
}
