use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::HandleError;

/// Categories of blobs a repository stores.
///
/// The type decides which layout subdirectory a blob lives in and whether a
/// [`Handle`] carries a name: every type except [`FileType::Config`] is a
/// named collection; the config is a singleton addressed by its type alone.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum FileType {
    /// The singleton repository configuration blob.
    Config,
    /// Pack files holding chunked content.
    Data,
    /// Index blobs mapping chunks to packs.
    Index,
    /// Snapshot metadata.
    Snapshot,
    /// Encrypted key material.
    Key,
    /// Advisory repository locks.
    Lock,
}

impl FileType {
    /// Every file type, in a fixed order.
    pub const ALL: [FileType; 6] = [
        FileType::Config,
        FileType::Data,
        FileType::Index,
        FileType::Snapshot,
        FileType::Key,
        FileType::Lock,
    ];

    /// The lowercase name used in log output and on-disk directory names.
    pub const fn as_str(self) -> &'static str {
        match self {
            FileType::Config => "config",
            FileType::Data => "data",
            FileType::Index => "index",
            FileType::Snapshot => "snapshot",
            FileType::Key => "key",
            FileType::Lock => "lock",
        }
    }
}

impl fmt::Display for FileType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identifies exactly one stored blob within a backend.
///
/// For content-addressed types the name is by convention the lowercase hex
/// digest of the blob's bytes. This layer does not verify the convention; it
/// only relies on identical names implying identical content, which is what
/// makes the write-once rule of the backends sound.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Handle {
    /// The blob's category.
    pub kind: FileType,
    /// The blob's name; empty exactly for [`FileType::Config`].
    pub name: String,
}

impl Handle {
    /// Create a handle for a named blob.
    pub fn new(kind: FileType, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
        }
    }

    /// The handle of the singleton config blob.
    pub fn config() -> Self {
        Self {
            kind: FileType::Config,
            name: String::new(),
        }
    }

    /// Check the name-emptiness rule for this handle's type.
    ///
    /// Every backend operation validates its handle first and never touches
    /// storage when validation fails.
    pub fn valid(&self) -> Result<(), HandleError> {
        match (self.kind, self.name.is_empty()) {
            (FileType::Config, true) => Ok(()),
            (FileType::Config, false) => Err(HandleError::UnexpectedName),
            (kind, true) => Err(HandleError::MissingName { kind }),
            (_, false) => Ok(()),
        }
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{}/{}>", self.kind, self.name)
    }
}
