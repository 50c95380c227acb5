use std::path::{Path, PathBuf};
use std::sync::Arc;

use cairn_types::{FileType, Handle};
use tracing::debug;

use crate::error::{BackendError, BackendResult};

/// Maps typed handles to locations in a repository directory tree.
///
/// Layouts are pure: no method touches the filesystem, and the same handle
/// always yields the same path within one layout instance. For any handle
/// `h`, `basedir(h.kind)` is an ancestor of `dirname(h)`, which is an
/// ancestor of `filename(h)`; the local adapter relies on this nesting when
/// it decides which directories to create.
pub trait Layout: Send + Sync {
    /// Full path of the blob addressed by `handle`.
    fn filename(&self, handle: &Handle) -> PathBuf;

    /// Directory the blob addressed by `handle` lives in.
    fn dirname(&self, handle: &Handle) -> PathBuf;

    /// Directory enumerated when listing blobs of `kind`.
    fn basedir(&self, kind: FileType) -> PathBuf;

    /// Every directory the layout expects to exist, shard subdirectories
    /// included.
    fn paths(&self) -> Vec<PathBuf>;
}

/// Subdirectory name for each blob type. The config blob lives directly
/// under the root and has no directory of its own.
fn type_dir(kind: FileType) -> &'static str {
    match kind {
        FileType::Config => "",
        FileType::Data => "data",
        FileType::Index => "index",
        FileType::Snapshot => "snapshots",
        FileType::Key => "keys",
        FileType::Lock => "locks",
    }
}

/// The five per-type directories under `root`.
fn type_dirs(root: &Path) -> Vec<PathBuf> {
    FileType::ALL
        .into_iter()
        .filter(|kind| *kind != FileType::Config)
        .map(|kind| root.join(type_dir(kind)))
        .collect()
}

/// Shard prefix for a data blob name.
///
/// Names of one or two characters are stored unsharded, directly in the
/// data directory.
fn shard(name: &str) -> Option<&str> {
    if name.len() > 2 {
        name.get(..2)
    } else {
        None
    }
}

/// The standard on-disk scheme.
///
/// One directory per blob type, the config blob at `<root>/config`, and
/// data blobs sharded into 256 two-hex-character subdirectories keyed by
/// the first two characters of the name, bounding per-directory entry
/// counts.
#[derive(Clone, Debug)]
pub struct DefaultLayout {
    path: PathBuf,
}

impl DefaultLayout {
    /// Layout rooted at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl Layout for DefaultLayout {
    fn filename(&self, handle: &Handle) -> PathBuf {
        match handle.kind {
            FileType::Config => self.path.join("config"),
            _ => self.dirname(handle).join(&handle.name),
        }
    }

    fn dirname(&self, handle: &Handle) -> PathBuf {
        let base = self.basedir(handle.kind);
        if handle.kind == FileType::Data {
            if let Some(prefix) = shard(&handle.name) {
                return base.join(prefix);
            }
        }
        base
    }

    fn basedir(&self, kind: FileType) -> PathBuf {
        match kind {
            FileType::Config => self.path.clone(),
            kind => self.path.join(type_dir(kind)),
        }
    }

    fn paths(&self) -> Vec<PathBuf> {
        let mut dirs = type_dirs(&self.path);
        let data = self.basedir(FileType::Data);
        for byte in 0..=u8::MAX {
            dirs.push(data.join(hex::encode([byte])));
        }
        dirs
    }
}

/// The engine's first-generation scheme: the same five type directories
/// with no data sharding.
#[derive(Clone, Debug)]
pub struct FlatLayout {
    path: PathBuf,
}

impl FlatLayout {
    /// Layout rooted at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl Layout for FlatLayout {
    fn filename(&self, handle: &Handle) -> PathBuf {
        match handle.kind {
            FileType::Config => self.path.join("config"),
            _ => self.dirname(handle).join(&handle.name),
        }
    }

    fn dirname(&self, handle: &Handle) -> PathBuf {
        self.basedir(handle.kind)
    }

    fn basedir(&self, kind: FileType) -> PathBuf {
        match kind {
            FileType::Config => self.path.clone(),
            kind => self.path.join(type_dir(kind)),
        }
    }

    fn paths(&self) -> Vec<PathBuf> {
        type_dirs(&self.path)
    }
}

/// Resolve a layout by its configured name.
///
/// An empty name selects the default scheme. Unknown names are a fatal
/// configuration error; the backend cannot be constructed.
pub fn parse_layout(name: &str, root: impl Into<PathBuf>) -> BackendResult<Arc<dyn Layout>> {
    let root = root.into();
    debug!(layout = name, root = %root.display(), "resolve layout");
    match name {
        "" | "default" => Ok(Arc::new(DefaultLayout::new(root))),
        "flat" => Ok(Arc::new(FlatLayout::new(root))),
        other => Err(BackendError::UnknownLayout {
            name: other.to_string(),
        }),
    }
}
