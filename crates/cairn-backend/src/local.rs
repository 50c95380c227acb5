use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use cairn_types::{FileType, Handle};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::debug;
use walkdir::WalkDir;

use crate::error::{BackendError, BackendResult};
use crate::layout::{parse_layout, Layout};
use crate::list::ListStream;
use crate::traits::{Backend, FileInfo};

/// Mode for every directory the backend creates.
#[cfg(unix)]
const DIR_MODE: u32 = 0o700;

/// Mode a blob is created with; the write bits are cleared once the blob is
/// durable.
#[cfg(unix)]
const FILE_MODE: u32 = 0o600;

/// Configuration for a local backend.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LocalConfig {
    /// Repository root directory.
    pub path: PathBuf,
    /// Layout name; empty or absent selects the default scheme.
    #[serde(default)]
    pub layout: String,
}

impl LocalConfig {
    /// Configuration for a repository at `path` with the default layout.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            layout: String::new(),
        }
    }
}

/// A backend in a local directory.
///
/// The root holds one subdirectory per blob type, shaped by the configured
/// [`Layout`]; beyond the root path and layout the backend is stateless, and
/// all mutability lives in the filesystem itself. Exclusive create is the
/// sole write-conflict mechanism; committed blobs are additionally hardened
/// to read-only as a safeguard against in-place modification.
pub struct LocalBackend {
    config: LocalConfig,
    layout: Arc<dyn Layout>,
}

impl LocalBackend {
    /// Open an existing repository.
    ///
    /// If the data directory exists, every layout directory beneath it is
    /// re-created as needed, repairing partially initialized roots on
    /// access. Directories outside the data subtree are left alone. A
    /// failed directory creation is fatal.
    pub fn open(config: LocalConfig) -> BackendResult<Self> {
        debug!(path = %config.path.display(), layout = %config.layout, "open local backend");
        let layout = parse_layout(&config.layout, &config.path)?;
        let backend = Self { config, layout };

        let datadir = backend.layout.basedir(FileType::Data);
        if datadir.is_dir() {
            for dir in backend.layout.paths() {
                if !dir.starts_with(&datadir) {
                    continue;
                }
                create_dirs(&dir)
                    .map_err(|err| BackendError::io(format!("mkdir {}", dir.display()), err))?;
            }
        }

        Ok(backend)
    }

    /// Initialize a new repository at the configured root.
    ///
    /// Fails with [`BackendError::AlreadyInitialized`] when a config blob is
    /// already present, creating nothing in that case. Otherwise every
    /// layout directory is created; the caller is expected to save the
    /// config blob afterwards.
    pub fn create(config: LocalConfig) -> BackendResult<Self> {
        debug!(path = %config.path.display(), layout = %config.layout, "create local backend");
        let layout = parse_layout(&config.layout, &config.path)?;
        let backend = Self { config, layout };

        let config_file = backend.layout.filename(&Handle::config());
        if fs::symlink_metadata(&config_file).is_ok() {
            return Err(BackendError::AlreadyInitialized {
                path: backend.config.path.clone(),
            });
        }

        for dir in backend.layout.paths() {
            create_dirs(&dir)
                .map_err(|err| BackendError::io(format!("mkdir {}", dir.display()), err))?;
        }

        Ok(backend)
    }
}

impl Backend for LocalBackend {
    fn location(&self) -> String {
        self.config.path.display().to_string()
    }

    fn save(&self, handle: &Handle, from: &mut dyn Read) -> BackendResult<()> {
        handle.valid()?;
        debug!(%handle, "save");
        let filename = self.layout.filename(handle);

        if handle.kind == FileType::Lock {
            // Locks are transient; their directory may not be provisioned
            // on an otherwise initialized repository.
            let lock_dir = self.layout.dirname(handle);
            if !lock_dir.is_dir() {
                create_dirs(&lock_dir).map_err(|err| {
                    BackendError::io(format!("mkdir {}", lock_dir.display()), err)
                })?;
            }
        }

        let mut file = create_exclusive(&filename).map_err(|err| {
            if err.kind() == io::ErrorKind::AlreadyExists {
                BackendError::AlreadyExists {
                    handle: handle.clone(),
                }
            } else {
                BackendError::io(format!("open {handle}"), err)
            }
        })?;

        // On a copy or sync failure the partial file stays behind under its
        // final name; cleanup is the caller's responsibility.
        io::copy(from, &mut file)
            .map_err(|err| BackendError::io(format!("write {handle}"), err))?;
        file.sync_all()
            .map_err(|err| BackendError::io(format!("sync {handle}"), err))?;
        drop(file);

        set_readonly(&filename).map_err(|err| BackendError::io(format!("chmod {handle}"), err))
    }

    fn load(
        &self,
        handle: &Handle,
        length: u64,
        offset: u64,
    ) -> BackendResult<Box<dyn Read + Send>> {
        handle.valid()?;
        debug!(%handle, length, offset, "load");
        let mut file =
            File::open(self.layout.filename(handle)).map_err(|err| classify(handle, "open", err))?;
        if offset > 0 {
            file.seek(SeekFrom::Start(offset))
                .map_err(|err| BackendError::io(format!("seek {handle}"), err))?;
        }
        if length > 0 {
            Ok(Box::new(file.take(length)))
        } else {
            Ok(Box::new(file))
        }
    }

    fn stat(&self, handle: &Handle) -> BackendResult<FileInfo> {
        handle.valid()?;
        debug!(%handle, "stat");
        let meta = fs::metadata(self.layout.filename(handle))
            .map_err(|err| classify(handle, "stat", err))?;
        Ok(FileInfo { size: meta.len() })
    }

    fn exists(&self, handle: &Handle) -> BackendResult<bool> {
        handle.valid()?;
        debug!(%handle, "exists");
        match fs::metadata(self.layout.filename(handle)) {
            Ok(_) => Ok(true),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(err) => Err(BackendError::io(format!("stat {handle}"), err)),
        }
    }

    fn remove(&self, handle: &Handle) -> BackendResult<()> {
        handle.valid()?;
        debug!(%handle, "remove");
        let filename = self.layout.filename(handle);
        // Saved blobs are hardened to read-only; make the file deletable
        // before unlinking it.
        clear_readonly(&filename).map_err(|err| classify(handle, "chmod", err))?;
        fs::remove_file(&filename).map_err(|err| classify(handle, "remove", err))
    }

    fn list(&self, kind: FileType, cancel: &CancellationToken) -> ListStream {
        debug!(kind = %kind, "list");
        let basedir = self.layout.basedir(kind);
        ListStream::spawn(cancel, move |sink| {
            let mut walk = WalkDir::new(&basedir).follow_links(false);
            if kind == FileType::Config {
                // The config basedir is the repository root; stay at the
                // top level so other types' subtrees are not enumerated.
                walk = walk.max_depth(1);
            }
            for entry in walk {
                let entry = match entry {
                    Ok(entry) => entry,
                    Err(err) => {
                        debug!(error = %err, "list walk ended early");
                        return;
                    }
                };
                if !entry.file_type().is_file() {
                    continue;
                }
                let name = entry.file_name().to_string_lossy().into_owned();
                if !sink.push(name) {
                    return;
                }
            }
        })
    }

    fn delete(&self) -> BackendResult<()> {
        debug!(path = %self.config.path.display(), "delete repository");
        match fs::remove_dir_all(&self.config.path) {
            Ok(()) => Ok(()),
            // A root that is already gone leaves nothing to destroy.
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(BackendError::io(
                format!("remove all {}", self.config.path.display()),
                err,
            )),
        }
    }

    fn close(&self) -> BackendResult<()> {
        // Nothing to release; every operation closes its files before
        // returning.
        Ok(())
    }
}

impl std::fmt::Debug for LocalBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalBackend")
            .field("path", &self.config.path)
            .field("layout", &self.config.layout)
            .finish()
    }
}

/// Map an I/O failure to the typed not-found error when it reports a
/// missing file.
fn classify(handle: &Handle, stage: &str, err: io::Error) -> BackendError {
    if err.kind() == io::ErrorKind::NotFound {
        BackendError::NotFound {
            handle: handle.clone(),
        }
    } else {
        BackendError::io(format!("{stage} {handle}"), err)
    }
}

/// Create `path` and any missing ancestors with the directory mode.
#[cfg(unix)]
fn create_dirs(path: &Path) -> io::Result<()> {
    use std::os::unix::fs::DirBuilderExt;
    fs::DirBuilder::new()
        .recursive(true)
        .mode(DIR_MODE)
        .create(path)
}

#[cfg(not(unix))]
fn create_dirs(path: &Path) -> io::Result<()> {
    fs::DirBuilder::new().recursive(true).create(path)
}

/// Open `path` write-only, failing if it already exists.
#[cfg(unix)]
fn create_exclusive(path: &Path) -> io::Result<File> {
    use std::os::unix::fs::OpenOptionsExt;
    OpenOptions::new()
        .write(true)
        .create_new(true)
        .mode(FILE_MODE)
        .open(path)
}

#[cfg(not(unix))]
fn create_exclusive(path: &Path) -> io::Result<File> {
    OpenOptions::new().write(true).create_new(true).open(path)
}

/// Clear the write bits on a committed blob.
#[cfg(unix)]
fn set_readonly(path: &Path) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    let mut perm = fs::metadata(path)?.permissions();
    perm.set_mode(perm.mode() & !0o222);
    fs::set_permissions(path, perm)
}

#[cfg(not(unix))]
fn set_readonly(path: &Path) -> io::Result<()> {
    let mut perm = fs::metadata(path)?.permissions();
    perm.set_readonly(true);
    fs::set_permissions(path, perm)
}

/// Make a hardened blob writable so it can be unlinked.
#[cfg(unix)]
fn clear_readonly(path: &Path) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o666))
}

#[cfg(not(unix))]
fn clear_readonly(path: &Path) -> io::Result<()> {
    let mut perm = fs::metadata(path)?.permissions();
    perm.set_readonly(false);
    fs::set_permissions(path, perm)
}
