use std::io::Read;

use cairn_types::{FileType, Handle};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::error::{BackendError, BackendResult};
use crate::list::ListStream;

/// Metadata for a stored blob. Deliberately minimal; timestamps and
/// permissions never cross the contract.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileInfo {
    /// Size of the blob in bytes.
    pub size: u64,
}

/// A storage medium for immutable, hash-named blobs.
///
/// All implementations must satisfy these invariants:
/// - Blobs are immutable once written: a name's content never changes,
///   because identical names imply identical content upstream.
/// - `save` is an exclusive create: when several writers race on one handle,
///   exactly one succeeds and the rest fail with an already-exists error.
///   Nothing is ever silently overwritten.
/// - A successful `save` is durable: the bytes have reached stable storage
///   before the call returns.
/// - Operations on distinct handles are safe to run concurrently. The only
///   write-conflict mechanism is exclusive create; no other locking is
///   performed at this layer.
/// - Every operation validates its handle first and never touches storage
///   when validation fails.
/// - All I/O errors are propagated, never silently ignored.
pub trait Backend: Send + Sync {
    /// Human-readable identifier of the medium, for display and logs.
    fn location(&self) -> String;

    /// Whether `err` means "the blob does not exist" on this medium.
    ///
    /// The default covers the typed and wrapped I/O not-found cases; media
    /// with exotic native errors may override.
    fn is_not_exist(&self, err: &BackendError) -> bool {
        err.is_not_found()
    }

    /// Store the full contents of `from` under `handle`.
    ///
    /// Fails with an already-exists error when the handle is stored, leaving
    /// the existing blob untouched. On success the blob is durable. A failed
    /// save may leave a partial artifact behind; cleaning that up is the
    /// caller's responsibility, and the artifact is never served as a
    /// complete blob.
    fn save(&self, handle: &Handle, from: &mut dyn Read) -> BackendResult<()>;

    /// Open a reader over a stored blob.
    ///
    /// Reading starts at `offset`; when `length > 0` the reader self-limits
    /// to at most `length` bytes, otherwise it runs to the end of the blob.
    /// The caller owns the reader and releases it by dropping. Missing blobs
    /// fail with an error classifiable via [`Backend::is_not_exist`].
    fn load(
        &self,
        handle: &Handle,
        length: u64,
        offset: u64,
    ) -> BackendResult<Box<dyn Read + Send>>;

    /// Metadata for a stored blob.
    ///
    /// Missing blobs fail with an error classifiable via
    /// [`Backend::is_not_exist`].
    fn stat(&self, handle: &Handle) -> BackendResult<FileInfo>;

    /// Whether a blob exists.
    ///
    /// Returns `Ok(false)` for absent blobs; errors are reserved for
    /// failures unrelated to existence.
    fn exists(&self, handle: &Handle) -> BackendResult<bool>;

    /// Delete one blob, clearing any immutability guard first.
    ///
    /// Removing a blob that does not exist is an error classifiable via
    /// [`Backend::is_not_exist`]; there is no implicit idempotence here.
    fn remove(&self, handle: &Handle) -> BackendResult<()>;

    /// Stream the names of all stored blobs of `kind`.
    ///
    /// Enumeration is lazy: names are produced concurrently with iteration,
    /// in unspecified order and without snapshot isolation. The producer
    /// observes `cancel` and terminates in bounded time once it fires, even
    /// if the consumer stopped draining; dropping the stream stops the
    /// producer as well.
    fn list(&self, kind: FileType, cancel: &CancellationToken) -> ListStream;

    /// Irreversibly destroy the whole medium and every blob in it.
    ///
    /// Repository teardown only, never single-blob deletion. Destroying a
    /// medium that is already gone is not an error.
    fn delete(&self) -> BackendResult<()>;

    /// Release resources held by the backend instance itself.
    ///
    /// Stored blobs and readers handed out by `load` are unaffected.
    fn close(&self) -> BackendResult<()>;
}
