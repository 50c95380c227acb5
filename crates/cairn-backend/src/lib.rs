//! Storage backends for the Cairn backup engine.
//!
//! A repository is a flat collection of immutable, hash-named blobs sorted
//! into a handful of types. This crate defines the contract every storage
//! medium implements and ships two adapters:
//!
//! - [`LocalBackend`] -- a directory tree on a local filesystem
//! - [`InMemoryBackend`] -- a `HashMap`-based medium for tests and embedding
//!
//! # Design Rules
//!
//! 1. Blobs are immutable once written; identical names imply identical
//!    content, which upstream callers guarantee by hashing.
//! 2. `save` is an exclusive create: exactly one writer of a name wins, the
//!    rest fail with an already-exists error.
//! 3. A successful `save` is durable (fsynced before success is reported).
//! 4. Operations on distinct handles are safe to run concurrently; the
//!    layer performs no locking of its own.
//! 5. Enumeration is lazy, cancellable, and unordered; see [`ListStream`].
//! 6. All I/O errors are propagated, never silently ignored.

pub mod error;
pub mod layout;
pub mod list;
pub mod local;
pub mod memory;
pub mod traits;

// Re-export primary types at crate root for ergonomic imports.
pub use error::{BackendError, BackendResult};
pub use layout::{parse_layout, DefaultLayout, FlatLayout, Layout};
pub use list::{ListSink, ListStream};
pub use local::{LocalBackend, LocalConfig};
pub use memory::InMemoryBackend;
pub use traits::{Backend, FileInfo};

// The handle model and the cancellation token cross the contract boundary;
// re-export them so backend users need only this crate.
pub use cairn_types::{FileType, Handle, HandleError};
pub use tokio_util::sync::CancellationToken;
