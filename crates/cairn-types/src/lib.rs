//! Foundation types for the Cairn backup engine.
//!
//! This crate defines the typed key space addressing every blob a Cairn
//! repository stores: pack data, indexes, snapshot metadata, key material,
//! locks, and the repository config. The storage backends in
//! `cairn-backend` consume it.
//!
//! # Key Types
//!
//! - [`FileType`] — Closed set of blob categories
//! - [`Handle`] — `(FileType, name)` key identifying one stored blob
//! - [`HandleError`] — Validation failures caught before any I/O

pub mod error;
pub mod handle;

pub use error::HandleError;
pub use handle::{FileType, Handle};
