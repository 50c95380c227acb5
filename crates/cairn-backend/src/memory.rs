use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::io::{Cursor, Read};
use std::sync::RwLock;

use cairn_types::{FileType, Handle};
use tokio_util::sync::CancellationToken;

use crate::error::{BackendError, BackendResult};
use crate::list::ListStream;
use crate::traits::{Backend, FileInfo};

/// In-memory, HashMap-based backend.
///
/// Intended for tests and embedding. All blobs are held in memory behind a
/// `RwLock` for safe concurrent access and copied on save/load. The full
/// contract applies, exclusive create included.
pub struct InMemoryBackend {
    blobs: RwLock<HashMap<Handle, Vec<u8>>>,
}

impl InMemoryBackend {
    /// Create a new empty backend.
    pub fn new() -> Self {
        Self {
            blobs: RwLock::new(HashMap::new()),
        }
    }

    /// Number of blobs currently stored.
    pub fn len(&self) -> usize {
        self.blobs.read().expect("lock poisoned").len()
    }

    /// Returns `true` if nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.blobs.read().expect("lock poisoned").is_empty()
    }

    /// Total bytes across all stored blobs.
    pub fn total_bytes(&self) -> u64 {
        self.blobs
            .read()
            .expect("lock poisoned")
            .values()
            .map(|data| data.len() as u64)
            .sum()
    }

    /// Return a sorted list of all stored handles.
    pub fn handles(&self) -> Vec<Handle> {
        let map = self.blobs.read().expect("lock poisoned");
        let mut handles: Vec<Handle> = map.keys().cloned().collect();
        handles.sort();
        handles
    }
}

impl Default for InMemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl Backend for InMemoryBackend {
    fn location(&self) -> String {
        "memory".to_string()
    }

    fn save(&self, handle: &Handle, from: &mut dyn Read) -> BackendResult<()> {
        handle.valid()?;
        let mut data = Vec::new();
        from.read_to_end(&mut data)
            .map_err(|err| BackendError::io(format!("read {handle}"), err))?;

        let mut map = self.blobs.write().expect("lock poisoned");
        // First writer wins; blobs are immutable once stored.
        match map.entry(handle.clone()) {
            Entry::Occupied(_) => Err(BackendError::AlreadyExists {
                handle: handle.clone(),
            }),
            Entry::Vacant(slot) => {
                slot.insert(data);
                Ok(())
            }
        }
    }

    fn load(
        &self,
        handle: &Handle,
        length: u64,
        offset: u64,
    ) -> BackendResult<Box<dyn Read + Send>> {
        handle.valid()?;
        let map = self.blobs.read().expect("lock poisoned");
        let data = map.get(handle).ok_or_else(|| BackendError::NotFound {
            handle: handle.clone(),
        })?;

        // Reads past the end yield no bytes, matching a seek past EOF.
        let start = usize::try_from(offset).unwrap_or(usize::MAX).min(data.len());
        let mut window = data[start..].to_vec();
        if length > 0 {
            window.truncate(usize::try_from(length).unwrap_or(usize::MAX));
        }
        Ok(Box::new(Cursor::new(window)))
    }

    fn stat(&self, handle: &Handle) -> BackendResult<FileInfo> {
        handle.valid()?;
        let map = self.blobs.read().expect("lock poisoned");
        match map.get(handle) {
            Some(data) => Ok(FileInfo {
                size: data.len() as u64,
            }),
            None => Err(BackendError::NotFound {
                handle: handle.clone(),
            }),
        }
    }

    fn exists(&self, handle: &Handle) -> BackendResult<bool> {
        handle.valid()?;
        let map = self.blobs.read().expect("lock poisoned");
        Ok(map.contains_key(handle))
    }

    fn remove(&self, handle: &Handle) -> BackendResult<()> {
        handle.valid()?;
        let mut map = self.blobs.write().expect("lock poisoned");
        match map.remove(handle) {
            Some(_) => Ok(()),
            None => Err(BackendError::NotFound {
                handle: handle.clone(),
            }),
        }
    }

    fn list(&self, kind: FileType, cancel: &CancellationToken) -> ListStream {
        let names: Vec<String> = {
            let map = self.blobs.read().expect("lock poisoned");
            map.keys()
                .filter(|handle| handle.kind == kind)
                .map(|handle| handle.name.clone())
                .collect()
        };
        ListStream::spawn(cancel, move |sink| {
            for name in names {
                if !sink.push(name) {
                    return;
                }
            }
        })
    }

    fn delete(&self) -> BackendResult<()> {
        self.blobs.write().expect("lock poisoned").clear();
        Ok(())
    }

    fn close(&self) -> BackendResult<()> {
        Ok(())
    }
}

impl std::fmt::Debug for InMemoryBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let count = self.len();
        f.debug_struct("InMemoryBackend")
            .field("blob_count", &count)
            .finish()
    }
}
