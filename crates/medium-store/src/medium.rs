//! Medium descriptors
//!
//! A [`Medium`] identifies the resource a store works on: a file, a shared
//! in-memory buffer or a forward-only input stream. Two media are equal iff
//! they refer to the same underlying handle.

use crate::error::{Result, StoreError};
use parking_lot::{Mutex, RwLock};
use std::fmt;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Byte buffer shared between an in-memory [`Medium`] and its accessor
pub type SharedBuffer = Arc<RwLock<Vec<u8>>>;

/// Boxed reader backing a stream medium
pub type BoxedStream = Box<dyn Read + Send>;

type StreamSlot = Arc<Mutex<Option<BoxedStream>>>;

/// How a medium may be accessed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediumAccessType {
    /// Reads only, every edit is rejected
    ReadOnly,
    /// Reads and edits
    ReadWrite,
}

/// Who is responsible for an externally supplied stream once the store closes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamOwnership {
    /// The store drops (and thereby closes) the stream on close
    Store,
    /// The stream is handed back to the medium on close and can be taken out
    /// again with [`Medium::reclaim_stream`]
    Caller,
}

/// The underlying resource of a medium
#[derive(Clone)]
pub enum MediumSource {
    /// A file on the local file system
    File(PathBuf),
    /// A byte buffer in memory
    Memory(SharedBuffer),
    /// A forward-only input stream
    Stream {
        /// Slot holding the reader while no accessor has it
        slot: StreamSlot,
        /// Closing responsibility
        ownership: StreamOwnership,
    },
}

/// Descriptor of a storage resource
#[derive(Clone)]
pub struct Medium {
    source: MediumSource,
    name: String,
    access: MediumAccessType,
}

impl Medium {
    /// A file medium; the file does not need to exist yet
    pub fn file(path: impl AsRef<Path>, access: MediumAccessType) -> Self {
        let path = path.as_ref().to_path_buf();
        Self {
            name: path.display().to_string(),
            source: MediumSource::File(path),
            access,
        }
    }

    /// An in-memory medium initialized with the given bytes
    pub fn memory(name: impl Into<String>, bytes: impl Into<Vec<u8>>, access: MediumAccessType) -> Self {
        Self {
            source: MediumSource::Memory(Arc::new(RwLock::new(bytes.into()))),
            name: name.into(),
            access,
        }
    }

    /// A read-only, non-random-access stream medium
    pub fn stream<R>(name: impl Into<String>, reader: R, ownership: StreamOwnership) -> Self
    where
        R: Read + Send + 'static,
    {
        Self {
            source: MediumSource::Stream {
                slot: Arc::new(Mutex::new(Some(Box::new(reader)))),
                ownership,
            },
            name: name.into(),
            access: MediumAccessType::ReadOnly,
        }
    }

    /// Human readable name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The underlying resource
    pub const fn source(&self) -> &MediumSource {
        &self.source
    }

    /// Access type
    pub const fn access_type(&self) -> MediumAccessType {
        self.access
    }

    /// Whether the medium supports positioned reads and writes
    pub const fn is_random_access(&self) -> bool {
        !matches!(self.source, MediumSource::Stream { .. })
    }

    /// Whether edits are rejected
    pub fn is_read_only(&self) -> bool {
        self.access == MediumAccessType::ReadOnly
    }

    /// Whether the underlying resource currently exists
    pub fn exists(&self) -> bool {
        match &self.source {
            MediumSource::File(path) => path.exists(),
            MediumSource::Memory(_) | MediumSource::Stream { .. } => true,
        }
    }

    /// Current length in bytes, `None` when unknown (streams, missing files)
    pub fn current_length(&self) -> Option<u64> {
        match &self.source {
            MediumSource::File(path) => std::fs::metadata(path).ok().map(|meta| meta.len()),
            MediumSource::Memory(buffer) => Some(buffer.read().len() as u64),
            MediumSource::Stream { .. } => None,
        }
    }

    /// Snapshot of an in-memory medium's content
    pub fn memory_contents(&self) -> Option<Vec<u8>> {
        match &self.source {
            MediumSource::Memory(buffer) => Some(buffer.read().clone()),
            _ => None,
        }
    }

    /// Take back a caller-owned stream after the store released it
    pub fn reclaim_stream(&self) -> Option<BoxedStream> {
        match &self.source {
            MediumSource::Stream {
                slot,
                ownership: StreamOwnership::Caller,
            } => slot.lock().take(),
            _ => None,
        }
    }

    pub(crate) fn take_stream(&self) -> Result<BoxedStream> {
        match &self.source {
            MediumSource::Stream { slot, .. } => slot.lock().take().ok_or_else(|| {
                StoreError::StreamUnavailable(format!("stream of {} already taken", self.name))
            }),
            _ => Err(StoreError::invalid_argument(format!(
                "{} is not a stream medium",
                self.name
            ))),
        }
    }

    pub(crate) fn release_stream(&self, stream: BoxedStream) {
        if let MediumSource::Stream {
            slot,
            ownership: StreamOwnership::Caller,
        } = &self.source
        {
            *slot.lock() = Some(stream);
        }
    }
}

impl PartialEq for Medium {
    fn eq(&self, other: &Self) -> bool {
        match (&self.source, &other.source) {
            (MediumSource::File(left), MediumSource::File(right)) => left == right,
            (MediumSource::Memory(left), MediumSource::Memory(right)) => Arc::ptr_eq(left, right),
            (MediumSource::Stream { slot: left, .. }, MediumSource::Stream { slot: right, .. }) => {
                Arc::ptr_eq(left, right)
            }
            _ => false,
        }
    }
}

impl Eq for Medium {}

impl fmt::Debug for Medium {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match &self.source {
            MediumSource::File(_) => "file",
            MediumSource::Memory(_) => "memory",
            MediumSource::Stream { .. } => "stream",
        };
        f.debug_struct("Medium")
            .field("kind", &kind)
            .field("name", &self.name)
            .field("access", &self.access)
            .finish()
    }
}

impl fmt::Display for Medium {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}
