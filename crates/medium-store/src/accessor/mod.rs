//! Raw I/O gateways to the resource behind a [`Medium`]
//!
//! Accessors know nothing about caching, offsets or pending edits. They read
//! and write plain byte ranges at absolute positions. Stream accessors can
//! only read forward from their current position.

mod file;
mod memory;
mod stream;

pub use file::FileAccessor;
pub use memory::MemoryAccessor;
pub use stream::StreamAccessor;

use crate::error::Result;
use crate::medium::{Medium, MediumSource};
use bytes::Bytes;
use std::io::{ErrorKind, Read};

/// Positional access to the bytes of a medium
pub trait MediumAccessor: Send {
    /// The medium this accessor works on
    fn medium(&self) -> &Medium;

    /// Acquire the underlying resource
    fn open(&mut self) -> Result<()>;

    /// Release the underlying resource
    fn close(&mut self) -> Result<()>;

    /// Whether the resource is currently acquired
    fn is_opened(&self) -> bool;

    /// Position right behind the last byte read or written
    fn position(&self) -> u64;

    /// Current length, `None` if it cannot be determined
    fn length(&self) -> Option<u64>;

    /// Read exactly `count` bytes at `offset`.
    ///
    /// Fails with [`StoreError::EndOfMedium`](crate::StoreError::EndOfMedium)
    /// carrying the bytes that were available when the medium ends first.
    fn read_at(&mut self, offset: u64, count: usize) -> Result<Bytes>;

    /// Write `data` at `offset`, growing the medium if needed
    fn write_at(&mut self, offset: u64, data: &[u8]) -> Result<()>;

    /// Cut the medium down to `length` bytes
    fn truncate(&mut self, length: u64) -> Result<()>;

    /// Make written bytes durable
    fn sync(&mut self) -> Result<()>;

    /// Whether no byte exists at `offset`
    fn is_at_end(&mut self, offset: u64) -> Result<bool>;
}

/// Create the accessor matching the kind of `medium`, not yet opened
pub fn accessor_for(medium: &Medium) -> Box<dyn MediumAccessor> {
    match medium.source() {
        MediumSource::File(_) => Box::new(FileAccessor::new(medium.clone())),
        MediumSource::Memory(_) => Box::new(MemoryAccessor::new(medium.clone())),
        MediumSource::Stream { .. } => Box::new(StreamAccessor::new(medium.clone())),
    }
}

/// Read until `buf` is full or the reader is exhausted, returning the number
/// of bytes read
pub(crate) fn read_fully(reader: &mut impl Read, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}
