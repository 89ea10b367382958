//! In-memory accessor

use super::MediumAccessor;
use crate::error::{EndOfMedium, Result, StoreError};
use crate::medium::{Medium, MediumSource, SharedBuffer};
use bytes::Bytes;
use tracing::trace;

/// Accessor writing through to the shared buffer of a memory medium
pub struct MemoryAccessor {
    medium: Medium,
    buffer: Option<SharedBuffer>,
    position: u64,
}

impl MemoryAccessor {
    /// Create a closed accessor for a memory medium
    pub const fn new(medium: Medium) -> Self {
        Self {
            medium,
            buffer: None,
            position: 0,
        }
    }

    fn buffer(&self) -> Result<&SharedBuffer> {
        self.buffer.as_ref().ok_or(StoreError::Closed)
    }

    fn ensure_writable(&self) -> Result<()> {
        if self.medium.is_read_only() {
            return Err(StoreError::ReadOnlyMedium(self.medium.to_string()));
        }
        Ok(())
    }
}

fn to_index(position: u64) -> Result<usize> {
    usize::try_from(position)
        .map_err(|_| StoreError::invalid_argument(format!("position {position} exceeds memory")))
}

impl MediumAccessor for MemoryAccessor {
    fn medium(&self) -> &Medium {
        &self.medium
    }

    fn open(&mut self) -> Result<()> {
        if self.buffer.is_some() {
            return Err(StoreError::AlreadyOpen);
        }
        let MediumSource::Memory(buffer) = self.medium.source() else {
            return Err(StoreError::invalid_argument(format!(
                "{} is not a memory medium",
                self.medium
            )));
        };
        self.buffer = Some(buffer.clone());
        self.position = 0;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.buffer.take().ok_or(StoreError::Closed)?;
        Ok(())
    }

    fn is_opened(&self) -> bool {
        self.buffer.is_some()
    }

    fn position(&self) -> u64 {
        self.position
    }

    fn length(&self) -> Option<u64> {
        self.buffer
            .as_ref()
            .map(|buffer| buffer.read().len() as u64)
    }

    fn read_at(&mut self, offset: u64, count: usize) -> Result<Bytes> {
        let start = to_index(offset)?;
        let bytes = {
            let buffer = self.buffer()?.read();
            let start = start.min(buffer.len());
            let end = start.saturating_add(count).min(buffer.len());
            Bytes::copy_from_slice(&buffer[start..end])
        };
        self.position = offset + bytes.len() as u64;

        trace!("Read {} of {} bytes at {} from {}", bytes.len(), count, offset, self.medium);

        if bytes.len() < count {
            return Err(EndOfMedium::with_partial(offset, count, bytes).into());
        }
        Ok(bytes)
    }

    fn write_at(&mut self, offset: u64, data: &[u8]) -> Result<()> {
        self.ensure_writable()?;
        let start = to_index(offset)?;
        {
            let mut buffer = self.buffer()?.write();
            let end = start + data.len();
            if buffer.len() < end {
                buffer.resize(end, 0);
            }
            buffer[start..end].copy_from_slice(data);
        }
        self.position = offset + data.len() as u64;

        trace!("Wrote {} bytes at {} to {}", data.len(), offset, self.medium);
        Ok(())
    }

    fn truncate(&mut self, length: u64) -> Result<()> {
        self.ensure_writable()?;
        let length = to_index(length)?;
        self.buffer()?.write().truncate(length);
        self.position = self.position.min(length as u64);
        Ok(())
    }

    fn sync(&mut self) -> Result<()> {
        self.buffer()?;
        Ok(())
    }

    fn is_at_end(&mut self, offset: u64) -> Result<bool> {
        Ok(offset >= self.buffer()?.read().len() as u64)
    }
}
