//! Forward-only stream accessor

use super::{MediumAccessor, read_fully};
use crate::error::{EndOfMedium, Result, StoreError};
use crate::medium::{BoxedStream, Medium};
use bytes::Bytes;
use std::io::{Cursor, Read};
use tracing::trace;

/// Accessor reading a stream medium strictly sequentially
///
/// The stream is taken out of the medium on open and released back to it on
/// close, where caller-owned streams wait to be reclaimed.
pub struct StreamAccessor {
    medium: Medium,
    stream: Option<BoxedStream>,
    position: u64,
    peeked: Option<u8>,
}

impl StreamAccessor {
    /// Create a closed accessor for a stream medium
    pub const fn new(medium: Medium) -> Self {
        Self {
            medium,
            stream: None,
            position: 0,
            peeked: None,
        }
    }

    fn stream(&mut self) -> Result<&mut BoxedStream> {
        self.stream.as_mut().ok_or(StoreError::Closed)
    }

    fn read_only(&self) -> StoreError {
        StoreError::ReadOnlyMedium(self.medium.to_string())
    }
}

impl MediumAccessor for StreamAccessor {
    fn medium(&self) -> &Medium {
        &self.medium
    }

    fn open(&mut self) -> Result<()> {
        if self.stream.is_some() {
            return Err(StoreError::AlreadyOpen);
        }
        self.stream = Some(self.medium.take_stream()?);
        self.position = 0;
        self.peeked = None;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        let stream = self.stream.take().ok_or(StoreError::Closed)?;
        // A byte peeked by an end check still belongs in front of the stream
        let stream: BoxedStream = match self.peeked.take() {
            Some(byte) => Box::new(Cursor::new([byte]).chain(stream)),
            None => stream,
        };
        self.medium.release_stream(stream);
        Ok(())
    }

    fn is_opened(&self) -> bool {
        self.stream.is_some()
    }

    fn position(&self) -> u64 {
        self.position
    }

    fn length(&self) -> Option<u64> {
        None
    }

    fn read_at(&mut self, offset: u64, count: usize) -> Result<Bytes> {
        if offset != self.position {
            return Err(StoreError::InvalidMediumOffset {
                offset,
                reason: format!("stream is positioned at {}", self.position),
            });
        }

        let mut buf = vec![0u8; count];
        let mut read = 0;
        if count > 0 {
            if let Some(byte) = self.peeked.take() {
                buf[0] = byte;
                read = 1;
            }
        }
        read += read_fully(self.stream()?, &mut buf[read..])?;
        buf.truncate(read);
        self.position += read as u64;

        trace!("Read {} of {} bytes at {} from {}", read, count, offset, self.medium);

        if read < count {
            return Err(EndOfMedium::with_partial(offset, count, Bytes::from(buf)).into());
        }
        Ok(Bytes::from(buf))
    }

    fn write_at(&mut self, _offset: u64, _data: &[u8]) -> Result<()> {
        Err(self.read_only())
    }

    fn truncate(&mut self, _length: u64) -> Result<()> {
        Err(self.read_only())
    }

    fn sync(&mut self) -> Result<()> {
        Ok(())
    }

    /// Streams are only ever at their end at the current position; the
    /// offset is ignored
    fn is_at_end(&mut self, _offset: u64) -> Result<bool> {
        if self.peeked.is_some() {
            return Ok(false);
        }

        let mut byte = [0u8; 1];
        let read = read_fully(self.stream()?, &mut byte)?;
        if read == 0 {
            return Ok(true);
        }
        self.peeked = Some(byte[0]);
        Ok(false)
    }
}
