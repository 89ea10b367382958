//! File accessor

use super::{MediumAccessor, read_fully};
use crate::error::{EndOfMedium, Result, StoreError};
use crate::medium::{Medium, MediumSource};
use bytes::Bytes;
use std::fs::{File, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::path::PathBuf;
use tracing::trace;

/// Accessor for file media
///
/// Read-write files are created on open if missing.
pub struct FileAccessor {
    medium: Medium,
    file: Option<File>,
    position: u64,
}

impl FileAccessor {
    /// Create a closed accessor for a file medium
    pub const fn new(medium: Medium) -> Self {
        Self {
            medium,
            file: None,
            position: 0,
        }
    }

    fn path(&self) -> Result<PathBuf> {
        match self.medium.source() {
            MediumSource::File(path) => Ok(path.clone()),
            _ => Err(StoreError::invalid_argument(format!(
                "{} is not a file medium",
                self.medium
            ))),
        }
    }

    fn file(&mut self) -> Result<&mut File> {
        self.file.as_mut().ok_or(StoreError::Closed)
    }

    fn ensure_writable(&self) -> Result<()> {
        if self.medium.is_read_only() {
            return Err(StoreError::ReadOnlyMedium(self.medium.to_string()));
        }
        Ok(())
    }
}

impl MediumAccessor for FileAccessor {
    fn medium(&self) -> &Medium {
        &self.medium
    }

    fn open(&mut self) -> Result<()> {
        if self.file.is_some() {
            return Err(StoreError::AlreadyOpen);
        }

        let path = self.path()?;
        let file = if self.medium.is_read_only() {
            File::open(&path)?
        } else {
            OpenOptions::new()
                .read(true)
                .write(true)
                .create(true)
                .truncate(false)
                .open(&path)?
        };

        trace!("Opened file {}", path.display());
        self.file = Some(file);
        self.position = 0;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.file.take().ok_or(StoreError::Closed)?;
        trace!("Closed file {}", self.medium);
        Ok(())
    }

    fn is_opened(&self) -> bool {
        self.file.is_some()
    }

    fn position(&self) -> u64 {
        self.position
    }

    fn length(&self) -> Option<u64> {
        self.file
            .as_ref()
            .and_then(|file| file.metadata().ok())
            .map(|meta| meta.len())
    }

    fn read_at(&mut self, offset: u64, count: usize) -> Result<Bytes> {
        let file = self.file()?;
        file.seek(SeekFrom::Start(offset))?;

        let mut buf = vec![0u8; count];
        let read = read_fully(file, &mut buf)?;
        buf.truncate(read);
        self.position = offset + read as u64;

        trace!("Read {} of {} bytes at {} from {}", read, count, offset, self.medium);

        if read < count {
            return Err(EndOfMedium::with_partial(offset, count, Bytes::from(buf)).into());
        }
        Ok(Bytes::from(buf))
    }

    fn write_at(&mut self, offset: u64, data: &[u8]) -> Result<()> {
        self.ensure_writable()?;
        let file = self.file()?;
        file.seek(SeekFrom::Start(offset))?;
        file.write_all(data)?;
        self.position = offset + data.len() as u64;

        trace!("Wrote {} bytes at {} to {}", data.len(), offset, self.medium);
        Ok(())
    }

    fn truncate(&mut self, length: u64) -> Result<()> {
        self.ensure_writable()?;
        self.file()?.set_len(length)?;
        self.position = self.position.min(length);

        trace!("Truncated {} to {} bytes", self.medium, length);
        Ok(())
    }

    fn sync(&mut self) -> Result<()> {
        if self.medium.is_read_only() {
            return Ok(());
        }
        self.file()?.sync_all()?;
        Ok(())
    }

    fn is_at_end(&mut self, offset: u64) -> Result<bool> {
        let length = self.file()?.metadata()?.len();
        Ok(offset >= length)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::medium::MediumAccessType;

    #[test]
    fn test_read_write_cycle() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("medium.bin");
        std::fs::write(&path, b"0123456789").unwrap();

        let mut accessor = FileAccessor::new(Medium::file(&path, MediumAccessType::ReadWrite));
        accessor.open().unwrap();

        assert_eq!(accessor.read_at(2, 3).unwrap().as_ref(), b"234");
        assert_eq!(accessor.position(), 5);

        accessor.write_at(8, b"abcd").unwrap();
        accessor.truncate(11).unwrap();
        accessor.sync().unwrap();

        assert_eq!(accessor.length(), Some(11));
        assert!(accessor.is_at_end(11).unwrap());
        assert!(!accessor.is_at_end(10).unwrap());
        accessor.close().unwrap();

        assert_eq!(std::fs::read(&path).unwrap(), b"01234567abc");
    }

    #[test]
    fn test_short_read_reports_partial_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("short.bin");
        std::fs::write(&path, b"abc").unwrap();

        let mut accessor = FileAccessor::new(Medium::file(&path, MediumAccessType::ReadOnly));
        accessor.open().unwrap();

        let error = accessor.read_at(1, 10).unwrap_err();
        let eom = error.as_end_of_medium().unwrap();
        assert_eq!(eom.bytes_read, 2);
        assert_eq!(eom.partial.as_ref(), b"bc");
    }

    #[test]
    fn test_read_only_file_rejects_writes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ro.bin");
        std::fs::write(&path, b"abc").unwrap();

        let mut accessor = FileAccessor::new(Medium::file(&path, MediumAccessType::ReadOnly));
        accessor.open().unwrap();

        assert!(matches!(
            accessor.write_at(0, b"x"),
            Err(StoreError::ReadOnlyMedium(_))
        ));
        assert!(matches!(accessor.open(), Err(StoreError::AlreadyOpen)));
    }

    #[test]
    fn test_missing_file_handling() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("new.bin");

        let mut read_only = FileAccessor::new(Medium::file(&path, MediumAccessType::ReadOnly));
        assert!(matches!(read_only.open(), Err(StoreError::Io(_))));

        let mut read_write = FileAccessor::new(Medium::file(&path, MediumAccessType::ReadWrite));
        read_write.open().unwrap();
        assert_eq!(read_write.length(), Some(0));
        assert!(path.exists());
    }

    #[test]
    fn test_closed_accessor_fails() {
        let mut accessor =
            FileAccessor::new(Medium::file("/nonexistent/x.bin", MediumAccessType::ReadOnly));

        assert!(matches!(accessor.read_at(0, 1), Err(StoreError::Closed)));
        assert!(matches!(accessor.close(), Err(StoreError::Closed)));
    }
}
