//! TOC writer.

use crate::error::{CoreError, CoreResult};
use crate::toc::format::{encode_entry, TocHeader, COUNT_OFFSET};
use provdb_storage::{FileBackend, StorageBackend};
use std::path::Path;
use tracing::debug;

/// Appends block-offset entries to a TOC file as its journal grows.
///
/// A `TocWriter` owns append access to one TOC file for the file's lifetime.
/// Block indices are assigned densely starting at 0; offsets must be supplied
/// in strictly increasing order. Each [`add_block_offset`] flushes the entry
/// and the updated header count before returning, so a crash never loses an
/// acknowledged entry.
///
/// The writer provides no internal locking: the journal layer above it is
/// responsible for serializing appends (one journal has one active writer).
///
/// # Crash window
///
/// The entry bytes are appended before the header count is bumped. A crash
/// between the two leaves trailing entry bytes beyond the declared count;
/// readers trust the declared count and ignore the tail.
///
/// [`add_block_offset`]: TocWriter::add_block_offset
pub struct TocWriter {
    /// Storage backend; `None` once closed.
    backend: Option<Box<dyn StorageBackend>>,
    /// Whether the corresponding journal is compressed.
    compressed: bool,
    /// Number of entries written so far.
    entry_count: u32,
    /// Offset of the most recent entry, for the monotonicity contract.
    last_offset: Option<u64>,
}

impl TocWriter {
    /// Creates a new TOC file at `path`, truncating any existing file, and
    /// writes the format header with the given `compressed` flag.
    ///
    /// # Errors
    ///
    /// Returns an error if the path cannot be created or truncated, or if
    /// the underlying storage rejects the header write.
    pub fn create(path: &Path, compressed: bool) -> CoreResult<Self> {
        let backend = FileBackend::create(path)?;
        let writer = Self::from_backend(Box::new(backend), compressed)?;
        debug!(path = %path.display(), compressed, "created TOC file");
        Ok(writer)
    }

    /// Creates a TOC over an arbitrary storage backend.
    ///
    /// The backend must be empty; the header is written immediately.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend is not empty or the header write fails.
    pub fn from_backend(mut backend: Box<dyn StorageBackend>, compressed: bool) -> CoreResult<Self> {
        if backend.size()? != 0 {
            return Err(CoreError::contract_violation(
                "TOC backend must be empty at creation",
            ));
        }

        let header = TocHeader {
            compressed,
            entry_count: 0,
        };
        backend.append(&header.encode())?;
        backend.flush()?;

        Ok(Self {
            backend: Some(backend),
            compressed,
            entry_count: 0,
            last_offset: None,
        })
    }

    /// Appends an entry for a block that begins at `offset` in the journal.
    ///
    /// Returns the block index assigned to the entry. The entry is durably
    /// flushed before this method returns.
    ///
    /// # Errors
    ///
    /// Returns `ContractViolation` if `offset` is not strictly greater than
    /// the previous offset, `Closed` after [`close`](TocWriter::close), or a
    /// storage error if the write fails.
    pub fn add_block_offset(&mut self, offset: u64) -> CoreResult<u32> {
        let backend = self.backend.as_mut().ok_or(CoreError::Closed)?;

        if let Some(last) = self.last_offset {
            if offset <= last {
                return Err(CoreError::contract_violation(format!(
                    "block offsets must be strictly increasing: {offset} after {last}"
                )));
            }
        }

        let index = self.entry_count;
        let new_count = index.checked_add(1).ok_or_else(|| {
            CoreError::contract_violation("block index space exhausted")
        })?;

        // Entry first, count second: a crash in between leaves an ignored
        // tail rather than a count pointing past the data.
        backend.append(&encode_entry(offset))?;
        backend.write_at(COUNT_OFFSET, &new_count.to_le_bytes())?;
        backend.flush()?;

        self.entry_count = new_count;
        self.last_offset = Some(offset);

        Ok(index)
    }

    /// Indicates whether the corresponding journal file is compressed.
    #[must_use]
    pub fn is_compressed(&self) -> bool {
        self.compressed
    }

    /// Returns the number of entries written so far.
    #[must_use]
    pub fn block_count(&self) -> u32 {
        self.entry_count
    }

    /// Returns the offset of the most recently added block, if any.
    #[must_use]
    pub fn last_block_offset(&self) -> Option<u64> {
        self.last_offset
    }

    /// Syncs data and metadata to disk.
    ///
    /// [`add_block_offset`](TocWriter::add_block_offset) already flushes to
    /// the OS; call this for durability across OS crashes as well.
    ///
    /// # Errors
    ///
    /// Returns `Closed` after close, or a storage error if the sync fails.
    pub fn sync(&mut self) -> CoreResult<()> {
        let backend = self.backend.as_mut().ok_or(CoreError::Closed)?;
        backend.sync()?;
        Ok(())
    }

    /// Flushes, syncs, and releases the underlying file handle.
    ///
    /// Idempotent: closing a closed writer is a no-op. Subsequent writes
    /// fail with `Closed`.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the final flush or sync fails.
    pub fn close(&mut self) -> CoreResult<()> {
        if let Some(mut backend) = self.backend.take() {
            backend.flush()?;
            backend.sync()?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for TocWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TocWriter")
            .field("compressed", &self.compressed)
            .field("entry_count", &self.entry_count)
            .field("closed", &self.backend.is_none())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::toc::format::{HEADER_SIZE, TOC_MAGIC, TOC_VERSION};
    use provdb_storage::InMemoryBackend;
    use tempfile::tempdir;

    fn create_writer(compressed: bool) -> TocWriter {
        TocWriter::from_backend(Box::new(InMemoryBackend::new()), compressed).unwrap()
    }

    #[test]
    fn assigns_dense_indices() {
        let mut writer = create_writer(false);

        assert_eq!(writer.add_block_offset(0).unwrap(), 0);
        assert_eq!(writer.add_block_offset(128).unwrap(), 1);
        assert_eq!(writer.add_block_offset(512).unwrap(), 2);
        assert_eq!(writer.block_count(), 3);
        assert_eq!(writer.last_block_offset(), Some(512));
    }

    #[test]
    fn rejects_non_increasing_offset() {
        let mut writer = create_writer(false);
        writer.add_block_offset(100).unwrap();

        let result = writer.add_block_offset(50);
        assert!(matches!(result, Err(CoreError::ContractViolation { .. })));
    }

    #[test]
    fn rejects_equal_offset() {
        let mut writer = create_writer(false);
        writer.add_block_offset(100).unwrap();

        let result = writer.add_block_offset(100);
        assert!(matches!(result, Err(CoreError::ContractViolation { .. })));
    }

    #[test]
    fn failed_append_does_not_advance_index() {
        let mut writer = create_writer(false);
        writer.add_block_offset(100).unwrap();

        writer.add_block_offset(50).unwrap_err();

        // The rejected offset must not consume an index
        assert_eq!(writer.add_block_offset(200).unwrap(), 1);
    }

    #[test]
    fn compressed_flag_is_reported() {
        assert!(!create_writer(false).is_compressed());
        assert!(create_writer(true).is_compressed());
    }

    #[test]
    fn close_is_idempotent() {
        let mut writer = create_writer(false);
        writer.add_block_offset(0).unwrap();

        writer.close().unwrap();
        writer.close().unwrap();
    }

    #[test]
    fn write_after_close_fails() {
        let mut writer = create_writer(false);
        writer.close().unwrap();

        let result = writer.add_block_offset(0);
        assert!(matches!(result, Err(CoreError::Closed)));

        let result = writer.sync();
        assert!(matches!(result, Err(CoreError::Closed)));
    }

    #[test]
    fn rejects_non_empty_backend() {
        let backend = InMemoryBackend::with_data(vec![0xAA; 16]);
        let result = TocWriter::from_backend(Box::new(backend), false);
        assert!(matches!(result, Err(CoreError::ContractViolation { .. })));
    }

    #[test]
    fn create_writes_header_bytes() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("journal.toc");

        let mut writer = TocWriter::create(&path, true).unwrap();
        writer.add_block_offset(64).unwrap();
        writer.close().unwrap();

        let bytes = std::fs::read(&path).unwrap();
        assert_eq!(bytes.len() as u64, HEADER_SIZE + 8);
        assert_eq!(&bytes[0..4], &TOC_MAGIC);
        assert_eq!(bytes[4], TOC_VERSION);
        assert_eq!(bytes[5], 1);
        assert_eq!(u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]), 1);
        assert_eq!(
            u64::from_le_bytes(bytes[12..20].try_into().unwrap()),
            64
        );
    }

    #[test]
    fn create_truncates_existing_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("journal.toc");

        {
            let mut writer = TocWriter::create(&path, false).unwrap();
            writer.add_block_offset(0).unwrap();
            writer.add_block_offset(100).unwrap();
            writer.close().unwrap();
        }

        let mut writer = TocWriter::create(&path, false).unwrap();
        assert_eq!(writer.block_count(), 0);
        writer.close().unwrap();

        let bytes = std::fs::read(&path).unwrap();
        assert_eq!(bytes.len() as u64, HEADER_SIZE);
    }
}
