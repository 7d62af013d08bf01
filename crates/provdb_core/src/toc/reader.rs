//! TOC reader.

use crate::error::{CoreError, CoreResult};
use crate::toc::format::{decode_entry, entry_position, TocHeader, ENTRY_SIZE, HEADER_SIZE};
use provdb_storage::{FileBackend, StorageBackend, StorageError};
use std::io;
use std::path::Path;

/// Random-access lookup from block index to journal byte offset.
///
/// A `TocReader` parses and validates the header once at open. The header
/// state (entry count, compressed flag) is immutable afterwards: if the TOC
/// is rewritten by compaction, this instance keeps serving the old bytes and
/// must be reopened by its owner to see the rewrite. Lookups are bounds
/// checked against the bytes actually on disk, so a file that shrank after
/// open fails with `TruncatedFile` instead of returning garbage.
///
/// Any number of independent readers may be open over the same path.
/// Lookups take `&self`; [`close`](TocReader::close) takes `&mut self`, so
/// unsynchronized concurrent closes cannot compile.
pub struct TocReader {
    /// Storage backend; `None` once closed.
    backend: Option<Box<dyn StorageBackend>>,
    /// Compressed flag read from the header at open time.
    compressed: bool,
    /// Entry count declared by the header at open time.
    entry_count: u32,
}

impl TocReader {
    /// Opens and parses an existing TOC file.
    ///
    /// # Errors
    ///
    /// - `NotFound` if the path does not exist
    /// - `CorruptFormat` if the magic, version, or flag byte is unrecognized
    /// - `TruncatedFile` if the file is shorter than the header, or the
    ///   header declares more entries than the file holds
    pub fn open(path: &Path) -> CoreResult<Self> {
        if !path.exists() {
            return Err(CoreError::NotFound {
                path: path.to_path_buf(),
            });
        }

        let backend = FileBackend::open(path)?;
        Self::from_backend(Box::new(backend))
    }

    /// Opens a TOC over an arbitrary storage backend.
    ///
    /// # Errors
    ///
    /// Same as [`open`](TocReader::open), minus `NotFound`.
    pub fn from_backend(backend: Box<dyn StorageBackend>) -> CoreResult<Self> {
        let size = backend.size()?;
        if size < HEADER_SIZE {
            return Err(CoreError::TruncatedFile {
                expected: HEADER_SIZE,
                actual: size,
            });
        }

        let header_bytes = backend.read_at(0, HEADER_SIZE as usize)?;
        let header = TocHeader::decode(&header_bytes)?;

        // Bytes past the declared count are a writer crash artifact and are
        // ignored; fewer bytes than declared means the table was cut short.
        let declared_end = entry_position(header.entry_count);
        if declared_end > size {
            return Err(CoreError::TruncatedFile {
                expected: declared_end,
                actual: size,
            });
        }

        Ok(Self {
            backend: Some(backend),
            compressed: header.compressed,
            entry_count: header.entry_count,
        })
    }

    /// Returns the journal byte offset for the block with the given index.
    ///
    /// O(1): the entry is read directly at its fixed position.
    ///
    /// # Errors
    ///
    /// - `IndexOutOfRange` if `block_index` is at or beyond the entry count
    ///   present at open time
    /// - `TruncatedFile` if the file no longer holds the entry's bytes
    /// - `Closed` after [`close`](TocReader::close)
    pub fn get_block_offset(&self, block_index: u32) -> CoreResult<u64> {
        let backend = self.backend.as_ref().ok_or(CoreError::Closed)?;

        if block_index >= self.entry_count {
            return Err(CoreError::IndexOutOfRange {
                index: block_index,
                count: self.entry_count,
            });
        }

        let position = entry_position(block_index);
        let end = position + ENTRY_SIZE;

        match backend.read_at(position, ENTRY_SIZE as usize) {
            Ok(bytes) => decode_entry(&bytes),
            Err(StorageError::ReadPastEnd { size, .. }) => Err(CoreError::TruncatedFile {
                expected: end,
                actual: size,
            }),
            Err(StorageError::Io(e)) if e.kind() == io::ErrorKind::UnexpectedEof => {
                // Lost a race with a concurrent truncation
                let actual = backend.size().unwrap_or(0);
                Err(CoreError::TruncatedFile {
                    expected: end,
                    actual,
                })
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Returns the index of the block containing the given journal offset.
    ///
    /// This is the inverse of [`get_block_offset`]: the greatest index whose
    /// block begins at or before `journal_offset`. Returns `None` for an
    /// empty TOC or an offset before the first block. O(log n) binary search
    /// over the fixed-width table.
    ///
    /// # Errors
    ///
    /// Same as [`get_block_offset`].
    ///
    /// [`get_block_offset`]: TocReader::get_block_offset
    pub fn block_index_for_offset(&self, journal_offset: u64) -> CoreResult<Option<u32>> {
        if self.entry_count == 0 {
            // Preserve Closed over None for a closed reader
            self.backend.as_ref().ok_or(CoreError::Closed)?;
            return Ok(None);
        }

        if self.get_block_offset(0)? > journal_offset {
            return Ok(None);
        }

        // Invariant: entry(lo) <= journal_offset
        let mut lo = 0u32;
        let mut hi = self.entry_count - 1;
        while lo < hi {
            let mid = lo + (hi - lo).div_ceil(2);
            if self.get_block_offset(mid)? <= journal_offset {
                lo = mid;
            } else {
                hi = mid - 1;
            }
        }

        Ok(Some(lo))
    }

    /// Indicates whether the corresponding journal file is compressed.
    ///
    /// Reflects the header as of open; a rewrite after open is not visible
    /// until the reader is reopened.
    #[must_use]
    pub fn is_compressed(&self) -> bool {
        self.compressed
    }

    /// Returns the number of entries present at open time.
    #[must_use]
    pub fn block_count(&self) -> u32 {
        self.entry_count
    }

    /// Returns the offset of the last block, or `None` for an empty TOC.
    ///
    /// # Errors
    ///
    /// Same as [`get_block_offset`](TocReader::get_block_offset).
    pub fn last_block_offset(&self) -> CoreResult<Option<u64>> {
        if self.entry_count == 0 {
            self.backend.as_ref().ok_or(CoreError::Closed)?;
            return Ok(None);
        }
        self.get_block_offset(self.entry_count - 1).map(Some)
    }

    /// Releases the underlying file handle.
    ///
    /// Idempotent: closing a closed reader is a no-op. Other handles open
    /// on the same file are unaffected.
    pub fn close(&mut self) {
        self.backend = None;
    }
}

impl std::fmt::Debug for TocReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TocReader")
            .field("compressed", &self.compressed)
            .field("entry_count", &self.entry_count)
            .field("closed", &self.backend.is_none())
            .finish_non_exhaustive()
    }
}
