//! Atomic TOC rewrite for journal compaction.

use crate::error::CoreResult;
use crate::toc::writer::TocWriter;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Suffix appended to the TOC file name for the rewrite scratch file.
const REWRITE_SUFFIX: &str = ".rewrite.tmp";

/// Rebuilds a TOC file in place after its journal has been compressed.
///
/// When a compactor shrinks a journal's blocks it must rewrite every byte
/// offset in the TOC and flip the compressed flag, without any reader ever
/// observing a half-rewritten table. `TocRewriter` achieves that the same
/// way provdb writes other metadata: the new table is built in a scratch
/// file next to the original, synced, and renamed over it in one atomic
/// step.
///
/// Readers that were open before [`commit`] keep serving the old bytes and
/// must be reopened by their owners to see the rewrite; that refresh is the
/// caller's documented responsibility.
///
/// Dropping an uncommitted rewriter removes the scratch file best-effort.
///
/// # Example
///
/// ```ignore
/// let mut rewrite = TocRewriter::begin(&toc_path, true)?;
/// for offset in compressed_block_offsets {
///     rewrite.add_block_offset(offset)?;
/// }
/// rewrite.commit()?;
/// ```
///
/// [`commit`]: TocRewriter::commit
pub struct TocRewriter {
    /// Writer over the scratch file.
    writer: TocWriter,
    /// The scratch file being built.
    temp_path: PathBuf,
    /// The TOC file to replace on commit.
    target_path: PathBuf,
    /// Set once the scratch file has been consumed by commit or abort.
    finished: bool,
}

impl TocRewriter {
    /// Starts a rewrite of the TOC file at `path`.
    ///
    /// The new table is built in a scratch file in the same directory; the
    /// file at `path` is untouched until [`commit`](TocRewriter::commit).
    ///
    /// # Errors
    ///
    /// Returns an error if the scratch file cannot be created.
    pub fn begin(path: &Path, compressed: bool) -> CoreResult<Self> {
        let mut name = path.as_os_str().to_os_string();
        name.push(REWRITE_SUFFIX);
        let temp_path = PathBuf::from(name);

        let writer = TocWriter::create(&temp_path, compressed)?;

        Ok(Self {
            writer,
            temp_path,
            target_path: path.to_path_buf(),
            finished: false,
        })
    }

    /// Appends an entry to the rewritten table.
    ///
    /// Same contract as [`TocWriter::add_block_offset`]: offsets strictly
    /// increasing, dense indices from 0.
    ///
    /// # Errors
    ///
    /// Same as [`TocWriter::add_block_offset`].
    pub fn add_block_offset(&mut self, offset: u64) -> CoreResult<u32> {
        self.writer.add_block_offset(offset)
    }

    /// Returns the number of entries written to the new table so far.
    #[must_use]
    pub fn block_count(&self) -> u32 {
        self.writer.block_count()
    }

    /// Atomically replaces the original TOC file with the rewritten table.
    ///
    /// The scratch file is flushed and synced, renamed over the original,
    /// and the parent directory is synced so the rename survives a crash.
    ///
    /// # Errors
    ///
    /// Returns an error if the final sync or the rename fails; the original
    /// file is left intact in that case.
    pub fn commit(mut self) -> CoreResult<()> {
        self.writer.close()?;
        fs::rename(&self.temp_path, &self.target_path)?;
        sync_parent_dir(&self.target_path)?;
        self.finished = true;

        debug!(
            path = %self.target_path.display(),
            entries = self.writer.block_count(),
            "rewrote TOC file"
        );
        Ok(())
    }

    /// Abandons the rewrite, removing the scratch file.
    ///
    /// The original TOC file is untouched.
    ///
    /// # Errors
    ///
    /// Returns an error if the scratch file cannot be removed.
    pub fn abort(mut self) -> CoreResult<()> {
        self.writer.close()?;
        fs::remove_file(&self.temp_path)?;
        self.finished = true;
        Ok(())
    }
}

impl Drop for TocRewriter {
    fn drop(&mut self) {
        if !self.finished {
            let _ = self.writer.close();
            let _ = fs::remove_file(&self.temp_path);
        }
    }
}

impl std::fmt::Debug for TocRewriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TocRewriter")
            .field("target_path", &self.target_path)
            .field("entries", &self.writer.block_count())
            .finish_non_exhaustive()
    }
}

/// Syncs the directory containing `path` so a rename is durable.
///
/// On Unix, fsync on a directory flushes its entries. Windows NTFS journals
/// metadata operations, so the explicit fsync is skipped there.
#[cfg(unix)]
fn sync_parent_dir(path: &Path) -> CoreResult<()> {
    if let Some(parent) = path.parent() {
        let dir = fs::File::open(parent)?;
        dir.sync_all()?;
    }
    Ok(())
}

#[cfg(not(unix))]
fn sync_parent_dir(_path: &Path) -> CoreResult<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CoreError;
    use crate::toc::reader::TocReader;
    use tempfile::tempdir;

    fn write_initial_toc(path: &Path, offsets: &[u64]) {
        let mut writer = TocWriter::create(path, false).unwrap();
        for &offset in offsets {
            writer.add_block_offset(offset).unwrap();
        }
        writer.close().unwrap();
    }

    fn temp_files(dir: &Path) -> Vec<PathBuf> {
        fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().path())
            .filter(|p| p.to_string_lossy().ends_with(REWRITE_SUFFIX))
            .collect()
    }

    #[test]
    fn commit_replaces_offsets_and_flips_flag() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("journal.toc");
        write_initial_toc(&path, &[0, 128, 512]);

        let mut rewrite = TocRewriter::begin(&path, true).unwrap();
        for offset in [0, 64, 256] {
            rewrite.add_block_offset(offset).unwrap();
        }
        rewrite.commit().unwrap();

        let reader = TocReader::open(&path).unwrap();
        assert!(reader.is_compressed());
        assert_eq!(reader.block_count(), 3);
        assert_eq!(reader.get_block_offset(0).unwrap(), 0);
        assert_eq!(reader.get_block_offset(1).unwrap(), 64);
        assert_eq!(reader.get_block_offset(2).unwrap(), 256);

        assert!(temp_files(dir.path()).is_empty());
    }

    #[test]
    fn reader_opened_before_commit_is_stale() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("journal.toc");
        write_initial_toc(&path, &[0, 128, 512]);

        let stale = TocReader::open(&path).unwrap();

        let mut rewrite = TocRewriter::begin(&path, true).unwrap();
        for offset in [0, 64, 256] {
            rewrite.add_block_offset(offset).unwrap();
        }
        rewrite.commit().unwrap();

        // The old handle still serves the pre-rewrite bytes; the owner must
        // reopen to see the new table.
        assert!(!stale.is_compressed());
        assert_eq!(stale.get_block_offset(1).unwrap(), 128);

        let fresh = TocReader::open(&path).unwrap();
        assert!(fresh.is_compressed());
        assert_eq!(fresh.get_block_offset(1).unwrap(), 64);
    }

    #[test]
    fn abort_leaves_original_intact() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("journal.toc");
        write_initial_toc(&path, &[0, 128]);

        let mut rewrite = TocRewriter::begin(&path, true).unwrap();
        rewrite.add_block_offset(0).unwrap();
        rewrite.abort().unwrap();

        let reader = TocReader::open(&path).unwrap();
        assert!(!reader.is_compressed());
        assert_eq!(reader.block_count(), 2);
        assert_eq!(reader.get_block_offset(1).unwrap(), 128);

        assert!(temp_files(dir.path()).is_empty());
    }

    #[test]
    fn dropped_rewrite_cleans_up_scratch_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("journal.toc");
        write_initial_toc(&path, &[0, 128]);

        {
            let mut rewrite = TocRewriter::begin(&path, true).unwrap();
            rewrite.add_block_offset(0).unwrap();
            assert_eq!(temp_files(dir.path()).len(), 1);
        }

        assert!(temp_files(dir.path()).is_empty());

        let reader = TocReader::open(&path).unwrap();
        assert_eq!(reader.block_count(), 2);
    }

    #[test]
    fn rewrite_to_empty_table() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("journal.toc");
        write_initial_toc(&path, &[0, 128]);

        let rewrite = TocRewriter::begin(&path, true).unwrap();
        rewrite.commit().unwrap();

        let reader = TocReader::open(&path).unwrap();
        assert!(reader.is_compressed());
        assert_eq!(reader.block_count(), 0);
    }

    #[test]
    fn rewriter_enforces_monotonic_offsets() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("journal.toc");
        write_initial_toc(&path, &[0, 128]);

        let mut rewrite = TocRewriter::begin(&path, true).unwrap();
        rewrite.add_block_offset(100).unwrap();

        let result = rewrite.add_block_offset(100);
        assert!(matches!(result, Err(CoreError::ContractViolation { .. })));
    }
}
