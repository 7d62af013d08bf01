//! Journal directory management.
//!
//! This module handles the file system layout for a provdb journal
//! directory:
//!
//! ```text
//! <journal_path>/
//! ├─ LOCK                 # Advisory lock for single-writer
//! ├─ jrnl-000001.journal  # Append-only event blocks
//! ├─ jrnl-000001.toc      # Block index → byte offset table
//! ├─ jrnl-000002.journal
//! └─ jrnl-000002.toc
//! ```
//!
//! Each journal file has exactly one TOC sibling sharing its base name;
//! the pair is created and deleted together. The LOCK file ensures only
//! one process appends to the directory's journals at a time; readers do
//! not take the lock.

use crate::error::{CoreError, CoreResult};
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use tracing::debug;

/// File names within the journal directory.
const LOCK_FILE: &str = "LOCK";
/// Prefix for journal file names.
const JOURNAL_PREFIX: &str = "jrnl-";
/// Extension for journal files.
const JOURNAL_EXT: &str = "journal";
/// Extension for TOC files.
const TOC_EXT: &str = "toc";

/// Manages the journal directory structure and file locking.
///
/// # Thread Safety
///
/// The `JournalDir` holds an exclusive advisory lock on the directory.
/// Only one `JournalDir` instance can exist per directory at a time,
/// which is what serializes writers across processes.
///
/// # Example
///
/// ```rust,ignore
/// use provdb_core::dir::JournalDir;
/// use std::path::Path;
///
/// let dir = JournalDir::open(Path::new("journals"), true)?;
/// let toc = dir.toc_path(1);
/// ```
#[derive(Debug)]
pub struct JournalDir {
    /// Root directory path.
    path: PathBuf,
    /// Lock file handle (held for exclusive access).
    _lock_file: File,
}

impl JournalDir {
    /// Opens or creates a journal directory.
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the journal directory
    /// * `create_if_missing` - If true, creates the directory if it doesn't exist
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The directory doesn't exist and `create_if_missing` is false
    /// - Another process holds the lock (returns `JournalLocked`)
    /// - I/O errors occur
    pub fn open(path: &Path, create_if_missing: bool) -> CoreResult<Self> {
        if !path.exists() {
            if create_if_missing {
                fs::create_dir_all(path)?;
            } else {
                return Err(CoreError::NotFound {
                    path: path.to_path_buf(),
                });
            }
        }

        if !path.is_dir() {
            return Err(CoreError::contract_violation(format!(
                "path is not a directory: {}",
                path.display()
            )));
        }

        // Acquire exclusive lock (non-blocking)
        let lock_path = path.join(LOCK_FILE);
        let lock_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&lock_path)?;

        if lock_file.try_lock_exclusive().is_err() {
            return Err(CoreError::JournalLocked);
        }

        Ok(Self {
            path: path.to_path_buf(),
            _lock_file: lock_file,
        })
    }

    /// Returns the path to the journal directory.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the path to a journal file.
    ///
    /// # Arguments
    ///
    /// * `journal_id` - The journal ID (e.g., 1 produces "jrnl-000001.journal")
    #[must_use]
    pub fn journal_path(&self, journal_id: u64) -> PathBuf {
        self.path
            .join(format!("{JOURNAL_PREFIX}{journal_id:06}.{JOURNAL_EXT}"))
    }

    /// Returns the path to the TOC file paired with a journal.
    #[must_use]
    pub fn toc_path(&self, journal_id: u64) -> PathBuf {
        self.path
            .join(format!("{JOURNAL_PREFIX}{journal_id:06}.{TOC_EXT}"))
    }

    /// Lists the IDs of all journals present in the directory, sorted.
    ///
    /// A journal counts as present when its `.journal` file exists; TOC
    /// files are not consulted.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be read.
    pub fn list_journal_ids(&self) -> CoreResult<Vec<u64>> {
        let mut ids = Vec::new();

        for entry in fs::read_dir(&self.path)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some(JOURNAL_EXT) {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let Some(digits) = stem.strip_prefix(JOURNAL_PREFIX) else {
                continue;
            };
            if let Ok(id) = digits.parse::<u64>() {
                ids.push(id);
            }
        }

        ids.sort_unstable();
        Ok(ids)
    }

    /// Deletes a journal file and its TOC file together.
    ///
    /// The pair invariant means neither file may outlive the other; after
    /// deletion the directory is fsynced so the removal is durable.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the journal file does not exist, or an I/O
    /// error if removal fails.
    pub fn delete_journal(&self, journal_id: u64) -> CoreResult<()> {
        let journal_path = self.journal_path(journal_id);
        let toc_path = self.toc_path(journal_id);

        if !journal_path.exists() {
            return Err(CoreError::NotFound { path: journal_path });
        }

        fs::remove_file(&journal_path)?;
        if toc_path.exists() {
            fs::remove_file(&toc_path)?;
        }

        self.sync_directory()?;
        debug!(journal_id, "deleted journal and TOC pair");

        Ok(())
    }

    /// Syncs the journal directory so file creations, renames, and
    /// deletions are durable.
    #[cfg(unix)]
    fn sync_directory(&self) -> CoreResult<()> {
        let dir = File::open(&self.path)?;
        dir.sync_all()?;
        Ok(())
    }

    #[cfg(not(unix))]
    fn sync_directory(&self) -> CoreResult<()> {
        // Windows NTFS journal provides metadata durability guarantees
        Ok(())
    }
}
