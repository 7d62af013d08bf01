//! Error types for provdb core.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in provdb core operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Storage backend error.
    #[error("storage error: {0}")]
    Storage(#[from] provdb_storage::StorageError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The path does not exist.
    #[error("not found: {path}")]
    NotFound {
        /// The path that was opened.
        path: PathBuf,
    },

    /// The TOC file has an unrecognized magic or version.
    #[error("corrupt TOC format: {message}")]
    CorruptFormat {
        /// Description of the format problem.
        message: String,
    },

    /// The TOC file holds fewer bytes than its header declares.
    #[error("truncated TOC file: expected {expected} bytes, found {actual}")]
    TruncatedFile {
        /// The number of bytes the header declares.
        expected: u64,
        /// The number of bytes actually present.
        actual: u64,
    },

    /// A block index outside the valid range was requested.
    #[error("block index {index} out of range: TOC holds {count} entries")]
    IndexOutOfRange {
        /// The requested block index.
        index: u32,
        /// The number of entries present at open time.
        count: u32,
    },

    /// The caller violated an API contract.
    #[error("contract violation: {message}")]
    ContractViolation {
        /// Description of the violated contract.
        message: String,
    },

    /// Operation on a closed reader or writer.
    #[error("TOC handle is closed")]
    Closed,

    /// Another process holds the journal directory lock.
    #[error("journal directory locked: another process has exclusive access")]
    JournalLocked,
}

impl CoreError {
    /// Creates a corrupt format error.
    pub fn corrupt_format(message: impl Into<String>) -> Self {
        Self::CorruptFormat {
            message: message.into(),
        }
    }

    /// Creates a contract violation error.
    pub fn contract_violation(message: impl Into<String>) -> Self {
        Self::ContractViolation {
            message: message.into(),
        }
    }
}
