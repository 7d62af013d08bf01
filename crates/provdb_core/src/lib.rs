//! # provdb Core
//!
//! Journal table-of-contents (TOC) subsystem for the provdb event store.
//!
//! provdb journals are append-only files holding immutable event records,
//! grouped into contiguous blocks. Each journal has a sibling `.toc` file
//! mapping a block's index to the byte offset where that block begins, so
//! readers can seek straight to a block and a background compressor can
//! rewrite offsets after shrinking the journal.
//!
//! This crate provides:
//! - [`TocWriter`] - appends block offsets as the journal grows
//! - [`TocReader`] - random-access block index → byte offset lookup
//! - [`TocRewriter`] - atomic whole-table rewrite after journal compression
//! - [`JournalDir`] - directory layout and locking for journal/TOC pairs

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod dir;
mod error;
pub mod toc;

pub use dir::JournalDir;
pub use error::{CoreError, CoreResult};
pub use toc::{toc_path_for, TocReader, TocRewriter, TocWriter};
