//! Journal table of contents (TOC).
//!
//! A TOC maps a journal block's index to the byte offset where that block
//! begins inside the journal file. Events persist only their block index,
//! so a journal can be compressed long after it was written: the compactor
//! rewrites the TOC's offsets while the indices stay stable, and readers
//! keep resolving events without ever tracking byte positions themselves.
//!
//! ## TOC File Format
//!
//! ```text
//! | magic (4) | version (1) | compressed (1) | reserved (2) | count (4) |
//! | entry[0]: offset (8) | entry[1]: offset (8) | ...
//! ```
//!
//! Entries are fixed width and positional: block index `i` lives at byte
//! `12 + i * 8`, so lookups are a single addressed read. All integers are
//! little-endian. The entry count is redundant with the file length; the
//! redundancy is what turns truncation into a detectable error instead of
//! a garbage offset.
//!
//! ## Invariants
//!
//! - Offsets are **strictly increasing** with block index
//! - Block indices are **dense**, starting at 0
//! - One TOC file has exactly **one writer** for its lifetime
//! - The compressed flag flips **at most once**, via [`TocRewriter`]
//! - A rewrite is **atomic**: readers see the old table or the new one,
//!   never a mixture; an already-open reader stays on the old table until
//!   its owner reopens it
//!
//! ## Durability
//!
//! [`TocWriter::add_block_offset`] flushes before returning, so a crash
//! never loses an acknowledged entry. The crash window between appending
//! an entry and bumping the header count leaves ignored trailing bytes,
//! which readers tolerate; the opposite direction (count pointing past
//! the data) is reported as a truncated file.

mod format;
mod reader;
mod rewrite;
mod writer;

pub use format::{TocHeader, ENTRY_SIZE, HEADER_SIZE, TOC_MAGIC, TOC_VERSION};
pub use reader::TocReader;
pub use rewrite::TocRewriter;
pub use writer::TocWriter;

use std::path::{Path, PathBuf};

/// Returns the TOC path paired with a journal file path.
///
/// The pair shares a base name and differs only in extension:
/// `jrnl-000001.journal` → `jrnl-000001.toc`.
#[must_use]
pub fn toc_path_for(journal: &Path) -> PathBuf {
    journal.with_extension("toc")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn toc_path_swaps_extension() {
        assert_eq!(
            toc_path_for(Path::new("/data/jrnl-000001.journal")),
            PathBuf::from("/data/jrnl-000001.toc")
        );
    }

    #[test]
    fn toc_path_keeps_directory() {
        let journal = Path::new("relative/dir/jrnl-000042.journal");
        let toc = toc_path_for(journal);
        assert_eq!(toc.parent(), journal.parent());
    }
}
