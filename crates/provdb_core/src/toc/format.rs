//! TOC binary format: header layout and entry encoding.

use crate::error::{CoreError, CoreResult};

/// Magic bytes identifying a TOC file.
pub const TOC_MAGIC: [u8; 4] = *b"PTOC";

/// Current TOC format version.
pub const TOC_VERSION: u8 = 1;

/// Header size in bytes.
/// magic (4) + version (1) + compressed (1) + reserved (2) + entry count (4)
pub const HEADER_SIZE: u64 = 12;

/// Byte position of the entry count field within the header.
pub const COUNT_OFFSET: u64 = 8;

/// Size of one entry: an 8-byte journal offset. The block index is implicit
/// from the entry's position.
pub const ENTRY_SIZE: u64 = 8;

/// Parsed TOC file header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TocHeader {
    /// Whether the corresponding journal file is compressed.
    pub compressed: bool,
    /// Number of entries the file declares.
    pub entry_count: u32,
}

impl TocHeader {
    /// Serializes the header.
    #[must_use]
    pub fn encode(&self) -> [u8; HEADER_SIZE as usize] {
        let mut buf = [0u8; HEADER_SIZE as usize];
        buf[0..4].copy_from_slice(&TOC_MAGIC);
        buf[4] = TOC_VERSION;
        buf[5] = u8::from(self.compressed);
        // bytes 6..8 reserved, zero
        buf[8..12].copy_from_slice(&self.entry_count.to_le_bytes());
        buf
    }

    /// Deserializes a header, failing closed on any unrecognized field.
    ///
    /// # Errors
    ///
    /// Returns `CorruptFormat` if the magic, version, or compressed flag
    /// byte is not recognized. Reserved bytes are ignored.
    pub fn decode(data: &[u8]) -> CoreResult<Self> {
        if data.len() < HEADER_SIZE as usize {
            return Err(CoreError::corrupt_format(format!(
                "header requires {HEADER_SIZE} bytes, got {}",
                data.len()
            )));
        }

        if data[0..4] != TOC_MAGIC {
            return Err(CoreError::corrupt_format(format!(
                "invalid magic {:02x?}",
                &data[0..4]
            )));
        }

        let version = data[4];
        if version != TOC_VERSION {
            return Err(CoreError::corrupt_format(format!(
                "unsupported version {version}"
            )));
        }

        let compressed = match data[5] {
            0 => false,
            1 => true,
            other => {
                return Err(CoreError::corrupt_format(format!(
                    "invalid compressed flag {other}"
                )))
            }
        };

        let entry_count = u32::from_le_bytes([data[8], data[9], data[10], data[11]]);

        Ok(Self {
            compressed,
            entry_count,
        })
    }
}

/// Byte position of the entry for the given block index.
#[must_use]
pub fn entry_position(block_index: u32) -> u64 {
    HEADER_SIZE + u64::from(block_index) * ENTRY_SIZE
}

/// Serializes one entry.
#[must_use]
pub fn encode_entry(offset: u64) -> [u8; ENTRY_SIZE as usize] {
    offset.to_le_bytes()
}

/// Deserializes one entry.
///
/// # Errors
///
/// Returns `CorruptFormat` if fewer than [`ENTRY_SIZE`] bytes are supplied.
pub fn decode_entry(data: &[u8]) -> CoreResult<u64> {
    let bytes: [u8; ENTRY_SIZE as usize] = data
        .get(..ENTRY_SIZE as usize)
        .and_then(|s| s.try_into().ok())
        .ok_or_else(|| CoreError::corrupt_format("entry requires 8 bytes"))?;
    Ok(u64::from_le_bytes(bytes))
}
