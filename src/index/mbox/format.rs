//! Persisted header index format.
//!
//! ```text
//! ┌──────────────────────────────────────┐
//! │ HEADER (128 bytes, fixed)            │
//! │  magic: [u8; 8] = b"TAGVIEW\0"       │
//! │  version: u32                        │
//! │  message_count: u64                  │
//! │  mbox_file_size: u64                 │
//! │  mbox_modified_time: i64             │
//! │  sha256_first_4kb: [u8; 32]          │
//! │  (padding to 128 bytes)              │
//! ├──────────────────────────────────────┤
//! │ ENTRIES (variable)                   │
//! │  bincode-serialized Vec<IndexEntry>  │
//! └──────────────────────────────────────┘
//! ```

use serde::{Deserialize, Serialize};

/// Magic bytes identifying a tagview header index.
pub const MAGIC: &[u8; 8] = b"TAGVIEW\0";

/// Current index format version. Bump whenever `IndexEntry` changes shape.
pub const VERSION: u32 = 1;

/// Fixed header size in bytes.
pub const HEADER_SIZE: usize = 128;

/// Number of leading mbox bytes covered by the content hash.
pub const HASH_PREFIX_LEN: usize = 4096;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexHeader {
    pub magic: [u8; 8],
    pub version: u32,
    pub message_count: u64,
    /// Size of the mbox when the index was built.
    pub mbox_file_size: u64,
    /// Modification time of the mbox (Unix seconds).
    pub mbox_modified_time: i64,
    pub sha256_first_4kb: [u8; 32],
}

impl IndexHeader {
    /// Check magic and version.
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.magic != *MAGIC {
            return Err("invalid magic bytes".into());
        }
        if self.version != VERSION {
            return Err(format!(
                "incompatible version: expected {VERSION}, found {}",
                self.version
            ));
        }
        Ok(())
    }

    /// Serialize and zero-pad to [`HEADER_SIZE`].
    pub fn to_padded_bytes(&self) -> bincode::Result<Vec<u8>> {
        let bytes = bincode::serialize(self)?;
        let mut padded = vec![0u8; HEADER_SIZE];
        let len = bytes.len().min(HEADER_SIZE);
        padded[..len].copy_from_slice(&bytes[..len]);
        Ok(padded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header() -> IndexHeader {
        IndexHeader {
            magic: *MAGIC,
            version: VERSION,
            message_count: 3,
            mbox_file_size: 1024,
            mbox_modified_time: 1_700_000_000,
            sha256_first_4kb: [7; 32],
        }
    }

    #[test]
    fn test_header_fits_fixed_size() {
        let bytes = header().to_padded_bytes().unwrap();
        assert_eq!(bytes.len(), HEADER_SIZE);
        let back: IndexHeader = bincode::deserialize(&bytes).unwrap();
        assert_eq!(back, header());
    }

    #[test]
    fn test_validate_rejects_foreign_files() {
        let mut h = header();
        h.magic = *b"MBOXTUI\0";
        assert!(h.validate().is_err());

        let mut h = header();
        h.version = VERSION + 1;
        assert!(h.validate().unwrap_err().contains("incompatible version"));

        assert!(header().validate().is_ok());
    }
}
