//! Key splitting.
//!
//! A key is a fixed-width integer divided into a prefix and a suffix:
//!
//! ```text
//! |<-------------- prefix_bits -------------->|<-- suffix_bits -->|
//! |  num_files_bits  |     num_blocks_bits     |      suffix       |
//! |      shard       |   block within shard    |  stored payload   |
//! ```

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// Mask of the low `bits` bits.
#[inline]
pub fn mask(bits: u32) -> u64 {
    if bits >= 64 {
        u64::MAX
    } else {
        (1u64 << bits) - 1
    }
}

/// Splits `key` into `(prefix, suffix)` at `suffix_bits`.
#[inline]
pub fn split(key: u64, suffix_bits: u32) -> (u64, u64) {
    let prefix = key.checked_shr(suffix_bits).unwrap_or(0);
    (prefix, key & mask(suffix_bits))
}

/// Inverse of [`split`].
#[inline]
pub fn join(prefix: u64, suffix: u64, suffix_bits: u32) -> u64 {
    prefix.checked_shl(suffix_bits).unwrap_or(0) | (suffix & mask(suffix_bits))
}

/// Bit widths shared by every writer and reader of one database.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyLayout {
    suffix_bits: u32,
    num_files_bits: u32,
    num_blocks_bits: u32,
}

impl KeyLayout {
    /// Create a layout. Widths are checked by [`crate::Options::validate`].
    pub fn new(suffix_bits: u32, num_files_bits: u32, num_blocks_bits: u32) -> Self {
        Self { suffix_bits, num_files_bits, num_blocks_bits }
    }

    /// Width of the stored suffix.
    pub fn suffix_bits(&self) -> u32 {
        self.suffix_bits
    }

    /// Width of the shard selector.
    pub fn num_files_bits(&self) -> u32 {
        self.num_files_bits
    }

    /// Width of the block-within-shard selector.
    pub fn num_blocks_bits(&self) -> u32 {
        self.num_blocks_bits
    }

    /// Total prefix width.
    pub fn prefix_bits(&self) -> u32 {
        self.num_files_bits.saturating_add(self.num_blocks_bits)
    }

    /// Total key width.
    pub fn key_bits(&self) -> u32 {
        self.prefix_bits().saturating_add(self.suffix_bits)
    }

    /// Number of shards (output files).
    pub fn num_shards(&self) -> u32 {
        1u32 << self.num_files_bits
    }

    /// Number of block slots per shard, saturating at `u64::MAX`.
    pub fn blocks_per_shard(&self) -> u64 {
        1u64.checked_shl(self.num_blocks_bits).unwrap_or(u64::MAX)
    }

    /// Split a key into `(prefix, suffix)`.
    #[inline]
    pub fn split(&self, key: u64) -> (u64, u64) {
        split(key, self.suffix_bits)
    }

    /// Rebuild a key from its prefix and suffix.
    #[inline]
    pub fn join(&self, prefix: u64, suffix: u64) -> u64 {
        join(prefix, suffix, self.suffix_bits)
    }

    /// Shard holding `prefix`: its high `num_files_bits` bits.
    #[inline]
    pub fn shard_of(&self, prefix: u64) -> u32 {
        prefix.checked_shr(self.num_blocks_bits).unwrap_or(0) as u32
    }

    /// Block slot of `prefix` within its shard: its low `num_blocks_bits` bits.
    #[inline]
    pub fn block_of(&self, prefix: u64) -> u64 {
        prefix & mask(self.num_blocks_bits)
    }

    /// Split `key`, rejecting keys whose prefix is wider than the layout.
    pub fn checked_split(&self, key: u64) -> Result<(u64, u64)> {
        let (prefix, suffix) = self.split(key);
        if prefix > mask(self.prefix_bits()) {
            return Err(Error::invalid_argument(format!(
                "key {:#x} is wider than the {}-bit layout",
                key,
                self.key_bits()
            )));
        }
        Ok((prefix, suffix))
    }
}
