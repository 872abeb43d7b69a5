//! Block format.
//!
//! A block is the durable encoding of one flushed batch: every
//! (suffix, value) pair buffered for a single prefix.
//!
//! ## Block Format
//!
//! ```text
//! [prefix: 64 bits]
//! [count: 64 bits]
//! [suffix_1: suffix_bits][value_1: value_bits]
//! ...
//! [suffix_N: suffix_bits][value_N: value_bits]
//! [zero padding to a 64-bit word]
//! ```
//!
//! Fields are bit-packed with no padding between them (see [`crate::bits`])
//! and the resulting words are stored little-endian.
//!
//! ## Index Format
//!
//! Each shard keeps a side index with one fixed-size [`IndexRecord`] per
//! block, in the order the blocks were written.

pub mod index;

pub use index::{BlockHandle, BlockIndex, IndexRecord, INDEX_RECORD_SIZE};

use crate::bits::{words_for_bits, BitReader, BitWriter};
use crate::error::{Error, Result};
use crate::key::{mask, KeyLayout};
use bytes::{Buf, BufMut, Bytes, BytesMut};

/// Size of the block header in bits (prefix + count).
pub const BLOCK_HEADER_BITS: u64 = 128;

/// A decoded block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    /// Prefix shared by every key in the block.
    pub prefix: u64,
    /// Stored suffixes, in insertion order.
    pub suffixes: Vec<u64>,
    /// Values paired with `suffixes`.
    pub values: Vec<u64>,
}

impl Block {
    /// Number of entries.
    pub fn len(&self) -> usize {
        self.suffixes.len()
    }

    /// Check if the block holds no entries.
    pub fn is_empty(&self) -> bool {
        self.suffixes.is_empty()
    }

    /// Iterate over `(suffix, value)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (u64, u64)> + '_ {
        self.suffixes.iter().copied().zip(self.values.iter().copied())
    }

    /// Iterate over full `(key, value)` pairs.
    pub fn entries(&self, layout: KeyLayout) -> impl Iterator<Item = (u64, u64)> + '_ {
        let prefix = self.prefix;
        self.iter().map(move |(suffix, value)| (layout.join(prefix, suffix), value))
    }
}

/// Encodes and decodes blocks for fixed suffix and value widths.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockCodec {
    suffix_bits: u32,
    value_bits: u32,
}

impl BlockCodec {
    /// Create a codec.
    pub fn new(suffix_bits: u32, value_bits: u32) -> Self {
        Self { suffix_bits, value_bits }
    }

    /// Bits used by one (suffix, value) pair.
    pub fn entry_bits(&self) -> u64 {
        self.suffix_bits as u64 + self.value_bits as u64
    }

    /// Encoded size in bytes of a block with `count` entries.
    pub fn encoded_len(&self, count: usize) -> usize {
        words_for_bits(BLOCK_HEADER_BITS + count as u64 * self.entry_bits()) * 8
    }

    /// Encode a block.
    pub fn encode(&self, prefix: u64, suffixes: &[u64], values: &[u64]) -> Result<Bytes> {
        if suffixes.len() != values.len() {
            return Err(Error::invalid_argument(format!(
                "block has {} suffixes but {} values",
                suffixes.len(),
                values.len()
            )));
        }

        let count = suffixes.len();
        let mut writer =
            BitWriter::with_capacity(BLOCK_HEADER_BITS + count as u64 * self.entry_bits())?;
        writer.write_field(64, prefix)?;
        writer.write_field(64, count as u64)?;

        let suffix_mask = mask(self.suffix_bits);
        let value_mask = mask(self.value_bits);
        for (&suffix, &value) in suffixes.iter().zip(values) {
            writer.write_field(self.suffix_bits, suffix & suffix_mask)?;
            writer.write_field(self.value_bits, value & value_mask)?;
        }

        let words = writer.finish();
        let mut buffer = BytesMut::with_capacity(words.len() * 8);
        for word in words {
            buffer.put_u64_le(word);
        }
        Ok(buffer.freeze())
    }

    /// Decode a block from its encoded bytes.
    pub fn decode(&self, data: &[u8]) -> Result<Block> {
        if data.len() % 8 != 0 || (data.len() as u64) * 8 < BLOCK_HEADER_BITS {
            return Err(Error::format(format!("invalid block length {}", data.len())));
        }

        let mut cursor = data;
        let mut words = Vec::with_capacity(data.len() / 8);
        while cursor.has_remaining() {
            words.push(cursor.get_u64_le());
        }

        let mut reader = BitReader::new(&words);
        let prefix = reader.read_field(64)?;
        let count = reader.read_field(64)?;

        let fits = count
            .checked_mul(self.entry_bits())
            .is_some_and(|bits| bits <= reader.remaining());
        if !fits {
            return Err(Error::format(format!(
                "block claims {} entries but holds only {} payload bits",
                count,
                reader.remaining()
            )));
        }

        let mut suffixes = Vec::with_capacity(count as usize);
        let mut values = Vec::with_capacity(count as usize);
        for _ in 0..count {
            suffixes.push(reader.read_field(self.suffix_bits)?);
            values.push(reader.read_field(self.value_bits)?);
        }

        Ok(Block { prefix, suffixes, values })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_layout() {
        let codec = BlockCodec::new(4, 8);
        let data = codec.encode(3, &[0x1, 0xf], &[0xaa, 0x01]).unwrap();

        // 128 header bits + 2 * 12 payload bits -> 3 words.
        assert_eq!(data.len(), 24);
        assert_eq!(codec.encoded_len(2), 24);
        assert_eq!(u64::from_le_bytes(data[0..8].try_into().unwrap()), 3);
        assert_eq!(u64::from_le_bytes(data[8..16].try_into().unwrap()), 2);

        let payload = u64::from_le_bytes(data[16..24].try_into().unwrap());
        assert_eq!(payload >> 40, 0x1_aa_f_01);
    }

    #[test]
    fn test_block_decode() {
        let codec = BlockCodec::new(20, 32);
        let suffixes: Vec<u64> = (0..100).map(|i| i * 7919 % (1 << 20)).collect();
        let values: Vec<u64> = (0..100).map(|i| i * 3 + 1).collect();

        let data = codec.encode(42, &suffixes, &values).unwrap();
        let block = codec.decode(&data).unwrap();

        assert_eq!(block.prefix, 42);
        assert_eq!(block.len(), 100);
        assert_eq!(block.suffixes, suffixes);
        assert_eq!(block.values, values);
    }

    #[test]
    fn test_empty_block() {
        let codec = BlockCodec::new(10, 10);
        let data = codec.encode(9, &[], &[]).unwrap();
        assert_eq!(data.len(), 16);

        let block = codec.decode(&data).unwrap();
        assert!(block.is_empty());
        assert_eq!(block.prefix, 9);
    }

    #[test]
    fn test_block_entries_rebuild_keys() {
        let layout = KeyLayout::new(4, 0, 4);
        let codec = BlockCodec::new(4, 16);
        let data = codec.encode(1, &[0, 1], &[5, 6]).unwrap();
        let block = codec.decode(&data).unwrap();

        let entries: Vec<_> = block.entries(layout).collect();
        assert_eq!(entries, vec![(0x10, 5), (0x11, 6)]);
    }

    #[test]
    fn test_mismatched_lengths() {
        let codec = BlockCodec::new(4, 4);
        let result = codec.encode(0, &[1, 2], &[1]);
        assert!(matches!(result, Err(Error::InvalidArgument(_))));
    }

    #[test]
    fn test_truncated_block() {
        let codec = BlockCodec::new(16, 16);
        let data = codec.encode(0, &[1, 2, 3, 4, 5], &[1, 2, 3, 4, 5]).unwrap();

        let result = codec.decode(&data[..16]);
        assert!(matches!(result, Err(Error::Format(_))));

        let result = codec.decode(&data[..13]);
        assert!(matches!(result, Err(Error::Format(_))));
    }
}
