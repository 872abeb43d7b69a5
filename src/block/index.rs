//! Block index.
//!
//! Records where each flushed block lives in a shard's data stream so a
//! reader can seek straight to it.
//!
//! Record format (24 bytes, little-endian):
//!
//! ```text
//! [prefix: u64]
//! [offset: u64]   // byte offset of the block in the data stream
//! [length: u64]   // encoded block length in bytes
//! ```

use crate::error::{Error, Result};
use bytes::{Buf, BufMut, BytesMut};
use std::io::{Read, Write};

/// Size of one encoded index record.
pub const INDEX_RECORD_SIZE: usize = 24;

/// BlockHandle represents a pointer to a block in a shard's data stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockHandle {
    /// Offset of the block in the stream
    pub offset: u64,
    /// Length of the block in bytes
    pub length: u64,
}

impl BlockHandle {
    /// Create a new BlockHandle
    pub fn new(offset: u64, length: u64) -> Self {
        Self { offset, length }
    }

    /// Get the end offset of this block
    pub fn end_offset(&self) -> u64 {
        self.offset + self.length
    }
}

/// IndexRecord locates one block and names the prefix it holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexRecord {
    /// Prefix of every key in the block
    pub prefix: u64,
    /// Location of the block
    pub handle: BlockHandle,
}

impl IndexRecord {
    /// Create a new IndexRecord
    pub fn new(prefix: u64, handle: BlockHandle) -> Self {
        Self { prefix, handle }
    }

    /// Append the fixed-size encoding to `buf`.
    pub fn encode_to(&self, buf: &mut BytesMut) {
        buf.put_u64_le(self.prefix);
        buf.put_u64_le(self.handle.offset);
        buf.put_u64_le(self.handle.length);
    }

    /// Decode a record from exactly [`INDEX_RECORD_SIZE`] bytes.
    pub fn decode(mut data: &[u8]) -> Result<Self> {
        if data.len() != INDEX_RECORD_SIZE {
            return Err(Error::format(format!(
                "index record must be {} bytes, got {}",
                INDEX_RECORD_SIZE,
                data.len()
            )));
        }
        let prefix = data.get_u64_le();
        let offset = data.get_u64_le();
        let length = data.get_u64_le();
        Ok(Self::new(prefix, BlockHandle::new(offset, length)))
    }
}

/// The ordered list of blocks written to one shard.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BlockIndex {
    records: Vec<IndexRecord>,
}

impl BlockIndex {
    /// Create an empty index
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a newly written block
    pub fn push(&mut self, record: IndexRecord) {
        self.records.push(record);
    }

    /// Number of blocks
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Check if the index is empty
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// All records, in write order
    pub fn records(&self) -> &[IndexRecord] {
        &self.records
    }

    /// Records for `prefix`, in write order. A prefix presented to the
    /// writer in more than one run has more than one block.
    pub fn find(&self, prefix: u64) -> impl Iterator<Item = &IndexRecord> + '_ {
        self.records.iter().filter(move |r| r.prefix == prefix)
    }

    /// Serialize all records, returning the CRC32 of the bytes written.
    pub fn write_to<W: Write>(&self, writer: &mut W) -> Result<u32> {
        let mut buf = BytesMut::with_capacity(self.records.len() * INDEX_RECORD_SIZE);
        for record in &self.records {
            record.encode_to(&mut buf);
        }
        writer.write_all(&buf)?;
        Ok(crc32fast::hash(&buf))
    }

    /// Read an index written by [`BlockIndex::write_to`], returning it with
    /// the CRC32 of the bytes read.
    pub fn read_from<R: Read>(reader: &mut R) -> Result<(Self, u32)> {
        let mut data = Vec::new();
        reader.read_to_end(&mut data)?;

        if data.len() % INDEX_RECORD_SIZE != 0 {
            return Err(Error::format(format!(
                "index length {} is not a multiple of {}",
                data.len(),
                INDEX_RECORD_SIZE
            )));
        }

        let records = data
            .chunks_exact(INDEX_RECORD_SIZE)
            .map(IndexRecord::decode)
            .collect::<Result<Vec<_>>>()?;

        Ok((Self { records }, crc32fast::hash(&data)))
    }
}
