//! Per-shard batching writer.

use super::Shared;
use crate::block::{BlockHandle, BlockIndex, IndexRecord};
use crate::error::{Error, Result};
use crate::key::mask;
use crate::manifest::ShardInfo;
use std::io::Write;
use std::sync::Arc;

/// Entries reserved when a batch starts, whatever the configured capacity.
const INITIAL_BATCH_RESERVE: usize = 64 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    /// No buffered entries.
    Empty,
    /// Buffering entries for `Batch::prefix`.
    Accumulating,
    /// Terminal.
    Closed,
    /// Terminal after an error left the streams in an unknown state.
    Failed,
}

/// Parallel (suffix, value) sequences for one prefix.
#[derive(Debug, Default)]
struct Batch {
    prefix: u64,
    suffixes: Vec<u64>,
    values: Vec<u64>,
}

impl Batch {
    fn len(&self) -> usize {
        self.suffixes.len()
    }

    fn start(&mut self, prefix: u64, capacity: usize) {
        self.prefix = prefix;
        self.suffixes.clear();
        self.values.clear();
        let reserve = capacity.min(INITIAL_BATCH_RESERVE);
        self.suffixes.reserve(reserve);
        self.values.reserve(reserve);
    }
}

/// Buffers keys for one shard and writes them out as blocks.
///
/// Keys are split into (prefix, suffix). Consecutive keys with the same
/// prefix are collected into a batch; the batch is written as one block
/// when the prefix changes, when it reaches the configured capacity, and
/// on [`StreamWriter::close`]. Keys should arrive in non-decreasing prefix
/// order: a prefix that reappears after a different one gets a second
/// block.
///
/// Dropping an unclosed writer closes it, logging any failure.
///
/// Any error while writing a block or the index leaves the writer failed:
/// bytes may already have reached the data stream, so nothing is written
/// again and every later call returns [`Error::InvalidState`].
pub struct StreamWriter<W: Write> {
    shard: u32,
    shared: Arc<Shared>,
    state: State,
    batch: Batch,
    data: W,
    index_sink: W,
    index: BlockIndex,
    data_length: u64,
    entries_written: u64,
}

impl<W: Write> StreamWriter<W> {
    pub(crate) fn new(shard: u32, shared: Arc<Shared>, data: W, index_sink: W) -> Self {
        Self {
            shard,
            shared,
            state: State::Empty,
            batch: Batch::default(),
            data,
            index_sink,
            index: BlockIndex::new(),
            data_length: 0,
            entries_written: 0,
        }
    }

    /// Add a key with its value.
    ///
    /// The key must belong to this writer's shard and fit the layout, and
    /// the value must fit in `value_bits`.
    pub fn add_mer(&mut self, key: u64, value: u64) -> Result<()> {
        match self.state {
            State::Closed => {
                return Err(Error::invalid_state(format!(
                    "stream writer for shard {} is closed",
                    self.shard
                )));
            }
            State::Failed => return Err(self.failed_error()),
            State::Empty | State::Accumulating => {}
        }

        let layout = self.shared.layout;
        let (prefix, suffix) = layout.checked_split(key)?;
        if layout.shard_of(prefix) != self.shard {
            return Err(Error::invalid_argument(format!(
                "key {:#x} belongs to shard {}, not {}",
                key,
                layout.shard_of(prefix),
                self.shard
            )));
        }
        if value > mask(self.shared.value_bits) {
            return Err(Error::invalid_argument(format!(
                "value {} does not fit in {} bits",
                value, self.shared.value_bits
            )));
        }

        if self.state == State::Accumulating
            && (self.batch.len() >= self.shared.batch_capacity || self.batch.prefix != prefix)
        {
            self.flush()?;
        }
        if self.state == State::Empty {
            self.batch.start(prefix, self.shared.batch_capacity);
            self.state = State::Accumulating;
        }

        self.batch.suffixes.push(suffix);
        self.batch.values.push(value);
        Ok(())
    }

    /// Write the current batch as a block and fold its values into the
    /// shared histogram.
    fn flush(&mut self) -> Result<()> {
        let result = self.write_batch();
        if result.is_err() {
            self.fail();
        }
        result
    }

    fn write_batch(&mut self) -> Result<()> {
        if self.batch.len() == 0 {
            self.state = State::Empty;
            return Ok(());
        }

        let block =
            self.shared.codec.encode(self.batch.prefix, &self.batch.suffixes, &self.batch.values)?;
        self.data.write_all(&block)?;

        let handle = BlockHandle::new(self.data_length, block.len() as u64);
        self.index.push(IndexRecord::new(self.batch.prefix, handle));
        self.data_length += block.len() as u64;

        {
            let mut histogram = self.shared.histogram.lock();
            for &value in &self.batch.values {
                histogram.add_value(value)?;
            }
        }

        log::debug!(
            "Shard {}: flushed block {} (prefix {:#x}, {} entries, {} bytes)",
            self.shard,
            self.index.len() - 1,
            self.batch.prefix,
            self.batch.len(),
            block.len()
        );

        self.entries_written += self.batch.len() as u64;
        self.batch.suffixes.clear();
        self.batch.values.clear();
        self.state = State::Empty;
        Ok(())
    }

    /// Flush the last batch, write the block index and release buffers.
    ///
    /// Closing twice is a no-op. No keys may be added afterwards.
    pub fn close(&mut self) -> Result<()> {
        match self.state {
            State::Closed => return Ok(()),
            State::Failed => return Err(self.failed_error()),
            State::Empty | State::Accumulating => {}
        }

        self.flush()?;
        let index_checksum = match self.write_index() {
            Ok(checksum) => checksum,
            Err(e) => {
                self.fail();
                return Err(e);
            }
        };

        self.batch = Batch::default();
        self.state = State::Closed;

        let info = ShardInfo {
            shard: self.shard,
            blocks: self.index.len() as u64,
            entries: self.entries_written,
            data_length: self.data_length,
            index_checksum,
        };
        log::info!(
            "Closed shard {}: {} entries in {} blocks, {} bytes",
            info.shard,
            info.entries,
            info.blocks,
            info.data_length
        );
        self.shared.report_closed(info);
        Ok(())
    }

    fn write_index(&mut self) -> Result<u32> {
        let index_checksum = self.index.write_to(&mut self.index_sink)?;
        self.data.flush()?;
        self.index_sink.flush()?;
        Ok(index_checksum)
    }

    fn fail(&mut self) {
        self.state = State::Failed;
        self.batch = Batch::default();
        self.shared.report_failed(self.shard);
    }

    fn failed_error(&self) -> Error {
        Error::invalid_state(format!("stream writer for shard {} failed", self.shard))
    }

    /// The shard this writer feeds.
    pub fn shard(&self) -> u32 {
        self.shard
    }

    /// Blocks written so far.
    pub fn blocks_written(&self) -> usize {
        self.index.len()
    }

    /// Entries written out in blocks so far.
    pub fn entries_written(&self) -> u64 {
        self.entries_written
    }

    /// Entries buffered in the current batch.
    pub fn buffered(&self) -> usize {
        self.batch.len()
    }

    /// Bytes written to the data stream.
    pub fn data_length(&self) -> u64 {
        self.data_length
    }

    /// Index of the blocks written so far.
    pub fn index(&self) -> &BlockIndex {
        &self.index
    }

    /// The data stream.
    pub fn data_ref(&self) -> &W {
        &self.data
    }

    /// The index stream.
    pub fn index_ref(&self) -> &W {
        &self.index_sink
    }

    /// Check if the writer has been closed.
    pub fn is_closed(&self) -> bool {
        self.state == State::Closed
    }

    /// Check if an earlier error left the writer unusable.
    pub fn is_failed(&self) -> bool {
        self.state == State::Failed
    }
}

impl<W: Write> Drop for StreamWriter<W> {
    fn drop(&mut self) {
        if matches!(self.state, State::Empty | State::Accumulating) {
            if let Err(e) = self.close() {
                log::warn!("Failed to close stream writer for shard {}: {}", self.shard, e);
            }
        }
    }
}
