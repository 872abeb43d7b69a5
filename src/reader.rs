//! Database reader.
//!
//! Opens a finished database, loads its histogram and gives per-shard
//! access to the written blocks.
//!
//! ```no_run
//! use kmerstore::FileReader;
//!
//! # fn main() -> Result<(), kmerstore::Error> {
//! let reader = FileReader::open("./kmers")?;
//! println!("{} distinct keys", reader.histogram().num_distinct());
//!
//! let shard = reader.shard_reader(0)?;
//! for entry in shard.entries() {
//!     let (key, value) = entry?;
//!     println!("{:#x}\t{}", key, value);
//! }
//! # Ok(())
//! # }
//! ```

use crate::block::{Block, BlockCodec, BlockIndex};
use crate::error::{Error, Result};
use crate::histogram::Histogram;
use crate::key::KeyLayout;
use crate::manifest::{data_filename, index_filename, Manifest, ShardInfo, HISTOGRAM_FILENAME};
use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

/// Read access to a finished database.
#[derive(Debug)]
pub struct FileReader {
    path: PathBuf,
    manifest: Manifest,
    histogram: Histogram,
}

impl FileReader {
    /// Open the database in `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let manifest = Manifest::read_from(&path)?;

        // Loaded histograms are finalized, so no dense tier is needed.
        let mut histogram = Histogram::new(0);
        let mut file = BufReader::new(File::open(path.join(HISTOGRAM_FILENAME))?);
        histogram.load(&mut file, manifest.histogram_version)?;

        log::info!(
            "Opened database {:?}: {} shards, {} entries",
            path,
            manifest.shards.len(),
            manifest.total_entries()
        );

        Ok(Self { path, manifest, histogram })
    }

    /// The manifest.
    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    /// The key layout.
    pub fn layout(&self) -> KeyLayout {
        self.manifest.layout
    }

    /// The finalized value histogram.
    pub fn histogram(&self) -> &Histogram {
        &self.histogram
    }

    /// Open one shard.
    pub fn shard_reader(&self, shard: u32) -> Result<ShardReader> {
        let info = self.manifest.shards.get(shard as usize).cloned().ok_or_else(|| {
            Error::invalid_argument(format!(
                "shard {} out of range (layout has {})",
                shard,
                self.manifest.shards.len()
            ))
        })?;
        ShardReader::open(&self.path, &self.manifest, info)
    }

    /// Look up `key` in its shard, returning the value from the first block
    /// that holds it.
    pub fn get(&self, key: u64) -> Result<Option<u64>> {
        let (prefix, _) = self.layout().checked_split(key)?;
        self.shard_reader(self.layout().shard_of(prefix))?.get(key)
    }
}

/// Read access to one shard's blocks.
#[derive(Debug)]
pub struct ShardReader {
    info: ShardInfo,
    layout: KeyLayout,
    codec: BlockCodec,
    index: BlockIndex,
    data: Option<File>,
}

impl ShardReader {
    fn open(dir: &Path, manifest: &Manifest, info: ShardInfo) -> Result<Self> {
        let layout = manifest.layout;
        let codec = BlockCodec::new(layout.suffix_bits(), manifest.value_bits);

        // Shards that were never opened have no files.
        if info.blocks == 0 && !dir.join(index_filename(info.shard)).exists() {
            return Ok(Self { info, layout, codec, index: BlockIndex::new(), data: None });
        }

        let mut index_file = BufReader::new(File::open(dir.join(index_filename(info.shard)))?);
        let (index, checksum) = BlockIndex::read_from(&mut index_file)?;
        if checksum != info.index_checksum {
            return Err(Error::ChecksumMismatch { expected: info.index_checksum, actual: checksum });
        }
        if index.len() as u64 != info.blocks {
            return Err(Error::format(format!(
                "shard {} index has {} blocks, manifest says {}",
                info.shard,
                index.len(),
                info.blocks
            )));
        }

        let data = File::open(dir.join(data_filename(info.shard)))?;
        let data_length = data.metadata()?.len();
        if data_length != info.data_length {
            return Err(Error::format(format!(
                "shard {} data is {} bytes, manifest says {}",
                info.shard, data_length, info.data_length
            )));
        }

        Ok(Self { info, layout, codec, index, data: Some(data) })
    }

    /// The shard's manifest entry.
    pub fn info(&self) -> &ShardInfo {
        &self.info
    }

    /// The block index.
    pub fn index(&self) -> &BlockIndex {
        &self.index
    }

    /// Number of blocks.
    pub fn num_blocks(&self) -> usize {
        self.index.len()
    }

    /// Read block `i`, in write order.
    pub fn read_block(&self, i: usize) -> Result<Block> {
        let record = self.index.records().get(i).copied().ok_or_else(|| {
            Error::invalid_argument(format!(
                "block {} out of range ({} blocks)",
                i,
                self.num_blocks()
            ))
        })?;
        let mut file = self
            .data
            .as_ref()
            .ok_or_else(|| Error::invalid_state("shard has no data file"))?;

        if record.handle.end_offset() > self.info.data_length {
            return Err(Error::format(format!(
                "block {} ends at {}, past data length {}",
                i,
                record.handle.end_offset(),
                self.info.data_length
            )));
        }

        file.seek(SeekFrom::Start(record.handle.offset))?;
        let mut buffer = vec![0u8; record.handle.length as usize];
        file.read_exact(&mut buffer).map_err(|e| Error::from_read(e, "block"))?;

        let block = self.codec.decode(&buffer)?;
        if block.prefix != record.prefix {
            return Err(Error::format(format!(
                "block {} holds prefix {:#x}, index says {:#x}",
                i, block.prefix, record.prefix
            )));
        }
        Ok(block)
    }

    /// Every block written for `prefix`, in write order.
    pub fn blocks_for_prefix(&self, prefix: u64) -> Result<Vec<Block>> {
        let positions: Vec<usize> = self
            .index
            .records()
            .iter()
            .enumerate()
            .filter(|(_, r)| r.prefix == prefix)
            .map(|(i, _)| i)
            .collect();
        positions.into_iter().map(|i| self.read_block(i)).collect()
    }

    /// Look up `key`, returning the value from the first block that holds it.
    pub fn get(&self, key: u64) -> Result<Option<u64>> {
        let (prefix, suffix) = self.layout.checked_split(key)?;
        for block in self.blocks_for_prefix(prefix)? {
            if let Some((_, value)) = block.iter().find(|&(s, _)| s == suffix) {
                return Ok(Some(value));
            }
        }
        Ok(None)
    }

    /// Iterate over every `(key, value)` pair in on-disk order.
    pub fn entries(&self) -> ShardEntries<'_> {
        ShardEntries { reader: self, next_block: 0, current: Vec::new().into_iter() }
    }
}

/// Iterator over a shard's `(key, value)` pairs.
pub struct ShardEntries<'a> {
    reader: &'a ShardReader,
    next_block: usize,
    current: std::vec::IntoIter<(u64, u64)>,
}

impl Iterator for ShardEntries<'_> {
    type Item = Result<(u64, u64)>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(entry) = self.current.next() {
                return Some(Ok(entry));
            }
            if self.next_block >= self.reader.num_blocks() {
                return None;
            }

            let block = match self.reader.read_block(self.next_block) {
                Ok(block) => block,
                Err(e) => {
                    // Stop after the first error.
                    self.next_block = self.reader.num_blocks();
                    return Some(Err(e));
                }
            };
            self.next_block += 1;
            self.current = block.entries(self.reader.layout).collect::<Vec<_>>().into_iter();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Options;
    use crate::writer::FileWriter;
    use tempfile::TempDir;

    fn build(dir: &Path) -> Manifest {
        let opts = Options::new()
            .suffix_bits(4)
            .num_files_bits(1)
            .num_blocks_bits(3)
            .value_bits(8);
        let writer = FileWriter::create(dir, opts).unwrap();

        let mut low = writer.stream_writer(0).unwrap();
        for (key, value) in [(0x01, 1), (0x02, 2), (0x13, 3), (0x01 + 0x20, 4)] {
            low.add_mer(key, value).unwrap();
        }
        low.close().unwrap();

        let mut high = writer.stream_writer(1).unwrap();
        high.add_mer(0xf0, 9).unwrap();
        high.close().unwrap();

        writer.finish().unwrap()
    }

    #[test]
    fn test_read_back() {
        let dir = TempDir::new().unwrap();
        let manifest = build(dir.path());

        let reader = FileReader::open(dir.path()).unwrap();
        assert_eq!(reader.manifest(), &manifest);
        assert_eq!(reader.histogram().num_distinct(), 5);
        assert_eq!(reader.histogram().num_total(), 19);

        let shard = reader.shard_reader(0).unwrap();
        assert_eq!(shard.num_blocks(), 3);
        let entries: Vec<_> = shard.entries().collect::<Result<_>>().unwrap();
        assert_eq!(entries, vec![(0x01, 1), (0x02, 2), (0x13, 3), (0x21, 4)]);

        assert_eq!(reader.get(0x13).unwrap(), Some(3));
        assert_eq!(reader.get(0xf0).unwrap(), Some(9));
        assert_eq!(reader.get(0x14).unwrap(), None);
        assert!(reader.shard_reader(2).is_err());
    }

    #[test]
    fn test_read_block_out_of_range() {
        let dir = TempDir::new().unwrap();
        build(dir.path());
        let shard = FileReader::open(dir.path()).unwrap().shard_reader(1).unwrap();
        assert_eq!(shard.read_block(0).unwrap().prefix, 0xf);
        assert!(matches!(shard.read_block(1), Err(Error::InvalidArgument(_))));
    }

    #[test]
    fn test_unopened_shard_is_empty() {
        let dir = TempDir::new().unwrap();
        let opts = Options::new()
            .suffix_bits(4)
            .num_files_bits(2)
            .num_blocks_bits(2);
        let writer = FileWriter::create(dir.path(), opts).unwrap();
        writer.stream_writer(0).unwrap().add_mer(0x05, 1).unwrap();
        writer.finish().unwrap();

        let reader = FileReader::open(dir.path()).unwrap();
        assert_eq!(reader.shard_reader(0).unwrap().num_blocks(), 1);
        let empty = reader.shard_reader(3).unwrap();
        assert_eq!(empty.num_blocks(), 0);
        assert_eq!(empty.entries().count(), 0);
        assert_eq!(reader.get(0x3f).unwrap(), None);
    }

    #[test]
    fn test_corrupted_index_detected() {
        let dir = TempDir::new().unwrap();
        build(dir.path());

        let path = dir.path().join(index_filename(0));
        let mut bytes = std::fs::read(&path).unwrap();
        bytes[8] ^= 0xff;
        std::fs::write(&path, bytes).unwrap();

        let reader = FileReader::open(dir.path()).unwrap();
        let result = reader.shard_reader(0);
        assert!(matches!(result, Err(Error::ChecksumMismatch { .. })));
    }

    #[test]
    fn test_truncated_data_detected() {
        let dir = TempDir::new().unwrap();
        build(dir.path());

        let path = dir.path().join(data_filename(0));
        let bytes = std::fs::read(&path).unwrap();
        std::fs::write(&path, &bytes[..bytes.len() - 8]).unwrap();

        let reader = FileReader::open(dir.path()).unwrap();
        assert!(matches!(reader.shard_reader(0), Err(Error::Format(_))));
    }
}
