//! Database manifest.
//!
//! A finished database directory looks like:
//!
//! ```text
//! manifest.json     // this file: layout + per-shard summary
//! histogram         // value histogram, format HISTOGRAM_VERSION
//! 0000.data         // shard 0 blocks
//! 0000.index        // shard 0 block index
//! 0001.data
//! ...
//! ```
//!
//! The manifest is written last, so its presence marks a complete database.

use crate::config::MAX_FILES_BITS;
use crate::error::{Error, Result};
use crate::key::KeyLayout;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

/// Name of the manifest file.
pub const MANIFEST_FILENAME: &str = "manifest.json";

/// Name of the histogram file.
pub const HISTOGRAM_FILENAME: &str = "histogram";

/// Manifest format written by this version.
pub const FORMAT_VERSION: u32 = 1;

/// Generate the data filename for a shard
pub fn data_filename(shard: u32) -> String {
    format!("{:04x}.data", shard)
}

/// Generate the index filename for a shard
pub fn index_filename(shard: u32) -> String {
    format!("{:04x}.index", shard)
}

/// Summary of one closed shard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShardInfo {
    /// Shard number
    pub shard: u32,
    /// Blocks written
    pub blocks: u64,
    /// (suffix, value) pairs written
    pub entries: u64,
    /// Length of the data stream in bytes
    pub data_length: u64,
    /// CRC32 of the index stream
    pub index_checksum: u32,
}

impl ShardInfo {
    /// A shard that received no keys.
    pub fn empty(shard: u32) -> Self {
        Self { shard, blocks: 0, entries: 0, data_length: 0, index_checksum: 0 }
    }
}

/// Description of a finished database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    /// Manifest format version
    pub format_version: u32,
    /// Key layout shared by every shard
    pub layout: KeyLayout,
    /// Width of stored values
    pub value_bits: u32,
    /// Format of the histogram file
    pub histogram_version: u32,
    /// One entry per shard, in shard order
    pub shards: Vec<ShardInfo>,
}

impl Manifest {
    /// Write `manifest.json` into `dir`.
    pub fn write_to(&self, dir: &Path) -> Result<()> {
        let file = File::create(dir.join(MANIFEST_FILENAME))?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, self)?;
        writer.flush()?;
        writer.get_ref().sync_all()?;
        Ok(())
    }

    /// Read and validate `manifest.json` from `dir`.
    pub fn read_from(dir: &Path) -> Result<Self> {
        let file = File::open(dir.join(MANIFEST_FILENAME))?;
        let manifest: Manifest = serde_json::from_reader(BufReader::new(file))?;
        manifest.validate()?;
        Ok(manifest)
    }

    /// Check the manifest is internally consistent.
    pub fn validate(&self) -> Result<()> {
        if self.format_version != FORMAT_VERSION {
            return Err(Error::format(format!(
                "unsupported manifest version {}",
                self.format_version
            )));
        }
        if self.layout.num_files_bits() > MAX_FILES_BITS || self.layout.key_bits() > 64 {
            return Err(Error::format("manifest layout is wider than 64 bits"));
        }
        if self.value_bits == 0 || self.value_bits > 64 {
            return Err(Error::format(format!("invalid value width {}", self.value_bits)));
        }
        if self.shards.len() != self.layout.num_shards() as usize {
            return Err(Error::format(format!(
                "manifest lists {} shards, layout has {}",
                self.shards.len(),
                self.layout.num_shards()
            )));
        }
        for (i, info) in self.shards.iter().enumerate() {
            if info.shard as usize != i {
                return Err(Error::format(format!("shard {} listed at position {}", info.shard, i)));
            }
        }
        Ok(())
    }

    /// Total entries across all shards.
    pub fn total_entries(&self) -> u64 {
        self.shards.iter().map(|s| s.entries).sum()
    }
}
