//! # kmerstore - Sharded, Bit-Packed K-mer Storage
//!
//! kmerstore writes fixed-width integer keys (k-mers) with an associated
//! value into a sharded on-disk database, and summarizes the values in a
//! versioned histogram.
//!
//! ## Architecture
//!
//! - **Bit codec** ([`bits`]): binary and unary fields packed into 64-bit words
//! - **Key splitter** ([`key`]): key -> (prefix, suffix); prefix -> (shard, block)
//! - **Blocks** ([`block`]): one flushed batch per block, plus a per-shard index
//! - **Writers** ([`writer`]): one batching stream writer per shard under a
//!   file writer that owns the layout and the shared histogram
//! - **Histogram** ([`histogram`]): dense + sparse value counts, formats v1-v3
//! - **Reader** ([`reader`]): manifest, histogram and block access
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use kmerstore::{FileReader, FileWriter, Options};
//!
//! # fn main() -> Result<(), kmerstore::Error> {
//! let options = Options::new().suffix_bits(20).num_files_bits(2).num_blocks_bits(6);
//! let writer = FileWriter::create("./kmers", options)?;
//!
//! // Keys for one shard, in non-decreasing prefix order.
//! let mut shard = writer.stream_writer(0)?;
//! shard.add_mer(0x0000_1234, 3)?;
//! shard.add_mer(0x0000_1235, 1)?;
//! shard.add_mer(0x0010_0001, 8)?;
//! shard.close()?;
//!
//! writer.finish()?;
//!
//! let reader = FileReader::open("./kmers")?;
//! assert_eq!(reader.get(0x0000_1235)?, Some(1));
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

// Module declarations
pub mod bits;
pub mod block;
pub mod config;
pub mod error;
pub mod histogram;
pub mod key;
pub mod manifest;
pub mod reader;
pub mod writer;

// Re-exports
pub use block::{Block, BlockCodec, BlockHandle, BlockIndex, IndexRecord};
pub use config::Options;
pub use error::{Error, Result};
pub use histogram::{Histogram, HistogramEntry, HISTOGRAM_VERSION};
pub use key::KeyLayout;
pub use manifest::{Manifest, ShardInfo};
pub use reader::{FileReader, ShardReader};
pub use writer::{FileWriter, StreamWriter};
