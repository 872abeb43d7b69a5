//! Configuration options for kmerstore.

use crate::key::KeyLayout;

/// Default number of (suffix, value) pairs a batch may hold before it is flushed.
pub const DEFAULT_BATCH_CAPACITY: usize = 16 * 1024 * 1024;

/// Default boundary between the dense and sparse histogram tiers.
pub const DEFAULT_DENSE_CEILING: usize = 1 << 16;

/// Largest dense histogram tier, in cells.
pub const MAX_DENSE_CEILING: usize = 1 << 24;

/// Largest supported shard selector width.
pub const MAX_FILES_BITS: u32 = 16;

/// Configuration options for creating a database.
#[derive(Debug, Clone)]
pub struct Options {
    /// Number of low key bits stored in each block entry.
    /// Default: 20
    pub suffix_bits: u32,

    /// Number of high prefix bits selecting the shard (output file).
    /// Default: 6 (64 shards)
    pub num_files_bits: u32,

    /// Number of low prefix bits selecting the block within a shard.
    /// Default: 8
    pub num_blocks_bits: u32,

    /// Width of the value stored next to every suffix.
    /// Default: 32
    pub value_bits: u32,

    /// Maximum entries buffered per stream writer before a forced flush.
    /// Default: 16M
    pub batch_capacity: usize,

    /// Values below this are counted in the dense histogram tier.
    /// Default: 65536
    pub histogram_dense_ceiling: usize,

    /// Error if the database directory already holds a manifest.
    /// Default: false
    pub error_if_exists: bool,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            suffix_bits: 20,
            num_files_bits: 6,
            num_blocks_bits: 8,
            value_bits: 32,
            batch_capacity: DEFAULT_BATCH_CAPACITY,
            histogram_dense_ceiling: DEFAULT_DENSE_CEILING,
            error_if_exists: false,
        }
    }
}

impl Options {
    /// Creates a new Options with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the suffix width.
    pub fn suffix_bits(mut self, bits: u32) -> Self {
        self.suffix_bits = bits;
        self
    }

    /// Sets the shard selector width.
    pub fn num_files_bits(mut self, bits: u32) -> Self {
        self.num_files_bits = bits;
        self
    }

    /// Sets the block selector width.
    pub fn num_blocks_bits(mut self, bits: u32) -> Self {
        self.num_blocks_bits = bits;
        self
    }

    /// Sets the stored value width.
    pub fn value_bits(mut self, bits: u32) -> Self {
        self.value_bits = bits;
        self
    }

    /// Sets the batch capacity.
    pub fn batch_capacity(mut self, capacity: usize) -> Self {
        self.batch_capacity = capacity;
        self
    }

    /// Sets the dense histogram ceiling.
    pub fn histogram_dense_ceiling(mut self, ceiling: usize) -> Self {
        self.histogram_dense_ceiling = ceiling;
        self
    }

    /// Sets whether an existing database is an error.
    pub fn error_if_exists(mut self, value: bool) -> Self {
        self.error_if_exists = value;
        self
    }

    /// The key layout derived from these options.
    pub fn layout(&self) -> KeyLayout {
        KeyLayout::new(self.suffix_bits, self.num_files_bits, self.num_blocks_bits)
    }

    /// Validates the options and returns an error if any are invalid.
    pub fn validate(&self) -> crate::Result<()> {
        if self.num_files_bits > MAX_FILES_BITS {
            return Err(crate::Error::invalid_argument(format!(
                "num_files_bits must be <= {}",
                MAX_FILES_BITS
            )));
        }
        let key_bits =
            self.suffix_bits as u64 + self.num_files_bits as u64 + self.num_blocks_bits as u64;
        if key_bits > 64 {
            return Err(crate::Error::invalid_argument(format!(
                "suffix_bits + num_files_bits + num_blocks_bits must be <= 64, got {}",
                key_bits
            )));
        }
        if self.value_bits == 0 || self.value_bits > 64 {
            return Err(crate::Error::invalid_argument("value_bits must be between 1 and 64"));
        }
        if self.batch_capacity == 0 {
            return Err(crate::Error::invalid_argument("batch_capacity must be > 0"));
        }
        if self.histogram_dense_ceiling > MAX_DENSE_CEILING {
            return Err(crate::Error::capacity(format!(
                "histogram_dense_ceiling must be <= {}, got {}",
                MAX_DENSE_CEILING, self.histogram_dense_ceiling
            )));
        }
        Ok(())
    }
}
