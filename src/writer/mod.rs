//! Shard/file writer.
//!
//! A [`FileWriter`] owns the database directory, the key layout and the
//! shared value histogram. It hands out one [`StreamWriter`] per shard;
//! each stream writer is driven by a single producer, and stream writers
//! for different shards may run on different threads. The only state they
//! share is the histogram, which every flush updates under a lock.
//!
//! ```no_run
//! use kmerstore::{FileWriter, Options};
//!
//! # fn main() -> Result<(), kmerstore::Error> {
//! let options = Options::new().suffix_bits(16).num_files_bits(2).num_blocks_bits(4);
//! let writer = FileWriter::create("./kmers", options)?;
//!
//! let mut shard = writer.stream_writer(0)?;
//! shard.add_mer(0x0001_2345, 7)?;
//! shard.add_mer(0x0001_2346, 1)?;
//! shard.close()?;
//!
//! writer.finish()?;
//! # Ok(())
//! # }
//! ```

mod stream;

pub use stream::StreamWriter;

use crate::block::BlockCodec;
use crate::config::Options;
use crate::error::{Error, Result};
use crate::histogram::{Histogram, HISTOGRAM_VERSION};
use crate::key::KeyLayout;
use crate::manifest::{
    data_filename, index_filename, Manifest, ShardInfo, FORMAT_VERSION, HISTOGRAM_FILENAME,
    MANIFEST_FILENAME,
};
use parking_lot::Mutex;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Lifecycle of one shard's stream writer, as seen by the file writer.
#[derive(Debug, Clone)]
enum ShardSlot {
    Unopened,
    Open,
    Closed(ShardInfo),
    Failed,
}

/// State shared between a file writer and its stream writers.
#[derive(Debug)]
pub(crate) struct Shared {
    pub(crate) layout: KeyLayout,
    pub(crate) codec: BlockCodec,
    pub(crate) value_bits: u32,
    pub(crate) batch_capacity: usize,
    pub(crate) histogram: Mutex<Histogram>,
    shards: Mutex<Vec<ShardSlot>>,
}

impl Shared {
    fn claim(&self, shard: u32) -> Result<()> {
        let mut shards = self.shards.lock();
        let slot = shards.get_mut(shard as usize).ok_or_else(|| {
            Error::invalid_argument(format!(
                "shard {} out of range (layout has {})",
                shard,
                self.layout.num_shards()
            ))
        })?;
        match slot {
            ShardSlot::Unopened => {
                *slot = ShardSlot::Open;
                Ok(())
            }
            _ => Err(Error::invalid_state(format!("shard {} was already opened", shard))),
        }
    }

    fn release(&self, shard: u32) {
        if let Some(slot) = self.shards.lock().get_mut(shard as usize) {
            *slot = ShardSlot::Unopened;
        }
    }

    pub(crate) fn report_failed(&self, shard: u32) {
        if let Some(slot) = self.shards.lock().get_mut(shard as usize) {
            *slot = ShardSlot::Failed;
        }
    }

    pub(crate) fn report_closed(&self, info: ShardInfo) {
        if let Some(slot) = self.shards.lock().get_mut(info.shard as usize) {
            *slot = ShardSlot::Closed(info);
        }
    }
}

/// Writer for a sharded k-mer database.
pub struct FileWriter {
    path: PathBuf,
    options: Options,
    shared: Arc<Shared>,
}

impl FileWriter {
    /// Create a database in `path`.
    ///
    /// The directory is created if needed. If it already holds a finished
    /// database and `error_if_exists` is set, this fails.
    pub fn create<P: AsRef<Path>>(path: P, options: Options) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        options.validate()?;

        if path.join(MANIFEST_FILENAME).exists() && options.error_if_exists {
            return Err(Error::AlreadyExists(format!("Database already exists: {:?}", path)));
        }
        std::fs::create_dir_all(&path)?;

        let layout = options.layout();
        let shared = Shared {
            layout,
            codec: BlockCodec::new(layout.suffix_bits(), options.value_bits),
            value_bits: options.value_bits,
            batch_capacity: options.batch_capacity,
            histogram: Mutex::new(Histogram::new(options.histogram_dense_ceiling)),
            shards: Mutex::new(vec![ShardSlot::Unopened; layout.num_shards() as usize]),
        };

        log::info!(
            "Creating database {:?}: {} shards, {}-bit prefix, {}-bit suffix, {}-bit values",
            path,
            layout.num_shards(),
            layout.prefix_bits(),
            layout.suffix_bits(),
            options.value_bits
        );

        Ok(Self { path, options, shared: Arc::new(shared) })
    }

    /// Open the stream writer for `shard`, writing its data and index files.
    pub fn stream_writer(&self, shard: u32) -> Result<StreamWriter<BufWriter<File>>> {
        self.shared.claim(shard)?;

        let open = || -> Result<(File, File)> {
            Ok((
                File::create(self.path.join(data_filename(shard)))?,
                File::create(self.path.join(index_filename(shard)))?,
            ))
        };
        match open() {
            Ok((data, index)) => Ok(StreamWriter::new(
                shard,
                Arc::clone(&self.shared),
                BufWriter::new(data),
                BufWriter::new(index),
            )),
            Err(e) => {
                self.shared.release(shard);
                Err(e)
            }
        }
    }

    /// Open the stream writer for `shard` over caller-supplied sinks.
    pub fn stream_writer_to<W: Write>(
        &self,
        shard: u32,
        data: W,
        index: W,
    ) -> Result<StreamWriter<W>> {
        self.shared.claim(shard)?;
        Ok(StreamWriter::new(shard, Arc::clone(&self.shared), data, index))
    }

    /// The key layout.
    pub fn layout(&self) -> KeyLayout {
        self.shared.layout
    }

    /// The options this database was created with.
    pub fn options(&self) -> &Options {
        &self.options
    }

    /// The database directory.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// A copy of the histogram as folded so far.
    pub fn histogram_snapshot(&self) -> Histogram {
        self.shared.histogram.lock().clone()
    }

    /// Write the histogram and manifest.
    ///
    /// Every stream writer that was opened must be closed first, and none
    /// may have failed. Shards that were never opened are recorded as empty.
    pub fn finish(self) -> Result<Manifest> {
        let shards = {
            let slots = self.shared.shards.lock();
            let mut shards = Vec::with_capacity(slots.len());
            for (i, slot) in slots.iter().enumerate() {
                match slot {
                    ShardSlot::Unopened => shards.push(ShardInfo::empty(i as u32)),
                    ShardSlot::Closed(info) => shards.push(info.clone()),
                    ShardSlot::Open => {
                        return Err(Error::invalid_state(format!(
                            "stream writer for shard {} is still open",
                            i
                        )));
                    }
                    ShardSlot::Failed => {
                        return Err(Error::invalid_state(format!(
                            "stream writer for shard {} failed",
                            i
                        )));
                    }
                }
            }
            shards
        };

        let mut writer = BufWriter::new(File::create(self.path.join(HISTOGRAM_FILENAME))?);
        self.shared.histogram.lock().dump(&mut writer)?;
        writer.flush()?;

        let manifest = Manifest {
            format_version: FORMAT_VERSION,
            layout: self.shared.layout,
            value_bits: self.shared.value_bits,
            histogram_version: HISTOGRAM_VERSION,
            shards,
        };
        manifest.write_to(&self.path)?;

        log::info!(
            "Finished database {:?}: {} entries in {} blocks",
            self.path,
            manifest.total_entries(),
            manifest.shards.iter().map(|s| s.blocks).sum::<u64>()
        );
        Ok(manifest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn small_options() -> Options {
        Options::new()
            .suffix_bits(4)
            .num_files_bits(1)
            .num_blocks_bits(3)
            .value_bits(16)
    }

    #[test]
    fn test_create_writes_nothing_until_finish() {
        let dir = TempDir::new().unwrap();
        let writer = FileWriter::create(dir.path(), small_options()).unwrap();
        assert_eq!(writer.layout().num_shards(), 2);
        assert!(!dir.path().join(MANIFEST_FILENAME).exists());

        let manifest = writer.finish().unwrap();
        assert_eq!(manifest.shards, vec![ShardInfo::empty(0), ShardInfo::empty(1)]);
        assert!(dir.path().join(MANIFEST_FILENAME).exists());
        assert!(dir.path().join(HISTOGRAM_FILENAME).exists());
    }

    #[test]
    fn test_invalid_options_rejected() {
        let dir = TempDir::new().unwrap();
        let result = FileWriter::create(dir.path(), small_options().value_bits(0));
        assert!(matches!(result, Err(Error::InvalidArgument(_))));

        let huge = small_options().histogram_dense_ceiling(usize::MAX);
        let result = FileWriter::create(dir.path(), huge);
        assert!(matches!(result, Err(Error::Capacity(_))));
    }

    #[test]
    fn test_error_if_exists() {
        let dir = TempDir::new().unwrap();
        FileWriter::create(dir.path(), small_options()).unwrap().finish().unwrap();

        let result = FileWriter::create(dir.path(), small_options().error_if_exists(true));
        assert!(matches!(result, Err(Error::AlreadyExists(_))));

        // Overwriting is allowed by default.
        assert!(FileWriter::create(dir.path(), small_options()).is_ok());
    }

    #[test]
    fn test_shard_opened_once() {
        let dir = TempDir::new().unwrap();
        let writer = FileWriter::create(dir.path(), small_options()).unwrap();

        let _first = writer.stream_writer(1).unwrap();
        assert!(matches!(writer.stream_writer(1), Err(Error::InvalidState(_))));
        assert!(matches!(writer.stream_writer(2), Err(Error::InvalidArgument(_))));
    }

    #[test]
    fn test_finish_requires_closed_streams() {
        let dir = TempDir::new().unwrap();
        let writer = FileWriter::create(dir.path(), small_options()).unwrap();

        let mut stream = writer.stream_writer_to(0, Vec::new(), Vec::new()).unwrap();
        stream.add_mer(0x01, 3).unwrap();

        // Leak the open writer so it is never closed.
        std::mem::forget(stream);
        assert!(matches!(writer.finish(), Err(Error::InvalidState(_))));
    }

    #[test]
    fn test_finish_records_closed_shards() {
        let dir = TempDir::new().unwrap();
        let writer = FileWriter::create(dir.path(), small_options()).unwrap();

        let mut stream = writer.stream_writer(1).unwrap();
        stream.add_mer(0x80, 2).unwrap();
        stream.add_mer(0x81, 1).unwrap();
        stream.add_mer(0x95, 1).unwrap();
        stream.close().unwrap();

        let snapshot = writer.histogram_snapshot();
        assert_eq!(snapshot.num_distinct(), 3);

        let manifest = writer.finish().unwrap();
        assert_eq!(manifest.shards[0], ShardInfo::empty(0));
        assert_eq!(manifest.shards[1].blocks, 2);
        assert_eq!(manifest.shards[1].entries, 3);
        assert_eq!(manifest.total_entries(), 3);
    }
}
