// Concurrent Access Tests for kmerstore
// These tests drive one stream writer per shard from separate threads

use kmerstore::{FileReader, FileWriter, Options};
use std::sync::{Arc, Barrier};
use std::thread;
use tempfile::TempDir;

/// Test one producer thread per shard sharing a histogram
#[test]
fn test_concurrent_shard_writers() {
    let dir = TempDir::new().unwrap();
    let options = Options::new()
        .suffix_bits(8)
        .num_files_bits(3)
        .num_blocks_bits(4)
        .value_bits(16);
    let layout = options.layout();
    let writer = Arc::new(FileWriter::create(dir.path(), options).unwrap());

    let num_shards = layout.num_shards();
    let keys_per_shard = 2000u64;
    let barrier = Arc::new(Barrier::new(num_shards as usize));

    let mut handles = vec![];
    for shard in 0..num_shards {
        let writer_clone = Arc::clone(&writer);
        let barrier_clone = Arc::clone(&barrier);
        let handle = thread::spawn(move || {
            let mut stream = writer_clone.stream_writer(shard).unwrap();
            let base = (shard as u64) << (layout.num_blocks_bits() + layout.suffix_bits());

            barrier_clone.wait();
            for i in 0..keys_per_shard {
                let key = base + i * 2;
                stream.add_mer(key, i % 7 + 1).unwrap();
            }
            stream.close().unwrap();
        });
        handles.push(handle);
    }

    // Wait for all threads to complete
    for handle in handles {
        handle.join().unwrap();
    }

    let writer = Arc::try_unwrap(writer).ok().unwrap();
    let histogram = writer.histogram_snapshot();
    let total_keys = keys_per_shard * num_shards as u64;
    assert_eq!(histogram.num_distinct(), total_keys);

    let per_shard_total: u64 = (0..keys_per_shard).map(|i| i % 7 + 1).sum();
    assert_eq!(histogram.num_total(), per_shard_total * num_shards as u64);

    let manifest = writer.finish().unwrap();
    assert_eq!(manifest.total_entries(), total_keys);

    let reader = FileReader::open(dir.path()).unwrap();
    for shard in 0..num_shards {
        let shard_reader = reader.shard_reader(shard).unwrap();
        let count = shard_reader.entries().filter(|e| e.is_ok()).count() as u64;
        assert_eq!(count, keys_per_shard, "shard {} lost entries", shard);
    }
}

/// Test stream writers borrowed from a shared file writer in scoped threads
#[test]
fn test_scoped_shard_writers() {
    let dir = TempDir::new().unwrap();
    let options = Options::new()
        .suffix_bits(4)
        .num_files_bits(2)
        .num_blocks_bits(2)
        .value_bits(8);
    let writer = FileWriter::create(dir.path(), options).unwrap();

    thread::scope(|scope| {
        for shard in 0..4u32 {
            let writer = &writer;
            scope.spawn(move || {
                let mut stream = writer.stream_writer(shard).unwrap();
                let base = (shard as u64) << 6;
                for key in base..base + 64 {
                    stream.add_mer(key, 1).unwrap();
                }
                stream.close().unwrap();
                // Every block prefix in this shard maps back to it.
                for block in stream.index().records() {
                    assert_eq!(writer.layout().shard_of(block.prefix), shard);
                }
                assert_eq!(stream.blocks_written(), 4);
            });
        }
    });

    let histogram = writer.histogram_snapshot();
    assert_eq!(histogram.num_unique(), 256);
    assert_eq!(histogram.occurrences(1), 256);

    let manifest = writer.finish().unwrap();
    assert!(manifest.shards.iter().all(|s| s.blocks == 4 && s.entries == 64));
}
