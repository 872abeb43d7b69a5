// Fault Injection Tests for kmerstore
// These tests damage database files on disk and check the failures are reported

use kmerstore::manifest::{data_filename, index_filename, HISTOGRAM_FILENAME, MANIFEST_FILENAME};
use kmerstore::{Error, FileReader, FileWriter, Options};
use std::fs;
use std::path::Path;
use tempfile::TempDir;

fn build_database(dir: &Path) {
    let options = Options::new()
        .suffix_bits(6)
        .num_files_bits(1)
        .num_blocks_bits(4)
        .value_bits(10);
    let writer = FileWriter::create(dir, options).unwrap();

    for shard in 0..2u32 {
        let mut stream = writer.stream_writer(shard).unwrap();
        let base = (shard as u64) << 10;
        for i in 0..200u64 {
            stream.add_mer(base + i * 5, i % 9 + 1).unwrap();
        }
        stream.close().unwrap();
    }
    writer.finish().unwrap();
}

fn rewrite_manifest(dir: &Path, edit: impl FnOnce(&mut serde_json::Value)) {
    let path = dir.join(MANIFEST_FILENAME);
    let mut manifest: serde_json::Value =
        serde_json::from_slice(&fs::read(&path).unwrap()).unwrap();
    edit(&mut manifest);
    fs::write(&path, serde_json::to_vec_pretty(&manifest).unwrap()).unwrap();
}

/// Test the undamaged database opens cleanly
#[test]
fn test_intact_database_opens() {
    let dir = TempDir::new().unwrap();
    build_database(dir.path());

    let reader = FileReader::open(dir.path()).unwrap();
    assert_eq!(reader.histogram().num_distinct(), 400);
    for shard in 0..2 {
        assert!(reader.shard_reader(shard).unwrap().entries().all(|e| e.is_ok()));
    }
}

/// Test a missing manifest is an I/O error
#[test]
fn test_missing_manifest() {
    let dir = TempDir::new().unwrap();
    build_database(dir.path());
    fs::remove_file(dir.path().join(MANIFEST_FILENAME)).unwrap();

    assert!(matches!(FileReader::open(dir.path()), Err(Error::Io(_))));
}

/// Test a manifest that is not JSON
#[test]
fn test_garbage_manifest() {
    let dir = TempDir::new().unwrap();
    build_database(dir.path());
    fs::write(dir.path().join(MANIFEST_FILENAME), b"\x00\x01 not a manifest").unwrap();

    assert!(matches!(FileReader::open(dir.path()), Err(Error::Format(_))));
}

/// Test an unknown histogram version recorded in the manifest
#[test]
fn test_unknown_histogram_version() {
    let dir = TempDir::new().unwrap();
    build_database(dir.path());
    rewrite_manifest(dir.path(), |m| m["histogram_version"] = serde_json::json!(4));

    assert!(matches!(FileReader::open(dir.path()), Err(Error::Format(_))));
}

/// Test a manifest whose shard list disagrees with its layout
#[test]
fn test_manifest_shard_count_mismatch() {
    let dir = TempDir::new().unwrap();
    build_database(dir.path());
    rewrite_manifest(dir.path(), |m| {
        m["shards"].as_array_mut().unwrap().pop();
    });

    assert!(matches!(FileReader::open(dir.path()), Err(Error::Format(_))));
}

/// Test a truncated histogram file
#[test]
fn test_truncated_histogram() {
    let dir = TempDir::new().unwrap();
    build_database(dir.path());

    let path = dir.path().join(HISTOGRAM_FILENAME);
    let bytes = fs::read(&path).unwrap();
    fs::write(&path, &bytes[..bytes.len() - 5]).unwrap();

    assert!(matches!(FileReader::open(dir.path()), Err(Error::Format(_))));
}

/// Test a histogram file claiming more entries than it holds
#[test]
fn test_histogram_length_overstated() {
    let dir = TempDir::new().unwrap();
    build_database(dir.path());

    let path = dir.path().join(HISTOGRAM_FILENAME);
    let mut bytes = fs::read(&path).unwrap();
    // The entry count follows the three counters.
    bytes[24..32].copy_from_slice(&u64::MAX.to_le_bytes());
    fs::write(&path, bytes).unwrap();

    assert!(matches!(FileReader::open(dir.path()), Err(Error::Format(_))));
}

/// Test a truncated index file
#[test]
fn test_truncated_index() {
    let dir = TempDir::new().unwrap();
    build_database(dir.path());

    let path = dir.path().join(index_filename(1));
    let bytes = fs::read(&path).unwrap();
    fs::write(&path, &bytes[..bytes.len() - 7]).unwrap();

    let reader = FileReader::open(dir.path()).unwrap();
    assert!(reader.shard_reader(1).is_err());
    // The other shard is unaffected.
    assert!(reader.shard_reader(0).is_ok());
}

/// Test a block overwritten in place after the index was written
#[test]
fn test_corrupted_block_header() {
    let dir = TempDir::new().unwrap();
    build_database(dir.path());

    let path = dir.path().join(data_filename(0));
    let mut bytes = fs::read(&path).unwrap();
    // Corrupt the first block's prefix.
    bytes[0] ^= 0x80;
    fs::write(&path, bytes).unwrap();

    let reader = FileReader::open(dir.path()).unwrap();
    let shard = reader.shard_reader(0).unwrap();
    assert!(matches!(shard.read_block(0), Err(Error::Format(_))));

    // Iteration reports the error once, then stops.
    let results: Vec<_> = shard.entries().collect();
    assert_eq!(results.len(), 1);
    assert!(results[0].is_err());
}

/// Test a missing data file for a shard that has blocks
#[test]
fn test_missing_data_file() {
    let dir = TempDir::new().unwrap();
    build_database(dir.path());
    fs::remove_file(dir.path().join(data_filename(1))).unwrap();

    let reader = FileReader::open(dir.path()).unwrap();
    assert!(matches!(reader.shard_reader(1), Err(Error::Io(_))));
}
