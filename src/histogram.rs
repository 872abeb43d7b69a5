//! Value histogram.
//!
//! Summarizes the values written to a database: how many keys carried
//! each value, plus three counters. Values below the dense ceiling are
//! counted in an array; larger values go to an ordered map.
//!
//! A histogram is either *building* (accepts [`Histogram::add_value`]) or
//! *finalized* (an immutable, ascending list of (value, occurrences)
//! pairs). [`Histogram::dump`] finalizes, [`Histogram::load`] produces a
//! finalized histogram, and [`Histogram::clear`] returns to an empty
//! building state.
//!
//! ## Formats
//!
//! Version 3 (the only format written):
//!
//! ```text
//! [num_unique: u64][num_distinct: u64][num_total: u64]
//! [num_values: u64]
//! [value: u64][occurrences: u64] * num_values
//! ```
//!
//! Versions 1 and 2 (read only):
//!
//! ```text
//! [num_unique: u64][num_distinct: u64][num_total: u64]
//! [hist_last: u32][hbig_len: u32]
//! [occurrences: u64] * hist_last           // indexed by value
//! [value: u64][occurrences: u64] * hbig_len    // optional
//! ```
//!
//! All integers are little-endian.

use crate::config::DEFAULT_DENSE_CEILING;
use crate::error::{Error, Result};
use bytes::{BufMut, BytesMut};
use std::collections::BTreeMap;
use std::io::{self, Read, Write};

/// The histogram format written by [`Histogram::dump`].
pub const HISTOGRAM_VERSION: u32 = 3;

/// Entries preallocated while loading, regardless of the count a header claims.
const LOAD_PREALLOC_LIMIT: usize = 1 << 20;

/// One (value, occurrences) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct HistogramEntry {
    /// The observed value
    pub value: u64,
    /// How many keys carried it
    pub occurrences: u64,
}

impl HistogramEntry {
    /// Create a new entry
    pub fn new(value: u64, occurrences: u64) -> Self {
        Self { value, occurrences }
    }
}

#[derive(Debug, Clone)]
enum Body {
    Building { dense: Vec<u64>, sparse: BTreeMap<u64, u64> },
    Finalized { entries: Vec<HistogramEntry> },
}

/// Histogram of values with summary counters.
#[derive(Debug, Clone)]
pub struct Histogram {
    num_unique: u64,
    num_distinct: u64,
    num_total: u64,
    dense_ceiling: usize,
    body: Body,
}

impl Default for Histogram {
    fn default() -> Self {
        Self::new(DEFAULT_DENSE_CEILING)
    }
}

impl Histogram {
    /// Create an empty, building histogram.
    pub fn new(dense_ceiling: usize) -> Self {
        Self {
            num_unique: 0,
            num_distinct: 0,
            num_total: 0,
            dense_ceiling,
            body: Body::Building { dense: vec![0; dense_ceiling], sparse: BTreeMap::new() },
        }
    }

    /// Record one key carrying `value`.
    ///
    /// The key counts toward `num_distinct`, toward `num_unique` when
    /// `value == 1`, and adds `value` to `num_total`.
    pub fn add_value(&mut self, value: u64) -> Result<()> {
        let Body::Building { dense, sparse } = &mut self.body else {
            return Err(Error::invalid_state("cannot add values to a finalized histogram"));
        };

        match dense.get_mut(value as usize) {
            Some(cell) if value < self.dense_ceiling as u64 => *cell += 1,
            _ => *sparse.entry(value).or_insert(0) += 1,
        }

        self.num_distinct += 1;
        if value == 1 {
            self.num_unique += 1;
        }
        self.num_total = self.num_total.saturating_add(value);
        Ok(())
    }

    /// Fold `other` into this building histogram.
    pub fn merge(&mut self, other: &Histogram) -> Result<()> {
        if self.is_finalized() {
            return Err(Error::invalid_state("cannot merge into a finalized histogram"));
        }

        for entry in other.sorted_entries() {
            self.add_occurrences(entry.value, entry.occurrences);
        }
        self.num_unique += other.num_unique;
        self.num_distinct += other.num_distinct;
        self.num_total = self.num_total.saturating_add(other.num_total);
        Ok(())
    }

    /// Freeze into the flattened (value, occurrences) list.
    pub fn finalize(&mut self) {
        if let Body::Building { .. } = self.body {
            let entries = self.sorted_entries();
            self.body = Body::Finalized { entries };
        }
    }

    /// Finalize and write the version 3 format.
    pub fn dump<W: Write>(&mut self, writer: &mut W) -> Result<()> {
        self.finalize();
        let entries = self.entries()?;

        let mut buf = BytesMut::with_capacity(32 + entries.len() * 16);
        buf.put_u64_le(self.num_unique);
        buf.put_u64_le(self.num_distinct);
        buf.put_u64_le(self.num_total);
        buf.put_u64_le(entries.len() as u64);
        for entry in entries {
            buf.put_u64_le(entry.value);
            buf.put_u64_le(entry.occurrences);
        }

        writer.write_all(&buf)?;
        Ok(())
    }

    /// Replace the contents with a histogram read in format `version`.
    ///
    /// On success the histogram is finalized. On error it is unchanged.
    pub fn load<R: Read>(&mut self, reader: &mut R, version: u32) -> Result<()> {
        let (counters, entries) = match version {
            1 | 2 => Self::load_legacy(reader)?,
            3 => Self::load_canonical(reader)?,
            other => {
                return Err(Error::format(format!("unknown histogram version {}", other)));
            }
        };

        [self.num_unique, self.num_distinct, self.num_total] = counters;
        self.body = Body::Finalized { entries };
        Ok(())
    }

    fn load_legacy<R: Read>(reader: &mut R) -> Result<([u64; 3], Vec<HistogramEntry>)> {
        let counters = read_counters(reader)?;
        let hist_last = read_u32(reader, "histogram dense length")? as usize;
        let hbig_len = read_u32(reader, "histogram sparse length")? as usize;

        // Read the whole dense array before flattening it.
        let mut dense = Vec::with_capacity(hist_last.min(LOAD_PREALLOC_LIMIT));
        for _ in 0..hist_last {
            dense.push(read_u64(reader, "histogram dense cell")?);
        }

        let mut merged = BTreeMap::new();
        for (value, &occurrences) in dense.iter().enumerate() {
            if occurrences > 0 {
                merged.insert(value as u64, occurrences);
            }
        }
        // Large-value pairs follow the dense cells only in files that carry
        // them; `hbig_len` alone does not promise a trailer.
        if hbig_len > 0 {
            if let Some(mut value) = try_read_u64(reader, "histogram sparse value")? {
                for i in 0..hbig_len {
                    if i > 0 {
                        value = read_u64(reader, "histogram sparse value")?;
                    }
                    let occurrences = read_u64(reader, "histogram sparse occurrences")?;
                    *merged.entry(value).or_insert(0) += occurrences;
                }
            }
        }

        let entries = merged.into_iter().map(|(v, o)| HistogramEntry::new(v, o)).collect();
        Ok((counters, entries))
    }

    fn load_canonical<R: Read>(reader: &mut R) -> Result<([u64; 3], Vec<HistogramEntry>)> {
        let counters = read_counters(reader)?;
        let num_values = read_u64(reader, "histogram length")?;

        let mut entries = Vec::with_capacity((num_values as usize).min(LOAD_PREALLOC_LIMIT));
        for _ in 0..num_values {
            let value = read_u64(reader, "histogram value")?;
            let occurrences = read_u64(reader, "histogram occurrences")?;
            entries.push(HistogramEntry::new(value, occurrences));
        }
        Ok((counters, entries))
    }

    /// Reset to an empty building histogram.
    pub fn clear(&mut self) {
        self.num_unique = 0;
        self.num_distinct = 0;
        self.num_total = 0;
        match &mut self.body {
            Body::Building { dense, sparse } => {
                dense.iter_mut().for_each(|c| *c = 0);
                sparse.clear();
            }
            Body::Finalized { .. } => {
                self.body = Body::Building {
                    dense: vec![0; self.dense_ceiling],
                    sparse: BTreeMap::new(),
                };
            }
        }
    }

    /// Keys that carried the value 1.
    pub fn num_unique(&self) -> u64 {
        self.num_unique
    }

    /// Keys recorded.
    pub fn num_distinct(&self) -> u64 {
        self.num_distinct
    }

    /// Sum of all recorded values.
    pub fn num_total(&self) -> u64 {
        self.num_total
    }

    /// Boundary between the dense and sparse tiers.
    pub fn dense_ceiling(&self) -> usize {
        self.dense_ceiling
    }

    /// Check if the histogram is finalized.
    pub fn is_finalized(&self) -> bool {
        matches!(self.body, Body::Finalized { .. })
    }

    /// Number of distinct values with nonzero occurrences.
    pub fn len(&self) -> usize {
        match &self.body {
            Body::Building { dense, sparse } => {
                dense.iter().filter(|&&c| c > 0).count() + sparse.len()
            }
            Body::Finalized { entries } => entries.len(),
        }
    }

    /// Check if no values have been recorded.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The flattened (value, occurrences) list of a finalized histogram.
    pub fn entries(&self) -> Result<&[HistogramEntry]> {
        match &self.body {
            Body::Finalized { entries } => Ok(entries),
            Body::Building { .. } => {
                Err(Error::invalid_state("histogram must be finalized to list entries"))
            }
        }
    }

    /// Occurrences of `value`, in either state.
    pub fn occurrences(&self, value: u64) -> u64 {
        match &self.body {
            Body::Building { dense, sparse } => match dense.get(value as usize) {
                Some(&count) if value < self.dense_ceiling as u64 => count,
                _ => sparse.get(&value).copied().unwrap_or(0),
            },
            Body::Finalized { entries } => {
                entries.iter().find(|e| e.value == value).map_or(0, |e| e.occurrences)
            }
        }
    }

    /// Write one `value<TAB>occurrences` line per entry, ascending by value.
    pub fn write_report<W: Write>(&self, writer: &mut W) -> Result<()> {
        for entry in self.sorted_entries() {
            writeln!(writer, "{}\t{}", entry.value, entry.occurrences)?;
        }
        Ok(())
    }

    fn add_occurrences(&mut self, value: u64, occurrences: u64) {
        if let Body::Building { dense, sparse } = &mut self.body {
            match dense.get_mut(value as usize) {
                Some(cell) if value < self.dense_ceiling as u64 => *cell += occurrences,
                _ => *sparse.entry(value).or_insert(0) += occurrences,
            }
        }
    }

    fn sorted_entries(&self) -> Vec<HistogramEntry> {
        match &self.body {
            Body::Building { dense, sparse } => dense
                .iter()
                .enumerate()
                .filter(|&(_, &c)| c > 0)
                .map(|(v, &c)| HistogramEntry::new(v as u64, c))
                .chain(sparse.iter().map(|(&v, &c)| HistogramEntry::new(v, c)))
                .collect(),
            Body::Finalized { entries } => {
                let mut sorted = entries.clone();
                sorted.sort_unstable();
                sorted
            }
        }
    }
}

fn read_counters<R: Read>(reader: &mut R) -> Result<[u64; 3]> {
    Ok([
        read_u64(reader, "histogram num_unique")?,
        read_u64(reader, "histogram num_distinct")?,
        read_u64(reader, "histogram num_total")?,
    ])
}

fn read_u64<R: Read>(reader: &mut R, what: &str) -> Result<u64> {
    let mut buf = [0u8; 8];
    reader.read_exact(&mut buf).map_err(|e| Error::from_read(e, what))?;
    Ok(u64::from_le_bytes(buf))
}

/// Like [`read_u64`], but a stream that ends before the first byte yields `None`.
fn try_read_u64<R: Read>(reader: &mut R, what: &str) -> Result<Option<u64>> {
    let mut buf = [0u8; 8];
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(Error::Io(e)),
        }
    }
    match filled {
        0 => Ok(None),
        8 => Ok(Some(u64::from_le_bytes(buf))),
        _ => Err(Error::format(format!("truncated input while reading {}", what))),
    }
}

fn read_u32<R: Read>(reader: &mut R, what: &str) -> Result<u32> {
    let mut buf = [0u8; 4];
    reader.read_exact(&mut buf).map_err(|e| Error::from_read(e, what))?;
    Ok(u32::from_le_bytes(buf))
}
