//! Sequential bit cursors over word arrays.

use super::{get_field, get_unary, set_field, set_unary, words_for_bits, WordBuffer};
use crate::error::{Error, Result};

/// Words added per growth step while encoding.
const GROWTH_WORDS: usize = 1024;

/// Appends fields and unary codes to a growable word buffer.
#[derive(Debug, Default)]
pub struct BitWriter {
    words: WordBuffer,
    pos: u64,
}

impl BitWriter {
    /// Create a writer sized for `bits` bits.
    pub fn with_capacity(bits: u64) -> Result<Self> {
        Ok(Self { words: WordBuffer::with_len(words_for_bits(bits))?, pos: 0 })
    }

    /// Append the low `width` bits of `value`.
    pub fn write_field(&mut self, width: u32, value: u64) -> Result<()> {
        self.reserve(width as u64)?;
        set_field(self.words.as_mut_slice(), self.pos, width, value);
        self.pos += width as u64;
        Ok(())
    }

    /// Append `n` in unary, returning the encoded size.
    pub fn write_unary(&mut self, n: u64) -> Result<u64> {
        self.reserve(n + 1)?;
        let size = set_unary(self.words.as_mut_slice(), self.pos, n);
        self.pos += size;
        Ok(size)
    }

    /// Number of bits written so far.
    pub fn position(&self) -> u64 {
        self.pos
    }

    /// Finish writing and return exactly the words used.
    pub fn finish(mut self) -> Vec<u64> {
        self.words.truncate(words_for_bits(self.pos));
        self.words.into_vec()
    }

    fn reserve(&mut self, bits: u64) -> Result<()> {
        let end = self
            .pos
            .checked_add(bits)
            .ok_or_else(|| Error::capacity("bit position overflow"))?;
        self.words.ensure(words_for_bits(end), Some(GROWTH_WORDS.max(self.words.len())))
    }
}

/// Reads fields and unary codes from a word slice.
///
/// Reads past the end of the slice are reported as format errors.
#[derive(Debug, Clone)]
pub struct BitReader<'a> {
    words: &'a [u64],
    pos: u64,
}

impl<'a> BitReader<'a> {
    /// Create a reader starting at bit 0.
    pub fn new(words: &'a [u64]) -> Self {
        Self { words, pos: 0 }
    }

    /// Read a `width`-bit field.
    pub fn read_field(&mut self, width: u32) -> Result<u64> {
        if width as u64 > self.remaining() {
            return Err(Error::format(format!(
                "bit field of width {} at position {} runs past {} bits",
                width,
                self.pos,
                self.total_bits()
            )));
        }
        let value = get_field(self.words, self.pos, width);
        self.pos += width as u64;
        Ok(value)
    }

    /// Read a unary code.
    pub fn read_unary(&mut self) -> Result<u64> {
        let (n, size) = get_unary(self.words, self.pos).ok_or_else(|| {
            Error::format(format!("unterminated unary code at position {}", self.pos))
        })?;
        self.pos += size;
        Ok(n)
    }

    /// Current bit position.
    pub fn position(&self) -> u64 {
        self.pos
    }

    /// Bits left to read.
    pub fn remaining(&self) -> u64 {
        self.total_bits() - self.pos
    }

    fn total_bits(&self) -> u64 {
        self.words.len() as u64 * 64
    }
}
