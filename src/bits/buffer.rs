//! Growable word storage for the bit codec.

use crate::error::{Error, Result};

/// Upper bound on the number of words a single buffer may hold (32 GiB).
pub const MAX_WORDS: usize = 1 << 32;

/// An owned, zero-initialised array of 64-bit words.
///
/// `len` is the number of addressable words; `capacity` is the backing
/// allocation. Growing may move the backing storage but never changes
/// words that were already written.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WordBuffer {
    words: Vec<u64>,
}

impl WordBuffer {
    /// Create an empty buffer.
    pub fn new() -> Self {
        Self { words: Vec::new() }
    }

    /// Create a buffer with `len` zero words.
    pub fn with_len(len: usize) -> Result<Self> {
        let mut buffer = Self::new();
        buffer.ensure(len, None)?;
        Ok(buffer)
    }

    /// Number of addressable words.
    pub fn len(&self) -> usize {
        self.words.len()
    }

    /// Check if the buffer holds no words.
    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    /// Size of the backing allocation, in words.
    pub fn capacity(&self) -> usize {
        self.words.capacity()
    }

    /// Grow so at least `min_words` words are addressable.
    ///
    /// With an `increment`, the new length is `max(min_words, len + increment)`;
    /// without one the length doubles, again at least to `min_words`. New
    /// words are zero.
    pub fn ensure(&mut self, min_words: usize, increment: Option<usize>) -> Result<()> {
        if min_words <= self.words.len() {
            return Ok(());
        }
        if min_words > MAX_WORDS {
            return Err(Error::capacity(format!(
                "word buffer of {} words exceeds limit of {}",
                min_words, MAX_WORDS
            )));
        }

        let grown = match increment {
            Some(step) => self.words.len().saturating_add(step),
            None => self.words.len().saturating_mul(2),
        };
        let new_len = grown.clamp(min_words, MAX_WORDS);

        self.words.resize(new_len, 0);
        Ok(())
    }

    /// Zero every word without releasing storage.
    pub fn clear(&mut self) {
        self.words.iter_mut().for_each(|w| *w = 0);
    }

    /// Shorten to `len` words.
    pub fn truncate(&mut self, len: usize) {
        self.words.truncate(len);
    }

    /// The words as a slice.
    pub fn as_slice(&self) -> &[u64] {
        &self.words
    }

    /// The words as a mutable slice.
    pub fn as_mut_slice(&mut self) -> &mut [u64] {
        &mut self.words
    }

    /// Take the words out of the buffer.
    pub fn into_vec(self) -> Vec<u64> {
        self.words
    }
}
