//! Bit-array codec.
//!
//! Values are packed into an array of 64-bit words addressed by bit
//! position. Bits are laid out MSB-first: bit position `p` is bit
//! `63 - p % 64` of word `p / 64`, so a field read back as an integer has
//! its first stored bit as its most significant bit.
//!
//! Two encodings are provided:
//!
//! - **Binary**: the low `width` bits of a value, `width` in `0..=64`.
//! - **Unary**: `n` is stored as `n` zero bits followed by a single one
//!   bit. Decoding skips all-zero 64-bit words at once and locates the
//!   terminating one bit in the final word from its leading zero count.

mod buffer;
mod cursor;

pub use buffer::{WordBuffer, MAX_WORDS};
pub use cursor::{BitReader, BitWriter};

use crate::key::mask;

/// Number of 64-bit words needed to hold `bits` bits.
#[inline]
pub fn words_for_bits(bits: u64) -> usize {
    bits.div_ceil(64) as usize
}

/// Write the low `width` bits of `value` at bit `pos`.
///
/// # Panics
///
/// Panics if the field extends past the end of `words`.
#[inline]
pub fn set_field(words: &mut [u64], pos: u64, width: u32, value: u64) {
    debug_assert!(width <= 64);
    if width == 0 {
        return;
    }

    let idx = (pos / 64) as usize;
    let room = 64 - (pos % 64) as u32;

    if width <= room {
        let shift = room - width;
        let field = mask(width) << shift;
        words[idx] = (words[idx] & !field) | ((value << shift) & field);
    } else {
        // Straddles two words: the high `room` bits close out the first
        // word, the remaining low bits open the next.
        let spill = width - room;
        let low = mask(room);
        words[idx] = (words[idx] & !low) | ((value >> spill) & low);

        let shift = 64 - spill;
        let field = mask(spill) << shift;
        words[idx + 1] = (words[idx + 1] & !field) | ((value << shift) & field);
    }
}

/// Read a `width`-bit field at bit `pos`.
///
/// # Panics
///
/// Panics if the field extends past the end of `words`.
#[inline]
pub fn get_field(words: &[u64], pos: u64, width: u32) -> u64 {
    debug_assert!(width <= 64);
    if width == 0 {
        return 0;
    }

    let idx = (pos / 64) as usize;
    let room = 64 - (pos % 64) as u32;

    if width <= room {
        (words[idx] >> (room - width)) & mask(width)
    } else {
        let spill = width - room;
        ((words[idx] & mask(room)) << spill) | (words[idx + 1] >> (64 - spill))
    }
}

/// Write `n` in unary at bit `pos`, returning the encoded size `n + 1`.
///
/// # Panics
///
/// Panics if the code extends past the end of `words`.
pub fn set_unary(words: &mut [u64], pos: u64, n: u64) -> u64 {
    let mut at = pos;
    for _ in 0..n / 64 {
        set_field(words, at, 64, 0);
        at += 64;
    }
    set_field(words, at, (n % 64) as u32 + 1, 1);
    n + 1
}

/// Read a unary code at bit `pos`, returning `(n, size)` with `size == n + 1`.
///
/// Returns `None` if no terminating one bit is found before the end of
/// `words`.
pub fn get_unary(words: &[u64], pos: u64) -> Option<(u64, u64)> {
    let total = words.len() as u64 * 64;
    let mut at = pos;
    let mut count = 0u64;

    while at < total {
        let width = (total - at).min(64) as u32;
        let word = get_field(words, at, width);
        if word == 0 {
            count += width as u64;
            at += width as u64;
            continue;
        }
        let bit_length = 64 - word.leading_zeros();
        count += (width - bit_length) as u64;
        return Some((count, count + 1));
    }

    None
}
