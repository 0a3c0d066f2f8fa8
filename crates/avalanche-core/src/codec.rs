//! Hex/bit codec.
//!
//! Hex text decodes into a nibble-aligned [`BitVector`]. The width of the
//! vector is fixed by the number of hex digits rather than by the numeric
//! value, so leading zero bits survive decoding.

use core::fmt;
use core::iter;
use core::str::FromStr;

use thiserror::Error;

/// Errors raised while decoding hex text.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    #[error("malformed hex input {input:?}: invalid character {character:?} at position {position}")]
    MalformedHexInput {
        input: String,
        position: usize,
        character: char,
    },
}

/// Fixed-width bit vector, stored most significant nibble first.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct BitVector {
    nibbles: Vec<u8>,
}

impl BitVector {
    /// Number of bits, always `4 * hex digit count`.
    pub fn width(&self) -> usize {
        self.nibbles.len() * 4
    }

    /// Bits from most to least significant.
    pub fn bits(&self) -> impl Iterator<Item = bool> + '_ {
        self.nibbles
            .iter()
            .flat_map(|&n| (0..4).rev().map(move |shift| (n >> shift) & 1 == 1))
    }

    pub fn count_ones(&self) -> u32 {
        self.nibbles.iter().map(|n| n.count_ones()).sum()
    }

    /// Render as a string of `0` and `1`, one character per bit.
    pub fn to_bit_string(&self) -> String {
        self.to_string()
    }
}

impl FromStr for BitVector {
    type Err = CodecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        decode(s)
    }
}

impl fmt::Display for BitVector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for bit in self.bits() {
            f.write_str(if bit { "1" } else { "0" })?;
        }
        Ok(())
    }
}

/// Decode hex text into a bit vector.
///
/// Whitespace anywhere in the input is ignored and digits are
/// case-insensitive. The empty string decodes to an empty vector.
pub fn decode(hex: &str) -> Result<BitVector, CodecError> {
    let mut nibbles = Vec::with_capacity(hex.len());
    for (position, character) in hex.chars().enumerate() {
        if character.is_whitespace() {
            continue;
        }
        let nibble = character
            .to_digit(16)
            .ok_or_else(|| CodecError::MalformedHexInput {
                input: hex.to_string(),
                position,
                character,
            })?;
        nibbles.push(nibble as u8);
    }
    Ok(BitVector { nibbles })
}

/// Count differing bit positions between two vectors.
///
/// The narrower vector is zero-extended on the left to the wider width
/// before comparison.
pub fn hamming(a: &BitVector, b: &BitVector) -> u32 {
    let (wide, narrow) = if a.nibbles.len() >= b.nibbles.len() {
        (a, b)
    } else {
        (b, a)
    };
    let padding = wide.nibbles.len() - narrow.nibbles.len();
    let aligned = iter::repeat_n(0u8, padding).chain(narrow.nibbles.iter().copied());

    wide.nibbles
        .iter()
        .zip(aligned)
        .map(|(x, y)| (x ^ y).count_ones())
        .sum()
}

/// Decode two hex strings and count the bits in which they differ.
pub fn diff(hex_a: &str, hex_b: &str) -> Result<u32, CodecError> {
    Ok(hamming(&decode(hex_a)?, &decode(hex_b)?))
}
