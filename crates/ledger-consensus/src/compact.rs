//! Compact ("nBits") target encoding.
//!
//! A compact target packs a 256-bit unsigned target into 32 bits: one size
//! byte giving the length of the value in bytes, a sign bit, and a 23-bit
//! mantissa. The encoding is not unique; several compact values decode to the
//! same target, and re-encoding picks the canonical one.

use crate::block::Hash256;
use crate::params::ConsensusParams;
use crate::{ConsensusError, ConsensusResult};
use num_bigint::BigUint;
use num_traits::{ToPrimitive, Zero};

const SIGN_BIT: u32 = 0x0080_0000;
const MANTISSA_MASK: u32 = 0x007f_ffff;

/// Result of decoding a compact target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedCompact {
    /// Decoded magnitude.
    pub value: BigUint,
    /// Sign bit set with a non-zero mantissa.
    pub negative: bool,
    /// Value does not fit in 256 bits.
    pub overflow: bool,
}

/// Decode a compact target.
pub fn decode_compact(bits: u32) -> DecodedCompact {
    let size = bits >> 24;
    let mut word = bits & MANTISSA_MASK;

    let value = if size <= 3 {
        word >>= 8 * (3 - size);
        BigUint::from(word)
    } else {
        BigUint::from(word) << (8 * (size - 3)) as usize
    };

    let negative = word != 0 && (bits & SIGN_BIT) != 0;
    let overflow =
        word != 0 && (size > 34 || (word > 0xff && size > 33) || (word > 0xffff && size > 32));

    DecodedCompact {
        value,
        negative,
        overflow,
    }
}

/// Encode a target as a compact value.
pub fn encode_compact(value: &BigUint, negative: bool) -> u32 {
    let mut size = ((value.bits() + 7) / 8) as u32;
    let mut compact: u32 = if size <= 3 {
        // Fits in the mantissa; shift left to fill it.
        let low = value.to_u32().unwrap_or(0);
        low << (8 * (3 - size))
    } else {
        let shifted: BigUint = value >> (8 * (size - 3)) as usize;
        shifted.to_u32().unwrap_or(0)
    };

    // The mantissa's top bit is the sign; move up a byte instead of using it.
    if compact & SIGN_BIT != 0 {
        compact >>= 8;
        size += 1;
    }

    compact |= size << 24;
    if negative && (compact & MANTISSA_MASK) != 0 {
        compact |= SIGN_BIT;
    }
    compact
}

/// A compact-encoded proof-of-work target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CompactTarget(pub u32);

impl CompactTarget {
    /// Encode a non-negative target.
    pub fn from_target(target: &BigUint) -> Self {
        Self(encode_compact(target, false))
    }

    /// Raw compact bits.
    pub fn bits(self) -> u32 {
        self.0
    }

    /// Decode without validation.
    pub fn decode(self) -> DecodedCompact {
        decode_compact(self.0)
    }

    /// Decode, rejecting negative and overflowing encodings.
    pub fn to_target(self) -> ConsensusResult<BigUint> {
        let decoded = self.decode();
        if decoded.negative {
            return Err(ConsensusError::InvalidCompact {
                bits: self.0,
                reason: "negative target".to_string(),
            });
        }
        if decoded.overflow {
            return Err(ConsensusError::InvalidCompact {
                bits: self.0,
                reason: "target overflows 256 bits".to_string(),
            });
        }
        Ok(decoded.value)
    }
}

/// Interpret a hash as a little-endian 256-bit integer.
pub fn hash_to_uint(hash: &Hash256) -> BigUint {
    BigUint::from_bytes_le(hash.as_bytes())
}

/// Check that `hash` satisfies the proof-of-work target encoded in `bits`.
pub fn check_proof_of_work(
    hash: &Hash256,
    bits: u32,
    params: &ConsensusParams,
) -> ConsensusResult<()> {
    let target = CompactTarget(bits).to_target()?;
    if target.is_zero() {
        return Err(ConsensusError::InvalidCompact {
            bits,
            reason: "zero target".to_string(),
        });
    }
    let limit = CompactTarget(params.pow_limit_bits).to_target()?;
    if target > limit {
        return Err(ConsensusError::InvalidCompact {
            bits,
            reason: "target above proof-of-work limit".to_string(),
        });
    }
    if hash_to_uint(hash) > target {
        return Err(ConsensusError::InvalidPow { hash: *hash, bits });
    }
    Ok(())
}
