// Proof of Work primitives

use crate::core::Hash256;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use thiserror::Error;

/// Development difficulty: exponent 30, mantissa 0xffffff.
/// The target has two leading zero bytes.
pub const DEV_BITS: u32 = 0x1effffff;

/// Roughly one hash in two meets this target. Used by tests and local demos.
pub const EASY_BITS: u32 = 0x207fffff;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PowError {
    #[error("invalid difficulty bits {bits:#010x}: exponent must be within 1..=32")]
    InvalidBits { bits: u32 },
    #[error("mining cancelled after {attempts} attempts")]
    Cancelled { attempts: u64 },
    #[error("nonce space exhausted without meeting the target")]
    NonceSpaceExhausted,
}

/// Difficulty target decoded from its compact form
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Target {
    /// Compact representation (bits field in block header)
    pub bits: u32,
    hash: Hash256,
}

impl Target {
    /// Decode compact bits.
    ///
    /// The top byte is the exponent `e`, the low three bytes the mantissa.
    /// The mantissa is written most significant byte first at offset
    /// `32 - e`; bytes that would land past the end of the buffer (only
    /// possible for `e < 3`) are dropped.
    pub fn from_bits(bits: u32) -> Result<Self, PowError> {
        let exponent = (bits >> 24) as usize;
        if !(1..=32).contains(&exponent) {
            return Err(PowError::InvalidBits { bits });
        }

        let mantissa = (bits & 0x00ffffff).to_be_bytes();
        let mut target = [0u8; 32];
        let offset = 32 - exponent;

        for (i, byte) in mantissa[1..].iter().enumerate() {
            if let Some(slot) = target.get_mut(offset + i) {
                *slot = *byte;
            }
        }

        Ok(Self {
            bits,
            hash: Hash256::new(target),
        })
    }

    /// The full 256-bit target
    pub fn to_hash256(&self) -> Hash256 {
        self.hash
    }

    /// Check if a hash meets this target (hash <= target)
    pub fn is_met_by(&self, hash: &Hash256) -> bool {
        is_below_or_equal_target(hash, &self.hash)
    }

    /// Count leading zero bits in target (difficulty indicator)
    pub fn leading_zeros(&self) -> u32 {
        let mut zeros = 0;

        for byte in self.hash.as_bytes() {
            if *byte == 0 {
                zeros += 8;
            } else {
                zeros += byte.leading_zeros();
                break;
            }
        }

        zeros
    }
}

/// Decode compact difficulty bits into a 32-byte target
pub fn decode_target(bits: u32) -> Result<Hash256, PowError> {
    Target::from_bits(bits).map(|target| target.to_hash256())
}

/// Byte-wise comparison, most significant byte first.
/// Equality counts as meeting the target.
pub fn is_below_or_equal_target(hash: &Hash256, target: &Hash256) -> bool {
    for (h, t) in hash.as_bytes().iter().zip(target.as_bytes()) {
        if h < t {
            return true;
        }
        if h > t {
            return false;
        }
    }
    true
}

/// Cooperative cancellation signal for a nonce search.
///
/// Clones share the same flag. An optional deadline cancels the search
/// once it has passed.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
    deadline: Option<Instant>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// A token that also fires once `timeout` has elapsed
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            flag: Arc::new(AtomicBool::new(false)),
            deadline: Some(Instant::now() + timeout),
        }
    }

    /// Signal every holder of this token. Once set, it stays set.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        if self.flag.load(Ordering::Relaxed) {
            return true;
        }
        matches!(self.deadline, Some(deadline) if Instant::now() >= deadline)
    }
}

/// Mining result
#[derive(Debug, Clone, PartialEq)]
pub struct MiningResult {
    /// The nonce that was found
    pub nonce: u64,
    /// The resulting hash
    pub hash: Hash256,
    /// Number of attempts
    pub attempts: u64,
    /// Time taken
    pub duration: Duration,
}

impl MiningResult {
    /// Hashes per second
    pub fn hash_rate(&self) -> f64 {
        let secs = self.duration.as_secs_f64();
        if secs == 0.0 {
            return self.attempts as f64;
        }
        self.attempts as f64 / secs
    }
}
