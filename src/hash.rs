//! Deterministic hashing utilities.
//!
//! This module provides the hasher behind state digests. Unlike
//! `std::collections::hash_map::DefaultHasher`, which uses a random seed, this hasher
//! uses a fixed algorithm, so two processes feeding it the same simulation state
//! arrive at the same digest.
//!
//! # Why Deterministic Hashing?
//!
//! Peers running the same world compare trailing-state digests at frame boundaries to
//! detect silent divergence: a non-deterministic simulation cannot be caught by the
//! coordinator itself, only by digest comparison against another peer. A randomly
//! seeded hasher would make every comparison a false mismatch.
//!
//! # Usage
//!
//! ```
//! use trailstate::hash::{DeterministicHasher, fnv1a_hash};
//! use std::hash::{Hash, Hasher};
//!
//! let mut hasher = DeterministicHasher::new();
//! "world".hash(&mut hasher);
//! let digest = hasher.finish();
//!
//! // Convenience function for hashable values
//! assert_eq!(digest, fnv1a_hash(&"world"));
//! ```
//!
//! # Algorithm
//!
//! FNV-1a (Fowler-Noll-Vo, variant 1a): fast, simple, deterministic, with good
//! distribution for typical inputs. It is NOT cryptographically secure; for state
//! digests that is fine, since peers are trusted to report their digests honestly.

use std::hash::{Hash, Hasher};

/// FNV-1a 64-bit offset basis constant.
const FNV_OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;

/// FNV-1a 64-bit prime constant.
const FNV_PRIME: u64 = 0x0100_0000_01b3;

/// A deterministic hasher using the FNV-1a algorithm.
///
/// Simulations feed their observable state into this hasher through
/// [`Simulation::state_hash`]; the finished value is the slot's digest. The same
/// state always produces the same digest, across processes and platforms.
///
/// [`Simulation::state_hash`]: crate::Simulation::state_hash
#[derive(Debug, Clone)]
pub struct DeterministicHasher {
    state: u64,
}

impl DeterministicHasher {
    /// Creates a new `DeterministicHasher` with the standard FNV-1a offset basis.
    #[inline]
    #[must_use]
    pub const fn new() -> Self {
        Self {
            state: FNV_OFFSET_BASIS,
        }
    }
}

impl Default for DeterministicHasher {
    fn default() -> Self {
        Self::new()
    }
}

impl Hasher for DeterministicHasher {
    #[inline]
    fn finish(&self) -> u64 {
        self.state
    }

    #[inline]
    fn write(&mut self, bytes: &[u8]) {
        // FNV-1a: for each byte, XOR then multiply
        for &byte in bytes {
            self.state ^= u64::from(byte);
            self.state = self.state.wrapping_mul(FNV_PRIME);
        }
    }
}

/// Computes a deterministic FNV-1a hash of the given value.
///
/// # Example
///
/// ```
/// use trailstate::hash::fnv1a_hash;
///
/// assert_eq!(fnv1a_hash(&42u32), fnv1a_hash(&42u32));
/// assert_ne!(fnv1a_hash(&42u32), fnv1a_hash(&43u32));
/// ```
#[inline]
pub fn fnv1a_hash<T: Hash>(value: &T) -> u64 {
    let mut hasher = DeterministicHasher::new();
    value.hash(&mut hasher);
    hasher.finish()
}


// =============================================================================
// Property-Based Tests
// =============================================================================

#[cfg(test)]
#[allow(clippy::panic, clippy::unwrap_used, clippy::expect_used)]
mod property_tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        /// Same input always produces the same digest. Peers rely on this when
        /// comparing trailing-state digests.
        #[test]
        fn prop_hash_deterministic(input in any::<Vec<u8>>()) {
            let hash1 = {
                let mut hasher = DeterministicHasher::new();
                hasher.write(&input);
                hasher.finish()
            };
            let hash2 = {
                let mut hasher = DeterministicHasher::new();
                hasher.write(&input);
                hasher.finish()
            };
            prop_assert_eq!(hash1, hash2);
        }

        /// Chunking writes does not change the digest.
        #[test]
        fn prop_chunking_irrelevant(
            part_a in any::<Vec<u8>>(),
            part_b in any::<Vec<u8>>(),
        ) {
            let incremental = {
                let mut hasher = DeterministicHasher::new();
                hasher.write(&part_a);
                hasher.write(&part_b);
                hasher.finish()
            };
            let mut combined = part_a;
            combined.extend_from_slice(&part_b);
            let whole = {
                let mut hasher = DeterministicHasher::new();
                hasher.write(&combined);
                hasher.finish()
            };
            prop_assert_eq!(incremental, whole);
        }

        /// Adjacent integers hash differently.
        #[test]
        fn prop_adjacent_values_differ(base in any::<u64>().prop_filter("non-max", |v| *v < u64::MAX)) {
            prop_assert_ne!(fnv1a_hash(&base), fnv1a_hash(&(base + 1)));
        }
    }
}
