//! Binary codec for snapshot serialization.
//!
//! This module provides a centralized interface for encoding and decoding snapshot
//! payloads using bincode. It encapsulates the bincode configuration to ensure
//! consistent, deterministic serialization across the codebase.
//!
//! # Design Rationale
//!
//! - **Centralized Configuration**: The bincode config is defined once, avoiding
//!   repeated `bincode::config::standard().with_fixed_int_encoding()` calls.
//! - **Deterministic layout**: Fixed-size little-endian integers mean the same
//!   snapshot always serializes to the same bytes, regardless of platform.
//! - **Clear Error Handling**: All functions return `Result` types with descriptive
//!   error variants.
//!
//! # Examples
//!
//! ```
//! use trailstate::codec::{encode, decode};
//!
//! let data: u32 = 42;
//! let bytes = encode(&data).expect("encoding should succeed");
//! let decoded: u32 = decode(&bytes).expect("decoding should succeed");
//! assert_eq!(data, decoded);
//! ```

use serde::{de::DeserializeOwned, Serialize};
use std::fmt;

// The bincode configuration used for every snapshot.
//
// Fixed-size integers keep the wire layout stable across platforms and make
// snapshot sizes predictable; variable-length encodings save little here because
// snapshots are dominated by the trailing simulation's own payload.
fn config() -> impl bincode::config::Config {
    bincode::config::standard().with_fixed_int_encoding()
}

/// Errors that can occur during encoding or decoding.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum CodecError {
    /// The encoding operation failed.
    Encode(String),
    /// The decoding operation failed.
    Decode(String),
    /// Decoding succeeded but left unconsumed bytes, indicating a corrupt or
    /// mismatched payload.
    TrailingBytes {
        /// How many bytes were left over.
        remaining: usize,
    },
}

impl fmt::Display for CodecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Encode(msg) => write!(f, "encoding failed: {msg}"),
            Self::Decode(msg) => write!(f, "decoding failed: {msg}"),
            Self::TrailingBytes { remaining } => {
                write!(f, "decoding left {remaining} unconsumed bytes")
            },
        }
    }
}

impl std::error::Error for CodecError {}

/// Result type for codec operations.
pub type CodecResult<T> = Result<T, CodecError>;

/// Encodes a value into a new `Vec<u8>`.
///
/// # Examples
///
/// ```
/// use trailstate::codec::encode;
///
/// let bytes = encode(&42u32).expect("encoding should succeed");
/// assert!(!bytes.is_empty());
/// ```
pub fn encode<T: Serialize>(value: &T) -> CodecResult<Vec<u8>> {
    bincode::serde::encode_to_vec(value, config()).map_err(|e| CodecError::Encode(e.to_string()))
}

/// Decodes a value from a byte slice, requiring that every byte is consumed.
///
/// Snapshots are self-contained payloads: trailing garbage means the input was
/// corrupted or produced by an incompatible peer, so it is rejected rather than
/// silently ignored.
pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> CodecResult<T> {
    let (value, consumed): (T, usize) = bincode::serde::decode_from_slice(bytes, config())
        .map_err(|e| CodecError::Decode(e.to_string()))?;
    if consumed != bytes.len() {
        return Err(CodecError::TrailingBytes {
            remaining: bytes.len() - consumed,
        });
    }
    Ok(value)
}
