//! Error types for Trailstate.
//!
//! This module provides structured error types for the synchronization engine.
//! The error types are designed to be:
//!
//! - **Zero-allocation on hot paths**: Scheduling errors store numeric data directly
//!   instead of formatting strings, enabling allocation-free error construction.
//! - **Programmatically inspectable**: Using enums and structured fields instead of
//!   string messages allows callers to match on specific error cases.
//! - **Self-documenting**: Each error variant and field is documented.
//!
//! # Error policy
//!
//! Late-arriving *tentative* commands are dropped silently (they represent
//! speculative inputs that no longer matter). Late-arriving *authoritative* events
//! surface [`TssError::InvalidTiming`] and additionally invalidate the coordinator.
//! A rewind below the trailing frame never surfaces an error at all: it is recovered
//! internally by firing the invalidation notification.

use std::error::Error;
use std::fmt;
use std::fmt::Display;

use crate::codec::CodecError;
use crate::{EntityId, Frame};

// =============================================================================
// Structured Error Types for Hot Paths
// =============================================================================
// These types store debugging data as fields (cheap - no allocation) and format
// lazily in Display impl (only when the error is displayed - cold path).

/// Represents why a schedule request had invalid timing.
///
/// Using an enum instead of String allows for zero-allocation error construction
/// on hot paths while still providing detailed error messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum InvalidTimingReason {
    /// The requested frame is older than the trailing simulation's frame.
    BeforeTrailing {
        /// The trailing simulation's frame at the time of the request.
        trailing: Frame,
    },
    /// System installation was attempted after the world already started stepping.
    SystemsLocked {
        /// The coordinator's frame at the time of the request.
        current_frame: Frame,
    },
}

impl Display for InvalidTimingReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BeforeTrailing { trailing } => {
                write!(f, "frame is older than the trailing frame {trailing}")
            },
            Self::SystemsLocked { current_frame } => {
                write!(
                    f,
                    "systems can only be installed before the first step (current frame: {current_frame})"
                )
            },
        }
    }
}

/// Represents why a coordinator configuration was rejected.
///
/// Using an enum instead of String allows for zero-allocation error construction
/// and programmatic error inspection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum ConfigErrorKind {
    /// No trailing delays were configured. At least one delay beyond the leading
    /// slot is required, otherwise there is no trailing state to synchronize from.
    EmptyDelays,
    /// A configured delay was zero. The leading slot always has delay 0 and is
    /// created implicitly; configured delays describe the deeper slots.
    ZeroDelay {
        /// The position of the offending delay in the configured list.
        index: usize,
    },
    /// The configured delays were not strictly ascending.
    UnsortedDelays {
        /// The position of the offending delay in the configured list.
        index: usize,
        /// The delay before the offending one.
        previous: u64,
        /// The offending delay.
        value: u64,
    },
}

impl Display for ConfigErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyDelays => {
                write!(f, "at least one trailing delay must be configured")
            },
            Self::ZeroDelay { index } => {
                write!(
                    f,
                    "configured delay at position {index} is zero; the leading slot is implicit"
                )
            },
            Self::UnsortedDelays {
                index,
                previous,
                value,
            } => {
                write!(
                    f,
                    "configured delays must be strictly ascending: delay {value} at position {index} does not exceed {previous}"
                )
            },
        }
    }
}

// =============================================================================
// Main Error Enum
// =============================================================================

/// This enum contains all errors this library can return. Most API functions will
/// generally return a [`Result<(), TssError>`].
///
/// # Forward Compatibility
///
/// This enum is marked `#[non_exhaustive]` because new error variants may be added
/// in future versions. Always include a wildcard arm when matching:
///
/// ```ignore
/// match error {
///     TssError::NotReady => { /* request a snapshot */ }
///     TssError::InvalidTiming { .. } => { /* handle */ }
///     _ => { /* handle unknown errors */ }
/// }
/// ```
///
/// [`Result<(), TssError>`]: std::result::Result
#[derive(Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum TssError {
    /// The coordinator is waiting for synchronization and cannot accept commands,
    /// removals or frame advances. Recover by feeding it a fresh snapshot via
    /// [`initialize`] or [`load_snapshot`].
    ///
    /// [`initialize`]: crate::TssCoordinator::initialize
    /// [`load_snapshot`]: crate::TssCoordinator::load_snapshot
    NotReady,
    /// A schedule request targeted a frame that can no longer (or not yet) be
    /// honored.
    InvalidTiming {
        /// The frame that was requested.
        frame: Frame,
        /// The structured reason why the timing was invalid.
        reason: InvalidTimingReason,
    },
    /// An entity was scheduled for both insertion and removal at the same frame.
    /// This is a programmer error; the first scheduled event is retained.
    Conflict {
        /// The entity with conflicting events.
        entity: EntityId,
        /// The frame both events targeted.
        frame: Frame,
    },
    /// Serialization or deserialization of a snapshot failed.
    Codec {
        /// The underlying codec error.
        kind: CodecError,
    },
    /// The coordinator configuration was rejected at construction.
    Config {
        /// The structured kind of configuration error.
        kind: ConfigErrorKind,
    },
}

impl Display for TssError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotReady => {
                write!(
                    f,
                    "The coordinator is waiting for synchronization; feed it a snapshot first."
                )
            },
            Self::InvalidTiming { frame, reason } => {
                write!(f, "Invalid timing for frame {frame}: {reason}")
            },
            Self::Conflict { entity, frame } => {
                write!(
                    f,
                    "Entity {entity} is scheduled for both insertion and removal at frame {frame}"
                )
            },
            Self::Codec { kind } => {
                write!(f, "Snapshot codec error: {kind}")
            },
            Self::Config { kind } => {
                write!(f, "Invalid configuration: {kind}")
            },
        }
    }
}

impl Error for TssError {
    /// Returns the lower-level source of this error, if any.
    ///
    /// `TssError` variants store their context as structured fields rather than
    /// wrapping underlying error types. This keeps the error type `Clone` and
    /// `PartialEq` (which `dyn Error` cannot be) and maintains a simple, stable API.
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Codec { kind } => Some(kind),
            _ => None,
        }
    }
}

impl From<CodecError> for TssError {
    fn from(kind: CodecError) -> Self {
        Self::Codec { kind }
    }
}

impl From<ConfigErrorKind> for TssError {
    fn from(kind: ConfigErrorKind) -> Self {
        Self::Config { kind }
    }
}
