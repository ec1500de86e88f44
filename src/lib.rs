//! # Trailstate
//!
//! Trailstate is a deterministic Trailing State Synchronization (TSS) engine written in
//! 100% safe Rust. It coordinates several copies of one authoritative world simulation,
//! each running at a different fixed frame delay, so that peers connected over an
//! unreliable network can act on local inputs immediately, retroactively incorporate
//! late-arriving authoritative inputs, and still converge to a single canonical state.
//!
//! The leading copy (delay 0) reflects the most recently predicted state, including
//! tentative commands. The trailing copy (largest delay) only ever executes
//! authoritative commands and is therefore the canonical state. When a late input
//! arrives for a frame a shallow copy has already passed, the coordinator rewinds that
//! copy from a deeper one and deterministically replays the scheduled events. When even
//! the trailing copy has passed the frame of an authoritative input, convergence can no
//! longer be guaranteed: the coordinator declares itself invalidated and must be
//! re-seeded from a snapshot.
//!
//! The world simulation itself is supplied by the user via the [`Simulation`] trait;
//! its generic parameters are bundled in a single [`Config`] trait implemented on a
//! marker type.

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

use std::fmt::Debug;

use serde::{de::DeserializeOwned, Serialize};

pub use builder::CoordinatorBuilder;
pub use codec::CodecError;
pub use command::Command;
pub use coordinator::TssCoordinator;
pub use error::{ConfigErrorKind, InvalidTimingReason, TssError};
pub use event_store::{CommandScheduled, EventStore};
pub use facade::{EntityFacade, SystemScope};
pub use simulation::Simulation;
pub use snapshot::Snapshot;

pub mod codec;
#[doc(hidden)]
pub mod command;
#[doc(hidden)]
pub mod error;
/// Internal deterministic hashing module based on FNV-1a.
///
/// Provides a process-stable hasher used for cross-peer state digests.
/// See the module documentation for usage details.
pub mod hash;
pub mod telemetry;
#[doc(hidden)]
pub mod builder;
#[doc(hidden)]
pub mod coordinator;
#[doc(hidden)]
pub mod event_store;
#[doc(hidden)]
pub mod facade;
#[doc(hidden)]
pub mod sim_array;
#[doc(hidden)]
pub mod simulation;
#[doc(hidden)]
pub mod snapshot;
#[cfg(test)]
pub(crate) mod test_support;

// #############
// # CONSTANTS #
// #############

/// The smallest frame number. Simulations start here and snapshots may never
/// reference anything older.
pub const FIRST_FRAME: Frame = Frame(0);

/// A frame is a single step of world execution.
///
/// Frames are the fundamental unit of time in trailing state synchronization. Each
/// frame represents one discrete step of the simulation. Frame numbers start at 0 and
/// increase monotonically; a coordinator's notion of "now" is its leading frame, and
/// every deeper slot lags it by that slot's fixed delay.
///
/// # Type Safety
///
/// `Frame` is a newtype wrapper around `u64` that provides:
/// - Clear semantic meaning (frames vs arbitrary integers)
/// - Saturating arithmetic helpers for delay subtraction
/// - Compile-time prevention of accidentally mixing frames with other integers
///
/// # Examples
///
/// ```
/// use trailstate::Frame;
///
/// let frame = Frame::new(5);
/// assert_eq!(frame + 1, Frame::new(6));
///
/// // Delay subtraction saturates at frame 0.
/// assert_eq!(frame.saturating_sub(10), Frame::new(0));
///
/// // Distances between frames are plain integers.
/// assert_eq!(Frame::new(9) - Frame::new(5), 4);
/// ```
#[derive(
    Debug,
    Copy,
    Clone,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Default,
    serde::Serialize,
    serde::Deserialize,
)]
pub struct Frame(u64);

impl Frame {
    /// Creates a new `Frame` from a `u64` value.
    #[inline]
    #[must_use]
    pub const fn new(frame: u64) -> Self {
        Frame(frame)
    }

    /// Returns the underlying `u64` value.
    #[inline]
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    /// Subtracts a delay from this frame, saturating at frame 0.
    ///
    /// A slot with delay `d` sits at `current_frame.saturating_sub(d)`: before the
    /// coordinator has advanced past the delay depth, the slot simply stays at the
    /// first frame.
    #[inline]
    #[must_use]
    pub const fn saturating_sub(self, delay: u64) -> Self {
        Frame(self.0.saturating_sub(delay))
    }

    /// Returns the frame immediately after this one.
    #[inline]
    #[must_use]
    pub const fn next(self) -> Self {
        Frame(self.0 + 1)
    }
}

impl std::fmt::Display for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::ops::Add<u64> for Frame {
    type Output = Frame;

    #[inline]
    fn add(self, rhs: u64) -> Self::Output {
        Frame(self.0 + rhs)
    }
}

impl std::ops::AddAssign<u64> for Frame {
    #[inline]
    fn add_assign(&mut self, rhs: u64) {
        self.0 += rhs;
    }
}

impl std::ops::Sub<Frame> for Frame {
    type Output = u64;

    /// Distance in frames. Saturates at zero rather than wrapping, so the distance
    /// from an earlier frame to a later one is 0.
    #[inline]
    fn sub(self, rhs: Frame) -> Self::Output {
        self.0.saturating_sub(rhs.0)
    }
}

impl From<u64> for Frame {
    #[inline]
    fn from(value: u64) -> Self {
        Frame(value)
    }
}

impl From<Frame> for u64 {
    #[inline]
    fn from(frame: Frame) -> Self {
        frame.0
    }
}

impl PartialEq<u64> for Frame {
    #[inline]
    fn eq(&self, other: &u64) -> bool {
        self.0 == *other
    }
}

impl PartialOrd<u64> for Frame {
    #[inline]
    fn partial_cmp(&self, other: &u64) -> Option<std::cmp::Ordering> {
        self.0.partial_cmp(other)
    }
}

/// Identifies the player a command originated from.
///
/// Together with [`CommandId`] this forms the identity of a scheduled command:
/// two commands with equal `(player, id)` pairs are considered the same command,
/// regardless of their payload or authority flag.
#[derive(
    Debug,
    Copy,
    Clone,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Default,
    serde::Serialize,
    serde::Deserialize,
)]
pub struct PlayerId(u16);

impl PlayerId {
    /// Creates a new `PlayerId` from a `u16` value.
    #[inline]
    #[must_use]
    pub const fn new(player: u16) -> Self {
        PlayerId(player)
    }

    /// Returns the underlying `u16` value.
    #[inline]
    #[must_use]
    pub const fn as_u16(self) -> u16 {
        self.0
    }
}

impl std::fmt::Display for PlayerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifies a command uniquely within one player's command stream.
#[derive(
    Debug,
    Copy,
    Clone,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Default,
    serde::Serialize,
    serde::Deserialize,
)]
pub struct CommandId(u64);

impl CommandId {
    /// Creates a new `CommandId` from a `u64` value.
    #[inline]
    #[must_use]
    pub const fn new(id: u64) -> Self {
        CommandId(id)
    }

    /// Returns the underlying `u64` value.
    #[inline]
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for CommandId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A dense integer handle identifying one entity in the simulated world.
///
/// Entities never hold references back into their world; systems and commands address
/// them through these handles. Handles are allocated by the coordinator from a counter
/// that is part of the snapshot, so two peers reconstructing the same snapshot assign
/// identical ids to identical subsequent insertions.
#[derive(
    Debug,
    Copy,
    Clone,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Default,
    serde::Serialize,
    serde::Deserialize,
)]
pub struct EntityId(u64);

impl EntityId {
    /// Creates a new `EntityId` from a `u64` value.
    #[inline]
    #[must_use]
    pub const fn new(id: u64) -> Self {
        EntityId(id)
    }

    /// Returns the underlying `u64` value.
    #[inline]
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for EntityId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// #############
// #   ENUMS   #
// #############

/// Why a coordinator declared itself invalidated.
///
/// Delivered with the invalidation notification so hosts can log the cause before
/// requesting a fresh snapshot from the authoritative source.
///
/// # Forward Compatibility
///
/// This enum is marked `#[non_exhaustive]` because new reasons may be added in future
/// versions. Always include a wildcard arm when matching.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum InvalidationReason {
    /// An authoritative command arrived for a frame the trailing simulation has
    /// already stepped past.
    LateAuthoritativeCommand {
        /// The frame the command targeted.
        frame: Frame,
    },
    /// An entity removal was scheduled for a frame the trailing simulation has
    /// already stepped past.
    LateAuthoritativeRemove {
        /// The frame the removal targeted.
        frame: Frame,
    },
    /// An entity insertion was scheduled for a frame the trailing simulation has
    /// already stepped past.
    LateAuthoritativeInsert {
        /// The frame the insertion targeted.
        frame: Frame,
    },
    /// A rewind was requested to a frame older than the trailing simulation.
    RewindPastTrailing {
        /// The frame the rewind targeted.
        requested: Frame,
        /// The trailing simulation's frame at the time of the request.
        trailing: Frame,
    },
    /// The host invalidated the coordinator explicitly.
    Explicit,
}

impl std::fmt::Display for InvalidationReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::LateAuthoritativeCommand { frame } => {
                write!(f, "authoritative command arrived too late for frame {frame}")
            },
            Self::LateAuthoritativeRemove { frame } => {
                write!(f, "entity removal arrived too late for frame {frame}")
            },
            Self::LateAuthoritativeInsert { frame } => {
                write!(f, "entity insertion arrived too late for frame {frame}")
            },
            Self::RewindPastTrailing { requested, trailing } => {
                write!(
                    f,
                    "rewind to frame {requested} is older than the trailing frame {trailing}"
                )
            },
            Self::Explicit => write!(f, "invalidated explicitly by the host"),
        }
    }
}

// #############
// #  TRAITS   #
// #############

/// Compile time parameterization for a coordinator.
///
/// This trait bundles the generic types needed by a [`TssCoordinator`]. Implement it
/// on a marker struct to configure your world types.
///
/// # Example
///
/// ```ignore
/// use trailstate::{Config, Simulation};
/// use serde::{Deserialize, Serialize};
///
/// // The payload your simulation interprets when applying a command.
/// #[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
/// enum GameCommand {
///     Move { dx: i32, dy: i32 },
///     Fire,
/// }
///
/// // The serialized form of one entity, used for scheduled insertions.
/// #[derive(Clone, Debug, Serialize, Deserialize)]
/// struct EntityBlueprint {
///     kind: u8,
///     x: i32,
///     y: i32,
/// }
///
/// struct GameConfig;
///
/// impl Config for GameConfig {
///     type Simulation = GameWorld; // your Simulation implementation
///     type CommandData = GameCommand;
///     type EntityData = EntityBlueprint;
/// }
/// ```
pub trait Config: 'static + Sized {
    /// The world simulation type driven by the coordinator.
    ///
    /// Serialization is part of the contract: the trailing simulation's serialized
    /// form is embedded whole in every snapshot. `Send` allows non-trailing slots to
    /// be advanced on worker threads during a fast-forward.
    type Simulation: Simulation<Self> + Serialize + DeserializeOwned + Send;

    /// The opaque payload carried by each [`Command`]. The engine never inspects it;
    /// equality of commands is defined by their `(player, id)` key alone.
    type CommandData: Clone + PartialEq + Debug + Serialize + DeserializeOwned + Send + Sync;

    /// The serialized form of one entity, carried by scheduled insertions.
    type EntityData: Clone + Debug + Serialize + DeserializeOwned + Send + Sync;
}

/// Observer for invalidation events.
///
/// When the coordinator can no longer guarantee convergence it sets its
/// waiting-for-synchronization flag and notifies every registered observer exactly
/// once, synchronously, on the thread that caused the invalidation, before the
/// triggering call returns. Handlers are expected to request a fresh snapshot from the
/// authoritative source and feed it to [`TssCoordinator::load_snapshot`].
pub trait InvalidationObserver: Send + Sync {
    /// Called when the coordinator transitions into the waiting state.
    fn on_invalidated(&self, reason: InvalidationReason);
}

/// An [`InvalidationObserver`] that records every delivered reason.
///
/// Useful in tests and diagnostics:
///
/// ```
/// use trailstate::CollectingInvalidationObserver;
///
/// let observer = CollectingInvalidationObserver::new();
/// assert!(observer.reasons().is_empty());
/// ```
#[derive(Default)]
pub struct CollectingInvalidationObserver {
    reasons: parking_lot::Mutex<Vec<InvalidationReason>>,
}

impl CollectingInvalidationObserver {
    /// Creates a new, empty observer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of every reason delivered so far, in delivery order.
    #[must_use]
    pub fn reasons(&self) -> Vec<InvalidationReason> {
        self.reasons.lock().clone()
    }
}

impl InvalidationObserver for CollectingInvalidationObserver {
    fn on_invalidated(&self, reason: InvalidationReason) {
        self.reasons.lock().push(reason);
    }
}

// #########
// # TESTS #
// #########
