//! The snapshot payload: everything a peer needs to reconstruct a coordinator.
//!
//! A snapshot is whole-state: the current frame, the entity id allocator, the
//! trailing simulation's complete serialized form and all three pending-event maps.
//! There is no diffing; resynchronization always transfers the full trailing state.
//!
//! The wire layout is fixed little-endian (see [`codec`](crate::codec)): a `u64`
//! current frame and allocator cursor, the trailing simulation (length determined by
//! its own serde layout), then each pending-event map as a length-prefixed sequence
//! of frame-keyed, length-prefixed lists.

use crate::event_store::EventStore;
use crate::{Config, Frame};

/// An owned, decoded snapshot.
///
/// Produced by decoding the bytes of [`TssCoordinator::save_snapshot`] and consumed
/// by [`TssCoordinator::apply_snapshot`] / [`TssCoordinator::load_snapshot`].
///
/// [`TssCoordinator::save_snapshot`]: crate::TssCoordinator::save_snapshot
/// [`TssCoordinator::apply_snapshot`]: crate::TssCoordinator::apply_snapshot
/// [`TssCoordinator::load_snapshot`]: crate::TssCoordinator::load_snapshot
#[derive(serde::Serialize, serde::Deserialize)]
#[serde(bound = "")]
pub struct Snapshot<T>
where
    T: Config,
{
    /// The sender's current (leading) frame.
    pub current_frame: Frame,
    /// The sender's next unallocated entity id.
    pub next_entity_id: u64,
    /// The complete trailing simulation.
    pub trailing: T::Simulation,
    /// Every event pending in the sender's future timeline.
    pub events: EventStore<T>,
}

/// Borrowing mirror of [`Snapshot`] used on the encode side, so serializing never
/// needs to clone the trailing simulation. Field order must match [`Snapshot`]
/// exactly; the codec identifies fields by position.
#[derive(serde::Serialize)]
#[serde(bound = "")]
pub(crate) struct SnapshotRef<'a, T>
where
    T: Config,
{
    pub current_frame: Frame,
    pub next_entity_id: u64,
    pub trailing: &'a T::Simulation,
    pub events: &'a EventStore<T>,
}

// #########
// # TESTS #
// #########
