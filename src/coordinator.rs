//! The TSS coordinator: the state machine that advances, rewinds and invalidates.

use std::sync::Arc;

use smallvec::SmallVec;

use crate::error::InvalidTimingReason;
use crate::event_store::{CommandScheduled, EventStore};
use crate::hash::DeterministicHasher;
use crate::sim_array::SimulationArray;
use crate::snapshot::{Snapshot, SnapshotRef};
use crate::telemetry::{ViolationKind, ViolationObserver, ViolationSeverity};
use crate::{
    codec, report_violation_to, Command, Config, EntityId, Frame, InvalidationObserver,
    InvalidationReason, Simulation, TssError,
};

/// Coordinates an array of staggered simulation copies into one converging world.
///
/// The coordinator owns every simulation instance and every pending event; external
/// callers hold neither. All mutating operations must be invoked from a single
/// driver (typically the game loop) and are not re-entrant.
///
/// # Lifecycle
///
/// A coordinator is built via [`CoordinatorBuilder`] and starts out waiting for
/// synchronization. [`initialize`] (or a snapshot fed to [`load_snapshot`], or the
/// builder's initial snapshot) populates the trailing simulation, mirrors it into
/// the shallower slots and clears the wait flag. From then on it accepts commands,
/// entity scheduling and frame advances until an invalidation sets the wait flag
/// again, at which point only a fresh snapshot can revive it.
///
/// # State machine
///
/// ```text
/// states: Ready, WaitingForSync
/// transitions:
///   Ready          --late authoritative event / rewind past trailing / invalidate()--> WaitingForSync
///   WaitingForSync --initialize() / load_snapshot()-->                                 Ready
/// in WaitingForSync:
///   push_command, schedule_remove, schedule_add, update, run_to_frame --> NotReady
/// ```
///
/// [`CoordinatorBuilder`]: crate::CoordinatorBuilder
/// [`initialize`]: TssCoordinator::initialize
/// [`load_snapshot`]: TssCoordinator::load_snapshot
pub struct TssCoordinator<T>
where
    T: Config,
{
    current_frame: Frame,
    waiting_for_synchronization: bool,
    sims: SimulationArray<T>,
    events: EventStore<T>,
    parallel_update: bool,
    /// Next entity id to hand out. Part of the snapshot, so peers reconstructing
    /// the same snapshot allocate identical ids for identical insertions.
    next_entity_id: u64,
    invalidation_observers: Vec<Arc<dyn InvalidationObserver>>,
    violation_observer: Option<Arc<dyn ViolationObserver>>,
}

impl<T: Config> TssCoordinator<T> {
    pub(crate) fn from_parts(
        delays: SmallVec<[u64; 4]>,
        parallel_update: bool,
        invalidation_observers: Vec<Arc<dyn InvalidationObserver>>,
        violation_observer: Option<Arc<dyn ViolationObserver>>,
    ) -> Self {
        Self {
            current_frame: Frame::new(0),
            waiting_for_synchronization: true,
            sims: SimulationArray::new(delays),
            events: EventStore::new(),
            parallel_update,
            next_entity_id: 0,
            invalidation_observers,
            violation_observer,
        }
    }

    // =========================================================================
    // Introspection
    // =========================================================================

    /// The coordinator's current (leading) frame.
    #[must_use]
    pub fn current_frame(&self) -> Frame {
        self.current_frame
    }

    /// The trailing simulation's frame: everything older than this is settled and
    /// can no longer be influenced.
    #[must_use]
    pub fn trailing_frame(&self) -> Frame {
        match self.sims.trailing() {
            Some(trailing) => trailing.current_frame(),
            None => self.current_frame.saturating_sub(self.sims.deepest_delay()),
        }
    }

    /// Whether the coordinator is waiting for a snapshot before it can continue.
    #[must_use]
    pub fn is_waiting_for_synchronization(&self) -> bool {
        self.waiting_for_synchronization
    }

    /// The full delay vector, leading 0 included.
    #[must_use]
    pub fn delays(&self) -> &[u64] {
        self.sims.delays()
    }

    /// The number of simulation slots.
    #[must_use]
    pub fn num_slots(&self) -> usize {
        self.sims.len()
    }

    /// The frame slot `index` currently sits at, if that slot is populated.
    #[must_use]
    pub fn slot_frame(&self, index: usize) -> Option<Frame> {
        self.sims.slot_frame(index)
    }

    /// The digest of the simulation in slot `index`, if populated.
    #[must_use]
    pub fn slot_digest(&self, index: usize) -> Option<u64> {
        use std::hash::Hasher;
        self.sims.slot(index).map(|sim| {
            let mut hasher = DeterministicHasher::new();
            sim.state_hash(&mut hasher);
            hasher.finish()
        })
    }

    /// The canonical digest: the trailing simulation's. Exchange this with peers at
    /// frame boundaries to detect silent divergence.
    #[must_use]
    pub fn trailing_digest(&self) -> Option<u64> {
        self.slot_digest(self.sims.trailing_index())
    }

    /// The leading simulation's digest, including tentative effects.
    #[must_use]
    pub fn leading_digest(&self) -> Option<u64> {
        self.slot_digest(0)
    }

    /// Read access to the leading simulation, for presentation and queries.
    /// `None` until the coordinator has been initialized.
    #[must_use]
    pub fn leading(&self) -> Option<&T::Simulation> {
        self.sims.slot(0)
    }

    /// Number of commands currently scheduled in the future timeline.
    #[must_use]
    pub fn pending_command_count(&self) -> usize {
        self.events.pending_command_count()
    }

    /// Number of entity removals currently scheduled in the future timeline.
    #[must_use]
    pub fn pending_remove_count(&self) -> usize {
        self.events.pending_remove_count()
    }

    /// Number of entity insertions currently scheduled in the future timeline.
    #[must_use]
    pub fn pending_add_count(&self) -> usize {
        self.events.pending_add_count()
    }

    /// The oldest frame any pending event is scheduled at, if any are. Never older
    /// than the trailing frame: older entries are pruned as the trailing simulation
    /// advances.
    #[must_use]
    pub fn oldest_pending_frame(&self) -> Option<Frame> {
        self.events.oldest_frame()
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Seeds the coordinator with an authoritative world.
    ///
    /// The world becomes the trailing simulation and is mirrored into every
    /// shallower slot; the current frame becomes the world's frame plus the deepest
    /// delay, and the shallower slots are advanced to their positions by replaying
    /// whatever events are already scheduled. Clears the wait flag.
    pub fn initialize(&mut self, trailing: T::Simulation) {
        let trailing_frame = trailing.current_frame();
        self.sims.install_trailing(trailing);
        let trailing_index = self.sims.trailing_index();
        self.sims.mirror(trailing_index, trailing_index - 1);
        self.events.prune(trailing_frame);
        self.waiting_for_synchronization = false;
        let target = trailing_frame + self.sims.deepest_delay();
        tracing::debug!(
            trailing_frame = trailing_frame.as_u64(),
            current_frame = target.as_u64(),
            "initialized from authoritative world"
        );
        self.fast_forward(target);
    }

    /// Seeds the deterministic entity id allocator.
    ///
    /// Call this together with [`initialize`] when the initial world already
    /// contains entities, so scheduled insertions never reuse a live id. Snapshots
    /// carry the allocator state, so [`load_snapshot`] needs no such call.
    ///
    /// [`initialize`]: TssCoordinator::initialize
    /// [`load_snapshot`]: TssCoordinator::load_snapshot
    pub fn set_next_entity_id(&mut self, next: EntityId) {
        self.next_entity_id = next.as_u64();
    }

    /// Allocates the next entity id. Allocation is part of the synchronized state:
    /// two peers that loaded the same snapshot and schedule the same insertions
    /// allocate the same ids.
    pub fn allocate_entity_id(&mut self) -> EntityId {
        let id = EntityId::new(self.next_entity_id);
        self.next_entity_id += 1;
        id
    }

    /// Declares the coordinator unable to converge and notifies observers.
    ///
    /// Idempotent while the wait flag is already set. All scheduled work is
    /// retained; only a fresh snapshot clears the flag.
    pub fn invalidate(&mut self) {
        self.invalidate_with(InvalidationReason::Explicit);
    }

    fn invalidate_with(&mut self, reason: InvalidationReason) {
        if self.waiting_for_synchronization {
            return;
        }
        self.waiting_for_synchronization = true;
        tracing::warn!(%reason, "coordinator invalidated, waiting for synchronization");
        for observer in &self.invalidation_observers {
            observer.on_invalidated(reason);
        }
    }

    /// Registers an additional invalidation observer.
    pub fn add_invalidation_observer(&mut self, observer: Arc<dyn InvalidationObserver>) {
        self.invalidation_observers.push(observer);
    }

    // =========================================================================
    // Scheduling
    // =========================================================================

    /// Schedules `command` for execution at `frame`.
    ///
    /// A frame in the shallow past (older than the current frame but not older than
    /// the trailing frame) triggers an immediate rollback: the affected slots are
    /// rewound to a deeper copy and re-advanced with the command incorporated.
    ///
    /// A frame behind even the trailing simulation can no longer be honored:
    /// - a *tentative* command is dropped silently (it was speculative and no
    ///   longer matters);
    /// - an *authoritative* command invalidates the coordinator, because the
    ///   canonical timeline has already diverged from the trusted source.
    ///
    /// # Errors
    /// - [`TssError::NotReady`] while waiting for synchronization.
    /// - [`TssError::InvalidTiming`] for a late authoritative command (the
    ///   coordinator also invalidates itself).
    pub fn push_command(&mut self, command: Command<T>, frame: Frame) -> Result<(), TssError> {
        if self.waiting_for_synchronization {
            return Err(TssError::NotReady);
        }
        let trailing = self.trailing_frame();
        if frame < trailing {
            if command.authoritative {
                self.invalidate_with(InvalidationReason::LateAuthoritativeCommand { frame });
                return Err(TssError::InvalidTiming {
                    frame,
                    reason: InvalidTimingReason::BeforeTrailing { trailing },
                });
            }
            tracing::trace!(
                frame = frame.as_u64(),
                trailing = trailing.as_u64(),
                "dropping late tentative command"
            );
            return Ok(());
        }

        let outcome = self.events.schedule_command(command, frame, trailing)?;
        let rewind_to = match outcome {
            CommandScheduled::Inserted => Some(frame),
            CommandScheduled::Promoted { previous_frame } => Some(frame.min(previous_frame)),
            CommandScheduled::Ignored => None,
        };
        if let Some(target) = rewind_to {
            self.rollback_if_past(target);
        }
        Ok(())
    }

    /// Schedules the removal of `entity` at `frame`.
    ///
    /// Removals come from the authoritative channel: scheduling one behind the
    /// trailing frame invalidates the coordinator, like a late authoritative
    /// command.
    ///
    /// # Errors
    /// - [`TssError::NotReady`] while waiting for synchronization.
    /// - [`TssError::InvalidTiming`] for a frame behind the trailing simulation.
    /// - [`TssError::Conflict`] if the entity is scheduled for insertion at the
    ///   same frame.
    pub fn schedule_remove(&mut self, entity: EntityId, frame: Frame) -> Result<(), TssError> {
        if self.waiting_for_synchronization {
            return Err(TssError::NotReady);
        }
        let trailing = self.trailing_frame();
        if frame < trailing {
            self.invalidate_with(InvalidationReason::LateAuthoritativeRemove { frame });
            return Err(TssError::InvalidTiming {
                frame,
                reason: InvalidTimingReason::BeforeTrailing { trailing },
            });
        }
        self.events.schedule_remove(entity, frame, trailing)?;
        self.rollback_if_past(frame);
        Ok(())
    }

    /// Schedules the insertion of an entity (described by `data`) at `frame`,
    /// under the id `entity`. Ids come from [`allocate_entity_id`].
    ///
    /// # Errors
    /// Mirror image of [`schedule_remove`]: `NotReady`, `InvalidTiming` (with
    /// invalidation) for late frames, `Conflict` when the entity is scheduled for
    /// removal at the same frame.
    ///
    /// [`allocate_entity_id`]: TssCoordinator::allocate_entity_id
    /// [`schedule_remove`]: TssCoordinator::schedule_remove
    pub fn schedule_add(
        &mut self,
        entity: EntityId,
        data: T::EntityData,
        frame: Frame,
    ) -> Result<(), TssError> {
        if self.waiting_for_synchronization {
            return Err(TssError::NotReady);
        }
        let trailing = self.trailing_frame();
        if frame < trailing {
            self.invalidate_with(InvalidationReason::LateAuthoritativeInsert { frame });
            return Err(TssError::InvalidTiming {
                frame,
                reason: InvalidTimingReason::BeforeTrailing { trailing },
            });
        }
        self.events.schedule_add(entity, data, frame, trailing)?;
        self.rollback_if_past(frame);
        Ok(())
    }

    // =========================================================================
    // Frame advancement
    // =========================================================================

    /// Advances the world by one frame.
    ///
    /// # Errors
    /// [`TssError::NotReady`] while waiting for synchronization.
    pub fn update(&mut self) -> Result<(), TssError> {
        if self.waiting_for_synchronization {
            return Err(TssError::NotReady);
        }
        let target = self.current_frame.next();
        self.fast_forward(target);
        Ok(())
    }

    /// Moves the world to an arbitrary frame, forward or backward.
    ///
    /// Backward targets rewind the shallow slots from a deeper copy and replay
    /// scheduled events up to the target. A target behind even the trailing
    /// simulation cannot be reached and invalidates the coordinator (no error is
    /// surfaced for that; the invalidation notification is the signal).
    ///
    /// # Errors
    /// [`TssError::NotReady`] while waiting for synchronization.
    pub fn run_to_frame(&mut self, frame: Frame) -> Result<(), TssError> {
        if self.waiting_for_synchronization {
            return Err(TssError::NotReady);
        }
        if frame >= self.current_frame {
            self.fast_forward(frame);
        } else {
            self.rewind(frame);
            if self.waiting_for_synchronization {
                self.current_frame = frame;
            } else {
                self.fast_forward(frame);
            }
        }
        Ok(())
    }

    /// Rewinds to `target` and replays forward again when `target` lies in the
    /// shallow past; does nothing when `target` has not been reached yet.
    fn rollback_if_past(&mut self, target: Frame) {
        if target >= self.current_frame {
            return;
        }
        tracing::debug!(
            target = target.as_u64(),
            current = self.current_frame.as_u64(),
            "retroactive event, rolling back"
        );
        self.rewind(target);
        if !self.waiting_for_synchronization {
            self.fast_forward(self.current_frame);
        }
    }

    /// Jumps the shallow slots back onto the first (shallowest) copy that has not
    /// yet passed `frame`. Invalidates when even the trailing copy has.
    fn rewind(&mut self, frame: Frame) {
        for index in 0..self.sims.len() {
            let Some(slot_frame) = self.sims.slot_frame(index) else {
                continue;
            };
            if slot_frame <= frame {
                if index > 0 {
                    tracing::trace!(
                        slot = index,
                        slot_frame = slot_frame.as_u64(),
                        target = frame.as_u64(),
                        "rewinding from deeper slot"
                    );
                    self.sims.mirror(index, index - 1);
                }
                return;
            }
        }
        self.invalidate_with(InvalidationReason::RewindPastTrailing {
            requested: frame,
            trailing: self.trailing_frame(),
        });
    }

    /// Advances every slot until it sits `delay` frames behind `target`, replaying
    /// scheduled events along the way, then prunes the event store.
    ///
    /// The trailing slot runs first, on the calling thread, because its
    /// tentative-command pruning feeds back into the whole pass: whenever the
    /// trailing simulation discards tentative commands, it is re-mirrored into the
    /// shallower slots before those advance, discarding speculative work that the
    /// canonical timeline never performed. The shallower slots then advance
    /// independently, in parallel when configured, and are joined before this
    /// method returns.
    fn fast_forward(&mut self, target: Frame) {
        let trailing_index = self.sims.trailing_index();
        let deepest = self.sims.deepest_delay();

        let mut pruned_tentative = false;
        loop {
            let Some(frame) = self.sims.slot_frame(trailing_index) else {
                report_violation_to!(
                    self.violation_observer,
                    ViolationSeverity::Critical,
                    ViolationKind::StateManagement,
                    "trailing slot unpopulated during fast-forward to {}",
                    target
                );
                return;
            };
            if frame.as_u64() + deepest >= target.as_u64() {
                break;
            }
            if let Some(trailing) = self.sims.slot_mut(trailing_index) {
                apply_frame_events(&self.events, trailing, frame);
                if trailing.skip_tentative_commands() {
                    pruned_tentative = true;
                }
                trailing.step();
            }
        }

        if pruned_tentative {
            // The canonical state moved without the tentative commands; every
            // shallower copy derived before this point is speculative garbage.
            tracing::trace!("trailing pruned tentative commands, re-mirroring forward");
            self.sims.mirror(trailing_index, trailing_index - 1);
        }

        if self.parallel_update {
            self.advance_shallow_parallel(target);
        } else {
            self.advance_shallow_serial(target);
        }

        self.current_frame = target;
        let trailing_frame = self.trailing_frame();
        self.events.prune(trailing_frame);
        self.check_frame_alignment(target);
    }

    fn advance_shallow_serial(&mut self, target: Frame) {
        let trailing_index = self.sims.trailing_index();
        for index in 0..trailing_index {
            let delay = self.sims.delay(index);
            loop {
                let Some(frame) = self.sims.slot_frame(index) else {
                    report_violation_to!(
                        self.violation_observer,
                        ViolationSeverity::Critical,
                        ViolationKind::StateManagement,
                        "slot {} unpopulated during fast-forward to {}",
                        index,
                        target
                    );
                    break;
                };
                if frame.as_u64() + delay >= target.as_u64() {
                    break;
                }
                if let Some(sim) = self.sims.slot_mut(index) {
                    apply_frame_events(&self.events, sim, frame);
                    sim.step();
                }
            }
        }
    }

    /// One worker task per shallow slot; each exclusively owns its simulation for
    /// the duration and reads the shared event store. The scope join is the
    /// completion barrier: no work outlives this call.
    fn advance_shallow_parallel(&mut self, target: Frame) {
        let events = &self.events;
        let trailing_index = self.sims.trailing_index();
        let delays: SmallVec<[u64; 4]> = SmallVec::from_slice(&self.sims.delays()[..trailing_index]);
        let shallow = self.sims.shallow_slots_mut();
        rayon::scope(|scope| {
            for (slot, delay) in shallow.iter_mut().zip(delays.iter().copied()) {
                scope.spawn(move |_| {
                    let Some(sim) = slot.as_mut() else {
                        return;
                    };
                    loop {
                        let frame = sim.current_frame();
                        if frame.as_u64() + delay >= target.as_u64() {
                            break;
                        }
                        apply_frame_events(events, sim, frame);
                        sim.step();
                    }
                });
            }
        });
    }

    /// After a fast-forward, no slot may sit behind the current frame minus its
    /// delay (clamped at 0): falling short means the slot silently skipped work and
    /// its digest can no longer be trusted. Sitting *ahead* is legal: after a
    /// backward jump, deeper slots keep their frame and simply wait for the current
    /// frame to catch up, since a slot can never step backward.
    fn check_frame_alignment(&self, current: Frame) {
        for index in 0..self.sims.len() {
            let expected = current.saturating_sub(self.sims.delay(index));
            if let Some(actual) = self.sims.slot_frame(index) {
                if actual < expected {
                    report_violation_to!(
                        self.violation_observer,
                        ViolationSeverity::Error,
                        ViolationKind::FrameSync,
                        "slot {} sits at frame {} but should have reached {}",
                        index,
                        actual,
                        expected
                    );
                }
            }
        }
    }

    // =========================================================================
    // Snapshots
    // =========================================================================

    /// Serializes the coordinator's synchronized state: the current frame, the
    /// entity id allocator, the whole trailing simulation and every pending event.
    ///
    /// Blocks for the duration of the trailing simulation's own serialization; do
    /// not call concurrently with a frame advance (the API is single-driver
    /// anyway).
    ///
    /// # Errors
    /// - [`TssError::NotReady`] if the coordinator has never been seeded.
    /// - [`TssError::Codec`] if the trailing simulation fails to serialize.
    pub fn save_snapshot(&self) -> Result<Vec<u8>, TssError> {
        let Some(trailing) = self.sims.trailing() else {
            return Err(TssError::NotReady);
        };
        let payload = SnapshotRef::<'_, T> {
            current_frame: self.current_frame,
            next_entity_id: self.next_entity_id,
            trailing,
            events: &self.events,
        };
        Ok(codec::encode(&payload)?)
    }

    /// Restores the coordinator from a serialized snapshot and clears the wait
    /// flag.
    ///
    /// The snapshot's trailing simulation replaces the trailing slot and is
    /// mirrored forward; the snapshot's pending events are merged with the locally
    /// scheduled ones (local future entries survive unless an authoritative
    /// incoming version of the same command supersedes them); the shallower slots
    /// are then re-advanced to their delays.
    ///
    /// # Errors
    /// [`TssError::Codec`] if the payload is malformed. The coordinator's state is
    /// untouched in that case: if it was waiting for synchronization it still is.
    pub fn load_snapshot(&mut self, bytes: &[u8]) -> Result<(), TssError> {
        let snapshot: Snapshot<T> = codec::decode(bytes)?;
        self.apply_snapshot(snapshot);
        Ok(())
    }

    /// Applies an already-decoded snapshot. See [`load_snapshot`].
    ///
    /// [`load_snapshot`]: TssCoordinator::load_snapshot
    pub fn apply_snapshot(&mut self, snapshot: Snapshot<T>) {
        let Snapshot {
            current_frame,
            next_entity_id,
            trailing,
            events,
        } = snapshot;
        let trailing_frame = trailing.current_frame();

        let target = trailing_frame + self.sims.deepest_delay();
        if current_frame != target {
            // The sender ran a different delay configuration; its notion of "now"
            // does not transfer. The trailing state does.
            report_violation_to!(
                self.violation_observer,
                ViolationSeverity::Warning,
                ViolationKind::StateManagement,
                "snapshot current frame {} does not match trailing {} plus deepest delay, using {}",
                current_frame,
                trailing_frame,
                target
            );
        }

        self.sims.install_trailing(trailing);
        let trailing_index = self.sims.trailing_index();
        self.sims.mirror(trailing_index, trailing_index - 1);
        self.events.prune(trailing_frame);
        self.events.merge_from(events, trailing_frame);
        self.next_entity_id = next_entity_id;
        self.waiting_for_synchronization = false;
        tracing::debug!(
            trailing_frame = trailing_frame.as_u64(),
            current_frame = target.as_u64(),
            "restored from snapshot"
        );
        self.fast_forward(target);
    }

    // =========================================================================
    // Internal access for the entity facade
    // =========================================================================

    pub(crate) fn trailing_slot(&self) -> Option<&T::Simulation> {
        self.sims.trailing()
    }

    pub(crate) fn for_each_slot(&mut self, f: &mut dyn FnMut(&mut T::Simulation)) {
        for index in 0..self.sims.len() {
            if let Some(sim) = self.sims.slot_mut(index) {
                f(sim);
            }
        }
    }

    pub(crate) fn leading_mut(&mut self) -> Option<&mut T::Simulation> {
        self.sims.slot_mut(0)
    }
}

impl<T: Config> std::fmt::Debug for TssCoordinator<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TssCoordinator")
            .field("current_frame", &self.current_frame)
            .field("trailing_frame", &self.trailing_frame())
            .field("waiting_for_synchronization", &self.waiting_for_synchronization)
            .field("delays", &self.sims.delays())
            .field("events", &self.events)
            .finish_non_exhaustive()
    }
}

/// Feeds every event scheduled for `frame` into a simulation that currently sits at
/// `frame` and is about to step through it. Lookups are non-destructive: every slot
/// replays the same events.
fn apply_frame_events<T: Config>(events: &EventStore<T>, sim: &mut T::Simulation, frame: Frame) {
    for (entity, data) in events.adds_for(frame) {
        sim.insert_entity(*entity, data);
    }
    for entity in events.removes_for(frame) {
        sim.remove_entity(entity);
    }
    for command in events.commands_for(frame) {
        sim.push_command(command.clone());
    }
}

// #########
// # TESTS #
// #########

#[cfg(test)]
#[allow(clippy::panic, clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::test_support::{CounterConfig, CounterWorld};
    use crate::{CollectingInvalidationObserver, CommandId, CoordinatorBuilder, PlayerId};

    fn coordinator(depths: &[u64]) -> TssCoordinator<CounterConfig> {
        let mut coordinator = CoordinatorBuilder::<CounterConfig>::new()
            .with_delays(depths.iter().copied())
            .build()
            .unwrap();
        coordinator.initialize(CounterWorld::default());
        coordinator
    }

    fn tentative(id: u64, data: i64) -> Command<CounterConfig> {
        Command::tentative(PlayerId::new(1), CommandId::new(id), data)
    }

    fn authoritative(id: u64, data: i64) -> Command<CounterConfig> {
        Command::authoritative(PlayerId::new(1), CommandId::new(id), data)
    }

    // ==========================================
    // Lifecycle Tests
    // ==========================================

    #[test]
    fn starts_waiting_for_synchronization() {
        let coordinator = CoordinatorBuilder::<CounterConfig>::new()
            .with_delays([3, 10])
            .build()
            .unwrap();
        assert!(coordinator.is_waiting_for_synchronization());
    }

    #[test]
    fn initialize_clears_wait_flag_and_positions_slots() {
        let coordinator = coordinator(&[3, 10]);
        assert!(!coordinator.is_waiting_for_synchronization());
        assert_eq!(coordinator.current_frame(), Frame::new(10));
        assert_eq!(coordinator.slot_frame(0), Some(Frame::new(10)));
        assert_eq!(coordinator.slot_frame(1), Some(Frame::new(7)));
        assert_eq!(coordinator.slot_frame(2), Some(Frame::new(0)));
    }

    #[test]
    fn operations_fail_while_waiting() {
        let mut coordinator = CoordinatorBuilder::<CounterConfig>::new()
            .with_delays([5])
            .build()
            .unwrap();
        assert_eq!(coordinator.update(), Err(TssError::NotReady));
        assert_eq!(
            coordinator.run_to_frame(Frame::new(3)),
            Err(TssError::NotReady)
        );
        assert_eq!(
            coordinator.push_command(tentative(1, 1), Frame::new(0)),
            Err(TssError::NotReady)
        );
        assert_eq!(
            coordinator.schedule_remove(EntityId::new(1), Frame::new(0)),
            Err(TssError::NotReady)
        );
    }

    // ==========================================
    // Frame Advancement Tests
    // ==========================================

    #[test]
    fn update_advances_every_slot_in_lockstep() {
        let mut coordinator = coordinator(&[3, 10]);
        for _ in 0..5 {
            coordinator.update().unwrap();
        }
        assert_eq!(coordinator.current_frame(), Frame::new(15));
        assert_eq!(coordinator.slot_frame(0), Some(Frame::new(15)));
        assert_eq!(coordinator.slot_frame(1), Some(Frame::new(12)));
        assert_eq!(coordinator.slot_frame(2), Some(Frame::new(5)));
    }

    #[test]
    fn slots_hold_at_zero_until_past_their_delay() {
        let mut coordinator = coordinator(&[2, 4]);
        // fresh world: current = 4, trailing still at 0
        assert_eq!(coordinator.slot_frame(2), Some(Frame::new(0)));
        coordinator.update().unwrap();
        assert_eq!(coordinator.slot_frame(2), Some(Frame::new(1)));
    }

    #[test]
    fn run_to_frame_forward_is_a_bulk_update() {
        let mut one = coordinator(&[2, 6]);
        let mut other = coordinator(&[2, 6]);
        for _ in 0..12 {
            one.update().unwrap();
        }
        other.run_to_frame(Frame::new(18)).unwrap();
        assert_eq!(one.current_frame(), other.current_frame());
        assert_eq!(one.trailing_digest(), other.trailing_digest());
        assert_eq!(one.leading_digest(), other.leading_digest());
    }

    #[test]
    fn update_prunes_settled_events() {
        let mut coordinator = coordinator(&[3]);
        coordinator
            .push_command(authoritative(1, 5), Frame::new(11))
            .unwrap();
        assert_eq!(coordinator.pending_command_count(), 1);
        // the command is pruned once the trailing slot has stepped through frame 11,
        // i.e. once the current frame goes beyond 14
        for _ in 0..12 {
            coordinator.update().unwrap();
        }
        assert_eq!(coordinator.pending_command_count(), 0);
    }

    // ==========================================
    // Command Scheduling & Rollback Tests
    // ==========================================

    #[test]
    fn future_command_reaches_the_canonical_state() {
        let mut with_command = coordinator(&[4]);
        let mut without = coordinator(&[4]);
        with_command
            .push_command(authoritative(1, 7), Frame::new(12))
            .unwrap();
        for _ in 0..20 {
            with_command.update().unwrap();
            without.update().unwrap();
        }
        assert_ne!(with_command.trailing_digest(), without.trailing_digest());
    }

    #[test]
    fn past_command_rolls_back_and_converges() {
        let mut late = coordinator(&[2, 8]);
        let mut early = coordinator(&[2, 8]);

        // early learns about the command before passing the frame
        early
            .push_command(authoritative(1, 7), Frame::new(10))
            .unwrap();
        for _ in 0..6 {
            early.update().unwrap();
        }

        // late passes the frame first, then hears about the command
        for _ in 0..6 {
            late.update().unwrap();
        }
        late.push_command(authoritative(1, 7), Frame::new(10))
            .unwrap();

        assert_eq!(late.current_frame(), early.current_frame());
        assert_eq!(late.leading_digest(), early.leading_digest());
        assert_eq!(late.trailing_digest(), early.trailing_digest());
    }

    #[test]
    fn late_tentative_command_is_dropped_silently() {
        let observer = Arc::new(CollectingInvalidationObserver::new());
        let mut coordinator = CoordinatorBuilder::<CounterConfig>::new()
            .with_delays([2])
            .with_invalidation_observer(observer.clone())
            .build()
            .unwrap();
        coordinator.initialize(CounterWorld::default());
        for _ in 0..10 {
            coordinator.update().unwrap();
        }
        // trailing sits at 10; frame 3 is settled
        let result = coordinator.push_command(tentative(9, 1), Frame::new(3));
        assert_eq!(result, Ok(()));
        assert!(observer.reasons().is_empty());
        assert_eq!(coordinator.pending_command_count(), 0);
    }

    #[test]
    fn late_authoritative_command_invalidates() {
        let observer = Arc::new(CollectingInvalidationObserver::new());
        let mut coordinator = CoordinatorBuilder::<CounterConfig>::new()
            .with_delays([2])
            .with_invalidation_observer(observer.clone())
            .build()
            .unwrap();
        coordinator.initialize(CounterWorld::default());
        for _ in 0..10 {
            coordinator.update().unwrap();
        }
        let result = coordinator.push_command(authoritative(9, 1), Frame::new(3));
        assert!(matches!(result, Err(TssError::InvalidTiming { .. })));
        assert!(coordinator.is_waiting_for_synchronization());
        assert_eq!(
            observer.reasons(),
            vec![InvalidationReason::LateAuthoritativeCommand {
                frame: Frame::new(3)
            }]
        );
    }

    #[test]
    fn invalidate_is_idempotent() {
        let observer = Arc::new(CollectingInvalidationObserver::new());
        let mut coordinator = CoordinatorBuilder::<CounterConfig>::new()
            .with_delays([2])
            .with_invalidation_observer(observer.clone())
            .build()
            .unwrap();
        coordinator.initialize(CounterWorld::default());
        coordinator.invalidate();
        coordinator.invalidate();
        assert_eq!(observer.reasons().len(), 1);
    }

    // ==========================================
    // Rewind Tests
    // ==========================================

    #[test]
    fn rewind_below_trailing_invalidates_without_error() {
        let observer = Arc::new(CollectingInvalidationObserver::new());
        let mut coordinator = CoordinatorBuilder::<CounterConfig>::new()
            .with_delays([2])
            .with_invalidation_observer(observer.clone())
            .build()
            .unwrap();
        coordinator.initialize(CounterWorld::default());
        for _ in 0..10 {
            coordinator.update().unwrap();
        }
        // trailing sits at 10; frame 3 is out of reach
        let result = coordinator.run_to_frame(Frame::new(3));
        assert_eq!(result, Ok(()));
        assert!(coordinator.is_waiting_for_synchronization());
        assert_eq!(
            observer.reasons(),
            vec![InvalidationReason::RewindPastTrailing {
                requested: Frame::new(3),
                trailing: Frame::new(10),
            }]
        );
    }

    #[test]
    fn run_to_frame_backward_within_window_converges() {
        let mut coordinator = coordinator(&[3, 10]);
        for _ in 0..10 {
            coordinator.update().unwrap();
        }
        let digest_at_20 = coordinator.trailing_digest();
        coordinator.run_to_frame(Frame::new(14)).unwrap();
        assert_eq!(coordinator.current_frame(), Frame::new(14));
        coordinator.run_to_frame(Frame::new(20)).unwrap();
        assert_eq!(coordinator.trailing_digest(), digest_at_20);
    }

    // ==========================================
    // Tentative Pruning Tests
    // ==========================================

    #[test]
    fn trailing_prunes_tentative_and_remirrors() {
        let mut with_tentative = coordinator(&[3]);
        let mut without = coordinator(&[3]);

        with_tentative
            .push_command(tentative(7, 50), Frame::new(4))
            .unwrap();

        for _ in 0..10 {
            with_tentative.update().unwrap();
            without.update().unwrap();
        }

        // the tentative command was never confirmed, so the canonical timeline
        // never executed it and both runs converge
        assert_eq!(with_tentative.trailing_digest(), without.trailing_digest());
        assert_eq!(with_tentative.leading_digest(), without.leading_digest());
    }

    #[test]
    fn confirmed_command_survives_trailing_pruning() {
        let mut promoted = coordinator(&[3]);
        let mut authoritative_only = coordinator(&[3]);

        promoted.push_command(tentative(7, 50), Frame::new(4)).unwrap();
        promoted
            .push_command(authoritative(7, 50), Frame::new(4))
            .unwrap();
        authoritative_only
            .push_command(authoritative(7, 50), Frame::new(4))
            .unwrap();

        for _ in 0..10 {
            promoted.update().unwrap();
            authoritative_only.update().unwrap();
        }

        assert_eq!(
            promoted.trailing_digest(),
            authoritative_only.trailing_digest()
        );
    }

    // ==========================================
    // Entity Scheduling Tests
    // ==========================================

    #[test]
    fn scheduled_insert_and_remove_apply_at_their_frames() {
        let mut coordinator = coordinator(&[2]);
        let entity = coordinator.allocate_entity_id();
        coordinator.schedule_add(entity, 10, Frame::new(5)).unwrap();
        coordinator.schedule_remove(entity, Frame::new(8)).unwrap();

        coordinator.run_to_frame(Frame::new(6)).unwrap();
        assert!(coordinator.leading().unwrap().has_entity(entity));

        coordinator.run_to_frame(Frame::new(12)).unwrap();
        assert!(!coordinator.leading().unwrap().has_entity(entity));
    }

    #[test]
    fn conflicting_insert_and_remove_surface_conflict() {
        let mut coordinator = coordinator(&[5]);
        let entity = coordinator.allocate_entity_id();
        coordinator.schedule_add(entity, 1, Frame::new(10)).unwrap();
        let result = coordinator.schedule_remove(entity, Frame::new(10));
        assert_eq!(
            result,
            Err(TssError::Conflict {
                entity,
                frame: Frame::new(10)
            })
        );
        // first call's effect retained, coordinator still live
        assert!(!coordinator.is_waiting_for_synchronization());
        assert_eq!(coordinator.pending_add_count(), 1);
    }

    #[test]
    fn entity_ids_allocate_sequentially() {
        let mut coordinator = coordinator(&[2]);
        assert_eq!(coordinator.allocate_entity_id(), EntityId::new(0));
        assert_eq!(coordinator.allocate_entity_id(), EntityId::new(1));
        coordinator.set_next_entity_id(EntityId::new(100));
        assert_eq!(coordinator.allocate_entity_id(), EntityId::new(100));
    }

    // ==========================================
    // Parallel Equivalence Tests
    // ==========================================

    #[test]
    fn parallel_and_serial_fast_forward_agree() {
        let mut serial = CoordinatorBuilder::<CounterConfig>::new()
            .with_delays([2, 5, 9])
            .build()
            .unwrap();
        let mut parallel = CoordinatorBuilder::<CounterConfig>::new()
            .with_delays([2, 5, 9])
            .with_parallel_update(true)
            .build()
            .unwrap();
        serial.initialize(CounterWorld::default());
        parallel.initialize(CounterWorld::default());

        for step in 0..30u64 {
            serial
                .push_command(authoritative(step, step as i64), Frame::new(step + 5))
                .unwrap();
            parallel
                .push_command(authoritative(step, step as i64), Frame::new(step + 5))
                .unwrap();
            serial.update().unwrap();
            parallel.update().unwrap();
            assert_eq!(serial.trailing_digest(), parallel.trailing_digest());
            assert_eq!(serial.leading_digest(), parallel.leading_digest());
        }
    }
}
