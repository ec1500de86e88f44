//! The contract every authoritative world simulation must satisfy.

use crate::hash::DeterministicHasher;
use crate::{Command, Config, EntityId, Frame};

/// A value-typed, independently steppable world replica.
///
/// The coordinator owns several instances of one `Simulation` type and keeps them at
/// staggered frames. Everything the engine does - mirroring, rewinding, trailing
/// pruning, snapshotting - leans on the guarantees below, so read them as a contract
/// rather than as documentation of the engine's behavior.
///
/// # Determinism obligation (hard contract)
///
/// For any two simulations `a` and `b` with equal digests, any identical sequence of
/// [`push_command`] / [`step`] calls on both must preserve digest equality.
///
/// Violations cause silent divergence: the coordinator cannot detect them, because
/// every copy it holds is derived from the same lineage. Comparing digests with
/// another peer at frame boundaries is the diagnostic path.
///
/// Common sources of non-determinism to avoid inside a simulation:
/// - **Floating-point**: use fixed-point or integers for anything state-affecting
/// - **HashMap iteration**: use `BTreeMap` or sort keys before iterating
/// - **System time**: use the frame counter, not the wall clock
/// - **Process-wide counters**: allocate ids from per-simulation state
/// - **External I/O**: only consume the commands pushed by the coordinator
///
/// # Copy semantics
///
/// [`copy_into`] and [`new_instance`] replace a `clone`-style convention with two
/// explicit operations so implementations can reuse allocations: the coordinator
/// copies the trailing state into up to `N - 1` shallower slots per mirror, and a
/// fresh allocation per copy would dominate the cost of small worlds.
///
/// # Serialization
///
/// Simulations also carry `serde` bounds (see [`Config::Simulation`]): the trailing
/// instance's serialized form is embedded whole in every snapshot, and decoding that
/// form must reproduce an observationally equivalent instance. Lossy round-trips
/// break resynchronization.
///
/// [`push_command`]: Simulation::push_command
/// [`step`]: Simulation::step
/// [`copy_into`]: Simulation::copy_into
/// [`new_instance`]: Simulation::new_instance
/// [`Config::Simulation`]: crate::Config::Simulation
pub trait Simulation<T>
where
    T: Config,
{
    /// The frame this instance currently sits at. Monotonically non-decreasing
    /// between external mutations; `copy_into` overwrites it wholesale.
    fn current_frame(&self) -> Frame;

    /// Enqueues `command` to be applied at the *next* call to [`step`].
    ///
    /// Obligations on the implementation:
    /// - If a command with the same `(player, id)` key is already queued and the new
    ///   one [`supersedes`] it, the queued command is replaced in place.
    /// - Pushing a command equal to one already queued is otherwise a no-op, so
    ///   repeated delivery is idempotent.
    /// - Application order within one step must not affect the resulting state for
    ///   any permutation of a set of distinct commands. Sorting the queue by
    ///   `(player, id)` before applying is the simplest way to discharge this.
    ///
    /// [`step`]: Simulation::step
    /// [`supersedes`]: crate::Command::supersedes
    fn push_command(&mut self, command: Command<T>);

    /// Advances the world by exactly one frame: applies all queued commands, then
    /// ticks every registered logic system once.
    fn step(&mut self);

    /// Removes every queued command whose authority flag is not set. Returns whether
    /// any were removed.
    ///
    /// The coordinator calls this on the trailing instance just before each of its
    /// steps, which is what makes the trailing state canonical: tentative commands
    /// never reach it.
    fn skip_tentative_commands(&mut self) -> bool;

    /// Materializes a scheduled entity insertion.
    ///
    /// `entity` was allocated by the coordinator; `data` is the serialized entity the
    /// insertion was scheduled with. Inserting an id that already exists is a
    /// programmer error and may be ignored or logged by the implementation.
    fn insert_entity(&mut self, entity: EntityId, data: &T::EntityData);

    /// Removes an entity from the world. Removing an id that does not exist is
    /// harmless (the entity may have died earlier for simulation-internal reasons).
    fn remove_entity(&mut self, entity: EntityId);

    /// Returns whether an entity with the given id exists in this instance.
    fn has_entity(&self, entity: EntityId) -> bool;

    /// Overwrites `dest` with a deep copy of `self`. No mutable state may remain
    /// shared between the two afterwards. After the call, `dest.current_frame()`
    /// equals `self.current_frame()` and both produce the same digest.
    fn copy_into(&self, dest: &mut Self);

    /// Produces an empty instance of the same concrete type, ready to receive a
    /// [`copy_into`]. Called lazily when the coordinator first needs a slot.
    ///
    /// [`copy_into`]: Simulation::copy_into
    fn new_instance(&self) -> Self;

    /// Feeds deterministic bytes describing the observable state into `hasher`.
    ///
    /// Two instances must produce equal digests iff they are observationally
    /// equivalent. Feed every state-affecting field; skip caches and presentation
    /// state.
    fn state_hash(&self, hasher: &mut DeterministicHasher);
}

/// Computes the digest of a simulation with a fresh [`DeterministicHasher`].
///
/// This is the value peers exchange to detect divergence.
#[must_use]
pub fn digest<T: Config>(sim: &T::Simulation) -> u64 {
    use std::hash::Hasher;
    let mut hasher = DeterministicHasher::new();
    sim.state_hash(&mut hasher);
    hasher.finish()
}
