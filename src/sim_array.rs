//! The delay-ordered array of simulation instances and the mirror operator.

use smallvec::SmallVec;

use crate::telemetry::{ViolationKind, ViolationSeverity};
use crate::{report_violation, Config, Frame, Simulation};

/// A fixed-size, delay-ordered list of simulation instances.
///
/// Slot 0 is the leading simulation (delay 0), the last slot the trailing one
/// (largest delay). Slots other than the trailing one are allocated lazily on the
/// first mirror that reaches them, via [`Simulation::new_instance`]; instances are
/// then reused across mirrors through [`Simulation::copy_into`] so no per-frame
/// allocation occurs.
pub struct SimulationArray<T>
where
    T: Config,
{
    /// Full delay vector, strictly ascending, `delays[0] == 0`.
    delays: SmallVec<[u64; 4]>,
    slots: SmallVec<[Option<T::Simulation>; 4]>,
}

impl<T: Config> SimulationArray<T> {
    /// Creates an array with one empty slot per delay.
    ///
    /// `delays` must already be validated: non-empty, strictly ascending, starting
    /// at 0. The builder is responsible for that.
    #[must_use]
    pub fn new(delays: SmallVec<[u64; 4]>) -> Self {
        debug_assert!(!delays.is_empty());
        debug_assert_eq!(delays.first(), Some(&0));
        debug_assert!(delays.windows(2).all(|pair| pair[0] < pair[1]));
        let mut slots = SmallVec::with_capacity(delays.len());
        for _ in 0..delays.len() {
            slots.push(None);
        }
        Self { delays, slots }
    }

    /// The number of slots (at least 2 in any useful configuration).
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Whether the array holds no slots. Never true for a built coordinator.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Index of the trailing slot.
    #[must_use]
    pub fn trailing_index(&self) -> usize {
        self.slots.len() - 1
    }

    /// The full delay vector, leading 0 included.
    #[must_use]
    pub fn delays(&self) -> &[u64] {
        &self.delays
    }

    /// The delay of slot `index`.
    #[must_use]
    pub fn delay(&self, index: usize) -> u64 {
        self.delays.get(index).copied().unwrap_or(0)
    }

    /// The trailing slot's delay, the deepest in the array.
    #[must_use]
    pub fn deepest_delay(&self) -> u64 {
        self.delays.last().copied().unwrap_or(0)
    }

    /// The simulation in slot `index`, if it has been populated.
    #[must_use]
    pub fn slot(&self, index: usize) -> Option<&T::Simulation> {
        self.slots.get(index).and_then(Option::as_ref)
    }

    /// Mutable access to the simulation in slot `index`.
    pub fn slot_mut(&mut self, index: usize) -> Option<&mut T::Simulation> {
        self.slots.get_mut(index).and_then(Option::as_mut)
    }

    /// The trailing simulation, if populated.
    #[must_use]
    pub fn trailing(&self) -> Option<&T::Simulation> {
        self.slots.last().and_then(Option::as_ref)
    }

    /// Mutable access to the trailing simulation.
    pub fn trailing_mut(&mut self) -> Option<&mut T::Simulation> {
        self.slots.last_mut().and_then(Option::as_mut)
    }

    /// The frame slot `index` currently sits at, if populated.
    #[must_use]
    pub fn slot_frame(&self, index: usize) -> Option<Frame> {
        self.slot(index).map(Simulation::current_frame)
    }

    /// Installs a simulation into the trailing slot, replacing whatever was there.
    /// Used when seeding from a snapshot.
    pub fn install_trailing(&mut self, simulation: T::Simulation) {
        if let Some(slot) = self.slots.last_mut() {
            *slot = Some(simulation);
        }
    }

    /// Copies slot `src` bit-identically into every slot in `0..=start`, allocating
    /// empty instances where a slot has never been populated.
    ///
    /// After the call, all slots in `0..=start` share `src`'s frame and digest.
    /// `start` must be shallower than `src`; `mirror(i, i)` or deeper is a
    /// programmer error and is ignored with a violation report.
    pub fn mirror(&mut self, src: usize, start: usize) {
        if src >= self.slots.len() || start >= src {
            // start == src would alias the source; deeper targets are never mirrored
            // into because state only flows from deep to shallow.
            report_violation!(
                ViolationSeverity::Error,
                ViolationKind::StateManagement,
                "mirror called with src={} start={} (slots: {})",
                src,
                start,
                self.slots.len()
            );
            return;
        }
        let (shallow, deeper) = self.slots.split_at_mut(src);
        let Some(source) = deeper.first().and_then(Option::as_ref) else {
            report_violation!(
                ViolationSeverity::Critical,
                ViolationKind::StateManagement,
                "mirror source slot {} is not populated",
                src
            );
            return;
        };
        for slot in shallow.iter_mut().take(start + 1) {
            match slot {
                Some(dest) => source.copy_into(dest),
                None => {
                    let mut fresh = source.new_instance();
                    source.copy_into(&mut fresh);
                    *slot = Some(fresh);
                },
            }
        }
    }

    /// All slots shallower than the trailing one, for the worker fan-out during a
    /// fast-forward. Each `Option` is owned by exactly one worker for the duration.
    pub fn shallow_slots_mut(&mut self) -> &mut [Option<T::Simulation>] {
        let trailing = self.trailing_index();
        &mut self.slots[..trailing]
    }
}

// #########
// # TESTS #
// #########
