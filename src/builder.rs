//! Validated construction of a [`TssCoordinator`].

use std::sync::Arc;

use smallvec::SmallVec;

use crate::error::ConfigErrorKind;
use crate::telemetry::ViolationObserver;
use crate::{Config, InvalidationObserver, TssCoordinator, TssError};

/// Builds a [`TssCoordinator`] from a validated configuration.
///
/// The recognized options form a closed set: the trailing delays, whether the
/// fast-forward advances non-trailing slots on worker threads, an optional initial
/// world, and observer registrations.
///
/// # Example
///
/// ```ignore
/// use trailstate::CoordinatorBuilder;
///
/// let mut coordinator = CoordinatorBuilder::<GameConfig>::new()
///     .with_delays([3, 10])
///     .with_parallel_update(true)
///     .build()?;
/// coordinator.initialize(GameWorld::new());
/// ```
pub struct CoordinatorBuilder<T>
where
    T: Config,
{
    delays: Vec<u64>,
    parallel_update: bool,
    initial_snapshot: Option<T::Simulation>,
    invalidation_observers: Vec<Arc<dyn InvalidationObserver>>,
    violation_observer: Option<Arc<dyn ViolationObserver>>,
}

impl<T: Config> Default for CoordinatorBuilder<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Config> CoordinatorBuilder<T> {
    /// Creates a builder with no delays configured. At least one delay must be
    /// supplied via [`with_delays`](Self::with_delays) before building.
    #[must_use]
    pub fn new() -> Self {
        Self {
            delays: Vec::new(),
            parallel_update: false,
            initial_snapshot: None,
            invalidation_observers: Vec::new(),
            violation_observer: None,
        }
    }

    /// Sets the trailing depths beyond the leading slot, in frames.
    ///
    /// The leading slot (delay 0) is created implicitly; the values given here
    /// describe the deeper slots and must be strictly ascending and non-zero. The
    /// last value is the trailing depth: the window within which late events can
    /// still be incorporated by rollback.
    #[must_use]
    pub fn with_delays(mut self, delays: impl IntoIterator<Item = u64>) -> Self {
        self.delays = delays.into_iter().collect();
        self
    }

    /// Advances non-trailing slots on worker threads during each fast-forward.
    /// Defaults to off. Serial and parallel execution produce identical states;
    /// this is purely a throughput knob.
    #[must_use]
    pub fn with_parallel_update(mut self, parallel_update: bool) -> Self {
        self.parallel_update = parallel_update;
        self
    }

    /// Seeds the coordinator from an authoritative trailing snapshot at build time,
    /// exactly as if [`TssCoordinator::initialize`] were called on the built
    /// coordinator.
    ///
    /// [`TssCoordinator::initialize`]: crate::TssCoordinator::initialize
    #[must_use]
    pub fn with_initial_snapshot(mut self, snapshot: T::Simulation) -> Self {
        self.initial_snapshot = Some(snapshot);
        self
    }

    /// Registers an observer notified synchronously whenever the coordinator
    /// invalidates itself. May be called multiple times.
    #[must_use]
    pub fn with_invalidation_observer(mut self, observer: Arc<dyn InvalidationObserver>) -> Self {
        self.invalidation_observers.push(observer);
        self
    }

    /// Routes internal invariant violations to `observer` instead of the default
    /// tracing output. Mostly useful in tests.
    #[must_use]
    pub fn with_violation_observer(mut self, observer: Arc<dyn ViolationObserver>) -> Self {
        self.violation_observer = Some(observer);
        self
    }

    /// Validates the configuration and constructs the coordinator.
    ///
    /// The coordinator starts waiting for synchronization unless an initial world
    /// was supplied.
    ///
    /// # Errors
    /// [`TssError::Config`] when the delay vector is empty, contains a zero, or is
    /// not strictly ascending.
    pub fn build(self) -> Result<TssCoordinator<T>, TssError> {
        if self.delays.is_empty() {
            return Err(ConfigErrorKind::EmptyDelays.into());
        }
        let mut previous = 0u64;
        for (index, &delay) in self.delays.iter().enumerate() {
            if delay == 0 {
                return Err(ConfigErrorKind::ZeroDelay { index }.into());
            }
            if delay <= previous {
                return Err(ConfigErrorKind::UnsortedDelays {
                    index,
                    previous,
                    value: delay,
                }
                .into());
            }
            previous = delay;
        }

        let mut full_delays: SmallVec<[u64; 4]> = SmallVec::with_capacity(self.delays.len() + 1);
        full_delays.push(0);
        full_delays.extend(self.delays.iter().copied());

        let mut coordinator = TssCoordinator::from_parts(
            full_delays,
            self.parallel_update,
            self.invalidation_observers,
            self.violation_observer,
        );
        if let Some(snapshot) = self.initial_snapshot {
            coordinator.initialize(snapshot);
        }
        Ok(coordinator)
    }
}

// #########
// # TESTS #
// #########
