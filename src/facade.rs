//! A world-facing facade over the coordinator.
//!
//! Read operations go straight to the leading simulation, which reflects the most
//! recently predicted state. Mutating operations never touch a simulation directly;
//! they are routed into the coordinator's future timeline at the current frame, so
//! every slot replays them identically.

use crate::error::InvalidTimingReason;
use crate::{Command, Config, EntityId, Frame, Simulation, TssCoordinator, TssError};

/// Where a system installer applies.
///
/// Logic systems participate in the deterministic state and must run identically in
/// every slot. Drawing systems are presentation only: they are installed into the
/// leading slot alone, since no other slot is ever rendered.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum SystemScope {
    /// State-affecting; installed into every simulation slot.
    Logic,
    /// Presentation only; installed into the leading slot.
    Drawing,
}

/// Entity and system access bound to a coordinator.
///
/// Obtained via [`TssCoordinator::entities`]. The facade borrows the coordinator
/// mutably, which statically enforces the single-driver discipline: no frame can
/// advance while a facade is alive.
pub struct EntityFacade<'c, T>
where
    T: Config,
{
    coordinator: &'c mut TssCoordinator<T>,
}

impl<T: Config> TssCoordinator<T> {
    /// Returns the entity facade for scheduling mutations and reading the leading
    /// world.
    pub fn entities(&mut self) -> EntityFacade<'_, T> {
        EntityFacade { coordinator: self }
    }
}

impl<T: Config> EntityFacade<'_, T> {
    /// Whether the leading simulation currently contains `entity`.
    ///
    /// This answers from the *predicted* state: an entity scheduled for insertion
    /// at the current frame only appears once the frame advances past it.
    #[must_use]
    pub fn has_entity(&self, entity: EntityId) -> bool {
        self.coordinator
            .leading()
            .is_some_and(|leading| leading.has_entity(entity))
    }

    /// Read access to the leading simulation, for component queries and rendering.
    /// `None` until the coordinator has been seeded.
    #[must_use]
    pub fn leading(&self) -> Option<&T::Simulation> {
        self.coordinator.leading()
    }

    /// Schedules the insertion of a new entity at the current frame and returns
    /// its freshly allocated id.
    ///
    /// # Errors
    /// [`TssError::NotReady`] while waiting for synchronization;
    /// [`TssError::Conflict`] if the allocated id is somehow already scheduled for
    /// removal this frame (ids are fresh, so this indicates a misuse of
    /// [`set_next_entity_id`]).
    ///
    /// [`set_next_entity_id`]: TssCoordinator::set_next_entity_id
    pub fn add_entity(&mut self, data: T::EntityData) -> Result<EntityId, TssError> {
        if self.coordinator.is_waiting_for_synchronization() {
            return Err(TssError::NotReady);
        }
        let entity = self.coordinator.allocate_entity_id();
        let frame = self.coordinator.current_frame();
        self.coordinator.schedule_add(entity, data, frame)?;
        Ok(entity)
    }

    /// Schedules the removal of `entity` at the current frame.
    ///
    /// # Errors
    /// Same as [`TssCoordinator::schedule_remove`].
    pub fn remove_entity(&mut self, entity: EntityId) -> Result<(), TssError> {
        let frame = self.coordinator.current_frame();
        self.coordinator.schedule_remove(entity, frame)
    }

    /// Schedules `command` for execution at the current frame.
    ///
    /// # Errors
    /// Same as [`TssCoordinator::push_command`].
    pub fn push_command(&mut self, command: Command<T>) -> Result<(), TssError> {
        let frame = self.coordinator.current_frame();
        self.coordinator.push_command(command, frame)
    }

    /// Installs a system into the world via `installer`, which receives each
    /// affected simulation slot.
    ///
    /// Installation is a startup-only operation: once the world has stepped (the
    /// trailing simulation moved past frame 0) the slots have diverged in time and
    /// a new system could not be introduced deterministically.
    ///
    /// # Errors
    /// - [`TssError::NotReady`] while waiting for synchronization.
    /// - [`TssError::InvalidTiming`] once the world has started stepping.
    pub fn install_system(
        &mut self,
        scope: SystemScope,
        mut installer: impl FnMut(&mut T::Simulation),
    ) -> Result<(), TssError> {
        if self.coordinator.is_waiting_for_synchronization() {
            return Err(TssError::NotReady);
        }
        let started = self
            .coordinator
            .trailing_slot()
            .is_some_and(|trailing| trailing.current_frame() > Frame::new(0));
        if started {
            let current_frame = self.coordinator.current_frame();
            return Err(TssError::InvalidTiming {
                frame: current_frame,
                reason: InvalidTimingReason::SystemsLocked { current_frame },
            });
        }
        match scope {
            SystemScope::Logic => self.coordinator.for_each_slot(&mut installer),
            SystemScope::Drawing => {
                if let Some(leading) = self.coordinator.leading_mut() {
                    installer(leading);
                }
            },
        }
        Ok(())
    }
}

// #########
// # TESTS #
// #########
