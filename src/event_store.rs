//! The pending event store: frame-indexed events awaiting execution.
//!
//! Three ordered maps hold everything the coordinator has been asked to do in the
//! future timeline: entity removals, commands, and entity insertions, each keyed by
//! the frame they execute at. Every simulation slot replays the same events as it
//! steps through a frame, so lookups are non-destructive; entries are only discarded
//! by [`EventStore::prune`] once the trailing simulation has stepped past them.
//!
//! Ordered maps (`BTreeMap`/`BTreeSet`) are used throughout: iteration order feeds
//! directly into simulation state, so it must be deterministic.

use std::collections::{BTreeMap, BTreeSet};

use smallvec::SmallVec;

use crate::error::InvalidTimingReason;
use crate::{Command, Config, EntityId, Frame, TssError};

/// Commands scheduled for one frame, kept sorted ascending by `(player, id)`.
/// Inline capacity covers the common case of a handful of commands per frame.
type CommandList<T> = SmallVec<[Command<T>; 4]>;

/// Outcome of scheduling a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandScheduled {
    /// The command was not yet known and was inserted.
    Inserted,
    /// An equal command was already scheduled; the authoritative incoming version
    /// replaced the tentative existing one. `previous_frame` is where the replaced
    /// version had been scheduled (usually, but not necessarily, the same frame).
    Promoted {
        /// The frame the superseded version was scheduled at.
        previous_frame: Frame,
    },
    /// An equal command was already scheduled and the incoming one does not
    /// supersede it; the store is unchanged.
    Ignored,
}

/// Frame-indexed storage for scheduled removals, commands and insertions.
///
/// Invariants upheld here:
/// - every stored frame is `>=` the trailing frame passed to the last
///   [`prune`](Self::prune) call;
/// - each frame's command list is sorted ascending by `(player, id)`;
/// - a `(player, id)` key appears at most once across the *entire* commands map;
/// - no entity is scheduled for both insertion and removal at the same frame.
#[derive(serde::Serialize, serde::Deserialize)]
#[serde(bound = "")]
pub struct EventStore<T>
where
    T: Config,
{
    removes: BTreeMap<Frame, BTreeSet<EntityId>>,
    commands: BTreeMap<Frame, CommandList<T>>,
    adds: BTreeMap<Frame, Vec<(EntityId, T::EntityData)>>,
}

impl<T: Config> Default for EventStore<T> {
    fn default() -> Self {
        Self {
            removes: BTreeMap::new(),
            commands: BTreeMap::new(),
            adds: BTreeMap::new(),
        }
    }
}

impl<T: Config> EventStore<T> {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedules `command` for execution at `frame`.
    ///
    /// If an equal command (same `(player, id)` key) is already scheduled anywhere
    /// in the store, the incoming one either supersedes it in place (authoritative
    /// over tentative; see [`Command::supersedes`]) or is ignored. A superseding
    /// command scheduled for a different frame than its predecessor removes the
    /// predecessor from its old frame.
    ///
    /// # Errors
    /// Returns [`TssError::InvalidTiming`] if `frame` is older than `trailing`.
    pub fn schedule_command(
        &mut self,
        command: Command<T>,
        frame: Frame,
        trailing: Frame,
    ) -> Result<CommandScheduled, TssError> {
        if frame < trailing {
            return Err(TssError::InvalidTiming {
                frame,
                reason: InvalidTimingReason::BeforeTrailing { trailing },
            });
        }

        // The (player, id) key is unique across the whole map, so an existing entry
        // may live at any frame, not just the requested one.
        if let Some((existing_frame, pos)) = self.find_command(&command) {
            let existing = &self.commands[&existing_frame][pos];
            if !command.supersedes(existing) {
                return Ok(CommandScheduled::Ignored);
            }
            if existing_frame == frame {
                if let Some(list) = self.commands.get_mut(&existing_frame) {
                    list[pos] = command;
                }
            } else {
                self.remove_command_at(existing_frame, pos);
                self.insert_sorted(command, frame);
            }
            return Ok(CommandScheduled::Promoted {
                previous_frame: existing_frame,
            });
        }

        self.insert_sorted(command, frame);
        Ok(CommandScheduled::Inserted)
    }

    /// Schedules the removal of `entity` at `frame`. Duplicates are ignored.
    ///
    /// # Errors
    /// Returns [`TssError::InvalidTiming`] if `frame` is older than `trailing`, and
    /// [`TssError::Conflict`] if `entity` is already scheduled for insertion at the
    /// same frame.
    pub fn schedule_remove(
        &mut self,
        entity: EntityId,
        frame: Frame,
        trailing: Frame,
    ) -> Result<(), TssError> {
        if frame < trailing {
            return Err(TssError::InvalidTiming {
                frame,
                reason: InvalidTimingReason::BeforeTrailing { trailing },
            });
        }
        if self
            .adds
            .get(&frame)
            .is_some_and(|adds| adds.iter().any(|(id, _)| *id == entity))
        {
            return Err(TssError::Conflict { entity, frame });
        }
        self.removes.entry(frame).or_default().insert(entity);
        Ok(())
    }

    /// Schedules the insertion of `entity` (described by `data`) at `frame`.
    /// Scheduling the same entity id twice at the same frame keeps the first entry.
    ///
    /// # Errors
    /// Returns [`TssError::InvalidTiming`] if `frame` is older than `trailing`, and
    /// [`TssError::Conflict`] if `entity` is already scheduled for removal at the
    /// same frame.
    pub fn schedule_add(
        &mut self,
        entity: EntityId,
        data: T::EntityData,
        frame: Frame,
        trailing: Frame,
    ) -> Result<(), TssError> {
        if frame < trailing {
            return Err(TssError::InvalidTiming {
                frame,
                reason: InvalidTimingReason::BeforeTrailing { trailing },
            });
        }
        if self
            .removes
            .get(&frame)
            .is_some_and(|removes| removes.contains(&entity))
        {
            return Err(TssError::Conflict { entity, frame });
        }
        let adds = self.adds.entry(frame).or_default();
        if !adds.iter().any(|(id, _)| *id == entity) {
            adds.push((entity, data));
        }
        Ok(())
    }

    /// Discards every entry older than `older_than`. Called once per coordinator
    /// step after the trailing simulation has advanced.
    pub fn prune(&mut self, older_than: Frame) {
        self.removes = self.removes.split_off(&older_than);
        self.commands = self.commands.split_off(&older_than);
        self.adds = self.adds.split_off(&older_than);
    }

    /// The commands scheduled for `frame`, sorted ascending by `(player, id)`.
    #[must_use]
    pub fn commands_for(&self, frame: Frame) -> &[Command<T>] {
        self.commands.get(&frame).map_or(&[], |list| list.as_slice())
    }

    /// The entity removals scheduled for `frame`, in ascending id order.
    pub fn removes_for(&self, frame: Frame) -> impl Iterator<Item = EntityId> + '_ {
        self.removes.get(&frame).into_iter().flatten().copied()
    }

    /// The entity insertions scheduled for `frame`, in scheduling order.
    #[must_use]
    pub fn adds_for(&self, frame: Frame) -> &[(EntityId, T::EntityData)] {
        self.adds.get(&frame).map_or(&[], |list| list.as_slice())
    }

    /// Total number of commands scheduled across all frames.
    #[must_use]
    pub fn pending_command_count(&self) -> usize {
        self.commands.values().map(|list| list.len()).sum()
    }

    /// Total number of removals scheduled across all frames.
    #[must_use]
    pub fn pending_remove_count(&self) -> usize {
        self.removes.values().map(|entities| entities.len()).sum()
    }

    /// Total number of insertions scheduled across all frames.
    #[must_use]
    pub fn pending_add_count(&self) -> usize {
        self.adds.values().map(|list| list.len()).sum()
    }

    /// Whether the store holds no events at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.removes.is_empty() && self.commands.is_empty() && self.adds.is_empty()
    }

    /// The oldest frame any event is scheduled at, if the store is non-empty.
    #[must_use]
    pub fn oldest_frame(&self) -> Option<Frame> {
        let removes = self.removes.keys().next();
        let commands = self.commands.keys().next();
        let adds = self.adds.keys().next();
        [removes, commands, adds].into_iter().flatten().min().copied()
    }

    /// Merges `incoming` into this store, keeping local entries where they win.
    ///
    /// Used when loading a snapshot: the snapshot carries the sender's pending
    /// events, while this store may hold locally generated ones that are still in
    /// the future. Entries of `incoming` older than `trailing` are dropped; command
    /// key collisions are resolved by the usual supersedes rule (a local entry is
    /// only replaced by an authoritative incoming version of itself); removals are
    /// unioned; insertions keep the first entry per entity id, preferring local.
    pub fn merge_from(&mut self, incoming: Self, trailing: Frame) {
        let Self {
            mut removes,
            mut commands,
            mut adds,
        } = incoming;

        for (frame, entities) in removes.split_off(&trailing) {
            self.removes.entry(frame).or_default().extend(entities);
        }

        for (frame, list) in commands.split_off(&trailing) {
            for command in list {
                match self.find_command(&command) {
                    Some((existing_frame, pos)) => {
                        let existing = &self.commands[&existing_frame][pos];
                        if command.supersedes(existing) {
                            if existing_frame == frame {
                                if let Some(local) = self.commands.get_mut(&existing_frame) {
                                    local[pos] = command;
                                }
                            } else {
                                self.remove_command_at(existing_frame, pos);
                                self.insert_sorted(command, frame);
                            }
                        }
                    },
                    None => self.insert_sorted(command, frame),
                }
            }
        }

        for (frame, list) in adds.split_off(&trailing) {
            let local = self.adds.entry(frame).or_default();
            for (entity, data) in list {
                if !local.iter().any(|(id, _)| *id == entity) {
                    local.push((entity, data));
                }
            }
        }
    }

    /// Locates a command with the same `(player, id)` key anywhere in the store.
    fn find_command(&self, command: &Command<T>) -> Option<(Frame, usize)> {
        for (frame, list) in &self.commands {
            if let Ok(pos) = list.binary_search(command) {
                return Some((*frame, pos));
            }
        }
        None
    }

    /// Inserts a command into its frame's list, preserving the sort order.
    fn insert_sorted(&mut self, command: Command<T>, frame: Frame) {
        let list = self.commands.entry(frame).or_default();
        match list.binary_search(&command) {
            // A key collision here would mean find_command missed it; keep the
            // existing entry rather than duplicating the key.
            Ok(_) => {},
            Err(pos) => list.insert(pos, command),
        }
    }

    /// Removes the command at `pos` in `frame`'s list, dropping the list when it
    /// becomes empty.
    fn remove_command_at(&mut self, frame: Frame, pos: usize) {
        let emptied = match self.commands.get_mut(&frame) {
            Some(list) => {
                if pos < list.len() {
                    list.remove(pos);
                }
                list.is_empty()
            },
            None => false,
        };
        if emptied {
            self.commands.remove(&frame);
        }
    }
}

impl<T: Config> std::fmt::Debug for EventStore<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventStore")
            .field("pending_removes", &self.pending_remove_count())
            .field("pending_commands", &self.pending_command_count())
            .field("pending_adds", &self.pending_add_count())
            .finish_non_exhaustive()
    }
}

// #########
// # TESTS #
// #########
