//! A deliberately tiny deterministic world used by the unit tests.

use std::collections::BTreeMap;
use std::hash::Hasher;

use crate::hash::DeterministicHasher;
use crate::{Command, Config, EntityId, Frame, Simulation};

/// Marker config for the counter world.
pub(crate) struct CounterConfig;

impl Config for CounterConfig {
    type Simulation = CounterWorld;
    type CommandData = i64;
    type EntityData = i64;
}

/// A world whose whole state is one counter plus a set of entities.
///
/// Commands add their payload to the counter when applied; the sum is commutative,
/// which discharges the order-insensitivity obligation trivially. Entities each
/// contribute their stored weight once per step, so insertions and removals are
/// observable in the digest.
#[derive(Clone, Debug, Default, serde::Serialize, serde::Deserialize)]
pub(crate) struct CounterWorld {
    frame: u64,
    pub(crate) value: i64,
    entities: BTreeMap<EntityId, i64>,
    #[serde(skip)]
    queued: Vec<Command<CounterConfig>>,
}

impl CounterWorld {
    pub(crate) fn entity_count(&self) -> usize {
        self.entities.len()
    }

    pub(crate) fn queued_len(&self) -> usize {
        self.queued.len()
    }
}

impl Simulation<CounterConfig> for CounterWorld {
    fn current_frame(&self) -> Frame {
        Frame::new(self.frame)
    }

    fn push_command(&mut self, command: Command<CounterConfig>) {
        match self.queued.binary_search(&command) {
            Ok(pos) => {
                if command.supersedes(&self.queued[pos]) {
                    self.queued[pos] = command;
                }
            },
            Err(pos) => self.queued.insert(pos, command),
        }
    }

    fn step(&mut self) {
        for command in self.queued.drain(..) {
            self.value += command.data;
        }
        for weight in self.entities.values() {
            self.value += weight;
        }
        self.frame += 1;
    }

    fn skip_tentative_commands(&mut self) -> bool {
        let before = self.queued.len();
        self.queued.retain(|command| command.authoritative);
        self.queued.len() != before
    }

    fn insert_entity(&mut self, entity: EntityId, data: &i64) {
        self.entities.entry(entity).or_insert(*data);
    }

    fn remove_entity(&mut self, entity: EntityId) {
        self.entities.remove(&entity);
    }

    fn has_entity(&self, entity: EntityId) -> bool {
        self.entities.contains_key(&entity)
    }

    fn copy_into(&self, dest: &mut Self) {
        dest.frame = self.frame;
        dest.value = self.value;
        dest.entities = self.entities.clone();
        dest.queued = self.queued.clone();
    }

    fn new_instance(&self) -> Self {
        Self::default()
    }

    fn state_hash(&self, hasher: &mut DeterministicHasher) {
        hasher.write_u64(self.frame);
        hasher.write_i64(self.value);
        hasher.write_u64(self.entities.len() as u64);
        for (entity, weight) in &self.entities {
            hasher.write_u64(entity.as_u64());
            hasher.write_i64(*weight);
        }
    }
}
