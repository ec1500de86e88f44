// Each integration test binary compiles its own copy of this module and uses a
// different subset of the helpers.
#![allow(dead_code)]

use std::collections::BTreeMap;
use std::hash::Hasher;

use serde::{Deserialize, Serialize};

use trailstate::hash::DeterministicHasher;
use trailstate::{
    Command, CommandId, Config, CoordinatorBuilder, EntityId, Frame, PlayerId, Simulation,
    TssCoordinator,
};

/// Marker config for the lattice world used by the integration tests.
pub struct LatticeConfig;

impl Config for LatticeConfig {
    type Simulation = LatticeWorld;
    type CommandData = Thrust;
    type EntityData = Ship;
}

/// Command payload: a thrust vector contributed by one player.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Thrust {
    pub dx: i64,
    pub dy: i64,
}

/// Entity payload: a ship at a lattice position.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ship {
    pub x: i64,
    pub y: i64,
}

/// A deterministic integer world: ships on a lattice, drifting by the sum of all
/// thrust commands applied so far. Thrust sums are commutative, so command
/// application order within a frame cannot affect the state.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct LatticeWorld {
    frame: u64,
    drift_x: i64,
    drift_y: i64,
    ships: BTreeMap<EntityId, Ship>,
    #[serde(skip)]
    queued: Vec<Command<LatticeConfig>>,
}

impl LatticeWorld {
    pub fn with_ships(ships: impl IntoIterator<Item = (EntityId, Ship)>) -> Self {
        Self {
            ships: ships.into_iter().collect(),
            ..Self::default()
        }
    }

    pub fn ship(&self, entity: EntityId) -> Option<Ship> {
        self.ships.get(&entity).copied()
    }

    pub fn ship_count(&self) -> usize {
        self.ships.len()
    }
}

impl Simulation<LatticeConfig> for LatticeWorld {
    fn current_frame(&self) -> Frame {
        Frame::new(self.frame)
    }

    fn push_command(&mut self, command: Command<LatticeConfig>) {
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
            self.drift_x += command.data.dx;
            self.drift_y += command.data.dy;
        }
        for ship in self.ships.values_mut() {
            ship.x += self.drift_x;
            ship.y += self.drift_y;
        }
        self.frame += 1;
    }

    fn skip_tentative_commands(&mut self) -> bool {
        let before = self.queued.len();
        self.queued.retain(|command| command.authoritative);
        self.queued.len() != before
    }

    fn insert_entity(&mut self, entity: EntityId, data: &Ship) {
        self.ships.entry(entity).or_insert(*data);
    }

    fn remove_entity(&mut self, entity: EntityId) {
        self.ships.remove(&entity);
    }

    fn has_entity(&self, entity: EntityId) -> bool {
        self.ships.contains_key(&entity)
    }

    fn copy_into(&self, dest: &mut Self) {
        dest.frame = self.frame;
        dest.drift_x = self.drift_x;
        dest.drift_y = self.drift_y;
        dest.ships = self.ships.clone();
        dest.queued = self.queued.clone();
    }

    fn new_instance(&self) -> Self {
        Self::default()
    }

    fn state_hash(&self, hasher: &mut DeterministicHasher) {
        hasher.write_u64(self.frame);
        hasher.write_i64(self.drift_x);
        hasher.write_i64(self.drift_y);
        hasher.write_u64(self.ships.len() as u64);
        for (entity, ship) in &self.ships {
            hasher.write_u64(entity.as_u64());
            hasher.write_i64(ship.x);
            hasher.write_i64(ship.y);
        }
    }
}

/// Routes engine logs into the test harness output, so failing tests show the
/// coordinator's transition trace. Safe to call from every test; only the first
/// call installs the subscriber.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::TRACE)
        .with_test_writer()
        .try_init();
}

/// A world with two ships, enough state for digests to be discriminating.
pub fn seeded_world() -> LatticeWorld {
    init_tracing();
    LatticeWorld::with_ships([
        (EntityId::new(0), Ship { x: 0, y: 0 }),
        (EntityId::new(1), Ship { x: 10, y: -4 }),
    ])
}

/// A coordinator over the seeded world. `depths` excludes the implicit leading 0.
pub fn build_coordinator(depths: &[u64], parallel: bool) -> TssCoordinator<LatticeConfig> {
    init_tracing();
    let mut coordinator = CoordinatorBuilder::<LatticeConfig>::new()
        .with_delays(depths.iter().copied())
        .with_parallel_update(parallel)
        .build()
        .expect("valid test configuration");
    coordinator.set_next_entity_id(EntityId::new(2));
    coordinator.initialize(seeded_world());
    coordinator
}

pub fn tentative(player: u16, id: u64, dx: i64, dy: i64) -> Command<LatticeConfig> {
    Command::tentative(PlayerId::new(player), CommandId::new(id), Thrust { dx, dy })
}

pub fn authoritative(player: u16, id: u64, dx: i64, dy: i64) -> Command<LatticeConfig> {
    Command::authoritative(PlayerId::new(player), CommandId::new(id), Thrust { dx, dy })
}
