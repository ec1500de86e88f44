//! The command value scheduled against future frames.

use std::cmp::Ordering;

use crate::{CommandId, Config, PlayerId};

/// A player-issued command scheduled for execution at some frame.
///
/// The identity of a command is its `(player, id)` key: two commands with equal keys
/// are *the same command*, regardless of payload. The payload is opaque to the
/// engine; only the user's [`Simulation`] interprets it.
///
/// A command is either **tentative** (provisionally applied by a peer based on local
/// or speculative input; may be replaced or discarded) or **authoritative** (signed
/// by the trusted source; cannot be revoked). When an authoritative command arrives
/// for a key that is already scheduled tentatively, the authoritative version
/// replaces the tentative one in place.
///
/// Commands are logically immutable once constructed.
///
/// [`Simulation`]: crate::Simulation
#[derive(serde::Serialize, serde::Deserialize)]
#[serde(bound = "")]
pub struct Command<T>
where
    T: Config,
{
    /// The player this command originated from.
    pub player: PlayerId,
    /// The command's unique id within that player's stream.
    pub id: CommandId,
    /// Whether the trusted source has signed this command.
    pub authoritative: bool,
    /// The opaque payload interpreted by the simulation.
    pub data: T::CommandData,
}

impl<T: Config> Command<T> {
    /// Creates a tentative command.
    #[must_use]
    pub fn tentative(player: PlayerId, id: CommandId, data: T::CommandData) -> Self {
        Self {
            player,
            id,
            authoritative: false,
            data,
        }
    }

    /// Creates an authoritative command.
    #[must_use]
    pub fn authoritative(player: PlayerId, id: CommandId, data: T::CommandData) -> Self {
        Self {
            player,
            id,
            authoritative: true,
            data,
        }
    }

    /// Returns the `(player, id)` identity key.
    #[inline]
    #[must_use]
    pub fn key(&self) -> (PlayerId, CommandId) {
        (self.player, self.id)
    }

    /// Returns whether this command replaces `existing` when both are scheduled for
    /// the same frame: same key, and this one is authoritative while the existing
    /// one is not.
    #[must_use]
    pub fn supersedes(&self, existing: &Self) -> bool {
        self.key() == existing.key() && self.authoritative && !existing.authoritative
    }

    /// Compares the full observable content, not just the identity key.
    ///
    /// Identity equality (`==`) intentionally ignores the payload and the authority
    /// flag; this helper is for tests and diagnostics that care about both.
    #[must_use]
    pub fn same_content(&self, other: &Self) -> bool {
        self.key() == other.key()
            && self.authoritative == other.authoritative
            && self.data == other.data
    }
}

// Identity of a command is its (player, id) key; payload and authority flag are
// excluded. Hand-written impls because derives would also compare the payload and
// demand bounds on the Config parameter itself.

impl<T: Config> PartialEq for Command<T> {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl<T: Config> Eq for Command<T> {}

impl<T: Config> PartialOrd for Command<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T: Config> Ord for Command<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key().cmp(&other.key())
    }
}

impl<T: Config> Clone for Command<T> {
    fn clone(&self) -> Self {
        Self {
            player: self.player,
            id: self.id,
            authoritative: self.authoritative,
            data: self.data.clone(),
        }
    }
}

impl<T: Config> std::fmt::Debug for Command<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Command")
            .field("player", &self.player)
            .field("id", &self.id)
            .field("authoritative", &self.authoritative)
            .field("data", &self.data)
            .finish()
    }
}

// #########
// # TESTS #
// #########
