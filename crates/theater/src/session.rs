//! Per-connection context and state for the game-hosting protocol.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use directory::{AdmissionQueues, ConnectionHandle, PresenceDirectory, Router, SequenceCounter};
use plasma::{AccountStore, Persona};

use crate::store::GameStore;

/// Shared, immutable context for one theater connection.
pub struct TheaterSession {
    pub connection_id: u64,
    pub peer: SocketAddr,
    /// This connection's push address; registered under the persona identity
    /// on login and under the host identity when a game is created.
    pub handle: ConnectionHandle,
    pub directory: Arc<PresenceDirectory>,
    pub router: Arc<Router>,
    /// Session-key resolution shares the account collaborator with the
    /// session service, so a persona logged in over there is visible here.
    pub accounts: Arc<dyn AccountStore>,
    pub games: Arc<dyn GameStore>,
    pub queues: Arc<AdmissionQueues>,
    pub counters: Arc<SequenceCounter>,
    /// Grace window applied to the persona's presence entry on disconnect.
    pub presence_grace: Duration,
}

/// Mutable per-connection record, owned by the connection worker.
#[derive(Default)]
pub struct TheaterState {
    pub initialized: bool,
    pub protocol_version: Option<i64>,
    pub platform: Option<String>,
    pub locale: Option<String>,
    /// The persona resumed from its session key, once `USER` succeeded.
    pub persona: Option<Persona>,
    /// Set between `UBRA START` and `UBRA END`; while set, repeated
    /// messages under the same tid are accepted and the tid stands still.
    pub currently_batching: bool,
    /// `(lid, gid)` of the game this connection hosts, if any.
    pub hosted_game: Option<(u64, u64)>,
    /// `(lid, gid)` of the game this connection joined or is joining.
    pub joined_game: Option<(u64, u64)>,
    /// `(lid, gid)` of the game whose admission queue this connection
    /// waits in.
    pub queued_game: Option<(u64, u64)>,
}

/// Presence-directory key for a persona's theater connection.
pub fn theater_identity(persona_id: u64) -> String {
    format!("theater:persona:{persona_id}")
}

/// Presence-directory key for the connection hosting a game.
pub fn host_identity(game_id: u64) -> String {
    format!("theater:host:{game_id}")
}
