//! Per-connection session context and mutable connection state.

use std::sync::Arc;
use std::time::Duration;

use directory::{ConnectionHandle, PresenceDirectory, Router, SequenceCounter};

use crate::store::{Account, AccountStore, Persona};

/// How the remote end identified itself in the hello transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientType {
    /// A game client looking for sessions to join.
    Client,
    /// A dedicated server hosting sessions.
    Server,
}

impl ClientType {
    pub fn parse(raw: Option<&str>) -> Self {
        match raw {
            Some("server") => ClientType::Server,
            _ => ClientType::Client,
        }
    }
}

/// Advertised endpoints and policy knobs handed to every session.
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub domain: String,
    pub sub_domain: String,
    pub messenger_host: String,
    pub messenger_port: u16,
    pub theater_client_host: String,
    pub theater_client_port: u16,
    pub theater_server_host: String,
    pub theater_server_port: u16,
    /// How long a disconnected identity keeps its presence entry.
    pub presence_grace: Duration,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            domain: "eagames".to_string(),
            sub_domain: "BFBC2".to_string(),
            messenger_host: "127.0.0.1".to_string(),
            messenger_port: 13505,
            theater_client_host: "127.0.0.1".to_string(),
            theater_client_port: 18395,
            theater_server_host: "127.0.0.1".to_string(),
            theater_server_port: 19025,
            presence_grace: Duration::from_secs(2 * 60 * 60),
        }
    }
}

/// Shared, immutable context for one session-service connection.
///
/// Everything here is either read-only configuration or a thread-safe shared
/// structure; the mutable per-connection record is [`ConnectionState`],
/// owned by the connection's worker alone.
pub struct PlasmaSession {
    pub connection_id: u64,
    /// This connection's own push address, registered into the presence
    /// directory on login and usable for self-pushes (matchmaking status).
    pub handle: ConnectionHandle,
    pub directory: Arc<PresenceDirectory>,
    pub router: Arc<Router>,
    pub accounts: Arc<dyn AccountStore>,
    pub counters: Arc<SequenceCounter>,
    pub settings: SessionSettings,
}

/// Mutable per-connection record. Never shared across connections — all
/// cross-connection effects go through the presence directory.
#[derive(Default)]
pub struct ConnectionState {
    /// Set by the hello transaction; almost everything is rejected before it.
    pub initialized: bool,
    /// Negotiated response fragment size in bytes; values <= 0 disable
    /// output fragmentation.
    pub fragment_size: i64,
    pub client_type: Option<ClientType>,
    /// The authenticated account, once login succeeded.
    pub account: Option<Account>,
    /// The logged-in persona, once persona login succeeded.
    pub persona: Option<Persona>,
    /// Identities whose presence events this connection subscribed to.
    pub subscriptions: Vec<String>,
    /// Outstanding matchmaking ticket, if a play-now search is running.
    pub matchmaking_id: Option<u64>,
}

impl ConnectionState {
    pub fn new() -> Self {
        Self {
            fragment_size: -1,
            ..Self::default()
        }
    }
}

/// Presence-directory key for an account-level identity.
pub fn account_identity(account_id: u64) -> String {
    format!("plasma:account:{account_id}")
}

/// Presence-directory key for a persona-level identity.
pub fn persona_identity(persona_id: u64) -> String {
    format!("plasma:persona:{persona_id}")
}
