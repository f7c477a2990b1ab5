//! Identity-to-connection presence directory.
//!
//! At most one live entry per identity: a second login displaces the first,
//! and the caller is handed the displaced connection's handle so it can push
//! a "session superseded" notice before the old worker finds out the hard
//! way. Disconnects do not delete the entry — they demote it to a grace
//! window so a transient reconnect still finds its session context.

use std::time::Duration;

use crate::cache::ExpiringCache;
use crate::router::ConnectionHandle;

pub struct PresenceDirectory {
    sessions: ExpiringCache<ConnectionHandle>,
}

impl PresenceDirectory {
    pub fn new() -> Self {
        Self {
            sessions: ExpiringCache::new(),
        }
    }

    /// Registers `handle` as the connection serving `identity`.
    ///
    /// Returns the handle of a *different* connection that previously held
    /// the identity, so the caller can deliver the superseded notice. A
    /// re-registration from the same connection is silent.
    pub fn register(
        &self,
        identity: &str,
        handle: ConnectionHandle,
        ttl: Option<Duration>,
    ) -> Option<ConnectionHandle> {
        let connection_id = handle.connection_id();
        self.sessions
            .insert(identity, handle, ttl)
            .filter(|previous| previous.connection_id() != connection_id)
    }

    pub fn lookup(&self, identity: &str) -> Option<ConnectionHandle> {
        self.sessions.get(identity)
    }

    /// Extends the entry's lifetime. Returns false for unknown identities.
    pub fn refresh(&self, identity: &str, ttl: Option<Duration>) -> bool {
        self.sessions.touch(identity, ttl)
    }

    /// Removes the entry immediately (clean logout).
    pub fn unregister(&self, identity: &str) {
        self.sessions.remove(identity);
    }

    /// Demotes a live entry to a grace-window entry on disconnect.
    ///
    /// Only acts when the entry still belongs to `connection_id` — if the
    /// identity was meanwhile re-registered by a newer login, that login's
    /// entry must not have its lifetime cut short by the stale disconnect.
    pub fn begin_grace(&self, identity: &str, connection_id: u64, grace: Duration) -> bool {
        self.sessions.touch_if(identity, Some(grace), |handle| {
            handle.connection_id() == connection_id
        })
    }
}

impl Default for PresenceDirectory {
    fn default() -> Self {
        Self::new()
    }
}
