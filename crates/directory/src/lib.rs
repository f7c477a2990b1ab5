//! # Presence Directory & Shared State
//!
//! Everything that is shared *between* client connections lives in this
//! crate: the expiring key/value cache, the presence directory that maps a
//! logical identity to the connection currently serving it, the
//! cross-connection router used for unscheduled push delivery, and the
//! per-game admission queue.
//!
//! Per-connection state (transaction ids, reassembly buffers, batching
//! flags) never goes through here — it is owned by a single connection
//! worker and needs no synchronization. These structures are the *only*
//! shared-mutation points of the server, and every operation on them is a
//! short atomic map operation; no lock is ever held across I/O.
//!
//! Cross-connection delivery is deliberately fire-and-forget: a push to a
//! connection that disconnected between lookup and delivery is silently
//! absorbed. The receiver being gone is a normal state of the world, not an
//! error.

pub use cache::{ExpiringCache, SequenceCounter};
pub use presence::PresenceDirectory;
pub use queue::{AdmissionQueues, QueueError, QueuedPlayer};
pub use router::{ConnectionHandle, PushEvent, Router};

mod cache;
mod presence;
mod queue;
mod router;
