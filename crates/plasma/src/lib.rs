//! # Plasma — the session service
//!
//! The request/response half of the master-server protocol: account and
//! persona login, connection keepalive, presence, matchmaking kick-off. One
//! [`PlasmaTransactor`] per client connection drives the state machine:
//!
//! 1. Validate the service code and kind tag (invalid frames are dropped —
//!    the client has no way to recover from a malformed ack anyway).
//! 2. Enforce tid sequencing, with a fixed allow-list of unscheduled
//!    transactions that bypass it.
//! 3. Gate on initialization (the hello transaction) and authentication.
//! 4. Reassemble chunked requests, dispatch through the static service
//!    tables, fragment oversized responses.
//!
//! Cross-connection behavior — duplicate-login eviction, social pushes,
//! matchmaking status — goes through the presence directory and router from
//! the `directory` crate; this crate never reaches into another connection's
//! state directly.

pub use dispatch::{Context, HandlerFn, HandlerFuture, ServiceHandlers, ServiceRegistry};
pub use error::{ErrorCode, HandlerResult, Outcome, TransactionError};
pub use kind::{TransactionKind, INITIAL_ERROR, TAG_MASK, TID_MASK};
pub use session::{
    account_identity, persona_identity, ClientType, ConnectionState, PlasmaSession,
    SessionSettings,
};
pub use store::{Account, AccountStore, MemoryAccountStore, Persona, StoreError};
pub use transactor::{PlasmaTransactor, UNSCHEDULED_ALLOWED};

pub mod dispatch;
pub mod error;
pub mod kind;
pub mod services;
pub mod session;
pub mod store;
pub mod transactor;
