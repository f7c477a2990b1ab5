//! # Theater — the game-hosting service
//!
//! The streaming half of the master-server protocol: lobby and game
//! listings, game creation and updates, and the enter-game handshake with
//! its admission queue. The wire framing is the same as the session
//! protocol's, but the envelope differs — the 4-character service code *is*
//! the transaction code, the kind word is a bare request/response marker,
//! and the tid travels in the `TID` body field.
//!
//! Three protocol quirks set this transactor apart from the session one:
//!
//! * Handlers are **streaming producers**: each response packet is sent the
//!   moment the handler produces it, so size-unbounded results (game lists,
//!   multi-part details) never buffer in memory.
//! * **Bracket batching**: between `UBRA START` and `UBRA END` the
//!   connection accepts repeated messages under one tid, covering the
//!   multi-packet update bursts game servers send.
//! * **Keepalive**: `PING` is accepted under any tid and always answers with
//!   tid 0; `ECHO` is answered immediately, even before `CONN`.

pub use error::TheaterError;
pub use session::{host_identity, theater_identity, TheaterSession, TheaterState};
pub use store::{CreateGame, Game, GameStore, Lobby, MemoryGameStore};
pub use transactor::{ResponseSink, TheaterContext, TheaterTransactor, KIND_REQUEST, KIND_RESPONSE};

pub mod error;
pub mod session;
pub mod store;
pub mod transactions;
pub mod transactor;
