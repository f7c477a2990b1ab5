//! Handler failures.
//!
//! The game-hosting protocol has no error packets: a transaction that
//! cannot proceed is logged and produces no response, and the connection
//! stays up. These variants exist so the transactor can log *why*.

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TheaterError {
    #[error("required field {0} is missing")]
    MissingField(&'static str),
    #[error("no persona is logged in on this connection")]
    NotLoggedIn,
    #[error("persona login key is not valid")]
    InvalidLoginKey,
    #[error("no such game")]
    UnknownGame,
    #[error("connection is not hosting a game")]
    NotHosting,
}
