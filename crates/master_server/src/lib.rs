//! # Master Server
//!
//! The deployable binary tying the protocol crates together: configuration,
//! logging, graceful shutdown, the WebSocket transport, and the
//! per-connection worker tasks.
//!
//! Each accepted connection gets one worker task that owns its transactor
//! and multiplexes three event sources with `select!`: inbound transport
//! frames, cross-connection push deliveries, and (for the session protocol)
//! the keepalive timer. A companion writer task drains pre-encoded frames
//! to the socket, so a slow client never blocks transaction processing.
//! When the worker exits, its keepalive arm dies with it and the disconnect
//! cleanup releases every piece of shared state the connection held.

pub mod cli;
pub mod config;
pub mod connection;
pub mod logging;
pub mod net;
pub mod shutdown;
pub mod state;
