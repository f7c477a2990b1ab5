//! Per-connection worker tasks, one module per protocol.
//!
//! Both workers share the same shape: accept the WebSocket upgrade, split
//! it, hand the write half to a drainer task fed by an unbounded frame
//! channel, then `select!` over inbound frames and push deliveries until
//! the transport goes away. The transactors only ever see byte buffers and
//! channels — the transport stays swappable.

pub mod plasma;
pub mod theater;
