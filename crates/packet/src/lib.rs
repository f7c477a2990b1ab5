//! # Packet Codec
//!
//! Wire codec for the master-server transaction protocol. Every message on a
//! client connection is one packet: a fixed 12-byte header (4-character
//! service code, 32-bit kind word, total length) followed by an ordered
//! `key=value` text body.
//!
//! The codec is pure and synchronous. It knows nothing about transaction
//! sequencing, services, or transports — those live in the `plasma` and
//! `theater` crates. What it does guarantee:
//!
//! * **Order preservation** — body fields keep their insertion order through
//!   encode and decode. Legacy clients parse some payloads positionally, so
//!   order is part of the contract, not an implementation detail.
//! * **Structure flattening** — nested maps become dotted keys (`a.b.c`),
//!   lists become indexed keys plus a `.[]` count key. Flattening on encode
//!   and unflattening on decode are inverse operations for every value a
//!   legal packet can carry.
//! * **All-or-nothing decode** — a malformed buffer yields a
//!   [`PacketParseError`] and never a partially populated packet.
//!
//! The exact byte layout (quoting, `%XX` escapes, the `.[]` list convention)
//! is a compatibility contract with the original game client, reverse-checked
//! against captures. It is deliberately hand-rolled rather than expressed
//! through a serialization framework so a capture-verified correction stays
//! local to this crate.

pub use codec::{Packet, PacketParseError, ServiceCode, HEADER_LENGTH};
pub use value::{Value, ValueMap};

mod codec;
mod value;
