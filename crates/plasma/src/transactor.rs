//! The session-protocol transactor: one per connection.
//!
//! Owns the transaction sequence number, the chunked-input reassembly
//! buffer, and the connection's mutable state. Exactly one worker drives a
//! transactor, so nothing in here is synchronized — cross-connection effects
//! arrive as [`PushEvent`]s on the worker's channel and leave through the
//! presence directory.
//!
//! Outbound packets are encoded here and handed to the transport as raw
//! frames; the transactor never touches a socket.

use std::sync::Arc;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use tokio::sync::mpsc;
use tracing::{debug, error, warn};

use directory::PushEvent;
use packet::{Packet, PacketParseError, ServiceCode, ValueMap, HEADER_LENGTH};

use crate::dispatch::{Context, ServiceRegistry};
use crate::error::{ErrorCode, Outcome, TransactionError};
use crate::kind::{TransactionKind, INITIAL_ERROR, TAG_MASK, TID_MASK};
use crate::services::connect;
use crate::session::{account_identity, persona_identity, ConnectionState, PlasmaSession};

/// Transaction names that bypass tid sequencing in both directions: inbound
/// as tid-0 responses to our own pushes, outbound as server-initiated
/// transactions. Keepalive, the session-teardown notice, the social async
/// events, and the matchmaking status.
pub const UNSCHEDULED_ALLOWED: &[&str] = &[
    connect::TXN_MEMCHECK,
    connect::TXN_PING,
    connect::TXN_GOODBYE,
    "AsyncMessageEvent",
    "NotifyAssociationUpdate",
    "AsyncPresenceStatusEvent",
    "Status",
];

/// Transactions that establish an identity and therefore run without one.
/// Everything on the connect service is implicitly exempt as well.
const AUTH_EXEMPT: &[&str] = &[
    "NuLogin",
    "NuAddAccount",
    "GetCountryList",
    "NuGetTos",
    "NuEntitleGame",
];

pub struct PlasmaTransactor {
    session: Arc<PlasmaSession>,
    registry: Arc<ServiceRegistry>,
    state: ConnectionState,
    tid: u32,
    pending_chunks: Vec<Packet>,
    outbound: mpsc::UnboundedSender<Vec<u8>>,
}

impl PlasmaTransactor {
    pub fn new(
        session: Arc<PlasmaSession>,
        registry: Arc<ServiceRegistry>,
        outbound: mpsc::UnboundedSender<Vec<u8>>,
    ) -> Self {
        Self {
            session,
            registry,
            state: ConnectionState::new(),
            tid: 0,
            pending_chunks: Vec::new(),
            outbound,
        }
    }

    pub fn state(&self) -> &ConnectionState {
        &self.state
    }

    pub fn tid(&self) -> u32 {
        self.tid
    }

    /// Entry point for one raw transport frame.
    pub async fn receive(&mut self, bytes: &[u8]) {
        match Packet::decode(bytes) {
            Ok(message) => {
                debug!(%message, "<-");
                self.finish(message).await;
            }
            Err(error @ PacketParseError::MalformedHeader { .. }) => {
                warn!(%error, "dropping unparseable frame");
            }
            Err(error) => {
                warn!(%error, "dropping malformed packet");
            }
        }
    }

    /// Finishes a transaction the client started.
    pub async fn finish(&mut self, message: Packet) {
        let registry = Arc::clone(&self.registry);
        if !registry.contains(message.service) {
            error!(service = %message.service, "invalid transaction service");
            return;
        }

        let Some(kind) = TransactionKind::from_tag(message.kind & TAG_MASK) else {
            error!(
                kind = %format_args!("0x{:08x}", message.kind & TAG_MASK),
                "invalid transaction kind"
            );
            return;
        };
        let message_tid = message.kind & TID_MASK;

        if kind == TransactionKind::Initial {
            // The first transaction fixes the connection's tid baseline.
            self.tid = message_tid;
        }

        let mut scheduled = true;
        if message_tid != self.tid {
            if kind == TransactionKind::Simple && message_tid == 0 {
                // tid-0 simple packets answer our own pushes; only the
                // allow-listed transactions may arrive this way.
                let txn = message.txn().unwrap_or("");
                if !UNSCHEDULED_ALLOWED.contains(&txn) {
                    error!(txn, "unscheduled transaction not allowed");
                    return;
                }
                scheduled = false;
            } else {
                error!(
                    expected = self.tid,
                    got = message_tid,
                    "transaction id mismatch, ignoring message"
                );
                return;
            }
        }

        if !self.state.initialized
            && (kind != TransactionKind::Initial || message.service != connect::CODE)
        {
            self.send_error(&message, kind, TransactionError::new(ErrorCode::NotInitialized));
            return;
        }

        match kind {
            TransactionKind::Initial | TransactionKind::Simple => {
                self.dispatch(&message, kind, scheduled).await;
            }
            TransactionKind::Chunked => {
                if let Some(reassembled) = self.absorb_chunk(message) {
                    self.dispatch(&reassembled, TransactionKind::Simple, scheduled)
                        .await;
                }
            }
            TransactionKind::ChunkedResponse => {
                error!("client sent a chunked-response frame, dropping");
            }
        }
    }

    /// Starts an unscheduled (server-initiated) transaction on this
    /// connection: keepalive ticks, router deliveries, self-pushes. Encoded
    /// with tid 0; the sequencing counter is never touched.
    pub async fn start_unscheduled(&mut self, service: &str, txn: &str, body: ValueMap) {
        if !UNSCHEDULED_ALLOWED.contains(&txn) {
            error!(txn, "transaction not allowed to be unscheduled");
            return;
        }
        let Ok(code) = ServiceCode::try_from(service) else {
            error!(service, "unscheduled transaction for invalid service");
            return;
        };
        let registry = Arc::clone(&self.registry);
        let Some(handlers) = registry.service(code) else {
            error!(service, "unscheduled transaction for unknown service");
            return;
        };
        let Some(creator) = handlers.create(txn) else {
            error!(service, txn, "no creator for unscheduled transaction");
            return;
        };

        let session = Arc::clone(&self.session);
        let input = Packet::with_body(code, TransactionKind::Simple.tag(), body);
        let outcome = creator(Context {
            session: &session,
            state: &mut self.state,
            data: &input,
        })
        .await;

        match outcome {
            Ok(Outcome::Response(body)) => {
                let mut response = Packet::with_body(code, TransactionKind::Simple.tag(), body);
                response.set("TXN", txn);
                self.send_packet(response, 0);
            }
            Ok(Outcome::Skip) => {}
            Err(error) => {
                warn!(service, txn, code = error.code.code(), "unscheduled transaction failed");
                let mut response = Packet::new(code, TransactionKind::Simple.tag());
                response.set("TXN", txn);
                response.set("errorCode", error.code.code());
                response.set("localizedMessage", error.code.localized_message());
                response.set("errorContainer", error.container);
                self.send_packet(response, 0);
            }
        }
    }

    /// Turns a router delivery into an unscheduled transaction.
    pub async fn handle_push(&mut self, event: PushEvent) {
        self.start_unscheduled(&event.service, &event.txn, event.body).await;
    }

    /// Releases this connection's shared-state footprint. The worker calls
    /// this once, after the transport is gone: live presence entries are
    /// demoted to the grace window instead of deleted, so a prompt reconnect
    /// finds its session context intact.
    pub fn on_disconnect(&self) {
        let grace = self.session.settings.presence_grace;
        if let Some(account) = &self.state.account {
            self.session.directory.begin_grace(
                &account_identity(account.id),
                self.session.connection_id,
                grace,
            );
        }
        if let Some(persona) = &self.state.persona {
            self.session.directory.begin_grace(
                &persona_identity(persona.id),
                self.session.connection_id,
                grace,
            );
        }
    }

    async fn dispatch(&mut self, message: &Packet, kind: TransactionKind, scheduled: bool) {
        let registry = Arc::clone(&self.registry);
        let Some(handlers) = registry.service(message.service) else {
            return;
        };
        let txn = message.txn().unwrap_or("").to_string();

        let outcome = if self.requires_authentication(message.service, &txn)
            && self.state.account.is_none()
        {
            Err(TransactionError::new(ErrorCode::SessionNotAuthorized))
        } else {
            match handlers.resolve(&txn) {
                Some(handler) => {
                    let session = Arc::clone(&self.session);
                    handler(Context {
                        session: &session,
                        state: &mut self.state,
                        data: message,
                    })
                    .await
                }
                None => {
                    error!(service = %message.service, %txn, "no resolver for transaction");
                    Err(TransactionError::new(ErrorCode::SystemError))
                }
            }
        };

        match outcome {
            Ok(Outcome::Skip) => {}
            Ok(Outcome::Response(body)) => {
                self.send_response(message, body);
                if scheduled {
                    // Only a successful scheduled completion advances the
                    // sequence; errors leave the tid where it was so the
                    // client can retry under the same number.
                    self.tid = (self.tid + 1) & TID_MASK;
                }
            }
            Err(error) => {
                warn!(
                    service = %message.service,
                    %txn,
                    code = error.code.code(),
                    "transaction failed"
                );
                self.send_error(message, kind, error);
            }
        }
    }

    fn requires_authentication(&self, service: ServiceCode, txn: &str) -> bool {
        service != connect::CODE && !AUTH_EXEMPT.contains(&txn)
    }

    /// Buffers one chunk; returns the reassembled message once the declared
    /// encoded size is reached. Anything inconsistent drops the whole buffer
    /// — the client must restart the transaction from a clean slate.
    fn absorb_chunk(&mut self, message: Packet) -> Option<Packet> {
        let declared = message.get_int("size").unwrap_or(-1);
        if declared < 0 {
            warn!("chunked frame without a size field, dropping buffer");
            self.pending_chunks.clear();
            return None;
        }
        let service = message.service;
        let kind_word = message.kind;
        self.pending_chunks.push(message);

        let received: usize = self
            .pending_chunks
            .iter()
            .map(|chunk| chunk.get_str("data").map_or(0, str::len))
            .sum();
        if received < declared as usize {
            return None;
        }
        if received > declared as usize {
            warn!(
                declared,
                received, "chunk reassembly overran declared size, dropping buffer"
            );
            self.pending_chunks.clear();
            return None;
        }

        let mut encoded = String::with_capacity(received);
        for chunk in self.pending_chunks.drain(..) {
            if let Some(data) = chunk.get_str("data") {
                encoded.push_str(data);
            }
        }

        let decoded = match BASE64.decode(encoded.as_bytes()) {
            Ok(decoded) => decoded,
            Err(error) => {
                warn!(%error, "reassembled chunk payload is not valid base64");
                return None;
            }
        };
        match Packet::decode_body(service, kind_word, &decoded) {
            Ok(reassembled) => Some(reassembled),
            Err(error) => {
                warn!(%error, "reassembled chunk payload failed to parse");
                None
            }
        }
    }

    fn send_response(&mut self, message: &Packet, body: ValueMap) {
        let mut response =
            Packet::with_body(message.service, TransactionKind::Simple.tag(), body);
        response.set("TXN", message.txn().unwrap_or(""));

        let encoded = response.encode();
        let fragment_size = self.state.fragment_size;
        if fragment_size > 0 && encoded.len() > fragment_size as usize {
            self.send_fragmented(message.service, &encoded, fragment_size as usize);
        } else {
            self.send_packet(response, self.tid);
        }
    }

    /// Splits an oversized response into chunked-response frames: header
    /// stripped, body base64-encoded, sliced to the negotiated size. Every
    /// fragment reuses the response's tid.
    fn send_fragmented(&mut self, service: ServiceCode, encoded: &[u8], fragment_size: usize) {
        let body = &encoded[HEADER_LENGTH..];
        let decoded_size = body.len();
        let encoded_text = BASE64.encode(body);
        let encoded_size = encoded_text.len();

        for slice in encoded_text.as_bytes().chunks(fragment_size) {
            let mut fragment =
                Packet::new(service, TransactionKind::ChunkedResponse.tag());
            fragment.set("data", String::from_utf8_lossy(slice).into_owned());
            fragment.set("decodedSize", decoded_size);
            fragment.set("size", encoded_size);
            self.send_packet(fragment, self.tid);
        }
    }

    fn send_error(&mut self, message: &Packet, kind: TransactionKind, error: TransactionError) {
        let mut response = Packet::new(message.service, TransactionKind::Simple.tag());
        response.set("TXN", message.txn().unwrap_or(""));
        if kind == TransactionKind::Initial {
            response.kind = INITIAL_ERROR;
            response.set("TID", self.tid);
        }
        response.set("errorCode", error.code.code());
        response.set("localizedMessage", error.code.localized_message());
        response.set("errorContainer", error.container);
        self.send_packet(response, self.tid);
    }

    fn send_packet(&mut self, mut packet: Packet, tid: u32) {
        if packet.kind != INITIAL_ERROR {
            packet.kind = (packet.kind & TAG_MASK) | (tid & TID_MASK);
        }
        debug!(%packet, "->");
        // A closed transport just means the connection is going away; the
        // worker notices on its own.
        let _ = self.outbound.send(packet.encode());
    }
}
