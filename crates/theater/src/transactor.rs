//! The game-hosting transactor: one per connection.
//!
//! The state machine is simpler than the session protocol's — no chunking,
//! no auth gate — but the response model is richer: handlers stream zero or
//! more packets through a [`ResponseSink`], each sent before the next is
//! produced, and the bracket/batch flag lets a game server burst several
//! same-tid updates.

use std::collections::HashMap;
use std::sync::Arc;

use futures::future::BoxFuture;
use tokio::sync::mpsc;
use tracing::{debug, error, warn};

use directory::PushEvent;
use packet::{Packet, ServiceCode, ValueMap};

use crate::session::{host_identity, theater_identity, TheaterSession, TheaterState};
use crate::transactions::{self, codes};
use crate::TheaterError;

/// Kind word on client requests.
pub const KIND_REQUEST: u32 = 0x4000_0000;
/// Kind word on server responses and pushes.
pub const KIND_RESPONSE: u32 = 0x0000_0000;

/// Where a handler streams its response packets.
///
/// Every `send` goes straight to the transport queue — a handler iterating
/// a large game list never holds more than the packet it is building. The
/// sink stamps the envelope: response kind, the request's code (or an
/// explicit one for data packets like `GDAT`/`EGEG`), and the tid when the
/// transaction is sequenced.
pub struct ResponseSink<'a> {
    service: ServiceCode,
    tid: Option<u32>,
    outbound: &'a mpsc::UnboundedSender<Vec<u8>>,
}

impl ResponseSink<'_> {
    /// Sends a packet under the request's own code.
    pub fn send(&self, body: ValueMap) {
        self.send_as(self.service, body);
    }

    /// Sends a packet under a different code (`LDAT`, `GDAT`, `GDET`,
    /// `EGEG`, `KICK`).
    pub fn send_as(&self, service: ServiceCode, body: ValueMap) {
        let mut packet = Packet::with_body(service, KIND_RESPONSE, body);
        if let Some(tid) = self.tid {
            packet.set("TID", tid);
        }
        debug!(%packet, "->");
        let _ = self.outbound.send(packet.encode());
    }
}

/// Everything a handler may touch for one transaction.
pub struct TheaterContext<'a> {
    pub session: &'a TheaterSession,
    pub state: &'a mut TheaterState,
    pub message: &'a Packet,
    pub sink: &'a ResponseSink<'a>,
}

pub type HandlerFuture<'a> = BoxFuture<'a, Result<(), TheaterError>>;
pub type HandlerFn = for<'a> fn(TheaterContext<'a>) -> HandlerFuture<'a>;

pub struct TheaterTransactor {
    session: Arc<TheaterSession>,
    handlers: Arc<HashMap<&'static str, HandlerFn>>,
    state: TheaterState,
    tid: u32,
    outbound: mpsc::UnboundedSender<Vec<u8>>,
}

impl TheaterTransactor {
    pub fn new(
        session: Arc<TheaterSession>,
        handlers: Arc<HashMap<&'static str, HandlerFn>>,
        outbound: mpsc::UnboundedSender<Vec<u8>>,
    ) -> Self {
        Self {
            session,
            handlers,
            state: TheaterState::default(),
            tid: 0,
            outbound,
        }
    }

    pub fn state(&self) -> &TheaterState {
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
            Err(error) => warn!(%error, "dropping unparseable frame"),
        }
    }

    /// Finishes a transaction the client started.
    pub async fn finish(&mut self, message: Packet) {
        let handlers = Arc::clone(&self.handlers);
        let code = message.service;
        let Some(handler) = handlers.get(code.as_str()).copied() else {
            error!(code = %code, "unknown transaction code, dropping");
            return;
        };

        // ECHO is a connectivity probe: answered immediately, before any
        // init or sequencing concerns, with the tid echoed from the body.
        if code.as_str() == codes::ECHO {
            self.run(handler, &message, None).await;
            return;
        }

        // PING bypasses sequencing entirely and always answers tid 0.
        if code.as_str() == codes::PING {
            self.run(handler, &message, Some(0)).await;
            return;
        }

        let message_tid = message.get_int("TID").unwrap_or(0) as u32;

        if !self.state.initialized {
            if code.as_str() == codes::CONN {
                // The first transaction fixes the tid baseline.
                self.tid = message_tid;
            } else {
                error!(code = %code, "client sent transaction before CONN, ignoring");
                return;
            }
        }

        if message_tid != self.tid {
            if self.state.currently_batching && code.as_str() == codes::UBRA {
                // The bracket closer lands one tid ahead of the stalled
                // counter; resync instead of dropping it.
                self.tid += 1;
            } else {
                error!(
                    expected = self.tid,
                    got = message_tid,
                    "transaction id mismatch, ignoring message"
                );
                return;
            }
        }

        self.run(handler, &message, Some(self.tid)).await;

        if !self.state.currently_batching {
            self.tid += 1;
        }
    }

    async fn run(&mut self, handler: HandlerFn, message: &Packet, tid: Option<u32>) {
        let sink = ResponseSink {
            service: message.service,
            tid,
            outbound: &self.outbound,
        };
        let session = Arc::clone(&self.session);
        let result = handler(TheaterContext {
            session: &session,
            state: &mut self.state,
            message,
            sink: &sink,
        })
        .await;
        if let Err(error) = result {
            warn!(code = %message.service, %error, "transaction failed, no response sent");
        }
    }

    /// Emits a router delivery (`EGRQ`, `EGEG`, `QLEN`, `KICK`) as an
    /// unsequenced server-initiated packet.
    pub fn handle_push(&self, event: PushEvent) {
        let Ok(service) = ServiceCode::try_from(event.service.as_str()) else {
            warn!(service = %event.service, "push with invalid message code, dropping");
            return;
        };
        let packet = Packet::with_body(service, KIND_RESPONSE, event.body);
        debug!(%packet, "->");
        let _ = self.outbound.send(packet.encode());
    }

    /// Releases this connection's shared-state footprint: its queue slot,
    /// any hosted game (with its whole queue), and the persona's presence
    /// entry (demoted to the grace window).
    pub async fn on_disconnect(&mut self) {
        if let Some((lid, gid)) = self.state.queued_game.take() {
            if let Some(persona) = &self.state.persona {
                if self.session.queues.dequeue(gid, persona.id) {
                    transactions::entry::notify_queue_positions(&self.session, lid, gid);
                }
            }
        }
        if let Some((lid, gid)) = self.state.hosted_game.take() {
            let dropped = self.session.queues.drop_queue(gid);
            if !dropped.is_empty() {
                debug!(gid, waiters = dropped.len(), "dropping admission queue with host");
            }
            self.session.games.remove_game(lid, gid).await;
            self.session.directory.unregister(&host_identity(gid));
        }
        if let Some(persona) = &self.state.persona {
            self.session.directory.begin_grace(
                &theater_identity(persona.id),
                self.session.connection_id,
                self.session.presence_grace,
            );
        }
    }
}
