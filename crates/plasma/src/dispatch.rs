//! Static service dispatcher.
//!
//! Each service is a pair of lookup tables built once at startup: `resolve`
//! maps client-originated transaction names to handlers, `create` maps
//! server-initiated ones (keepalive, pushes). Handlers are plain functions
//! returning a boxed future over the per-call [`Context`] — no trait
//! objects, no runtime registration, nothing mutated after construction.

use std::collections::HashMap;

use futures::future::BoxFuture;

use packet::{Packet, ServiceCode};

use crate::error::HandlerResult;
use crate::session::{ConnectionState, PlasmaSession};

/// Everything a handler may touch for one transaction.
pub struct Context<'a> {
    /// Shared connection context (directory, stores, settings).
    pub session: &'a PlasmaSession,
    /// The connection's mutable record; exclusive to this worker.
    pub state: &'a mut ConnectionState,
    /// The inbound (or creator-input) packet.
    pub data: &'a Packet,
}

pub type HandlerFuture<'a> = BoxFuture<'a, HandlerResult>;

/// A transaction handler: a plain function so the tables stay `'static`.
pub type HandlerFn = for<'a> fn(Context<'a>) -> HandlerFuture<'a>;

/// One service's resolve/create tables.
pub struct ServiceHandlers {
    code: ServiceCode,
    resolvers: HashMap<&'static str, HandlerFn>,
    creators: HashMap<&'static str, HandlerFn>,
}

impl ServiceHandlers {
    pub fn new(code: ServiceCode) -> Self {
        Self {
            code,
            resolvers: HashMap::new(),
            creators: HashMap::new(),
        }
    }

    pub fn resolver(mut self, txn: &'static str, handler: HandlerFn) -> Self {
        self.resolvers.insert(txn, handler);
        self
    }

    pub fn creator(mut self, txn: &'static str, handler: HandlerFn) -> Self {
        self.creators.insert(txn, handler);
        self
    }

    pub fn code(&self) -> ServiceCode {
        self.code
    }

    /// Looks up the handler for a client-originated transaction.
    pub fn resolve(&self, txn: &str) -> Option<HandlerFn> {
        self.resolvers.get(txn).copied()
    }

    /// Looks up the handler for a server-initiated transaction.
    pub fn create(&self, txn: &str) -> Option<HandlerFn> {
        self.creators.get(txn).copied()
    }
}

/// All services of the session protocol, keyed by service code.
#[derive(Default)]
pub struct ServiceRegistry {
    services: HashMap<ServiceCode, ServiceHandlers>,
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(mut self, handlers: ServiceHandlers) -> Self {
        self.services.insert(handlers.code(), handlers);
        self
    }

    pub fn service(&self, code: ServiceCode) -> Option<&ServiceHandlers> {
        self.services.get(&code)
    }

    pub fn contains(&self, code: ServiceCode) -> bool {
        self.services.contains_key(&code)
    }
}
