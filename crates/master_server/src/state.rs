//! Process-wide shared state.
//!
//! Built once at startup and handed to every connection worker as an `Arc`.
//! The handler tables are resolved here, exactly once; nothing in them is
//! mutated afterwards.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use directory::{AdmissionQueues, PresenceDirectory, Router, SequenceCounter};
use plasma::services::standard_registry;
use plasma::{AccountStore, MemoryAccountStore, ServiceRegistry};
use theater::transactions::handler_table;
use theater::transactor::HandlerFn;
use theater::{GameStore, MemoryGameStore};

use crate::config::ServerConfig;

pub struct SharedState {
    pub config: ServerConfig,
    pub directory: Arc<PresenceDirectory>,
    pub router: Arc<Router>,
    pub accounts: Arc<dyn AccountStore>,
    pub games: Arc<dyn GameStore>,
    pub queues: Arc<AdmissionQueues>,
    pub counters: Arc<SequenceCounter>,
    pub plasma_registry: Arc<ServiceRegistry>,
    pub theater_handlers: Arc<HashMap<&'static str, HandlerFn>>,
    next_connection_id: AtomicU64,
    /// Live connections per service, for the max_connections cap.
    pub plasma_connections: AtomicUsize,
    pub theater_connections: AtomicUsize,
}

impl SharedState {
    pub fn new(config: ServerConfig) -> Arc<Self> {
        Self::with_stores(
            config,
            Arc::new(MemoryAccountStore::new()),
            Arc::new(MemoryGameStore::new()),
        )
    }

    /// Constructor for deployments (or tests) bringing their own
    /// persistence collaborators.
    pub fn with_stores(
        config: ServerConfig,
        accounts: Arc<dyn AccountStore>,
        games: Arc<dyn GameStore>,
    ) -> Arc<Self> {
        let directory = Arc::new(PresenceDirectory::new());
        let router = Arc::new(Router::new(directory.clone()));
        Arc::new(Self {
            config,
            directory,
            router,
            accounts,
            games,
            queues: Arc::new(AdmissionQueues::new()),
            counters: Arc::new(SequenceCounter::new()),
            plasma_registry: Arc::new(standard_registry()),
            theater_handlers: Arc::new(handler_table()),
            next_connection_id: AtomicU64::new(0),
            plasma_connections: AtomicUsize::new(0),
            theater_connections: AtomicUsize::new(0),
        })
    }

    pub fn next_connection_id(&self) -> u64 {
        self.next_connection_id.fetch_add(1, Ordering::Relaxed) + 1
    }
}
