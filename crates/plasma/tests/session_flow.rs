//! End-to-end exercises of the session-protocol state machine: handshake,
//! sequencing, gating, duplicate-login eviction, chunk reassembly, and
//! response fragmentation — all against the real dispatcher and in-memory
//! stores, with the transport replaced by channels.

use std::sync::Arc;

use tokio::sync::mpsc;

use directory::{ConnectionHandle, PresenceDirectory, PushEvent, Router, SequenceCounter};
use packet::{Packet, ServiceCode, Value, ValueMap};
use plasma::kind::{pack, TransactionKind, INITIAL_ERROR, TAG_MASK, TID_MASK};
use plasma::services::{connect, standard_registry};
use plasma::{
    AccountStore, MemoryAccountStore, PlasmaSession, PlasmaTransactor, ServiceRegistry,
    SessionSettings,
};

const FSYS: ServiceCode = ServiceCode::new(*b"fsys");
const ACCT: ServiceCode = ServiceCode::new(*b"acct");
const PNOW: ServiceCode = ServiceCode::new(*b"pnow");

struct World {
    directory: Arc<PresenceDirectory>,
    router: Arc<Router>,
    accounts: Arc<MemoryAccountStore>,
    counters: Arc<SequenceCounter>,
    registry: Arc<ServiceRegistry>,
}

impl World {
    fn new() -> Self {
        let directory = Arc::new(PresenceDirectory::new());
        let router = Arc::new(Router::new(directory.clone()));
        Self {
            directory,
            router,
            accounts: Arc::new(MemoryAccountStore::new()),
            counters: Arc::new(SequenceCounter::new()),
            registry: Arc::new(standard_registry()),
        }
    }

    fn connect(&self, connection_id: u64) -> Client {
        let (push_tx, push_rx) = mpsc::unbounded_channel();
        let (frame_tx, frame_rx) = mpsc::unbounded_channel();
        let session = Arc::new(PlasmaSession {
            connection_id,
            handle: ConnectionHandle::new(connection_id, push_tx),
            directory: self.directory.clone(),
            router: self.router.clone(),
            accounts: self.accounts.clone(),
            counters: self.counters.clone(),
            settings: SessionSettings::default(),
        });
        Client {
            transactor: PlasmaTransactor::new(session, self.registry.clone(), frame_tx),
            frames: frame_rx,
            pushes: push_rx,
        }
    }
}

struct Client {
    transactor: PlasmaTransactor,
    frames: mpsc::UnboundedReceiver<Vec<u8>>,
    pushes: mpsc::UnboundedReceiver<PushEvent>,
}

impl Client {
    fn drain(&mut self) -> Vec<Packet> {
        std::iter::from_fn(|| self.frames.try_recv().ok())
            .map(|bytes| Packet::decode(&bytes).expect("server frame decodes"))
            .collect()
    }

    async fn hello(&mut self, tid: u32, fragment_size: i64) -> Vec<Packet> {
        let mut hello = Packet::new(FSYS, pack(TransactionKind::Initial, tid));
        hello.set("TXN", connect::TXN_HELLO);
        hello.set("clientString", "bfbc2-pc");
        hello.set("clientType", "");
        hello.set("fragmentSize", fragment_size);
        self.transactor.finish(hello).await;
        self.drain()
    }

    async fn login(&mut self, tid: u32, nuid: &str, password: &str) -> Vec<Packet> {
        let mut login = Packet::new(ACCT, pack(TransactionKind::Simple, tid));
        login.set("TXN", "NuLogin");
        login.set("nuid", nuid);
        login.set("password", password);
        self.transactor.finish(login).await;
        self.drain()
    }
}

fn simple(service: ServiceCode, tid: u32, txn: &str) -> Packet {
    let mut packet = Packet::new(service, pack(TransactionKind::Simple, tid));
    packet.set("TXN", txn);
    packet
}

#[tokio::test]
async fn handshake_sets_the_tid_baseline() {
    let world = World::new();
    let mut client = world.connect(1);

    let frames = client.hello(1, -1).await;
    assert_eq!(frames.len(), 1);
    let response = &frames[0];
    assert_eq!(response.kind & TAG_MASK, TransactionKind::Simple.tag());
    assert_eq!(response.kind & TID_MASK, 1);
    assert_eq!(response.txn(), Some("Hello"));
    assert!(response.get_str("theaterIp").is_some());
    assert!(response.get_int("theaterPort").is_some());
    assert_eq!(client.transactor.tid(), 2);
}

#[tokio::test]
async fn traffic_before_hello_is_not_initialized() {
    let world = World::new();
    let mut client = world.connect(1);

    let mut probe = simple(FSYS, 0, connect::TXN_GET_PING_SITES);
    probe.set("extra", "field");
    client.transactor.finish(probe).await;

    let frames = client.drain();
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0].get_int("errorCode"), Some(22));
    assert_eq!(client.transactor.tid(), 0);
}

#[tokio::test]
async fn initial_failures_use_the_initial_error_kind() {
    let world = World::new();
    let mut client = world.connect(1);

    // An Initial packet aimed at the wrong service cannot initialize.
    let mut bad = Packet::new(ACCT, pack(TransactionKind::Initial, 1));
    bad.set("TXN", "NuLogin");
    client.transactor.finish(bad).await;

    let frames = client.drain();
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0].kind, INITIAL_ERROR);
    assert_eq!(frames[0].get_int("TID"), Some(1));
    assert_eq!(frames[0].get_int("errorCode"), Some(22));
}

#[tokio::test]
async fn authenticated_transactions_are_gated_and_do_not_advance_the_tid() {
    let world = World::new();
    world.accounts.create_account("u@example.com", "pw").await.unwrap();
    let mut client = world.connect(1);
    client.hello(1, -1).await;

    let frames = {
        client.transactor.finish(simple(ACCT, 2, "NuGetPersonas")).await;
        client.drain()
    };
    assert_eq!(frames[0].get_int("errorCode"), Some(20));
    assert_eq!(client.transactor.tid(), 2, "rejection must not advance the tid");

    // The retry under the same tid succeeds once logged in.
    let frames = client.login(2, "u@example.com", "pw").await;
    assert_eq!(frames[0].txn(), Some("NuLogin"));
    assert!(frames[0].get_str("lkey").is_some());
    assert_eq!(client.transactor.tid(), 3);

    assert!(world.directory.lookup("plasma:account:1").is_some());
}

#[tokio::test]
async fn out_of_sequence_messages_are_dropped_without_state_change() {
    let world = World::new();
    let mut client = world.connect(1);
    client.hello(1, -1).await;

    client
        .transactor
        .finish(simple(FSYS, 7, connect::TXN_GET_PING_SITES))
        .await;
    assert!(client.drain().is_empty());
    assert_eq!(client.transactor.tid(), 2);

    // The in-sequence message still goes through afterwards.
    client
        .transactor
        .finish(simple(FSYS, 2, connect::TXN_GET_PING_SITES))
        .await;
    let frames = client.drain();
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0].txn(), Some("GetPingSites"));
}

#[tokio::test]
async fn unknown_transactions_answer_with_system_error() {
    let world = World::new();
    let mut client = world.connect(1);
    client.hello(1, -1).await;

    client
        .transactor
        .finish(simple(FSYS, 2, "NoSuchTransaction"))
        .await;
    let frames = client.drain();
    assert_eq!(frames[0].get_int("errorCode"), Some(99));
}

#[tokio::test]
async fn duplicate_login_supersedes_the_first_connection() {
    let world = World::new();
    world.accounts.create_account("u@example.com", "pw").await.unwrap();

    let mut first = world.connect(1);
    first.hello(1, -1).await;
    first.login(2, "u@example.com", "pw").await;

    let mut second = world.connect(2);
    second.hello(1, -1).await;
    second.login(2, "u@example.com", "pw").await;

    // Exactly one teardown notice lands on the first connection's worker.
    let event = first.pushes.try_recv().expect("superseded push");
    assert_eq!(event.txn, "Goodbye");
    assert!(first.pushes.try_recv().is_err());

    // The worker turns it into an unscheduled tid-0 packet.
    first.transactor.handle_push(event).await;
    let frames = first.drain();
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0].kind & TID_MASK, 0);
    assert_eq!(frames[0].txn(), Some("Goodbye"));
    assert_eq!(frames[0].get_str("reason"), Some("CONFLICTING_SESSION"));

    // The directory now resolves the identity to the second connection.
    let handle = world.directory.lookup("plasma:account:1").expect("registered");
    assert_eq!(handle.connection_id(), 2);
}

#[tokio::test]
async fn chunked_requests_reassemble_into_one_transaction() {
    use base64::engine::general_purpose::STANDARD as BASE64;
    use base64::Engine;

    let world = World::new();
    let mut client = world.connect(1);
    client.hello(1, -1).await;

    let mut inner = Packet::new(FSYS, 0);
    inner.set("TXN", connect::TXN_GET_PING_SITES);
    let encoded = BASE64.encode(inner.encode_body());

    let (head, tail) = encoded.split_at(encoded.len() / 2);
    for (index, part) in [head, tail].into_iter().enumerate() {
        let mut chunk = Packet::new(FSYS, pack(TransactionKind::Chunked, 2));
        chunk.set("data", part);
        chunk.set("size", encoded.len());
        client.transactor.finish(chunk).await;

        if index == 0 {
            assert!(client.drain().is_empty(), "no response until the final chunk");
        }
    }

    let frames = client.drain();
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0].txn(), Some("GetPingSites"));
    assert!(frames[0].get_path("pingSite.0.name").is_some());
    assert_eq!(client.transactor.tid(), 3);
}

#[tokio::test]
async fn oversized_responses_fragment_and_reconstruct() {
    use base64::engine::general_purpose::STANDARD as BASE64;
    use base64::Engine;

    let world = World::new();
    let mut client = world.connect(1);
    client.hello(1, 64).await;

    client
        .transactor
        .finish(simple(FSYS, 2, connect::TXN_GET_PING_SITES))
        .await;
    let fragments = client.drain();
    assert!(fragments.len() > 1, "response must have been split");

    let mut data = String::new();
    for fragment in &fragments {
        assert_eq!(fragment.kind & TAG_MASK, TransactionKind::ChunkedResponse.tag());
        assert_eq!(fragment.kind & TID_MASK, 2);
        let piece = fragment.get_str("data").expect("fragment data");
        assert!(piece.len() <= 64);
        data.push_str(piece);
    }

    let declared_encoded = fragments[0].get_int("size").unwrap();
    let declared_decoded = fragments[0].get_int("decodedSize").unwrap();
    assert_eq!(declared_encoded as usize, data.len());

    let body = BASE64.decode(data.as_bytes()).expect("valid base64");
    assert_eq!(declared_decoded as usize, body.len());

    let rebuilt = Packet::decode_body(FSYS, TransactionKind::Simple.tag(), &body)
        .expect("reassembled body parses");
    assert_eq!(rebuilt.txn(), Some("GetPingSites"));
    assert_eq!(
        rebuilt.get_path("pingSite.0.name").and_then(Value::as_str),
        Some("nrt")
    );
}

#[tokio::test]
async fn keepalive_roundtrip_never_touches_the_sequence() {
    let world = World::new();
    let mut client = world.connect(1);
    client.hello(1, -1).await;

    client
        .transactor
        .start_unscheduled("fsys", "MemCheck", ValueMap::new())
        .await;
    let frames = client.drain();
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0].kind & TID_MASK, 0);
    assert_eq!(frames[0].get_str("salt").map(str::len), Some(10));

    // The client's tid-0 reply is allow-listed and produces no response.
    client.transactor.finish(simple(FSYS, 0, "MemCheck")).await;
    assert!(client.drain().is_empty());
    assert_eq!(client.transactor.tid(), 2);
}

#[tokio::test]
async fn matchmaking_status_arrives_as_a_self_push() {
    let world = World::new();
    world.accounts.create_account("u@example.com", "pw").await.unwrap();
    let mut client = world.connect(1);
    client.hello(1, -1).await;
    client.login(2, "u@example.com", "pw").await;

    client.transactor.finish(simple(PNOW, 3, "Start")).await;
    let frames = client.drain();
    assert_eq!(frames[0].txn(), Some("Start"));
    assert_eq!(frames[0].get_path("id.id").and_then(Value::as_int), Some(1));

    let push = client.pushes.try_recv().expect("status self-push");
    assert_eq!(push.txn, "Status");
    client.transactor.handle_push(push).await;

    let frames = client.drain();
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0].kind & TID_MASK, 0);
    assert_eq!(frames[0].get_str("sessionState"), Some("COMPLETE"));
}
