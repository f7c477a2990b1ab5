//! End-to-end exercises of the game-hosting state machine: handshake,
//! streaming lists, bracket batching, the keepalive exceptions, and the
//! enter-game/admission-queue flows across several connections.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use directory::{
    AdmissionQueues, ConnectionHandle, PresenceDirectory, PushEvent, Router, SequenceCounter,
};
use packet::{Packet, ServiceCode, Value};
use plasma::{AccountStore, MemoryAccountStore, Persona};
use theater::transactions::handler_table;
use theater::{
    theater_identity, GameStore, MemoryGameStore, TheaterSession, TheaterTransactor, KIND_REQUEST,
};

struct World {
    directory: Arc<PresenceDirectory>,
    router: Arc<Router>,
    accounts: Arc<MemoryAccountStore>,
    games: Arc<MemoryGameStore>,
    queues: Arc<AdmissionQueues>,
    counters: Arc<SequenceCounter>,
    handlers: Arc<std::collections::HashMap<&'static str, theater::transactor::HandlerFn>>,
}

impl World {
    fn new() -> Self {
        let directory = Arc::new(PresenceDirectory::new());
        let router = Arc::new(Router::new(directory.clone()));
        Self {
            directory,
            router,
            accounts: Arc::new(MemoryAccountStore::new()),
            games: Arc::new(MemoryGameStore::new()),
            queues: Arc::new(AdmissionQueues::new()),
            counters: Arc::new(SequenceCounter::new()),
            handlers: Arc::new(handler_table()),
        }
    }

    fn connect(&self, connection_id: u64) -> Client {
        let (push_tx, push_rx) = mpsc::unbounded_channel();
        let (frame_tx, frame_rx) = mpsc::unbounded_channel();
        let session = Arc::new(TheaterSession {
            connection_id,
            peer: "203.0.113.5:19567".parse().expect("test addr"),
            handle: ConnectionHandle::new(connection_id, push_tx),
            directory: self.directory.clone(),
            router: self.router.clone(),
            accounts: self.accounts.clone(),
            games: self.games.clone(),
            queues: self.queues.clone(),
            counters: self.counters.clone(),
            presence_grace: Duration::from_secs(3600),
        });
        Client {
            transactor: TheaterTransactor::new(session, self.handlers.clone(), frame_tx),
            frames: frame_rx,
            pushes: push_rx,
        }
    }

    /// Creates an account + persona and returns the theater login key.
    async fn provision_persona(&self, name: &str) -> (Persona, String) {
        let account = self
            .accounts
            .create_account(&format!("{name}@example.com"), "pw")
            .await
            .expect("account");
        let persona = self.accounts.add_persona(account.id, name).await.expect("persona");
        let lkey = self.accounts.issue_session_key(&persona).await;
        (persona, lkey)
    }
}

struct Client {
    transactor: TheaterTransactor,
    frames: mpsc::UnboundedReceiver<Vec<u8>>,
    pushes: mpsc::UnboundedReceiver<PushEvent>,
}

impl Client {
    fn drain(&mut self) -> Vec<Packet> {
        std::iter::from_fn(|| self.frames.try_recv().ok())
            .map(|bytes| Packet::decode(&bytes).expect("server frame decodes"))
            .collect()
    }

    async fn send(&mut self, packet: Packet) -> Vec<Packet> {
        self.transactor.finish(packet).await;
        self.drain()
    }

    async fn conn(&mut self, tid: u32) -> Vec<Packet> {
        let mut conn = request("CONN", tid);
        conn.set("PROT", 2i64);
        conn.set("PROD", "bfbc2-pc");
        conn.set("VERS", "1.0");
        conn.set("PLAT", "PC");
        conn.set("LOCALE", "en_US");
        conn.set("SDKVERSION", "5.1.2.0.0");
        self.send(conn).await
    }

    async fn login(&mut self, tid: u32, lkey: &str) -> Vec<Packet> {
        let mut user = request("USER", tid);
        user.set("LKEY", lkey);
        user.set("CID", "");
        user.set("MAC", "$000000000000");
        self.send(user).await
    }

    /// CONN + USER + CGAM; returns the created game id.
    async fn host_game(&mut self, lkey: &str, max_players: u32) -> u64 {
        self.conn(1).await;
        self.login(2, lkey).await;

        let mut cgam = request("CGAM", 3);
        cgam.set("LID", -1i64);
        cgam.set("NAME", "\"test server\"");
        cgam.set("MAX-PLAYERS", max_players);
        cgam.set("INT-IP", "10.0.0.9");
        cgam.set("INT-PORT", 19567i64);
        cgam.set("PORT", 19567i64);
        cgam.set("JOIN", "O");
        cgam.set("UGID", "test-ugid");
        cgam.set("SECRET", "");
        cgam.set("B-U-Hardcore", 0i64);
        let frames = self.send(cgam).await;
        frames[0].get_int("GID").expect("created game id") as u64
    }
}

fn request(code: &str, tid: u32) -> Packet {
    let mut packet = Packet::new(
        ServiceCode::try_from(code).expect("valid code"),
        KIND_REQUEST,
    );
    packet.set("TID", tid);
    packet
}

#[tokio::test]
async fn echo_answers_before_connect() {
    let world = World::new();
    let mut client = world.connect(1);

    let mut echo = request("ECHO", 9);
    echo.set("TYPE", 1i64);
    let frames = client.send(echo).await;

    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0].get_str("TXN"), Some("ECHO"));
    assert_eq!(frames[0].get_str("IP"), Some("203.0.113.5"));
    assert_eq!(frames[0].get_int("TID"), Some(9));
    assert_eq!(client.transactor.tid(), 0, "echo never touches the sequence");

    // Anything else still requires CONN first.
    let frames = client.send(request("LLST", 1)).await;
    assert!(frames.is_empty());
}

#[tokio::test]
async fn connect_fixes_the_baseline_and_login_registers_presence() {
    let world = World::new();
    let (persona, lkey) = world.provision_persona("Soldier").await;
    let mut client = world.connect(1);

    let frames = client.conn(1).await;
    assert_eq!(frames[0].get_int("activityTimeoutSecs"), Some(240));
    assert_eq!(frames[0].get_int("PROT"), Some(2));
    assert_eq!(frames[0].get_int("TID"), Some(1));
    assert_eq!(client.transactor.tid(), 2);

    let frames = client.login(2, &lkey).await;
    assert_eq!(frames[0].get_str("NAME"), Some("Soldier"));
    assert!(world.directory.lookup(&theater_identity(persona.id)).is_some());
}

#[tokio::test]
async fn ping_is_accepted_under_any_tid_and_answers_zero() {
    let world = World::new();
    let mut client = world.connect(1);
    client.conn(1).await;

    let frames = client.send(request("PING", 99)).await;
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0].get_int("TID"), Some(0));
    assert_eq!(client.transactor.tid(), 2, "ping never advances the sequence");
}

#[tokio::test]
async fn game_list_streams_header_then_one_packet_per_game() {
    let world = World::new();
    let (_, host_key) = world.provision_persona("HostA").await;
    let mut host = world.connect(1);
    let gid = host.host_game(&host_key, 32).await;

    let (_, player_key) = world.provision_persona("Player").await;
    let mut player = world.connect(2);
    player.conn(1).await;
    player.login(2, &player_key).await;

    let mut glst = request("GLST", 3);
    glst.set("LID", 1i64);
    let frames = player.send(glst).await;

    assert_eq!(frames.len(), 2);
    assert_eq!(frames[0].service.as_str(), "GLST");
    assert_eq!(frames[0].get_int("NUM-GAMES"), Some(1));
    assert_eq!(frames[1].service.as_str(), "GDAT");
    assert_eq!(frames[1].get_int("GID"), Some(gid as i64));
    assert_eq!(frames[1].get_str("N"), Some("test server"));
    assert_eq!(frames[1].get_int("TID"), Some(3), "streamed packets carry the tid");
}

#[tokio::test]
async fn bracket_mode_accepts_repeated_tids_until_closed() {
    let world = World::new();
    let (_, host_key) = world.provision_persona("HostB").await;
    let mut host = world.connect(1);
    let gid = host.host_game(&host_key, 32).await;
    assert_eq!(host.transactor.tid(), 4);

    let mut open = request("UBRA", 4);
    open.set("START", 1i64);
    let frames = host.send(open).await;
    assert_eq!(frames.len(), 1);
    assert_eq!(host.transactor.tid(), 4, "bracket holds the sequence still");

    // Burst of same-tid updates; none produce a response.
    for level in ["levels/wake_island", "levels/panama_canal"] {
        let mut ugam = request("UGAM", 4);
        ugam.set("B-U-level", level);
        let frames = host.send(ugam).await;
        assert!(frames.is_empty());
    }

    // The closer lands one ahead of the stalled counter and resyncs it.
    let mut close = request("UBRA", 5);
    close.set("START", 0i64);
    let frames = host.send(close).await;
    assert_eq!(frames.len(), 1);
    assert_eq!(host.transactor.tid(), 6);

    let game = world.games.game(1, gid).await.expect("game");
    assert_eq!(
        game.attributes.get("B-U-level").and_then(Value::as_str),
        Some("levels/panama_canal")
    );
}

#[tokio::test]
async fn enter_game_with_a_free_slot_runs_the_handshake() {
    let world = World::new();
    let (_, host_key) = world.provision_persona("HostC").await;
    let mut host = world.connect(1);
    let gid = host.host_game(&host_key, 2).await;

    let (player_persona, player_key) = world.provision_persona("Joiner").await;
    let mut player = world.connect(2);
    player.conn(1).await;
    player.login(2, &player_key).await;

    let mut egam = request("EGAM", 3);
    egam.set("LID", 1i64);
    egam.set("GID", gid);
    egam.set("R-INT-IP", "10.0.0.20");
    egam.set("R-INT-PORT", 19567i64);
    egam.set("PORT", 19567i64);
    egam.set("PTYPE", "P");
    let frames = player.send(egam).await;

    // Ack plus the streamed enter-game notice.
    assert_eq!(frames.len(), 2);
    assert_eq!(frames[0].service.as_str(), "EGAM");
    assert_eq!(frames[1].service.as_str(), "EGEG");
    assert!(frames[1].get_int("TICKET").is_some());
    assert_eq!(frames[1].get_str("I"), Some("203.0.113.5"));

    // The host connection got the matching request.
    let push = host.pushes.try_recv().expect("host push");
    assert_eq!(push.service, "EGRQ");
    assert_eq!(push.body.get("NAME").and_then(Value::as_str), Some("Joiner"));
    assert_eq!(
        push.body.get("UID").and_then(Value::as_int),
        Some(player_persona.id as i64)
    );
    assert_eq!(
        push.body.get("TICKET"),
        frames[1].get("TICKET"),
        "host and player share the ticket"
    );

    // The worker relays the push as an unsequenced packet.
    host.transactor.handle_push(push);
    let frames = host.drain();
    assert_eq!(frames[0].service.as_str(), "EGRQ");
    assert!(frames[0].get("TID").is_none());
}

#[tokio::test]
async fn full_sessions_queue_fifo_and_advance_on_departure() {
    let world = World::new();
    let (_, host_key) = world.provision_persona("HostD").await;
    let mut host = world.connect(1);
    let gid = host.host_game(&host_key, 1).await;

    // Fill the single slot.
    let mut egrs = request("EGRS", 4);
    egrs.set("GID", gid);
    egrs.set("LID", 1i64);
    egrs.set("ALLOWED", 1i64);
    host.send(egrs).await;

    let (first_persona, first_key) = world.provision_persona("First").await;
    let mut first = world.connect(2);
    first.conn(1).await;
    first.login(2, &first_key).await;

    let (second_persona, second_key) = world.provision_persona("Second").await;
    let mut second = world.connect(3);
    second.conn(1).await;
    second.login(2, &second_key).await;

    for (client, tid) in [(&mut first, 3u32), (&mut second, 3u32)] {
        let mut egam = request("EGAM", tid);
        egam.set("LID", 1i64);
        egam.set("GID", gid);
        egam.set("PORT", 19567i64);
        let frames = client.send(egam).await;
        assert_eq!(frames.len(), 1, "full session only acks");
        assert_eq!(frames[0].service.as_str(), "EGAM");
    }

    // Both waiters got their initial position notice.
    let first_notice = first.pushes.try_recv().expect("first queue notice");
    assert_eq!(first_notice.service, "QLEN");
    assert_eq!(first_notice.body.get("QPOS").and_then(Value::as_int), Some(0));
    let second_notice = second.pushes.try_recv().expect("second queue notice");
    assert_eq!(second_notice.body.get("QPOS").and_then(Value::as_int), Some(1));
    assert_eq!(second_notice.body.get("QLEN").and_then(Value::as_int), Some(2));
    assert_eq!(world.queues.waiters(gid), vec![first_persona.id, second_persona.id]);

    // A player leaves the running game; the head of the queue gets in.
    let mut plvt = request("PLVT", 5);
    plvt.set("GID", gid);
    plvt.set("LID", 1i64);
    plvt.set("PID", 1i64);
    let frames = host.send(plvt).await;
    assert_eq!(frames[0].service.as_str(), "KICK");

    let host_push = host.pushes.try_recv().expect("host handshake push");
    assert_eq!(host_push.service, "EGRQ");
    assert_eq!(
        host_push.body.get("NAME").and_then(Value::as_str),
        Some("First")
    );

    let admit = first.pushes.try_recv().expect("admitted player notice");
    assert_eq!(admit.service, "EGEG");
    assert!(admit.body.get("TICKET").is_some());

    // The remaining waiter moved up.
    let moved_up = second.pushes.try_recv().expect("position refresh");
    assert_eq!(moved_up.service, "QLEN");
    assert_eq!(moved_up.body.get("QPOS").and_then(Value::as_int), Some(0));
    assert_eq!(moved_up.body.get("QLEN").and_then(Value::as_int), Some(1));
    assert_eq!(world.queues.waiters(gid), vec![second_persona.id]);
}

#[tokio::test]
async fn disconnects_release_queue_slots_and_hosted_games() {
    let world = World::new();
    let (_, host_key) = world.provision_persona("HostE").await;
    let mut host = world.connect(1);
    let gid = host.host_game(&host_key, 1).await;

    let mut egrs = request("EGRS", 4);
    egrs.set("GID", gid);
    egrs.set("LID", 1i64);
    egrs.set("ALLOWED", 1i64);
    host.send(egrs).await;

    let (waiter_persona, waiter_key) = world.provision_persona("Waiter").await;
    let mut waiter = world.connect(2);
    waiter.conn(1).await;
    waiter.login(2, &waiter_key).await;
    let mut egam = request("EGAM", 3);
    egam.set("LID", 1i64);
    egam.set("GID", gid);
    waiter.send(egam).await;
    assert_eq!(world.queues.len(gid), 1);

    // The queued player disconnects: their slot is released.
    waiter.transactor.on_disconnect().await;
    assert_eq!(world.queues.len(gid), 0);
    assert!(world
        .directory
        .lookup(&theater_identity(waiter_persona.id))
        .is_some(), "presence enters a grace window rather than vanishing");

    // The host disconnects: game and queue go with it.
    host.transactor.on_disconnect().await;
    assert!(world.games.game(1, gid).await.is_none());
}
