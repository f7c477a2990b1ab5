//! Session-service connection worker.

use std::net::SocketAddr;
use std::sync::Arc;

use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_tungstenite::tungstenite::Message;
use tracing::warn;

use directory::ConnectionHandle;
use packet::ValueMap;
use plasma::{PlasmaSession, PlasmaTransactor};

use crate::state::SharedState;

pub async fn run(
    shared: Arc<SharedState>,
    stream: TcpStream,
    _peer: SocketAddr,
    connection_id: u64,
) {
    let websocket = match tokio_tungstenite::accept_async(stream).await {
        Ok(websocket) => websocket,
        Err(error) => {
            warn!(%error, "websocket handshake failed");
            return;
        }
    };
    let (mut write_half, mut read_half) = websocket.split();

    let (frame_tx, mut frame_rx) = mpsc::unbounded_channel::<Vec<u8>>();
    let (push_tx, mut push_rx) = mpsc::unbounded_channel();

    let session = Arc::new(PlasmaSession {
        connection_id,
        handle: ConnectionHandle::new(connection_id, push_tx),
        directory: shared.directory.clone(),
        router: shared.router.clone(),
        accounts: shared.accounts.clone(),
        counters: shared.counters.clone(),
        settings: shared.config.session.clone(),
    });
    let mut transactor =
        PlasmaTransactor::new(session, shared.plasma_registry.clone(), frame_tx);

    // Writer: drains encoded frames so a slow client never blocks the
    // transactor.
    let writer = tokio::spawn(async move {
        while let Some(frame) = frame_rx.recv().await {
            if write_half.send(Message::binary(frame)).await.is_err() {
                break;
            }
        }
        let _ = write_half.close().await;
    });

    let mut memcheck = tokio::time::interval(shared.config.memcheck_interval);
    memcheck.set_missed_tick_behavior(MissedTickBehavior::Delay);
    memcheck.tick().await; // intervals fire immediately; skip that one

    loop {
        tokio::select! {
            inbound = read_half.next() => match inbound {
                Some(Ok(Message::Binary(bytes))) => transactor.receive(&bytes).await,
                Some(Ok(Message::Text(_))) => {
                    warn!("text frames are not part of the protocol, closing");
                    break;
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {} // ws-level ping/pong
                Some(Err(error)) => {
                    warn!(%error, "transport error");
                    break;
                }
            },
            Some(event) = push_rx.recv() => transactor.handle_push(event).await,
            _ = memcheck.tick() => {
                transactor
                    .start_unscheduled("fsys", "MemCheck", ValueMap::new())
                    .await;
            }
        }
    }

    // The select loop is gone, and the keepalive timer with it.
    transactor.on_disconnect();
    writer.abort();
}
