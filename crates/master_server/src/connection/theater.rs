//! Game-hosting connection worker.

use std::net::SocketAddr;
use std::sync::Arc;

use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tracing::warn;

use directory::ConnectionHandle;
use theater::{TheaterSession, TheaterTransactor};

use crate::state::SharedState;

pub async fn run(
    shared: Arc<SharedState>,
    stream: TcpStream,
    peer: SocketAddr,
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

    let session = Arc::new(TheaterSession {
        connection_id,
        peer,
        handle: ConnectionHandle::new(connection_id, push_tx),
        directory: shared.directory.clone(),
        router: shared.router.clone(),
        accounts: shared.accounts.clone(),
        games: shared.games.clone(),
        queues: shared.queues.clone(),
        counters: shared.counters.clone(),
        presence_grace: shared.config.session.presence_grace,
    });
    let mut transactor =
        TheaterTransactor::new(session, shared.theater_handlers.clone(), frame_tx);

    let writer = tokio::spawn(async move {
        while let Some(frame) = frame_rx.recv().await {
            if write_half.send(Message::binary(frame)).await.is_err() {
                break;
            }
        }
        let _ = write_half.close().await;
    });

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
            Some(event) = push_rx.recv() => transactor.handle_push(event),
        }
    }

    transactor.on_disconnect().await;
    writer.abort();
}
