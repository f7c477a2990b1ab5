//! `EGAM`, `EGRS`, `PENT`, `PLVT`, `ECNL` — the enter-game handshake and
//! the admission queue around it.
//!
//! A join against a free slot runs the three-way handshake inline: ack the
//! requester, push `EGRQ` at the hosting connection, stream `EGEG` back to
//! the requester. A join against a full session parks the player in the
//! FIFO with everything needed to finish the handshake later; whenever a
//! slot frees, [`advance_queue`] pops the head and replays the same
//! handshake through the router.

use tracing::{debug, info, warn};

use directory::PushEvent;
use packet::{ServiceCode, Value, ValueMap};

use crate::error::TheaterError;
use crate::session::{host_identity, theater_identity, TheaterSession};
use crate::store::Game;
use crate::transactions::codes;
use crate::transactor::{HandlerFuture, TheaterContext};

const EGEG: ServiceCode = ServiceCode::new(*b"EGEG");
const KICK: ServiceCode = ServiceCode::new(*b"KICK");

pub fn enter_game_request(cx: TheaterContext<'_>) -> HandlerFuture<'_> {
    Box::pin(async move {
        let persona = cx
            .state
            .persona
            .as_ref()
            .ok_or(TheaterError::NotLoggedIn)?
            .clone();
        let lid = cx.message.get_int("LID").unwrap_or(1) as u64;
        let gid = cx
            .message
            .get_int("GID")
            .ok_or(TheaterError::MissingField("GID"))? as u64;
        let game = cx
            .session
            .games
            .game(lid, gid)
            .await
            .ok_or(TheaterError::UnknownGame)?;

        let mut ack = ValueMap::new();
        ack.set("LID", lid);
        ack.set("GID", gid);

        let pid = cx.session.counters.next(&format!("theater:pid:{gid}"));
        let server_full = game.active_players + 1 > game.max_players;

        if server_full {
            // Park the player with everything the deferred handshake needs.
            let mut rejoin = ValueMap::new();
            rejoin.set("R-INT-IP", cx.message.get_str("R-INT-IP").unwrap_or(""));
            rejoin.set("R-INT-PORT", cx.message.get_str("R-INT-PORT").unwrap_or("0"));
            rejoin.set("IP", cx.session.peer.ip().to_string());
            rejoin.set("PORT", cx.message.get_str("PORT").unwrap_or("0"));
            rejoin.set("NAME", persona.name.clone());
            rejoin.set("PTYPE", cx.message.get_str("PTYPE").unwrap_or("P"));
            rejoin.set("PID", pid);
            rejoin.set("UID", persona.id);

            match cx.session.queues.enqueue(gid, persona.id, rejoin) {
                Ok(position) => {
                    cx.state.queued_game = Some((lid, gid));
                    cx.sink.send(ack);

                    let mut notice = ValueMap::new();
                    notice.set("QPOS", position);
                    notice.set("QLEN", cx.session.queues.len(gid));
                    notice.set("LID", lid);
                    notice.set("GID", gid);
                    cx.session
                        .handle
                        .deliver(PushEvent::new(codes::QLEN, codes::QLEN, notice));
                    info!(gid, position, "session full, player queued");
                }
                Err(error) => warn!(%error, "enter-game request while already queued"),
            }
            return Ok(());
        }

        cx.sink.send(ack);

        let ticket = next_ticket(&cx.session);

        // Three-way handshake: the host learns who is coming...
        let mut host_request = ValueMap::new();
        host_request.set("R-INT-IP", cx.message.get_str("R-INT-IP").unwrap_or(""));
        host_request.set("R-INT-PORT", cx.message.get_str("R-INT-PORT").unwrap_or("0"));
        host_request.set("IP", cx.session.peer.ip().to_string());
        host_request.set("PORT", cx.message.get_str("PORT").unwrap_or("0"));
        host_request.set("NAME", persona.name.clone());
        host_request.set("PTYPE", cx.message.get_str("PTYPE").unwrap_or("P"));
        host_request.set("TICKET", ticket);
        host_request.set("PID", pid);
        host_request.set("UID", persona.id);
        host_request.set("LID", lid);
        host_request.set("GID", gid);
        cx.session.router.notify(
            &host_identity(gid),
            PushEvent::new(codes::EGRQ, codes::EGRQ, host_request),
        );

        // ...and the player learns where to go.
        let platform = cx
            .state
            .platform
            .clone()
            .unwrap_or_else(|| game.platform.clone());
        cx.sink
            .send_as(EGEG, enter_game_notice(&game, platform, ticket, Value::Int(pid as i64)));
        cx.state.joined_game = Some((lid, gid));
        Ok(())
    })
}

/// Host's verdict on a pending entry. A granted slot bumps the player count.
pub fn enter_game_host_response(cx: TheaterContext<'_>) -> HandlerFuture<'_> {
    Box::pin(async move {
        let lid = cx.message.get_int("LID").unwrap_or(1) as u64;
        let gid = cx
            .message
            .get_int("GID")
            .ok_or(TheaterError::MissingField("GID"))? as u64;

        if cx.message.get_int("ALLOWED").unwrap_or(0) != 0 {
            cx.session.games.adjust_players(lid, gid, 1).await;
        }
        cx.sink.send(ValueMap::new());
        Ok(())
    })
}

pub fn player_entered(cx: TheaterContext<'_>) -> HandlerFuture<'_> {
    Box::pin(async move {
        let mut body = ValueMap::new();
        if let Some(pid) = cx.message.get("PID") {
            body.set("PID", pid.clone());
        }
        cx.sink.send(body);
        Ok(())
    })
}

/// Host reports a player gone: acknowledge with a `KICK`, free the slot,
/// and let the next queued player in.
pub fn player_exited(cx: TheaterContext<'_>) -> HandlerFuture<'_> {
    Box::pin(async move {
        let lid = cx.message.get_int("LID").unwrap_or(1) as u64;
        let gid = cx
            .message
            .get_int("GID")
            .ok_or(TheaterError::MissingField("GID"))? as u64;

        let mut kick = ValueMap::new();
        kick.set("GID", gid);
        kick.set("LID", lid);
        if let Some(pid) = cx.message.get("PID") {
            kick.set("PID", pid.clone());
        }
        cx.sink.send_as(KICK, kick);

        cx.session.games.adjust_players(lid, gid, -1).await;
        cx.sink.send(ValueMap::new());

        advance_queue(cx.session, lid, gid).await;
        Ok(())
    })
}

/// Player-side cancel/leave: releases the queue slot if queued.
pub fn leave_game(cx: TheaterContext<'_>) -> HandlerFuture<'_> {
    Box::pin(async move {
        let lid = cx.message.get_int("LID").unwrap_or(1) as u64;
        let gid = cx
            .message
            .get_int("GID")
            .ok_or(TheaterError::MissingField("GID"))? as u64;

        if cx.state.queued_game == Some((lid, gid)) {
            cx.state.queued_game = None;
            if let Some(persona) = &cx.state.persona {
                if cx.session.queues.dequeue(gid, persona.id) {
                    debug!(gid, "player left the admission queue");
                    notify_queue_positions(cx.session, lid, gid);
                }
            }
        }
        cx.state.joined_game = None;

        let mut body = ValueMap::new();
        body.set("LID", lid);
        body.set("GID", gid);
        cx.sink.send(body);
        Ok(())
    })
}

/// Pops the next waiter once a slot is free and replays the enter-game
/// handshake toward host and player; everyone still queued hears their new
/// position.
pub(crate) async fn advance_queue(session: &TheaterSession, lid: u64, gid: u64) {
    let Some(game) = session.games.game(lid, gid).await else {
        session.queues.drop_queue(gid);
        return;
    };
    if game.active_players + 1 > game.max_players {
        notify_queue_positions(session, lid, gid);
        return;
    }
    let Some(next) = session.queues.pop_next(gid) else {
        return;
    };

    let ticket = next_ticket(session);
    let mut host_request = next.rejoin.clone();
    host_request.set("TICKET", ticket);
    host_request.set("LID", lid);
    host_request.set("GID", gid);
    session.router.notify(
        &host_identity(gid),
        PushEvent::new(codes::EGRQ, codes::EGRQ, host_request),
    );

    let pid = next
        .rejoin
        .get("PID")
        .cloned()
        .unwrap_or(Value::Int(0));
    session.router.notify(
        &theater_identity(next.player_id),
        PushEvent::new(
            codes::EGEG,
            codes::EGEG,
            enter_game_notice(&game, game.platform.clone(), ticket, pid),
        ),
    );
    info!(gid, player = next.player_id, "queued player admitted");

    notify_queue_positions(session, lid, gid);
}

/// Pushes refreshed `QPOS`/`QLEN` notices at everyone still waiting.
pub(crate) fn notify_queue_positions(session: &TheaterSession, lid: u64, gid: u64) {
    let waiters = session.queues.waiters(gid);
    let qlen = waiters.len();
    for (position, persona_id) in waiters.into_iter().enumerate() {
        let mut notice = ValueMap::new();
        notice.set("QPOS", position);
        notice.set("QLEN", qlen);
        notice.set("LID", lid);
        notice.set("GID", gid);
        session.router.notify(
            &theater_identity(persona_id),
            PushEvent::new(codes::QLEN, codes::QLEN, notice),
        );
    }
}

fn enter_game_notice(game: &Game, platform: String, ticket: u64, pid: Value) -> ValueMap {
    let mut notice = ValueMap::new();
    notice.set("PL", platform);
    notice.set("TICKET", ticket);
    notice.set("PID", pid);
    notice.set("I", game.addr_ip.clone());
    notice.set("P", game.addr_port as i64);
    notice.set("HUID", game.owner_id);
    notice.set("INT-PORT", game.int_port as i64);
    notice.set("EKEY", game.ekey.clone());
    notice.set("INT-IP", game.int_ip.clone());
    notice.set("UGID", game.ugid.clone());
    notice.set("LID", game.lid);
    notice.set("GID", game.gid);
    notice
}

/// Tickets are shared between host and joining client; the shared counter
/// keeps them unique, the offset keeps them 10 digits like the originals.
fn next_ticket(session: &TheaterSession) -> u64 {
    session.counters.next("theater:ticket") + 1_000_000_000
}
