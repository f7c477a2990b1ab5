//! `CGAM`, `UBRA`, `UGAM`, `UGDE` — game hosting and updates.

use std::net::IpAddr;

use tracing::{debug, info};

use packet::ValueMap;

use crate::error::TheaterError;
use crate::session::host_identity;
use crate::store::CreateGame;
use crate::transactor::{HandlerFuture, TheaterContext};

/// Creates a hosted game and registers this connection as its host.
pub fn create_game(cx: TheaterContext<'_>) -> HandlerFuture<'_> {
    Box::pin(async move {
        let owner = cx
            .state
            .persona
            .as_ref()
            .ok_or(TheaterError::NotLoggedIn)?
            .clone();

        let requested_lid = cx.message.get_int("LID").unwrap_or(-1);
        // -1 asks the server to pick; there is one shared lobby per deployment.
        let lid = if requested_lid <= 0 { 1 } else { requested_lid as u64 };

        let name = cx
            .message
            .get_str("NAME")
            .ok_or(TheaterError::MissingField("NAME"))?
            .trim_matches('"')
            .to_string();
        let int_ip = cx.message.get_str("INT-IP").unwrap_or("").to_string();
        let int_port = cx.message.get_int("INT-PORT").unwrap_or(0) as u16;

        // Hosts behind the same NAT advertise their internal address.
        let (addr_ip, addr_port) = if is_private(cx.session.peer.ip()) {
            (int_ip.clone(), int_port)
        } else {
            (
                cx.session.peer.ip().to_string(),
                cx.message.get_int("PORT").unwrap_or(int_port as i64) as u16,
            )
        };

        // Everything else the host sent rides along as opaque attributes.
        let mut attributes = ValueMap::new();
        for (key, value) in cx.message.body().iter() {
            if matches!(
                key,
                "TID" | "LID" | "NAME" | "INT-IP" | "INT-PORT" | "PORT" | "MAX-PLAYERS"
                    | "JOIN" | "UGID" | "SECRET"
            ) {
                continue;
            }
            attributes.set(key, value.clone());
        }

        let game = cx
            .session
            .games
            .create_game(CreateGame {
                lid,
                owner_id: owner.id,
                name,
                platform: cx.state.platform.clone().unwrap_or_default(),
                addr_ip,
                addr_port,
                int_ip,
                int_port,
                max_players: cx.message.get_int("MAX-PLAYERS").unwrap_or(0).max(0) as u32,
                join_mode: cx.message.get_str("JOIN").unwrap_or("O").to_string(),
                ugid: cx.message.get_str("UGID").map(ToString::to_string),
                secret: cx
                    .message
                    .get_str("SECRET")
                    .filter(|secret| !secret.is_empty())
                    .map(ToString::to_string),
                attributes,
            })
            .await;

        info!(gid = game.gid, name = %game.name, "game created");
        cx.session.directory.register(
            &host_identity(game.gid),
            cx.session.handle.clone(),
            None,
        );
        cx.state.hosted_game = Some((game.lid, game.gid));

        let mut body = ValueMap::new();
        body.set("LID", game.lid);
        body.set("GID", game.gid);
        body.set("MAX-PLAYERS", game.max_players);
        body.set("EKEY", game.ekey.clone());
        body.set("UGID", game.ugid.clone());
        body.set("JOIN", game.join_mode.clone());
        body.set("SECRET", game.secret.clone());
        body.set("J", game.join_mode.clone());
        cx.sink.send(body);
        Ok(())
    })
}

/// Opens or closes the multi-update bracket. While open, the transactor
/// accepts repeated messages under the stalled tid; only this handler ever
/// touches the flag.
pub fn update_bracket(cx: TheaterContext<'_>) -> HandlerFuture<'_> {
    Box::pin(async move {
        let opening = cx.message.get_int("START").unwrap_or(0) != 0;
        cx.state.currently_batching = opening;
        debug!(opening, "update bracket toggled");
        cx.sink.send(ValueMap::new());
        Ok(())
    })
}

/// Bulk attribute update from the hosting server. No response packet.
pub fn update_game_data(cx: TheaterContext<'_>) -> HandlerFuture<'_> {
    Box::pin(async move {
        let (lid, gid) = cx.state.hosted_game.ok_or(TheaterError::NotHosting)?;
        let fields = updatable_fields(cx.message.body());
        if !cx.session.games.update_game(lid, gid, fields).await {
            return Err(TheaterError::UnknownGame);
        }
        Ok(())
    })
}

/// Detail update. The 32 `PDATnn` slices concatenate into one `D-pdat`
/// attribute when the host sends a complete set. No response packet.
pub fn update_game_details(cx: TheaterContext<'_>) -> HandlerFuture<'_> {
    Box::pin(async move {
        let (lid, gid) = cx.state.hosted_game.ok_or(TheaterError::NotHosting)?;

        let mut fields = updatable_fields(cx.message.body());
        let mut pdat = String::new();
        let complete = (0..32).all(|index| {
            match cx.message.get_str(&format!("PDAT{index:02}")) {
                Some(slice) => {
                    pdat.push_str(slice);
                    true
                }
                None => false,
            }
        });
        if complete {
            fields.set("D-pdat", pdat);
        }

        if !cx.session.games.update_game(lid, gid, fields).await {
            return Err(TheaterError::UnknownGame);
        }
        Ok(())
    })
}

fn updatable_fields(body: &ValueMap) -> ValueMap {
    body.iter()
        .filter(|(key, _)| *key != "TID" && *key != "LID" && *key != "GID")
        .map(|(key, value)| (key.to_string(), value.clone()))
        .collect()
}

fn is_private(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => v4.is_private() || v4.is_loopback(),
        IpAddr::V6(v6) => v6.is_loopback(),
    }
}
