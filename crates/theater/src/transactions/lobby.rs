//! `LLST`, `GLST`, `GDAT` — lobby and game browsing.
//!
//! These are the streaming transactions: a count header under the request's
//! own code, then one data packet per entry (`LDAT`/`GDAT`/`GDET`), each
//! sent before the next is rendered.

use packet::{ServiceCode, ValueMap};

use crate::store::Game;
use crate::transactor::{HandlerFuture, TheaterContext};

const LDAT: ServiceCode = ServiceCode::new(*b"LDAT");
const GDAT: ServiceCode = ServiceCode::new(*b"GDAT");
const GDET: ServiceCode = ServiceCode::new(*b"GDET");

pub fn lobby_list(cx: TheaterContext<'_>) -> HandlerFuture<'_> {
    Box::pin(async move {
        // The client can send filters here; like the original servers we
        // ignore them.
        let lobbies = cx.session.games.lobbies().await;

        let mut header = ValueMap::new();
        header.set("NUM-LOBBIES", lobbies.len());
        cx.sink.send(header);

        for lobby in lobbies {
            let num_games = cx.session.games.games_in_lobby(lobby.id).await.len();
            let mut info = ValueMap::new();
            info.set("LID", lobby.id);
            info.set("PASSING", num_games);
            info.set("NAME", lobby.name);
            info.set("LOCALE", lobby.locale);
            info.set("MAX-GAMES", lobby.max_games);
            info.set("FAVOURITE-GAMES", 0i64);
            info.set("FAVOURITE-PLAYERS", 0i64);
            info.set("NUM-GAMES", num_games);
            cx.sink.send_as(LDAT, info);
        }
        Ok(())
    })
}

pub fn game_list(cx: TheaterContext<'_>) -> HandlerFuture<'_> {
    Box::pin(async move {
        let lid = cx.message.get_int("LID").unwrap_or(1) as u64;
        let max_games = cx
            .session
            .games
            .lobby(lid)
            .await
            .map_or(0, |lobby| lobby.max_games);
        let games = cx.session.games.games_in_lobby(lid).await;

        let mut header = ValueMap::new();
        header.set("LOBBY-NUM-GAMES", games.len());
        header.set("NUM-GAMES", games.len());
        header.set("LID", lid);
        header.set("LOBBY-MAX-GAMES", max_games);
        cx.sink.send(header);

        for game in games {
            cx.sink.send_as(GDAT, game_data(&game));
        }
        Ok(())
    })
}

pub fn game_details(cx: TheaterContext<'_>) -> HandlerFuture<'_> {
    Box::pin(async move {
        let (Some(lid), Some(gid)) = (cx.message.get_int("LID"), cx.message.get_int("GID"))
        else {
            cx.sink.send(ValueMap::new());
            return Ok(());
        };
        let Some(game) = cx.session.games.game(lid as u64, gid as u64).await else {
            cx.sink.send(ValueMap::new());
            return Ok(());
        };

        cx.sink.send(game_data(&game));

        // Second packet: the detail attributes the host published.
        let mut details = ValueMap::new();
        details.set("LID", game.lid);
        details.set("GID", game.gid);
        details.set("UGID", game.ugid.clone());
        for (key, value) in game.attributes.iter() {
            if key.starts_with("D-") {
                details.set(key, value.clone());
            }
        }
        cx.sink.send_as(GDET, details);
        Ok(())
    })
}

/// Renders the browser-facing record of one game.
pub(crate) fn game_data(game: &Game) -> ValueMap {
    let mut data = ValueMap::new();
    data.set("LID", game.lid);
    data.set("GID", game.gid);
    data.set("N", game.name.clone());
    data.set("AP", game.active_players);
    data.set("MP", game.max_players);
    data.set("JP", 0i64);
    data.set("QP", 0i64);
    data.set("PL", game.platform.clone());
    data.set("I", game.addr_ip.clone());
    data.set("P", game.addr_port as i64);
    data.set("J", game.join_mode.clone());
    data.set("F", 0i64);
    data.set("NF", 0i64);
    data.set("HU", game.owner_id);
    for (key, value) in game.attributes.iter() {
        if !key.starts_with("D-") {
            data.set(key, value.clone());
        }
    }
    data
}

#[cfg(test)]
mod tests {
    use super::*;
    use packet::Value;

    #[test]
    fn game_data_carries_counts_and_attributes() {
        let mut attributes = ValueMap::new();
        attributes.set("B-U-Hardcore", 1i64);
        attributes.set("D-ServerDescription0", "hidden from browsers");

        let game = Game {
            lid: 1,
            gid: 42,
            name: "conquest all day".to_string(),
            owner_id: 7,
            platform: "PC".to_string(),
            addr_ip: "203.0.113.1".to_string(),
            addr_port: 19567,
            int_ip: "10.0.0.1".to_string(),
            int_port: 19567,
            max_players: 32,
            active_players: 12,
            join_mode: "O".to_string(),
            ekey: "ekey".to_string(),
            ugid: "ugid".to_string(),
            secret: "secret".to_string(),
            attributes,
        };

        let data = game_data(&game);
        assert_eq!(data.get("AP").and_then(Value::as_int), Some(12));
        assert_eq!(data.get("MP").and_then(Value::as_int), Some(32));
        assert_eq!(data.get("B-U-Hardcore").and_then(Value::as_int), Some(1));
        assert!(data.get("D-ServerDescription0").is_none());
    }
}
