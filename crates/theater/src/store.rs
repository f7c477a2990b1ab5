//! Game/lobby persistence collaborator.
//!
//! Same shape as the account store: handlers talk to a narrow trait, and
//! the bundled [`MemoryGameStore`] keeps everything in DashMaps. Game
//! attributes beyond the handful the protocol itself needs (counts, join
//! mode, addresses) are carried as an opaque ordered map — the server
//! relays them between hosts and browsers without interpreting them.

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;
use uuid::Uuid;

use packet::ValueMap;

/// A hosted game session.
#[derive(Debug, Clone)]
pub struct Game {
    pub lid: u64,
    pub gid: u64,
    pub name: String,
    /// Persona id of the hosting server's owner.
    pub owner_id: u64,
    pub platform: String,
    pub addr_ip: String,
    pub addr_port: u16,
    pub int_ip: String,
    pub int_port: u16,
    pub max_players: u32,
    pub active_players: u32,
    pub join_mode: String,
    pub ekey: String,
    pub ugid: String,
    pub secret: String,
    /// Host-published attributes (`B-*`, `D-*`, ...), relayed verbatim.
    pub attributes: ValueMap,
}

/// A lobby grouping games of one platform/locale.
#[derive(Debug, Clone)]
pub struct Lobby {
    pub id: u64,
    pub name: String,
    pub locale: String,
    pub max_games: u32,
}

/// Parameters for creating a game.
pub struct CreateGame {
    pub lid: u64,
    pub owner_id: u64,
    pub name: String,
    pub platform: String,
    pub addr_ip: String,
    pub addr_port: u16,
    pub int_ip: String,
    pub int_port: u16,
    pub max_players: u32,
    pub join_mode: String,
    pub ugid: Option<String>,
    pub secret: Option<String>,
    pub attributes: ValueMap,
}

#[async_trait]
pub trait GameStore: Send + Sync {
    async fn lobbies(&self) -> Vec<Lobby>;
    async fn lobby(&self, lid: u64) -> Option<Lobby>;

    async fn create_game(&self, request: CreateGame) -> Game;
    async fn game(&self, lid: u64, gid: u64) -> Option<Game>;
    async fn games_in_lobby(&self, lid: u64) -> Vec<Game>;

    /// Merges updated fields into a game. The protocol-level keys (`NAME`,
    /// `MAX-PLAYERS`, `JOIN`, `AP`, `UGID`) update the structured record;
    /// everything else lands in the attribute map.
    async fn update_game(&self, lid: u64, gid: u64, fields: ValueMap) -> bool;

    /// Adjusts the active player count, clamped at zero. Returns the new
    /// count, or None for an unknown game.
    async fn adjust_players(&self, lid: u64, gid: u64, delta: i64) -> Option<u32>;

    async fn remove_game(&self, lid: u64, gid: u64) -> bool;
}

/// In-memory [`GameStore`] with one pre-seeded lobby.
pub struct MemoryGameStore {
    lobbies: DashMap<u64, Lobby>,
    games: DashMap<(u64, u64), Game>,
    next_gid: AtomicU64,
}

impl MemoryGameStore {
    pub fn new() -> Self {
        let lobbies = DashMap::new();
        lobbies.insert(
            1,
            Lobby {
                id: 1,
                name: "lobby01".to_string(),
                locale: "en_US".to_string(),
                max_games: 10_000,
            },
        );
        Self {
            lobbies,
            games: DashMap::new(),
            next_gid: AtomicU64::new(0),
        }
    }
}

impl Default for MemoryGameStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl GameStore for MemoryGameStore {
    async fn lobbies(&self) -> Vec<Lobby> {
        let mut lobbies: Vec<Lobby> = self.lobbies.iter().map(|l| l.clone()).collect();
        lobbies.sort_by_key(|l| l.id);
        lobbies
    }

    async fn lobby(&self, lid: u64) -> Option<Lobby> {
        self.lobbies.get(&lid).map(|l| l.clone())
    }

    async fn create_game(&self, request: CreateGame) -> Game {
        let gid = self.next_gid.fetch_add(1, Ordering::Relaxed) + 1;
        let game = Game {
            lid: request.lid,
            gid,
            name: request.name,
            owner_id: request.owner_id,
            platform: request.platform,
            addr_ip: request.addr_ip,
            addr_port: request.addr_port,
            int_ip: request.int_ip,
            int_port: request.int_port,
            max_players: request.max_players,
            active_players: 0,
            join_mode: request.join_mode,
            ekey: Uuid::new_v4().simple().to_string(),
            ugid: request
                .ugid
                .unwrap_or_else(|| Uuid::new_v4().to_string()),
            secret: request
                .secret
                .unwrap_or_else(|| Uuid::new_v4().simple().to_string()),
            attributes: request.attributes,
        };
        self.games.insert((request.lid, gid), game.clone());
        game
    }

    async fn game(&self, lid: u64, gid: u64) -> Option<Game> {
        self.games.get(&(lid, gid)).map(|g| g.clone())
    }

    async fn games_in_lobby(&self, lid: u64) -> Vec<Game> {
        let mut games: Vec<Game> = self
            .games
            .iter()
            .filter(|entry| entry.lid == lid)
            .map(|entry| entry.clone())
            .collect();
        games.sort_by_key(|g| g.gid);
        games
    }

    async fn update_game(&self, lid: u64, gid: u64, fields: ValueMap) -> bool {
        let Some(mut game) = self.games.get_mut(&(lid, gid)) else {
            return false;
        };
        for (key, value) in fields.into_iter() {
            match key.as_str() {
                "NAME" => {
                    if let Some(name) = value.as_str() {
                        game.name = name.trim_matches('"').to_string();
                    }
                }
                "MAX-PLAYERS" => {
                    if let Some(max) = value.as_int() {
                        game.max_players = max.max(0) as u32;
                    }
                }
                "JOIN" => {
                    if let Some(join) = value.as_str() {
                        game.join_mode = join.to_string();
                    }
                }
                "AP" => {
                    if let Some(active) = value.as_int() {
                        game.active_players = active.max(0) as u32;
                    }
                }
                "UGID" => {
                    if let Some(ugid) = value.as_str() {
                        game.ugid = ugid.to_string();
                    }
                }
                _ => game.attributes.set(key, value),
            }
        }
        true
    }

    async fn adjust_players(&self, lid: u64, gid: u64, delta: i64) -> Option<u32> {
        let mut game = self.games.get_mut(&(lid, gid))?;
        let updated = (game.active_players as i64 + delta).max(0) as u32;
        game.active_players = updated;
        Some(updated)
    }

    async fn remove_game(&self, lid: u64, gid: u64) -> bool {
        self.games.remove(&(lid, gid)).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use packet::Value;

    fn request(name: &str, max_players: u32) -> CreateGame {
        CreateGame {
            lid: 1,
            owner_id: 7,
            name: name.to_string(),
            platform: "PC".to_string(),
            addr_ip: "203.0.113.10".to_string(),
            addr_port: 19567,
            int_ip: "10.0.0.10".to_string(),
            int_port: 19567,
            max_players,
            join_mode: "O".to_string(),
            ugid: None,
            secret: None,
            attributes: ValueMap::new(),
        }
    }

    #[tokio::test]
    async fn games_get_sequential_ids_and_fresh_keys() {
        let store = MemoryGameStore::new();
        let first = store.create_game(request("alpha", 32)).await;
        let second = store.create_game(request("beta", 32)).await;
        assert_eq!(first.gid, 1);
        assert_eq!(second.gid, 2);
        assert_ne!(first.ekey, second.ekey);
        assert_eq!(store.games_in_lobby(1).await.len(), 2);
    }

    #[tokio::test]
    async fn update_merges_structured_fields_and_attributes() {
        let store = MemoryGameStore::new();
        let game = store.create_game(request("alpha", 32)).await;

        let mut fields = ValueMap::new();
        fields.set("NAME", "\"renamed\"");
        fields.set("MAX-PLAYERS", 16i64);
        fields.set("B-U-Hardcore", 1i64);
        assert!(store.update_game(1, game.gid, fields).await);

        let updated = store.game(1, game.gid).await.unwrap();
        assert_eq!(updated.name, "renamed");
        assert_eq!(updated.max_players, 16);
        assert_eq!(
            updated.attributes.get("B-U-Hardcore").and_then(Value::as_int),
            Some(1)
        );
    }

    #[tokio::test]
    async fn player_count_is_clamped_at_zero() {
        let store = MemoryGameStore::new();
        let game = store.create_game(request("alpha", 2)).await;
        assert_eq!(store.adjust_players(1, game.gid, 2).await, Some(2));
        assert_eq!(store.adjust_players(1, game.gid, -5).await, Some(0));
        assert_eq!(store.adjust_players(1, 999, 1).await, None);
    }
}
