//! Per-game admission queue.
//!
//! When a hosted game session is full, joining players wait in a FIFO; each
//! entry carries the rejoin parameters the enter-game handshake needs once a
//! slot frees up. The queue is shared across connections, so every mutation
//! happens under the per-game map guard — callers take the result and do
//! their pushing *after* the guard is gone.

use std::collections::VecDeque;

use dashmap::DashMap;
use thiserror::Error;

use packet::ValueMap;

/// A waiting player and the parameters needed to complete their entry later.
#[derive(Debug, Clone)]
pub struct QueuedPlayer {
    pub player_id: u64,
    pub rejoin: ValueMap,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum QueueError {
    #[error("player {0} is already queued for this game")]
    AlreadyQueued(u64),
}

/// All admission queues, keyed by game id.
#[derive(Default)]
pub struct AdmissionQueues {
    queues: DashMap<u64, VecDeque<QueuedPlayer>>,
}

impl AdmissionQueues {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a player, returning their 0-based queue position.
    pub fn enqueue(
        &self,
        game_id: u64,
        player_id: u64,
        rejoin: ValueMap,
    ) -> Result<usize, QueueError> {
        let mut queue = self.queues.entry(game_id).or_default();
        if queue.iter().any(|entry| entry.player_id == player_id) {
            return Err(QueueError::AlreadyQueued(player_id));
        }
        queue.push_back(QueuedPlayer { player_id, rejoin });
        Ok(queue.len() - 1)
    }

    /// Removes a player regardless of position. Returns whether an entry was
    /// actually removed.
    pub fn dequeue(&self, game_id: u64, player_id: u64) -> bool {
        let removed = match self.queues.get_mut(&game_id) {
            Some(mut queue) => {
                let before = queue.len();
                queue.retain(|entry| entry.player_id != player_id);
                queue.len() != before
            }
            None => false,
        };
        self.drop_if_empty(game_id);
        removed
    }

    /// Pops the player who has waited longest.
    pub fn pop_next(&self, game_id: u64) -> Option<QueuedPlayer> {
        let popped = self
            .queues
            .get_mut(&game_id)
            .and_then(|mut queue| queue.pop_front());
        self.drop_if_empty(game_id);
        popped
    }

    /// Snapshot of the waiting player ids, head first.
    pub fn waiters(&self, game_id: u64) -> Vec<u64> {
        self.queues
            .get(&game_id)
            .map(|queue| queue.iter().map(|entry| entry.player_id).collect())
            .unwrap_or_default()
    }

    pub fn len(&self, game_id: u64) -> usize {
        self.queues.get(&game_id).map_or(0, |queue| queue.len())
    }

    pub fn is_empty(&self, game_id: u64) -> bool {
        self.len(game_id) == 0
    }

    /// Tears down a game's queue (session destroyed).
    pub fn drop_queue(&self, game_id: u64) -> Vec<QueuedPlayer> {
        self.queues
            .remove(&game_id)
            .map(|(_, queue)| queue.into_iter().collect())
            .unwrap_or_default()
    }

    fn drop_if_empty(&self, game_id: u64) {
        self.queues.remove_if(&game_id, |_, queue| queue.is_empty());
    }
}
