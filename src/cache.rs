//! Process-local store of the last known state of every game.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError, RwLock};

use tracing::debug;

use crate::error::{Result, SpaceshipError};
use crate::protocol::{GameId, GameState};

/// Lock a mutex, recovering the data if a previous holder panicked.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Last known [`GameState`] per game id.
///
/// Entries are replaced wholesale: there is no merging, and the most recent
/// `put` for a game id wins regardless of which request produced it. The
/// refresh and fire engines are the only writers; the view layer and the
/// salvo sizing logic read.
#[derive(Debug, Default)]
pub struct GameCache {
    games: RwLock<HashMap<GameId, GameState>>,
}

impl GameCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Last known state of a game.
    pub fn get(&self, game_id: &str) -> Option<GameState> {
        self.games
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(game_id)
            .cloned()
    }

    /// Replace the state of a game.
    ///
    /// # Errors
    ///
    /// Returns [`SpaceshipError::GameIdMismatch`] and leaves the cache untouched
    /// if `state` describes a different game than `game_id`.
    pub fn put(&self, game_id: &str, state: GameState) -> Result<()> {
        if state.game_id != game_id {
            return Err(SpaceshipError::GameIdMismatch {
                expected: game_id.to_string(),
                actual: state.game_id,
            });
        }
        debug!(game_id = %game_id, shots = state.shots(), won = ?state.won, "cache: replaced game state");
        self.games
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(state.game_id.clone(), state);
        Ok(())
    }

    /// Snapshot of every known game.
    pub fn all(&self) -> HashMap<GameId, GameState> {
        self.games
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Returns `true` if state for the game has been cached.
    pub fn contains(&self, game_id: &str) -> bool {
        self.games
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(game_id)
    }

    /// Number of cached games.
    pub fn len(&self) -> usize {
        self.games
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Returns `true` if no game has been cached.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;

    #[test]
    fn last_write_wins() {
        let cache = GameCache::new();
        let mut first = GameState::new("g", 5);
        first.player_turn = true;
        let second = GameState::new("g", 2);

        cache.put("g", first).unwrap();
        cache.put("g", second.clone()).unwrap();

        assert_eq!(cache.get("g"), Some(second));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn rejects_state_of_another_game() {
        let cache = GameCache::new();
        cache.put("g1", GameState::new("g1", 5)).unwrap();

        let err = cache.put("g1", GameState::new("g2", 1)).unwrap_err();
        assert_eq!(
            err,
            SpaceshipError::GameIdMismatch {
                expected: "g1".into(),
                actual: "g2".into(),
            }
        );
        assert_eq!(cache.get("g1").unwrap().shots(), 5);
        assert!(!cache.contains("g2"));
    }

    #[test]
    fn all_returns_every_game() {
        let cache = GameCache::new();
        assert!(cache.is_empty());
        cache.put("a", GameState::new("a", 1)).unwrap();
        cache.put("b", GameState::new("b", 2)).unwrap();

        let all = cache.all();
        assert_eq!(all.len(), 2);
        assert_eq!(all["b"].shots(), 2);
        assert!(cache.get("c").is_none());
    }
}
