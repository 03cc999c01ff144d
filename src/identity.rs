//! Who the current player is and which games they take part in.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::error::{Result, SpaceshipError};
use crate::protocol::{GameId, PlayerId, WhoAmIResponse};
use crate::transport::Transport;

/// The current player.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerIdentity {
    pub player_id: PlayerId,
    pub display_name: String,
}

/// Ordered, duplicate-free list of game ids known to the current player.
///
/// Only ids are listed; the state of each game is fetched lazily.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GameRoster(Vec<GameId>);

impl GameRoster {
    /// Build a roster, keeping the first occurrence of each id.
    pub fn new(ids: impl IntoIterator<Item = GameId>) -> Self {
        let mut games: Vec<GameId> = Vec::new();
        for id in ids {
            if !games.contains(&id) {
                games.push(id);
            }
        }
        Self(games)
    }

    pub fn contains(&self, game_id: &str) -> bool {
        self.0.iter().any(|id| id == game_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &GameId> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Result of one identity resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub identity: PlayerIdentity,
    pub roster: GameRoster,
}

impl From<WhoAmIResponse> for Session {
    fn from(res: WhoAmIResponse) -> Self {
        Self {
            identity: PlayerIdentity {
                player_id: res.user_id,
                display_name: res.full_name,
            },
            roster: GameRoster::new(res.games),
        }
    }
}

/// Fetches the current player's identity and roster.
///
/// One network round trip per call, no internal retry. The caller decides
/// what to do with the result.
#[derive(Clone)]
pub struct IdentityResolver {
    transport: Arc<dyn Transport>,
}

impl IdentityResolver {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    /// Resolve the current session.
    ///
    /// # Errors
    ///
    /// Returns [`SpaceshipError::IdentityUnavailable`] if the round trip fails.
    pub async fn resolve_identity(&self) -> Result<Session> {
        match self.transport.whoami().await {
            Ok(res) => {
                let session = Session::from(res);
                debug!(
                    player_id = %session.identity.player_id,
                    games = session.roster.len(),
                    "identity resolved"
                );
                Ok(session)
            }
            Err(e) => {
                warn!("identity round trip failed: {e}");
                Err(SpaceshipError::IdentityUnavailable(e))
            }
        }
    }
}

impl std::fmt::Debug for IdentityResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentityResolver").finish_non_exhaustive()
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
    fn roster_drops_duplicates_and_keeps_order() {
        let roster = GameRoster::new(vec!["b".into(), "a".into(), "b".into()]);
        assert_eq!(roster.iter().cloned().collect::<Vec<_>>(), vec!["b", "a"]);
        assert!(roster.contains("a"));
        assert!(!roster.contains("c"));
    }

    #[test]
    fn session_from_whoami() {
        let session = Session::from(WhoAmIResponse {
            user_id: "player-1".into(),
            full_name: "Player One".into(),
            games: vec!["match-1".into()],
        });
        assert_eq!(session.identity.player_id, "player-1");
        assert_eq!(session.identity.display_name, "Player One");
        assert_eq!(session.roster.len(), 1);
    }
}
