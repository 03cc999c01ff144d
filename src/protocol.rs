//! Wire types for the XL Spaceship user API.
//!
//! | Round trip | Request | Response |
//! |---|---|---|
//! | `GET /xl-spaceship/user` | – | [`WhoAmIResponse`] |
//! | `POST /xl-spaceship/user/game/new` | [`NewGameRequest`] | [`GameState`] |
//! | `GET /xl-spaceship/user/game/{id}` | – | [`GameState`] |
//! | `PUT /xl-spaceship/user/game/{id}/fire` | [`FireRequest`] | [`SalvoReport`] |
//!
//! Fields the client does not interpret (boards, shot history, opponent
//! details) are kept verbatim in the `extra` maps so nothing the server sends
//! is lost when a state is cached.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::salvo::Salvo;

// ── Type aliases ────────────────────────────────────────────────────

/// Server-assigned game identifier.
pub type GameId = String;

/// Server-assigned player identifier.
pub type PlayerId = String;

// ── Identity ────────────────────────────────────────────────────────

/// Response of `GET /xl-spaceship/user`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WhoAmIResponse {
    pub user_id: PlayerId,
    pub full_name: String,
    #[serde(default)]
    pub games: Vec<GameId>,
}

// ── New game ────────────────────────────────────────────────────────

/// Address of the opponent's spaceship protocol endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpaceshipProtocol {
    pub hostname: String,
    pub port: u16,
}

/// Body of `POST /xl-spaceship/user/game/new`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewGameRequest {
    pub spaceship_protocol: SpaceshipProtocol,
}

impl NewGameRequest {
    /// Challenge the player listening at `hostname:port`.
    pub fn new(hostname: impl Into<String>, port: u16) -> Self {
        Self {
            spaceship_protocol: SpaceshipProtocol {
                hostname: hostname.into(),
                port,
            },
        }
    }
}

// ── Game state ──────────────────────────────────────────────────────

/// One side of a game as seen by the current player.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlayerBoard {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<PlayerId>,
    /// Board rows, one string per row.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub board: Vec<String>,
    /// Fields this client does not interpret.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// The current player's side, which also carries the shot allowance.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SelfBoard {
    /// Number of shots allowed in the next salvo.
    pub shots: usize,
    #[serde(flatten)]
    pub board: PlayerBoard,
}

/// Full state of one game, replaced wholesale on every refresh.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameState {
    pub game_id: GameId,
    /// `Some(true)` once the current player has won, `Some(false)` once they
    /// have lost, `None` while the game is running.
    #[serde(default)]
    pub won: Option<bool>,
    /// Whether the current player fires next.
    #[serde(default)]
    pub player_turn: bool,
    #[serde(rename = "self")]
    pub self_board: SelfBoard,
    #[serde(default)]
    pub opponent: PlayerBoard,
    /// Fields this client does not interpret.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl GameState {
    /// Minimal state for a running game with the given allowance.
    pub fn new(game_id: impl Into<GameId>, shots: usize) -> Self {
        Self {
            game_id: game_id.into(),
            won: None,
            player_turn: false,
            self_board: SelfBoard {
                shots,
                board: PlayerBoard::default(),
            },
            opponent: PlayerBoard::default(),
            extra: serde_json::Map::new(),
        }
    }

    /// Shot allowance for the next salvo.
    pub fn shots(&self) -> usize {
        self.self_board.shots
    }

    /// Returns `true` once the game has a winner.
    pub fn is_finished(&self) -> bool {
        self.won.is_some()
    }

    /// Returns `true` once the current player has won.
    pub fn is_won(&self) -> bool {
        self.won == Some(true)
    }
}

// ── Fire ────────────────────────────────────────────────────────────

/// Body of `PUT /xl-spaceship/user/game/{id}/fire`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FireRequest {
    pub salvo: Salvo,
}

/// Result of a single shot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShotOutcome {
    Miss,
    Hit,
    Kill,
    /// Any status this client does not know.
    #[serde(other)]
    Unknown,
}

/// Response of a successful fire round trip.
///
/// Decoded leniently: the authoritative post-fire state comes from the
/// refresh that always follows, so an empty body is accepted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SalvoReport {
    /// Outcome per wire shot.
    #[serde(default)]
    pub salvo: BTreeMap<String, ShotOutcome>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl SalvoReport {
    /// Number of shots that hit or sank a ship.
    pub fn hits(&self) -> usize {
        self.salvo
            .values()
            .filter(|o| matches!(o, ShotOutcome::Hit | ShotOutcome::Kill))
            .count()
    }

    /// Number of shots that sank a ship.
    pub fn kills(&self) -> usize {
        self.salvo
            .values()
            .filter(|o| matches!(o, ShotOutcome::Kill))
            .count()
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
    use serde_json::json;

    #[test]
    fn game_state_reads_self_shots() {
        let state: GameState = serde_json::from_value(json!({
            "game_id": "match-player-1",
            "won": null,
            "player_turn": true,
            "self": {"user_id": "player", "shots": 5, "board": ["....", "*..."]},
            "opponent": {"user_id": "rival", "board": ["...."]},
        }))
        .unwrap();
        assert_eq!(state.game_id, "match-player-1");
        assert_eq!(state.shots(), 5);
        assert!(state.player_turn);
        assert!(!state.is_finished());
        assert_eq!(state.self_board.board.user_id.as_deref(), Some("player"));
        assert_eq!(state.opponent.board.len(), 1);
    }

    #[test]
    fn game_state_keeps_unknown_fields() {
        let raw = json!({
            "game_id": "g",
            "self": {"shots": 2, "hits": 4},
            "game": {"player_turn": "player"},
        });
        let state: GameState = serde_json::from_value(raw).unwrap();
        assert_eq!(state.extra.get("game"), Some(&json!({"player_turn": "player"})));
        assert_eq!(state.self_board.board.extra.get("hits"), Some(&json!(4)));

        let back = serde_json::to_value(&state).unwrap();
        assert_eq!(back["self"]["hits"], json!(4));
        assert_eq!(back["self"]["shots"], json!(2));
    }

    #[test]
    fn game_state_requires_shot_allowance() {
        let err = serde_json::from_value::<GameState>(json!({
            "game_id": "g",
            "self": {"board": []},
        }));
        assert!(err.is_err());
    }

    #[test]
    fn won_flags() {
        let mut state = GameState::new("g", 3);
        state.won = Some(false);
        assert!(state.is_finished());
        assert!(!state.is_won());
        state.won = Some(true);
        assert!(state.is_won());
    }

    #[test]
    fn new_game_request_shape() {
        let req = NewGameRequest::new("localhost", 8090);
        assert_eq!(
            serde_json::to_value(&req).unwrap(),
            json!({"spaceship_protocol": {"hostname": "localhost", "port": 8090}})
        );
    }

    #[test]
    fn salvo_report_counts_hits() {
        let report: SalvoReport = serde_json::from_value(json!({
            "salvo": {"0x0": "miss", "1x1": "hit", "2x2": "kill", "3x3": "graze"},
            "game": {"player_turn": "rival"},
        }))
        .unwrap();
        assert_eq!(report.hits(), 2);
        assert_eq!(report.kills(), 1);
        assert_eq!(report.salvo.get("3x3"), Some(&ShotOutcome::Unknown));
    }

    #[test]
    fn empty_salvo_report_is_accepted() {
        let report: SalvoReport = serde_json::from_str("{}").unwrap();
        assert_eq!(report.hits(), 0);
    }
}
