#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
//! Wire format tests for the XL Spaceship client.
//!
//! Verifies that protocol types decode from and encode to the JSON shapes the
//! user API actually uses, including fixtures copied from real server output.

use serde_json::json;
use xlspaceship_client::protocol::{
    FireRequest, GameState, NewGameRequest, SalvoReport, ShotOutcome, WhoAmIResponse,
};
use xlspaceship_client::{decode, encode, Coordinate, Salvo, SpaceshipError};

// ════════════════════════════════════════════════════════════════════
// Fixtures
// ════════════════════════════════════════════════════════════════════

fn game_status_fixture() -> serde_json::Value {
    json!({
        "game_id": "match-1",
        "self": {
            "user_id": "player-1",
            "board": [
                "**..............",
                "................"
            ],
            "shots": 5
        },
        "opponent": {
            "user_id": "player-2",
            "board": [
                "X-..............",
                "................"
            ]
        },
        "game": { "player_turn": "player-1" },
        "player_turn": true
    })
}

// ════════════════════════════════════════════════════════════════════
// Game state
// ════════════════════════════════════════════════════════════════════

#[test]
fn game_state_decodes_server_fixture() {
    let state: GameState = serde_json::from_value(game_status_fixture()).unwrap();

    assert_eq!(state.game_id, "match-1");
    assert_eq!(state.shots(), 5);
    assert!(state.player_turn);
    assert_eq!(state.won, None);
    assert!(!state.is_finished());
    assert_eq!(state.self_board.board.user_id.as_deref(), Some("player-1"));
    assert_eq!(state.opponent.board[0], "X-..............");
    assert_eq!(state.extra["game"]["player_turn"], "player-1");
}

#[test]
fn game_state_keeps_unknown_fields_when_re_encoded() {
    let state: GameState = serde_json::from_value(game_status_fixture()).unwrap();
    let encoded = serde_json::to_value(&state).unwrap();

    assert_eq!(encoded["self"]["shots"], 5);
    assert_eq!(encoded["game"], json!({ "player_turn": "player-1" }));
    assert_eq!(encoded["opponent"]["user_id"], "player-2");
}

#[test]
fn finished_game_decodes() {
    let state: GameState = serde_json::from_value(json!({
        "game_id": "match-1",
        "won": true,
        "self": { "shots": 0 },
        "opponent": {}
    }))
    .unwrap();

    assert!(state.is_finished());
    assert!(state.is_won());
    assert!(!state.player_turn);
    assert_eq!(state.shots(), 0);
}

#[test]
fn lost_game_is_finished_but_not_won() {
    let state: GameState = serde_json::from_value(json!({
        "game_id": "match-1",
        "won": false,
        "self": { "shots": 0 }
    }))
    .unwrap();

    assert!(state.is_finished());
    assert!(!state.is_won());
}

#[test]
fn game_state_without_allowance_is_rejected() {
    let err = serde_json::from_value::<GameState>(json!({
        "game_id": "match-1",
        "self": { "user_id": "player-1" }
    }))
    .unwrap_err();
    assert!(err.to_string().contains("shots"), "{err}");
}

// ════════════════════════════════════════════════════════════════════
// Identity and challenge
// ════════════════════════════════════════════════════════════════════

#[test]
fn whoami_decodes_with_and_without_games() {
    let with: WhoAmIResponse = serde_json::from_value(json!({
        "user_id": "player-1",
        "full_name": "Player One",
        "games": ["match-1", "match-2"]
    }))
    .unwrap();
    assert_eq!(with.games, vec!["match-1", "match-2"]);

    let without: WhoAmIResponse = serde_json::from_value(json!({
        "user_id": "player-1",
        "full_name": "Player One"
    }))
    .unwrap();
    assert!(without.games.is_empty());
}

#[test]
fn new_game_request_shape() {
    let req = NewGameRequest::new("10.0.0.2", 9001);
    assert_eq!(
        serde_json::to_value(&req).unwrap(),
        json!({ "spaceship_protocol": { "hostname": "10.0.0.2", "port": 9001 } })
    );
}

// ════════════════════════════════════════════════════════════════════
// Fire
// ════════════════════════════════════════════════════════════════════

#[test]
fn fire_request_shape() {
    let req = FireRequest {
        salvo: Salvo::from_shots(&["0x0", "8x4", "DxA", "AxA", "7xF"]).unwrap(),
    };
    assert_eq!(
        serde_json::to_value(&req).unwrap(),
        json!({ "salvo": ["0x0", "8x4", "dxa", "axa", "7xf"] })
    );
}

#[test]
fn fire_request_rejects_malformed_shots() {
    let err = serde_json::from_value::<FireRequest>(json!({ "salvo": ["0x0", "10x1"] }));
    assert!(err.is_err());
}

#[test]
fn salvo_report_decodes_outcomes() {
    let report: SalvoReport = serde_json::from_value(json!({
        "salvo": {
            "0x0": "hit",
            "8x4": "kill",
            "DxA": "miss",
            "AxA": "something-new"
        },
        "game": { "player_turn": "player-2" }
    }))
    .unwrap();

    assert_eq!(report.salvo["0x0"], ShotOutcome::Hit);
    assert_eq!(report.salvo["AxA"], ShotOutcome::Unknown);
    assert_eq!(report.hits(), 2);
    assert_eq!(report.kills(), 1);
    assert!(report.extra.contains_key("game"));
}

#[test]
fn empty_salvo_report_is_accepted() {
    let report: SalvoReport = serde_json::from_str("{}").unwrap();
    assert!(report.salvo.is_empty());
    assert_eq!(report.hits(), 0);
}

// ════════════════════════════════════════════════════════════════════
// Coordinates
// ════════════════════════════════════════════════════════════════════

#[test]
fn every_board_cell_encodes_and_decodes() {
    for x in 0..16 {
        for y in 0..16 {
            let shot = encode(x, y).unwrap();
            let coord = decode(&shot).unwrap();
            assert_eq!((i64::from(coord.x()), i64::from(coord.y())), (x, y));
        }
    }
}

#[test]
fn encode_rejects_off_board_axes() {
    assert_eq!(
        encode(16, 0).unwrap_err(),
        SpaceshipError::InvalidCoordinate { x: 16, y: 0 }
    );
    assert!(encode(0, -1).is_err());
}

#[test]
fn decode_accepts_both_digit_cases() {
    assert_eq!(decode("Fx0").unwrap(), decode("fx0").unwrap());
    assert_eq!(decode("ax3").unwrap().to_string(), "ax3");
}

#[test]
fn decode_rejects_malformed_shots() {
    for shot in ["", "0x", "0x00", "gx1", "0X1", "0y1", "x01", " 0x1"] {
        assert_eq!(
            decode(shot).unwrap_err(),
            SpaceshipError::MalformedShot(shot.to_string()),
            "shot {shot:?}"
        );
    }
}

#[test]
fn coordinate_serializes_as_shot_string() {
    let coord: Coordinate = serde_json::from_value(json!("Bx7")).unwrap();
    assert_eq!((coord.x(), coord.y()), (11, 7));
    assert_eq!(serde_json::to_value(coord).unwrap(), json!("bx7"));
}
