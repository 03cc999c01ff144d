//! # Scripted Transport Example
//!
//! Shows how to implement the [`Transport`] trait with an in-process fake
//! server. This is useful for:
//!
//! - **Testing**: exercise your game loop without a running instance
//! - **Custom backends**: adapt any I/O layer the user API is reachable over
//!
//! The fake server plays a single game in which every salvo sinks one of the
//! player's ships, so the shot allowance drops by one per turn.
//!
//! ## Running
//!
//! ```sh
//! cargo run --example scripted_transport
//! ```

use std::sync::Mutex;

use async_trait::async_trait;
use xlspaceship_client::error::RequestError;
use xlspaceship_client::protocol::{
    FireRequest, GameState, NewGameRequest, SalvoReport, ShotOutcome, WhoAmIResponse,
};
use xlspaceship_client::{EnterOutcome, SpaceshipClient, SpaceshipConfig, Transport};

const GAME_ID: &str = "match-1";

// ─────────────────────────────────────────────────────────────────────
// Step 1: Define an in-process fake server
// ─────────────────────────────────────────────────────────────────────

/// A fake server holding one game.
pub struct ScriptedTransport {
    /// Ships the player has left, which is also their shot allowance.
    ships: Mutex<usize>,
}

impl ScriptedTransport {
    fn new(ships: usize) -> Self {
        Self {
            ships: Mutex::new(ships),
        }
    }

    fn state(&self) -> Result<GameState, RequestError> {
        let ships = *self
            .ships
            .lock()
            .map_err(|e| RequestError::Network(e.to_string()))?;
        let mut state = GameState::new(GAME_ID, ships);
        state.player_turn = ships > 0;
        if ships == 0 {
            state.won = Some(false);
        }
        Ok(state)
    }
}

// ─────────────────────────────────────────────────────────────────────
// Step 2: Implement the Transport trait
// ─────────────────────────────────────────────────────────────────────

#[async_trait]
impl Transport for ScriptedTransport {
    async fn whoami(&self) -> Result<WhoAmIResponse, RequestError> {
        Ok(WhoAmIResponse {
            user_id: "player-1".into(),
            full_name: "Player One".into(),
            games: vec![GAME_ID.into()],
        })
    }

    /// Challenges are not supported by this fake server.
    async fn new_game(&self, _req: &NewGameRequest) -> Result<GameState, RequestError> {
        Err(RequestError::Status {
            status: 400,
            body: "challenges are disabled".into(),
        })
    }

    async fn game_status(&self, game_id: &str) -> Result<GameState, RequestError> {
        if game_id != GAME_ID {
            return Err(RequestError::Status {
                status: 404,
                body: "Game not found".into(),
            });
        }
        self.state()
    }

    /// Every shot misses, and the opponent sinks one ship in return.
    async fn fire(&self, _game_id: &str, req: &FireRequest) -> Result<SalvoReport, RequestError> {
        let mut ships = self
            .ships
            .lock()
            .map_err(|e| RequestError::Network(e.to_string()))?;
        if req.salvo.len() > *ships {
            return Err(RequestError::Status {
                status: 400,
                body: "More shots than ships alive".into(),
            });
        }
        *ships = ships.saturating_sub(1);

        let mut report = SalvoReport::default();
        for shot in req.salvo.to_wire() {
            report.salvo.insert(shot, ShotOutcome::Miss);
        }
        Ok(report)
    }
}

// ─────────────────────────────────────────────────────────────────────
// Step 3: Play the game through the client
// ─────────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing for readable output.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = SpaceshipConfig::new().with_salvo_seed(42);
    let (client, _events) = SpaceshipClient::start(ScriptedTransport::new(5), config);

    let session = client.whoami().await?;
    tracing::info!("Playing as {}", session.identity.display_name);

    let view = match client.enter_game(GAME_ID).await {
        EnterOutcome::Ready(view) => view,
        EnterOutcome::NotFound { error, .. } => return Err(error.into()),
    };

    while let Some(salvo) = view.pending_salvo() {
        if salvo.is_empty() {
            break;
        }
        tracing::info!("Firing {:?}", salvo.to_wire());
        let state = view.fire().await?;
        tracing::info!("{} shot(s) left", state.shots());
    }

    tracing::info!("Game over, won: {:?}", view.state().and_then(|s| s.won));
    view.close().await;
    Ok(())
}
