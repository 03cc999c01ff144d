//! # Random Play Example
//!
//! Plays every running game of the current player with random salvos:
//!
//! 1. Resolve the player's identity and roster over HTTP
//! 2. Optionally challenge an opponent
//! 3. Enter each running game and fire the pending salvo whenever it is the
//!    player's turn
//! 4. Leave the game once it is over, or on Ctrl+C
//!
//! ## Running
//!
//! ```sh
//! # Start an XL Spaceship instance on localhost:8080, then:
//! cargo run --example play_random
//!
//! # Point at another instance and challenge an opponent first:
//! XL_SPACESHIP_URL=http://my-host:8080 XL_SPACESHIP_OPPONENT=other-host:9001 \
//!     cargo run --example play_random
//! ```

use std::time::Duration;

use xlspaceship_client::{
    EnterOutcome, HttpTransport, SpaceshipClient, SpaceshipConfig, SpaceshipError, SpaceshipEvent,
};

/// Default instance URL when `XL_SPACESHIP_URL` is not set.
const DEFAULT_URL: &str = "http://localhost:8080";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // ── Logging ─────────────────────────────────────────────────────
    // Initialize tracing. Set `RUST_LOG=debug` for verbose output.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    // ── Configuration ───────────────────────────────────────────────
    let url = std::env::var("XL_SPACESHIP_URL").unwrap_or_else(|_| DEFAULT_URL.to_string());
    let transport = HttpTransport::new(&url)?;
    let config = SpaceshipConfig::new().with_poll_interval(Duration::from_millis(1000));
    let (client, mut events) = SpaceshipClient::start(transport, config);
    tracing::info!("Using XL Spaceship instance at {url}");

    // Log events in the background.
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            match event {
                SpaceshipEvent::SalvoFired { game_id, report } => {
                    tracing::info!("{game_id}: {} hit(s), {} kill(s)", report.hits(), report.kills());
                }
                SpaceshipEvent::FireRejected {
                    game_id, rejection, ..
                } => {
                    tracing::warn!("{game_id}: {rejection}");
                }
                SpaceshipEvent::RefreshFailed { game_id, reason } => {
                    tracing::warn!("{game_id}: refresh failed: {reason}");
                }
                other => tracing::debug!("event: {other:?}"),
            }
        }
    });

    // ── Identity and challenge ──────────────────────────────────────
    let session = client.whoami().await?;
    tracing::info!(
        "Playing as {} ({} game(s))",
        session.identity.display_name,
        session.roster.len()
    );

    let mut games: Vec<String> = session.roster.iter().cloned().collect();
    if let Ok(opponent) = std::env::var("XL_SPACESHIP_OPPONENT") {
        let (host, port) = opponent
            .rsplit_once(':')
            .ok_or("XL_SPACESHIP_OPPONENT must be host:port")?;
        let state = client.challenge(host, port.parse()?).await?;
        tracing::info!("Challenged {opponent}: game {}", state.game_id);
        games.push(state.game_id);
    }

    // ── Play ────────────────────────────────────────────────────────
    for game_id in games {
        let view = match client.enter_game(&game_id).await {
            EnterOutcome::Ready(view) => view,
            EnterOutcome::NotFound { error, .. } => {
                tracing::warn!("Skipping {game_id}: {error}");
                continue;
            }
        };

        loop {
            let Some(state) = view.state() else { break };
            if state.is_finished() {
                tracing::info!("{game_id} is over, won: {}", state.is_won());
                break;
            }

            if state.player_turn {
                match view.fire().await {
                    Ok(after) => tracing::info!("{game_id}: {} shot(s) next turn", after.shots()),
                    Err(SpaceshipError::FireRejected { rejection, .. })
                        if rejection.is_retryable() => {}
                    Err(e) => {
                        tracing::warn!("{game_id}: {e}");
                        break;
                    }
                }
            }

            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("Received Ctrl+C, leaving {game_id}");
                    view.close().await;
                    return Ok(());
                }
                _ = tokio::time::sleep(Duration::from_millis(500)) => {}
            }
        }

        view.close().await;
    }

    tracing::info!("Done");
    Ok(())
}
