//! # XL Spaceship Client
//!
//! Async session synchronization client for the XL Spaceship salvo game.
//!
//! The crate keeps a process-local view of every game the player takes part
//! in consistent with the authoritative server, with the minimum number of
//! round trips, while the player fires salvos and the opponent acts
//! concurrently.
//!
//! ## Features
//!
//! - **Transport-agnostic**: implement the [`Transport`] trait for any backend
//! - **HTTP built-in**: the default `transport-http` feature provides [`HttpTransport`]
//! - **De-duplicated refreshes**: overlapping refreshes of a game share one round trip
//! - **View-scoped polling**: [`GameView`] and [`LobbyView`] own their poll loops
//! - **Event-driven**: receive typed [`SpaceshipEvent`]s via a channel
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! use xlspaceship_client::{EnterOutcome, HttpTransport, SpaceshipClient, SpaceshipConfig};
//!
//! let transport = HttpTransport::new("http://localhost:8080")?;
//! let (client, _events) = SpaceshipClient::start(transport, SpaceshipConfig::new());
//!
//! let session = client.whoami().await?;
//! for game_id in session.roster.iter() {
//!     if let EnterOutcome::Ready(view) = client.enter_game(game_id).await {
//!         let state = view.fire().await?;
//!         println!("{game_id}: {} shots left", state.shots());
//!         view.close().await;
//!     }
//! }
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod client;
pub mod codec;
pub mod error;
pub mod error_codes;
pub mod event;
pub mod fire;
pub mod identity;
pub mod protocol;
pub mod refresh;
pub mod salvo;
pub mod scheduler;
pub mod transport;
pub mod transports;

// Re-export primary types for ergonomic imports.
pub use cache::GameCache;
pub use client::{SpaceshipClient, SpaceshipConfig};
pub use codec::{decode, encode, Coordinate, BOARD_SIZE};
pub use error::{RequestError, SpaceshipError};
pub use error_codes::FireRejection;
pub use event::SpaceshipEvent;
pub use fire::FireEngine;
pub use identity::{GameRoster, IdentityResolver, PlayerIdentity, Session};
pub use protocol::{GameState, SalvoReport};
pub use refresh::{Liveness, RefreshEngine};
pub use salvo::{Salvo, SalvoGenerator};
pub use scheduler::{EnterOutcome, GameView, LobbyView, PollScheduler};
pub use transport::Transport;

#[cfg(feature = "transport-http")]
pub use transports::HttpTransport;
