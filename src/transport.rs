//! Transport abstraction for the XL Spaceship user API.
//!
//! The [`Transport`] trait is the one place the engines touch the network.
//! Each method is a single round trip; every failure, whether the connection
//! broke or the server answered with an error status, comes back as a
//! [`RequestError`] and the engines map it to the matching
//! [`SpaceshipError`](crate::SpaceshipError) kind.
//!
//! # Implementing a Custom Transport
//!
//! ```rust,no_run
//! use async_trait::async_trait;
//! use xlspaceship_client::error::RequestError;
//! use xlspaceship_client::protocol::{
//!     FireRequest, GameState, NewGameRequest, SalvoReport, WhoAmIResponse,
//! };
//! use xlspaceship_client::transport::Transport;
//!
//! struct MyTransport { /* ... */ }
//!
//! #[async_trait]
//! impl Transport for MyTransport {
//!     async fn whoami(&self) -> Result<WhoAmIResponse, RequestError> {
//!         Err(RequestError::Network("not wired up".into()))
//!     }
//!
//!     async fn new_game(&self, _req: &NewGameRequest) -> Result<GameState, RequestError> {
//!         Err(RequestError::Network("not wired up".into()))
//!     }
//!
//!     async fn game_status(&self, _game_id: &str) -> Result<GameState, RequestError> {
//!         Err(RequestError::Network("not wired up".into()))
//!     }
//!
//!     async fn fire(&self, _game_id: &str, _req: &FireRequest) -> Result<SalvoReport, RequestError> {
//!         Err(RequestError::Network("not wired up".into()))
//!     }
//! }
//! ```

use async_trait::async_trait;

use crate::error::RequestError;
use crate::protocol::{FireRequest, GameState, NewGameRequest, SalvoReport, WhoAmIResponse};

/// The four round trips of the user API.
///
/// Methods take `&self`: refreshes for different games, the lobby identity
/// poll and a fire submission may all be outstanding at once, so
/// implementations must tolerate concurrent calls. The trait is object-safe
/// and the engines hold it as `Arc<dyn Transport>`.
///
/// # Cancellation
///
/// A view teardown may drop a pending call. Dropping the returned future must
/// leave the transport usable for later calls.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// `GET /xl-spaceship/user`: the current player and their roster.
    async fn whoami(&self) -> Result<WhoAmIResponse, RequestError>;

    /// `POST /xl-spaceship/user/game/new`: challenge another player.
    ///
    /// Resolves to the initial state of the created game.
    async fn new_game(&self, req: &NewGameRequest) -> Result<GameState, RequestError>;

    /// `GET /xl-spaceship/user/game/{game_id}`: full state of one game.
    async fn game_status(&self, game_id: &str) -> Result<GameState, RequestError>;

    /// `PUT /xl-spaceship/user/game/{game_id}/fire`: submit a salvo.
    async fn fire(&self, game_id: &str, req: &FireRequest) -> Result<SalvoReport, RequestError>;
}
