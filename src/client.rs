//! Async client for the XL Spaceship user API.
//!
//! [`SpaceshipClient`] wires the engines together around one shared
//! [`GameCache`]: identity resolution, de-duplicated game refreshes, salvo
//! submission and view-scoped polling. Events are emitted on a bounded channel
//! ([`tokio::sync::mpsc::Receiver<SpaceshipEvent>`]) returned from
//! [`SpaceshipClient::start`].
//!
//! # Example
//!
//! ```rust,ignore
//! let transport = HttpTransport::new("http://localhost:8080")?;
//! let (client, mut events) = SpaceshipClient::start(transport, SpaceshipConfig::new());
//!
//! let session = client.whoami().await?;
//! if let EnterOutcome::Ready(view) = client.enter_game(&game_id).await {
//!     view.fire().await?;
//!     view.close().await;
//! }
//!
//! while let Some(event) = events.recv().await {
//!     match event {
//!         SpaceshipEvent::GameUpdated { state, .. } => { /* … */ }
//!         SpaceshipEvent::GameNotFound { .. } => break,
//!         _ => {}
//!     }
//! }
//! ```

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::cache::GameCache;
use crate::error::{Result, SpaceshipError};
use crate::event::{error_chain, EventSink, SpaceshipEvent};
use crate::fire::FireEngine;
use crate::identity::{IdentityResolver, Session};
use crate::protocol::{GameId, GameState, NewGameRequest};
use crate::refresh::{Liveness, RefreshEngine, DEFAULT_REFRESH_SETTLE};
use crate::salvo::{Salvo, SalvoGenerator};
use crate::scheduler::{
    EnterOutcome, LobbyView, PollScheduler, DEFAULT_POLL_INTERVAL, DEFAULT_SHUTDOWN_TIMEOUT,
};
use crate::transport::Transport;

/// Default capacity of the bounded event channel.
const DEFAULT_EVENT_CHANNEL_CAPACITY: usize = 256;

// ── Configuration ───────────────────────────────────────────────────

/// Configuration for a [`SpaceshipClient`].
///
/// # Example
///
/// ```
/// use xlspaceship_client::client::SpaceshipConfig;
/// use std::time::Duration;
///
/// let config = SpaceshipConfig::new()
///     .with_poll_interval(Duration::from_millis(500))
///     .with_salvo_seed(42);
/// assert_eq!(config.poll_interval, Duration::from_millis(500));
/// assert_eq!(config.salvo_seed, Some(42));
/// ```
#[derive(Debug, Clone)]
pub struct SpaceshipConfig {
    /// Period of the game and lobby poll loops.
    ///
    /// Defaults to **1 second**. Values below 1 ms are clamped to 1 ms.
    pub poll_interval: Duration,
    /// Minimum time [`SpaceshipClient::is_refreshing`] stays `true` after a
    /// refresh completes, so the indicator does not flicker.
    ///
    /// Defaults to **200 ms**.
    pub refresh_settle: Duration,
    /// Capacity of the bounded event channel.
    ///
    /// When the consumer cannot keep up, events are dropped (with a warning
    /// logged) rather than stalling the poll loops.
    ///
    /// Defaults to **256**. Values below 1 are clamped to 1.
    pub event_channel_capacity: usize,
    /// Time a poll loop gets to exit when its view is closed before the task
    /// is aborted.
    ///
    /// Defaults to **1 second**.
    pub shutdown_timeout: Duration,
    /// Seed of the salvo generator. `None` seeds from operating system
    /// entropy.
    pub salvo_seed: Option<u64>,
}

impl SpaceshipConfig {
    /// Create a configuration with default values.
    pub fn new() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            refresh_settle: DEFAULT_REFRESH_SETTLE,
            event_channel_capacity: DEFAULT_EVENT_CHANNEL_CAPACITY,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
            salvo_seed: None,
        }
    }

    /// Set the period of the poll loops.
    #[must_use]
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval.max(Duration::from_millis(1));
        self
    }

    /// Set how long the refreshing indicator stays on after a refresh.
    #[must_use]
    pub fn with_refresh_settle(mut self, settle: Duration) -> Self {
        self.refresh_settle = settle;
        self
    }

    /// Set the capacity of the bounded event channel.
    ///
    /// Defaults to **256**. Values below 1 are clamped to 1.
    #[must_use]
    pub fn with_event_channel_capacity(mut self, capacity: usize) -> Self {
        self.event_channel_capacity = capacity.max(1);
        self
    }

    /// Set the timeout for closing a view's poll loop.
    #[must_use]
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// Seed the salvo generator for reproducible salvos.
    #[must_use]
    pub fn with_salvo_seed(mut self, seed: u64) -> Self {
        self.salvo_seed = Some(seed);
        self
    }
}

impl Default for SpaceshipConfig {
    fn default() -> Self {
        Self::new()
    }
}

// ── Client ──────────────────────────────────────────────────────────

/// Async client handle for the XL Spaceship user API.
///
/// Created via [`SpaceshipClient::start`]. Unlike the views it hands out, the
/// client itself owns no background task: every method is a direct round trip
/// or a cache read.
pub struct SpaceshipClient {
    transport: Arc<dyn Transport>,
    cache: Arc<GameCache>,
    identity: IdentityResolver,
    refresh: RefreshEngine,
    fire: FireEngine,
    scheduler: PollScheduler,
    events: EventSink,
}

impl SpaceshipClient {
    /// Build a client around `transport` and return it with the event
    /// receiver.
    ///
    /// # Arguments
    ///
    /// * `transport`: A [`Transport`] implementation for the user API.
    /// * `config`: Polling, event and salvo settings.
    #[must_use = "the event receiver must be used to receive events"]
    pub fn start(
        transport: impl Transport,
        config: SpaceshipConfig,
    ) -> (Self, mpsc::Receiver<SpaceshipEvent>) {
        Self::start_shared(Arc::new(transport), config)
    }

    /// Same as [`start`](Self::start) for a transport that is already shared.
    #[must_use = "the event receiver must be used to receive events"]
    pub fn start_shared(
        transport: Arc<dyn Transport>,
        config: SpaceshipConfig,
    ) -> (Self, mpsc::Receiver<SpaceshipEvent>) {
        let (events, event_rx) = EventSink::channel(config.event_channel_capacity);
        let cache = Arc::new(GameCache::new());
        let generator = match config.salvo_seed {
            Some(seed) => SalvoGenerator::from_seed(seed),
            None => SalvoGenerator::from_entropy(),
        };

        let identity = IdentityResolver::new(Arc::clone(&transport));
        let refresh = RefreshEngine::build(
            Arc::clone(&transport),
            Arc::clone(&cache),
            config.refresh_settle,
            Some(events.clone()),
        );
        let fire = FireEngine::build(
            Arc::clone(&transport),
            refresh.clone(),
            generator,
            Some(events.clone()),
        );
        let scheduler = PollScheduler::new(
            refresh.clone(),
            fire.clone(),
            identity.clone(),
            events.clone(),
            config.poll_interval,
            config.shutdown_timeout,
        );

        let client = Self {
            transport,
            cache,
            identity,
            refresh,
            fire,
            scheduler,
            events,
        };
        (client, event_rx)
    }

    // ── Identity ────────────────────────────────────────────────────

    /// Resolve the current player and their roster.
    ///
    /// # Errors
    ///
    /// Returns [`SpaceshipError::IdentityUnavailable`] if the round trip fails.
    pub async fn whoami(&self) -> Result<Session> {
        match self.identity.resolve_identity().await {
            Ok(session) => {
                self.events
                    .emit(SpaceshipEvent::IdentityResolved(session.clone()));
                Ok(session)
            }
            Err(e) => {
                self.events.emit(SpaceshipEvent::IdentityUnavailable {
                    reason: error_chain(&e),
                });
                Err(e)
            }
        }
    }

    /// Challenge the player behind `hostname:port` to a new game.
    ///
    /// The initial state is stored in the cache.
    ///
    /// # Errors
    ///
    /// Returns [`SpaceshipError::GameCreationFailed`] if the round trip fails.
    pub async fn challenge(&self, hostname: &str, port: u16) -> Result<GameState> {
        let request = NewGameRequest::new(hostname, port);
        let state = match self.transport.new_game(&request).await {
            Ok(state) => state,
            Err(e) => {
                warn!(hostname = %hostname, port, "challenge failed: {e}");
                return Err(SpaceshipError::GameCreationFailed(e));
            }
        };

        info!(game_id = %state.game_id, hostname = %hostname, port, "game created");
        self.cache.put(&state.game_id, state.clone())?;
        self.events.emit(SpaceshipEvent::GameUpdated {
            game_id: state.game_id.clone(),
            state: Box::new(state.clone()),
        });
        Ok(state)
    }

    // ── Views ───────────────────────────────────────────────────────

    /// Enter a game view and start polling it.
    pub async fn enter_game(&self, game_id: &str) -> EnterOutcome {
        self.scheduler.enter_game(game_id).await
    }

    /// Start polling the lobby.
    pub fn watch_lobby(&self) -> LobbyView {
        self.scheduler.watch_lobby()
    }

    // ── Games ───────────────────────────────────────────────────────

    /// Refresh a game now.
    ///
    /// # Errors
    ///
    /// See [`RefreshEngine::refresh`].
    pub async fn refresh(&self, game_id: &str) -> Result<GameState> {
        self.refresh.refresh(game_id).await
    }

    /// Fire an explicit salvo.
    ///
    /// # Errors
    ///
    /// See [`FireEngine::fire_for`].
    pub async fn fire(&self, game_id: &str, salvo: Salvo) -> Result<GameState> {
        self.fire.fire(game_id, salvo).await
    }

    /// Fire the pending salvo of a game.
    ///
    /// # Errors
    ///
    /// See [`FireEngine::fire_for`].
    pub async fn fire_pending(&self, game_id: &str) -> Result<GameState> {
        self.fire
            .fire_pending(game_id, &Liveness::new())
            .await
    }

    pub fn pending_salvo(&self, game_id: &str) -> Option<Salvo> {
        self.fire.pending_salvo(game_id)
    }

    /// Size the pending salvo to the cached allowance.
    ///
    /// # Errors
    ///
    /// Returns [`SpaceshipError::GameNotLoaded`] if the game is not cached.
    pub fn prepare_salvo(&self, game_id: &str) -> Result<Salvo> {
        self.fire.prepare_salvo(game_id)
    }

    pub fn set_salvo(&self, game_id: &str, salvo: Salvo) {
        self.fire.set_salvo(game_id, salvo);
    }

    // ── State accessors ─────────────────────────────────────────────

    /// Last known state of a game.
    pub fn game(&self, game_id: &str) -> Option<GameState> {
        self.cache.get(game_id)
    }

    /// Last known state of every game.
    pub fn games(&self) -> HashMap<GameId, GameState> {
        self.cache.all()
    }

    /// The shared game cache.
    pub fn cache(&self) -> &Arc<GameCache> {
        &self.cache
    }

    /// Returns `true` while the refreshing indicator of a game should show.
    pub fn is_refreshing(&self, game_id: &str) -> bool {
        self.refresh.is_refreshing(game_id)
    }
}

impl std::fmt::Debug for SpaceshipClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpaceshipClient")
            .field("games", &self.cache.len())
            .field("refresh", &self.refresh)
            .field("fire", &self.fire)
            .finish_non_exhaustive()
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
    fn config_defaults() {
        let config = SpaceshipConfig::new();
        assert_eq!(config.poll_interval, Duration::from_millis(1000));
        assert_eq!(config.refresh_settle, Duration::from_millis(200));
        assert_eq!(config.event_channel_capacity, 256);
        assert_eq!(config.shutdown_timeout, Duration::from_secs(1));
        assert_eq!(config.salvo_seed, None);
    }

    #[test]
    fn config_clamps_degenerate_values() {
        let config = SpaceshipConfig::default()
            .with_poll_interval(Duration::ZERO)
            .with_event_channel_capacity(0);
        assert_eq!(config.poll_interval, Duration::from_millis(1));
        assert_eq!(config.event_channel_capacity, 1);
    }

    #[test]
    fn config_builder_overrides() {
        let config = SpaceshipConfig::new()
            .with_refresh_settle(Duration::ZERO)
            .with_shutdown_timeout(Duration::from_secs(5))
            .with_salvo_seed(9);
        assert_eq!(config.refresh_settle, Duration::ZERO);
        assert_eq!(config.shutdown_timeout, Duration::from_secs(5));
        assert_eq!(config.salvo_seed, Some(9));
    }
}
