//! Per-game refresh with in-flight de-duplication.
//!
//! At most one status round trip per game id is outstanding at any time. A
//! refresh requested while another one for the same game is in flight joins
//! it through a shared pending-operation handle: the network is hit once and
//! every caller receives the same outcome.
//!
//! Every caller contributes a [`Liveness`] token. When the round trip
//! completes, the fetched state is written to the [`GameCache`] only if at
//! least one contributor is still alive, so a view torn down mid-request never
//! mutates shared state after it is gone.
//!
//! A caller that knows the game just changed on the server uses
//! [`RefreshEngine::refetch_for`]. It never joins a round trip issued before
//! the change; it queues a new one behind it instead.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::future::{BoxFuture, FutureExt, Shared, WeakShared};
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::cache::{lock, GameCache};
use crate::error::{Result, SpaceshipError};
use crate::event::{EventSink, SpaceshipEvent};
use crate::protocol::{GameId, GameState};
use crate::transport::Transport;

/// Default minimum time the refreshing indicator stays on.
pub const DEFAULT_REFRESH_SETTLE: Duration = Duration::from_millis(200);

/// Marks whether the owner of an operation still wants its result.
///
/// Cloning yields another handle to the same flag. Once revoked, a token
/// stays revoked.
#[derive(Debug, Clone)]
pub struct Liveness(Arc<AtomicBool>);

impl Liveness {
    /// A token that is alive until [`revoke`](Self::revoke) is called.
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(true)))
    }

    pub fn is_alive(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    /// Mark the owner as gone.
    pub fn revoke(&self) {
        self.0.store(false, Ordering::Release);
    }
}

impl Default for Liveness {
    fn default() -> Self {
        Self::new()
    }
}

type PendingRefresh = Shared<BoxFuture<'static, Result<GameState>>>;

struct InFlight {
    id: u64,
    generation: u64,
    pending: WeakShared<BoxFuture<'static, Result<GameState>>>,
    owners: Arc<Mutex<Vec<Liveness>>>,
}

#[derive(Default)]
struct RefreshState {
    next_flight: u64,
    in_flight: HashMap<GameId, InFlight>,
    /// Bumped every time a game is known to have changed on the server.
    generation: HashMap<GameId, u64>,
    settled_at: HashMap<GameId, Instant>,
}

struct RefreshInner {
    transport: Arc<dyn Transport>,
    cache: Arc<GameCache>,
    settle: Duration,
    state: Mutex<RefreshState>,
    events: Option<EventSink>,
}

/// Fetches the authoritative state of a game and stores it in the cache.
///
/// Cheap to clone; clones share the in-flight table.
#[derive(Clone)]
pub struct RefreshEngine {
    inner: Arc<RefreshInner>,
}

impl RefreshEngine {
    /// Create an engine writing into `cache`.
    ///
    /// `settle` is how long [`is_refreshing`](Self::is_refreshing) keeps
    /// reporting `true` after a round trip completes.
    pub fn new(transport: Arc<dyn Transport>, cache: Arc<GameCache>, settle: Duration) -> Self {
        Self::build(transport, cache, settle, None)
    }

    pub(crate) fn build(
        transport: Arc<dyn Transport>,
        cache: Arc<GameCache>,
        settle: Duration,
        events: Option<EventSink>,
    ) -> Self {
        Self {
            inner: Arc::new(RefreshInner {
                transport,
                cache,
                settle,
                state: Mutex::new(RefreshState::default()),
                events,
            }),
        }
    }

    /// The cache this engine writes into.
    pub fn cache(&self) -> &Arc<GameCache> {
        &self.inner.cache
    }

    /// Refresh a game on behalf of an owner that never goes away.
    ///
    /// # Errors
    ///
    /// Returns [`SpaceshipError::GameUnreachable`] if the round trip fails, or
    /// [`SpaceshipError::GameIdMismatch`] if the server answered for another
    /// game. The cache entry is left unchanged in both cases.
    pub async fn refresh(&self, game_id: &str) -> Result<GameState> {
        self.refresh_for(game_id, &Liveness::new()).await
    }

    /// Refresh a game on behalf of `owner`.
    ///
    /// Joins the in-flight refresh for `game_id` if there is one. The fetched
    /// state is returned to every joined caller, but written to the cache only
    /// if at least one of them is still alive when the round trip completes.
    ///
    /// # Errors
    ///
    /// Same as [`refresh`](Self::refresh).
    pub async fn refresh_for(&self, game_id: &str, owner: &Liveness) -> Result<GameState> {
        let pending = self.join_or_start(game_id, owner, false);
        pending.await
    }

    /// Refresh a game that just changed on the server, e.g. after a salvo
    /// was accepted.
    ///
    /// A round trip already in flight may carry the state from before the
    /// change, so it is not joined. A new round trip is queued behind it and
    /// issued once it completes. Later refreshes join the new one.
    ///
    /// # Errors
    ///
    /// Same as [`refresh`](Self::refresh).
    pub async fn refetch_for(&self, game_id: &str, owner: &Liveness) -> Result<GameState> {
        let pending = self.join_or_start(game_id, owner, true);
        pending.await
    }

    /// Returns `true` while a refresh of the game is in flight, and for the
    /// settle duration after it completed.
    pub fn is_refreshing(&self, game_id: &str) -> bool {
        let state = lock(&self.inner.state);
        let in_flight = state
            .in_flight
            .get(game_id)
            .and_then(|flight| flight.pending.upgrade())
            .is_some();
        in_flight
            || state
                .settled_at
                .get(game_id)
                .is_some_and(|at| at.elapsed() < self.inner.settle)
    }

    fn join_or_start(&self, game_id: &str, owner: &Liveness, changed: bool) -> PendingRefresh {
        let mut state = lock(&self.inner.state);

        let generation = {
            let generation = state.generation.entry(game_id.to_string()).or_default();
            if changed {
                *generation += 1;
            }
            *generation
        };

        let mut behind = None;
        if let Some(flight) = state.in_flight.get(game_id) {
            if let Some(pending) = flight.pending.upgrade() {
                if flight.generation == generation {
                    debug!(game_id = %game_id, "joining in-flight refresh");
                    lock(&flight.owners).push(owner.clone());
                    return pending;
                }
                debug!(game_id = %game_id, "in-flight refresh predates a change, queueing behind it");
                behind = Some(pending);
            }
        }

        // Nothing joinable is in flight: it predates a change, or every caller
        // of the previous refresh dropped it before completion.
        let id = state.next_flight;
        state.next_flight = state.next_flight.wrapping_add(1);
        let owners = Arc::new(Mutex::new(vec![owner.clone()]));
        let pending = run_refresh(
            Arc::clone(&self.inner),
            game_id.to_string(),
            id,
            Arc::clone(&owners),
            behind,
        )
        .boxed()
        .shared();
        if let Some(weak) = pending.downgrade() {
            state.in_flight.insert(
                game_id.to_string(),
                InFlight {
                    id,
                    generation,
                    pending: weak,
                    owners,
                },
            );
        }
        pending
    }
}

impl std::fmt::Debug for RefreshEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let in_flight = lock(&self.inner.state).in_flight.len();
        f.debug_struct("RefreshEngine")
            .field("settle", &self.inner.settle)
            .field("in_flight", &in_flight)
            .finish()
    }
}

async fn run_refresh(
    inner: Arc<RefreshInner>,
    game_id: GameId,
    id: u64,
    owners: Arc<Mutex<Vec<Liveness>>>,
    behind: Option<PendingRefresh>,
) -> Result<GameState> {
    if let Some(previous) = behind {
        // Its outcome describes the game before the change.
        let _ = previous.await;
    }

    debug!(game_id = %game_id, "refreshing game");
    let result = inner.transport.game_status(&game_id).await;

    {
        let mut state = lock(&inner.state);
        if state.in_flight.get(&game_id).is_some_and(|flight| flight.id == id) {
            state.in_flight.remove(&game_id);
        }
        state.settled_at.insert(game_id.clone(), Instant::now());
    }

    let fetched = match result {
        Ok(fetched) => fetched,
        Err(source) => {
            warn!(game_id = %game_id, "refresh failed: {source}");
            return Err(SpaceshipError::GameUnreachable { game_id, source });
        }
    };

    if fetched.game_id != game_id {
        warn!(
            game_id = %game_id,
            returned = %fetched.game_id,
            "refresh returned another game, discarding"
        );
        return Err(SpaceshipError::GameIdMismatch {
            expected: game_id,
            actual: fetched.game_id,
        });
    }

    let alive = lock(&owners).iter().any(Liveness::is_alive);
    if !alive {
        debug!(game_id = %game_id, "every owner is gone, discarding refresh result");
        return Ok(fetched);
    }

    inner.cache.put(&game_id, fetched.clone())?;
    if let Some(events) = &inner.events {
        events.emit(SpaceshipEvent::GameUpdated {
            game_id,
            state: Box::new(fetched.clone()),
        });
    }
    Ok(fetched)
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
    use crate::error::RequestError;
    use crate::protocol::{FireRequest, NewGameRequest, SalvoReport, WhoAmIResponse};
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;
    use tokio::sync::Semaphore;

    /// Serves a fixed state per game after the gate grants a permit.
    struct GatedTransport {
        gate: Arc<Semaphore>,
        calls: Arc<AtomicUsize>,
        reply: std::result::Result<GameState, RequestError>,
    }

    impl GatedTransport {
        fn new(
            reply: std::result::Result<GameState, RequestError>,
        ) -> (Self, Arc<Semaphore>, Arc<AtomicUsize>) {
            let gate = Arc::new(Semaphore::new(0));
            let calls = Arc::new(AtomicUsize::new(0));
            let transport = Self {
                gate: Arc::clone(&gate),
                calls: Arc::clone(&calls),
                reply,
            };
            (transport, gate, calls)
        }
    }

    #[async_trait]
    impl Transport for GatedTransport {
        async fn whoami(&self) -> std::result::Result<WhoAmIResponse, RequestError> {
            Err(RequestError::Network("unused".into()))
        }

        async fn new_game(
            &self,
            _req: &NewGameRequest,
        ) -> std::result::Result<GameState, RequestError> {
            Err(RequestError::Network("unused".into()))
        }

        async fn game_status(&self, _game_id: &str) -> std::result::Result<GameState, RequestError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.gate.acquire().await.unwrap().forget();
            self.reply.clone()
        }

        async fn fire(
            &self,
            _game_id: &str,
            _req: &FireRequest,
        ) -> std::result::Result<SalvoReport, RequestError> {
            Err(RequestError::Network("unused".into()))
        }
    }

    fn engine(transport: GatedTransport) -> RefreshEngine {
        RefreshEngine::new(
            Arc::new(transport),
            Arc::new(GameCache::new()),
            Duration::from_millis(50),
        )
    }

    #[tokio::test]
    async fn overlapping_refreshes_share_one_round_trip() {
        let (transport, gate, calls) = GatedTransport::new(Ok(GameState::new("g", 5)));
        let engine = engine(transport);

        let a = tokio::spawn({
            let engine = engine.clone();
            async move { engine.refresh("g").await }
        });
        let b = tokio::spawn({
            let engine = engine.clone();
            async move { engine.refresh("g").await }
        });
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(engine.is_refreshing("g"));

        gate.add_permits(1);
        let a = a.await.unwrap().unwrap();
        let b = b.await.unwrap().unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(a, b);
        assert_eq!(engine.cache().get("g"), Some(a));
    }

    #[tokio::test]
    async fn failure_leaves_cache_untouched() {
        let (transport, gate, _calls) = GatedTransport::new(Err(RequestError::Status {
            status: 404,
            body: "Game not found".into(),
        }));
        gate.add_permits(1);
        let engine = engine(transport);
        engine.cache().put("g", GameState::new("g", 4)).unwrap();

        let err = engine.refresh("g").await.unwrap_err();
        assert!(matches!(err, SpaceshipError::GameUnreachable { ref game_id, .. } if game_id == "g"));
        assert_eq!(engine.cache().get("g").unwrap().shots(), 4);
    }

    #[tokio::test]
    async fn mismatched_game_id_is_not_cached() {
        let (transport, gate, _calls) = GatedTransport::new(Ok(GameState::new("other", 5)));
        gate.add_permits(1);
        let engine = engine(transport);

        let err = engine.refresh("g").await.unwrap_err();
        assert!(matches!(err, SpaceshipError::GameIdMismatch { .. }));
        assert!(engine.cache().is_empty());
    }

    #[tokio::test]
    async fn revoked_owner_does_not_write() {
        let (transport, gate, _calls) = GatedTransport::new(Ok(GameState::new("g", 5)));
        gate.add_permits(1);
        let engine = engine(transport);
        let owner = Liveness::new();
        owner.revoke();

        let state = engine.refresh_for("g", &owner).await.unwrap();
        assert_eq!(state.shots(), 5);
        assert!(engine.cache().get("g").is_none());
    }

    #[tokio::test]
    async fn one_live_owner_is_enough() {
        let (transport, gate, calls) = GatedTransport::new(Ok(GameState::new("g", 5)));
        let engine = engine(transport);
        let gone = Liveness::new();
        let live = Liveness::new();

        let first = tokio::spawn({
            let engine = engine.clone();
            let gone = gone.clone();
            async move { engine.refresh_for("g", &gone).await }
        });
        tokio::time::sleep(Duration::from_millis(20)).await;
        let second = tokio::spawn({
            let engine = engine.clone();
            async move { engine.refresh_for("g", &live).await }
        });
        tokio::time::sleep(Duration::from_millis(20)).await;
        gone.revoke();
        gate.add_permits(1);

        first.await.unwrap().unwrap();
        second.await.unwrap().unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(engine.cache().get("g").is_some());
    }

    #[tokio::test]
    async fn refreshing_indicator_settles_after_completion() {
        let (transport, gate, _calls) = GatedTransport::new(Ok(GameState::new("g", 5)));
        gate.add_permits(1);
        let engine = engine(transport);
        assert!(!engine.is_refreshing("g"));

        engine.refresh("g").await.unwrap();
        assert!(engine.is_refreshing("g"));

        tokio::time::sleep(Duration::from_millis(80)).await;
        assert!(!engine.is_refreshing("g"));
    }

    #[tokio::test]
    async fn refetch_queues_behind_an_older_round_trip() {
        let (transport, gate, calls) = GatedTransport::new(Ok(GameState::new("g", 5)));
        let engine = engine(transport);

        let older = tokio::spawn({
            let engine = engine.clone();
            async move { engine.refresh("g").await }
        });
        tokio::time::sleep(Duration::from_millis(20)).await;
        let refetch = tokio::spawn({
            let engine = engine.clone();
            async move { engine.refetch_for("g", &Liveness::new()).await }
        });
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1, "second round trip must wait");

        gate.add_permits(1);
        older.await.unwrap().unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(engine.is_refreshing("g"));

        // A plain refresh now joins the newer round trip.
        let joined = tokio::spawn({
            let engine = engine.clone();
            async move { engine.refresh("g").await }
        });
        tokio::time::sleep(Duration::from_millis(20)).await;
        gate.add_permits(1);
        refetch.await.unwrap().unwrap();
        joined.await.unwrap().unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn abandoned_refresh_is_restarted() {
        let (transport, gate, calls) = GatedTransport::new(Ok(GameState::new("g", 5)));
        let engine = engine(transport);

        let abandoned = tokio::spawn({
            let engine = engine.clone();
            async move { engine.refresh("g").await }
        });
        tokio::time::sleep(Duration::from_millis(20)).await;
        abandoned.abort();
        let _ = abandoned.await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(!engine.is_refreshing("g"));

        gate.add_permits(1);
        engine.refresh("g").await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
