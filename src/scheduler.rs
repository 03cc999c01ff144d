//! Periodic polling scoped to a view.
//!
//! Entering a game view or watching the lobby spawns a background poll loop.
//! The returned [`GameView`] / [`LobbyView`] owns that loop: tearing the view
//! down stops the ticks and revokes the view's [`Liveness`], after which no
//! refresh started on its behalf may write into the cache. A refresh already
//! in flight at teardown is allowed to finish; its result is discarded.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::future::join_all;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{interval, interval_at, Instant, Interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::cache::{lock, GameCache};
use crate::error::{Result, SpaceshipError};
use crate::event::{error_chain, EventSink, SpaceshipEvent};
use crate::fire::FireEngine;
use crate::identity::{GameRoster, IdentityResolver, Session};
use crate::protocol::{GameId, GameState};
use crate::refresh::{Liveness, RefreshEngine};
use crate::salvo::Salvo;

/// Default period between two polling ticks.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(1000);

/// Default time a view's poll loop gets to exit on [`GameView::close`].
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(1);

/// Starts and owns the poll loops of views.
///
/// Cheap to clone; every clone drives the same engines.
#[derive(Debug, Clone)]
pub struct PollScheduler {
    refresh: RefreshEngine,
    fire: FireEngine,
    identity: IdentityResolver,
    events: EventSink,
    poll_interval: Duration,
    shutdown_timeout: Duration,
}

/// Outcome of [`PollScheduler::enter_game`].
#[derive(Debug)]
pub enum EnterOutcome {
    /// The game is loaded and being polled.
    Ready(GameView),
    /// The first refresh failed. Nothing is polled; the view layer should
    /// navigate back to the lobby.
    NotFound {
        game_id: GameId,
        error: SpaceshipError,
    },
}

impl PollScheduler {
    pub(crate) fn new(
        refresh: RefreshEngine,
        fire: FireEngine,
        identity: IdentityResolver,
        events: EventSink,
        poll_interval: Duration,
        shutdown_timeout: Duration,
    ) -> Self {
        Self {
            refresh,
            fire,
            identity,
            events,
            poll_interval: poll_interval.max(Duration::from_millis(1)),
            shutdown_timeout,
        }
    }

    fn cache(&self) -> &Arc<GameCache> {
        self.refresh.cache()
    }

    /// Enter a game view.
    ///
    /// A game that is not cached yet is refreshed once first. If that fails a
    /// [`GameNotFound`](SpaceshipEvent::GameNotFound) event is emitted and
    /// polling never starts. Otherwise the pending salvo is sized to the
    /// cached allowance and the game is refreshed every poll interval, the
    /// first tick one interval from now.
    pub async fn enter_game(&self, game_id: &str) -> EnterOutcome {
        let liveness = Liveness::new();

        if !self.cache().contains(game_id) {
            if let Err(error) = self.refresh.refresh_for(game_id, &liveness).await {
                warn!(game_id = %game_id, "cannot enter game: {error}");
                self.events.emit(SpaceshipEvent::GameNotFound {
                    game_id: game_id.to_string(),
                    reason: error_chain(&error),
                });
                return EnterOutcome::NotFound {
                    game_id: game_id.to_string(),
                    error,
                };
            }
        }

        if let Err(e) = self.fire.prepare_salvo(game_id) {
            debug!(game_id = %game_id, "no salvo prepared on entry: {e}");
        }

        let mut ticker = interval_at(Instant::now() + self.poll_interval, self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let handle = PollHandle::spawn(liveness, self.shutdown_timeout, |liveness, shutdown| {
            poll_game(self.clone(), game_id.to_string(), ticker, liveness, shutdown)
        });
        info!(game_id = %game_id, interval = ?self.poll_interval, "polling game");

        EnterOutcome::Ready(GameView {
            game_id: game_id.to_string(),
            scheduler: self.clone(),
            handle,
        })
    }

    /// Watch the lobby.
    ///
    /// Every tick, starting immediately, re-resolves the player's identity and
    /// refreshes every known game the player has not won yet. Known games are
    /// the roster of the latest identity plus every cached game.
    pub fn watch_lobby(&self) -> LobbyView {
        let session = Arc::new(Mutex::new(None));
        let mut ticker = interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let handle = PollHandle::spawn(Liveness::new(), self.shutdown_timeout, |liveness, shutdown| {
            poll_lobby(self.clone(), Arc::clone(&session), ticker, liveness, shutdown)
        });
        info!(interval = ?self.poll_interval, "polling lobby");

        LobbyView { session, handle }
    }

    async fn lobby_tick(&self, latest: &Mutex<Option<Session>>, liveness: &Liveness) {
        let roster = match self.identity.resolve_identity().await {
            Ok(session) => {
                let roster = session.roster.clone();
                if liveness.is_alive() {
                    *lock(latest) = Some(session.clone());
                    self.events.emit(SpaceshipEvent::IdentityResolved(session));
                }
                roster
            }
            Err(e) => {
                if liveness.is_alive() {
                    self.events.emit(SpaceshipEvent::IdentityUnavailable {
                        reason: error_chain(&e),
                    });
                }
                lock(latest)
                    .as_ref()
                    .map(|s| s.roster.clone())
                    .unwrap_or_default()
            }
        };

        let targets = self.lobby_targets(&roster);
        debug!(games = targets.len(), "lobby refresh");
        let results = join_all(
            targets
                .iter()
                .map(|game_id| self.refresh.refresh_for(game_id, liveness)),
        )
        .await;

        if !liveness.is_alive() {
            return;
        }
        for (game_id, result) in targets.iter().zip(results) {
            if let Err(e) = result {
                self.events.refresh_failed(game_id, &e);
            }
        }
    }

    /// Roster order first, then cached games missing from the roster.
    fn lobby_targets(&self, roster: &GameRoster) -> Vec<GameId> {
        let cached = self.cache().all();
        let mut seen = HashSet::new();
        let mut extra: Vec<&GameId> = cached
            .keys()
            .filter(|id| !roster.contains(id))
            .collect();
        extra.sort();

        roster
            .iter()
            .chain(extra)
            .filter(|id| seen.insert(id.as_str()))
            .filter(|id| cached.get(*id).is_none_or(|state| !state.is_won()))
            .cloned()
            .collect()
    }
}

/// Background loop plus the handles needed to stop it.
#[derive(Debug)]
struct PollHandle {
    liveness: Liveness,
    task: Option<JoinHandle<()>>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    shutdown_timeout: Duration,
}

impl PollHandle {
    fn spawn<F, Fut>(liveness: Liveness, shutdown_timeout: Duration, poll: F) -> Self
    where
        F: FnOnce(Liveness, oneshot::Receiver<()>) -> Fut,
        Fut: std::future::Future<Output = ()> + Send + 'static,
    {
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let task = tokio::spawn(poll(liveness.clone(), shutdown_rx));
        Self {
            liveness,
            task: Some(task),
            shutdown_tx: Some(shutdown_tx),
            shutdown_timeout,
        }
    }

    fn teardown(&mut self) {
        self.liveness.revoke();
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }

    async fn close(&mut self) {
        self.teardown();
        if let Some(mut task) = self.task.take() {
            match tokio::time::timeout(self.shutdown_timeout, &mut task).await {
                Ok(Ok(())) => {}
                Ok(Err(join_err)) => warn!("poll loop terminated with join error: {join_err}"),
                Err(_) => {
                    warn!("poll loop did not exit within timeout; aborting task");
                    task.abort();
                    if let Err(join_err) = task.await {
                        debug!("poll loop aborted: {join_err}");
                    }
                }
            }
        }
    }
}

impl Drop for PollHandle {
    fn drop(&mut self) {
        // The loop exits on its own once signalled. A refresh it is awaiting
        // runs to completion, but the revoked liveness keeps it out of the cache.
        self.teardown();
    }
}

/// A game being polled on behalf of a view.
///
/// Dropping the view tears it down; [`close`](Self::close) additionally waits
/// for the poll loop to exit.
#[derive(Debug)]
pub struct GameView {
    game_id: GameId,
    scheduler: PollScheduler,
    handle: PollHandle,
}

impl GameView {
    pub fn game_id(&self) -> &str {
        &self.game_id
    }

    /// Returns `true` until the view is torn down.
    pub fn is_active(&self) -> bool {
        self.handle.liveness.is_alive()
    }

    /// Last known state of the game.
    pub fn state(&self) -> Option<GameState> {
        self.scheduler.cache().get(&self.game_id)
    }

    /// Returns `true` while the refreshing indicator should be shown.
    pub fn is_refreshing(&self) -> bool {
        self.scheduler.refresh.is_refreshing(&self.game_id)
    }

    pub fn pending_salvo(&self) -> Option<Salvo> {
        self.scheduler.fire.pending_salvo(&self.game_id)
    }

    /// Replace the pending salvo with one chosen by the player.
    pub fn set_salvo(&self, salvo: Salvo) {
        self.scheduler.fire.set_salvo(&self.game_id, salvo);
    }

    /// Fire the pending salvo.
    ///
    /// # Errors
    ///
    /// See [`FireEngine::fire_for`].
    pub async fn fire(&self) -> Result<GameState> {
        self.scheduler
            .fire
            .fire_pending(&self.game_id, &self.handle.liveness)
            .await
    }

    /// Refresh the game now, outside the polling schedule.
    ///
    /// # Errors
    ///
    /// See [`RefreshEngine::refresh`].
    pub async fn refresh(&self) -> Result<GameState> {
        self.scheduler
            .refresh
            .refresh_for(&self.game_id, &self.handle.liveness)
            .await
    }

    /// Stop polling. Idempotent and synchronous: once it returns, nothing
    /// started on behalf of this view writes into the cache.
    pub fn teardown(&mut self) {
        if self.is_active() {
            debug!(game_id = %self.game_id, "game view torn down");
        }
        self.handle.teardown();
    }

    /// Tear down and wait for the poll loop to exit, aborting it after the
    /// configured shutdown timeout.
    pub async fn close(mut self) {
        self.teardown();
        self.handle.close().await;
    }
}

/// The lobby being polled on behalf of a view.
#[derive(Debug)]
pub struct LobbyView {
    session: Arc<Mutex<Option<Session>>>,
    handle: PollHandle,
}

impl LobbyView {
    /// Identity and roster from the latest successful tick.
    pub fn session(&self) -> Option<Session> {
        lock(&self.session).clone()
    }

    pub fn is_active(&self) -> bool {
        self.handle.liveness.is_alive()
    }

    /// Stop polling. Idempotent.
    pub fn teardown(&mut self) {
        self.handle.teardown();
    }

    /// Tear down and wait for the poll loop to exit.
    pub async fn close(mut self) {
        self.handle.close().await;
    }
}

async fn poll_game(
    scheduler: PollScheduler,
    game_id: GameId,
    mut ticker: Interval,
    liveness: Liveness,
    mut shutdown_rx: oneshot::Receiver<()>,
) {
    debug!(game_id = %game_id, "game poll loop started");
    loop {
        tokio::select! {
            biased;

            // Also resolves when the view is dropped.
            _ = &mut shutdown_rx => break,

            _ = ticker.tick() => {
                if !liveness.is_alive() {
                    break;
                }
                match scheduler.refresh.refresh_for(&game_id, &liveness).await {
                    Ok(_) if liveness.is_alive() => {
                        if let Err(e) = scheduler.fire.prepare_salvo(&game_id) {
                            debug!(game_id = %game_id, "salvo not resized: {e}");
                        }
                    }
                    Ok(_) => {}
                    Err(e) => {
                        if liveness.is_alive() {
                            scheduler.events.refresh_failed(&game_id, &e);
                        }
                    }
                }
            }
        }
    }
    debug!(game_id = %game_id, "game poll loop stopped");
}

async fn poll_lobby(
    scheduler: PollScheduler,
    session: Arc<Mutex<Option<Session>>>,
    mut ticker: Interval,
    liveness: Liveness,
    mut shutdown_rx: oneshot::Receiver<()>,
) {
    debug!("lobby poll loop started");
    loop {
        tokio::select! {
            biased;

            _ = &mut shutdown_rx => break,

            _ = ticker.tick() => {
                if !liveness.is_alive() {
                    break;
                }
                scheduler.lobby_tick(&session, &liveness).await;
            }
        }
    }
    debug!("lobby poll loop stopped");
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
    use crate::salvo::SalvoGenerator;
    use crate::transport::Transport;
    use async_trait::async_trait;

    struct StaticTransport;

    #[async_trait]
    impl Transport for StaticTransport {
        async fn whoami(&self) -> std::result::Result<WhoAmIResponse, RequestError> {
            Ok(WhoAmIResponse {
                user_id: "player-1".into(),
                full_name: "Player One".into(),
                games: vec!["b".into(), "a".into()],
            })
        }

        async fn new_game(
            &self,
            _req: &NewGameRequest,
        ) -> std::result::Result<GameState, RequestError> {
            Err(RequestError::Network("unused".into()))
        }

        async fn game_status(&self, game_id: &str) -> std::result::Result<GameState, RequestError> {
            Ok(GameState::new(game_id, 5))
        }

        async fn fire(
            &self,
            _game_id: &str,
            _req: &FireRequest,
        ) -> std::result::Result<SalvoReport, RequestError> {
            Ok(SalvoReport::default())
        }
    }

    fn scheduler() -> (PollScheduler, tokio::sync::mpsc::Receiver<SpaceshipEvent>) {
        let transport: Arc<dyn Transport> = Arc::new(StaticTransport);
        let (events, rx) = EventSink::channel(64);
        let refresh = RefreshEngine::build(
            Arc::clone(&transport),
            Arc::new(GameCache::new()),
            Duration::ZERO,
            Some(events.clone()),
        );
        let fire = FireEngine::build(
            Arc::clone(&transport),
            refresh.clone(),
            SalvoGenerator::from_seed(1),
            Some(events.clone()),
        );
        let scheduler = PollScheduler::new(
            refresh,
            fire,
            IdentityResolver::new(transport),
            events,
            Duration::from_millis(20),
            DEFAULT_SHUTDOWN_TIMEOUT,
        );
        (scheduler, rx)
    }

    #[test]
    fn lobby_targets_skip_won_games_and_keep_roster_order() {
        let (scheduler, _rx) = scheduler();
        let mut won = GameState::new("won", 0);
        won.won = Some(true);
        let mut lost = GameState::new("lost", 0);
        lost.won = Some(false);
        scheduler.cache().put("won", won).unwrap();
        scheduler.cache().put("lost", lost).unwrap();
        scheduler.cache().put("b", GameState::new("b", 5)).unwrap();

        let roster = GameRoster::new(vec!["b".into(), "won".into(), "new".into()]);
        assert_eq!(scheduler.lobby_targets(&roster), vec!["b", "new", "lost"]);
    }

    #[tokio::test]
    async fn entering_a_game_prepares_a_salvo() {
        let (scheduler, _rx) = scheduler();
        let EnterOutcome::Ready(view) = scheduler.enter_game("g").await else {
            panic!("expected the game to load");
        };
        assert_eq!(view.state().unwrap().shots(), 5);
        assert_eq!(view.pending_salvo().unwrap().len(), 5);
        view.close().await;
    }

    #[tokio::test]
    async fn teardown_is_idempotent() {
        let (scheduler, _rx) = scheduler();
        let EnterOutcome::Ready(mut view) = scheduler.enter_game("g").await else {
            panic!("expected the game to load");
        };
        view.teardown();
        view.teardown();
        assert!(!view.is_active());
        view.close().await;
    }

    #[tokio::test]
    async fn lobby_resolves_identity_on_first_tick() {
        let (scheduler, mut rx) = scheduler();
        let lobby = scheduler.watch_lobby();

        let event = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(event, SpaceshipEvent::IdentityResolved(_)));
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(lobby.session().unwrap().identity.player_id, "player-1");
        lobby.close().await;
    }
}
