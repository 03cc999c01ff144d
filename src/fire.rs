//! Salvo submission and pending-salvo bookkeeping.
//!
//! Each game has at most one pending salvo: the shots the player will fire
//! next. It is sized to the cached shot allowance, kept untouched when the
//! server refuses a salvo, and regenerated from the post-fire state after the
//! server accepts one.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use tracing::{debug, info, warn};

use crate::cache::{lock, GameCache};
use crate::error::{Result, SpaceshipError};
use crate::error_codes::FireRejection;
use crate::event::{error_chain, EventSink, SpaceshipEvent};
use crate::protocol::{FireRequest, GameId, GameState};
use crate::refresh::{Liveness, RefreshEngine};
use crate::salvo::{Salvo, SalvoGenerator};
use crate::transport::Transport;

struct FireInner {
    transport: Arc<dyn Transport>,
    refresh: RefreshEngine,
    generator: Mutex<SalvoGenerator>,
    pending: Mutex<HashMap<GameId, Salvo>>,
    firing: Mutex<HashSet<GameId>>,
    events: Option<EventSink>,
}

/// Validates, submits and follows up on salvos.
///
/// Cheap to clone; clones share the pending salvos.
#[derive(Clone)]
pub struct FireEngine {
    inner: Arc<FireInner>,
}

/// Marks a game as having a salvo in flight until dropped.
struct FiringGuard<'a> {
    firing: &'a Mutex<HashSet<GameId>>,
    game_id: &'a str,
}

impl<'a> FiringGuard<'a> {
    fn acquire(firing: &'a Mutex<HashSet<GameId>>, game_id: &'a str) -> Result<Self> {
        if !lock(firing).insert(game_id.to_string()) {
            return Err(SpaceshipError::FireInProgress {
                game_id: game_id.to_string(),
            });
        }
        Ok(Self { firing, game_id })
    }
}

impl Drop for FiringGuard<'_> {
    fn drop(&mut self) {
        lock(self.firing).remove(self.game_id);
    }
}

impl FireEngine {
    /// Create an engine that submits through `transport` and follows every
    /// accepted salvo with a refresh through `refresh`.
    pub fn new(
        transport: Arc<dyn Transport>,
        refresh: RefreshEngine,
        generator: SalvoGenerator,
    ) -> Self {
        Self::build(transport, refresh, generator, None)
    }

    pub(crate) fn build(
        transport: Arc<dyn Transport>,
        refresh: RefreshEngine,
        generator: SalvoGenerator,
        events: Option<EventSink>,
    ) -> Self {
        Self {
            inner: Arc::new(FireInner {
                transport,
                refresh,
                generator: Mutex::new(generator),
                pending: Mutex::new(HashMap::new()),
                firing: Mutex::new(HashSet::new()),
                events,
            }),
        }
    }

    fn cache(&self) -> &Arc<GameCache> {
        self.inner.refresh.cache()
    }

    fn emit(&self, event: SpaceshipEvent) {
        if let Some(events) = &self.inner.events {
            events.emit(event);
        }
    }

    /// The salvo the player will fire next, if one has been prepared.
    pub fn pending_salvo(&self, game_id: &str) -> Option<Salvo> {
        lock(&self.inner.pending).get(game_id).cloned()
    }

    /// Make sure the pending salvo matches the cached shot allowance.
    ///
    /// Keeps the current pending salvo if its length is right, otherwise
    /// generates a new one.
    ///
    /// # Errors
    ///
    /// Returns [`SpaceshipError::GameNotLoaded`] if the game is not cached.
    pub fn prepare_salvo(&self, game_id: &str) -> Result<Salvo> {
        let shots = self.cached(game_id)?.shots();
        if let Some(salvo) = self.pending_salvo(game_id) {
            if salvo.len() == shots {
                return Ok(salvo);
            }
            debug!(
                game_id = %game_id,
                pending = salvo.len(),
                shots,
                "pending salvo no longer matches allowance"
            );
        }
        Ok(self.regenerate(game_id, shots))
    }

    /// Replace the pending salvo with one chosen by the player.
    ///
    /// The length is checked when the salvo is fired, not here.
    pub fn set_salvo(&self, game_id: &str, salvo: Salvo) {
        lock(&self.inner.pending).insert(game_id.to_string(), salvo);
    }

    /// Fire `salvo` on behalf of an owner that never goes away.
    ///
    /// # Errors
    ///
    /// See [`fire_for`](Self::fire_for).
    pub async fn fire(&self, game_id: &str, salvo: Salvo) -> Result<GameState> {
        self.fire_for(game_id, salvo, &Liveness::new()).await
    }

    /// Fire the pending salvo, preparing one first if there is none.
    ///
    /// # Errors
    ///
    /// See [`fire_for`](Self::fire_for).
    pub async fn fire_pending(&self, game_id: &str, owner: &Liveness) -> Result<GameState> {
        let salvo = match self.pending_salvo(game_id) {
            Some(salvo) => salvo,
            None => self.prepare_salvo(game_id)?,
        };
        self.fire_for(game_id, salvo, owner).await
    }

    /// Submit a salvo, then refresh the game and prepare the next salvo.
    ///
    /// The salvo must have exactly as many shots as the cached allowance.
    /// Nothing is sent and nothing changes if it does not. On success the
    /// refreshed state is returned and the pending salvo is regenerated with
    /// the new allowance, which may be smaller than before.
    ///
    /// # Errors
    ///
    /// - [`SpaceshipError::GameNotLoaded`] if the game is not cached.
    /// - [`SpaceshipError::SalvoLengthMismatch`] if the length is wrong.
    /// - [`SpaceshipError::FireInProgress`] if another salvo for the game has
    ///   not completed yet.
    /// - [`SpaceshipError::FireRejected`] if the server refused the salvo. The
    ///   cache and the pending salvo are left as they were.
    /// - Any refresh error if the follow-up refresh fails. The salvo was
    ///   accepted in that case; the next poll catches up.
    pub async fn fire_for(
        &self,
        game_id: &str,
        salvo: Salvo,
        owner: &Liveness,
    ) -> Result<GameState> {
        let expected = self.cached(game_id)?.shots();
        if salvo.len() != expected {
            return Err(SpaceshipError::SalvoLengthMismatch {
                game_id: game_id.to_string(),
                expected,
                actual: salvo.len(),
            });
        }

        let _guard = FiringGuard::acquire(&self.inner.firing, game_id)?;
        info!(game_id = %game_id, shots = salvo.len(), "firing salvo");

        let request = FireRequest { salvo };
        let report = match self.inner.transport.fire(game_id, &request).await {
            Ok(report) => report,
            Err(source) => {
                let rejection = FireRejection::classify(&source);
                warn!(game_id = %game_id, ?rejection, "salvo rejected: {source}");
                let err = SpaceshipError::FireRejected {
                    game_id: game_id.to_string(),
                    rejection,
                    source,
                };
                if owner.is_alive() {
                    self.emit(SpaceshipEvent::FireRejected {
                        game_id: game_id.to_string(),
                        rejection,
                        reason: error_chain(&err),
                    });
                }
                return Err(err);
            }
        };

        debug!(
            game_id = %game_id,
            hits = report.hits(),
            kills = report.kills(),
            "salvo accepted"
        );
        if owner.is_alive() {
            self.emit(SpaceshipEvent::SalvoFired {
                game_id: game_id.to_string(),
                report,
            });
        }

        let refreshed = self.inner.refresh.refetch_for(game_id, owner).await?;
        if owner.is_alive() {
            self.regenerate(game_id, refreshed.shots());
        }
        Ok(refreshed)
    }

    fn cached(&self, game_id: &str) -> Result<GameState> {
        self.cache()
            .get(game_id)
            .ok_or_else(|| SpaceshipError::GameNotLoaded {
                game_id: game_id.to_string(),
            })
    }

    fn regenerate(&self, game_id: &str, shots: usize) -> Salvo {
        let salvo = lock(&self.inner.generator).generate(shots);
        debug!(game_id = %game_id, shots, "prepared salvo");
        lock(&self.inner.pending).insert(game_id.to_string(), salvo.clone());
        self.emit(SpaceshipEvent::SalvoPrepared {
            game_id: game_id.to_string(),
            salvo: salvo.clone(),
        });
        salvo
    }
}

impl std::fmt::Debug for FireEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FireEngine")
            .field("pending", &lock(&self.inner.pending).len())
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
    use crate::error::RequestError;
    use crate::protocol::{NewGameRequest, SalvoReport, WhoAmIResponse};
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    type Reply<T> = std::result::Result<T, RequestError>;

    #[derive(Default)]
    struct ScriptedTransport {
        statuses: Mutex<VecDeque<Reply<GameState>>>,
        fires: Mutex<VecDeque<Reply<SalvoReport>>>,
        fired: Mutex<Vec<FireRequest>>,
        status_calls: AtomicUsize,
    }

    #[async_trait]
    impl Transport for ScriptedTransport {
        async fn whoami(&self) -> Reply<WhoAmIResponse> {
            Err(RequestError::Network("unused".into()))
        }

        async fn new_game(&self, _req: &NewGameRequest) -> Reply<GameState> {
            Err(RequestError::Network("unused".into()))
        }

        async fn game_status(&self, _game_id: &str) -> Reply<GameState> {
            self.status_calls.fetch_add(1, Ordering::SeqCst);
            self.statuses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(RequestError::Network("script exhausted".into())))
        }

        async fn fire(&self, _game_id: &str, req: &FireRequest) -> Reply<SalvoReport> {
            self.fired.lock().unwrap().push(req.clone());
            self.fires
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(RequestError::Network("script exhausted".into())))
        }
    }

    fn setup(transport: ScriptedTransport) -> (FireEngine, Arc<ScriptedTransport>) {
        let transport = Arc::new(transport);
        let refresh = RefreshEngine::new(
            Arc::clone(&transport) as Arc<dyn Transport>,
            Arc::new(GameCache::new()),
            Duration::ZERO,
        );
        let engine = FireEngine::new(
            Arc::clone(&transport) as Arc<dyn Transport>,
            refresh,
            SalvoGenerator::from_seed(3),
        );
        (engine, transport)
    }

    #[tokio::test]
    async fn fire_requires_a_cached_game() {
        let (engine, transport) = setup(ScriptedTransport::default());
        let err = engine
            .fire("g", SalvoGenerator::from_seed(1).generate(5))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            SpaceshipError::GameNotLoaded {
                game_id: "g".into()
            }
        );
        assert!(transport.fired.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn wrong_length_never_reaches_the_network() {
        let (engine, transport) = setup(ScriptedTransport::default());
        let state = GameState::new("g", 5);
        engine.cache().put("g", state.clone()).unwrap();

        let err = engine
            .fire("g", SalvoGenerator::from_seed(1).generate(3))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            SpaceshipError::SalvoLengthMismatch {
                game_id: "g".into(),
                expected: 5,
                actual: 3,
            }
        );
        assert!(transport.fired.lock().unwrap().is_empty());
        assert_eq!(engine.cache().get("g"), Some(state));
    }

    #[tokio::test]
    async fn accepted_salvo_resizes_the_next_one() {
        let transport = ScriptedTransport::default();
        transport
            .fires
            .lock()
            .unwrap()
            .push_back(Ok(SalvoReport::default()));
        transport
            .statuses
            .lock()
            .unwrap()
            .push_back(Ok(GameState::new("g", 3)));
        let (engine, transport) = setup(transport);
        engine.cache().put("g", GameState::new("g", 5)).unwrap();

        let salvo = engine.prepare_salvo("g").unwrap();
        assert_eq!(salvo.len(), 5);

        let state = engine.fire("g", salvo.clone()).await.unwrap();
        assert_eq!(state.shots(), 3);
        assert_eq!(transport.fired.lock().unwrap()[0].salvo, salvo);
        assert_eq!(transport.status_calls.load(Ordering::SeqCst), 1);
        assert_eq!(engine.cache().get("g").unwrap().shots(), 3);
        assert_eq!(engine.pending_salvo("g").unwrap().len(), 3);
    }

    #[tokio::test]
    async fn rejected_salvo_is_kept_for_retry() {
        let transport = ScriptedTransport::default();
        transport
            .fires
            .lock()
            .unwrap()
            .push_back(Err(RequestError::Status {
                status: 400,
                body: "Not your turn".into(),
            }));
        let (engine, transport) = setup(transport);
        let state = GameState::new("g", 2);
        engine.cache().put("g", state.clone()).unwrap();
        let salvo = engine.prepare_salvo("g").unwrap();

        let err = engine
            .fire_pending("g", &Liveness::new())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            SpaceshipError::FireRejected {
                rejection: FireRejection::NotYourTurn,
                ..
            }
        ));
        assert_eq!(engine.pending_salvo("g"), Some(salvo));
        assert_eq!(engine.cache().get("g"), Some(state));
        assert_eq!(transport.status_calls.load(Ordering::SeqCst), 0);
        assert!(engine.inner.firing.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn prepare_keeps_a_matching_salvo() {
        let (engine, _transport) = setup(ScriptedTransport::default());
        engine.cache().put("g", GameState::new("g", 4)).unwrap();
        let chosen = Salvo::from_shots(&["0x0", "1x1", "2x2", "3x3"]).unwrap();
        engine.set_salvo("g", chosen.clone());

        assert_eq!(engine.prepare_salvo("g").unwrap(), chosen);

        engine.cache().put("g", GameState::new("g", 2)).unwrap();
        let resized = engine.prepare_salvo("g").unwrap();
        assert_eq!(resized.len(), 2);
    }

    #[tokio::test]
    async fn zero_allowance_prepares_an_empty_salvo() {
        let (engine, _transport) = setup(ScriptedTransport::default());
        engine.cache().put("g", GameState::new("g", 0)).unwrap();
        assert!(engine.prepare_salvo("g").unwrap().is_empty());
    }
}
