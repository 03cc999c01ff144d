#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing,
    dead_code
)]
//! Shared test utilities for XL Spaceship client integration tests.
//!
//! Provides a scripted [`MockTransport`] whose replies and call counts are
//! inspected through a shared [`MockServer`] handle, plus builders for common
//! response payloads.

use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Semaphore;
use xlspaceship_client::protocol::{
    FireRequest, GameState, NewGameRequest, SalvoReport, ShotOutcome, WhoAmIResponse,
};
use xlspaceship_client::{RequestError, Transport};

type Reply<T> = Result<T, RequestError>;

// ── MockServer ──────────────────────────────────────────────────────

/// Scripted server state shared between a [`MockTransport`] and the test.
///
/// Status replies are queued per game. The last queued reply is sticky: it
/// keeps being served until another one is queued behind it.
#[derive(Default)]
pub struct MockServer {
    whoami: StdMutex<VecDeque<Reply<WhoAmIResponse>>>,
    new_game: StdMutex<VecDeque<Reply<GameState>>>,
    statuses: StdMutex<HashMap<String, VecDeque<Reply<GameState>>>>,
    fires: StdMutex<VecDeque<Reply<SalvoReport>>>,
    status_gate: StdMutex<Option<Arc<Semaphore>>>,
    status_calls: StdMutex<HashMap<String, usize>>,
    whoami_calls: StdMutex<usize>,
    /// Every salvo submitted, in order.
    pub fired: StdMutex<Vec<(String, FireRequest)>>,
    /// Every challenge submitted, in order.
    pub challenges: StdMutex<Vec<NewGameRequest>>,
}

impl MockServer {
    /// Queue a status reply for a game.
    pub fn push_status(&self, game_id: &str, reply: Reply<GameState>) {
        self.statuses
            .lock()
            .unwrap()
            .entry(game_id.to_string())
            .or_default()
            .push_back(reply);
    }

    /// Replace every queued status reply of a game with `state`.
    pub fn set_status(&self, state: GameState) {
        let mut statuses = self.statuses.lock().unwrap();
        statuses.insert(state.game_id.clone(), VecDeque::from([Ok(state)]));
    }

    /// Make every further status call of a game fail with `err`.
    pub fn set_status_error(&self, game_id: &str, err: RequestError) {
        let mut statuses = self.statuses.lock().unwrap();
        statuses.insert(game_id.to_string(), VecDeque::from([Err(err)]));
    }

    pub fn push_whoami(&self, reply: Reply<WhoAmIResponse>) {
        self.whoami.lock().unwrap().push_back(reply);
    }

    pub fn push_new_game(&self, reply: Reply<GameState>) {
        self.new_game.lock().unwrap().push_back(reply);
    }

    pub fn push_fire(&self, reply: Reply<SalvoReport>) {
        self.fires.lock().unwrap().push_back(reply);
    }

    /// From now on every status call waits for a permit of the returned
    /// semaphore before answering.
    pub fn gate_status(&self) -> Arc<Semaphore> {
        let gate = Arc::new(Semaphore::new(0));
        *self.status_gate.lock().unwrap() = Some(Arc::clone(&gate));
        gate
    }

    /// Number of status calls made for a game.
    pub fn status_calls(&self, game_id: &str) -> usize {
        self.status_calls
            .lock()
            .unwrap()
            .get(game_id)
            .copied()
            .unwrap_or(0)
    }

    pub fn whoami_calls(&self) -> usize {
        *self.whoami_calls.lock().unwrap()
    }

    pub fn fire_calls(&self) -> usize {
        self.fired.lock().unwrap().len()
    }

    fn next_status(&self, game_id: &str) -> Reply<GameState> {
        let mut statuses = self.statuses.lock().unwrap();
        match statuses.get_mut(game_id) {
            Some(queue) if queue.len() > 1 => queue.pop_front().unwrap(),
            Some(queue) if !queue.is_empty() => queue[0].clone(),
            _ => Err(not_found()),
        }
    }
}

fn next<T: Clone>(queue: &StdMutex<VecDeque<Reply<T>>>) -> Reply<T> {
    let mut queue = queue.lock().unwrap();
    if queue.len() > 1 {
        queue.pop_front().unwrap()
    } else {
        queue
            .front()
            .cloned()
            .unwrap_or_else(|| Err(RequestError::Network("nothing scripted".into())))
    }
}

// ── MockTransport ───────────────────────────────────────────────────

/// A [`Transport`] answering from a [`MockServer`] script.
pub struct MockTransport {
    server: Arc<MockServer>,
}

impl MockTransport {
    /// Create a transport plus the handle used to script and inspect it.
    pub fn new() -> (Self, Arc<MockServer>) {
        let server = Arc::new(MockServer::default());
        (
            Self {
                server: Arc::clone(&server),
            },
            server,
        )
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn whoami(&self) -> Reply<WhoAmIResponse> {
        *self.server.whoami_calls.lock().unwrap() += 1;
        next(&self.server.whoami)
    }

    async fn new_game(&self, req: &NewGameRequest) -> Reply<GameState> {
        self.server.challenges.lock().unwrap().push(req.clone());
        next(&self.server.new_game)
    }

    async fn game_status(&self, game_id: &str) -> Reply<GameState> {
        *self
            .server
            .status_calls
            .lock()
            .unwrap()
            .entry(game_id.to_string())
            .or_default() += 1;

        let gate = self.server.status_gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.acquire().await.unwrap().forget();
        }
        self.server.next_status(game_id)
    }

    async fn fire(&self, game_id: &str, req: &FireRequest) -> Reply<SalvoReport> {
        self.server
            .fired
            .lock()
            .unwrap()
            .push((game_id.to_string(), req.clone()));
        next(&self.server.fires)
    }
}

// ── Payload helpers ─────────────────────────────────────────────────

/// A running game where it is the player's turn.
pub fn game(game_id: &str, shots: usize) -> GameState {
    let mut state = GameState::new(game_id, shots);
    state.player_turn = true;
    state.self_board.board.user_id = Some("player-1".into());
    state.self_board.board.board = vec!["*".repeat(16); 16];
    state.opponent.user_id = Some("player-2".into());
    state.opponent.board = vec![".".repeat(16); 16];
    state
}

/// A game the player has already won.
pub fn won_game(game_id: &str) -> GameState {
    let mut state = game(game_id, 0);
    state.won = Some(true);
    state.player_turn = false;
    state
}

pub fn whoami(games: &[&str]) -> WhoAmIResponse {
    WhoAmIResponse {
        user_id: "player-1".into(),
        full_name: "Player One".into(),
        games: games.iter().map(|g| g.to_string()).collect(),
    }
}

/// Report where every shot of `shots` missed.
pub fn all_missed(shots: &[&str]) -> SalvoReport {
    let mut report = SalvoReport::default();
    for shot in shots {
        report.salvo.insert(shot.to_string(), ShotOutcome::Miss);
    }
    report
}

pub fn not_found() -> RequestError {
    RequestError::Status {
        status: 404,
        body: "Game not found".into(),
    }
}

pub fn status(status: u16, body: &str) -> RequestError {
    RequestError::Status {
        status,
        body: body.into(),
    }
}

// ── Async helpers ───────────────────────────────────────────────────

/// Poll `condition` until it holds or two seconds pass.
pub async fn wait_for(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    condition()
}

/// Await `fut` for at most two seconds.
pub async fn within<T>(fut: impl Future<Output = T>) -> T {
    tokio::time::timeout(Duration::from_secs(2), fut)
        .await
        .expect("timed out")
}
