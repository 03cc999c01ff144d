//! Integration-style client tests for the XL Spaceship client.
//!
//! Uses the shared `MockTransport` from `tests/common` to script server
//! replies and verify that `SpaceshipClient` keeps the cache consistent,
//! de-duplicates refreshes, sizes salvos and stops polling with its views.

mod common;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc::Receiver;
use tokio_test::{assert_err, assert_ok};
use xlspaceship_client::{
    EnterOutcome, FireRejection, GameView, Salvo, SalvoGenerator, SpaceshipClient,
    SpaceshipConfig, SpaceshipError, SpaceshipEvent,
};

use common::{
    all_missed, game, not_found, status, wait_for, whoami, within, won_game, MockServer,
    MockTransport,
};

// ════════════════════════════════════════════════════════════════════
// Helpers
// ════════════════════════════════════════════════════════════════════

/// A poll interval long enough that no tick fires during a test.
const NO_POLLING: Duration = Duration::from_secs(60);

fn start_client(
    poll_interval: Duration,
) -> (SpaceshipClient, Receiver<SpaceshipEvent>, Arc<MockServer>) {
    let (transport, server) = MockTransport::new();
    let config = SpaceshipConfig::new()
        .with_poll_interval(poll_interval)
        .with_salvo_seed(7);
    let (client, events) = SpaceshipClient::start(transport, config);
    (client, events, server)
}

async fn enter(client: &SpaceshipClient, game_id: &str) -> GameView {
    match client.enter_game(game_id).await {
        EnterOutcome::Ready(view) => view,
        EnterOutcome::NotFound { error, .. } => panic!("game {game_id} not loaded: {error}"),
    }
}

/// Receive events until one matches `pred`.
async fn expect_event(
    events: &mut Receiver<SpaceshipEvent>,
    pred: impl Fn(&SpaceshipEvent) -> bool,
) -> SpaceshipEvent {
    within(async {
        loop {
            let ev = events.recv().await.expect("event channel closed");
            if pred(&ev) {
                return ev;
            }
        }
    })
    .await
}

// ════════════════════════════════════════════════════════════════════
// Entering a game
// ════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn entering_an_uncached_game_fetches_it_then_polls() {
    let (client, _events, server) = start_client(Duration::from_millis(20));
    server.set_status(game("g", 5));

    let view = enter(&client, "g").await;
    assert_eq!(server.status_calls("g"), 1);
    assert_eq!(client.game("g").unwrap().shots(), 5);
    assert_eq!(view.pending_salvo().unwrap().len(), 5);

    server.set_status(game("g", 4));
    assert!(wait_for(|| client.game("g").unwrap().shots() == 4).await);
    assert!(wait_for(|| view.pending_salvo().unwrap().len() == 4).await);
    assert!(server.status_calls("g") >= 2);

    view.close().await;
}

#[tokio::test]
async fn entering_a_cached_game_does_not_fetch_immediately() {
    let (client, _events, server) = start_client(NO_POLLING);
    server.set_status(game("g", 5));
    assert_ok!(client.refresh("g").await);

    let view = enter(&client, "g").await;
    assert_eq!(server.status_calls("g"), 1);
    assert_eq!(view.state().unwrap().shots(), 5);
    view.close().await;
}

#[tokio::test]
async fn unknown_game_is_not_found_and_never_polled() {
    let (client, mut events, server) = start_client(Duration::from_millis(20));

    let outcome = client.enter_game("missing").await;
    let EnterOutcome::NotFound { game_id, error } = outcome else {
        panic!("expected NotFound");
    };
    assert_eq!(game_id, "missing");
    assert!(matches!(error, SpaceshipError::GameUnreachable { .. }));

    let ev = expect_event(&mut events, |ev| {
        matches!(ev, SpaceshipEvent::GameNotFound { .. })
    })
    .await;
    if let SpaceshipEvent::GameNotFound { reason, .. } = ev {
        assert!(reason.contains("Game not found"), "reason: {reason}");
    }

    tokio::time::sleep(Duration::from_millis(80)).await;
    assert_eq!(server.status_calls("missing"), 1);
    assert!(client.game("missing").is_none());
}

#[tokio::test]
async fn failed_poll_keeps_state_and_keeps_polling() {
    let (client, mut events, server) = start_client(Duration::from_millis(20));
    server.set_status(game("g", 5));
    let view = enter(&client, "g").await;

    server.set_status_error("g", status(500, "boom"));
    expect_event(&mut events, |ev| {
        matches!(ev, SpaceshipEvent::RefreshFailed { game_id, .. } if game_id == "g")
    })
    .await;
    assert_eq!(client.game("g").unwrap().shots(), 5);

    let calls = server.status_calls("g");
    assert!(wait_for(|| server.status_calls("g") > calls + 1).await);

    server.set_status(game("g", 2));
    assert!(wait_for(|| client.game("g").unwrap().shots() == 2).await);
    view.close().await;
}

// ════════════════════════════════════════════════════════════════════
// Refresh de-duplication
// ════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn concurrent_refreshes_share_one_round_trip() {
    let (client, _events, server) = start_client(NO_POLLING);
    server.set_status(game("g", 5));
    let gate = server.gate_status();

    let (a, b, ()) = tokio::join!(client.refresh("g"), client.refresh("g"), async {
        assert!(wait_for(|| server.status_calls("g") == 1).await);
        assert!(client.is_refreshing("g"));
        gate.add_permits(1);
    });

    assert_eq!(assert_ok!(a), assert_ok!(b));
    assert_eq!(server.status_calls("g"), 1);
    assert_eq!(client.game("g").unwrap().shots(), 5);
}

#[tokio::test]
async fn sequential_refreshes_each_hit_the_server() {
    let (client, _events, server) = start_client(NO_POLLING);
    server.set_status(game("g", 5));

    assert_ok!(client.refresh("g").await);
    assert_ok!(client.refresh("g").await);
    assert_eq!(server.status_calls("g"), 2);
}

#[tokio::test]
async fn refreshing_indicator_outlives_a_fast_refresh() {
    let (transport, server) = MockTransport::new();
    let config = SpaceshipConfig::new()
        .with_poll_interval(NO_POLLING)
        .with_refresh_settle(Duration::from_millis(100));
    let (client, _events) = SpaceshipClient::start(transport, config);
    server.set_status(game("g", 5));

    assert!(!client.is_refreshing("g"));
    assert_ok!(client.refresh("g").await);
    assert!(client.is_refreshing("g"));
    assert!(wait_for(|| !client.is_refreshing("g")).await);
}

#[tokio::test]
async fn failed_refresh_leaves_cache_unchanged() {
    let (client, _events, server) = start_client(NO_POLLING);
    server.set_status(game("g", 5));
    assert_ok!(client.refresh("g").await);

    server.set_status_error("g", not_found());
    let err = assert_err!(client.refresh("g").await);
    assert!(matches!(err, SpaceshipError::GameUnreachable { .. }));
    assert_eq!(client.game("g").unwrap().shots(), 5);
}

// ════════════════════════════════════════════════════════════════════
// View teardown
// ════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn refresh_completing_after_teardown_is_discarded() {
    let (client, _events, server) = start_client(Duration::from_millis(20));
    server.set_status(game("g", 5));
    let mut view = enter(&client, "g").await;

    let gate = server.gate_status();
    server.set_status(game("g", 2));
    assert!(wait_for(|| server.status_calls("g") >= 2).await);
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert!(client.is_refreshing("g"));

    view.teardown();
    assert!(!view.is_active());
    let calls = server.status_calls("g");
    gate.add_permits(10);

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(client.game("g").unwrap().shots(), 5);
    assert_eq!(server.status_calls("g"), calls);
    view.close().await;
}

#[tokio::test]
async fn dropping_a_view_stops_polling() {
    let (client, _events, server) = start_client(Duration::from_millis(20));
    server.set_status(game("g", 5));
    let view = enter(&client, "g").await;
    assert!(wait_for(|| server.status_calls("g") >= 2).await);

    drop(view);
    tokio::time::sleep(Duration::from_millis(40)).await;
    let calls = server.status_calls("g");
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(server.status_calls("g"), calls);
}

#[tokio::test]
async fn two_views_of_one_game_poll_independently() {
    let (client, _events, server) = start_client(Duration::from_millis(20));
    server.set_status(game("g", 5));
    let mut first = enter(&client, "g").await;
    let second = enter(&client, "g").await;

    first.teardown();
    server.set_status(game("g", 1));
    assert!(wait_for(|| client.game("g").unwrap().shots() == 1).await);

    first.close().await;
    second.close().await;
}

// ════════════════════════════════════════════════════════════════════
// Firing
// ════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn fire_resizes_next_salvo_to_new_allowance() {
    let (client, mut events, server) = start_client(NO_POLLING);
    server.set_status(game("g", 5));
    let view = enter(&client, "g").await;
    let salvo = view.pending_salvo().unwrap();
    assert_eq!(salvo.len(), 5);

    server.push_fire(Ok(all_missed(&["0x0"])));
    server.set_status(game("g", 3));
    let state = assert_ok!(view.fire().await);

    assert_eq!(state.shots(), 3);
    assert_eq!(client.game("g").unwrap().shots(), 3);
    assert_eq!(view.pending_salvo().unwrap().len(), 3);
    {
        let fired = server.fired.lock().unwrap();
        assert_eq!(fired.len(), 1);
        assert_eq!(fired[0].0, "g");
        assert_eq!(fired[0].1.salvo, salvo);
    }
    assert_eq!(server.status_calls("g"), 2);

    expect_event(&mut events, |ev| matches!(ev, SpaceshipEvent::SalvoFired { .. })).await;
    let ev = expect_event(&mut events, |ev| {
        matches!(ev, SpaceshipEvent::SalvoPrepared { salvo, .. } if salvo.len() == 3)
    })
    .await;
    assert!(matches!(ev, SpaceshipEvent::SalvoPrepared { game_id, .. } if game_id == "g"));
    view.close().await;
}

#[tokio::test]
async fn fire_does_not_reuse_a_status_request_sent_before_it() {
    let (client, _events, server) = start_client(NO_POLLING);
    server.set_status(game("g", 5));
    let view = enter(&client, "g").await;
    assert_eq!(server.status_calls("g"), 1);

    // The next status reply still shows the old allowance; the one after it
    // reflects the accepted salvo.
    server.push_status("g", Ok(game("g", 3)));
    server.push_fire(Ok(all_missed(&["0x0"])));
    let gate = server.gate_status();

    let (stale, fired) = within(async {
        tokio::join!(client.refresh("g"), async {
            assert!(wait_for(|| server.status_calls("g") == 2).await);
            let fire = view.fire();
            let release = async {
                assert!(wait_for(|| server.fire_calls() == 1).await);
                gate.add_permits(2);
            };
            tokio::join!(fire, release).0
        })
    })
    .await;

    assert_eq!(assert_ok!(stale).shots(), 5);
    let state = assert_ok!(fired);
    assert_eq!(state.shots(), 3);
    assert_eq!(server.status_calls("g"), 3);
    assert_eq!(client.game("g").unwrap().shots(), 3);
    assert_eq!(view.pending_salvo().unwrap().len(), 3);
    view.close().await;
}

#[tokio::test]
async fn wrong_salvo_length_is_rejected_locally() {
    let (client, _events, server) = start_client(NO_POLLING);
    server.set_status(game("g", 5));
    assert_ok!(client.refresh("g").await);
    let before = client.game("g");

    let salvo = SalvoGenerator::from_seed(1).generate(2);
    let err = assert_err!(client.fire("g", salvo).await);
    assert_eq!(
        err,
        SpaceshipError::SalvoLengthMismatch {
            game_id: "g".into(),
            expected: 5,
            actual: 2,
        }
    );
    assert_eq!(server.fire_calls(), 0);
    assert_eq!(client.game("g"), before);
}

#[tokio::test]
async fn firing_at_an_unloaded_game_fails() {
    let (client, _events, server) = start_client(NO_POLLING);
    let err = assert_err!(client.fire("g", Salvo::default()).await);
    assert!(matches!(err, SpaceshipError::GameNotLoaded { .. }));
    assert_eq!(server.fire_calls(), 0);
}

#[tokio::test]
async fn rejected_salvo_keeps_pending_salvo() {
    let (client, mut events, server) = start_client(NO_POLLING);
    server.set_status(game("g", 4));
    let view = enter(&client, "g").await;
    let pending = view.pending_salvo().unwrap();

    server.push_fire(Err(status(400, "Not your turn")));
    let err = assert_err!(view.fire().await);
    assert!(matches!(
        err,
        SpaceshipError::FireRejected {
            rejection: FireRejection::NotYourTurn,
            ..
        }
    ));

    assert_eq!(view.pending_salvo(), Some(pending));
    assert_eq!(server.status_calls("g"), 1);
    let ev = expect_event(&mut events, |ev| {
        matches!(ev, SpaceshipEvent::FireRejected { .. })
    })
    .await;
    assert!(matches!(
        ev,
        SpaceshipEvent::FireRejected {
            rejection: FireRejection::NotYourTurn,
            ..
        }
    ));
    view.close().await;
}

#[tokio::test]
async fn finished_game_rejects_salvo() {
    let (client, _events, server) = start_client(NO_POLLING);
    server.set_status(game("g", 1));
    assert_ok!(client.refresh("g").await);

    server.push_fire(Err(status(404, r#"{"salvo":{"0x0":"miss"}}"#)));
    let err = assert_err!(client.fire_pending("g").await);
    let SpaceshipError::FireRejected { rejection, .. } = err else {
        panic!("expected FireRejected, got {err:?}");
    };
    assert_eq!(rejection, FireRejection::GameFinished);
    assert!(!rejection.is_retryable());
}

#[tokio::test]
async fn player_chosen_salvo_is_fired() {
    let (client, _events, server) = start_client(NO_POLLING);
    server.set_status(game("g", 2));
    assert_ok!(client.refresh("g").await);

    let chosen = Salvo::from_shots(&["ax3", "0xf"]).unwrap();
    client.set_salvo("g", chosen.clone());
    server.push_fire(Ok(all_missed(&["ax3", "0xf"])));
    assert_ok!(client.fire_pending("g").await);

    assert_eq!(server.fired.lock().unwrap()[0].1.salvo, chosen);
}

// ════════════════════════════════════════════════════════════════════
// Identity and lobby
// ════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn whoami_emits_identity() {
    let (client, mut events, server) = start_client(NO_POLLING);
    server.push_whoami(Ok(whoami(&["a", "b", "a"])));

    let session = assert_ok!(client.whoami().await);
    assert_eq!(session.identity.display_name, "Player One");
    assert_eq!(session.roster.len(), 2);

    let ev = within(events.recv()).await.unwrap();
    assert_eq!(ev, SpaceshipEvent::IdentityResolved(session));
}

#[tokio::test]
async fn whoami_failure_is_reported() {
    let (client, mut events, server) = start_client(NO_POLLING);
    server.push_whoami(Err(xlspaceship_client::RequestError::Network(
        "connection refused".into(),
    )));

    let err = assert_err!(client.whoami().await);
    assert!(matches!(err, SpaceshipError::IdentityUnavailable(_)));
    let ev = within(events.recv()).await.unwrap();
    assert!(matches!(ev, SpaceshipEvent::IdentityUnavailable { .. }));
}

#[tokio::test]
async fn lobby_skips_games_already_won() {
    let (client, _events, server) = start_client(Duration::from_millis(20));
    server.push_whoami(Ok(whoami(&["a", "w"])));
    server.set_status(game("a", 5));
    server.set_status(won_game("w"));

    let lobby = client.watch_lobby();
    assert!(wait_for(|| server.status_calls("a") >= 3).await);
    assert_eq!(server.status_calls("w"), 1);
    assert!(server.whoami_calls() >= 3);
    assert!(client.game("w").unwrap().is_won());
    assert_eq!(lobby.session().unwrap().roster.len(), 2);
    lobby.close().await;
}

#[tokio::test]
async fn lobby_keeps_polling_known_games_when_identity_fails() {
    let (client, mut events, server) = start_client(Duration::from_millis(20));
    server.push_whoami(Err(status(503, "unavailable")));
    server.set_status(game("g", 5));
    assert_ok!(client.refresh("g").await);

    let lobby = client.watch_lobby();
    expect_event(&mut events, |ev| {
        matches!(ev, SpaceshipEvent::IdentityUnavailable { .. })
    })
    .await;
    assert!(wait_for(|| server.status_calls("g") >= 3).await);
    assert!(lobby.session().is_none());
    lobby.close().await;
}

// ════════════════════════════════════════════════════════════════════
// Challenge
// ════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn challenge_caches_the_new_game() {
    let (client, mut events, server) = start_client(NO_POLLING);
    server.push_new_game(Ok(game("match-2", 5)));

    let state = assert_ok!(client.challenge("localhost", 9001).await);
    assert_eq!(state.game_id, "match-2");
    assert_eq!(client.game("match-2"), Some(state));

    let request = server.challenges.lock().unwrap()[0].clone();
    assert_eq!(request.spaceship_protocol.hostname, "localhost");
    assert_eq!(request.spaceship_protocol.port, 9001);

    let ev = within(events.recv()).await.unwrap();
    assert!(matches!(ev, SpaceshipEvent::GameUpdated { game_id, .. } if game_id == "match-2"));
}

#[tokio::test]
async fn failed_challenge_is_reported() {
    let (client, _events, server) = start_client(NO_POLLING);
    server.push_new_game(Err(status(400, "cannot reach opponent")));

    let err = assert_err!(client.challenge("nowhere", 1).await);
    assert!(matches!(err, SpaceshipError::GameCreationFailed(_)));
    assert!(client.games().is_empty());
}
