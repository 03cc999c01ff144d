//! Events delivered to the view layer.
//!
//! Pollers and engines never block on the view: events go out over a bounded
//! channel with `try_send`, and are dropped with a warning when the consumer
//! falls behind. Every event is also reflected in [`GameCache`](crate::GameCache)
//! or returned from the call that caused it, so a dropped event loses no state.

use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::error::SpaceshipError;
use crate::error_codes::FireRejection;
use crate::identity::Session;
use crate::protocol::{GameId, GameState, SalvoReport};
use crate::salvo::Salvo;

/// Notifications emitted by the client.
#[derive(Debug, Clone, PartialEq)]
pub enum SpaceshipEvent {
    /// Identity and roster were fetched.
    IdentityResolved(Session),

    /// The identity round trip failed.
    IdentityUnavailable {
        /// Human-readable failure.
        reason: String,
    },

    /// A fresh state for a game was stored in the cache.
    GameUpdated {
        game_id: GameId,
        state: Box<GameState>,
    },

    /// A poll-driven refresh failed; polling continues.
    RefreshFailed {
        game_id: GameId,
        /// Human-readable failure.
        reason: String,
    },

    /// The first refresh of a game view failed. The view should navigate away.
    GameNotFound {
        game_id: GameId,
        /// Human-readable failure.
        reason: String,
    },

    /// A new pending salvo was generated for a game.
    SalvoPrepared { game_id: GameId, salvo: Salvo },

    /// The server accepted a salvo.
    SalvoFired {
        game_id: GameId,
        report: SalvoReport,
    },

    /// The server refused a salvo. The pending salvo is kept for a retry.
    FireRejected {
        game_id: GameId,
        rejection: FireRejection,
        /// Human-readable failure.
        reason: String,
    },
}

/// Sending half of the event channel, shared by every engine.
#[derive(Debug, Clone)]
pub(crate) struct EventSink {
    tx: mpsc::Sender<SpaceshipEvent>,
}

impl EventSink {
    /// Create a sink plus the receiver handed to the view layer.
    pub(crate) fn channel(capacity: usize) -> (Self, mpsc::Receiver<SpaceshipEvent>) {
        // tokio panics on a zero capacity.
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }

    /// Emit an event. If the channel is full, log a warning and drop it.
    pub(crate) fn emit(&self, event: SpaceshipEvent) {
        match self.tx.try_send(event) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(dropped)) => {
                warn!(
                    "event channel full, dropping event: {:?}",
                    std::mem::discriminant(&dropped)
                );
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!("event channel closed, receiver dropped");
            }
        }
    }

    /// Emit the event matching a failed refresh.
    pub(crate) fn refresh_failed(&self, game_id: &str, err: &SpaceshipError) {
        self.emit(SpaceshipEvent::RefreshFailed {
            game_id: game_id.to_string(),
            reason: error_chain(err),
        });
    }
}

/// Render an error together with its sources, `outer: inner`.
pub(crate) fn error_chain(err: &dyn std::error::Error) -> String {
    let mut out = err.to_string();
    let mut source = err.source();
    while let Some(inner) = source {
        out.push_str(": ");
        out.push_str(&inner.to_string());
        source = inner.source();
    }
    out
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

    #[tokio::test]
    async fn full_channel_drops_instead_of_blocking() {
        let (sink, mut rx) = EventSink::channel(1);
        sink.emit(SpaceshipEvent::IdentityUnavailable { reason: "a".into() });
        sink.emit(SpaceshipEvent::IdentityUnavailable { reason: "b".into() });

        let first = rx.recv().await.unwrap();
        assert_eq!(
            first,
            SpaceshipEvent::IdentityUnavailable { reason: "a".into() }
        );
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn zero_capacity_is_clamped() {
        let (sink, mut rx) = EventSink::channel(0);
        sink.emit(SpaceshipEvent::IdentityUnavailable { reason: "x".into() });
        assert!(rx.recv().await.is_some());
    }

    #[test]
    fn emit_after_receiver_dropped_is_silent() {
        let (sink, rx) = EventSink::channel(4);
        drop(rx);
        sink.emit(SpaceshipEvent::IdentityUnavailable { reason: "x".into() });
    }

    #[test]
    fn error_chain_includes_sources() {
        let err = SpaceshipError::GameUnreachable {
            game_id: "g".into(),
            source: RequestError::Network("connection refused".into()),
        };
        assert_eq!(
            error_chain(&err),
            "game g is unreachable: request failed: connection refused"
        );
    }
}
