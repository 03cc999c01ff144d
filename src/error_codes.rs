//! Classification of rejected salvos.
//!
//! The fire endpoint answers failures with a bare status code and a short
//! plain-text reason (`"Not your turn"`, `"Coords invalid"`, ...). A game that
//! is already over answers with HTTP 404 and a body describing the misses.
//! [`FireRejection::classify`] folds those into a closed set of reasons the
//! view layer can show to the player.

use std::fmt;

use crate::error::RequestError;

/// Why the server refused a salvo.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FireRejection {
    /// It is the opponent's turn.
    NotYourTurn,
    /// The game has already been won.
    GameFinished,
    /// The server does not know the game.
    UnknownGame,
    /// One or more shots could not be parsed by the server.
    InvalidSalvo,
    /// The salvo has more shots than the player has ships alive.
    TooManyShots,
    /// The request never reached the server.
    Unreachable,
    /// Any other refusal.
    Other,
}

impl FireRejection {
    /// Classify the request failure returned by a fire round trip.
    pub fn classify(err: &RequestError) -> Self {
        match err {
            RequestError::Network(_) => Self::Unreachable,
            RequestError::Decode(_) => Self::Other,
            RequestError::Status { status: 404, .. } => Self::GameFinished,
            RequestError::Status { body, .. } => {
                let body = body.to_ascii_lowercase();
                if body.contains("not your turn") {
                    Self::NotYourTurn
                } else if body.contains("game not found") {
                    Self::UnknownGame
                } else if body.contains("coords invalid") {
                    Self::InvalidSalvo
                } else if body.contains("more shots than") {
                    Self::TooManyShots
                } else {
                    Self::Other
                }
            }
        }
    }

    /// Returns a human-readable description of this rejection.
    pub fn description(&self) -> &'static str {
        match self {
            Self::NotYourTurn => "It is not your turn. Wait for your opponent to fire.",
            Self::GameFinished => "The game is already over. No more salvos can be fired.",
            Self::UnknownGame => "The server does not know this game.",
            Self::InvalidSalvo => "The server could not parse one or more shots.",
            Self::TooManyShots => "The salvo has more shots than you have ships alive.",
            Self::Unreachable => "The server could not be reached. Try firing again.",
            Self::Other => "The server rejected the salvo.",
        }
    }

    /// Returns `true` when firing the same salvo again may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::NotYourTurn | Self::Unreachable | Self::Other)
    }
}

impl fmt::Display for FireRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.description())
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

    fn status(status: u16, body: &str) -> RequestError {
        RequestError::Status {
            status,
            body: body.into(),
        }
    }

    #[test]
    fn classifies_server_reasons() {
        assert_eq!(
            FireRejection::classify(&status(400, "Not your turn")),
            FireRejection::NotYourTurn
        );
        assert_eq!(
            FireRejection::classify(&status(400, "Game not found")),
            FireRejection::UnknownGame
        );
        assert_eq!(
            FireRejection::classify(&status(400, "Coords invalid")),
            FireRejection::InvalidSalvo
        );
        assert_eq!(
            FireRejection::classify(&status(
                400,
                "Failed to fire salvo: More shots than ships alive (3)"
            )),
            FireRejection::TooManyShots
        );
        assert_eq!(
            FireRejection::classify(&status(500, "boom")),
            FireRejection::Other
        );
    }

    #[test]
    fn not_found_means_the_game_is_over() {
        let rejection = FireRejection::classify(&status(404, r#"{"salvo":{}}"#));
        assert_eq!(rejection, FireRejection::GameFinished);
        assert!(!rejection.is_retryable());
    }

    #[test]
    fn network_failures_are_retryable() {
        let rejection = FireRejection::classify(&RequestError::Network("refused".into()));
        assert_eq!(rejection, FireRejection::Unreachable);
        assert!(rejection.is_retryable());
    }

    #[test]
    fn display_uses_description() {
        assert_eq!(
            FireRejection::NotYourTurn.to_string(),
            FireRejection::NotYourTurn.description()
        );
    }
}
