//! Error types for the XL Spaceship client.
//!
//! Local validation failures ([`InvalidCoordinate`](SpaceshipError::InvalidCoordinate),
//! [`MalformedShot`](SpaceshipError::MalformedShot),
//! [`SalvoLengthMismatch`](SpaceshipError::SalvoLengthMismatch), ...) never reach
//! the network. Remote failures wrap the [`RequestError`] that caused them.
//!
//! Both types are `Clone`: a de-duplicated refresh hands the very same outcome
//! to every caller that joined it.

use thiserror::Error;

use crate::error_codes::FireRejection;

/// Failure of a single round trip to the game server.
///
/// Transport failures and non-2xx responses are kept apart here so they can be
/// logged differently, but the engines fold both into the same
/// [`SpaceshipError`] kind.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RequestError {
    /// The request could not be sent or no response arrived.
    #[error("request failed: {0}")]
    Network(String),

    /// The server answered with a non-success status.
    #[error("server responded with HTTP {status}: {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Raw response body, usually a short plain-text reason.
        body: String,
    },

    /// The response body could not be decoded.
    #[error("failed to decode response: {0}")]
    Decode(String),
}

impl From<serde_json::Error> for RequestError {
    fn from(err: serde_json::Error) -> Self {
        Self::Decode(err.to_string())
    }
}

/// Errors that can occur when using the XL Spaceship client.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SpaceshipError {
    /// A coordinate axis is outside `[0, 15]`.
    #[error("coordinate ({x}, {y}) is outside the 16x16 board")]
    InvalidCoordinate {
        /// Requested column.
        x: i64,
        /// Requested row.
        y: i64,
    },

    /// A shot string does not match `<hexdigit>x<hexdigit>`.
    #[error("malformed shot `{0}`")]
    MalformedShot(String),

    /// The salvo does not match the player's current shot allowance.
    #[error("salvo for game {game_id} has {actual} shots but the allowance is {expected}")]
    SalvoLengthMismatch {
        /// Game the salvo was meant for.
        game_id: String,
        /// Current `self.shots` of the cached game state.
        expected: usize,
        /// Length of the rejected salvo.
        actual: usize,
    },

    /// An operation needs cached state for a game that has never been fetched.
    #[error("game {game_id} has not been loaded")]
    GameNotLoaded {
        /// Game identifier.
        game_id: String,
    },

    /// A salvo for this game is still awaiting the server.
    #[error("a salvo for game {game_id} is already in flight")]
    FireInProgress {
        /// Game identifier.
        game_id: String,
    },

    /// A response described a different game than the one requested.
    #[error("response for game {actual} cannot replace state of game {expected}")]
    GameIdMismatch {
        /// Game identifier that was requested.
        expected: String,
        /// Game identifier found in the response.
        actual: String,
    },

    /// The current player's identity could not be fetched.
    #[error("player identity unavailable")]
    IdentityUnavailable(#[source] RequestError),

    /// The status round trip for a game failed.
    #[error("game {game_id} is unreachable")]
    GameUnreachable {
        /// Game identifier.
        game_id: String,
        /// Underlying request failure.
        #[source]
        source: RequestError,
    },

    /// The server refused the salvo.
    #[error("salvo for game {game_id} rejected: {rejection}")]
    FireRejected {
        /// Game identifier.
        game_id: String,
        /// Classified reason.
        rejection: FireRejection,
        /// Underlying request failure.
        #[source]
        source: RequestError,
    },

    /// The new-game round trip failed.
    #[error("failed to create a new game")]
    GameCreationFailed(#[source] RequestError),
}

impl SpaceshipError {
    /// Returns `true` for errors raised before any network round trip.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::InvalidCoordinate { .. }
                | Self::MalformedShot(_)
                | Self::SalvoLengthMismatch { .. }
                | Self::GameNotLoaded { .. }
                | Self::FireInProgress { .. }
        )
    }
}

/// A specialized [`Result`] type for XL Spaceship client operations.
pub type Result<T> = std::result::Result<T, SpaceshipError>;

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
    use std::error::Error as _;

    #[test]
    fn serde_errors_become_decode_failures() {
        let err = serde_json::from_str::<u32>("nope").unwrap_err();
        assert!(matches!(RequestError::from(err), RequestError::Decode(_)));
    }

    #[test]
    fn remote_errors_expose_their_source() {
        let err = SpaceshipError::GameUnreachable {
            game_id: "match-1".into(),
            source: RequestError::Status {
                status: 404,
                body: "Game not found".into(),
            },
        };
        assert_eq!(err.to_string(), "game match-1 is unreachable");
        let source = err.source().unwrap();
        assert!(source.to_string().contains("404"));
        assert!(!err.is_validation());
    }

    #[test]
    fn local_errors_are_validation() {
        assert!(SpaceshipError::MalformedShot("zz".into()).is_validation());
        assert!(SpaceshipError::InvalidCoordinate { x: 16, y: 0 }.is_validation());
        assert!(SpaceshipError::SalvoLengthMismatch {
            game_id: "g".into(),
            expected: 5,
            actual: 3,
        }
        .is_validation());
    }
}
