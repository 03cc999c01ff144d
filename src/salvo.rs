//! Salvos and their random generation.
//!
//! A [`Salvo`] is the ordered batch of shots fired in one turn. Its required
//! length is the player's current shot allowance (`self.shots` of the latest
//! game state), so the generator takes the size as input rather than assuming
//! a fixed count.

use rand::rngs::StdRng;
use rand::{Rng, RngCore, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::codec::{Coordinate, BOARD_SIZE};
use crate::error::Result;

/// An ordered batch of shots.
///
/// Serializes as a JSON array of wire shot strings. Shots are not required to
/// be distinct; duplicate shots are the server's concern.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Salvo(Vec<Coordinate>);

impl Salvo {
    /// Wrap an ordered list of coordinates.
    pub fn new(shots: Vec<Coordinate>) -> Self {
        Self(shots)
    }

    /// Decode a salvo from wire shot strings.
    ///
    /// # Errors
    ///
    /// Returns [`SpaceshipError::MalformedShot`](crate::SpaceshipError::MalformedShot)
    /// for the first string that is not a valid shot.
    pub fn from_shots<S: AsRef<str>>(shots: &[S]) -> Result<Self> {
        shots
            .iter()
            .map(|s| crate::codec::decode(s.as_ref()))
            .collect::<Result<Vec<_>>>()
            .map(Self)
    }

    /// Number of shots.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` if the salvo has no shots.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The shots, in firing order.
    pub fn shots(&self) -> &[Coordinate] {
        &self.0
    }

    /// Wire representation of every shot, in firing order.
    pub fn to_wire(&self) -> Vec<String> {
        self.0.iter().map(Coordinate::to_shot).collect()
    }
}

impl From<Vec<Coordinate>> for Salvo {
    fn from(shots: Vec<Coordinate>) -> Self {
        Self(shots)
    }
}

/// Produces salvos of uniformly random coordinates.
///
/// The randomness source is injected, so a seeded generator yields the same
/// salvos on every run.
///
/// ```
/// use xlspaceship_client::SalvoGenerator;
///
/// let mut a = SalvoGenerator::from_seed(7);
/// let mut b = SalvoGenerator::from_seed(7);
/// assert_eq!(a.generate(5), b.generate(5));
/// assert!(a.generate(0).is_empty());
/// ```
pub struct SalvoGenerator {
    rng: Box<dyn RngCore + Send>,
}

impl SalvoGenerator {
    /// Use the given randomness source.
    pub fn new(rng: impl RngCore + Send + 'static) -> Self {
        Self { rng: Box::new(rng) }
    }

    /// Deterministic generator for tests and reproducible sessions.
    pub fn from_seed(seed: u64) -> Self {
        Self::new(StdRng::seed_from_u64(seed))
    }

    /// Deterministic generator derived from a player id.
    ///
    /// The seed is the sum of the id's characters, so the same player sees
    /// the same sequence of salvos across restarts.
    pub fn for_player(player_id: &str) -> Self {
        let seed = player_id.chars().map(u64::from).sum();
        Self::from_seed(seed)
    }

    /// Generator seeded from operating system entropy.
    pub fn from_entropy() -> Self {
        Self::new(StdRng::from_os_rng())
    }

    /// Draw `n` independent coordinates, uniform over the board on each axis.
    pub fn generate(&mut self, n: usize) -> Salvo {
        let shots = (0..n)
            .map(|_| {
                let x = self.rng.random_range(0..BOARD_SIZE);
                let y = self.rng.random_range(0..BOARD_SIZE);
                Coordinate::from_axes(x, y)
            })
            .collect();
        Salvo(shots)
    }
}

impl std::fmt::Debug for SalvoGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SalvoGenerator").finish_non_exhaustive()
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
    fn generates_exactly_n_shots() {
        let mut generator = SalvoGenerator::from_seed(1);
        for n in [0, 1, 3, 5, 17, 64] {
            assert_eq!(generator.generate(n).len(), n);
        }
    }

    #[test]
    fn zero_shots_is_empty_not_an_error() {
        let mut generator = SalvoGenerator::from_seed(1);
        assert!(generator.generate(0).is_empty());
    }

    #[test]
    fn shots_stay_on_the_board() {
        let mut generator = SalvoGenerator::from_seed(99);
        let salvo = generator.generate(500);
        assert!(salvo
            .shots()
            .iter()
            .all(|c| c.x() < BOARD_SIZE && c.y() < BOARD_SIZE));
    }

    #[test]
    fn same_seed_same_salvos() {
        let mut a = SalvoGenerator::for_player("player-1");
        let mut b = SalvoGenerator::for_player("player-1");
        assert_eq!(a.generate(8), b.generate(8));
        assert_eq!(a.generate(3), b.generate(3));
    }

    #[test]
    fn serializes_as_shot_array() {
        let salvo = Salvo::from_shots(&["0x0", "ax3", "FxF"]).unwrap();
        assert_eq!(
            serde_json::to_value(&salvo).unwrap(),
            serde_json::json!(["0x0", "ax3", "fxf"])
        );
        assert_eq!(salvo.to_wire(), vec!["0x0", "ax3", "fxf"]);
    }

    #[test]
    fn from_shots_rejects_bad_entries() {
        let err = Salvo::from_shots(&["0x0", "nope"]).unwrap_err();
        assert_eq!(err, crate::SpaceshipError::MalformedShot("nope".into()));
    }
}
