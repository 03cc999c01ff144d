//! Board coordinates and their wire encoding.
//!
//! The board is 16x16. A shot travels as one hexadecimal digit per axis joined
//! by a literal `x`: `(10, 3)` is `"ax3"`. Encoding always emits lower-case
//! digits; decoding also accepts upper-case digits because servers render board
//! coordinates that way.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{Result, SpaceshipError};

/// Number of rows and columns on a board.
pub const BOARD_SIZE: u8 = 16;

/// Separator between the two digits of a wire shot.
const SEPARATOR: char = 'x';

/// A validated position on the board.
///
/// Both axes are guaranteed to be in `[0, 15]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Coordinate {
    x: u8,
    y: u8,
}

impl Coordinate {
    /// Create a coordinate, rejecting any axis outside the board.
    ///
    /// # Errors
    ///
    /// Returns [`SpaceshipError::InvalidCoordinate`] if either axis is outside `[0, 15]`.
    pub fn new(x: i64, y: i64) -> Result<Self> {
        match (axis(x), axis(y)) {
            (Some(x), Some(y)) => Ok(Self { x, y }),
            _ => Err(SpaceshipError::InvalidCoordinate { x, y }),
        }
    }

    /// Build from axes already known to be on the board.
    pub(crate) fn from_axes(x: u8, y: u8) -> Self {
        debug_assert!(
            x < BOARD_SIZE && y < BOARD_SIZE,
            "axes ({x}, {y}) are off the board"
        );
        Self { x, y }
    }

    /// Column, in `[0, 15]`.
    pub fn x(&self) -> u8 {
        self.x
    }

    /// Row, in `[0, 15]`.
    pub fn y(&self) -> u8 {
        self.y
    }

    /// Wire representation of this coordinate.
    pub fn to_shot(&self) -> String {
        self.to_string()
    }
}

fn axis(value: i64) -> Option<u8> {
    u8::try_from(value).ok().filter(|v| *v < BOARD_SIZE)
}

/// Encode a coordinate pair as a wire shot.
///
/// # Errors
///
/// Returns [`SpaceshipError::InvalidCoordinate`] if either axis is outside `[0, 15]`.
pub fn encode(x: i64, y: i64) -> Result<String> {
    Coordinate::new(x, y).map(|c| c.to_shot())
}

/// Decode a wire shot into a coordinate.
///
/// # Errors
///
/// Returns [`SpaceshipError::MalformedShot`] unless the input is exactly one
/// hex digit, `x`, and one hex digit.
pub fn decode(shot: &str) -> Result<Coordinate> {
    let malformed = || SpaceshipError::MalformedShot(shot.to_string());

    let mut chars = shot.chars();
    let (Some(x), Some(sep), Some(y), None) =
        (chars.next(), chars.next(), chars.next(), chars.next())
    else {
        return Err(malformed());
    };
    if sep != SEPARATOR {
        return Err(malformed());
    }

    match (x.to_digit(16), y.to_digit(16)) {
        (Some(x), Some(y)) => Coordinate::new(i64::from(x), i64::from(y)).map_err(|_| malformed()),
        _ => Err(malformed()),
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:x}{SEPARATOR}{:x}", self.x, self.y)
    }
}

impl FromStr for Coordinate {
    type Err = SpaceshipError;

    fn from_str(s: &str) -> Result<Self> {
        decode(s)
    }
}

impl Serialize for Coordinate {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Coordinate {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let shot = String::deserialize(deserializer)?;
        decode(&shot).map_err(serde::de::Error::custom)
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
    fn encodes_one_lowercase_digit_per_axis() {
        assert_eq!(encode(10, 3).unwrap(), "ax3");
        assert_eq!(encode(0, 0).unwrap(), "0x0");
        assert_eq!(encode(15, 15).unwrap(), "fxf");
    }

    #[test]
    fn every_board_cell_survives_the_wire() {
        for x in 0..16 {
            for y in 0..16 {
                let c = decode(&encode(x, y).unwrap()).unwrap();
                assert_eq!((i64::from(c.x()), i64::from(c.y())), (x, y));
            }
        }
    }

    #[test]
    fn rejects_out_of_range_axes() {
        assert_eq!(
            encode(16, 0),
            Err(SpaceshipError::InvalidCoordinate { x: 16, y: 0 })
        );
        assert_eq!(
            encode(-1, 0),
            Err(SpaceshipError::InvalidCoordinate { x: -1, y: 0 })
        );
        assert!(encode(0, 300).is_err());
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "off the board")]
    fn off_board_axes_are_not_wrapped() {
        let _ = Coordinate::from_axes(BOARD_SIZE, 0);
    }

    #[test]
    fn rejects_malformed_shots() {
        for shot in ["", "a", "ax", "axg", "a-3", "aX3", "a x3", "ax33", "1x2 ", "éxa"] {
            assert_eq!(
                decode(shot),
                Err(SpaceshipError::MalformedShot(shot.into())),
                "{shot:?} should be malformed"
            );
        }
    }

    #[test]
    fn decodes_uppercase_digits() {
        let c: Coordinate = "AxF".parse().unwrap();
        assert_eq!((c.x(), c.y()), (10, 15));
        assert_eq!(c.to_shot(), "axf");
    }

    #[test]
    fn serializes_as_wire_string() {
        let c = Coordinate::new(12, 1).unwrap();
        assert_eq!(serde_json::to_string(&c).unwrap(), r#""cx1""#);
        let back: Coordinate = serde_json::from_str(r#""cx1""#).unwrap();
        assert_eq!(back, c);
        assert!(serde_json::from_str::<Coordinate>(r#""zz""#).is_err());
    }
}
