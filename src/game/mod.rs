// Game core: everything between "the host pressed start" and "gameEnd".

pub mod deck;
pub mod decision;
pub mod engine;
pub mod night;
pub mod resolution;
pub mod role;
pub mod view;

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Stable engine-internal seat identifier, `player-1` .. `player-N` in
/// seat order. Independent of the external identity a room member carries;
/// the room owns the mapping between the two domains.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SeatId(u8);

impl SeatId {
    /// Seat id for a 0-based seat index.
    pub fn from_index(index: usize) -> Self {
        debug_assert!(index < u8::MAX as usize);
        Self((index + 1) as u8)
    }

    /// The 0-based seat index (deck position).
    pub fn index(self) -> usize {
        (self.0 - 1) as usize
    }

    /// The 1-based seat number as it appears on the wire.
    pub fn number(self) -> u8 {
        self.0
    }
}

impl fmt::Display for SeatId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "player-{}", self.0)
    }
}

#[derive(Debug, thiserror::Error)]
#[error("invalid seat id `{0}`")]
pub struct ParseSeatIdError(String);

impl FromStr for SeatId {
    type Err = ParseSeatIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let number = s
            .strip_prefix("player-")
            .and_then(|n| n.parse::<u8>().ok())
            .filter(|n| *n > 0)
            .ok_or_else(|| ParseSeatIdError(s.to_string()))?;
        Ok(Self(number))
    }
}

impl Serialize for SeatId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for SeatId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(de::Error::custom)
    }
}
