use serde::{Deserialize, Serialize};
use std::fmt;

/// Per-recording participant identifier assigned by the replay decoder.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlayerId(pub u32);

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for PlayerId {
    fn from(v: u32) -> Self {
        PlayerId(v)
    }
}

impl From<u8> for PlayerId {
    fn from(v: u8) -> Self {
        PlayerId(v as u32)
    }
}

/// Player slot as written by the map script. This is the join key between
/// a stats record and a roster participant, and is unrelated to [`PlayerId`].
///
/// Signed, since the map script may write any integer here.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SlotIndex(pub i64);

impl fmt::Display for SlotIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for SlotIndex {
    fn from(v: i64) -> Self {
        SlotIndex(v)
    }
}

/// Team number. The decoder and the map script both use small integers,
/// but they are not guaranteed to agree with each other.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TeamId(pub i32);

impl fmt::Display for TeamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i32> for TeamId {
    fn from(v: i32) -> Self {
        TeamId(v)
    }
}

/// Values outside the `i32` range read as team 0.
impl From<i64> for TeamId {
    fn from(v: i64) -> Self {
        TeamId(i32::try_from(v).unwrap_or(0))
    }
}
