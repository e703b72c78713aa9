use serde::{Deserialize, Serialize};

use crate::DecoderError;
use crate::types::{PlayerId, TeamId};

/// Something that can turn a raw recording into a roster and the ordered
/// sequence of custom actions it carries.
///
/// The binary recording format is owned by the implementation. The pipeline
/// only relies on the error split: [`DecoderError::OutOfRange`] for buffers
/// that end early or point outside themselves, [`DecoderError::Other`] for
/// everything else.
pub trait ReplayDecoder {
    fn decode(&self, recording: &[u8]) -> Result<DecodedReplay, DecoderError>;
}

impl<D: ReplayDecoder + ?Sized> ReplayDecoder for &D {
    fn decode(&self, recording: &[u8]) -> Result<DecodedReplay, DecoderError> {
        (**self).decode(recording)
    }
}

impl<D: ReplayDecoder + ?Sized> ReplayDecoder for Box<D> {
    fn decode(&self, recording: &[u8]) -> Result<DecodedReplay, DecoderError> {
        (**self).decode(recording)
    }
}

/// Everything the pipeline needs from one decoded recording.
#[derive(Debug, Clone, Default)]
pub struct DecodedReplay {
    pub game: GameInfo,
    pub players: Vec<RosterPlayer>,
    pub actions: Vec<CustomAction>,
}

/// Match-level facts reported by the decoder. Any of them may be missing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct GameInfo {
    /// The recording's random seed, used as the game id.
    #[serde(alias = "randomseed")]
    pub game_id: Option<u64>,
    #[serde(alias = "gamename")]
    pub game_name: Option<String>,
    pub map: Option<String>,
    pub creator: Option<String>,
    /// Match length in milliseconds.
    #[serde(alias = "duration")]
    pub duration_ms: Option<u64>,
}

/// One participant as the decoder sees them.
///
/// Read as `{ id, name, teamId }`, written as `{ pid, name, teamid }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RosterPlayer {
    #[serde(rename(serialize = "pid", deserialize = "id"))]
    pub id: PlayerId,
    #[serde(default)]
    pub name: String,
    #[serde(default, rename(serialize = "teamid", deserialize = "teamId"), alias = "teamid")]
    pub team_id: TeamId,
}

impl RosterPlayer {
    pub fn new(id: impl Into<PlayerId>, name: impl Into<String>, team_id: impl Into<TeamId>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            team_id: team_id.into(),
        }
    }

    /// Name to show for this player. Unnamed slots get a placeholder.
    pub fn display_name(&self) -> String {
        if self.name.is_empty() {
            format!("Player {}", self.id)
        } else {
            self.name.clone()
        }
    }
}

/// A single custom action record, in emission order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CustomAction {
    pub index: usize,
    pub key: String,
}

impl CustomAction {
    pub fn new(index: usize, key: impl Into<String>) -> Self {
        Self {
            index,
            key: key.into(),
        }
    }
}
