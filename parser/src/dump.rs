//! Decoder for JSON replay dumps.
//!
//! Binary recordings are decoded by an external tool which writes its view of
//! the match (game info, roster, custom actions) as JSON. This module reads
//! that document back so the rest of the pipeline can run on it.

use serde::Deserialize;
use tracing::debug;

use crate::DecoderError;
use crate::decoder::{CustomAction, DecodedReplay, GameInfo, ReplayDecoder, RosterPlayer};

/// Dumps shorter than this cannot hold a roster.
pub const MIN_DUMP_SIZE: usize = 16;

#[derive(Debug, Default, Clone, Copy)]
pub struct DumpDecoder;

impl DumpDecoder {
    pub fn new() -> Self {
        Self
    }
}

#[derive(Debug, Deserialize)]
struct ReplayDump {
    #[serde(default)]
    game: GameInfo,
    #[serde(default)]
    players: Vec<RosterPlayer>,
    #[serde(default, alias = "w3mmd")]
    actions: Vec<RawAction>,
}

/// Dumps come in two shapes: `{ "key": ... }` and the decoder's native
/// `{ "cache": { "key": ... } }`. Actions without a key are kept so the
/// action count matches the recording, but they never match a channel.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawAction {
    key: Option<String>,
    cache: Option<RawCache>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawCache {
    key: Option<String>,
}

impl RawAction {
    fn into_key(self) -> String {
        self.key
            .or_else(|| self.cache.and_then(|cache| cache.key))
            .unwrap_or_default()
    }
}

impl ReplayDecoder for DumpDecoder {
    fn decode(&self, recording: &[u8]) -> Result<DecodedReplay, DecoderError> {
        let dump: ReplayDump = serde_json::from_slice(recording).map_err(|e| {
            if e.is_eof() {
                DecoderError::OutOfRange(e.to_string())
            } else {
                DecoderError::Other(e.to_string())
            }
        })?;

        debug!(
            players = dump.players.len(),
            actions = dump.actions.len(),
            "decoded replay dump"
        );

        let actions = dump
            .actions
            .into_iter()
            .enumerate()
            .map(|(index, action)| CustomAction::new(index, action.into_key()))
            .collect();

        Ok(DecodedReplay {
            game: dump.game,
            players: dump.players,
            actions,
        })
    }
}
