//! One pass from a raw recording to matched players.
//!
//! ```text
//! recording ──decode──▶ roster + custom actions
//!                            │
//!               survey, channel collection
//!                            │
//!          metadata (player records, events), positions
//!                            │
//!                  roster ⨯ records matching
//!                            │
//!                 final game data, checks, summary
//! ```
//!
//! Every intermediate stage is kept on [`PipelineResult`] for diagnostics.

use std::collections::BTreeMap;

use serde::Serialize;
use tracing::subscriber::{DefaultGuard, NoSubscriber};
use tracing::{debug, info, info_span, warn};

use crate::analyzer::channel::ChannelCollector;
use crate::analyzer::matcher::{
    MatchOutcome, MatchedPlayer, PlayerFlag, match_players, promote_drawers_on_losing_teams,
};
use crate::analyzer::metadata::{IttMetadata, extract_metadata};
use crate::analyzer::positions::{PositionData, extract_positions};
use crate::analyzer::survey::{ActionSurvey, ActionSurveyStats};
use crate::analyzer::{Analyzer, run_analyzers};
use crate::config::PipelineConfig;
use crate::decoder::{DecodedReplay, GameInfo, ReplayDecoder, RosterPlayer};
use crate::{DecoderError, Error, Result};

/// Discards every tracing event on the current thread while alive.
///
/// Dropping the guard restores the previous dispatcher, including when the
/// scope is left through `?` or a panic.
pub struct DiagnosticsMuted {
    _guard: DefaultGuard,
}

impl DiagnosticsMuted {
    pub fn new() -> Self {
        Self {
            _guard: tracing::subscriber::set_default(NoSubscriber::default()),
        }
    }
}

impl Default for DiagnosticsMuted {
    fn default() -> Self {
        Self::new()
    }
}

/// Game facts with display fallbacks applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GameSummary {
    pub game_id: Option<u64>,
    #[serde(rename = "gamename")]
    pub game_name: String,
    pub map: String,
    pub creator: String,
    /// Rounded to whole seconds.
    #[serde(rename = "duration")]
    pub duration_seconds: u64,
}

impl From<&GameInfo> for GameSummary {
    fn from(game: &GameInfo) -> Self {
        let seed = game
            .game_id
            .map_or_else(|| "unknown".to_string(), |id| id.to_string());
        Self {
            game_id: game.game_id,
            game_name: game
                .game_name
                .clone()
                .filter(|name| !name.is_empty())
                .unwrap_or_else(|| format!("Replay {seed}")),
            map: game
                .map
                .clone()
                .filter(|map| !map.is_empty())
                .unwrap_or_else(|| "Unknown".to_string()),
            creator: game
                .creator
                .clone()
                .filter(|creator| !creator.is_empty())
                .unwrap_or_else(|| "Unknown".to_string()),
            duration_seconds: game
                .duration_ms
                .map_or(0, |ms| ms / 1000 + u64::from(ms % 1000 >= 500)),
        }
    }
}

/// What the decoder reported, before any channel processing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BaseReplayData {
    pub game_info: GameSummary,
    /// Roster with placeholder names for unnamed players.
    pub players: Vec<RosterPlayer>,
}

/// Matching stage output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerMatching {
    pub matches: Vec<MatchOutcome>,
    pub debug_log: Vec<String>,
}

/// The merged result consumers display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FinalGameData {
    pub game_id: Option<u64>,
    #[serde(rename = "gamename")]
    pub game_name: String,
    pub map: String,
    pub creator_name: String,
    #[serde(rename = "duration")]
    pub duration_seconds: u64,
    pub category: &'static str,
    pub players: Vec<MatchedPlayer>,
}

/// Yes/no answers about what a run managed to extract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationChecks {
    pub game_data_extracted: bool,
    pub players_detected: bool,
    pub custom_actions_found: bool,
    pub itt_metadata_found: bool,
    pub position_data_found: bool,
    pub all_players_have_stats: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParsingSummary {
    pub players: usize,
    pub players_with_stats: usize,
    pub winners: usize,
    pub losers: usize,
    pub drawers: usize,
    pub unknown: usize,
    pub warnings: Vec<String>,
}

/// Every stage of one pipeline run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineResult {
    pub base: BaseReplayData,
    pub actions: ActionSurveyStats,
    pub metadata: Option<IttMetadata>,
    pub positions: Option<PositionData>,
    pub matching: PlayerMatching,
    pub game: FinalGameData,
    pub checks: ValidationChecks,
    pub summary: ParsingSummary,
}

impl PipelineResult {
    pub fn players(&self) -> &[MatchedPlayer] {
        &self.game.players
    }

    /// Building event counts by status, for display.
    pub fn building_status_counts(&self) -> BTreeMap<&str, usize> {
        let mut counts = BTreeMap::new();
        let events = self
            .metadata
            .as_ref()
            .and_then(|metadata| metadata.building_events.as_deref())
            .unwrap_or_default();
        for event in events {
            *counts.entry(event.status.as_str()).or_insert(0) += 1;
        }
        counts
    }
}

/// Runs a decoder and every analysis stage over recordings.
pub struct Pipeline<D> {
    decoder: D,
    config: PipelineConfig,
}

impl<D: ReplayDecoder> Pipeline<D> {
    pub fn new(decoder: D) -> Self {
        Self::with_config(decoder, PipelineConfig::default())
    }

    pub fn with_config(decoder: D, config: PipelineConfig) -> Self {
        Self { decoder, config }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn run(&self, recording: &[u8]) -> Result<PipelineResult> {
        self.run_with(recording, &mut [])
    }

    /// Like [`Pipeline::run`], additionally feeding the action stream to
    /// `extra` analyzers.
    pub fn run_with(&self, recording: &[u8], extra: &mut [&mut dyn Analyzer]) -> Result<PipelineResult> {
        let span = info_span!("pipeline", size = recording.len());
        let _enter = span.enter();

        self.validate(recording)?;
        let decoded = self.decode(recording)?;

        if decoded.players.len() < self.config.min_players {
            return Err(Error::InsufficientPlayers {
                found: decoded.players.len(),
                required: self.config.min_players,
            });
        }

        let mut survey = ActionSurvey::new(self.config.channel_prefix.as_str(), self.config.action_sample_size);
        let mut collector = ChannelCollector::new(self.config.channel_prefix.as_str());
        run_analyzers(&decoded.actions, &mut [&mut survey, &mut collector]);
        if !extra.is_empty() {
            run_analyzers(&decoded.actions, extra);
        }

        let table = collector.into_table();
        let metadata = extract_metadata(&table);
        let positions = extract_positions(&table);

        let report = match_players(
            &decoded.players,
            metadata.as_ref().map(|metadata| metadata.players.as_slice()),
        );
        let mut players = report.players;
        if self.config.promote_drawers_on_losing_team {
            promote_drawers_on_losing_teams(&mut players);
        }

        let DecodedReplay {
            game,
            players: roster,
            ..
        } = decoded;
        let game_info = GameSummary::from(&game);
        let base = BaseReplayData {
            players: roster
                .iter()
                .map(|player| RosterPlayer {
                    name: player.display_name(),
                    ..player.clone()
                })
                .collect(),
            game_info: game_info.clone(),
        };

        let game = FinalGameData {
            game_id: game_info.game_id,
            game_name: game_info.game_name,
            map: game_info.map,
            creator_name: game_info.creator,
            duration_seconds: game_info.duration_seconds,
            category: "Parsed",
            players,
        };

        let actions = survey.into_stats();
        let checks = ValidationChecks {
            game_data_extracted: true,
            players_detected: !game.players.is_empty(),
            custom_actions_found: actions.total_actions > 0,
            itt_metadata_found: metadata.is_some(),
            position_data_found: positions.is_some(),
            all_players_have_stats: game.players.iter().all(MatchedPlayer::has_stats),
        };
        let summary = summarize(&game.players, roster.len(), &actions, metadata.as_ref());

        for warning in &summary.warnings {
            warn!("{warning}");
        }
        info!(
            players = summary.players,
            with_stats = summary.players_with_stats,
            metadata = checks.itt_metadata_found,
            positions = checks.position_data_found,
            "pipeline finished"
        );

        Ok(PipelineResult {
            base,
            actions,
            metadata,
            positions,
            matching: PlayerMatching {
                matches: report.outcomes,
                debug_log: report.trace,
            },
            game,
            checks,
            summary,
        })
    }

    fn validate(&self, recording: &[u8]) -> Result<()> {
        if recording.is_empty() {
            return Err(Error::EmptyRecording);
        }
        if recording.len() < self.config.min_recording_size {
            return Err(Error::RecordingTooSmall {
                size: recording.len(),
                min: self.config.min_recording_size,
            });
        }
        Ok(())
    }

    fn decode(&self, recording: &[u8]) -> Result<DecodedReplay> {
        let decoded = {
            let _muted = self
                .config
                .suppress_decoder_diagnostics
                .then(DiagnosticsMuted::new);
            self.decoder.decode(recording)
        };

        match decoded {
            Ok(decoded) => {
                debug!(
                    players = decoded.players.len(),
                    actions = decoded.actions.len(),
                    "recording decoded"
                );
                Ok(decoded)
            }
            Err(DecoderError::OutOfRange(message)) => {
                debug!(%message, "decoder read out of range");
                Err(Error::CorruptedRecording {
                    size: recording.len(),
                })
            }
            Err(DecoderError::Other(message)) => Err(Error::DecodeFailed(message)),
        }
    }
}

fn summarize(
    players: &[MatchedPlayer],
    roster_len: usize,
    actions: &ActionSurveyStats,
    metadata: Option<&IttMetadata>,
) -> ParsingSummary {
    let mut summary = ParsingSummary {
        players: players.len(),
        ..Default::default()
    };
    for player in players {
        if player.has_stats() {
            summary.players_with_stats += 1;
        }
        match player.flag {
            PlayerFlag::Winner => summary.winners += 1,
            PlayerFlag::Loser => summary.losers += 1,
            PlayerFlag::Drawer => summary.drawers += 1,
            PlayerFlag::Unknown => summary.unknown += 1,
        }
    }

    if actions.total_actions == 0 {
        summary.warnings.push("recording carries no custom actions".to_string());
    }
    match metadata {
        None => summary
            .warnings
            .push("ITT metadata not found, players have no stats".to_string()),
        Some(metadata) if metadata.players.len() != roster_len => summary.warnings.push(format!(
            "ITT metadata has {} player record(s) but the recording has {roster_len} player(s)",
            metadata.players.len()
        )),
        Some(_) => {}
    }
    let missing = summary.players - summary.players_with_stats;
    if metadata.is_some() && missing > 0 {
        summary
            .warnings
            .push(format!("{missing} player(s) missing stats"));
    }
    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::CustomAction;
    use std::cell::Cell;
    use tracing::dispatcher;
    use tracing_subscriber::Registry;

    struct Probe {
        muted_during_decode: Cell<Option<bool>>,
        panic: bool,
    }

    impl Probe {
        fn new(panic: bool) -> Self {
            Self {
                muted_during_decode: Cell::new(None),
                panic,
            }
        }
    }

    impl ReplayDecoder for Probe {
        fn decode(&self, _: &[u8]) -> std::result::Result<DecodedReplay, DecoderError> {
            self.muted_during_decode
                .set(Some(dispatcher::get_default(|d| d.is::<NoSubscriber>())));
            if self.panic {
                panic!("decoder blew up");
            }
            Ok(DecodedReplay {
                players: vec![RosterPlayer::new(0u32, "A", 0i32), RosterPlayer::new(1u32, "", 1i32)],
                actions: vec![CustomAction::new(0, "custom itt_schema 6")],
                ..Default::default()
            })
        }
    }

    fn recording() -> Vec<u8> {
        vec![0u8; 2048]
    }

    fn registry_is_default() -> bool {
        dispatcher::get_default(|d| d.is::<Registry>())
    }

    #[test]
    fn decoder_runs_muted_and_logging_comes_back() {
        let _default = tracing::subscriber::set_default(tracing_subscriber::registry());
        let pipeline = Pipeline::new(Probe::new(false));
        let result = pipeline.run(&recording()).unwrap();

        assert_eq!(pipeline.decoder.muted_during_decode.get(), Some(true));
        assert!(registry_is_default());
        assert_eq!(result.base.players[1].name, "Player 1");
        assert!(!result.checks.itt_metadata_found);
    }

    #[test]
    fn muting_can_be_disabled() {
        let _default = tracing::subscriber::set_default(tracing_subscriber::registry());
        let config = PipelineConfig {
            suppress_decoder_diagnostics: false,
            ..Default::default()
        };
        let pipeline = Pipeline::with_config(Probe::new(false), config);
        pipeline.run(&recording()).unwrap();
        assert_eq!(pipeline.decoder.muted_during_decode.get(), Some(false));
    }

    #[test]
    fn logging_comes_back_after_a_panic() {
        let _default = tracing::subscriber::set_default(tracing_subscriber::registry());
        let pipeline = Pipeline::new(Probe::new(true));
        let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| pipeline.run(&recording())));

        assert!(outcome.is_err());
        assert_eq!(pipeline.decoder.muted_during_decode.get(), Some(true));
        assert!(registry_is_default());
    }

    #[test]
    fn guard_restores_on_drop() {
        let _default = tracing::subscriber::set_default(tracing_subscriber::registry());
        {
            let _muted = DiagnosticsMuted::new();
            assert!(dispatcher::get_default(|d| d.is::<NoSubscriber>()));
        }
        assert!(registry_is_default());
    }

    #[test]
    fn game_summary_fallbacks() {
        let summary = GameSummary::from(&GameInfo::default());
        assert_eq!(summary.game_name, "Replay unknown");
        assert_eq!(summary.map, "Unknown");
        assert_eq!(summary.creator, "Unknown");
        assert_eq!(summary.duration_seconds, 0);

        let summary = GameSummary::from(&GameInfo {
            game_id: Some(77),
            duration_ms: Some(61_500),
            ..Default::default()
        });
        assert_eq!(summary.game_name, "Replay 77");
        assert_eq!(summary.duration_seconds, 62);

        let summary = GameSummary::from(&GameInfo {
            duration_ms: Some(u64::MAX),
            ..Default::default()
        });
        assert_eq!(summary.duration_seconds, u64::MAX / 1000 + 1);
    }

    #[test]
    fn summary_warns_about_gaps() {
        let summary = summarize(&[], 2, &ActionSurveyStats::default(), None);
        assert_eq!(summary.warnings.len(), 2);
        assert!(summary.warnings[0].contains("no custom actions"));
        assert!(summary.warnings[1].contains("ITT metadata not found"));
    }
}
