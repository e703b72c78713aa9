use serde::{Deserialize, Serialize};

use crate::analyzer::channel::DEFAULT_PREFIX;
use crate::dump::MIN_DUMP_SIZE;

/// Pipeline configuration, loadable from a TOML file.
///
/// All fields default to their standard values. CLI flags override config file values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Buffers shorter than this are rejected before decoding.
    pub min_recording_size: usize,
    /// Fewer roster entries than this fail the run.
    pub min_players: usize,
    /// Identifier prefix of the telemetry channel.
    pub channel_prefix: String,
    pub suppress_decoder_diagnostics: bool,
    /// On a team with any loser, drawers become losers too.
    pub promote_drawers_on_losing_team: bool,
    /// How many raw action keys to keep as a sample.
    pub action_sample_size: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            min_recording_size: 1024,
            min_players: 2,
            channel_prefix: DEFAULT_PREFIX.to_string(),
            suppress_decoder_diagnostics: true,
            promote_drawers_on_losing_team: false,
            action_sample_size: 5,
        }
    }
}

impl PipelineConfig {
    /// Defaults for JSON dumps, which are far smaller than binary recordings.
    pub fn for_dumps() -> Self {
        Self {
            min_recording_size: MIN_DUMP_SIZE,
            ..Self::default()
        }
    }

    /// Load config from a TOML file.
    #[cfg(feature = "config")]
    pub fn load(path: &std::path::Path) -> Result<Self, rootcause::Report> {
        use rootcause::prelude::*;
        let contents = std::fs::read_to_string(path).context("Failed to read config file")?;
        Self::from_toml(&contents)
    }

    /// Parse config from TOML text.
    #[cfg(feature = "config")]
    pub fn from_toml(contents: &str) -> Result<Self, rootcause::Report> {
        use rootcause::prelude::*;
        let config: Self = toml::from_str(contents).context("Failed to parse config file")?;
        Ok(config)
    }

    /// Generate a commented default TOML config string.
    pub fn generate_default_toml() -> String {
        r#"# ITT replay pipeline configuration
# Place this file as ittshark.toml in the working directory,
# or specify with --config <path>.

# Recordings smaller than this many bytes are rejected as corrupted.
# 1024 suits binary recordings; JSON dumps can be as small as 16 bytes.
min_recording_size = 1024

# Minimum number of players a recording must contain
min_players = 2

# Identifier prefix of the custom telemetry channel
channel_prefix = "itt_"

# Discard diagnostics the replay decoder emits while it runs
suppress_decoder_diagnostics = true

# On a team with any loser, report drawers as losers as well
promote_drawers_on_losing_team = false

# Number of raw custom action keys to keep as a sample
action_sample_size = 5
"#
        .to_string()
    }
}
