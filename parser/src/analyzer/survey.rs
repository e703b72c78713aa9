use serde::Serialize;

use crate::analyzer::Analyzer;
use crate::decoder::CustomAction;

use super::channel::split_channel_key;

/// Counts over the decoder's action stream.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionSurveyStats {
    pub total_actions: usize,
    /// Actions whose identifier belongs to the channel prefix.
    pub channel_actions: usize,
    /// Keys of the first few actions, verbatim.
    pub sample: Vec<String>,
}

/// Tallies actions and keeps a short sample for diagnostics.
pub struct ActionSurvey {
    prefix: String,
    sample_size: usize,
    stats: ActionSurveyStats,
}

impl ActionSurvey {
    pub fn new(prefix: impl Into<String>, sample_size: usize) -> Self {
        Self {
            prefix: prefix.into(),
            sample_size,
            stats: ActionSurveyStats::default(),
        }
    }

    pub fn into_stats(self) -> ActionSurveyStats {
        self.stats
    }
}

impl Analyzer for ActionSurvey {
    fn process(&mut self, action: &CustomAction) {
        self.stats.total_actions += 1;
        if self.stats.sample.len() < self.sample_size {
            self.stats.sample.push(action.key.clone());
        }
        if split_channel_key(&action.key, &self.prefix).is_some() {
            self.stats.channel_actions += 1;
        }
    }

    fn finish(&mut self) {
        tracing::debug!(
            total = self.stats.total_actions,
            channel = self.stats.channel_actions,
            "action survey finished"
        );
    }
}
