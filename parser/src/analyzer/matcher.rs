//! Reconciles the decoder's roster with the map's player records.
//!
//! Names are the only thing both sides share. Each roster player, in roster
//! order, takes the first still-unclaimed record found by:
//!
//! 1. exact name equality,
//! 2. equality after replacing `#` with `_` in the roster name,
//! 3. equality after lower-casing both names and keeping only `[a-z0-9]`.
//!
//! A claimed record is excluded for everyone after, both as that record and
//! by its slot index. This is greedy: an early roster player can take a
//! record a later one would have matched more strongly.

use std::collections::HashSet;

use serde::Serialize;
use strum_macros::{Display, EnumString};
use tracing::{debug, warn};

use crate::decoder::RosterPlayer;
use crate::types::{PlayerId, SlotIndex, TeamId};

use super::payload::{Inventory, MatchResult, PlayerCounters, PlayerStatRecord};

/// Which rule paired a roster player with a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Display)]
#[serde(rename_all = "camelCase")]
#[strum(serialize_all = "snake_case")]
pub enum MatchStrategy {
    ExactName,
    HashAsUnderscore,
    NormalizedName,
}

/// Outcome classification shown for a player.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum PlayerFlag {
    Winner,
    Loser,
    Drawer,
    Unknown,
}

impl PlayerFlag {
    pub fn from_result(result: Option<&MatchResult>) -> Self {
        match result {
            Some(MatchResult::Win) => PlayerFlag::Winner,
            Some(MatchResult::Loss | MatchResult::Leave) => PlayerFlag::Loser,
            Some(MatchResult::Draw) => PlayerFlag::Drawer,
            Some(MatchResult::Other(_)) | None => PlayerFlag::Unknown,
        }
    }
}

/// Stats copied onto a roster player from its matched record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MergedStats {
    #[serde(rename = "class", skip_serializing_if = "Option::is_none")]
    pub troll_class: Option<String>,
    #[serde(flatten)]
    pub counters: PlayerCounters,
    #[serde(flatten)]
    pub inventory: Option<Inventory>,
}

impl From<&PlayerStatRecord> for MergedStats {
    fn from(record: &PlayerStatRecord) -> Self {
        Self {
            troll_class: record.troll_class.clone(),
            counters: record.counters.clone(),
            inventory: record.inventory.clone(),
        }
    }
}

/// A roster player with whatever the map recorded about them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchedPlayer {
    pub name: String,
    pub pid: PlayerId,
    #[serde(rename = "teamid")]
    pub team_id: TeamId,
    pub flag: PlayerFlag,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub slot_index: Option<SlotIndex>,
    #[serde(flatten)]
    pub stats: Option<MergedStats>,
}

impl MatchedPlayer {
    pub fn has_stats(&self) -> bool {
        self.stats.is_some()
    }
}

/// The record side of a match, trimmed for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordSummary {
    pub slot_index: SlotIndex,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub troll_class: Option<String>,
}

/// How one roster player fared in matching.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchOutcome {
    pub replay_player: RosterPlayer,
    pub itt_player: Option<RecordSummary>,
    pub strategy: Option<MatchStrategy>,
    pub matched: bool,
}

/// Result of one matching pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchReport {
    /// One entry per roster player, in roster order.
    pub players: Vec<MatchedPlayer>,
    pub outcomes: Vec<MatchOutcome>,
    /// Human readable log of every decision taken.
    pub trace: Vec<String>,
}

/// Lower-cases and keeps only ASCII letters and digits.
pub fn normalize_name(name: &str) -> String {
    name.to_lowercase()
        .chars()
        .filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
        .collect()
}

struct Claims {
    records: Vec<bool>,
    slots: HashSet<SlotIndex>,
}

impl Claims {
    fn new(len: usize) -> Self {
        Self {
            records: vec![false; len],
            slots: HashSet::new(),
        }
    }

    fn is_free(&self, index: usize, record: &PlayerStatRecord) -> bool {
        !self.records[index] && !self.slots.contains(&record.slot_index)
    }

    fn claim(&mut self, index: usize, record: &PlayerStatRecord) {
        self.records[index] = true;
        self.slots.insert(record.slot_index);
    }
}

struct PlayerMatcher<'a> {
    candidates: &'a [PlayerStatRecord],
    claims: Claims,
    trace: Vec<String>,
}

impl<'a> PlayerMatcher<'a> {
    fn new(candidates: &'a [PlayerStatRecord]) -> Self {
        Self {
            candidates,
            claims: Claims::new(candidates.len()),
            trace: Vec::new(),
        }
    }

    fn find_free(&self, mut predicate: impl FnMut(&PlayerStatRecord) -> bool) -> Option<usize> {
        self.candidates
            .iter()
            .enumerate()
            .find(|&(index, record)| self.claims.is_free(index, record) && predicate(record))
            .map(|(index, _)| index)
    }

    fn find(&mut self, player: &RosterPlayer) -> Option<(usize, MatchStrategy)> {
        let exact = self.find_free(|record| record.name == player.name);
        self.log_attempt(MatchStrategy::ExactName, &player.name, exact);
        if let Some(index) = exact {
            return Some((index, MatchStrategy::ExactName));
        }

        let underscored = player.name.replace('#', "_");
        let underscore = self.find_free(|record| record.name == underscored);
        self.log_attempt(MatchStrategy::HashAsUnderscore, &underscored, underscore);
        if let Some(index) = underscore {
            return Some((index, MatchStrategy::HashAsUnderscore));
        }

        let normalized = normalize_name(&player.name);
        let loose = self.find_free(|record| normalize_name(&record.name) == normalized);
        self.log_attempt(MatchStrategy::NormalizedName, &normalized, loose);
        loose.map(|index| (index, MatchStrategy::NormalizedName))
    }

    fn log_attempt(&mut self, strategy: MatchStrategy, wanted: &str, found: Option<usize>) {
        let line = match found.map(|index| &self.candidates[index]) {
            Some(record) => format!(
                "  {strategy} {wanted:?}: matched slot {} ({})",
                record.slot_index, record.name
            ),
            None => format!("  {strategy} {wanted:?}: no match"),
        };
        self.trace.push(line);
    }

    fn match_one(&mut self, player: &RosterPlayer) -> (MatchedPlayer, MatchOutcome) {
        self.trace
            .push(format!("player {} (pid {})", player.name, player.id));

        let candidates = self.candidates;
        let found = self.find(player);
        let record = found.map(|(index, _)| {
            let record = &candidates[index];
            self.claims.claim(index, record);
            record
        });

        match (found, record) {
            (Some((_, strategy)), Some(record)) => {
                debug!(
                    player = %player.name,
                    pid = %player.id,
                    slot = %record.slot_index,
                    %strategy,
                    "matched player"
                );
                if record.result.is_none() {
                    self.trace
                        .push(format!("  slot {} has no result", record.slot_index));
                }
            }
            _ => {
                if !self.candidates.is_empty() {
                    warn!(player = %player.name, pid = %player.id, "could not match player to ITT metadata");
                }
                self.trace.push("  no match found".to_string());
            }
        }

        let flag = record.map_or(PlayerFlag::Unknown, |record| {
            PlayerFlag::from_result(record.result.as_ref())
        });

        let matched = MatchedPlayer {
            name: player.display_name(),
            pid: player.id,
            team_id: player.team_id,
            flag,
            slot_index: record.map(|record| record.slot_index),
            stats: record.map(MergedStats::from),
        };
        let outcome = MatchOutcome {
            replay_player: player.clone(),
            itt_player: record.map(|record| RecordSummary {
                slot_index: record.slot_index,
                name: record.name.clone(),
                troll_class: record.troll_class.clone(),
            }),
            strategy: found.map(|(_, strategy)| strategy),
            matched: record.is_some(),
        };
        (matched, outcome)
    }
}

/// Pairs each roster player with at most one record and derives its flag.
///
/// Deterministic: the same inputs in the same order always produce the same
/// pairing. Neither input is modified.
pub fn match_players(
    roster: &[RosterPlayer],
    candidates: Option<&[PlayerStatRecord]>,
) -> MatchReport {
    let candidates = candidates.unwrap_or_default();
    let mut matcher = PlayerMatcher::new(candidates);

    matcher.trace.push(format!(
        "matching {} roster player(s) against {} record(s)",
        roster.len(),
        candidates.len()
    ));

    let (players, outcomes): (Vec<_>, Vec<_>) =
        roster.iter().map(|player| matcher.match_one(player)).unzip();

    let matched = outcomes.iter().filter(|outcome| outcome.matched).count();
    matcher
        .trace
        .push(format!("matched {matched} of {} roster player(s)", roster.len()));

    MatchReport {
        players,
        outcomes,
        trace: matcher.trace,
    }
}

/// On any team with a loser, turns every drawer into a loser.
pub fn promote_drawers_on_losing_teams(players: &mut [MatchedPlayer]) {
    let losing_teams: HashSet<TeamId> = players
        .iter()
        .filter(|player| player.flag == PlayerFlag::Loser)
        .map(|player| player.team_id)
        .collect();

    for player in players.iter_mut() {
        if player.flag == PlayerFlag::Drawer && losing_teams.contains(&player.team_id) {
            debug!(player = %player.name, team = %player.team_id, "teammate lost, drawer becomes loser");
            player.flag = PlayerFlag::Loser;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::payload::parse_payload;

    fn record(slot: u32, name: &str, result: &str) -> PlayerStatRecord {
        let line = format!("player:{slot}|{name}|troll|gatherer|0|{result}|9|0|0|0|0|0|0|0|0|0|0|");
        parse_payload(&line, Some(6)).players.remove(0)
    }

    fn roster(names: &[&str]) -> Vec<RosterPlayer> {
        names
            .iter()
            .enumerate()
            .map(|(i, name)| RosterPlayer::new(i as u32, *name, (i % 2) as i32))
            .collect()
    }

    #[test]
    fn exact_name_wins() {
        let records = vec![record(4, "bob", "LOSS"), record(2, "Bob", "WIN")];
        let report = match_players(&roster(&["Bob"]), Some(records.as_slice()));
        assert_eq!(report.players[0].slot_index, Some(SlotIndex(2)));
        assert_eq!(report.outcomes[0].strategy, Some(MatchStrategy::ExactName));
        assert_eq!(report.players[0].flag, PlayerFlag::Winner);
    }

    #[test]
    fn underscore_rule_beats_normalized_rule() {
        let records = vec![record(1, "foo1", "LOSS"), record(0, "Foo_1", "WIN")];
        let report = match_players(&roster(&["Foo#1"]), Some(records.as_slice()));
        assert_eq!(report.outcomes[0].itt_player.as_ref().unwrap().name, "Foo_1");
        assert_eq!(report.outcomes[0].strategy, Some(MatchStrategy::HashAsUnderscore));
    }

    #[test]
    fn normalized_rule_is_last_resort() {
        let records = vec![record(5, "[TAG] Player.One", "DRAW")];
        let report = match_players(&roster(&["[tag] player-one"]), Some(records.as_slice()));
        assert_eq!(report.outcomes[0].strategy, Some(MatchStrategy::NormalizedName));
        assert_eq!(report.players[0].flag, PlayerFlag::Drawer);
        assert_eq!(normalize_name("[TAG] Player.One"), "tagplayerone");
    }

    #[test]
    fn a_record_is_claimed_once() {
        let records = vec![record(0, "Player1", "WIN")];
        let report = match_players(&roster(&["player_1", "PLAYER-1"]), Some(records.as_slice()));
        assert!(report.outcomes[0].matched);
        assert!(!report.outcomes[1].matched);
        assert_eq!(report.players[1].flag, PlayerFlag::Unknown);
        assert_eq!(report.players[1].stats, None);
    }

    #[test]
    fn a_slot_is_claimed_once() {
        let records = vec![record(3, "Ann", "WIN"), record(3, "Ben", "LOSS")];
        let report = match_players(&roster(&["Ann", "Ben"]), Some(records.as_slice()));
        assert!(report.outcomes[0].matched);
        assert!(!report.outcomes[1].matched);
    }

    #[test]
    fn flags_follow_result() {
        assert_eq!(PlayerFlag::from_result(Some(&MatchResult::Win)), PlayerFlag::Winner);
        assert_eq!(PlayerFlag::from_result(Some(&MatchResult::Loss)), PlayerFlag::Loser);
        assert_eq!(PlayerFlag::from_result(Some(&MatchResult::Leave)), PlayerFlag::Loser);
        assert_eq!(PlayerFlag::from_result(Some(&MatchResult::Draw)), PlayerFlag::Drawer);
        assert_eq!(
            PlayerFlag::from_result(Some(&MatchResult::Other("TIMEOUT".into()))),
            PlayerFlag::Unknown
        );
        assert_eq!(PlayerFlag::from_result(None), PlayerFlag::Unknown);
        assert_eq!("drawer".parse::<PlayerFlag>().unwrap(), PlayerFlag::Drawer);
    }

    #[test]
    fn no_records_leaves_everyone_unknown() {
        let report = match_players(&roster(&["Ann", ""]), None);
        assert_eq!(report.players.len(), 2);
        assert!(report.players.iter().all(|p| p.flag == PlayerFlag::Unknown));
        assert_eq!(report.players[1].name, "Player 1");
    }

    #[test]
    fn matching_is_deterministic_and_leaves_inputs_alone() {
        let records = vec![
            record(0, "Ann", "WIN"),
            record(1, "ann", "LOSS"),
            record(2, "A#nn", "DRAW"),
        ];
        let players = roster(&["ann", "Ann", "A_nn"]);
        let before = records.clone();

        let first = match_players(&players, Some(records.as_slice()));
        let second = match_players(&players, Some(records.as_slice()));
        assert_eq!(first, second);
        assert_eq!(records, before);

        let slots: Vec<_> = first.players.iter().map(|p| p.slot_index).collect();
        assert_eq!(slots, vec![Some(SlotIndex(1)), Some(SlotIndex(0)), Some(SlotIndex(2))]);
        assert_eq!(first.outcomes[2].strategy, Some(MatchStrategy::NormalizedName));
    }

    #[test]
    fn drawers_on_a_losing_team_become_losers() {
        let records = vec![
            record(0, "Ann", "LOSS"),
            record(1, "Ben", "DRAW"),
            record(2, "Cat", "DRAW"),
        ];
        let players = vec![
            RosterPlayer::new(0u32, "Ann", 0i32),
            RosterPlayer::new(1u32, "Ben", 0i32),
            RosterPlayer::new(2u32, "Cat", 1i32),
        ];
        let mut report = match_players(&players, Some(records.as_slice()));
        promote_drawers_on_losing_teams(&mut report.players);
        let flags: Vec<_> = report.players.iter().map(|p| p.flag).collect();
        assert_eq!(flags, vec![PlayerFlag::Loser, PlayerFlag::Loser, PlayerFlag::Drawer]);
    }

    #[test]
    fn merged_player_serializes_flat() {
        let records = vec![record(0, "Ann", "WIN")];
        let report = match_players(&roster(&["Ann"]), Some(records.as_slice()));
        let json = serde_json::to_value(&report.players[0]).unwrap();
        assert_eq!(json["pid"], 0);
        assert_eq!(json["teamid"], 0);
        assert_eq!(json["flag"], "winner");
        assert_eq!(json["class"], "gatherer");
        assert_eq!(json["damageTroll"], 9);
        assert!(json.get("items").is_none());
    }

    #[test]
    fn trace_records_every_attempt() {
        let report = match_players(&roster(&["Zed"]), Some(vec![record(0, "Ann", "WIN")].as_slice()));
        assert!(report.trace.iter().any(|line| line.contains("player Zed (pid 0)")));
        assert!(report.trace.iter().any(|line| line.contains("exact_name")));
        assert!(report.trace.iter().any(|line| line.contains("normalized_name \"zed\": no match")));
        assert!(report.trace.last().unwrap().contains("matched 0 of 1"));
    }
}
