//! Grammar of the reassembled ITT payload.
//!
//! The payload is a list of newline separated records. The text before the
//! first `:` selects the record type, the rest is `|` delimited:
//!
//! ```text
//! player:<slot>|<name>|<race>|<class>|<team>|<result>|<11 counters>|<items>
//! build:<team>|<time>|<building id>|<status>
//! craft:<team>|<time>|<item id>|<status>
//! ```
//!
//! Which record types exist depends on the declared schema version. Parsing is
//! lenient throughout: a bad counter reads as 0 and a bad record is dropped.

use nom::character::complete::{digit1, multispace0, one_of};
use nom::combinator::{opt, recognize};
use nom::sequence::{pair, preceded};
use serde::{Serialize, Serializer};
use tracing::{debug, trace, warn};

use crate::IResult;
use crate::types::{SlotIndex, TeamId};

/// First schema carrying the 18-field player layout.
pub const MIN_PLAYER_SCHEMA: u32 = 4;
/// First schema with `build:` records.
pub const MIN_BUILD_SCHEMA: u32 = 7;
/// First schema with `craft:` records.
pub const MIN_CRAFT_SCHEMA: u32 = 8;

const PLAYER_FIELDS: usize = 18;

const PLAYER_TAG: &str = "player:";
const BUILD_TAG: &str = "build:";
const CRAFT_TAG: &str = "craft:";

fn leading_int(input: &str) -> IResult<'_, &str> {
    preceded(multispace0, recognize(pair(opt(one_of("+-")), digit1)))(input)
}

/// Reads the leading integer of `input` the way the map's consumers always
/// have: surrounding whitespace and trailing garbage are ignored, so
/// `" 12px"` reads as 12. Returns `None` when there is no leading digit.
pub fn parse_int(input: &str) -> Option<i64> {
    let (_, digits) = leading_int(input).ok()?;
    digits.parse().ok()
}

fn int_or_zero(field: Option<&&str>) -> i64 {
    field.and_then(|f| parse_int(f)).unwrap_or(0)
}

/// Outcome a player was given by the map script, upper-cased.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchResult {
    Win,
    Loss,
    Leave,
    Draw,
    Other(String),
}

impl MatchResult {
    pub fn parse(raw: &str) -> Self {
        let normalized = raw.to_uppercase();
        match normalized.as_str() {
            "WIN" => MatchResult::Win,
            "LOSS" => MatchResult::Loss,
            "LEAVE" => MatchResult::Leave,
            "DRAW" => MatchResult::Draw,
            _ => MatchResult::Other(normalized),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            MatchResult::Win => "WIN",
            MatchResult::Loss => "LOSS",
            MatchResult::Leave => "LEAVE",
            MatchResult::Draw => "DRAW",
            MatchResult::Other(other) => other.as_str(),
        }
    }
}

impl Serialize for MatchResult {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// The eleven counters every player record carries, in wire order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerCounters {
    pub damage_troll: i64,
    pub self_healing: i64,
    pub ally_healing: i64,
    pub gold_acquired: i64,
    pub meat_eaten: i64,
    pub kills_elk: i64,
    pub kills_hawk: i64,
    pub kills_snake: i64,
    pub kills_wolf: i64,
    pub kills_bear: i64,
    pub kills_panther: i64,
}

impl PlayerCounters {
    fn from_fields(fields: &[&str]) -> Self {
        let mut values = fields.iter().map(|field| parse_int(field).unwrap_or(0));
        let mut next = || values.next().unwrap_or(0);
        Self {
            damage_troll: next(),
            self_healing: next(),
            ally_healing: next(),
            gold_acquired: next(),
            meat_eaten: next(),
            kills_elk: next(),
            kills_hawk: next(),
            kills_snake: next(),
            kills_wolf: next(),
            kills_bear: next(),
            kills_panther: next(),
        }
    }
}

/// Item ids and their charge counts. Both lists always have the same length.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Inventory {
    items: Vec<i64>,
    item_charges: Vec<i64>,
}

impl Inventory {
    /// Parses `id[:charges],id[:charges],...`.
    ///
    /// A token without `:` holds one charge, unless the id is 0 (empty slot).
    pub fn parse(raw: &str) -> Self {
        let mut inventory = Inventory::default();
        for token in raw.split(',') {
            let mut parts = token.split(':');
            let id = parts.next().and_then(parse_int).unwrap_or(0);
            let charges = match parts.next() {
                Some(charges) => parse_int(charges).unwrap_or(0),
                None if id != 0 => 1,
                None => 0,
            };
            inventory.items.push(id);
            inventory.item_charges.push(charges);
        }
        inventory
    }

    pub fn items(&self) -> &[i64] {
        &self.items
    }

    pub fn item_charges(&self) -> &[i64] {
        &self.item_charges
    }

    /// `(id, charges)` pairs in slot order.
    pub fn iter(&self) -> impl Iterator<Item = (i64, i64)> + '_ {
        self.items.iter().copied().zip(self.item_charges.iter().copied())
    }
}

/// One `player:` record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerStatRecord {
    pub slot_index: SlotIndex,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub troll_class: Option<String>,
    pub team: TeamId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<MatchResult>,
    #[serde(flatten)]
    pub counters: PlayerCounters,
    #[serde(flatten)]
    pub inventory: Option<Inventory>,
}

impl PlayerStatRecord {
    /// Decodes the `|` separated fields of a player record. Records with
    /// fewer than 18 fields yield `None`.
    pub fn from_fields(fields: &[&str]) -> Option<Self> {
        if fields.len() < PLAYER_FIELDS {
            return None;
        }

        let slot = int_or_zero(fields.first());
        let name = fields.get(1)?.to_string();
        let troll_class = fields
            .get(3)
            .filter(|class| !class.is_empty())
            .map(|class| class.to_string());
        let team = int_or_zero(fields.get(4));
        let result = fields
            .get(5)
            .filter(|result| !result.is_empty())
            .map(|result| MatchResult::parse(result));
        let counters = PlayerCounters::from_fields(fields.get(6..17)?);
        let inventory = fields
            .get(17)
            .filter(|items| !items.is_empty())
            .map(|items| Inventory::parse(items));

        Some(Self {
            slot_index: SlotIndex(slot),
            name,
            troll_class,
            team: TeamId::from(team),
            result,
            counters,
            inventory,
        })
    }

    pub fn items(&self) -> Option<&[i64]> {
        self.inventory.as_ref().map(Inventory::items)
    }

    pub fn item_charges(&self) -> Option<&[i64]> {
        self.inventory.as_ref().map(Inventory::item_charges)
    }
}

/// Fields shared by `build:` and `craft:` records.
struct EventFields {
    team: TeamId,
    time_seconds: i64,
    subject_id: i64,
    status: String,
}

impl EventFields {
    /// Exactly four fields, the first three integers, the last non-empty.
    fn parse(fields: &[&str]) -> Option<Self> {
        let [team, time, subject, status] = fields else {
            return None;
        };
        if status.is_empty() {
            return None;
        }
        Some(Self {
            team: TeamId::from(parse_int(team)?),
            time_seconds: parse_int(time)?,
            subject_id: parse_int(subject)?,
            status: status.to_uppercase(),
        })
    }
}

/// A building changed state (placed, finished, destroyed...).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildingEvent {
    pub team: TeamId,
    pub time_seconds: i64,
    pub building_id: i64,
    pub status: String,
}

/// An item craft changed state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CraftEvent {
    pub team: TeamId,
    pub time_seconds: i64,
    pub item_id: i64,
    pub status: String,
}

/// Everything decoded from one payload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParsedPayload {
    pub players: Vec<PlayerStatRecord>,
    /// `None` rather than empty, so callers can test for the feature.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub building_events: Option<Vec<BuildingEvent>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub craft_events: Option<Vec<CraftEvent>>,
}

/// Parses a reassembled payload under the given schema version.
///
/// Never fails. Records that are too short, belong to a newer schema than
/// the declared one, or do not decode are skipped.
pub fn parse_payload(payload: &str, schema_version: Option<u32>) -> ParsedPayload {
    let schema = schema_version.unwrap_or(0);
    let mut players: Vec<PlayerStatRecord> = Vec::new();
    let mut building_events = Vec::new();
    let mut craft_events = Vec::new();
    let mut dropped = 0usize;

    for (line_no, line) in payload.split('\n').enumerate() {
        let line = line.strip_suffix('\r').unwrap_or(line);

        if let Some(rest) = line.strip_prefix(PLAYER_TAG) {
            if schema < MIN_PLAYER_SCHEMA {
                dropped += 1;
                continue;
            }
            let fields: Vec<&str> = rest.split('|').collect();
            let Some(record) = PlayerStatRecord::from_fields(&fields) else {
                trace!(line_no, fields = fields.len(), "dropping short player record");
                dropped += 1;
                continue;
            };
            if let Some(existing) = players
                .iter_mut()
                .find(|existing| existing.slot_index == record.slot_index)
            {
                warn!(
                    slot = %record.slot_index,
                    previous = %existing.name,
                    name = %record.name,
                    "duplicate slot in payload, keeping the later record"
                );
                *existing = record;
            } else {
                players.push(record);
            }
        } else if let Some(rest) = line.strip_prefix(BUILD_TAG) {
            if schema < MIN_BUILD_SCHEMA {
                dropped += 1;
                continue;
            }
            let fields: Vec<&str> = rest.split('|').collect();
            match EventFields::parse(&fields) {
                Some(event) => building_events.push(BuildingEvent {
                    team: event.team,
                    time_seconds: event.time_seconds,
                    building_id: event.subject_id,
                    status: event.status,
                }),
                None => {
                    trace!(line_no, "dropping malformed build record");
                    dropped += 1;
                }
            }
        } else if let Some(rest) = line.strip_prefix(CRAFT_TAG) {
            if schema < MIN_CRAFT_SCHEMA {
                dropped += 1;
                continue;
            }
            let fields: Vec<&str> = rest.split('|').collect();
            match EventFields::parse(&fields) {
                Some(event) => craft_events.push(CraftEvent {
                    team: event.team,
                    time_seconds: event.time_seconds,
                    item_id: event.subject_id,
                    status: event.status,
                }),
                None => {
                    trace!(line_no, "dropping malformed craft record");
                    dropped += 1;
                }
            }
        }
    }

    debug!(
        schema,
        players = players.len(),
        building_events = building_events.len(),
        craft_events = craft_events.len(),
        dropped,
        "payload parsed"
    );

    ParsedPayload {
        players,
        building_events: (!building_events.is_empty()).then_some(building_events),
        craft_events: (!craft_events.is_empty()).then_some(craft_events),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALICE: &str = "player:0|Alice|troll|warrior|1|WIN|100|0|0|0|0|0|0|0|0|0|0|5,9:3";

    #[test]
    fn parse_int_reads_leading_digits() {
        assert_eq!(parse_int("42"), Some(42));
        assert_eq!(parse_int(" -7"), Some(-7));
        assert_eq!(parse_int("+3"), Some(3));
        assert_eq!(parse_int("12px"), Some(12));
        assert_eq!(parse_int("1.9"), Some(1));
        assert_eq!(parse_int(""), None);
        assert_eq!(parse_int("abc"), None);
        assert_eq!(parse_int("-"), None);
    }

    #[test]
    fn decodes_player_record() {
        let parsed = parse_payload(&format!("{ALICE}\n"), Some(6));
        assert_eq!(parsed.players.len(), 1);

        let alice = &parsed.players[0];
        assert_eq!(alice.slot_index, SlotIndex(0));
        assert_eq!(alice.name, "Alice");
        assert_eq!(alice.troll_class.as_deref(), Some("warrior"));
        assert_eq!(alice.team, TeamId(1));
        assert_eq!(alice.result, Some(MatchResult::Win));
        assert_eq!(alice.counters.damage_troll, 100);
        assert_eq!(alice.items(), Some(&[5, 9][..]));
        assert_eq!(alice.item_charges(), Some(&[1, 3][..]));
    }

    #[test]
    fn items_and_charges_stay_parallel() {
        let inventory = Inventory::parse("5:2,9");
        assert_eq!(inventory.items(), &[5, 9]);
        assert_eq!(inventory.item_charges(), &[2, 1]);

        let inventory = Inventory::parse("0,x:4,7:y,3:2:9");
        assert_eq!(inventory.items(), &[0, 0, 7, 3]);
        assert_eq!(inventory.item_charges(), &[0, 4, 0, 2]);
        assert_eq!(inventory.iter().count(), 4);
    }

    #[test]
    fn empty_items_field_means_no_inventory() {
        let line = "player:2|Bob|troll|mage|0|LOSS|1|2|3|4|5|6|7|8|9|10|11|";
        let parsed = parse_payload(line, Some(5));
        let bob = &parsed.players[0];
        assert_eq!(bob.inventory, None);
        assert_eq!(bob.counters.kills_panther, 11);
        assert_eq!(bob.counters.kills_elk, 6);
    }

    #[test]
    fn bad_counter_defaults_to_zero() {
        let line = "player:1|Carl|troll|hunter|2|draw|50|oops|7|0|0|0|0|0|0|0|0|";
        let parsed = parse_payload(line, Some(6));
        let carl = &parsed.players[0];
        assert_eq!(carl.counters.damage_troll, 50);
        assert_eq!(carl.counters.self_healing, 0);
        assert_eq!(carl.counters.ally_healing, 7);
        assert_eq!(carl.name, "Carl");
        assert_eq!(carl.team, TeamId(2));
        assert_eq!(carl.result, Some(MatchResult::Draw));
    }

    #[test]
    fn short_or_old_player_records_are_dropped() {
        let short = "player:0|Alice|troll|warrior|1|WIN|100";
        assert!(parse_payload(short, Some(6)).players.is_empty());
        assert!(parse_payload(ALICE, Some(3)).players.is_empty());
        assert!(parse_payload(ALICE, None).players.is_empty());
    }

    #[test]
    fn bad_line_does_not_stop_parsing() {
        let payload = format!("garbage\nplayer:|\n{ALICE}\nbuild:1|2\n");
        let parsed = parse_payload(&payload, Some(8));
        assert_eq!(parsed.players.len(), 1);
        assert_eq!(parsed.building_events, None);
    }

    #[test]
    fn building_events_need_schema_7() {
        let payload = "build:0|120|42|started\nbuild:1|300|43|Done\n";

        let v6 = parse_payload(payload, Some(6));
        assert_eq!(v6.building_events, None);

        let v7 = parse_payload(payload, Some(7));
        let events = v7.building_events.unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(
            events[1],
            BuildingEvent {
                team: TeamId(1),
                time_seconds: 300,
                building_id: 43,
                status: "DONE".to_string(),
            }
        );
    }

    #[test]
    fn craft_events_need_schema_8() {
        let payload = "craft:0|61|1001|finished\r\ncraft:bad|1|2|x\ncraft:0|1|2|\n";

        assert_eq!(parse_payload(payload, Some(7)).craft_events, None);

        let events = parse_payload(payload, Some(8)).craft_events.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].item_id, 1001);
        assert_eq!(events[0].status, "FINISHED");
    }

    #[test]
    fn event_records_need_exactly_four_fields() {
        let payload = "build:0|1|2|ok|extra\nbuild:0|1|2\n";
        assert_eq!(parse_payload(payload, Some(9)).building_events, None);
    }

    #[test]
    fn duplicate_slot_keeps_later_record() {
        let payload = format!("{ALICE}\nplayer:0|Alicia|troll|mage|1|LOSS|0|0|0|0|0|0|0|0|0|0|0|");
        let parsed = parse_payload(&payload, Some(6));
        assert_eq!(parsed.players.len(), 1);
        assert_eq!(parsed.players[0].name, "Alicia");
        assert_eq!(parsed.players[0].result, Some(MatchResult::Loss));
    }

    #[test]
    fn negative_slot_does_not_replace_slot_zero() {
        let payload = format!("{ALICE}\nplayer:-1|Ghost|troll|mage|0|LOSS|0|0|0|0|0|0|0|0|0|0|0|");
        let parsed = parse_payload(&payload, Some(6));
        let slots: Vec<_> = parsed
            .players
            .iter()
            .map(|p| (p.slot_index, p.name.as_str()))
            .collect();
        assert_eq!(slots, vec![(SlotIndex(0), "Alice"), (SlotIndex(-1), "Ghost")]);
    }

    #[test]
    fn result_text_is_normalized() {
        assert_eq!(MatchResult::parse("leave"), MatchResult::Leave);
        assert_eq!(MatchResult::parse("Timeout"), MatchResult::Other("TIMEOUT".into()));
        assert_eq!(MatchResult::parse("Timeout").as_str(), "TIMEOUT");
    }

    #[test]
    fn serializes_with_wire_names() {
        let parsed = parse_payload(ALICE, Some(6));
        let json = serde_json::to_value(&parsed.players[0]).unwrap();
        assert_eq!(json["slotIndex"], 0);
        assert_eq!(json["trollClass"], "warrior");
        assert_eq!(json["result"], "WIN");
        assert_eq!(json["damageTroll"], 100);
        assert_eq!(json["items"], serde_json::json!([5, 9]));
        assert_eq!(json["itemCharges"], serde_json::json!([1, 3]));
    }
}
