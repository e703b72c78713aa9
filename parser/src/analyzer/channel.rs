//! Reassembly of chunked streams carried over custom actions.
//!
//! The map script emits its telemetry as `custom <identifier> <data>`
//! action keys. Long strings are split into numbered parts plus a count:
//!
//! ```text
//! custom itt_chunks 2
//! custom itt_data_0 player:0|Ali
//! custom itt_data_1 ce\|...
//! custom itt_pos_p3_chunks 1
//! custom itt_pos_p3_0 12|100|-40,24|130|-38
//! ```
//!
//! Parts are concatenated in index order and only then unescaped (`\X`
//! becomes `X`), since an escape may straddle a part boundary.

use std::collections::{BTreeMap, HashMap};

use nom::bytes::complete::{tag, take_till};
use nom::character::complete::{char, digit1};
use nom::combinator::{eof, map_res};
use tracing::{debug, trace, warn};

use crate::IResult;
use crate::decoder::CustomAction;
use crate::types::SlotIndex;

use super::analyzer::Analyzer;
use super::payload::parse_int;

/// Every channel action key starts with this.
pub const CUSTOM_TAG: &str = "custom ";
/// Default identifier prefix of the ITT channel.
pub const DEFAULT_PREFIX: &str = "itt_";

const CHUNKS_SUFFIX: &str = "_chunks";
const PAYLOAD_PART: &str = "data_";
const POSITION_TAG: &str = "pos_p";

/// Splits `custom <identifier> <data>` at the first space after the tag.
/// `data` keeps any further spaces and may be empty.
fn custom_key(input: &str) -> IResult<'_, (&str, &str)> {
    let (input, _) = tag(CUSTOM_TAG)(input)?;
    let (input, identifier) = take_till(|c: char| c == ' ')(input)?;
    let (data, _) = char(' ')(input)?;
    Ok(("", (identifier, data)))
}

/// Splits a channel action key into `(identifier, data)` when its identifier
/// starts with `prefix`.
pub fn split_channel_key<'a>(key: &'a str, prefix: &str) -> Option<(&'a str, &'a str)> {
    let (_, (identifier, data)) = custom_key(key).ok()?;
    identifier.starts_with(prefix).then_some((identifier, data))
}

/// Matches `<prefix>pos_p<slot>_chunks` and yields the slot.
fn position_count_key<'a>(prefix: &str, identifier: &'a str) -> IResult<'a, i64> {
    let (i, _) = tag(prefix)(identifier)?;
    let (i, _) = tag(POSITION_TAG)(i)?;
    let (i, slot) = map_res(digit1, |digits: &str| digits.parse::<i64>())(i)?;
    let (i, _) = tag(CHUNKS_SUFFIX)(i)?;
    let (i, _) = eof(i)?;
    Ok((i, slot))
}

/// A part index is only recognized in its canonical decimal form, so
/// `itt_data_01` is never read as part 1.
fn part_index(suffix: &str) -> Option<usize> {
    if suffix.is_empty() || !suffix.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    if suffix.len() > 1 && suffix.starts_with('0') {
        return None;
    }
    suffix.parse().ok()
}

/// Reverses the channel's escaping: every `\X` becomes `X`.
///
/// A backslash before a line terminator, or at the very end, is kept as is.
pub fn unescape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(&next) = chars.peek() {
                if !matches!(next, '\n' | '\r' | '\u{2028}' | '\u{2029}') {
                    out.push(next);
                    chars.next();
                    continue;
                }
            }
        }
        out.push(c);
    }
    out
}

/// The two identifiers that describe one chunked stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamKeys {
    /// Identifier holding the declared part count.
    pub count_key: String,
    /// Parts are named `<part_prefix><index>`.
    pub part_prefix: String,
}

impl StreamKeys {
    /// The main payload stream: `<prefix>chunks` / `<prefix>data_<n>`.
    pub fn payload(prefix: &str) -> Self {
        Self {
            count_key: format!("{prefix}chunks"),
            part_prefix: format!("{prefix}{PAYLOAD_PART}"),
        }
    }

    /// One slot's position stream: `<prefix>pos_p<slot>_chunks` /
    /// `<prefix>pos_p<slot>_<n>`.
    pub fn positions(prefix: &str, slot: SlotIndex) -> Self {
        let base = format!("{prefix}{POSITION_TAG}{slot}");
        Self {
            count_key: format!("{base}{CHUNKS_SUFFIX}"),
            part_prefix: format!("{base}_"),
        }
    }

    /// Stream name used in reassembly maps, e.g. `itt` or `itt_pos_p3`.
    pub fn name(&self) -> &str {
        self.count_key
            .strip_suffix(CHUNKS_SUFFIX)
            .unwrap_or(&self.count_key)
    }
}

/// Collects `identifier -> data` for one channel prefix.
///
/// When an identifier repeats, the later action wins.
pub struct ChannelCollector {
    prefix: String,
    entries: HashMap<String, String>,
}

impl ChannelCollector {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            entries: HashMap::new(),
        }
    }

    pub fn into_table(self) -> ChannelTable {
        ChannelTable {
            prefix: self.prefix,
            entries: self.entries,
        }
    }
}

impl Analyzer for ChannelCollector {
    fn process(&mut self, action: &CustomAction) {
        let Some((identifier, data)) = split_channel_key(&action.key, &self.prefix) else {
            return;
        };
        if let Some(previous) = self.entries.insert(identifier.to_owned(), data.to_owned()) {
            trace!(identifier, action = action.index, "identifier repeated, replacing {} bytes", previous.len());
        }
    }

    fn finish(&mut self) {
        debug!(prefix = %self.prefix, identifiers = self.entries.len(), "channel collected");
    }
}

/// The collected identifiers of one channel.
#[derive(Debug, Clone, Default)]
pub struct ChannelTable {
    prefix: String,
    entries: HashMap<String, String>,
}

impl ChannelTable {
    pub fn from_actions(actions: &[CustomAction], prefix: &str) -> Self {
        let mut collector = ChannelCollector::new(prefix);
        for action in actions {
            collector.process(action);
        }
        collector.finish();
        collector.into_table()
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Raw data of a full identifier.
    pub fn get(&self, identifier: &str) -> Option<&str> {
        self.entries.get(identifier).map(String::as_str)
    }

    /// Raw data of `<prefix><field>`, e.g. `field("schema")` for `itt_schema`.
    pub fn field(&self, field: &str) -> Option<&str> {
        self.get(&format!("{}{field}", self.prefix))
    }

    /// Slots that declared a position stream, ascending.
    pub fn position_slots(&self) -> Vec<SlotIndex> {
        let mut slots: Vec<SlotIndex> = self
            .entries
            .keys()
            .filter_map(|identifier| position_count_key(&self.prefix, identifier).ok())
            .map(|(_, slot)| SlotIndex(slot))
            .collect();
        slots.sort_unstable();
        slots
    }

    /// Every stream this table declares a count for.
    pub fn streams(&self) -> Vec<StreamKeys> {
        let mut streams = Vec::new();
        let payload = StreamKeys::payload(&self.prefix);
        if self.entries.contains_key(&payload.count_key) {
            streams.push(payload);
        }
        streams.extend(
            self.position_slots()
                .into_iter()
                .map(|slot| StreamKeys::positions(&self.prefix, slot)),
        );
        streams
    }

    /// Concatenates the parts of one stream and unescapes the result.
    ///
    /// Returns `None` when the count is missing, not a positive integer, or
    /// none of the declared parts arrived. Missing parts inside the declared
    /// range are skipped; parts beyond it are ignored.
    pub fn reassemble(&self, keys: &StreamKeys) -> Option<String> {
        let declared = self.get(&keys.count_key)?;
        let count = match parse_int(declared) {
            Some(count) if count > 0 => count as usize,
            _ => {
                debug!(stream = keys.name(), declared, "stream has no usable chunk count");
                return None;
            }
        };

        let mut parts: Vec<(usize, &str)> = Vec::new();
        let mut beyond = 0usize;
        for (identifier, data) in &self.entries {
            let Some(index) = identifier
                .strip_prefix(keys.part_prefix.as_str())
                .and_then(part_index)
            else {
                continue;
            };
            if index < count {
                parts.push((index, data.as_str()));
            } else {
                beyond += 1;
            }
        }

        if beyond > 0 {
            warn!(stream = keys.name(), count, beyond, "ignoring parts beyond the declared count");
        }
        if parts.is_empty() {
            debug!(stream = keys.name(), count, "no parts present");
            return None;
        }
        if parts.len() < count {
            warn!(stream = keys.name(), count, present = parts.len(), "stream has missing parts");
        }

        parts.sort_unstable_by_key(|(index, _)| *index);
        let joined: String = parts.into_iter().map(|(_, data)| data).collect();
        Some(unescape(&joined))
    }
}

/// Reassembles every stream under `key_prefix`, keyed by stream name.
///
/// Streams without a usable count or without any part are left out.
pub fn reassemble(actions: &[CustomAction], key_prefix: &str) -> BTreeMap<String, String> {
    let table = ChannelTable::from_actions(actions, key_prefix);
    table
        .streams()
        .into_iter()
        .filter_map(|keys| {
            let payload = table.reassemble(&keys)?;
            Some((keys.name().to_owned(), payload))
        })
        .collect()
}
