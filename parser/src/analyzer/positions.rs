use std::collections::BTreeMap;

use serde::Serialize;
use tracing::debug;

use crate::types::SlotIndex;

use super::channel::{ChannelTable, StreamKeys};
use super::payload::parse_int;

/// A player's position at one point in time, in map units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionSample {
    pub time_seconds: i64,
    pub x: i64,
    pub y: i64,
}

/// Position samples per slot.
pub type PositionData = BTreeMap<SlotIndex, Vec<PositionSample>>;

/// Parses `time|x|y,time|x|y,...`.
///
/// Entries without exactly three integer fields are dropped. Output order is
/// input order; samples are neither sorted nor deduplicated.
pub fn parse_positions(payload: &str) -> Vec<PositionSample> {
    payload
        .split(',')
        .filter_map(|entry| {
            let fields: Vec<&str> = entry.split('|').collect();
            let [time, x, y] = fields.as_slice() else {
                return None;
            };
            Some(PositionSample {
                time_seconds: parse_int(time)?,
                x: parse_int(x)?,
                y: parse_int(y)?,
            })
        })
        .collect()
}

/// Reassembles and parses every slot's position stream.
///
/// Slots whose stream is absent or yields no sample are left out; `None`
/// when no slot remains.
pub fn extract_positions(table: &ChannelTable) -> Option<PositionData> {
    let data: PositionData = table
        .position_slots()
        .into_iter()
        .filter_map(|slot| {
            let payload = table.reassemble(&StreamKeys::positions(table.prefix(), slot))?;
            let samples = parse_positions(&payload);
            debug!(%slot, samples = samples.len(), "position stream parsed");
            (!samples.is_empty()).then_some((slot, samples))
        })
        .collect();

    (!data.is_empty()).then_some(data)
}
