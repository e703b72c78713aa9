use serde::Serialize;
use tracing::{debug, info};

use super::channel::{ChannelTable, StreamKeys};
use super::payload::{BuildingEvent, CraftEvent, PlayerStatRecord, parse_int, parse_payload};

/// The ITT channel's main stream, reassembled and decoded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IttMetadata {
    /// Map version string, verbatim.
    pub version: Option<String>,
    /// Declared schema version selecting the record grammar.
    pub schema: Option<u32>,
    /// The unescaped payload text.
    pub payload: String,
    pub players: Vec<PlayerStatRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub building_events: Option<Vec<BuildingEvent>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub craft_events: Option<Vec<CraftEvent>>,
}

/// Builds [`IttMetadata`] from a collected channel, or `None` when the main
/// stream is absent.
pub fn extract_metadata(table: &ChannelTable) -> Option<IttMetadata> {
    let keys = StreamKeys::payload(table.prefix());
    let payload = table.reassemble(&keys)?;

    let schema = table
        .field("schema")
        .and_then(parse_int)
        .and_then(|schema| u32::try_from(schema).ok());
    let version = table.field("version").map(str::to_owned);
    debug!(?schema, ?version, bytes = payload.len(), "main stream reassembled");

    let parsed = parse_payload(&payload, schema);
    info!(
        ?schema,
        players = parsed.players.len(),
        building_events = parsed.building_events.as_ref().map_or(0, Vec::len),
        craft_events = parsed.craft_events.as_ref().map_or(0, Vec::len),
        "ITT metadata extracted"
    );

    Some(IttMetadata {
        version,
        schema,
        payload,
        players: parsed.players,
        building_events: parsed.building_events,
        craft_events: parsed.craft_events,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::CustomAction;

    fn table(keys: &[&str]) -> ChannelTable {
        let actions: Vec<CustomAction> = keys
            .iter()
            .enumerate()
            .map(|(i, key)| CustomAction::new(i, *key))
            .collect();
        ChannelTable::from_actions(&actions, "itt_")
    }

    #[test]
    fn reads_schema_version_and_records() {
        let table = table(&[
            "custom itt_version 1.4.2",
            "custom itt_schema 7",
            "custom itt_chunks 2",
            "custom itt_data_0 player:3\\|Dora\\|troll\\|scout\\|0\\|LOSS\\|1\\|1\\|1\\|1\\|1\\|1\\|1\\|1\\|1\\|1\\|1\\|\n",
            "custom itt_data_1 build:0\\|15\\|9\\|placed\n",
        ]);

        let metadata = extract_metadata(&table).unwrap();
        assert_eq!(metadata.version.as_deref(), Some("1.4.2"));
        assert_eq!(metadata.schema, Some(7));
        assert_eq!(metadata.players.len(), 1);
        assert_eq!(metadata.players[0].name, "Dora");
        assert_eq!(metadata.building_events.as_ref().map(Vec::len), Some(1));
        assert_eq!(metadata.craft_events, None);
        assert!(metadata.payload.starts_with("player:3|Dora|"));
    }

    #[test]
    fn missing_schema_yields_no_players() {
        let table = table(&[
            "custom itt_chunks 1",
            "custom itt_data_0 player:0|A|r|c|0|WIN|0|0|0|0|0|0|0|0|0|0|0|",
        ]);
        let metadata = extract_metadata(&table).unwrap();
        assert_eq!(metadata.schema, None);
        assert!(metadata.players.is_empty());
    }

    #[test]
    fn absent_stream_yields_none() {
        assert_eq!(extract_metadata(&table(&["custom itt_schema 8"])), None);
    }
}
