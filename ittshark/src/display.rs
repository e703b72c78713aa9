use itt_replays::PipelineResult;
use itt_replays::analyzer::matcher::MatchedPlayer;

fn mark(ok: bool) -> &'static str {
    if ok { "[ok]" } else { "[--]" }
}

fn print_player_details(player: &MatchedPlayer) {
    println!("   Player: {} (PID: {})", player.name, player.pid);
    println!("      Flag: {}", player.flag);
    let Some(stats) = &player.stats else {
        return;
    };
    if let Some(class) = &stats.troll_class {
        println!("      Class: {class}");
    }
    let counters = &stats.counters;
    println!("      Damage to Trolls: {}", counters.damage_troll);
    println!("      Self Healing: {}", counters.self_healing);
    println!("      Ally Healing: {}", counters.ally_healing);
    println!("      Gold Acquired: {}", counters.gold_acquired);
    println!("      Meat Eaten: {}", counters.meat_eaten);

    let kills: Vec<String> = [
        ("Elk", counters.kills_elk),
        ("Hawk", counters.kills_hawk),
        ("Snake", counters.kills_snake),
        ("Wolf", counters.kills_wolf),
        ("Bear", counters.kills_bear),
        ("Panther", counters.kills_panther),
    ]
    .iter()
    .filter(|(_, count)| *count != 0)
    .map(|(animal, count)| format!("{animal}: {count}"))
    .collect();
    if !kills.is_empty() {
        println!("      Kills: {}", kills.join(", "));
    }
    if let Some(inventory) = &stats.inventory {
        let items: Vec<String> = inventory
            .iter()
            .map(|(id, charges)| format!("{id}x{charges}"))
            .collect();
        println!("      Items: {}", items.join(", "));
    }
}

/// Prints a human readable report of one run.
pub fn print_result(result: &PipelineResult, verbose: bool) {
    let game = &result.game;
    println!("GAME");
    match game.game_id {
        Some(id) => println!("   Game ID: {id}"),
        None => println!("   Game ID: unknown"),
    }
    println!("   Game Name: {}", game.game_name);
    println!("   Map: {}", game.map);
    println!(
        "   Duration: {}s ({}m {}s)",
        game.duration_seconds,
        game.duration_seconds / 60,
        game.duration_seconds % 60
    );
    println!("   Category: {}", game.category);
    println!("   Creator: {}", game.creator_name);

    let summary = &result.summary;
    println!();
    println!("PLAYERS");
    println!("   Total: {}", summary.players);
    println!("   Winners: {}", summary.winners);
    println!("   Losers: {}", summary.losers);
    println!("   Drawers: {}", summary.drawers);
    println!("   Unknown: {}", summary.unknown);
    for player in result.players() {
        let stats = match &player.stats {
            Some(stats) => format!(
                "(Class: {}, Damage: {})",
                stats.troll_class.as_deref().unwrap_or("N/A"),
                stats.counters.damage_troll
            ),
            None => "(No stats)".to_string(),
        };
        println!(
            "   {} {} (PID: {}, {}) {stats}",
            mark(player.has_stats()),
            player.name,
            player.pid,
            player.flag
        );
    }

    println!();
    println!("CUSTOM ACTIONS");
    println!("   Actions: {}", result.actions.total_actions);
    println!("   Channel actions: {}", result.actions.channel_actions);
    match &result.metadata {
        Some(metadata) => {
            println!("   ITT Metadata: yes");
            match metadata.schema {
                Some(schema) => println!("   Schema Version: {schema}"),
                None => println!("   Schema Version: missing"),
            }
            println!("   ITT Version: {}", metadata.version.as_deref().unwrap_or("missing"));
            println!("   Players in Metadata: {}", metadata.players.len());
            for record in &metadata.players {
                println!(
                    "      Slot {}: {} (Class: {})",
                    record.slot_index,
                    record.name,
                    record.troll_class.as_deref().unwrap_or("N/A")
                );
            }
            if let Some(events) = &metadata.building_events {
                println!("   Building Events: {}", events.len());
            }
            if let Some(events) = &metadata.craft_events {
                println!("   Craft Events: {}", events.len());
            }
        }
        None => println!("   ITT Metadata: no"),
    }

    println!();
    println!("POSITIONS");
    match &result.positions {
        Some(positions) => {
            println!("   Players with Position Data: {}", positions.len());
            for (slot, samples) in positions {
                let span = match (samples.first(), samples.last()) {
                    (Some(first), Some(last)) => {
                        format!("{}s - {}s", first.time_seconds, last.time_seconds)
                    }
                    _ => "N/A".to_string(),
                };
                println!("   Slot {slot}: {} positions ({span})", samples.len());
            }
        }
        None => println!("   Position Data: no"),
    }

    let checks = &result.checks;
    println!();
    println!("CHECKS");
    println!("   {} Game data extracted", mark(checks.game_data_extracted));
    println!("   {} Players detected", mark(checks.players_detected));
    println!("   {} Custom actions found", mark(checks.custom_actions_found));
    println!("   {} ITT metadata found", mark(checks.itt_metadata_found));
    println!("   {} Position data found", mark(checks.position_data_found));
    println!("   {} All players have stats", mark(checks.all_players_have_stats));

    if !summary.warnings.is_empty() {
        println!();
        println!("WARNINGS");
        for warning in &summary.warnings {
            println!("   {warning}");
        }
    }

    if verbose {
        println!();
        println!("PLAYER DETAILS");
        for player in result.players() {
            print_player_details(player);
            println!();
        }

        let counts = result.building_status_counts();
        if let Some(events) = result
            .metadata
            .as_ref()
            .and_then(|metadata| metadata.building_events.as_ref())
        {
            println!("BUILDING EVENTS");
            println!("   Total Events: {}", events.len());
            println!("   Status Breakdown:");
            for (status, count) in &counts {
                println!("      {status}: {count}");
            }
            println!("   Sample Events (first 5):");
            for event in events.iter().take(5) {
                println!(
                    "      {}s - Team {} - Building {} - {}",
                    event.time_seconds, event.team, event.building_id, event.status
                );
            }
            if events.len() > 5 {
                println!("   ... and {} more events", events.len() - 5);
            }
        }
    }
}
