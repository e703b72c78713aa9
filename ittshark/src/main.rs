use anyhow::{Context, anyhow};
use clap::{App, Arg, ArgMatches};
use serde::Serialize;
use std::fs::File;
use std::path::{Path, PathBuf};
use tracing::Level;
use walkdir::WalkDir;

use itt_replays::analyzer::action_dump::ActionDump;
use itt_replays::pipeline::ValidationChecks;
use itt_replays::{DumpDecoder, Pipeline, PipelineConfig, PipelineResult};

mod display;

const DEFAULT_CONFIG: &str = "ittshark.toml";

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct FileReport {
    file: String,
    parsed_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    checks: Option<ValidationChecks>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pipeline: Option<PipelineResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl FileReport {
    fn new(path: &Path, outcome: &anyhow::Result<PipelineResult>) -> Self {
        let (checks, pipeline, error) = match outcome {
            Ok(result) => (Some(result.checks), Some(result.clone()), None),
            Err(e) => (None, None, Some(format!("{e:#}"))),
        };
        Self {
            file: path.display().to_string(),
            parsed_at: chrono::Utc::now().to_rfc3339(),
            checks,
            pipeline,
            error,
        }
    }
}

fn apply_cli_overrides(config: &mut PipelineConfig, matches: &ArgMatches) -> anyhow::Result<()> {
    if let Some(size) = matches.value_of("MIN_SIZE") {
        config.min_recording_size = size
            .parse()
            .with_context(|| format!("invalid --min-size value {size:?}"))?;
    }
    if matches.is_present("KEEP_DIAGNOSTICS") {
        config.suppress_decoder_diagnostics = false;
    }
    if matches.is_present("PROMOTE_DRAWERS") {
        config.promote_drawers_on_losing_team = true;
    }
    Ok(())
}

fn load_config(matches: &ArgMatches) -> anyhow::Result<PipelineConfig> {
    let path = match matches.value_of("CONFIG") {
        Some(path) => PathBuf::from(path),
        None if Path::new(DEFAULT_CONFIG).exists() => PathBuf::from(DEFAULT_CONFIG),
        None => return Ok(PipelineConfig::for_dumps()),
    };
    PipelineConfig::load(&path).map_err(|e| anyhow!("{}: {e}", path.display()))
}

fn collect_recordings(input: &Path) -> Vec<PathBuf> {
    if input.is_file() {
        return vec![input.to_path_buf()];
    }
    let mut files: Vec<PathBuf> = WalkDir::new(input)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .filter(|path| path.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("json")))
        .collect();
    files.sort();
    files
}

fn process_file(
    pipeline: &Pipeline<DumpDecoder>,
    path: &Path,
    dump_actions: Option<&File>,
) -> anyhow::Result<PipelineResult> {
    let recording =
        std::fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    let result = if let Some(file) = dump_actions {
        let mut dump = ActionDump::to_file(file).context("failed to open action dump")?;
        pipeline.run_with(&recording, &mut [&mut dump])
    } else {
        pipeline.run(&recording)
    };
    result.with_context(|| format!("failed to parse {}", path.display()))
}

fn write_json<T: Serialize>(path: &str, value: &T, pretty: bool) -> anyhow::Result<()> {
    let text = if pretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    };
    std::fs::write(path, text).with_context(|| format!("failed to write {path}"))
}

fn main() -> anyhow::Result<()> {
    let matches = App::new("ittshark")
        .about("Inspects the ITT telemetry channel of Warcraft III replay dumps")
        .arg(
            Arg::with_name("REPLAY")
                .help("Replay dump to process, or a directory of them")
                .required_unless("GENERATE_CONFIG")
                .index(1),
        )
        .arg(
            Arg::with_name("CONFIG")
                .help("Path to a TOML config file (defaults to ittshark.toml if present)")
                .short("c")
                .long("config")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("OUTPUT")
                .help("Write the full results as JSON to this file")
                .short("o")
                .long("output")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("TRACE_LOG")
                .help("Write the player matching trace to this file")
                .long("trace-log")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("DUMP_ACTIONS")
                .help("Write every custom action as a JSON line to this file")
                .long("dump-actions")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("PRETTY")
                .help("Pretty-print JSON output")
                .long("pretty"),
        )
        .arg(
            Arg::with_name("VERBOSE")
                .help("Show per-player details and debug logging")
                .short("v")
                .long("verbose")
                .conflicts_with("QUIET"),
        )
        .arg(
            Arg::with_name("QUIET")
                .help("Only log warnings and errors")
                .short("q")
                .long("quiet"),
        )
        .arg(
            Arg::with_name("MIN_SIZE")
                .help("Minimum recording size in bytes (defaults to 16 for JSON dumps unless a config file sets it)")
                .long("min-size")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("KEEP_DIAGNOSTICS")
                .help("Do not silence the decoder's own diagnostics")
                .long("keep-diagnostics"),
        )
        .arg(
            Arg::with_name("PROMOTE_DRAWERS")
                .help("Report drawers on a team with a loser as losers")
                .long("promote-drawers"),
        )
        .arg(
            Arg::with_name("GENERATE_CONFIG")
                .help("Print a default config file and exit")
                .long("generate-config"),
        )
        .get_matches();

    if matches.is_present("GENERATE_CONFIG") {
        print!("{}", PipelineConfig::generate_default_toml());
        return Ok(());
    }

    let verbose = matches.is_present("VERBOSE");
    let level = if verbose {
        Level::DEBUG
    } else if matches.is_present("QUIET") {
        Level::WARN
    } else {
        Level::INFO
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();

    let mut config = load_config(&matches)?;
    apply_cli_overrides(&mut config, &matches)?;

    let input = matches
        .value_of("REPLAY")
        .ok_or_else(|| anyhow!("no replay given"))?;
    let input = Path::new(input);
    if !input.exists() {
        return Err(anyhow!("{} does not exist", input.display()));
    }

    let files = collect_recordings(input);
    if files.is_empty() {
        return Err(anyhow!("no .json replay dumps found in {}", input.display()));
    }

    let pipeline = Pipeline::with_config(DumpDecoder::new(), config);
    let dump_actions = matches
        .value_of("DUMP_ACTIONS")
        .map(|path| File::create(path).with_context(|| format!("failed to create {path}")))
        .transpose()?;

    let mut reports = Vec::with_capacity(files.len());
    let mut trace = Vec::new();
    let mut failed = 0usize;
    for path in &files {
        println!("==> {}", path.display());
        let outcome = process_file(&pipeline, path, dump_actions.as_ref());
        match &outcome {
            Ok(result) => {
                display::print_result(result, verbose);
                trace.extend(result.matching.debug_log.iter().cloned());
            }
            Err(e) => {
                failed += 1;
                println!("   FAILED: {e:#}");
            }
        }
        println!();
        reports.push((path.clone(), outcome));
    }

    if let Some(trace_path) = matches.value_of("TRACE_LOG") {
        if !trace.is_empty() {
            let mut text = trace.join("\n");
            text.push('\n');
            std::fs::write(trace_path, text)
                .with_context(|| format!("failed to write {trace_path}"))?;
        }
    }

    if let Some(output) = matches.value_of("OUTPUT") {
        let pretty = matches.is_present("PRETTY");
        let mut file_reports: Vec<FileReport> = reports
            .iter()
            .map(|(path, outcome)| FileReport::new(path, outcome))
            .collect();
        if input.is_file() {
            if let Some(report) = file_reports.pop() {
                write_json(output, &report, pretty)?;
            }
        } else {
            write_json(output, &file_reports, pretty)?;
        }
        println!("Results written to {output}");
    }

    if input.is_file() {
        if let Some((_, Err(e))) = reports.pop() {
            return Err(e);
        }
    } else if failed > 0 {
        println!("{failed} of {} file(s) failed", files.len());
    }

    Ok(())
}
