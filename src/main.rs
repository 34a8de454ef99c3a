mod debug_report;

use cadence_rerank::{Context, Engine, JsonFileSource, Options, Track};
use chrono::{Local, NaiveDateTime};
use std::io::{self, IsTerminal, Read};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

const RULES_ENV: &str = "CADENCE_RULES";

fn main() {
    init_logging();

    let config = match parse_args() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("{err}");
            std::process::exit(2);
        }
    };

    if let Err(err) = run(config) {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(io::stderr).init();
}

enum Command {
    ValidatePattern(String),
    Stats,
    Rerank { query: String, tracks: Option<TrackInput> },
}

enum TrackInput {
    Stdin,
    File(PathBuf),
}

struct CliConfig {
    command: Command,
    rules: Option<PathBuf>,
    reference_time: NaiveDateTime,
    color: bool,
    json: bool,
}

fn run(config: CliConfig) -> Result<(), String> {
    let engine = || -> Result<Engine, String> {
        let path = config.rules.clone().ok_or_else(|| format!("no rule document given (use --rules or set {RULES_ENV})"))?;
        Ok(Engine::new(JsonFileSource::new(path), Options::default()))
    };

    match &config.command {
        Command::ValidatePattern(pattern) => {
            let check = cadence_rerank::validate_pattern(pattern);
            if config.json {
                print_json(&check)?;
            } else {
                debug_report::print_pattern_check(pattern, &check, config.color);
            }
        }
        Command::Stats => {
            let stats = engine()?.rule_stats().map_err(|e| e.to_string())?;
            if config.json {
                print_json(&stats)?;
            } else {
                debug_report::print_stats(&stats, config.color);
            }
        }
        Command::Rerank { query, tracks: None } => {
            let plan = engine()?.prepare_query(query).map_err(|e| e.to_string())?;
            if config.json {
                print_json(&plan)?;
            } else {
                debug_report::print_plan(query, &plan, config.color);
            }
        }
        Command::Rerank { query, tracks: Some(input) } => {
            let tracks = read_tracks(input)?;
            let ctx = Context { reference_time: config.reference_time };
            let outcome = engine()?.rerank(query, tracks, &ctx).map_err(|e| e.to_string())?;
            if config.json {
                print_json(&outcome)?;
            } else {
                debug_report::print_outcome(query, &outcome, config.color);
            }
        }
    }
    Ok(())
}

fn print_json(value: &impl serde::Serialize) -> Result<(), String> {
    let text = serde_json::to_string_pretty(value).map_err(|e| e.to_string())?;
    println!("{text}");
    Ok(())
}

fn read_tracks(input: &TrackInput) -> Result<Vec<Track>, String> {
    let text = match input {
        TrackInput::Stdin => {
            let mut buffer = String::new();
            io::stdin().read_to_string(&mut buffer).map_err(|err| format!("failed to read stdin: {err}"))?;
            buffer
        }
        TrackInput::File(path) => std::fs::read_to_string(path)
            .map_err(|err| format!("failed to read tracks from {}: {err}", path.display()))?,
    };
    let value: serde_json::Value = serde_json::from_str(&text).map_err(|err| format!("tracks are not valid JSON: {err}"))?;
    Track::list_from_json(value).map_err(|err| err.to_string())
}

fn parse_args() -> Result<CliConfig, String> {
    let mut query: Option<String> = None;
    let mut tracks: Option<TrackInput> = None;
    let mut rules: Option<PathBuf> = std::env::var_os(RULES_ENV).map(PathBuf::from);
    let mut reference_time = Local::now().naive_local();
    let mut color = io::stdout().is_terminal();
    let mut json = false;
    let mut pattern: Option<String> = None;
    let mut stats = false;
    let mut args = std::env::args().skip(1);

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "-h" | "--help" => {
                print_help();
                std::process::exit(0);
            }
            "-V" | "--version" => {
                println!("cadence {}", env!("CARGO_PKG_VERSION"));
                std::process::exit(0);
            }
            "--color" => color = true,
            "--no-color" => color = false,
            "--json" => json = true,
            "--stats" => stats = true,
            "--rules" | "-r" => {
                let value = args.next().ok_or_else(|| "error: --rules expects a value".to_string())?;
                rules = Some(PathBuf::from(value));
            }
            "--tracks" | "-t" => {
                let value = args.next().ok_or_else(|| "error: --tracks expects a value".to_string())?;
                tracks = Some(track_input(&value));
            }
            "--reference" => {
                let value = args.next().ok_or_else(|| "error: --reference expects a value".to_string())?;
                reference_time = parse_reference(&value)?;
            }
            "--validate-pattern" => {
                let value = args.next().ok_or_else(|| "error: --validate-pattern expects a value".to_string())?;
                pattern = Some(value);
            }
            "--query" | "-q" => {
                let value = args.next().ok_or_else(|| "error: --query expects a value".to_string())?;
                set_query(&mut query, value)?;
            }
            "--" => {
                let rest = args.by_ref().collect::<Vec<_>>().join(" ");
                if !rest.trim().is_empty() {
                    set_query(&mut query, rest)?;
                }
                break;
            }
            _ if arg.starts_with("--rules=") => rules = Some(PathBuf::from(arg.trim_start_matches("--rules="))),
            _ if arg.starts_with("--tracks=") => tracks = Some(track_input(arg.trim_start_matches("--tracks="))),
            _ if arg.starts_with("--reference=") => {
                reference_time = parse_reference(arg.trim_start_matches("--reference="))?;
            }
            _ if arg.starts_with("--query=") => set_query(&mut query, arg.trim_start_matches("--query=").to_string())?,
            _ if arg.starts_with('-') => {
                return Err(format!("error: unknown option '{arg}'"));
            }
            _ => {
                let rest = std::iter::once(arg).chain(args.by_ref()).collect::<Vec<_>>().join(" ");
                set_query(&mut query, rest)?;
                break;
            }
        }
    }

    let command = match (pattern, stats, query) {
        (Some(pattern), false, None) => Command::ValidatePattern(pattern),
        (None, true, None) => Command::Stats,
        (None, false, Some(query)) if !query.trim().is_empty() => Command::Rerank { query, tracks },
        (None, false, _) => return Err(format!("error: no query provided\n\n{}", help_text())),
        _ => return Err("error: --validate-pattern, --stats and a query are mutually exclusive".to_string()),
    };

    Ok(CliConfig { command, rules, reference_time, color, json })
}

fn set_query(query: &mut Option<String>, value: String) -> Result<(), String> {
    if query.is_some() {
        return Err("error: query provided multiple times".to_string());
    }
    *query = Some(value);
    Ok(())
}

fn track_input(value: &str) -> TrackInput {
    if value == "-" { TrackInput::Stdin } else { TrackInput::File(PathBuf::from(value)) }
}

fn parse_reference(value: &str) -> Result<NaiveDateTime, String> {
    NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S")
        .map_err(|_| format!("error: invalid --reference '{value}' (expected YYYY-MM-DDTHH:MM:SS)"))
}

fn print_help() {
    println!("{}", help_text());
}

fn help_text() -> String {
    format!(
        "cadence {version}

Search-result reranking rule engine CLI.

Usage:
  cadence [OPTIONS] --rules <file> [--tracks <file>] [--] <query...>
  cadence [OPTIONS] --rules <file> --stats
  cadence [OPTIONS] --validate-pattern <regex>

Without --tracks, only the pre-search plan (facets, filters) is printed.

Options:
  -r, --rules <file>         Rule document (JSON). Default: ${rules_env}
  -t, --tracks <file>        Scored track list (JSON array); '-' reads stdin.
  -q, --query <text>         Query text. If omitted, remaining args are used.
  --reference <timestamp>    Reference time for track ages, YYYY-MM-DDTHH:MM:SS.
                             Default: now
  --validate-pattern <regex> Check a rule pattern for validity and safety.
  --stats                    Print rule counts by type.
  --json                     Print JSON instead of the report.
  --color                    Force ANSI color output.
  --no-color                 Disable ANSI color output.
  -h, --help                 Show this help message.
  -V, --version              Print version information.

Logging goes to stderr; set RUST_LOG (e.g. RUST_LOG=cadence=debug).

Exit codes:
  0  Success.
  1  Rule document, track list or engine error.
  2  Invalid arguments or missing input.
",
        version = env!("CARGO_PKG_VERSION"),
        rules_env = RULES_ENV
    )
}
