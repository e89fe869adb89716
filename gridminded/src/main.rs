//! gridminded - replay runner for the gridmind learning core
//!
//! Commands:
//! - `replay <frames.json> [--config <path>] [--json]` drives an engine over
//!   recorded frames and prints one report per turn
//! - `parse-decision` reads a decision reply on stdin and prints the parsed
//!   commands as JSON
//!
//! Config lookup: `--config`, else `config.json` in the platform config dir
//! (e.g. ~/.config/gridmind/ on Linux), else built-in defaults. `GRIDMIND_*`
//! environment variables are applied last.

use std::fs;
use std::io::Read as _;
use std::path::{Path, PathBuf};

use gridmind::config::EngineConfig;
use gridmind::error::ConfigError;
use gridmind::observer::EngineAdapter;
use gridmind::orchestrator::{FrameRecord, Orchestrator, TurnReport};
use gridmind::response::parse_decision;
use thiserror::Error;
use tracing::{info, warn};

mod interpreter;
mod paths;

use interpreter::InterpreterRuntime;
use paths::AppPaths;

#[derive(Debug, Error)]
enum CliError {
    #[error("usage: {0}")]
    Usage(String),
    #[error("{path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("config: {0}")]
    Config(#[from] ConfigError),
    #[error("frames: {0}")]
    Json(#[from] serde_json::Error),
}

const USAGE: &str =
    "gridminded replay <frames.json> [--config <path>] [--json] | gridminded parse-decision";

struct ReplayArgs {
    frames: PathBuf,
    config: Option<PathBuf>,
    json: bool,
}

fn parse_replay_args(args: &[String]) -> Result<ReplayArgs, CliError> {
    let mut frames = None;
    let mut config = None;
    let mut json = false;

    let mut it = args.iter();
    while let Some(a) = it.next() {
        match a.as_str() {
            "--config" => {
                let p = it
                    .next()
                    .ok_or_else(|| CliError::Usage("--config needs a path".to_string()))?;
                config = Some(PathBuf::from(p));
            }
            "--json" => json = true,
            other if frames.is_none() && !other.starts_with("--") => {
                frames = Some(PathBuf::from(other));
            }
            other => return Err(CliError::Usage(format!("unexpected argument '{other}'"))),
        }
    }

    Ok(ReplayArgs {
        frames: frames.ok_or_else(|| CliError::Usage(USAGE.to_string()))?,
        config,
        json,
    })
}

fn read_file(path: &Path) -> Result<String, CliError> {
    fs::read_to_string(path).map_err(|source| CliError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn load_config(explicit: Option<&Path>) -> Result<EngineConfig, CliError> {
    let cfg = match explicit {
        Some(p) => EngineConfig::from_json_str(&read_file(p)?)?,
        None => match AppPaths::new() {
            Ok(paths) if paths.config_file().exists() => {
                let p = paths.config_file();
                info!(path = %p.display(), "loading config");
                EngineConfig::from_json_str(&read_file(&p)?)?
            }
            Ok(_) => EngineConfig::default(),
            Err(e) => {
                warn!("{e}; using default config");
                EngineConfig::default()
            }
        },
    };

    let cfg = cfg.with_env_overrides();
    cfg.validate().map_err(ConfigError::Invalid)?;
    Ok(cfg)
}

/// Run one recorded frame. Malformed grids degrade instead of stopping the replay.
fn step_record(engine: &mut Orchestrator, record: &FrameRecord) -> TurnReport {
    let frame = record.to_frame(&engine.config().perception);
    engine.step(&frame)
}

fn replay(args: ReplayArgs) -> Result<(), CliError> {
    let cfg = load_config(args.config.as_deref())?;
    let records: Vec<FrameRecord> = serde_json::from_str(&read_file(&args.frames)?)?;
    info!(frames = records.len(), "replay starting");

    let mut engine =
        Orchestrator::new(cfg).with_collaborator(Box::new(InterpreterRuntime::new_from_env()));

    for record in &records {
        let report = step_record(&mut engine, record);
        if args.json {
            println!("{}", serde_json::to_string(&report)?);
        } else {
            println!("{}", report.reasoning);
        }
    }

    if !args.json {
        println!("{}", EngineAdapter::new(&engine).snapshot().render());
    }
    Ok(())
}

fn decide() -> Result<(), CliError> {
    let mut text = String::new();
    std::io::stdin()
        .read_to_string(&mut text)
        .map_err(|source| CliError::Io {
            path: PathBuf::from("<stdin>"),
            source,
        })?;
    let decision = parse_decision(&text);
    println!("{}", serde_json::to_string_pretty(&decision)?);
    Ok(())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::fmt::init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    match args.first().map(String::as_str) {
        Some("replay") => replay(parse_replay_args(&args[1..])?)?,
        Some("parse-decision") => decide()?,
        _ => return Err(CliError::Usage(USAGE.to_string()).into()),
    }
    Ok(())
}
