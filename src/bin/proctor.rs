//! Proctor CLI - Command-line interface for Proctor Core
//!
//! Commands:
//! - replay: Run recorded perception frames through a session and report
//! - report: Score an existing event log
//! - config: Print the default configuration
//! - check-config: Validate a configuration file

use clap::{Parser, Subcommand, ValueEnum};
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use tracing::{info, warn};

use proctor_core::clock::{Clock, ManualClock, SystemClock};
use proctor_core::store::{EventStore, InMemoryEventStore, JsonlEventStore};
use proctor_core::{
    FrameResult, ProctorConfig, ProctorError, ProctorSession, Report, ScoreAggregator,
    PROCTOR_VERSION,
};

/// Proctor - integrity events and scoring for camera-proctored sessions
#[derive(Parser)]
#[command(name = "proctor")]
#[command(version = PROCTOR_VERSION)]
#[command(about = "Detect integrity events from perception frames and score sessions", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay timestamped perception frames through a session
    Replay {
        /// Candidate label
        #[arg(short, long)]
        candidate: String,

        /// NDJSON frames file (use - for stdin)
        #[arg(short, long)]
        frames: PathBuf,

        /// Configuration file (JSON)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Persist events to this NDJSON log instead of memory
        #[arg(long)]
        log: Option<PathBuf>,

        /// Report output path (use - for stdout)
        #[arg(short, long, default_value = "-")]
        output: PathBuf,

        /// Output format
        #[arg(long, default_value = "json")]
        output_format: OutputFormat,

        /// Also write the event log as CSV
        #[arg(long)]
        csv: Option<PathBuf>,
    },

    /// Score an existing NDJSON event log
    Report {
        /// Candidate label
        #[arg(short, long)]
        candidate: String,

        /// NDJSON event log
        #[arg(short, long)]
        log: PathBuf,

        /// Configuration file (JSON)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Session length; defaults to the span of the log
        #[arg(long)]
        duration_seconds: Option<i64>,

        /// Report output path (use - for stdout)
        #[arg(short, long, default_value = "-")]
        output: PathBuf,

        /// Output format
        #[arg(long, default_value = "json")]
        output_format: OutputFormat,

        /// Also write the event log as CSV
        #[arg(long)]
        csv: Option<PathBuf>,
    },

    /// Print the default configuration
    Config {
        /// Pretty-print
        #[arg(long)]
        pretty: bool,
    },

    /// Load and validate a configuration file
    CheckConfig {
        /// Configuration file (JSON)
        #[arg(long)]
        config: PathBuf,
    },
}

#[derive(Clone, ValueEnum)]
enum OutputFormat {
    /// Compact JSON
    Json,
    /// Pretty-printed JSON
    JsonPretty,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "proctor=info,proctor_core=info".into()),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!(
                "{}",
                serde_json::to_string(&CliError::from(e))
                    .unwrap_or_else(|_| "Unknown error".to_string())
            );
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<(), ProctorCliError> {
    match cli.command {
        Commands::Replay {
            candidate,
            frames,
            config,
            log,
            output,
            output_format,
            csv,
        } => {
            cmd_replay(
                &candidate,
                &frames,
                config.as_deref(),
                log,
                &output,
                output_format,
                csv.as_deref(),
            )
            .await
        }

        Commands::Report {
            candidate,
            log,
            config,
            duration_seconds,
            output,
            output_format,
            csv,
        } => {
            cmd_report(
                &candidate,
                log,
                config.as_deref(),
                duration_seconds,
                &output,
                output_format,
                csv.as_deref(),
            )
            .await
        }

        Commands::Config { pretty } => {
            let config = ProctorConfig::default();
            let json = if pretty {
                config.to_json_pretty()?
            } else {
                config.to_json()?
            };
            println!("{}", json);
            Ok(())
        }

        Commands::CheckConfig { config } => {
            load_config(Some(config.as_path()))?;
            println!("{}: ok", config.display());
            Ok(())
        }
    }
}

async fn cmd_replay(
    candidate: &str,
    frames_path: &Path,
    config_path: Option<&Path>,
    log: Option<PathBuf>,
    output: &Path,
    output_format: OutputFormat,
    csv: Option<&Path>,
) -> Result<(), ProctorCliError> {
    let config = load_config(config_path)?;
    let frames = parse_frames(&read_input(frames_path)?)?;

    let first = frames
        .first()
        .ok_or(ProctorCliError::NoFrames)?
        .timestamp
        .ok_or(ProctorError::MissingTimestamp)?;

    let clock = ManualClock::new(first);
    let shared_clock: Arc<dyn Clock> = Arc::new(clock.clone());
    let store: Arc<dyn EventStore> = match log {
        Some(path) => Arc::new(JsonlEventStore::new(path, Arc::clone(&shared_clock))),
        None => Arc::new(InMemoryEventStore::new(Arc::clone(&shared_clock))),
    };

    let mut session = ProctorSession::new(
        candidate,
        &config.monitor,
        Arc::clone(&store),
        shared_clock,
    )?;

    for (index, frame) in frames.iter().enumerate() {
        session
            .replay_frame(&clock, frame)
            .map_err(|e| ProctorCliError::Frame(index + 1, e))?;
    }

    let record = session.finish().await;
    info!(
        frames = record.frames_processed,
        events = record.events_emitted,
        "replay complete"
    );

    let report = ScoreAggregator::new(config.scoring)
        .build_report(store.as_ref(), &record)
        .await;

    write_report(&report, output, &output_format, csv)
}

async fn cmd_report(
    candidate: &str,
    log_path: PathBuf,
    config_path: Option<&Path>,
    duration_seconds: Option<i64>,
    output: &Path,
    output_format: OutputFormat,
    csv: Option<&Path>,
) -> Result<(), ProctorCliError> {
    let config = load_config(config_path)?;
    let candidate = candidate.trim();
    let store = JsonlEventStore::new(log_path, Arc::new(SystemClock));

    let log = match store.fetch_log(candidate).await {
        Ok(log) => log,
        Err(e) => {
            warn!(%candidate, error = %e, "failed to read event log; scoring empty log");
            Vec::new()
        }
    };

    let duration = duration_seconds.unwrap_or_else(|| match (log.first(), log.last()) {
        (Some(first), Some(last)) => (last.timestamp - first.timestamp).num_seconds(),
        _ => 0,
    });

    let outcome = ScoreAggregator::new(config.scoring).score(&log);
    let report = Report::new(candidate, outcome, duration, log);

    write_report(&report, output, &output_format, csv)
}

// Helper functions

fn load_config(path: Option<&Path>) -> Result<ProctorConfig, ProctorCliError> {
    match path {
        Some(path) => Ok(ProctorConfig::from_json(&fs::read_to_string(path)?)?),
        None => Ok(ProctorConfig::default()),
    }
}

fn read_input(path: &Path) -> Result<String, ProctorCliError> {
    if path.to_string_lossy() == "-" {
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer)?;
        Ok(buffer)
    } else {
        Ok(fs::read_to_string(path)?)
    }
}

fn parse_frames(input: &str) -> Result<Vec<FrameResult>, ProctorCliError> {
    let mut frames = Vec::new();
    for (index, line) in input.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let frame: FrameResult = serde_json::from_str(trimmed).map_err(|e| {
            ProctorCliError::ParseError(format!("Failed to parse frame on line {}: {}", index + 1, e))
        })?;
        frames.push(frame);
    }
    Ok(frames)
}

fn write_report(
    report: &Report,
    output: &Path,
    format: &OutputFormat,
    csv: Option<&Path>,
) -> Result<(), ProctorCliError> {
    let data = match format {
        OutputFormat::Json => report.to_json()?,
        OutputFormat::JsonPretty => report.to_json_pretty()?,
    };

    if output.to_string_lossy() == "-" {
        println!("{}", data);
    } else {
        fs::write(output, data)?;
    }

    if let Some(csv_path) = csv {
        fs::write(csv_path, report.to_csv())?;
        info!(path = %csv_path.display(), suggested_name = %report.csv_file_name(), "wrote CSV log");
    }

    Ok(())
}

// Error types

#[derive(Debug)]
enum ProctorCliError {
    Io(io::Error),
    Core(ProctorError),
    Json(serde_json::Error),
    Frame(usize, ProctorError),
    NoFrames,
    ParseError(String),
}

impl From<io::Error> for ProctorCliError {
    fn from(e: io::Error) -> Self {
        ProctorCliError::Io(e)
    }
}

impl From<ProctorError> for ProctorCliError {
    fn from(e: ProctorError) -> Self {
        ProctorCliError::Core(e)
    }
}

impl From<serde_json::Error> for ProctorCliError {
    fn from(e: serde_json::Error) -> Self {
        ProctorCliError::Json(e)
    }
}

#[derive(serde::Serialize)]
struct CliError {
    code: String,
    message: String,
    hint: Option<String>,
}

impl From<ProctorCliError> for CliError {
    fn from(e: ProctorCliError) -> Self {
        match e {
            ProctorCliError::Io(e) => CliError {
                code: "IO_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check file paths and permissions".to_string()),
            },
            ProctorCliError::Core(ProctorError::Config(msg)) => CliError {
                code: "CONFIG_ERROR".to_string(),
                message: msg,
                hint: Some("Run 'proctor config --pretty' for a valid starting point".to_string()),
            },
            ProctorCliError::Core(ProctorError::MissingTimestamp) => CliError {
                code: "MISSING_TIMESTAMP".to_string(),
                message: ProctorError::MissingTimestamp.to_string(),
                hint: Some("Every replayed frame needs an RFC 3339 \"timestamp\"".to_string()),
            },
            ProctorCliError::Core(e) => CliError {
                code: "CORE_ERROR".to_string(),
                message: e.to_string(),
                hint: None,
            },
            ProctorCliError::Json(e) => CliError {
                code: "JSON_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check JSON syntax".to_string()),
            },
            ProctorCliError::Frame(line, e) => CliError {
                code: "FRAME_ERROR".to_string(),
                message: format!("Frame {}: {}", line, e),
                hint: Some("Frames must carry timestamps".to_string()),
            },
            ProctorCliError::NoFrames => CliError {
                code: "NO_FRAMES".to_string(),
                message: "No frames found in input".to_string(),
                hint: Some("Ensure the frames file is not empty".to_string()),
            },
            ProctorCliError::ParseError(msg) => CliError {
                code: "PARSE_ERROR".to_string(),
                message: msg,
                hint: Some("Each line must be one JSON frame {timestamp, faces, detections}".to_string()),
            },
        }
    }
}
