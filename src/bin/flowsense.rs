//! FlowSense CLI - Command-line interface for the flow telemetry engine
//!
//! Commands:
//! - replay: Feed a recorded event log through an engine (batch mode)
//! - run: Stream events from stdin through the service (streaming mode)
//! - validate: Validate an event log
//! - doctor: Diagnose configuration and collaborator health

use clap::{Parser, Subcommand, ValueEnum};
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use log::{info, warn};
use tokio::io::BufReader;

use flowsense::scoring::{scorer_from_settings, FocusScorer, HttpFocusScorer, ScoringRequest};
use flowsense::streak::STREAK_TICK_MS;
use flowsense::{
    EventLog, FlowEngine, FlowError, FlowService, FlowSettings, FlowSnapshot,
    HttpSnapshotSink, JsonLinesSink, SessionRecord, SnapshotSink, FLOWSENSE_VERSION,
    PRODUCER_NAME,
};

/// FlowSense - Focus scoring and session telemetry for editor activity
#[derive(Parser)]
#[command(name = "flowsense")]
#[command(version = FLOWSENSE_VERSION)]
#[command(about = "Turn editor activity events into focus scores and session snapshots", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay a recorded NDJSON event log (batch mode)
    Replay {
        /// Input file path (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Settings file (TOML, or JSON with a .json extension)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Skip the remote scorer and use the local heuristic only
        #[arg(long)]
        offline: bool,

        /// Output format
        #[arg(long, default_value = "json-pretty")]
        output_format: OutputFormat,
    },

    /// Stream NDJSON events from stdin through the service (streaming mode,
    /// events stamped on arrival)
    Run {
        /// Settings file (TOML, or JSON with a .json extension)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// User identifier attached to persisted sessions
        #[arg(long, default_value = "anonymous")]
        user_id: String,

        /// Append session records to this JSON-lines file instead of POSTing them
        #[arg(long)]
        sink_file: Option<PathBuf>,

        /// Skip the remote scorer and use the local heuristic only
        #[arg(long)]
        offline: bool,
    },

    /// Validate an NDJSON event log
    Validate {
        /// Input file path (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Output validation report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Diagnose configuration and collaborator health
    Doctor {
        /// Settings file to check
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Clone, ValueEnum)]
enum OutputFormat {
    /// One compact snapshot per scoring tick, then the final snapshot
    Ndjson,
    /// Final snapshot as compact JSON
    Json,
    /// Final snapshot as pretty-printed JSON
    JsonPretty,
}

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

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

async fn run(cli: Cli) -> Result<(), FlowCliError> {
    match cli.command {
        Commands::Replay {
            input,
            config,
            offline,
            output_format,
        } => cmd_replay(&input, config.as_deref(), offline, output_format).await,
        Commands::Run {
            config,
            user_id,
            sink_file,
            offline,
        } => cmd_run(config.as_deref(), &user_id, sink_file.as_deref(), offline).await,
        Commands::Validate { input, json } => cmd_validate(&input, json),
        Commands::Doctor { config, json } => cmd_doctor(config.as_deref(), json).await,
    }
}

fn load_settings(config: Option<&Path>, offline: bool) -> Result<FlowSettings, FlowCliError> {
    let mut settings = match config {
        Some(path) => FlowSettings::load(path)?,
        None => FlowSettings::default(),
    };
    if offline {
        settings.scoring.enabled = false;
    }
    Ok(settings)
}

fn read_input(input: &Path) -> Result<String, FlowCliError> {
    if input.to_string_lossy() == "-" {
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer)?;
        Ok(buffer)
    } else {
        Ok(fs::read_to_string(input)?)
    }
}

async fn cmd_replay(
    input: &Path,
    config: Option<&Path>,
    offline: bool,
    output_format: OutputFormat,
) -> Result<(), FlowCliError> {
    let settings = load_settings(config, offline)?;
    let events = EventLog::parse_ndjson(&read_input(input)?)?;

    let first = match events.first() {
        Some(event) => event.timestamp,
        None => return Err(FlowCliError::NoEvents),
    };

    let scorer = scorer_from_settings(&settings.scoring);
    let mut engine = FlowEngine::new_at(settings, scorer, first);
    let tick = chrono::Duration::milliseconds(STREAK_TICK_MS as i64);
    let mut last_tick = first;
    let mut last_seen = first;

    for timed in events {
        let at = timed.timestamp;
        engine.apply_timed(timed);
        last_seen = last_seen.max(at);

        // Score on the streak cadence so replayed streaks match live ones
        if at - last_tick >= tick {
            engine.update_focus_score_at(at).await;
            last_tick = at;
            if matches!(output_format, OutputFormat::Ndjson) {
                println!("{}", serde_json::to_string(&engine.live_view_at(at))?);
            }
        }
    }

    let snapshot = engine.get_metrics_at(last_seen).await;
    print_snapshot(&snapshot, &output_format)
}

fn print_snapshot(snapshot: &FlowSnapshot, output_format: &OutputFormat) -> Result<(), FlowCliError> {
    match output_format {
        OutputFormat::Ndjson | OutputFormat::Json => println!("{}", serde_json::to_string(snapshot)?),
        OutputFormat::JsonPretty => println!("{}", serde_json::to_string_pretty(snapshot)?),
    }
    Ok(())
}

async fn cmd_run(
    config: Option<&Path>,
    user_id: &str,
    sink_file: Option<&Path>,
    offline: bool,
) -> Result<(), FlowCliError> {
    let settings = load_settings(config, offline)?;
    let sink: Arc<dyn SnapshotSink> = match sink_file {
        Some(path) => Arc::new(JsonLinesSink::new(path)),
        None => Arc::new(
            HttpSnapshotSink::new(&settings.persistence)
                .map_err(|e| FlowCliError::Runtime(e.to_string()))?,
        ),
    };

    let engine = FlowEngine::with_settings(settings);
    let (handle, join) = FlowService::spawn(engine, Arc::clone(&sink), user_id);

    // Live stream: events are stamped on arrival to share the service clock
    let stats = handle
        .ingest_ndjson(BufReader::new(tokio::io::stdin()))
        .await?;
    info!(
        "stdin closed after {} lines ({} skipped)",
        stats.lines, stats.skipped
    );

    handle.shutdown();
    let mut engine = join.await.map_err(|e| FlowCliError::Runtime(e.to_string()))?;

    let snapshot = engine.get_metrics().await;
    let record = SessionRecord::new(user_id, snapshot.clone());
    if let Err(e) = sink.persist(&record).await {
        warn!("Failed to persist final session via {} sink: {}", sink.name(), e);
    }

    print_snapshot(&snapshot, &OutputFormat::Json)
}

fn cmd_validate(input: &Path, json: bool) -> Result<(), FlowCliError> {
    let input_data = read_input(input)?;
    let failures = EventLog::validate_ndjson(&input_data);
    let total_events = input_data.lines().filter(|l| !l.trim().is_empty()).count();

    let report = ValidationReport {
        total_events,
        valid_events: total_events - failures.len(),
        invalid_events: failures.len(),
        errors: failures
            .iter()
            .map(|f| ValidationErrorDetail {
                line: f.line,
                error: f.message.clone(),
            })
            .collect(),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Validation Report");
        println!("=================");
        println!("Total events:   {}", report.total_events);
        println!("Valid events:   {}", report.valid_events);
        println!("Invalid events: {}", report.invalid_events);

        if !report.errors.is_empty() {
            println!("\nErrors:");
            for err in &report.errors {
                println!("  - Line {}: {}", err.line, err.error);
            }
        }
    }

    if report.invalid_events > 0 {
        Err(FlowCliError::ValidationFailed(report.invalid_events))
    } else {
        Ok(())
    }
}

async fn cmd_doctor(config: Option<&Path>, json: bool) -> Result<(), FlowCliError> {
    let mut checks: Vec<DoctorCheck> = Vec::new();

    checks.push(DoctorCheck {
        name: "flowsense_version".to_string(),
        status: CheckStatus::Ok,
        message: format!("FlowSense version {}", FLOWSENSE_VERSION),
    });

    // Settings
    let settings = match config {
        Some(path) => match FlowSettings::load(path) {
            Ok(settings) => {
                checks.push(DoctorCheck {
                    name: "config".to_string(),
                    status: CheckStatus::Ok,
                    message: format!("Loaded settings from {}", path.display()),
                });
                settings
            }
            Err(e) => {
                checks.push(DoctorCheck {
                    name: "config".to_string(),
                    status: CheckStatus::Error,
                    message: format!("Cannot load settings: {}", e),
                });
                FlowSettings::default()
            }
        },
        None => {
            checks.push(DoctorCheck {
                name: "config".to_string(),
                status: CheckStatus::Ok,
                message: "Using built-in defaults".to_string(),
            });
            FlowSettings::default()
        }
    };

    // Remote scorer
    checks.push(check_scorer(&settings).await);

    checks.push(DoctorCheck {
        name: "persistence".to_string(),
        status: CheckStatus::Ok,
        message: format!(
            "Snapshots POSTed to {} every {}s ({} ms timeout)",
            settings.persistence.endpoint,
            settings.persistence.interval_secs,
            settings.persistence.timeout_ms
        ),
    });

    // Check stdin is available (for streaming mode)
    let stdin_check = if atty::is(atty::Stream::Stdin) {
        DoctorCheck {
            name: "stdin".to_string(),
            status: CheckStatus::Ok,
            message: "stdin is a TTY (interactive mode)".to_string(),
        }
    } else {
        DoctorCheck {
            name: "stdin".to_string(),
            status: CheckStatus::Ok,
            message: "stdin is a pipe (streaming mode ready)".to_string(),
        }
    };
    checks.push(stdin_check);

    let report = DoctorReport {
        producer: PRODUCER_NAME.to_string(),
        version: FLOWSENSE_VERSION.to_string(),
        checks,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("FlowSense Doctor Report");
        println!("=======================");
        println!("Producer: {}", report.producer);
        println!("Version:  {}", report.version);
        println!("\nChecks:");
        for check in &report.checks {
            let status_icon = match check.status {
                CheckStatus::Ok => "[OK]",
                CheckStatus::Warning => "[WARN]",
                CheckStatus::Error => "[ERR]",
            };
            println!("  {} {}: {}", status_icon, check.name, check.message);
        }
    }

    let has_errors = report
        .checks
        .iter()
        .any(|c| matches!(c.status, CheckStatus::Error));
    if has_errors {
        Err(FlowCliError::DoctorFailed)
    } else {
        Ok(())
    }
}

async fn check_scorer(settings: &FlowSettings) -> DoctorCheck {
    if !settings.scoring.enabled {
        return DoctorCheck {
            name: "scorer".to_string(),
            status: CheckStatus::Ok,
            message: "Remote scoring disabled, local heuristic only".to_string(),
        };
    }

    let scorer = match HttpFocusScorer::new(&settings.scoring) {
        Ok(scorer) => scorer,
        Err(e) => {
            return DoctorCheck {
                name: "scorer".to_string(),
                status: CheckStatus::Error,
                message: format!("Cannot build HTTP client: {}", e),
            }
        }
    };

    let probe = ScoringRequest {
        current_streak: 0.0,
        longest_streak: 0.0,
        session_duration: 0.0,
        active_file_duration: 0.0,
        idle_time: 0.0,
        typing_rhythm: 100.0,
    };
    let timeout = settings.scoring.timeout().max(Duration::from_millis(1));
    match tokio::time::timeout(timeout, scorer.score(&probe)).await {
        Ok(Ok(score)) => DoctorCheck {
            name: "scorer".to_string(),
            status: CheckStatus::Ok,
            message: format!("{} answered with score {:.1}", scorer.endpoint(), score),
        },
        Ok(Err(e)) => DoctorCheck {
            name: "scorer".to_string(),
            status: CheckStatus::Warning,
            message: format!(
                "{} unavailable ({}), local heuristic will be used",
                scorer.endpoint(),
                e
            ),
        },
        Err(_) => DoctorCheck {
            name: "scorer".to_string(),
            status: CheckStatus::Warning,
            message: format!(
                "{} did not answer within {} ms, local heuristic will be used",
                scorer.endpoint(),
                settings.scoring.timeout_ms
            ),
        },
    }
}

// Error handling

#[derive(Debug)]
enum FlowCliError {
    Io(io::Error),
    Flow(FlowError),
    Json(serde_json::Error),
    Runtime(String),
    NoEvents,
    ValidationFailed(usize),
    DoctorFailed,
}

impl From<io::Error> for FlowCliError {
    fn from(e: io::Error) -> Self {
        FlowCliError::Io(e)
    }
}

impl From<FlowError> for FlowCliError {
    fn from(e: FlowError) -> Self {
        FlowCliError::Flow(e)
    }
}

impl From<serde_json::Error> for FlowCliError {
    fn from(e: serde_json::Error) -> Self {
        FlowCliError::Json(e)
    }
}

#[derive(serde::Serialize)]
struct CliError {
    code: String,
    message: String,
    hint: Option<String>,
}

impl From<FlowCliError> for CliError {
    fn from(e: FlowCliError) -> Self {
        match e {
            FlowCliError::Io(e) => CliError {
                code: "IO_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check file paths and permissions".to_string()),
            },
            FlowCliError::Flow(FlowError::ConfigError(msg)) => CliError {
                code: "CONFIG_ERROR".to_string(),
                message: msg,
                hint: Some("Run 'flowsense doctor --config <file>' for details".to_string()),
            },
            FlowCliError::Flow(e) => CliError {
                code: "PARSE_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Run 'flowsense validate' to find the offending lines".to_string()),
            },
            FlowCliError::Json(e) => CliError {
                code: "JSON_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check JSON syntax".to_string()),
            },
            FlowCliError::Runtime(msg) => CliError {
                code: "RUNTIME_ERROR".to_string(),
                message: msg,
                hint: None,
            },
            FlowCliError::NoEvents => CliError {
                code: "NO_EVENTS".to_string(),
                message: "No events found in input".to_string(),
                hint: Some("Ensure input file is not empty".to_string()),
            },
            FlowCliError::ValidationFailed(count) => CliError {
                code: "VALIDATION_FAILED".to_string(),
                message: format!("{} events failed validation", count),
                hint: Some("Fix validation errors and retry".to_string()),
            },
            FlowCliError::DoctorFailed => CliError {
                code: "DOCTOR_FAILED".to_string(),
                message: "One or more health checks failed".to_string(),
                hint: Some("Review the doctor report for details".to_string()),
            },
        }
    }
}

// Report types

#[derive(serde::Serialize)]
struct ValidationReport {
    total_events: usize,
    valid_events: usize,
    invalid_events: usize,
    errors: Vec<ValidationErrorDetail>,
}

#[derive(serde::Serialize)]
struct ValidationErrorDetail {
    line: usize,
    error: String,
}

#[derive(serde::Serialize)]
struct DoctorReport {
    producer: String,
    version: String,
    checks: Vec<DoctorCheck>,
}

#[derive(serde::Serialize)]
struct DoctorCheck {
    name: String,
    status: CheckStatus,
    message: String,
}

#[derive(serde::Serialize)]
enum CheckStatus {
    Ok,
    Warning,
    Error,
}
