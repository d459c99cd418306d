//! Cycle runner for an autonomous coding loop
//!
//! Assembles failing-test-aware context, drives the coding agent for one
//! cycle, and keeps the cycle metrics log.
//!
//! # Usage
//!
//! ```bash
//! # Print the context bundle for the current project
//! cycle-runner --root ./app context --pretty
//!
//! # Run one cycle focused on the first failing test
//! cycle-runner --root ./app run --focus --iteration 12
//!
//! # Summarize recorded cycles
//! cycle-runner --root ./app metrics summary
//! ```

mod agent;
mod cycle;
mod prompts;

use agent::AgentCommand;
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use context_engine::harness::settings::SETTINGS_FILE;
use context_engine::{
    load_registry, next_failing_test, ContextAssembler, CycleOutcome, HarnessError,
    HarnessSettings, MetricsCollector, MetricsEntry, MetricsSummary, RegistryStatus,
    SentinelFiles,
};
use cycle::{run_cycle, CycleReport, CycleRequest};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

/// Command-line arguments
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Project root holding the cycle artifacts
    #[arg(long, global = true, default_value = ".")]
    root: PathBuf,

    /// Settings file (defaults to <root>/harness.conf)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Assemble the context bundle and print it as JSON
    Context {
        #[arg(long, default_value_t = false)]
        pretty: bool,
    },
    /// Print the first failing test
    NextTest,
    /// Print test registry status
    Status {
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Record or summarize cycle metrics
    Metrics {
        #[command(subcommand)]
        action: MetricsAction,
    },
    /// Run one coding cycle
    Run {
        /// Focus the agent on the first failing test
        #[arg(long, default_value_t = false)]
        focus: bool,
        #[arg(long, default_value_t = 0)]
        iteration: u64,
        /// Tag recorded with the cycle metrics
        #[arg(long)]
        prompt_version: Option<String>,
    },
}

#[derive(Subcommand, Debug)]
enum MetricsAction {
    /// Append one cycle record
    Record {
        iteration: u64,
        duration: f64,
        #[arg(action = clap::ArgAction::Set)]
        success: bool,
        failing_before: i64,
        failing_after: i64,
        #[arg(long)]
        error_msg: Option<String>,
        #[arg(long, default_value_t = false)]
        timeout: bool,
        #[arg(long)]
        prompt_version: Option<String>,
    },
    /// Summarize the metrics log
    Summary {
        #[arg(long, default_value_t = false)]
        json: bool,
        /// Also list the last N cycles
        #[arg(long, default_value_t = 0)]
        recent: usize,
    },
}

/// `metrics summary` output
#[derive(Serialize, Debug)]
struct MetricsReport {
    #[serde(flatten)]
    summary: MetricsSummary,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    recent_cycles: Vec<MetricsEntry>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", error_report(&e));
            ExitCode::FAILURE
        }
    }
}

/// Error chain, plus the recovery hint of the first harness error in it
fn error_report(err: &anyhow::Error) -> String {
    let mut report = format!("Error: {err:#}");
    let suggestion = err
        .chain()
        .find_map(|cause| cause.downcast_ref::<HarnessError>())
        .and_then(HarnessError::recovery_suggestion);
    if let Some(suggestion) = suggestion {
        report.push_str("\n\nRecovery: ");
        report.push_str(suggestion);
    }
    report
}

fn settings_file(args: &Args) -> PathBuf {
    args.config
        .clone()
        .unwrap_or_else(|| args.root.join(SETTINGS_FILE))
}

async fn run(args: Args) -> Result<()> {
    let settings = HarnessSettings::load(&args.root, args.config.as_deref())
        .with_context(|| format!("Failed to load settings for {}", args.root.display()))?;

    // The default level lives in the settings file, so the subscriber can only
    // be installed once it is loaded. Logs go to stderr; stdout carries
    // command output.
    let default_level = settings.log_level.to_lowercase();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let source = settings_file(&args);
    debug!(
        path = %source.display(),
        found = source.exists(),
        root = %args.root.display(),
        "Loaded settings"
    );

    match args.command {
        Command::Context { pretty } => print_context(&args.root, settings, pretty),
        Command::NextTest => {
            match next_failing_test(&settings.feature_list_path) {
                Some(focus) => print!("{}", focus.render()),
                None => println!("All tests passing."),
            }
            Ok(())
        }
        Command::Status { json } => print_status(&settings, json),
        Command::Metrics { action } => metrics(&settings, action),
        Command::Run {
            focus,
            iteration,
            prompt_version,
        } => {
            let agent = AgentCommand::new(&settings.agent_command)
                .with_model(&settings.codex_model)
                .with_timeout_secs(settings.cycle_timeout_secs);
            let request = CycleRequest {
                iteration,
                focus,
                prompt_version,
            };
            let control = SentinelFiles::in_dir(&args.root);
            match run_cycle(&args.root, &settings, &agent, &control, &request).await? {
                CycleReport::StopRequested => println!("Stop requested."),
                CycleReport::Paused => println!("Paused."),
                CycleReport::NothingToFocus => println!("All tests passing."),
                CycleReport::Completed(entry) => {
                    info!(iteration = entry.iteration, success = entry.success, "Cycle finished");
                    println!("{}", serde_json::to_string(&entry)?);
                }
            }
            Ok(())
        }
    }
}

fn print_context(root: &Path, settings: HarnessSettings, pretty: bool) -> Result<()> {
    let bundle = ContextAssembler::new(root, settings)
        .assemble()
        .context("Failed to assemble context")?;
    let json = if pretty {
        serde_json::to_string_pretty(&bundle)?
    } else {
        serde_json::to_string(&bundle)?
    };
    println!("{json}");
    Ok(())
}

fn print_status(settings: &HarnessSettings, json: bool) -> Result<()> {
    let status = load_registry(&settings.feature_list_path, None)
        .map(|doc| doc.status())
        .unwrap_or_else(|| RegistryStatus::from_tests(&[]));

    if json {
        println!("{}", serde_json::to_string_pretty(&status)?);
        return Ok(());
    }

    println!(
        "Tests: {} passing / {} total ({:.1}%)",
        status.passing_tests, status.total_tests, status.pass_rate
    );
    for (category, counts) in &status.categories {
        println!("  {category}: {}/{}", counts.passing, counts.total);
    }
    if !status.failing_details.is_empty() {
        println!("Failing:");
        for detail in &status.failing_details {
            println!("  [{}] {}", detail.category, detail.description);
        }
    }
    Ok(())
}

fn metrics(settings: &HarnessSettings, action: MetricsAction) -> Result<()> {
    let collector = MetricsCollector::new(&settings.metrics_path);
    match action {
        MetricsAction::Record {
            iteration,
            duration,
            success,
            failing_before,
            failing_after,
            error_msg,
            timeout,
            prompt_version,
        } => {
            let mut outcome = CycleOutcome::new(iteration, duration, success)
                .with_failing(failing_before, failing_after);
            outcome.error_msg = error_msg;
            outcome.timeout = timeout;
            outcome.prompt_version = prompt_version;
            let entry = collector.record_cycle(&outcome)?;
            println!("{}", serde_json::to_string(&entry)?);
        }
        MetricsAction::Summary { json, recent } => {
            let read_context = || format!("Failed to read metrics log {}", collector.path().display());
            let report = MetricsReport {
                summary: collector.summary().with_context(read_context)?,
                recent_cycles: collector.recent(recent).with_context(read_context)?,
            };
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!("{}", report.summary.render());
                if !report.recent_cycles.is_empty() {
                    println!("Recent cycles:");
                    for entry in &report.recent_cycles {
                        println!("  {}", format_entry(entry));
                    }
                }
            }
        }
    }
    Ok(())
}

/// One-line view of a recorded cycle
fn format_entry(entry: &MetricsEntry) -> String {
    let mut line = format!(
        "#{} {} {} {:.2}s progress {:+}",
        entry.iteration,
        entry.timestamp,
        if entry.success { "ok" } else { "FAIL" },
        entry.duration_secs,
        entry.progress,
    );
    if entry.timeout {
        line.push_str(" [timeout]");
    }
    if let Some(message) = &entry.error_msg {
        line.push_str(&format!(" ({message})"));
    }
    line
}
