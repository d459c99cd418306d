//! One coding cycle: control checks, prompt, agent run, metrics.

use crate::agent::AgentCommand;
use crate::prompts::{load_template, render_cycle_prompt, PROMPT_VERSION};
use anyhow::{Context, Result};
use context_engine::{
    load_registry, ContextAssembler, ControlFlags, CycleOutcome, HarnessSettings,
    MetricsCollector, MetricsEntry,
};
use std::path::Path;
use std::time::Instant;
use tracing::info;

/// Options for a single cycle
#[derive(Debug, Clone, Default)]
pub struct CycleRequest {
    pub iteration: u64,
    /// Append the first failing test as the sole focus
    pub focus: bool,
    /// Overrides the built-in prompt version tag
    pub prompt_version: Option<String>,
}

/// What a cycle did
#[derive(Debug, Clone, PartialEq)]
pub enum CycleReport {
    StopRequested,
    Paused,
    /// Focus mode with nothing failing; the agent was not started
    NothingToFocus,
    Completed(MetricsEntry),
}

fn failing_count(path: &Path) -> i64 {
    load_registry(path, None)
        .map(|doc| doc.failing().len() as i64)
        .unwrap_or(0)
}

/// Run one cycle against the project at `root`.
pub async fn run_cycle(
    root: &Path,
    settings: &HarnessSettings,
    agent: &AgentCommand,
    control: &dyn ControlFlags,
    request: &CycleRequest,
) -> Result<CycleReport> {
    if control.is_stop_requested() {
        info!("Stop requested, skipping cycle");
        return Ok(CycleReport::StopRequested);
    }
    if control.is_paused() {
        info!("Harness paused, skipping cycle");
        return Ok(CycleReport::Paused);
    }

    let focus = if request.focus {
        match context_engine::next_failing_test(&settings.feature_list_path) {
            Some(focus) => Some(focus),
            None => {
                info!("No failing tests to focus on");
                return Ok(CycleReport::NothingToFocus);
            }
        }
    } else {
        None
    };

    let failing_before = failing_count(&settings.feature_list_path);

    let bundle = ContextAssembler::new(root, settings.clone())
        .assemble()
        .context("Failed to assemble context")?;
    let template = load_template(&settings.cycle_prompt_file)?;
    let prompt = render_cycle_prompt(&template, &bundle, focus.as_ref())?;

    info!(
        iteration = request.iteration,
        failing_before,
        focus = focus.as_ref().map(|f| f.index),
        prompt_bytes = prompt.len(),
        "Starting cycle"
    );

    let started = Instant::now();
    let exit = agent.run(root, &prompt).await;
    let duration = started.elapsed().as_secs_f64();

    let failing_after = failing_count(&settings.feature_list_path);

    let mut outcome = CycleOutcome::new(request.iteration, duration, exit.is_success())
        .with_failing(failing_before, failing_after)
        .with_prompt_version(
            request
                .prompt_version
                .clone()
                .unwrap_or_else(|| PROMPT_VERSION.to_string()),
        );
    if exit.is_timeout() {
        outcome = outcome.timed_out();
    }
    if let Some(message) = exit.error_message() {
        outcome = outcome.with_error(message);
    }

    let entry = MetricsCollector::new(&settings.metrics_path)
        .record_cycle(&outcome)
        .context("Failed to record cycle metrics")?;

    Ok(CycleReport::Completed(entry))
}

#[cfg(test)]
mod tests {
    use super::*;
    use context_engine::SentinelFiles;
    use std::fs;
    use tempfile::tempdir;

    fn project(registry: &str) -> (tempfile::TempDir, HarnessSettings) {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("feature_list.json"), registry).unwrap();
        fs::write(dir.path().join("coding_prompt.md"), "Fix the next test.").unwrap();
        let mut settings = HarnessSettings::default();
        settings.resolve_paths(dir.path());
        (dir, settings)
    }

    const ONE_FAILING: &str =
        r#"{"tests": [{"description": "a", "passes": true}, {"description": "b", "passes": false}]}"#;

    #[tokio::test]
    async fn test_stop_flag_wins_over_pause() {
        let (dir, settings) = project(ONE_FAILING);
        fs::write(dir.path().join(".harness_pause"), "").unwrap();
        let flags = SentinelFiles::in_dir(dir.path());

        let report = run_cycle(
            dir.path(),
            &settings,
            &AgentCommand::new("true"),
            &flags,
            &CycleRequest::default(),
        )
        .await
        .unwrap();
        assert_eq!(report, CycleReport::Paused);

        fs::write(dir.path().join(".harness_stop"), "").unwrap();
        let report = run_cycle(
            dir.path(),
            &settings,
            &AgentCommand::new("true"),
            &flags,
            &CycleRequest::default(),
        )
        .await
        .unwrap();
        assert_eq!(report, CycleReport::StopRequested);
        assert!(!settings.metrics_path.exists());
    }

    #[tokio::test]
    async fn test_focus_with_all_passing_skips_agent() {
        let (dir, settings) = project(r#"[{"description": "a", "passes": true}]"#);
        let request = CycleRequest {
            focus: true,
            ..CycleRequest::default()
        };
        let report = run_cycle(
            dir.path(),
            &settings,
            &AgentCommand::new("true"),
            &SentinelFiles::in_dir(dir.path()),
            &request,
        )
        .await
        .unwrap();
        assert_eq!(report, CycleReport::NothingToFocus);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_completed_cycle_is_recorded() {
        let (dir, settings) = project(ONE_FAILING);
        let request = CycleRequest {
            iteration: 3,
            focus: true,
            prompt_version: Some("exp-a".to_string()),
        };
        let report = run_cycle(
            dir.path(),
            &settings,
            &AgentCommand::new("true"),
            &SentinelFiles::in_dir(dir.path()),
            &request,
        )
        .await
        .unwrap();

        let CycleReport::Completed(entry) = report else {
            panic!("expected a completed cycle, got {report:?}");
        };
        assert_eq!(entry.iteration, 3);
        assert!(entry.success);
        assert_eq!(entry.failing_before, 1);
        assert_eq!(entry.failing_after, 1);
        assert_eq!(entry.progress, 0);
        assert_eq!(entry.prompt_version.as_deref(), Some("exp-a"));

        let summary = MetricsCollector::new(&settings.metrics_path).summary().unwrap();
        assert_eq!(summary.total_cycles, 1);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_failed_agent_is_recorded_as_error() {
        let (dir, settings) = project(ONE_FAILING);
        let report = run_cycle(
            dir.path(),
            &settings,
            &AgentCommand::new("false"),
            &SentinelFiles::in_dir(dir.path()),
            &CycleRequest::default(),
        )
        .await
        .unwrap();

        let CycleReport::Completed(entry) = report else {
            panic!("expected a completed cycle, got {report:?}");
        };
        assert!(!entry.success);
        assert_eq!(entry.error_msg.as_deref(), Some("agent exited with status 1"));
        assert_eq!(entry.prompt_version.as_deref(), Some(PROMPT_VERSION));
    }

    #[tokio::test]
    async fn test_missing_template_fails_before_agent() {
        let (dir, settings) = project(ONE_FAILING);
        fs::remove_file(&settings.cycle_prompt_file).unwrap();
        let result = run_cycle(
            dir.path(),
            &settings,
            &AgentCommand::new("true"),
            &SentinelFiles::in_dir(dir.path()),
            &CycleRequest::default(),
        )
        .await;
        assert!(result.is_err());
        assert!(!settings.metrics_path.exists());
    }
}
