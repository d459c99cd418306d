//! Cycle metrics: an append-only JSONL log of coding cycles and its summary.
//!
//! Each cycle appends one self-contained line, so concurrent writers never
//! read-modify-write. Readers fail loudly on a corrupt line rather than
//! reporting a summary that silently skipped data.

use crate::harness::error::{HarnessError, HarnessResult};
use chrono::{SecondsFormat, Utc};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use tracing::info;

/// Default metrics log file name under the project root
pub const METRICS_FILE: &str = "harness_metrics.jsonl";

/// Entries considered for the rolling success rate
pub const DEFAULT_ROLLING_WINDOW: usize = 10;

/// Result of one coding cycle, as reported by the runner
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CycleOutcome {
    pub iteration: u64,
    pub duration_secs: f64,
    pub success: bool,
    pub failing_before: i64,
    pub failing_after: i64,
    pub timeout: bool,
    pub error_msg: Option<String>,
    pub prompt_version: Option<String>,
}

impl CycleOutcome {
    pub fn new(iteration: u64, duration_secs: f64, success: bool) -> Self {
        Self {
            iteration,
            duration_secs,
            success,
            ..Self::default()
        }
    }

    pub fn with_failing(mut self, before: i64, after: i64) -> Self {
        self.failing_before = before;
        self.failing_after = after;
        self
    }

    pub fn with_error(mut self, message: impl Into<String>) -> Self {
        self.error_msg = Some(message.into());
        self
    }

    pub fn timed_out(mut self) -> Self {
        self.timeout = true;
        self
    }

    pub fn with_prompt_version(mut self, version: impl Into<String>) -> Self {
        self.prompt_version = Some(version.into());
        self
    }
}

/// One line of the metrics log
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MetricsEntry {
    /// UTC, RFC 3339
    pub timestamp: String,
    pub iteration: u64,
    pub duration_secs: f64,
    pub success: bool,
    pub failing_before: i64,
    pub failing_after: i64,
    /// `failing_before - failing_after`; negative when tests regressed
    pub progress: i64,
    #[serde(default)]
    pub timeout: bool,
    #[serde(default)]
    pub error_msg: Option<String>,
    #[serde(default)]
    pub prompt_version: Option<String>,
}

impl MetricsEntry {
    fn from_outcome(outcome: &CycleOutcome, timestamp: String) -> Self {
        Self {
            timestamp,
            iteration: outcome.iteration,
            duration_secs: round_to(outcome.duration_secs, 2),
            success: outcome.success,
            failing_before: outcome.failing_before,
            failing_after: outcome.failing_after,
            progress: outcome.failing_before - outcome.failing_after,
            timeout: outcome.timeout,
            error_msg: outcome.error_msg.clone(),
            prompt_version: outcome.prompt_version.clone(),
        }
    }
}

/// Aggregate view over the metrics log
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct MetricsSummary {
    pub total_cycles: usize,
    pub successful_cycles: usize,
    /// Sum of `progress`, signed
    pub total_tests_fixed: i64,
    pub avg_cycle_duration: f64,
    pub error_rate: f64,
    pub timeout_count: usize,
    pub rolling_success_rate: f64,
    pub rolling_window: usize,
}

impl MetricsSummary {
    /// Summarize entries in log order.
    pub fn from_entries(entries: &[MetricsEntry], rolling_window: usize) -> Self {
        let total = entries.len();
        if total == 0 {
            return Self {
                rolling_window,
                ..Self::default()
            };
        }

        let successful = entries.iter().filter(|e| e.success).count();
        let total_duration: f64 = entries.iter().map(|e| e.duration_secs).sum();

        let window = &entries[total.saturating_sub(rolling_window)..];
        let rolling_success_rate = if window.is_empty() {
            0.0
        } else {
            window.iter().filter(|e| e.success).count() as f64 / window.len() as f64
        };

        Self {
            total_cycles: total,
            successful_cycles: successful,
            total_tests_fixed: entries.iter().map(|e| e.progress).sum(),
            avg_cycle_duration: round_to(total_duration / total as f64, 2),
            error_rate: round_to((total - successful) as f64 / total as f64, 3),
            timeout_count: entries.iter().filter(|e| e.timeout).count(),
            rolling_success_rate: round_to(rolling_success_rate, 3),
            rolling_window,
        }
    }

    /// Human-readable report
    pub fn render(&self) -> String {
        format!(
            "Cycles:            {}\n\
             Successful:        {}\n\
             Tests fixed:       {}\n\
             Avg duration:      {:.2}s\n\
             Error rate:        {:.1}%\n\
             Timeouts:          {}\n\
             Last {} success:  {:.1}%",
            self.total_cycles,
            self.successful_cycles,
            self.total_tests_fixed,
            self.avg_cycle_duration,
            self.error_rate * 100.0,
            self.timeout_count,
            self.rolling_window,
            self.rolling_success_rate * 100.0,
        )
    }
}

/// Appends cycle records to a JSONL log and summarizes them.
pub struct MetricsCollector {
    path: PathBuf,
    rolling_window: usize,
}

impl MetricsCollector {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            rolling_window: DEFAULT_ROLLING_WINDOW,
        }
    }

    /// Number of most recent entries behind `rolling_success_rate`
    pub fn with_rolling_window(mut self, window: usize) -> Self {
        self.rolling_window = window;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one cycle record.
    ///
    /// The line is written with a single `write_all` under an exclusive
    /// advisory lock, so records from concurrent runners never interleave.
    ///
    /// A non-finite duration is rejected before the log is touched.
    pub fn record_cycle(&self, outcome: &CycleOutcome) -> HarnessResult<MetricsEntry> {
        let timestamp = Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true);
        let entry = MetricsEntry::from_outcome(outcome, timestamp);
        if !entry.duration_secs.is_finite() {
            return Err(HarnessError::invalid_outcome(format!(
                "duration_secs must be finite, got {}",
                outcome.duration_secs
            )));
        }

        let mut line = serde_json::to_string(&entry)?;
        line.push('\n');

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| HarnessError::metrics_write(&self.path, e))?;

        FileExt::lock_exclusive(&file).map_err(|e| HarnessError::metrics_write(&self.path, e))?;
        let written = file.write_all(line.as_bytes()).and_then(|_| file.flush());
        let _ = FileExt::unlock(&file);
        written.map_err(|e| HarnessError::metrics_write(&self.path, e))?;

        info!(
            iteration = entry.iteration,
            success = entry.success,
            progress = entry.progress,
            duration_secs = entry.duration_secs,
            timeout = entry.timeout,
            path = %self.path.display(),
            "Recorded cycle metrics"
        );

        Ok(entry)
    }

    /// Every entry in log order. An absent log has no entries.
    pub fn entries(&self) -> HarnessResult<Vec<MetricsEntry>> {
        let file = match File::open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut entries = Vec::new();
        for (index, line) in BufReader::new(file).lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let entry: MetricsEntry = serde_json::from_str(&line)
                .map_err(|e| HarnessError::metrics_corrupt(&self.path, index + 1, e.to_string()))?;
            entries.push(entry);
        }
        Ok(entries)
    }

    /// The last `n` entries in log order
    pub fn recent(&self, n: usize) -> HarnessResult<Vec<MetricsEntry>> {
        let mut entries = self.entries()?;
        let skip = entries.len().saturating_sub(n);
        Ok(entries.split_off(skip))
    }

    pub fn summary(&self) -> HarnessResult<MetricsSummary> {
        let entries = self.entries()?;
        Ok(MetricsSummary::from_entries(&entries, self.rolling_window))
    }
}

fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn collector(dir: &Path) -> MetricsCollector {
        MetricsCollector::new(dir.join(METRICS_FILE))
    }

    #[test]
    fn test_absent_log_gives_zero_summary() {
        let dir = tempdir().unwrap();
        let summary = collector(dir.path()).summary().unwrap();
        assert_eq!(summary.total_cycles, 0);
        assert_eq!(summary.error_rate, 0.0);
        assert_eq!(summary.rolling_success_rate, 0.0);
        assert_eq!(summary.rolling_window, DEFAULT_ROLLING_WINDOW);
    }

    #[test]
    fn test_empty_log_gives_zero_summary() {
        let dir = tempdir().unwrap();
        let metrics = collector(dir.path());
        fs::write(metrics.path(), "").unwrap();
        assert_eq!(metrics.summary().unwrap().total_cycles, 0);
    }

    #[test]
    fn test_single_successful_cycle() {
        let dir = tempdir().unwrap();
        let metrics = collector(dir.path());

        let entry = metrics
            .record_cycle(&CycleOutcome::new(1, 42.123, true).with_failing(10, 7))
            .unwrap();
        assert_eq!(entry.progress, 3);
        assert_eq!(entry.duration_secs, 42.12);
        assert!(entry.timestamp.ends_with('Z'));

        let summary = metrics.summary().unwrap();
        assert_eq!(summary.total_cycles, 1);
        assert_eq!(summary.successful_cycles, 1);
        assert_eq!(summary.total_tests_fixed, 3);
        assert_eq!(summary.error_rate, 0.0);
        assert_eq!(summary.rolling_success_rate, 1.0);
    }

    #[test]
    fn test_regression_counts_negative_progress() {
        let dir = tempdir().unwrap();
        let metrics = collector(dir.path());
        metrics
            .record_cycle(&CycleOutcome::new(1, 5.0, true).with_failing(4, 6))
            .unwrap();
        metrics
            .record_cycle(&CycleOutcome::new(2, 5.0, true).with_failing(6, 5))
            .unwrap();
        assert_eq!(metrics.summary().unwrap().total_tests_fixed, -1);
    }

    #[test]
    fn test_error_rate_timeouts_and_average() {
        let dir = tempdir().unwrap();
        let metrics = collector(dir.path());
        metrics.record_cycle(&CycleOutcome::new(1, 10.0, true)).unwrap();
        metrics
            .record_cycle(&CycleOutcome::new(2, 20.0, false).timed_out().with_error("timeout"))
            .unwrap();
        metrics.record_cycle(&CycleOutcome::new(3, 15.0, false)).unwrap();

        let summary = metrics.summary().unwrap();
        assert_eq!(summary.avg_cycle_duration, 15.0);
        assert_eq!(summary.error_rate, 0.667);
        assert_eq!(summary.timeout_count, 1);
        assert_eq!(summary.rolling_success_rate, 0.333);
    }

    #[test]
    fn test_rolling_window_uses_latest_entries() {
        let dir = tempdir().unwrap();
        let metrics = collector(dir.path()).with_rolling_window(2);
        metrics.record_cycle(&CycleOutcome::new(1, 1.0, false)).unwrap();
        metrics.record_cycle(&CycleOutcome::new(2, 1.0, false)).unwrap();
        metrics.record_cycle(&CycleOutcome::new(3, 1.0, true)).unwrap();
        metrics.record_cycle(&CycleOutcome::new(4, 1.0, true)).unwrap();

        let summary = metrics.summary().unwrap();
        assert_eq!(summary.rolling_success_rate, 1.0);
        assert_eq!(summary.rolling_window, 2);
        assert_eq!(summary.error_rate, 0.5);
    }

    #[test]
    fn test_recent_returns_tail_in_order() {
        let dir = tempdir().unwrap();
        let metrics = collector(dir.path());
        for i in 1..=5 {
            metrics.record_cycle(&CycleOutcome::new(i, 1.0, true)).unwrap();
        }
        let iterations: Vec<u64> = metrics.recent(2).unwrap().iter().map(|e| e.iteration).collect();
        assert_eq!(iterations, vec![4, 5]);
        assert_eq!(metrics.recent(50).unwrap().len(), 5);
    }

    #[test]
    fn test_each_record_is_one_line() {
        let dir = tempdir().unwrap();
        let metrics = collector(dir.path());
        metrics
            .record_cycle(
                &CycleOutcome::new(1, 1.0, false)
                    .with_error("line one\nline two")
                    .with_prompt_version("v2"),
            )
            .unwrap();
        metrics.record_cycle(&CycleOutcome::new(2, 1.0, true)).unwrap();

        let text = fs::read_to_string(metrics.path()).unwrap();
        assert_eq!(text.lines().count(), 2);
        let first: serde_json::Value = serde_json::from_str(text.lines().next().unwrap()).unwrap();
        assert_eq!(first["error_msg"], "line one\nline two");
        assert_eq!(first["prompt_version"], "v2");
    }

    #[test]
    fn test_entries_without_optional_fields_load() {
        let dir = tempdir().unwrap();
        let metrics = collector(dir.path());
        fs::write(
            metrics.path(),
            r#"{"timestamp":"2026-01-01T00:00:00Z","iteration":1,"duration_secs":3.0,"success":true,"failing_before":2,"failing_after":1,"progress":1}
"#,
        )
        .unwrap();
        let entries = metrics.entries().unwrap();
        assert_eq!(entries.len(), 1);
        assert!(!entries[0].timeout);
        assert_eq!(entries[0].error_msg, None);
    }

    #[test]
    fn test_corrupt_line_is_reported() {
        let dir = tempdir().unwrap();
        let metrics = collector(dir.path());
        metrics.record_cycle(&CycleOutcome::new(1, 1.0, true)).unwrap();
        let mut file = OpenOptions::new().append(true).open(metrics.path()).unwrap();
        writeln!(file, "{{not json").unwrap();

        match metrics.summary() {
            Err(HarnessError::MetricsCorrupt { line, .. }) => assert_eq!(line, 2),
            other => panic!("expected MetricsCorrupt, got {other:?}"),
        }
    }

    #[test]
    fn test_non_finite_duration_is_rejected_without_writing() {
        let dir = tempdir().unwrap();
        let metrics = collector(dir.path());
        metrics.record_cycle(&CycleOutcome::new(1, 2.0, true)).unwrap();

        for duration in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY, f64::MAX] {
            assert!(matches!(
                metrics.record_cycle(&CycleOutcome::new(2, duration, true)),
                Err(HarnessError::InvalidOutcome { .. })
            ));
        }

        let summary = metrics.summary().unwrap();
        assert_eq!(summary.total_cycles, 1);
        assert_eq!(summary.avg_cycle_duration, 2.0);
    }

    #[test]
    fn test_unwritable_log_is_metrics_write_error() {
        let dir = tempdir().unwrap();
        let metrics = MetricsCollector::new(dir.path().join("missing/dir/metrics.jsonl"));
        assert!(matches!(
            metrics.record_cycle(&CycleOutcome::new(1, 1.0, true)),
            Err(HarnessError::MetricsWrite { .. })
        ));
    }
}
