//! Recent commit history for the context bundle

use crate::harness::error::{HarnessError, HarnessResult};
use std::path::{Path, PathBuf};
use std::process::Command;

/// Source of short history lines, newest first
pub trait HistorySource {
    fn recent_lines(&self, max_lines: usize) -> HarnessResult<Vec<String>>;
}

/// `git log --oneline` in a working directory
pub struct GitHistory {
    working_dir: PathBuf,
}

impl GitHistory {
    pub fn new(working_dir: impl AsRef<Path>) -> Self {
        Self {
            working_dir: working_dir.as_ref().to_path_buf(),
        }
    }

    /// Run git command and return output
    fn run_git(&self, args: &[&str]) -> HarnessResult<String> {
        let output = Command::new("git")
            .args(args)
            .current_dir(&self.working_dir)
            .output()
            .map_err(|e| HarnessError::git("execute", e.to_string()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(HarnessError::git(args.join(" "), stderr.trim().to_string()));
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

impl HistorySource for GitHistory {
    fn recent_lines(&self, max_lines: usize) -> HarnessResult<Vec<String>> {
        if max_lines == 0 {
            return Ok(Vec::new());
        }
        let count = format!("-{}", max_lines);
        let output = self.run_git(&["log", "--oneline", &count])?;
        Ok(output.lines().map(str::to_string).collect())
    }
}
