//! External coding agent invocation.

use std::time::Duration;
use tokio::process::Command;
use tracing::{info, warn};

/// How one agent run ended
#[derive(Debug, Clone, PartialEq)]
pub enum AgentExit {
    Success,
    Failed { code: Option<i32> },
    TimedOut { after: Duration },
    /// The agent executable could not be started
    SpawnError(String),
}

impl AgentExit {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::TimedOut { .. })
    }

    /// Message for the metrics log, if the run did not succeed
    pub fn error_message(&self) -> Option<String> {
        match self {
            Self::Success => None,
            Self::Failed { code: Some(code) } => Some(format!("agent exited with status {code}")),
            Self::Failed { code: None } => Some("agent terminated by signal".to_string()),
            Self::TimedOut { after } => Some(format!("agent timed out after {}s", after.as_secs())),
            Self::SpawnError(e) => Some(format!("failed to start agent: {e}")),
        }
    }
}

/// `<program> exec --yolo [--model M] <prompt>`
#[derive(Debug, Clone)]
pub struct AgentCommand {
    pub program: String,
    pub model: Option<String>,
    pub timeout: Option<Duration>,
}

impl AgentCommand {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            model: None,
            timeout: None,
        }
    }

    /// Empty model names leave the agent's default in place
    pub fn with_model(mut self, model: &str) -> Self {
        self.model = (!model.trim().is_empty()).then(|| model.trim().to_string());
        self
    }

    /// Zero disables the timeout
    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.timeout = (secs > 0).then(|| Duration::from_secs(secs));
        self
    }

    pub fn args(&self, prompt: &str) -> Vec<String> {
        let mut args = vec!["exec".to_string(), "--yolo".to_string()];
        if let Some(model) = &self.model {
            args.push("--model".to_string());
            args.push(model.clone());
        }
        args.push(prompt.to_string());
        args
    }

    /// Run the agent in `working_dir` with inherited stdio.
    pub async fn run(&self, working_dir: &std::path::Path, prompt: &str) -> AgentExit {
        let mut child = match Command::new(&self.program)
            .args(self.args(prompt))
            .current_dir(working_dir)
            .kill_on_drop(true)
            .spawn()
        {
            Ok(child) => child,
            Err(e) => {
                warn!(program = %self.program, "Failed to start agent: {e}");
                return AgentExit::SpawnError(e.to_string());
            }
        };

        info!(program = %self.program, model = ?self.model, "Agent started");

        let status = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, child.wait()).await {
                Ok(status) => status,
                Err(_) => {
                    warn!("Agent timed out ({}s)", limit.as_secs());
                    let _ = child.kill().await;
                    return AgentExit::TimedOut { after: limit };
                }
            },
            None => child.wait().await,
        };

        match status {
            Ok(status) if status.success() => AgentExit::Success,
            Ok(status) => AgentExit::Failed {
                code: status.code(),
            },
            Err(e) => AgentExit::SpawnError(e.to_string()),
        }
    }
}
