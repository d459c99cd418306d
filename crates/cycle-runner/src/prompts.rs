//! Cycle prompt rendering.
//!
//! The operator-authored template comes first, then the context bundle as a
//! fenced JSON block. In focus mode the single failing test is appended last
//! so it is the final thing the agent reads.

use anyhow::{Context, Result};
use context_engine::{ContextBundle, NextFailingTest};
use std::path::Path;

/// Recorded with each cycle's metrics. Bump when the rendered layout changes.
pub const PROMPT_VERSION: &str = "1.0.0";

/// Header introducing the injected context block
pub const CONTEXT_HEADER: &str = "## PROJECT CONTEXT";

/// Read the prompt template; a missing template is an error.
pub fn load_template(path: &Path) -> Result<String> {
    std::fs::read_to_string(path)
        .with_context(|| format!("Prompt template not found: {}", path.display()))
}

/// Render the full cycle prompt.
pub fn render_cycle_prompt(
    template: &str,
    bundle: &ContextBundle,
    focus: Option<&NextFailingTest>,
) -> Result<String> {
    let context = serde_json::to_string_pretty(bundle).context("Failed to serialize context")?;

    let mut prompt = String::with_capacity(template.len() + context.len() + 64);
    prompt.push_str(template.trim_end());
    prompt.push_str("\n\n");
    prompt.push_str(CONTEXT_HEADER);
    prompt.push_str("\n\n```json\n");
    prompt.push_str(&context);
    prompt.push_str("\n```\n");

    if let Some(focus) = focus {
        prompt.push('\n');
        prompt.push_str(&focus.render());
        prompt.push_str("\nWork only on this test until it passes.\n");
    }

    Ok(prompt)
}
