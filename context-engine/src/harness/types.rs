//! Core types for the coding-loop harness
//!
//! Test cases follow the `feature_list.json` format written by the
//! initializer agent and updated by the coding agent every cycle.

use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::fmt::Write as _;

/// Number of failing tests listed in a [`RegistryStatus`].
pub const FAILING_DETAILS_LIMIT: usize = 10;

/// One behavioral acceptance check.
///
/// Example:
/// ```json
/// {
///   "category": "functional",
///   "description": "New chat button creates fresh conversation",
///   "steps": [
///     "Navigate to main interface",
///     "Click 'New Chat' button",
///     "Verify conversation created"
///   ],
///   "passes": false
/// }
/// ```
///
/// The position in the registry is the identity of a test; it is not stored
/// on the record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TestCase {
    /// Free-form label (e.g. "functional", "style")
    #[serde(default = "default_category", deserialize_with = "null_as_unknown")]
    pub category: String,

    /// Human-readable description
    #[serde(default, deserialize_with = "null_as_default")]
    pub description: String,

    /// Verification steps
    #[serde(default, deserialize_with = "null_as_default")]
    pub steps: Vec<String>,

    /// Whether the test currently passes; `null` counts as failing
    #[serde(default, deserialize_with = "null_as_default")]
    pub passes: bool,

    /// Fields this harness does not interpret, kept so a re-emitted registry
    /// carries everything the agent wrote
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

fn default_category() -> String {
    "unknown".to_string()
}

fn null_as_unknown<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_else(default_category))
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

impl TestCase {
    /// Create a failing test case
    pub fn new(category: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            category: category.into(),
            description: description.into(),
            steps: Vec::new(),
            passes: false,
            extra: serde_json::Map::new(),
        }
    }

    /// Add a verification step
    pub fn with_step(mut self, step: impl Into<String>) -> Self {
        self.steps.push(step.into());
        self
    }

    /// Set the pass flag
    pub fn passing(mut self, passes: bool) -> Self {
        self.passes = passes;
        self
    }

    /// Steps joined with single spaces, as matched by the relevance ranker
    pub fn steps_text(&self) -> String {
        self.steps.join(" ")
    }
}

/// The first failing test in registry order, with its zero-based position.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NextFailingTest {
    pub index: usize,
    pub test: TestCase,
}

impl NextFailingTest {
    /// Render the focus block injected into single-test prompts.
    pub fn render(&self) -> String {
        let mut block = String::new();
        let _ = writeln!(block, "## CURRENT FOCUS: FAILING TEST #{}", self.index);
        let _ = writeln!(block, "Status: FAILING (passes=false)");
        let _ = writeln!(block, "Category: {}", self.test.category);
        let _ = writeln!(block, "Description: {}", self.test.description);
        if self.test.steps.is_empty() {
            let _ = writeln!(block, "Steps: (none listed)");
        } else {
            let _ = writeln!(block, "Steps:");
            for (i, step) in self.test.steps.iter().enumerate() {
                let _ = writeln!(block, "  {}. {}", i + 1, step);
            }
        }
        block
    }
}

/// Pass/fail counts for one category
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CategoryStatus {
    pub total: usize,
    pub passing: usize,
    pub failing: usize,
}

/// Short description of a failing test
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FailingDetail {
    pub category: String,
    pub description: String,
}

/// Snapshot of registry health, as shown by status views
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RegistryStatus {
    pub total_tests: usize,
    pub passing_tests: usize,
    pub failing_tests: usize,
    /// Percentage, one decimal
    pub pass_rate: f64,
    pub categories: BTreeMap<String, CategoryStatus>,
    /// First failing tests in registry order
    pub failing_details: Vec<FailingDetail>,
}

impl RegistryStatus {
    pub fn from_tests(tests: &[TestCase]) -> Self {
        let total_tests = tests.len();
        let passing_tests = tests.iter().filter(|t| t.passes).count();
        let failing_tests = total_tests - passing_tests;

        let mut categories: BTreeMap<String, CategoryStatus> = BTreeMap::new();
        for test in tests {
            let entry = categories.entry(test.category.clone()).or_default();
            entry.total += 1;
            if test.passes {
                entry.passing += 1;
            } else {
                entry.failing += 1;
            }
        }

        let failing_details = tests
            .iter()
            .filter(|t| !t.passes)
            .take(FAILING_DETAILS_LIMIT)
            .map(|t| FailingDetail {
                category: t.category.clone(),
                description: t.description.clone(),
            })
            .collect();

        let pass_rate = if total_tests > 0 {
            (passing_tests as f64 / total_tests as f64 * 1000.0).round() / 10.0
        } else {
            0.0
        };

        Self {
            total_tests,
            passing_tests,
            failing_tests,
            pass_rate,
            categories,
            failing_details,
        }
    }

    /// True when there is at least one test and none fail
    pub fn all_passing(&self) -> bool {
        self.total_tests > 0 && self.failing_tests == 0
    }
}
