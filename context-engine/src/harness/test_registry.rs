//! Test registry loading and selection
//!
//! Handles reading `feature_list.json`, truncating it for prompts, sizing the
//! test list to the current pass/fail mix, and locating the next failing test.

use crate::harness::error::{HarnessError, HarnessResult};
use crate::harness::types::{NextFailingTest, RegistryStatus, TestCase};
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use serde_json::Value;
use std::collections::HashSet;
use std::path::Path;
use tracing::{debug, warn};

/// At or below this many failing tests the limit grows instead of shrinking.
pub const SMALL_FAILING_SET: usize = 3;

/// Extra tests shown around a small failing set.
pub const SMALL_SET_HEADROOM: usize = 5;

/// Hard cap on the limit for a small failing set.
pub const SMALL_SET_CAP: usize = 15;

/// A parsed test registry, keeping the shape it was stored in.
#[derive(Debug, Clone, PartialEq)]
pub enum RegistryDocument {
    /// `{ "tests": [...], ...other keys }`
    Wrapped {
        tests: Vec<TestCase>,
        rest: serde_json::Map<String, Value>,
    },
    /// `[...]`
    Bare(Vec<TestCase>),
    /// Valid JSON without a recognizable test list, carried through as-is
    Opaque(Value),
}

impl RegistryDocument {
    /// Read a registry file.
    ///
    /// Returns `Ok(None)` when the file does not exist.
    pub fn read(path: impl AsRef<Path>) -> HarnessResult<Option<Self>> {
        let path = path.as_ref();
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let value: Value = serde_json::from_str(&content)
            .map_err(|e| HarnessError::invalid_registry(path, e.to_string()))?;
        Self::from_value(value)
            .map(Some)
            .map_err(|message| HarnessError::invalid_registry(path, message))
    }

    /// Normalize a JSON value into a registry document.
    pub fn from_value(value: Value) -> Result<Self, String> {
        match value {
            Value::Array(items) => parse_tests(items).map(Self::Bare),
            Value::Object(mut map) => match map.remove("tests") {
                Some(Value::Array(items)) => Ok(Self::Wrapped {
                    tests: parse_tests(items)?,
                    rest: map,
                }),
                Some(other) => {
                    map.insert("tests".to_string(), other);
                    Ok(Self::Opaque(Value::Object(map)))
                }
                None => Ok(Self::Opaque(Value::Object(map))),
            },
            other => Ok(Self::Opaque(other)),
        }
    }

    /// All tests in registry order (empty for an opaque document)
    pub fn tests(&self) -> &[TestCase] {
        match self {
            Self::Wrapped { tests, .. } | Self::Bare(tests) => tests,
            Self::Opaque(_) => &[],
        }
    }

    /// Failing tests in registry order
    pub fn failing(&self) -> Vec<&TestCase> {
        self.tests().iter().filter(|t| !t.passes).collect()
    }

    /// Keep only the first `limit` tests, preserving the document shape.
    ///
    /// `None` or `Some(0)` means no limit.
    pub fn truncated(self, limit: Option<usize>) -> Self {
        let limit = match limit {
            Some(limit) if limit > 0 => limit,
            _ => return self,
        };
        if self.tests().len() <= limit {
            return self;
        }
        match self {
            Self::Wrapped { mut tests, rest } => {
                tests.truncate(limit);
                Self::Wrapped { tests, rest }
            }
            Self::Bare(mut tests) => {
                tests.truncate(limit);
                Self::Bare(tests)
            }
            opaque @ Self::Opaque(_) => opaque,
        }
    }

    /// First failing test in registry order
    pub fn next_failing(&self) -> Option<NextFailingTest> {
        self.tests()
            .iter()
            .enumerate()
            .find(|(_, t)| !t.passes)
            .map(|(index, test)| NextFailingTest {
                index,
                test: test.clone(),
            })
    }

    /// Pass/fail snapshot
    pub fn status(&self) -> RegistryStatus {
        RegistryStatus::from_tests(self.tests())
    }

    /// Problems that do not prevent loading but weaken test-driven ranking
    ///
    /// Checks for:
    /// - Empty descriptions
    /// - Tests without steps
    /// - Duplicate descriptions
    pub fn validate(&self) -> Vec<String> {
        let mut issues = Vec::new();
        let mut seen = HashSet::new();

        for (index, test) in self.tests().iter().enumerate() {
            let description = test.description.trim();
            if description.is_empty() {
                issues.push(format!("Test #{} has an empty description", index));
            } else if !seen.insert(description.to_lowercase()) {
                issues.push(format!(
                    "Test #{} duplicates description: {}",
                    index, description
                ));
            }
            if test.steps.is_empty() {
                issues.push(format!("Test #{} has no steps", index));
            }
        }

        issues
    }
}

impl Serialize for RegistryDocument {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Wrapped { tests, rest } => {
                let mut map = serializer.serialize_map(Some(rest.len() + 1))?;
                map.serialize_entry("tests", tests)?;
                for (key, value) in rest {
                    map.serialize_entry(key, value)?;
                }
                map.end()
            }
            Self::Bare(tests) => tests.serialize(serializer),
            Self::Opaque(value) => value.serialize(serializer),
        }
    }
}

fn parse_tests(items: Vec<Value>) -> Result<Vec<TestCase>, String> {
    serde_json::from_value(Value::Array(items)).map_err(|e| format!("malformed test entry: {}", e))
}

/// Load the registry, capped to `limit` entries.
///
/// A missing or malformed registry yields `None`; callers treat that the same
/// as an empty registry.
pub fn load_registry(path: impl AsRef<Path>, limit: Option<usize>) -> Option<RegistryDocument> {
    let path = path.as_ref();
    match RegistryDocument::read(path) {
        Ok(Some(doc)) => Some(doc.truncated(limit)),
        Ok(None) => {
            debug!(path = %path.display(), "No test registry");
            None
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Ignoring unreadable test registry");
            None
        }
    }
}

/// Locate the first failing test in the registry at `path`.
pub fn next_failing_test(path: impl AsRef<Path>) -> Option<NextFailingTest> {
    load_registry(path, None).and_then(|doc| doc.next_failing())
}

/// How many tests to show the agent given the current pass/fail mix.
///
/// Few failures leave room for surrounding passing tests; many failures are
/// bounded by `default_limit` and never exceed the failing count.
pub fn adaptive_limit(tests: &[TestCase], default_limit: usize) -> usize {
    if tests.is_empty() {
        return default_limit;
    }

    let total = tests.len();
    let failing = tests.iter().filter(|t| !t.passes).count();

    if failing <= SMALL_FAILING_SET {
        (failing + SMALL_SET_HEADROOM).min(total).min(SMALL_SET_CAP)
    } else {
        failing.min(default_limit)
    }
}
