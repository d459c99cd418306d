//! Context assembly and adaptive test selection for autonomous coding cycles.
//!
//! Each cycle, an agent gets a bounded bundle of grounding material: the
//! application spec, progress notes, a right-sized slice of the test registry,
//! the project files most relevant to the failing tests, and recent history.
//! After the cycle, its outcome is appended to a metrics log.
//!
//! - [`harness`]: registry loading, adaptive limits, settings, control flags
//! - [`context_packer`]: file discovery, relevance ranking, bundle assembly
//! - [`metrics`]: cycle metrics log and summary

pub mod context_packer;
pub mod harness;
pub mod metrics;

pub use context_packer::{ContextAssembler, ContextBundle, RelevanceRanker, RelevanceWeights};
pub use harness::{
    adaptive_limit, load_registry, next_failing_test, ControlFlags, HarnessError, HarnessResult,
    HarnessSettings, NextFailingTest, RegistryDocument, RegistryStatus, SentinelFiles, TestCase,
};
pub use metrics::{CycleOutcome, MetricsCollector, MetricsEntry, MetricsSummary};
