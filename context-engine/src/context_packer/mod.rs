//! Context Packer: per-cycle context for the coding agent
//!
//! Discovers project files, ranks them against the currently failing tests,
//! and packs the most relevant ones together with the other cycle artifacts
//! into a [`ContextBundle`].

pub mod file_walker;
pub mod packer;
pub mod relevance;

pub use file_walker::{DiscoveredFile, FileWalker};
pub use packer::{read_truncated, ContextAssembler, ContextBundle, FileSelection};
pub use relevance::{RankedFile, RelevanceRanker, RelevanceWeights};
