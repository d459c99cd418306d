//! Relevance ranking of project files against failing tests
//!
//! Scores are additive: a file-type tier bonus plus bonuses for every failing
//! test whose description or steps mention the file's stem or any of its path
//! segments. Mentions outweigh file type so evidence for the current failures
//! is packed first.

use crate::context_packer::file_walker::DiscoveredFile;
use crate::harness::types::TestCase;
use std::cmp::Reverse;
use std::path::Path;

/// Manifest and documentation files
pub const HIGH_RELEVANCE_PATTERNS: &[&str] = &[
    ".json",
    ".md",
    ".txt",
    "package.json",
    "requirements.txt",
    "Cargo.toml",
];

/// General source code
pub const MEDIUM_RELEVANCE_PATTERNS: &[&str] =
    &[".py", ".js", ".ts", ".tsx", ".jsx", ".go", ".rs", ".java"];

/// Style, markup, and config files
pub const LOW_RELEVANCE_PATTERNS: &[&str] = &[".css", ".scss", ".html", ".yml", ".yaml", ".toml"];

pub const HIGH_TIER_BONUS: u64 = 100;
pub const MEDIUM_TIER_BONUS: u64 = 50;
pub const LOW_TIER_BONUS: u64 = 10;

/// File stem mentioned by a failing test
pub const STEM_MENTION_BONUS: u64 = 200;

/// Path segment mentioned by a failing test, per segment
pub const SEGMENT_MENTION_BONUS: u64 = 50;

/// Failing tests consulted per file, bounding ranking cost
pub const MAX_FAILING_TESTS_CONSULTED: usize = 10;

/// Tunable scoring weights
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelevanceWeights {
    pub high_tier: u64,
    pub medium_tier: u64,
    pub low_tier: u64,
    pub stem_mention: u64,
    pub segment_mention: u64,
    pub max_failing_tests: usize,
}

impl Default for RelevanceWeights {
    fn default() -> Self {
        Self {
            high_tier: HIGH_TIER_BONUS,
            medium_tier: MEDIUM_TIER_BONUS,
            low_tier: LOW_TIER_BONUS,
            stem_mention: STEM_MENTION_BONUS,
            segment_mention: SEGMENT_MENTION_BONUS,
            max_failing_tests: MAX_FAILING_TESTS_CONSULTED,
        }
    }
}

/// Case-folded text of one failing test
#[derive(Debug, Clone)]
struct TestText {
    description: String,
    steps: String,
}

impl TestText {
    fn mentions(&self, needle: &str) -> bool {
        self.description.contains(needle) || self.steps.contains(needle)
    }
}

/// A discovered file with its score
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RankedFile {
    pub file: DiscoveredFile,
    pub score: u64,
}

/// Scores file paths against a set of failing tests.
pub struct RelevanceRanker {
    weights: RelevanceWeights,
    failing: Vec<TestText>,
}

impl RelevanceRanker {
    /// Ranker using the default weights
    pub fn new<'a>(failing_tests: impl IntoIterator<Item = &'a TestCase>) -> Self {
        Self::with_weights(failing_tests, RelevanceWeights::default())
    }

    pub fn with_weights<'a>(
        failing_tests: impl IntoIterator<Item = &'a TestCase>,
        weights: RelevanceWeights,
    ) -> Self {
        let failing = failing_tests
            .into_iter()
            .take(weights.max_failing_tests)
            .map(|t| TestText {
                description: t.description.to_lowercase(),
                steps: t.steps_text().to_lowercase(),
            })
            .collect();
        Self { weights, failing }
    }

    /// Score a slash-separated relative path.
    pub fn score(&self, relative_path: &str) -> u64 {
        let mut score = 0;

        let tiers = [
            (HIGH_RELEVANCE_PATTERNS, self.weights.high_tier),
            (MEDIUM_RELEVANCE_PATTERNS, self.weights.medium_tier),
            (LOW_RELEVANCE_PATTERNS, self.weights.low_tier),
        ];
        for (patterns, bonus) in tiers {
            if patterns.iter().any(|p| relative_path.ends_with(p)) {
                score += bonus;
            }
        }

        if self.failing.is_empty() {
            return score;
        }

        let stem = Path::new(relative_path)
            .file_stem()
            .map(|s| s.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        let lowered = relative_path.to_lowercase();
        let segments: Vec<&str> = lowered.split('/').collect();

        for test in &self.failing {
            if !stem.is_empty() && test.mentions(&stem) {
                score += self.weights.stem_mention;
            }
            for segment in &segments {
                if test.mentions(segment) {
                    score += self.weights.segment_mention;
                }
            }
        }

        score
    }

    /// Score every file and order by score, highest first.
    ///
    /// The sort is stable: equal scores keep discovery order.
    pub fn rank(&self, files: Vec<DiscoveredFile>) -> Vec<RankedFile> {
        let mut ranked: Vec<RankedFile> = files
            .into_iter()
            .map(|file| RankedFile {
                score: self.score(&file.relative_path),
                file,
            })
            .collect();
        ranked.sort_by_key(|r| Reverse(r.score));
        ranked
    }
}
