//! Context Packer: builds the per-cycle context bundle
//!
//! One pass reads the registry, sizes the test list, ranks every project file
//! against the failing tests, and packs the top files (byte-truncated) with
//! the spec, progress notes, and recent history.

use crate::context_packer::file_walker::FileWalker;
use crate::context_packer::relevance::{RelevanceRanker, RelevanceWeights};
use crate::harness::error::HarnessResult;
use crate::harness::git_history::{GitHistory, HistorySource};
use crate::harness::settings::HarnessSettings;
use crate::harness::test_registry::{adaptive_limit, load_registry, RegistryDocument};
use crate::harness::types::TestCase;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use tracing::{debug, info, warn};

/// Packaged grounding artifacts for one cycle
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ContextBundle {
    /// Application specification text
    #[serde(rename = "app_spec")]
    pub specification: String,
    /// Registry limited to the adaptive test count
    #[serde(rename = "feature_list")]
    pub test_registry: Option<RegistryDocument>,
    /// Progress notes left by previous cycles
    pub progress: String,
    /// Included files, most relevant first
    #[serde(rename = "repo_tree")]
    pub file_paths: Vec<String>,
    /// Truncated contents of readable included files
    #[serde(rename = "files")]
    pub file_contents: BTreeMap<String, String>,
    /// `git log --oneline` lines, newest first
    #[serde(rename = "git_log")]
    pub history: String,
}

/// Files selected for a bundle
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FileSelection {
    pub paths: Vec<String>,
    pub contents: BTreeMap<String, String>,
    /// Files found before applying `max_files`
    pub discovered: usize,
}

/// Builds context bundles for a project root.
pub struct ContextAssembler {
    settings: HarnessSettings,
    file_walker: FileWalker,
    history: Box<dyn HistorySource>,
    weights: RelevanceWeights,
}

impl ContextAssembler {
    pub fn new(root: impl AsRef<Path>, settings: HarnessSettings) -> Self {
        let root = root.as_ref();
        let file_walker = FileWalker::new(root)
            .with_ignore_dirs(settings.ignore_dirs.iter().cloned())
            .respect_gitignore(settings.respect_gitignore);
        Self {
            history: Box::new(GitHistory::new(root)),
            file_walker,
            settings,
            weights: RelevanceWeights::default(),
        }
    }

    /// Replace the history source
    pub fn with_history(mut self, history: impl HistorySource + 'static) -> Self {
        self.history = Box::new(history);
        self
    }

    /// Replace the relevance weights
    pub fn with_weights(mut self, weights: RelevanceWeights) -> Self {
        self.weights = weights;
        self
    }

    pub fn settings(&self) -> &HarnessSettings {
        &self.settings
    }

    /// Test cap for this pass, from the full registry
    pub fn test_limit(&self, tests: &[TestCase]) -> usize {
        if self.settings.use_smart_test_limit {
            adaptive_limit(tests, self.settings.test_case_limit)
        } else {
            self.settings.test_case_limit
        }
    }

    /// Assemble the bundle.
    ///
    /// Missing artifacts become empty fields; only an unlistable project root
    /// is an error.
    pub fn assemble(&self) -> HarnessResult<ContextBundle> {
        let registry_path = &self.settings.feature_list_path;
        let full = load_registry(registry_path, None);

        if self.settings.validate_feature_list {
            if let Some(doc) = &full {
                for issue in doc.validate() {
                    warn!(path = %registry_path.display(), "Test registry: {}", issue);
                }
            }
        }

        let all_tests: &[TestCase] = full.as_ref().map(|d| d.tests()).unwrap_or(&[]);
        let failing: Vec<&TestCase> = all_tests.iter().filter(|t| !t.passes).collect();
        let limit = self.test_limit(all_tests);

        let selection = self.collect_files(&failing)?;

        let test_registry = load_registry(registry_path, Some(limit));

        info!(
            discovered = selection.discovered,
            included = selection.paths.len(),
            failing = failing.len(),
            test_limit = limit,
            "Assembled context bundle"
        );

        Ok(ContextBundle {
            specification: read_optional_text(&self.settings.app_spec_path),
            test_registry,
            progress: read_optional_text(&self.settings.progress_path),
            file_paths: selection.paths,
            file_contents: selection.contents,
            history: self.history_text(),
        })
    }

    /// Walk, rank, and read the most relevant files.
    pub fn collect_files(&self, failing: &[&TestCase]) -> HarnessResult<FileSelection> {
        let discovered = self.file_walker.files()?;
        let total = discovered.len();

        let ranker = RelevanceRanker::with_weights(failing.iter().copied(), self.weights.clone());
        let ranked = ranker.rank(discovered);

        let mut selection = FileSelection {
            discovered: total,
            ..FileSelection::default()
        };
        for entry in ranked.into_iter().take(self.settings.max_files) {
            let relative = entry.file.relative_path;
            match read_truncated(&entry.file.path, self.settings.max_file_bytes) {
                Ok(text) => {
                    selection.contents.insert(relative.clone(), text);
                }
                Err(e) => debug!(path = %relative, error = %e, "Skipping unreadable file"),
            }
            selection.paths.push(relative);
        }

        Ok(selection)
    }

    fn history_text(&self) -> String {
        match self.history.recent_lines(self.settings.max_git_log_lines) {
            Ok(lines) => lines.join("\n"),
            Err(e) => {
                debug!(error = %e, "No history for context bundle");
                String::new()
            }
        }
    }
}

/// Marker appended to a truncated file
pub fn truncation_marker(omitted_bytes: u64) -> String {
    format!("\n\n[TRUNCATED: {} bytes]", omitted_bytes)
}

/// Read at most `max_bytes` of a file as lossy UTF-8.
///
/// Larger files get a [`truncation_marker`] with the omitted byte count. The
/// text before the marker never exceeds `max_bytes`.
pub fn read_truncated(path: &Path, max_bytes: usize) -> std::io::Result<String> {
    let file = File::open(path)?;
    let len = file.metadata()?.len();

    let mut raw = Vec::with_capacity(len.min(max_bytes as u64) as usize);
    file.take(max_bytes as u64).read_to_end(&mut raw)?;

    let mut text = String::from_utf8_lossy(&raw).into_owned();
    if text.len() > max_bytes {
        // Replacement characters can outgrow the raw bytes
        let mut cut = max_bytes;
        while !text.is_char_boundary(cut) {
            cut -= 1;
        }
        text.truncate(cut);
    }
    if len > max_bytes as u64 {
        text.push_str(&truncation_marker(len - max_bytes as u64));
    }
    Ok(text)
}

fn read_optional_text(path: &Path) -> String {
    match std::fs::read(path) {
        Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
        Err(e) => {
            debug!(path = %path.display(), error = %e, "Optional artifact unavailable");
            String::new()
        }
    }
}
