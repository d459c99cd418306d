//! Harness Module
//!
//! On-disk state shared by every coding cycle:
//! - Test registry (`feature_list.json`) loading, limiting, and focus selection
//! - Settings (`harness.conf` + environment)
//! - Pause/stop sentinel files
//! - Git history passthrough

pub mod control;
pub mod error;
pub mod git_history;
pub mod settings;
pub mod test_registry;
pub mod types;

pub use control::{ControlFlags, SentinelFiles};
pub use error::{HarnessError, HarnessResult};
pub use git_history::{GitHistory, HistorySource};
pub use settings::{HarnessSettings, SettingValue, SettingsMap};
pub use test_registry::{adaptive_limit, load_registry, next_failing_test, RegistryDocument};
pub use types::*;
