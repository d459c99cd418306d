//! Pause/stop signaling between cycles
//!
//! The monitoring surface requests a pause or stop by touching sentinel files
//! in the project root. The cycle driver checks them before each cycle.

use std::path::{Path, PathBuf};

/// Sentinel file requesting a pause
pub const PAUSE_FLAG: &str = ".harness_pause";

/// Sentinel file requesting a stop
pub const STOP_FLAG: &str = ".harness_stop";

/// External control state queried by the cycle driver
pub trait ControlFlags {
    fn is_paused(&self) -> bool;
    fn is_stop_requested(&self) -> bool;
}

/// Control flags backed by sentinel files
#[derive(Debug, Clone)]
pub struct SentinelFiles {
    pause: PathBuf,
    stop: PathBuf,
}

impl SentinelFiles {
    /// Sentinels in the given directory
    pub fn in_dir(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        Self {
            pause: dir.join(PAUSE_FLAG),
            stop: dir.join(STOP_FLAG),
        }
    }

    pub fn pause_path(&self) -> &Path {
        &self.pause
    }

    pub fn stop_path(&self) -> &Path {
        &self.stop
    }
}

impl ControlFlags for SentinelFiles {
    fn is_paused(&self) -> bool {
        self.pause.exists()
    }

    fn is_stop_requested(&self) -> bool {
        self.stop.exists()
    }
}
