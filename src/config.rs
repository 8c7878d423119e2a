//! Runtime configuration
//!
//! There is no configuration file. Both structs are assembled once from the
//! command line and never change afterwards.

use std::path::PathBuf;
use std::time::Duration;

use crate::supervisor::CommandLine;

/// Quiescence delay in milliseconds
pub const QUIESCENCE_MS: u64 = 100;

/// Watcher settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchConfig {
    /// Directory whose entries are watched (not recursive)
    pub dir: PathBuf,
    /// Pause after a relevant event, absorbing the rest of a burst
    pub quiescence: Duration,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("."),
            quiescence: Duration::from_millis(QUIESCENCE_MS),
        }
    }
}

/// Supervisor settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunConfig {
    /// Command started on every run
    pub command: CommandLine,
    /// Clear the screen before each run
    pub clear_screen: bool,
}
