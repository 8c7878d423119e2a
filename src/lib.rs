//! rerun - re-run a command whenever a directory changes
//!
//! Two threads cooperate:
//! - the [`watcher`] turns filesystem events into rerun requests, using
//!   one-shot registrations re-armed after every delivery
//! - the [`supervisor`] runs the command, kills the previous run first, and
//!   fences output so only the latest run is ever visible
//!
//! They share a single-slot [`signal`], so a burst of changes becomes one rerun.

pub mod config;
pub mod error;
pub mod events;
pub mod logging;
pub mod signal;
pub mod supervisor;
pub mod watcher;

// Re-exports for convenience
pub use config::{RunConfig, WatchConfig, QUIESCENCE_MS};
pub use error::{RerunError, RerunResult};
pub use events::{Delivery, EventClass, Interest, Notifier, Receipt, SystemNotifier};
pub use signal::{signal, SignalReceiver, SignalSender};
pub use supervisor::{CommandLine, Generation, KillSwitch, Supervisor};
pub use watcher::{is_ignored, WatchSet, Watcher};
