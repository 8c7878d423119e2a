//! Error types for rerun
//!
//! Uses `thiserror` for library errors. Everything here except `Exit` is
//! fatal for the watcher; the supervisor only ever reports errors inline.

use std::io;
use std::os::fd::RawFd;
use std::path::PathBuf;
use std::process::ExitStatus;

use thiserror::Error;

/// Result type alias for rerun operations
pub type RerunResult<T> = Result<T, RerunError>;

/// Main error type for rerun operations
#[derive(Error, Debug)]
pub enum RerunError {
    /// The notification facility answered with something other than what was asked
    #[error("notifier phase error: {0}")]
    Phase(&'static str),

    /// Registering a descriptor failed, or the facility reported an error code for it
    #[error("register descriptor {ident}: {source}")]
    Register { ident: RawFd, source: io::Error },

    /// Waiting for an event failed with something other than an interrupt
    #[error("event wait: {0}")]
    Wait(io::Error),

    /// The notification facility handle could not be created
    #[error("create notifier: {0}")]
    Notifier(io::Error),

    /// A delivered event named a descriptor that was never registered
    #[error("event for unknown descriptor {0}")]
    UnknownDescriptor(RawFd),

    /// The watched directory could not be opened
    #[error("open {}: {source}", path.display())]
    OpenDir { path: PathBuf, source: io::Error },

    /// The watched directory could not be enumerated
    #[error("readdir {}: {source}", path.display())]
    ReadDir { path: PathBuf, source: io::Error },

    /// The command ran but did not exit successfully
    #[error("{0}")]
    Exit(ExitStatus),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl RerunError {
    /// Converts a `nix` errno into a registration failure for `ident`.
    pub fn register(ident: RawFd, errno: nix::errno::Errno) -> Self {
        RerunError::Register {
            ident,
            source: io::Error::from(errno),
        }
    }
}
