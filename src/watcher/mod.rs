//! Directory watcher
//!
//! Turns filesystem activity in one directory into coalesced rerun requests:
//! - Tracks every non-dot entry, including ones created after startup
//! - One-shot registrations, re-armed after every delivery
//! - Quiescence delay after a relevant event to absorb bursts
//!
//! Every error returned from here is fatal: the watch mechanism can no longer
//! be trusted, and carrying on would silently stop watching.

mod watch_set;

use std::ffi::{OsStr, OsString};
use std::fs::File;
use std::io;
use std::os::fd::{AsRawFd, RawFd};
use std::os::unix::ffi::OsStrExt;
use std::path::PathBuf;
use std::thread;
use std::time::Duration;

use nix::dir::Dir;
use nix::errno::Errno;
use nix::fcntl::{openat, OFlag};
use nix::sys::stat::Mode;
use tracing::{debug, trace};

use crate::config::WatchConfig;
use crate::error::{RerunError, RerunResult};
use crate::events::{arm, Delivery, EventClass, Notifier};
use crate::signal::SignalSender;

pub use watch_set::{is_ignored, WatchSet};

pub struct Watcher<N> {
    notifier: N,
    dir: File,
    dir_path: PathBuf,
    set: WatchSet,
    requests: SignalSender,
    quiescence: Duration,
    rescan: bool,
}

impl<N: Notifier> Watcher<N> {
    /// Opens and arms the watched directory. The first [`step`](Self::step)
    /// scans it.
    pub fn new(mut notifier: N, config: &WatchConfig, requests: SignalSender) -> RerunResult<Self> {
        let dir = File::open(&config.dir).map_err(|source| RerunError::OpenDir {
            path: config.dir.clone(),
            source,
        })?;
        arm(&mut notifier, &dir)?;
        debug!(dir = %config.dir.display(), "watching");

        Ok(Self {
            notifier,
            dir,
            dir_path: config.dir.clone(),
            set: WatchSet::new(),
            requests,
            quiescence: config.quiescence,
            rescan: true,
        })
    }

    /// Runs until a fatal error.
    pub fn run(&mut self) -> RerunResult<()> {
        loop {
            self.step()?;
        }
    }

    /// Handles exactly one delivery, scanning first if a rescan is due.
    pub fn step(&mut self) -> RerunResult<()> {
        if self.rescan {
            self.scan()?;
        }

        let delivery = self.notifier.wait()?;
        self.handle(delivery)
    }

    /// Tracks and arms every entry not seen before. Returns how many were added.
    ///
    /// Enumeration and opens go through the directory handle, so the watch
    /// survives the directory being renamed or moved.
    pub fn scan(&mut self) -> RerunResult<usize> {
        let read_dir_err = |errno: Errno| RerunError::ReadDir {
            path: self.dir_path.clone(),
            source: io::Error::from(errno),
        };
        // A fresh open of "." starts at the first entry.
        let mut entries = Dir::openat(
            &self.dir,
            ".",
            OFlag::O_RDONLY | OFlag::O_DIRECTORY | OFlag::O_CLOEXEC,
            Mode::empty(),
        )
        .map_err(read_dir_err)?;
        let mut added = 0;

        for entry in entries.iter() {
            let entry = entry.map_err(read_dir_err)?;
            let name = OsStr::from_bytes(entry.file_name().to_bytes());
            // Also skips "." and "..".
            if is_ignored(name) || self.set.contains(name) {
                continue;
            }

            // Retried on the next rescan.
            let file = match open_entry(&self.dir, name) {
                Ok(file) => file,
                Err(errno) => {
                    debug!(name = ?name, error = %errno, "skipping entry");
                    continue;
                }
            };

            arm(&mut self.notifier, &file)?;
            let ident = self.set.insert(name.to_os_string(), file);
            trace!(ident, "tracking entry");
            added += 1;
        }

        self.rescan = false;
        debug!(added, tracked = self.set.len(), "scan complete");
        Ok(added)
    }

    fn handle(&mut self, delivery: Delivery) -> RerunResult<()> {
        if delivery.class != EventClass::Vnode {
            return Err(RerunError::Phase("delivery is not a vnode event"));
        }
        let ident = delivery.ident;
        let is_dir = ident == self.dir.as_raw_fd();

        let name: Option<OsString> = match delivery.entry {
            Some(entry) => Some(entry),
            None if is_dir => None,
            None => Some(
                self.set
                    .name_of(ident)
                    .ok_or(RerunError::UnknownDescriptor(ident))?
                    .to_os_string(),
            ),
        };

        if name.as_deref().map_or(true, |name| !is_ignored(name)) {
            if self.requests.notify() {
                debug!(ident, name = ?name, "change detected, rerun requested");
            } else {
                trace!(ident, name = ?name, "change coalesced into pending rerun");
            }
            thread::sleep(self.quiescence);
        }

        self.rescan = is_dir;
        self.rearm(ident)
    }

    fn rearm(&mut self, ident: RawFd) -> RerunResult<()> {
        let file = if ident == self.dir.as_raw_fd() {
            &self.dir
        } else {
            self.set
                .file_of(ident)
                .ok_or(RerunError::UnknownDescriptor(ident))?
        };
        arm(&mut self.notifier, file)
    }

    #[cfg(test)]
    pub(crate) fn watch_set(&self) -> &WatchSet {
        &self.set
    }

    /// Descriptor of the watched directory itself.
    #[cfg(test)]
    pub(crate) fn dir_ident(&self) -> RawFd {
        self.dir.as_raw_fd()
    }

    #[cfg(test)]
    pub(crate) fn rescan_pending(&self) -> bool {
        self.rescan
    }
}

/// Opens an entry of `dir` read-only without blocking, so a FIFO cannot stall the loop.
fn open_entry(dir: &File, name: &OsStr) -> nix::Result<File> {
    let fd = openat(
        dir,
        name,
        OFlag::O_RDONLY | OFlag::O_NONBLOCK | OFlag::O_CLOEXEC,
        Mode::empty(),
    )?;
    Ok(File::from(fd))
}
