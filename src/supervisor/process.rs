//! Child process lifecycle
//!
//! Each run gets its own process group, so a kill reaches whatever the command
//! spawned and nothing keeps the output pipe open afterwards.

use std::fmt;
use std::io::{self, PipeReader};
use std::os::unix::process::CommandExt;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::Duration;

use nix::errno::Errno;
use nix::sys::signal::{killpg, Signal};
use nix::unistd::Pid;
use tracing::{debug, warn};

/// Poll interval while reaping a child whose output already closed
const REAP_POLL: Duration = Duration::from_millis(10);

/// The configured command and its arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandLine {
    words: Vec<String>,
}

impl CommandLine {
    /// Returns `None` for an empty word list.
    pub fn new(words: Vec<String>) -> Option<Self> {
        if words.is_empty() {
            return None;
        }
        Some(Self { words })
    }

    pub fn program(&self) -> &str {
        &self.words[0]
    }

    pub fn args(&self) -> &[String] {
        &self.words[1..]
    }

    /// Starts the command with stdout and stderr merged into one pipe.
    ///
    /// Stdin is `/dev/null`. The write end of the pipe only lives in the child,
    /// so the reader sees EOF once the child (and its group) is gone.
    pub fn spawn(&self) -> io::Result<(LiveProcess, PipeReader)> {
        let (reader, writer) = io::pipe()?;
        let child = {
            let mut command = Command::new(self.program());
            command
                .args(self.args())
                .stdin(Stdio::null())
                .stdout(writer.try_clone()?)
                .stderr(writer)
                .process_group(0);
            command.spawn()?
        };
        Ok((LiveProcess::new(child), reader))
    }
}

impl fmt::Display for CommandLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.words.join(" "))
    }
}

struct ChildSlot {
    child: Child,
    reaped: bool,
}

/// Handle to a running child, shared between the supervisor (which kills it)
/// and the draining thread (which reaps it).
#[derive(Clone)]
pub struct LiveProcess {
    slot: Arc<Mutex<ChildSlot>>,
    pgid: Pid,
}

impl LiveProcess {
    fn new(child: Child) -> Self {
        let pgid = Pid::from_raw(child.id() as i32);
        Self {
            slot: Arc::new(Mutex::new(ChildSlot {
                child,
                reaped: false,
            })),
            pgid,
        }
    }

    fn lock(&self) -> MutexGuard<'_, ChildSlot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn id(&self) -> u32 {
        self.pgid.as_raw() as u32
    }

    /// Sends `SIGKILL` to the child's process group.
    ///
    /// Reaping happens under the same lock, so an unreaped child still pins its
    /// pid and group id and the signal cannot reach an unrelated process.
    pub fn kill(&self) {
        let slot = self.lock();
        if slot.reaped {
            return;
        }
        match killpg(self.pgid, Signal::SIGKILL) {
            Ok(()) => debug!(pgid = %self.pgid, "killed process group"),
            Err(Errno::ESRCH) => {}
            Err(errno) => warn!(pgid = %self.pgid, error = %errno, "failed to kill process group"),
        }
    }

    /// Waits for the child to exit and reaps it.
    pub fn wait(&self) -> io::Result<ExitStatus> {
        loop {
            {
                let mut slot = self.lock();
                if let Some(status) = slot.child.try_wait()? {
                    slot.reaped = true;
                    return Ok(status);
                }
            }
            thread::sleep(REAP_POLL);
        }
    }
}
