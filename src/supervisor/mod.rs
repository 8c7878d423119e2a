//! Command supervisor
//!
//! Turns rerun requests into runs of the configured command:
//! - At most one live child; the previous one is killed and fully torn down
//!   before the next starts
//! - Output fenced by run generation, so only the latest run is ever visible
//! - Start failures and non-zero exits are reported inline, never fatal
//!
//! ## Run lifecycle
//!
//! `Idle -> Starting -> Running -> Draining -> Idle`. `Starting` happens on
//! the supervisor thread; `Running` and `Draining` belong to a per-run drain
//! thread that raises the teardown signal when it is done.

mod drain;
mod fence;
mod process;

use std::io::{self, Write};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};

use crossterm::cursor::MoveTo;
use crossterm::queue;
use crossterm::terminal::{Clear, ClearType};
use tracing::{debug, warn};

use crate::config::RunConfig;
use crate::signal::{signal, SignalReceiver, SignalSender};

use drain::Drain;
pub use fence::{Fence, Generation};
pub use process::{CommandLine, LiveProcess};

#[derive(Default)]
struct Live {
    process: Option<LiveProcess>,
    /// Set by the kill switch; no run starts afterwards.
    shutdown: bool,
}

type LiveSlot = Arc<Mutex<Live>>;

fn lock_live(live: &LiveSlot) -> MutexGuard<'_, Live> {
    live.lock().unwrap_or_else(PoisonError::into_inner)
}

pub struct Supervisor<W> {
    config: RunConfig,
    fence: Arc<Fence<W>>,
    live: LiveSlot,
    teardown_tx: SignalSender,
    teardown_rx: SignalReceiver,
}

impl<W: Write + Send + 'static> Supervisor<W> {
    pub fn new(config: RunConfig, out: W) -> Self {
        let (teardown_tx, teardown_rx) = signal();
        Self {
            config,
            fence: Arc::new(Fence::new(out)),
            live: Arc::new(Mutex::new(Live::default())),
            teardown_tx,
            teardown_rx,
        }
    }

    /// Handle that can kill the live child from another thread (Ctrl+C).
    pub fn kill_switch(&self) -> KillSwitch {
        KillSwitch {
            live: Arc::clone(&self.live),
        }
    }

    /// Moves the supervisor onto its own thread.
    pub fn spawn(self, requests: SignalReceiver) -> io::Result<JoinHandle<()>> {
        thread::Builder::new()
            .name("supervisor".to_string())
            .spawn(move || self.run(requests))
    }

    /// Starts one run per consumed request until every requester is gone.
    pub fn run(mut self, requests: SignalReceiver) {
        while requests.wait() {
            self.start_run();
        }
        debug!("rerun requests closed, supervisor exiting");
    }

    /// `Starting`: claims a generation, tears down the previous run and starts
    /// the command.
    pub fn start_run(&mut self) -> Generation {
        let id = self.fence.advance();
        debug!(generation = %id, "starting run");

        let previous = lock_live(&self.live).process.take();
        if let Some(previous) = previous {
            previous.kill();
            self.teardown_rx.wait();
            debug!(generation = %id, pid = previous.id(), "previous run torn down");
        }

        // Held until the child is in the slot, so a kill switch never misses it.
        let mut live = lock_live(&self.live);
        if live.shutdown {
            debug!(generation = %id, "shutting down, run skipped");
            return id;
        }

        let label = self.config.command.to_string();
        let clear = self.config.clear_screen;
        self.fence.if_current(id, |out| {
            if clear {
                queue!(out, Clear(ClearType::All), MoveTo(0, 0))?;
            }
            writeln!(out, "$ {label}")?;
            out.flush()
        });

        let (process, reader) = match self.config.command.spawn() {
            Ok(started) => started,
            Err(err) => {
                drop(live);
                debug!(generation = %id, error = %err, "command failed to start");
                self.report(id, &label, &err);
                return id;
            }
        };
        live.process = Some(process.clone());
        drop(live);

        let drain = Drain {
            id,
            reader,
            process: process.clone(),
            fence: Arc::clone(&self.fence),
            teardown: self.teardown_tx.clone(),
            label: label.clone(),
        };
        let spawned = thread::Builder::new()
            .name(format!("drain-{id}"))
            .spawn(move || drain.run());

        if let Err(err) = spawned {
            // Without a drain thread nothing would ever raise the teardown signal.
            warn!(generation = %id, error = %err, "failed to start output thread");
            lock_live(&self.live).process.take();
            process.kill();
            let _ = process.wait();
            self.report(id, &label, &err);
        }
        id
    }

    fn report(&self, id: Generation, label: &str, err: &dyn std::fmt::Display) {
        self.fence.if_current(id, |out| {
            writeln!(out, "{label}: {err}").and_then(|()| out.flush())
        });
    }
}

/// Kills whatever run is live and stops any further run from starting.
/// Cloned into the interrupt handler.
#[derive(Clone)]
pub struct KillSwitch {
    live: LiveSlot,
}

impl KillSwitch {
    pub fn kill(&self) {
        let mut live = lock_live(&self.live);
        live.shutdown = true;
        if let Some(process) = live.process.as_ref() {
            process.kill();
        }
    }
}
