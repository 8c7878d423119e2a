//! rerun - re-run a command whenever a directory changes
//!
//! Usage: rerun [OPTIONS] <COMMAND>...
//!
//! Watches the entries of one directory (dotfiles ignored) and re-runs the
//! command after every change, killing the previous run first.

mod cli;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{debug, error};

use rerun::{signal, Supervisor, SystemNotifier, Watcher};

/// Exit status after Ctrl+C, as a shell would report SIGINT.
const INTERRUPTED: i32 = 130;

fn main() -> Result<()> {
    let cli = cli::Cli::parse();
    rerun::logging::init(cli.verbose);

    let (watch, run) = cli.into_configs()?;
    debug!(command = %run.command, dir = %watch.dir.display(), "starting");

    let (requests_tx, requests_rx) = signal();
    let supervisor = Supervisor::new(run, std::io::stdout());
    let kill_switch = supervisor.kill_switch();

    let handler_switch = kill_switch.clone();
    ctrlc::set_handler(move || {
        handler_switch.kill();
        std::process::exit(INTERRUPTED);
    })
    .context("failed to install Ctrl+C handler")?;

    // The first run happens without waiting for a change.
    requests_tx.notify();
    supervisor
        .spawn(requests_rx)
        .context("failed to start supervisor thread")?;

    let result = SystemNotifier::new()
        .and_then(|notifier| Watcher::new(notifier, &watch, requests_tx))
        .and_then(|mut watcher| watcher.run());

    if let Err(err) = result {
        error!(error = %err, "watcher stopped");
        kill_switch.kill();
        return Err(err).with_context(|| format!("watching {}", watch.dir.display()));
    }
    Ok(())
}
