use std::path::PathBuf;
use std::time::Duration;

use anyhow::{anyhow, Result};
use clap::Parser;
use rerun::{CommandLine, RunConfig, WatchConfig, QUIESCENCE_MS};

/// rerun - run a command again every time the watched directory changes
#[derive(Parser, Debug)]
#[command(name = "rerun")]
#[command(author, version, about, long_about = None)]
#[command(after_help = "Dotfiles are ignored. Only the latest run's output is shown.")]
pub struct Cli {
    /// Directory to watch (entries only, not recursive)
    #[arg(short = 'C', long, default_value = ".")]
    pub dir: PathBuf,

    /// Quiescence delay after a change, in milliseconds
    #[arg(short, long, value_name = "MS", default_value_t = QUIESCENCE_MS)]
    pub delay: u64,

    /// Don't clear the screen before each run
    #[arg(long)]
    pub no_clear: bool,

    /// Verbosity level (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Command to run, with its arguments
    #[arg(
        required = true,
        trailing_var_arg = true,
        allow_hyphen_values = true,
        value_name = "COMMAND"
    )]
    pub command: Vec<String>,
}

impl Cli {
    pub fn into_configs(self) -> Result<(WatchConfig, RunConfig)> {
        let watch = WatchConfig {
            dir: self.dir,
            quiescence: Duration::from_millis(self.delay),
        };
        let command = CommandLine::new(self.command).ok_or_else(|| anyhow!("missing command"))?;
        let run = RunConfig {
            command,
            clear_screen: !self.no_clear,
        };
        Ok((watch, run))
    }
}
