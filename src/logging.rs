//! Diagnostic logging
//!
//! Diagnostics go to stderr so stdout carries nothing but the run transcript.
//! Quiet (`warn`) by default; `-v` enables `debug`, `-vv` enables `trace`.
//! `RUST_LOG` takes precedence over the flag:
//! ```bash
//! RUST_LOG=rerun::watcher=trace rerun cargo test
//! ```

use std::sync::Once;

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

static INIT: Once = Once::new();

/// Filter directive for a `-v` count.
pub fn level_for(verbose: u8) -> &'static str {
    match verbose {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    }
}

/// Initializes logging. Only the first call takes effect.
pub fn init(verbose: u8) {
    INIT.call_once(|| {
        let filter = if std::env::var("RUST_LOG").is_ok() {
            EnvFilter::from_default_env()
        } else {
            EnvFilter::new(level_for(verbose))
        };

        let fmt_layer = tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_thread_names(true)
            .with_level(true)
            .with_filter(filter);

        tracing_subscriber::registry().with(fmt_layer).init();
    });
}
