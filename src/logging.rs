//! Tracing setup shared by the desktop app and the CLI.

use std::fs::{self, OpenOptions};
use std::path::Path;
use std::sync::Mutex;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

/// Filter used when `RUST_LOG` is not set.
pub const DEFAULT_FILTER: &str = "pluto_desktop_lib=info,pluto_desktop=info,julia=info";

pub const LOG_FILE_NAME: &str = "pluto-desktop.log";

/// Install the global subscriber: stderr always, plus an append-only log file
/// in `log_dir` when one is given and can be opened. Safe to call twice; the
/// second call is ignored.
pub fn init(log_dir: Option<&Path>) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| DEFAULT_FILTER.into());

    let file_layer = log_dir.and_then(|dir| {
        fs::create_dir_all(dir).ok()?;
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(dir.join(LOG_FILE_NAME))
            .ok()?;
        Some(fmt::layer().with_writer(Mutex::new(file)).with_ansi(false))
    });

    let installed = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .try_init();
    if installed.is_err() {
        tracing::debug!("Logging already initialised, keeping the existing subscriber");
    }
}
