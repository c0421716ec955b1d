//! Tracing setup: stderr always, plus an optional per-session file.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// File name for a session started at `started`, e.g. `2025-07-21_09-30-00.log`.
pub fn session_log_path(dir: &Path, started: DateTime<Local>) -> PathBuf {
    dir.join(format!("{}.log", started.format("%Y-%m-%d_%H-%M-%S")))
}

fn create_session_log(dir: &Path) -> Result<(PathBuf, File)> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create log directory {}", dir.display()))?;
    let path = session_log_path(dir, Local::now());
    let file = File::create(&path)
        .with_context(|| format!("Failed to create log file {}", path.display()))?;
    Ok((path, file))
}

/// Install the global subscriber. Returns the log file path when one is used.
///
/// The filter comes from `RUST_LOG` and defaults to `info`.
pub fn init(log_dir: Option<&Path>) -> Result<Option<PathBuf>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let (path, file_layer) = match log_dir {
        Some(dir) => {
            let (path, file) = create_session_log(dir)?;
            let layer = fmt::layer().with_ansi(false).with_writer(Mutex::new(file));
            (Some(path), Some(layer))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .init();
    Ok(path)
}
