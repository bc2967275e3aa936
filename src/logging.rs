//! Logging setup
//!
//! Everything logs through `tracing`. The subscriber writes to stderr, or to
//! `<data_dir>/ragbot/ragbot.log` while an interactive session owns the
//! terminal. `RUST_LOG` overrides the default filter.

use chrono::Local;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Mutex;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Where log lines go
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogTarget {
    Stderr,
    File,
}

/// Get the log file path
pub fn log_path() -> PathBuf {
    if let Some(data_dir) = dirs::data_dir() {
        data_dir.join("ragbot").join("ragbot.log")
    } else {
        PathBuf::from("ragbot.log")
    }
}

fn default_filter(verbose: bool) -> &'static str {
    if verbose {
        "ragbot=debug,info"
    } else {
        "ragbot=info,warn"
    }
}

/// Initialize the global subscriber. Calling it twice is a no-op.
pub fn init_logging(verbose: bool, target: LogTarget) -> std::io::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter(verbose).into());

    match target {
        LogTarget::Stderr => {
            let _ = tracing_subscriber::registry()
                .with(filter)
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_target(false)
                        .with_writer(std::io::stderr),
                )
                .try_init();
        }
        LogTarget::File => {
            let path = log_path();
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }

            let mut file = OpenOptions::new().create(true).append(true).open(&path)?;
            writeln!(
                file,
                "\n=== ragbot session started at {} ===\n",
                Local::now().format("%Y-%m-%d %H:%M:%S")
            )?;

            let _ = tracing_subscriber::registry()
                .with(filter)
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_target(false)
                        .with_ansi(false)
                        .with_writer(Mutex::new(file)),
                )
                .try_init();
        }
    }

    Ok(())
}
