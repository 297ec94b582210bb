#![forbid(unsafe_code)]

use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::Mutex;

use anyhow::Context as _;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt as _;
use tracing_subscriber::util::SubscriberInitExt as _;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogTarget {
    Stderr,
    /// Used while the terminal UI owns stdout/stderr.
    File(PathBuf),
    Off,
}

/// `RUST_LOG` wins; otherwise the configured level, raised for this crate by `-v`.
#[must_use]
pub fn filter_directive(level: &str, verbose: u8) -> String {
    match verbose {
        0 => level.to_owned(),
        1 => format!("{level},tasklist=debug"),
        _ => format!("{level},tasklist=trace"),
    }
}

pub fn init(level: &str, verbose: u8, target: LogTarget) -> anyhow::Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(f) => f,
        Err(_) => EnvFilter::try_new(filter_directive(level, verbose))
            .with_context(|| format!("invalid log level '{level}'"))?,
    };

    match target {
        LogTarget::Off => Ok(()),
        LogTarget::Stderr => tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(false),
            )
            .try_init()
            .context("failed to install logger"),
        LogTarget::File(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .with_context(|| format!("failed to open log file {}", path.display()))?;
            tracing_subscriber::registry()
                .with(filter)
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_writer(Mutex::new(file))
                        .with_ansi(false),
                )
                .try_init()
                .context("failed to install logger")
        }
    }
}
