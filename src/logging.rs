use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Mutex;

use anyhow::Context as _;
use tracing_subscriber::{
    Layer,
    filter::{EnvFilter, LevelFilter},
    layer::SubscriberExt as _,
    registry,
};

// `EnvFilter` doesn't impl `Clone`
fn filter() -> EnvFilter {
    EnvFilter::builder().with_default_directive(LevelFilter::INFO.into()).from_env_lossy()
}

/// Human readable logs on stderr, plus newline delimited JSON appended to `log_file` if given.
pub fn init(log_file: Option<&Path>) -> anyhow::Result<()> {
    let stderr_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr).with_filter(filter());
    let file_layer = match log_file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("failed to open log file {}", path.display()))?;
            Some(tracing_subscriber::fmt::layer().json().with_writer(Mutex::new(file)).with_filter(filter()))
        }
        None => None,
    };
    tracing::subscriber::set_global_default(registry().with(stderr_layer).with(file_layer))
        .context("failed to set global subscriber")?;
    tracing::info!(message_id = "Xb3vRf6y", log_file = ?log_file, "logging initialized");
    std::panic::set_hook(Box::new(|panic_info| {
        tracing::error!(message_id = "W6fhvnSf", "{panic_info}\n{:#}", std::backtrace::Backtrace::force_capture());
    }));
    tracing::info!(message_id = "k0PzHs4e", "panic logging hook set");
    Ok(())
}
