use std::path::Path;
use std::sync::Mutex;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize logging
///
/// - Console (stderr) logging is always on; `RUST_LOG` overrides the `info` default
/// - File logging in addition when `log_file` is Some
pub fn init_logging(log_file: Option<&Path>) -> anyhow::Result<()> {
    match log_file {
        Some(path) => init_dual_logging(path),
        None => init_console_logging(),
    }
}

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into())
}

/// Console-only logging (stderr)
fn init_console_logging() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(env_filter())
        .with(fmt::layer().with_writer(std::io::stderr))
        .try_init()?;
    Ok(())
}

/// Dual logging: both console (stderr) and file
fn init_dual_logging(path: &Path) -> anyhow::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)?;

    tracing_subscriber::registry()
        .with(env_filter())
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(fmt::layer().with_writer(Mutex::new(file)).with_ansi(false))
        .try_init()?;
    Ok(())
}
