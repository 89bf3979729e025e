use std::fs::{self, OpenOptions};
use std::io;
use std::path::Path;
use std::sync::Mutex;

use anyhow::{Context, Result};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config_file::LogSettings;

/// Sends every event to stderr and appends it to the run log file.
///
/// `RUST_LOG` wins over the configured level. An unwritable log file leaves
/// stderr logging in place and is reported once. The root run opens the file
/// world-writable so the companion, running as the console user, appends to
/// the same log.
pub(crate) fn init_logging(settings: &LogSettings) {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&settings.level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let (file_layer, file_error) = match open_log_file(settings) {
        Ok(file) => (
            Some(
                fmt::layer()
                    .with_writer(Mutex::new(file))
                    .with_ansi(false)
                    .with_target(false),
            ),
            None,
        ),
        Err(err) => (None, Some(err)),
    };

    let initialized = tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_writer(io::stderr).with_target(false))
        .with(file_layer)
        .try_init();

    if initialized.is_err() {
        return;
    }
    if let Some(err) = file_error {
        tracing::warn!("file logging disabled: {err:#}");
    }
}

pub(crate) fn open_log_file(settings: &LogSettings) -> Result<fs::File> {
    if let Some(parent) = settings.file.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&settings.file)
        .with_context(|| format!("failed to open log file: {}", settings.file.display()))?;
    if settings.shared {
        share_with_companion(&file, &settings.file)?;
    }
    Ok(file)
}

#[cfg(unix)]
fn share_with_companion(file: &fs::File, path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    file.set_permissions(fs::Permissions::from_mode(0o666))
        .with_context(|| format!("failed to share log file: {}", path.display()))
}

#[cfg(not(unix))]
fn share_with_companion(_file: &fs::File, _path: &Path) -> Result<()> {
    Ok(())
}
