//! PhotoCopy - periodic image backup daemon
//!
//! Main entry point.
//!
//! # Overview
//!
//! The binary initializes:
//! - Logging infrastructure (file rotation + console output)
//! - Configuration loading ([`ConfigManager`])
//! - Tokio async runtime (copy tasks, external `rsync` processes, timer)
//! - The [`Scheduler`], which runs one [`PassRunner`] pass at startup (if
//!   configured) and then on every interval until Ctrl-C
//!
//! # Execution Flow
//!
//! 1. Initialize logging → logs/photocopy.<date>
//! 2. Load `photocopy.yaml` from `PhotoCopy Data/` (or `$PHOTOCOPY_CONFIG_DIR`),
//!    then raise the log level if `debug_mode` is set
//! 3. Create the tokio runtime
//! 4. Run the scheduler until Ctrl-C; a pass in progress is allowed to finish
//! 5. Log the metrics summary and exit

use anyhow::{Context, Result};
use camino::Utf8PathBuf;
use photocopy::logging::{self, LogSettings};
use photocopy::scheduler::shutdown_on;
use photocopy::services::copy_primitive_for;
use photocopy::{APP_NAME, ConfigManager, Metrics, PassRunner, Scheduler, VERSION};
use std::sync::Arc;
use tokio::sync::watch;

/// Default configuration directory, relative to the working directory
const DEFAULT_CONFIG_DIR: &str = "PhotoCopy Data";

fn main() -> Result<()> {
    let config_dir = std::env::var("PHOTOCOPY_CONFIG_DIR")
        .map(Utf8PathBuf::from)
        .unwrap_or_else(|_| Utf8PathBuf::from(DEFAULT_CONFIG_DIR));

    let config_manager = ConfigManager::new(&config_dir)?;

    // Installed before the config is read so warnings from loading it are kept
    let log_handle = logging::setup_logging_with_console(&LogSettings::default())?;

    tracing::info!("{} v{}: PhotoCopy process started", APP_NAME, VERSION);

    let config = match config_manager.load_config() {
        Ok(config) => Arc::new(config),
        Err(e) => {
            tracing::error!("Configuration error: {:#}", e);
            return Err(e);
        }
    };
    if config.debug_mode {
        log_handle.set_debug(true)?;
    }

    tracing::info!(
        "Backing up {} -> {} ({} extensions, {} excluded folders, batches of {}, {:?} copy)",
        config.search_dir,
        config.backup_dir,
        config.allowed_extensions.len(),
        config.disallowed_segments.len(),
        config.batch_size,
        config.copy_method
    );

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name("photocopy-worker")
        .build()
        .context("Failed to create tokio runtime")?;

    let metrics = Arc::new(Metrics::new());
    let runner = PassRunner::new(
        Arc::clone(&config),
        copy_primitive_for(config.copy_method),
        Arc::clone(&metrics),
    );
    let scheduler = Scheduler::new(Arc::new(runner), config.interval(), config.run_on_startup)
        .with_metrics(Arc::clone(&metrics));

    runtime.block_on(async {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        tokio::spawn(shutdown_on(tokio::signal::ctrl_c(), shutdown_tx));

        scheduler.run(shutdown_rx).await
    });

    metrics.log_summary();
    tracing::info!("PhotoCopy shutdown complete");
    Ok(())
}
