use anyhow::{Context, Result};
use camino::Utf8Path;
use std::fs;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling;
use tracing_subscriber::{EnvFilter, Registry, layer::SubscriberExt, reload, util::SubscriberInitExt};

/// Where and how verbosely the daemon logs
#[derive(Debug, Clone)]
pub struct LogSettings<'a> {
    /// Directory for the rotating log files (e.g., "logs")
    pub dir: &'a Utf8Path,
    /// File name prefix (e.g., "photocopy")
    pub prefix: &'a str,
    /// `debug` level instead of `info`; per-file "Located image" lines are debug
    pub debug: bool,
    /// Mirror everything to stdout with colors
    pub console: bool,
}

impl Default for LogSettings<'_> {
    fn default() -> Self {
        Self {
            dir: Utf8Path::new("logs"),
            prefix: "photocopy",
            debug: false,
            console: true,
        }
    }
}

fn level_filter(debug: bool) -> EnvFilter {
    if debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    }
}

/// Keeps the file writer flushing and allows changing the level later.
///
/// Logging is installed before the configuration is read so that messages from
/// loading it are recorded; `debug_mode` is applied afterwards with [`set_debug`](Self::set_debug).
pub struct LogHandle {
    _guard: WorkerGuard,
    level: reload::Handle<EnvFilter, Registry>,
}

impl LogHandle {
    /// Switch between `debug` and `info` output
    pub fn set_debug(&self, debug: bool) -> Result<()> {
        set_level(&self.level, debug)
    }
}

fn set_level(level: &reload::Handle<EnvFilter, Registry>, debug: bool) -> Result<()> {
    level
        .reload(level_filter(debug))
        .context("Failed to change the log level")
}

fn ensure_log_dir(dir: &Utf8Path) -> Result<()> {
    if !dir.exists() {
        fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create log directory: {}", dir))?;
    }
    Ok(())
}

/// Setup logging to a daily rotating file only.
///
/// # Arguments
/// * `log_dir` - Directory for the log files, created if missing
/// * `log_prefix` - File name prefix
/// * `debug_mode` - Start at `debug` instead of `info`
///
/// # Returns
/// A handle that must be held for the duration of the program to keep logging active
pub fn setup_logging(log_dir: &Utf8Path, log_prefix: &str, debug_mode: bool) -> Result<LogHandle> {
    setup_logging_with_console(&LogSettings {
        dir: log_dir,
        prefix: log_prefix,
        debug: debug_mode,
        console: false,
    })
}

/// Setup logging with a rotating file appender and optional console output.
///
/// Fails instead of panicking when a global subscriber is already installed.
///
/// # Returns
/// A handle that must be held for the duration of the program to keep logging active
pub fn setup_logging_with_console(settings: &LogSettings<'_>) -> Result<LogHandle> {
    ensure_log_dir(settings.dir)?;

    let file_appender = rolling::daily(settings.dir, settings.prefix);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(non_blocking)
        .with_ansi(false) // No ANSI codes in log files
        .with_target(true)
        .with_thread_ids(true);

    // `Option<Layer>` is itself a layer, so the console can be switched off without a second branch
    let console_layer = settings.console.then(|| {
        tracing_subscriber::fmt::layer()
            .with_ansi(true)
            .with_target(false)
    });

    let (level_layer, level) = reload::Layer::new(level_filter(settings.debug));

    tracing_subscriber::registry()
        .with(level_layer)
        .with(file_layer)
        .with(console_layer)
        .try_init()
        .context("A global tracing subscriber is already installed")?;

    tracing::info!(
        "Logging initialized: dir={}, prefix={}, debug={}, console={}",
        settings.dir,
        settings.prefix,
        settings.debug,
        settings.console
    );

    Ok(LogHandle {
        _guard: guard,
        level,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use camino::Utf8PathBuf;
    use tempfile::TempDir;

    #[test]
    fn test_log_directory_created() {
        let temp_dir = TempDir::new().unwrap();
        let log_dir = Utf8PathBuf::try_from(temp_dir.path().join("nested/logs")).unwrap();

        // Only the directory part, to stay clear of the process-wide subscriber
        ensure_log_dir(&log_dir).unwrap();
        assert!(log_dir.is_dir());
    }

    #[test]
    #[allow(unused_variables)]
    fn test_setup_logging() {
        let temp_dir = TempDir::new().unwrap();
        let log_dir = Utf8PathBuf::try_from(temp_dir.path().to_path_buf()).unwrap();

        // May fail if another test already installed a subscriber, the directory must exist either way
        let result = setup_logging(&log_dir, "test", false);
        assert!(log_dir.exists());
    }

    #[test]
    fn test_level_can_change_after_setup() {
        let (layer, level) = reload::Layer::new(level_filter(false));
        let _subscriber = tracing_subscriber::registry().with(layer);

        set_level(&level, true).unwrap();
        assert_eq!(level.with_current(|f| f.to_string()).unwrap(), "debug");

        set_level(&level, false).unwrap();
        assert_eq!(level.with_current(|f| f.to_string()).unwrap(), "info");
    }

    #[test]
    fn test_default_settings() {
        let settings = LogSettings::default();
        assert_eq!(settings.dir, Utf8Path::new("logs"));
        assert_eq!(settings.prefix, "photocopy");
        assert!(settings.console);
        assert!(!settings.debug);
    }
}
