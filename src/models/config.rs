use camino::{Utf8Path, Utf8PathBuf};
use indexmap::IndexSet;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Backup configuration loaded from `photocopy.yaml`.
///
/// Built once at startup and shared read-only (behind an `Arc`) with the
/// scanner, the copier and the pass runner. Nothing mutates it afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackupConfig {
    /// Directory tree searched for images.
    ///
    /// Must not contain `backup_dir`.
    #[serde(default = "default_search_dir")]
    pub search_dir: Utf8PathBuf,

    /// Flat directory receiving the copied images.
    #[serde(default = "default_backup_dir")]
    pub backup_dir: Utf8PathBuf,

    /// Extensions (without the dot) that identify an image. Case-sensitive.
    #[serde(default = "default_allowed_extensions")]
    pub allowed_extensions: IndexSet<String>,

    /// Directory names that exclude everything below them.
    #[serde(default = "default_disallowed_segments")]
    pub disallowed_segments: IndexSet<String>,

    /// How many copies run at the same time.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Delay between two scheduled passes, in seconds.
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,

    /// Run a pass as soon as the process starts.
    #[serde(default = "default_true")]
    pub run_on_startup: bool,

    /// Follow symbolic links while scanning (cycles are detected and skipped).
    #[serde(default)]
    pub follow_symlinks: bool,

    #[serde(default)]
    pub copy_method: CopyMethod,

    /// Per-copy timeout in seconds, `0` disables it.
    #[serde(default = "default_copy_timeout_secs")]
    pub copy_timeout_secs: u64,

    #[serde(default)]
    pub debug_mode: bool,
}

/// Which copy primitive backs the batch copier.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CopyMethod {
    /// In-process filesystem copy.
    #[default]
    Native,
    /// External `rsync -za <src> <dst>`.
    Rsync,
}

/// Reasons a configuration is refused at startup
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("batch_size must be at least 1")]
    ZeroBatchSize,

    #[error("interval_secs must be at least 1")]
    ZeroInterval,

    #[error("allowed_extensions is empty, nothing would ever be backed up")]
    NoExtensions,

    #[error("allowed_extensions contains an empty entry")]
    EmptyExtension,

    #[error("disallowed segment {0:?} is empty or contains a path separator")]
    InvalidSegment(String),

    #[error("backup directory {backup} is inside search directory {search}")]
    BackupInsideSearch {
        backup: Utf8PathBuf,
        search: Utf8PathBuf,
    },
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            search_dir: default_search_dir(),
            backup_dir: default_backup_dir(),
            allowed_extensions: default_allowed_extensions(),
            disallowed_segments: default_disallowed_segments(),
            batch_size: default_batch_size(),
            interval_secs: default_interval_secs(),
            run_on_startup: true,
            follow_symlinks: false,
            copy_method: CopyMethod::default(),
            copy_timeout_secs: default_copy_timeout_secs(),
            debug_mode: false,
        }
    }
}

fn default_search_dir() -> Utf8PathBuf {
    Utf8PathBuf::from("/volume1/homes")
}

fn default_backup_dir() -> Utf8PathBuf {
    Utf8PathBuf::from("/volume1/photos")
}

fn default_allowed_extensions() -> IndexSet<String> {
    ["jpg", "jpeg", "png", "gif", "tiff"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_disallowed_segments() -> IndexSet<String> {
    [
        "node_modules",
        "cache",
        "thumbnails",
        "thumbs",
        "thumb",
        "public",
        "public_html",
        "sprites",
        "spritesheet",
        "www",
        "htdocs",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

fn default_batch_size() -> usize {
    10
}

fn default_interval_secs() -> u64 {
    60 * 60
}

fn default_copy_timeout_secs() -> u64 {
    300
}

fn default_true() -> bool {
    true
}

impl BackupConfig {
    /// Delay between two scheduled passes
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    /// Per-copy timeout, `None` when disabled
    pub fn copy_timeout(&self) -> Option<Duration> {
        (self.copy_timeout_secs > 0).then(|| Duration::from_secs(self.copy_timeout_secs))
    }

    /// Strip a leading dot from every configured extension.
    ///
    /// `.jpg` and `jpg` mean the same thing in the file; case is kept.
    pub fn normalize(mut self) -> Self {
        self.allowed_extensions = self
            .allowed_extensions
            .into_iter()
            .map(|ext| ext.strip_prefix('.').map(str::to_string).unwrap_or(ext))
            .collect();
        self
    }

    /// Check the invariants the scanner and copier rely on.
    ///
    /// # Returns
    /// The first violated rule. The backup directory is compared with the
    /// search directory after resolving symlinks, even if it does not exist yet.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.batch_size == 0 {
            return Err(ConfigError::ZeroBatchSize);
        }
        if self.interval_secs == 0 {
            return Err(ConfigError::ZeroInterval);
        }
        if self.allowed_extensions.is_empty() {
            return Err(ConfigError::NoExtensions);
        }
        if self.allowed_extensions.iter().any(|ext| ext.is_empty()) {
            return Err(ConfigError::EmptyExtension);
        }
        if let Some(segment) = self
            .disallowed_segments
            .iter()
            .find(|s| s.is_empty() || s.contains(['/', '\\']))
        {
            return Err(ConfigError::InvalidSegment(segment.clone()));
        }
        if is_within(&self.backup_dir, &self.search_dir) {
            return Err(ConfigError::BackupInsideSearch {
                backup: self.backup_dir.clone(),
                search: self.search_dir.clone(),
            });
        }
        Ok(())
    }
}

/// True when `inner` is `outer` or lies below it.
///
/// Both sides are resolved through the filesystem first, so symlinked or
/// `..`-laden spellings of the same directory are caught even when `inner`
/// does not exist yet.
fn is_within(inner: &Utf8Path, outer: &Utf8Path) -> bool {
    resolve(inner).starts_with(resolve(outer))
}

/// Canonicalize the deepest existing ancestor of `path` and re-attach the
/// components below it. Falls back to the path as written when nothing resolves.
fn resolve(path: &Utf8Path) -> Utf8PathBuf {
    for ancestor in path.ancestors() {
        if ancestor.as_str().is_empty() {
            break;
        }
        let Ok(canonical) = ancestor.canonicalize_utf8() else {
            continue;
        };
        return match path.strip_prefix(ancestor) {
            Ok(rest) if !rest.as_str().is_empty() => canonical.join(rest),
            _ => canonical,
        };
    }
    path.to_path_buf()
}
