use crate::metrics::Metrics;
use crate::models::{BackupConfig, PassReport};
use crate::services::copier::{BatchCopier, CopyPrimitive};
use crate::services::scanner::Scanner;
use async_trait::async_trait;
use camino::Utf8PathBuf;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;

/// Errors that abort a whole pass.
///
/// Per-file problems never surface here; they are absorbed by the scanner and
/// the copier. The scheduler logs these and still fires the next pass.
#[derive(Error, Debug)]
pub enum PassError {
    #[error("Search directory {path} is unavailable: {reason}")]
    SearchRootUnavailable { path: Utf8PathBuf, reason: String },

    #[error("Backup directory {path} is unavailable: {reason}")]
    BackupDirUnavailable { path: Utf8PathBuf, reason: String },

    #[error("Scan task failed: {0}")]
    ScanFailed(String),
}

/// One full scan-then-copy cycle, as seen by the scheduler
#[async_trait]
pub trait Pass: Send + Sync {
    async fn run(&self) -> Result<PassReport, PassError>;
}

/// Runs passes against a fixed configuration.
///
/// Scanning finishes before copying starts, and the candidate list lives only
/// for the duration of [`run_pass`](Self::run_pass).
pub struct PassRunner {
    config: Arc<BackupConfig>,
    scanner: Scanner,
    copier: BatchCopier,
    metrics: Arc<Metrics>,
}

impl PassRunner {
    /// Wire a scanner and a batch copier to one configuration
    ///
    /// # Arguments
    /// * `config` - Validated backup configuration
    /// * `primitive` - How single files are copied
    /// * `metrics` - Shared counters, also handed to the copier
    pub fn new(
        config: Arc<BackupConfig>,
        primitive: Arc<dyn CopyPrimitive>,
        metrics: Arc<Metrics>,
    ) -> Self {
        // Validation guarantees batch_size > 0; clamp anyway for unvalidated configs
        let batch_size = NonZeroUsize::new(config.batch_size).unwrap_or(NonZeroUsize::MIN);

        let copier = BatchCopier::new(primitive, config.backup_dir.clone(), batch_size)
            .with_timeout(config.copy_timeout())
            .with_metrics(Arc::clone(&metrics));

        Self {
            scanner: Scanner::new(&config),
            copier,
            config,
            metrics,
        }
    }

    pub fn config(&self) -> &BackupConfig {
        &self.config
    }

    /// Scan the search root once and copy everything found.
    ///
    /// # Returns
    /// The pass report, or the pass-level error that stopped it before copying
    pub async fn run_pass(&self) -> Result<PassReport, PassError> {
        let start = Instant::now();
        self.metrics.record_pass_started();

        let result = self.run_pass_inner(start).await;
        if result.is_err() {
            self.metrics.record_pass_failed();
        }
        result
    }

    async fn run_pass_inner(&self, start: Instant) -> Result<PassReport, PassError> {
        self.check_search_root().await?;
        let scanner = self.prepare_backup_dir().await?;

        // walkdir is blocking I/O
        let root = self.config.search_dir.clone();
        let candidates = tokio::task::spawn_blocking(move || scanner.scan(&root))
            .await
            .map_err(|e| PassError::ScanFailed(e.to_string()))?;

        let discovered = candidates.len();
        self.metrics.record_files_discovered(discovered);

        let copy = self.copier.copy_all(candidates).await;

        let report = PassReport {
            discovered,
            copy,
            duration: start.elapsed(),
        };
        tracing::info!("Pass complete: {}", report.summary());

        Ok(report)
    }

    async fn check_search_root(&self) -> Result<(), PassError> {
        let path = &self.config.search_dir;
        let unavailable = |reason: String| PassError::SearchRootUnavailable {
            path: path.clone(),
            reason,
        };

        let metadata = tokio::fs::metadata(path)
            .await
            .map_err(|e| unavailable(e.to_string()))?;
        if !metadata.is_dir() {
            return Err(unavailable("not a directory".to_string()));
        }
        Ok(())
    }

    /// Create the backup directory if needed, make sure it is a directory and
    /// return a scanner that prunes it wherever the walk meets it.
    async fn prepare_backup_dir(&self) -> Result<Scanner, PassError> {
        let path = &self.config.backup_dir;
        let unavailable = |reason: String| PassError::BackupDirUnavailable {
            path: path.clone(),
            reason,
        };

        tokio::fs::create_dir_all(path)
            .await
            .map_err(|e| unavailable(e.to_string()))?;

        let metadata = tokio::fs::metadata(path)
            .await
            .map_err(|e| unavailable(e.to_string()))?;
        if !metadata.is_dir() {
            return Err(unavailable("not a directory".to_string()));
        }

        self.scanner
            .clone()
            .excluding(path)
            .map_err(|e| unavailable(e.to_string()))
    }
}

#[async_trait]
impl Pass for PassRunner {
    async fn run(&self) -> Result<PassReport, PassError> {
        self.run_pass().await
    }
}
