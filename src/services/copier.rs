use crate::metrics::Metrics;
use crate::models::{CopyMethod, CopyOutcome, CopySummary};
use async_trait::async_trait;
use camino::{Utf8Path, Utf8PathBuf};
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::task::JoinSet;
use tokio::time::timeout;
use uuid::Uuid;

/// Errors that can occur while copying a single candidate
#[derive(Error, Debug)]
pub enum CopyError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Timeout after {0:?}")]
    Timeout(Duration),

    #[error("Failed to start {program}: {source}")]
    Spawn {
        program: String,
        source: std::io::Error,
    },

    #[error("{program} exited with code {code}: {stderr}")]
    CommandFailed {
        program: String,
        code: i32,
        stderr: String,
    },

    #[error("Copy task panicked: {0}")]
    TaskPanicked(String),
}

/// "Copy file A to path B", the only thing the batch copier needs from the outside
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CopyPrimitive: Send + Sync {
    async fn copy(&self, source: &Utf8Path, destination: &Utf8Path) -> Result<(), CopyError>;
}

/// Streams the source into the destination with async file handles.
///
/// Each read and write is its own await point, so dropping the future (a
/// timeout) stops the copy after the chunk in progress and closes both files.
/// Only regular files are copied; a FIFO or device source is refused up front
/// instead of parking a blocking thread on `open`.
#[derive(Debug, Clone, Copy, Default)]
pub struct NativeCopy;

#[async_trait]
impl CopyPrimitive for NativeCopy {
    async fn copy(&self, source: &Utf8Path, destination: &Utf8Path) -> Result<(), CopyError> {
        let metadata = tokio::fs::metadata(source).await?;
        if !metadata.is_file() {
            return Err(CopyError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("{} is not a regular file", source),
            )));
        }

        let mut reader = File::open(source).await?;
        let mut writer = File::create(destination).await?;
        tokio::io::copy(&mut reader, &mut writer).await?;
        writer.flush().await?;

        tokio::fs::set_permissions(destination, metadata.permissions()).await?;
        Ok(())
    }
}

/// Copies by running `rsync -za <source> <destination>`.
///
/// Arguments are passed directly to the process, never through a shell, so
/// quotes and spaces in file names need no escaping.
#[derive(Debug, Clone)]
pub struct RsyncCopy {
    program: String,
}

impl RsyncCopy {
    /// Use `rsync` from `PATH`
    pub fn new() -> Self {
        Self::with_program("rsync")
    }

    /// Use a specific rsync-compatible binary
    ///
    /// # Arguments
    /// * `program` - Name looked up in `PATH`, or a path to the binary
    pub fn with_program(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl Default for RsyncCopy {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CopyPrimitive for RsyncCopy {
    async fn copy(&self, source: &Utf8Path, destination: &Utf8Path) -> Result<(), CopyError> {
        let output = Command::new(&self.program)
            .arg("-za")
            .arg(source)
            .arg(destination)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|source| CopyError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        if output.status.success() {
            return Ok(());
        }

        Err(CopyError::CommandFailed {
            program: self.program.clone(),
            code: output.status.code().unwrap_or(-1),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        })
    }
}

/// Build the copy primitive selected in the configuration
///
/// # Arguments
/// * `method` - `copy_method` from the configuration
///
/// # Returns
/// A shareable primitive for [`BatchCopier::new`]
pub fn copy_primitive_for(method: CopyMethod) -> Arc<dyn CopyPrimitive> {
    match method {
        CopyMethod::Native => Arc::new(NativeCopy),
        CopyMethod::Rsync => Arc::new(RsyncCopy::new()),
    }
}

/// Fresh artifact file name for a source: a random v4 UUID plus the source extension.
///
/// No collision check is made. The mapping back to the source is only logged.
///
/// # Arguments
/// * `source` - Candidate path; only its file name is looked at
///
/// # Returns
/// `<uuid>.<ext>`, or a bare `<uuid>` when the source has no extension
pub fn artifact_name(source: &Utf8Path) -> String {
    let id = Uuid::new_v4();
    match source.file_name().and_then(|name| name.rsplit_once('.')) {
        Some((_, ext)) => format!("{}.{}", id, ext),
        None => id.to_string(),
    }
}

/// Drains a candidate list into the backup directory in bounded batches.
///
/// At most `batch_size` copies are in flight. Batch *k+1* is not spawned until
/// every copy of batch *k* has settled, successfully or not. A failed copy is
/// logged and counted; it never cancels its siblings or later batches.
pub struct BatchCopier {
    primitive: Arc<dyn CopyPrimitive>,
    backup_dir: Utf8PathBuf,
    batch_size: NonZeroUsize,
    copy_timeout: Option<Duration>,
    metrics: Option<Arc<Metrics>>,
}

impl BatchCopier {
    /// Create a copier with no timeout and no metrics
    ///
    /// # Arguments
    /// * `primitive` - Performs each single-file copy
    /// * `backup_dir` - Flat directory every artifact is written into
    /// * `batch_size` - Maximum number of copies in flight
    pub fn new(
        primitive: Arc<dyn CopyPrimitive>,
        backup_dir: impl Into<Utf8PathBuf>,
        batch_size: NonZeroUsize,
    ) -> Self {
        Self {
            primitive,
            backup_dir: backup_dir.into(),
            batch_size,
            copy_timeout: None,
            metrics: None,
        }
    }

    /// Bound every single copy.
    ///
    /// # Arguments
    /// * `copy_timeout` - Limit per copy; `None` lets copies run as long as they take
    ///
    /// # Returns
    /// The copier; a copy exceeding the limit is dropped and reported as [`CopyError::Timeout`]
    pub fn with_timeout(mut self, copy_timeout: Option<Duration>) -> Self {
        self.copy_timeout = copy_timeout;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn backup_dir(&self) -> &Utf8Path {
        &self.backup_dir
    }

    /// Copy every candidate, in list order, one batch at a time.
    ///
    /// # Arguments
    /// * `candidates` - Paths produced by the scanner
    ///
    /// # Returns
    /// Batch count, successes and the failed sources with their reasons
    pub async fn copy_all(&self, candidates: Vec<Utf8PathBuf>) -> CopySummary {
        tracing::info!(
            "Copying {} images in batches of {}",
            candidates.len(),
            self.batch_size
        );

        let mut summary = CopySummary::default();

        for (index, batch) in candidates.chunks(self.batch_size.get()).enumerate() {
            tracing::info!("Copying batch {} ({} images)", index, batch.len());
            summary.batches += 1;
            if let Some(metrics) = &self.metrics {
                metrics.record_batch();
            }

            for outcome in self.copy_batch(batch).await {
                self.record(&outcome);
                match outcome.result {
                    Ok(()) => summary.copied += 1,
                    Err(e) => summary.failed.push((outcome.source, e.to_string())),
                }
            }
        }

        tracing::info!(
            "All images copied: {} succeeded, {} failed, {} batches",
            summary.copied,
            summary.failed.len(),
            summary.batches
        );

        summary
    }

    /// Spawn one task per member and wait for all of them.
    async fn copy_batch(&self, batch: &[Utf8PathBuf]) -> Vec<CopyOutcome> {
        let mut tasks = JoinSet::new();

        for source in batch {
            let primitive = Arc::clone(&self.primitive);
            let source = source.clone();
            let artifact = self.backup_dir.join(artifact_name(&source));
            let copy_timeout = self.copy_timeout;

            tasks.spawn(async move {
                tracing::info!("{} -> {}", source, artifact);
                let start = Instant::now();

                let result = match copy_timeout {
                    Some(limit) => timeout(limit, primitive.copy(&source, &artifact))
                        .await
                        .unwrap_or(Err(CopyError::Timeout(limit))),
                    None => primitive.copy(&source, &artifact).await,
                };

                CopyOutcome {
                    source,
                    artifact,
                    duration: start.elapsed(),
                    result,
                }
            });
        }

        let mut outcomes = Vec::with_capacity(batch.len());
        let mut panics = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(outcome) => outcomes.push(outcome),
                Err(e) => {
                    tracing::error!("Copy task failed to complete: {}", e);
                    panics.push(e.to_string());
                }
            }
        }

        // A panicked task takes its outcome with it; charge the panic to a source that never reported
        let missing: Vec<Utf8PathBuf> = batch
            .iter()
            .filter(|source| !outcomes.iter().any(|o| &o.source == *source))
            .cloned()
            .collect();
        for (source, reason) in missing.into_iter().zip(panics) {
            outcomes.push(CopyOutcome {
                source,
                artifact: Utf8PathBuf::new(),
                duration: Duration::ZERO,
                result: Err(CopyError::TaskPanicked(reason)),
            });
        }

        outcomes
    }

    fn record(&self, outcome: &CopyOutcome) {
        if let Err(e) = &outcome.result {
            tracing::warn!(
                "Failed to copy {} -> {}: {}",
                outcome.source,
                outcome.artifact,
                e
            );
        }

        let Some(metrics) = &self.metrics else {
            return;
        };
        if outcome.is_success() {
            metrics.record_file_copied();
            metrics.record_copy_time(outcome.duration);
        } else {
            metrics.record_file_failed();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::Ordering;

    fn batch_size(n: usize) -> NonZeroUsize {
        NonZeroUsize::new(n).unwrap()
    }

    #[test]
    fn test_artifact_name_keeps_extension() {
        let name = artifact_name(Utf8Path::new("/src/a/b/cat.jpeg"));
        let (id, ext) = name.rsplit_once('.').unwrap();
        assert_eq!(ext, "jpeg");
        assert!(Uuid::parse_str(id).is_ok());
    }

    #[test]
    fn test_artifact_name_is_fresh_every_call() {
        let source = Utf8Path::new("/src/cat.png");
        assert_ne!(artifact_name(source), artifact_name(source));
    }

    #[test]
    fn test_artifact_name_without_extension() {
        let name = artifact_name(Utf8Path::new("/src/README"));
        assert!(Uuid::parse_str(&name).is_ok());
    }

    #[tokio::test]
    async fn test_failed_copy_does_not_abort_batch() {
        let mut primitive = MockCopyPrimitive::new();
        primitive.expect_copy().times(5).returning(|source, _| {
            if source.as_str().ends_with("bad.jpg") {
                Err(CopyError::Io(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    "vanished",
                )))
            } else {
                Ok(())
            }
        });

        let metrics = Arc::new(Metrics::new());
        let copier = BatchCopier::new(Arc::new(primitive), "/backup", batch_size(2))
            .with_metrics(Arc::clone(&metrics));

        let candidates = ["a.jpg", "bad.jpg", "c.jpg", "d.jpg", "e.jpg"]
            .into_iter()
            .map(|name| Utf8PathBuf::from("/src").join(name))
            .collect();
        let summary = copier.copy_all(candidates).await;

        assert_eq!(summary.batches, 3);
        assert_eq!(summary.copied, 4);
        assert_eq!(summary.failed.len(), 1);
        assert_eq!(summary.failed[0].0, Utf8PathBuf::from("/src/bad.jpg"));
        assert_eq!(metrics.files_copied.load(Ordering::Relaxed), 4);
        assert_eq!(metrics.files_failed.load(Ordering::Relaxed), 1);
        assert_eq!(metrics.batches_run.load(Ordering::Relaxed), 3);
    }

    #[tokio::test]
    async fn test_destination_is_flat_under_backup_dir() {
        let mut primitive = MockCopyPrimitive::new();
        primitive
            .expect_copy()
            .times(1)
            .withf(|source, destination| {
                source == Utf8Path::new("/src/deep/nested/dir/cat.gif")
                    && destination.parent() == Some(Utf8Path::new("/backup"))
                    && destination.extension() == Some("gif")
            })
            .returning(|_, _| Ok(()));

        let copier = BatchCopier::new(Arc::new(primitive), "/backup", batch_size(10));
        let summary = copier
            .copy_all(vec![Utf8PathBuf::from("/src/deep/nested/dir/cat.gif")])
            .await;

        assert_eq!(summary.copied, 1);
    }

    #[tokio::test]
    async fn test_empty_candidate_list_runs_no_batches() {
        let primitive = MockCopyPrimitive::new();
        let copier = BatchCopier::new(Arc::new(primitive), "/backup", batch_size(3));

        let summary = copier.copy_all(Vec::new()).await;
        assert_eq!(summary.batches, 0);
        assert_eq!(summary.attempted(), 0);
    }

    #[test]
    fn test_rsync_missing_program_is_spawn_error() {
        let rsync = RsyncCopy::with_program("photocopy-no-such-rsync-binary");
        let result = tokio_test::block_on(
            rsync.copy(Utf8Path::new("/nonexistent/a.jpg"), Utf8Path::new("/nonexistent/b.jpg")),
        );

        let err = tokio_test::assert_err!(result);
        assert!(matches!(err, CopyError::Spawn { .. }));
    }

    #[test]
    fn test_native_copy_missing_source_is_io_error() {
        let result = tokio_test::block_on(
            NativeCopy.copy(Utf8Path::new("/nonexistent/a.jpg"), Utf8Path::new("/nonexistent/b.jpg")),
        );

        assert!(matches!(result, Err(CopyError::Io(_))));
    }
}
