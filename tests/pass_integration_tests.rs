//! End-to-end tests for a full scan-and-copy pass
//!
//! These tests verify:
//! - One pass backs up exactly the qualifying images under `<uuid>.<ext>` names
//! - Consecutive passes copy everything again (no deduplication)
//! - The backup directory is never scanned, however the walk reaches it
//! - Pass-level failures are reported without panicking
//! - The scheduler keeps running passes against a real tree

use camino::Utf8PathBuf;
use photocopy::models::ConfigError;
use photocopy::services::{NativeCopy, PassError, PassRunner};
use photocopy::{BackupConfig, Metrics, Scheduler};
use std::fs;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::watch;

struct Fixture {
    _temp_dir: TempDir,
    src: Utf8PathBuf,
    dst: Utf8PathBuf,
}

fn fixture() -> Fixture {
    let temp_dir = TempDir::new().unwrap();
    let root = Utf8PathBuf::try_from(temp_dir.path().to_path_buf()).unwrap();
    let src = root.join("src");
    let dst = root.join("dst");

    fs::create_dir_all(src.join("sub")).unwrap();
    fs::create_dir_all(src.join("skip/thumbnails")).unwrap();
    fs::create_dir_all(&dst).unwrap();
    fs::write(src.join("img1.jpg"), b"one").unwrap();
    fs::write(src.join("sub/img2.png"), b"two").unwrap();
    fs::write(src.join("skip/thumbnails/img3.gif"), b"three").unwrap();

    Fixture {
        _temp_dir: temp_dir,
        src,
        dst,
    }
}

fn runner(fx: &Fixture, metrics: Arc<Metrics>) -> PassRunner {
    let config = BackupConfig {
        search_dir: fx.src.clone(),
        backup_dir: fx.dst.clone(),
        ..BackupConfig::default()
    };
    config.validate().unwrap();
    PassRunner::new(Arc::new(config), Arc::new(NativeCopy), metrics)
}

fn backup_files(fx: &Fixture) -> Vec<(String, String, Vec<u8>)> {
    let mut files: Vec<_> = fs::read_dir(&fx.dst)
        .unwrap()
        .map(|e| e.unwrap().path())
        .map(|p| {
            let path = Utf8PathBuf::try_from(p).unwrap();
            let stem = path.file_stem().unwrap().to_string();
            let ext = path.extension().unwrap().to_string();
            let bytes = fs::read(&path).unwrap();
            (ext, stem, bytes)
        })
        .collect();
    files.sort();
    files
}

#[tokio::test]
async fn test_single_pass_backs_up_qualifying_images() {
    let fx = fixture();
    let metrics = Arc::new(Metrics::new());

    let report = runner(&fx, Arc::clone(&metrics)).run_pass().await.unwrap();

    assert_eq!(report.discovered, 2);
    assert_eq!(report.copy.copied, 2);
    assert_eq!(report.copy.batches, 1);
    assert!(report.copy.failed.is_empty());

    let files = backup_files(&fx);
    assert_eq!(files.len(), 2);
    assert_eq!(files[0].0, "jpg");
    assert_eq!(files[0].2, b"one");
    assert_eq!(files[1].0, "png");
    assert_eq!(files[1].2, b"two");
    for (_, stem, _) in &files {
        assert!(uuid::Uuid::parse_str(stem).is_ok(), "{} is not a uuid", stem);
    }

    assert_eq!(metrics.files_discovered.load(Ordering::Relaxed), 2);
    assert_eq!(metrics.files_copied.load(Ordering::Relaxed), 2);
}

#[tokio::test]
async fn test_two_passes_copy_everything_twice() {
    let fx = fixture();
    let runner = runner(&fx, Arc::new(Metrics::new()));

    runner.run_pass().await.unwrap();
    runner.run_pass().await.unwrap();

    let files = backup_files(&fx);
    assert_eq!(files.len(), 4);

    let mut stems: Vec<&str> = files.iter().map(|(_, stem, _)| stem.as_str()).collect();
    stems.sort();
    stems.dedup();
    assert_eq!(stems.len(), 4, "every copy gets a new name");
    assert_eq!(files.iter().filter(|(ext, _, _)| ext == "jpg").count(), 2);
    assert_eq!(files.iter().filter(|(ext, _, _)| ext == "png").count(), 2);
}

/// Run `passes` passes and return how many files each one discovered
async fn discovered_per_pass(config: BackupConfig, passes: usize) -> Vec<usize> {
    let runner = PassRunner::new(Arc::new(config), Arc::new(NativeCopy), Arc::new(Metrics::new()));
    let mut discovered = Vec::with_capacity(passes);
    for _ in 0..passes {
        discovered.push(runner.run_pass().await.unwrap().discovered);
    }
    discovered
}

#[cfg(unix)]
#[tokio::test]
async fn test_backup_dir_behind_symlinked_search_root_is_not_rescanned() {
    let temp_dir = TempDir::new().unwrap();
    let root = Utf8PathBuf::try_from(temp_dir.path().to_path_buf()).unwrap();
    fs::create_dir_all(root.join("real/alice")).unwrap();
    fs::write(root.join("real/alice/cat.jpg"), b"meow").unwrap();
    std::os::unix::fs::symlink(root.join("real"), root.join("homes")).unwrap();

    let config = BackupConfig {
        search_dir: root.join("homes"),
        backup_dir: root.join("real/backup"),
        ..BackupConfig::default()
    };
    assert!(matches!(
        config.validate(),
        Err(ConfigError::BackupInsideSearch { .. })
    ));

    // Even when validation is bypassed the walk prunes the backup directory
    assert_eq!(discovered_per_pass(config, 3).await, vec![1, 1, 1]);
    assert_eq!(fs::read_dir(root.join("real/backup")).unwrap().count(), 3);
}

#[cfg(unix)]
#[tokio::test]
async fn test_followed_symlink_into_backup_dir_is_pruned() {
    let fx = fixture();
    std::os::unix::fs::symlink(&fx.dst, fx.src.join("photos")).unwrap();

    let config = BackupConfig {
        search_dir: fx.src.clone(),
        backup_dir: fx.dst.clone(),
        follow_symlinks: true,
        ..BackupConfig::default()
    };
    config.validate().unwrap();

    assert_eq!(discovered_per_pass(config, 3).await, vec![2, 2, 2]);
    assert_eq!(backup_files(&fx).len(), 6);
}

#[tokio::test]
async fn test_backup_dir_that_is_a_file_fails_the_pass() {
    let fx = fixture();
    fs::remove_dir(&fx.dst).unwrap();
    fs::write(&fx.dst, b"not a directory").unwrap();

    let metrics = Arc::new(Metrics::new());
    let result = runner(&fx, Arc::clone(&metrics)).run_pass().await;

    assert!(matches!(result, Err(PassError::BackupDirUnavailable { .. })));
    assert_eq!(metrics.passes_failed.load(Ordering::Relaxed), 1);
}

#[tokio::test]
async fn test_scheduler_drives_real_passes() {
    let fx = fixture();
    let metrics = Arc::new(Metrics::new());
    let runner = Arc::new(runner(&fx, Arc::clone(&metrics)));

    let (tx, rx) = watch::channel(false);
    let scheduler = Scheduler::new(runner, Duration::from_millis(50), true)
        .with_metrics(Arc::clone(&metrics));
    let handle = tokio::spawn(async move { scheduler.run(rx).await });

    tokio::time::sleep(Duration::from_millis(130)).await;
    tx.send(true).unwrap();
    let passes = handle.await.unwrap();

    assert!(passes >= 2);
    assert_eq!(backup_files(&fx).len(), passes * 2);
    assert_eq!(metrics.passes_run.load(Ordering::Relaxed), passes);
}
