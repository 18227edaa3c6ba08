//! Recursive image discovery.
//!
//! The scanner walks the search root depth-first with [`walkdir`], which keeps
//! its own stack of open directories instead of recursing on the call stack.
//! Every entry of every directory is visited.
//!
//! Filtering happens in two places:
//! - directories whose name is a disallowed segment are pruned, so nothing
//!   below `thumbnails/` or `node_modules/` is ever listed
//! - regular files are kept only if their extension is in the allowed set
//!
//! Symlinks are ignored unless `follow_symlinks` is set. When they are
//! followed, walkdir compares each target against the device/inode of its
//! ancestors and reports a loop instead of descending forever; the loop is
//! logged and that branch is skipped like any other traversal error.
//!
//! A scanner can also be told to exclude one directory by identity (see
//! [`Scanner::excluding`]). Each directory met during the walk is opened and
//! compared by device/inode, so a symlink or a second spelling that leads into
//! the backup directory is pruned just like the directory itself.

use crate::models::BackupConfig;
use camino::{Utf8Path, Utf8PathBuf};
use indexmap::IndexSet;
use same_file::Handle;
use std::io;
use std::sync::Arc;
use walkdir::{DirEntry, WalkDir};

/// The extension and path-segment rules applied to scanned entries
#[derive(Debug, Clone)]
pub struct ScanFilter {
    allowed_extensions: IndexSet<String>,
    disallowed_segments: IndexSet<String>,
}

impl ScanFilter {
    /// Create a filter from explicit rule sets
    ///
    /// # Arguments
    /// * `allowed_extensions` - Extensions without the leading dot, matched case-sensitively
    /// * `disallowed_segments` - Directory names whose whole subtree is skipped
    pub fn new(allowed_extensions: IndexSet<String>, disallowed_segments: IndexSet<String>) -> Self {
        Self {
            allowed_extensions,
            disallowed_segments,
        }
    }

    pub fn from_config(config: &BackupConfig) -> Self {
        Self::new(
            config.allowed_extensions.clone(),
            config.disallowed_segments.clone(),
        )
    }

    /// Text after the last `.` of a file name.
    ///
    /// A name without a dot has no extension. `photo.` has an empty one.
    ///
    /// # Returns
    /// The extension slice, or `None` when the name has no dot
    pub fn extension_of(file_name: &str) -> Option<&str> {
        file_name.rsplit_once('.').map(|(_, ext)| ext)
    }

    /// Case-sensitive extension check on a bare file name
    pub fn accepts_extension(&self, file_name: &str) -> bool {
        Self::extension_of(file_name).is_some_and(|ext| self.allowed_extensions.contains(ext))
    }

    pub fn is_disallowed_segment(&self, dir_name: &str) -> bool {
        self.disallowed_segments.contains(dir_name)
    }

    /// Full decision for a file path relative to the search root.
    ///
    /// Every directory component is checked against the disallowed segments;
    /// the file name itself is only checked for its extension.
    pub fn accepts_relative(&self, relative: &Utf8Path) -> bool {
        let Some(file_name) = relative.file_name() else {
            return false;
        };
        if !self.accepts_extension(file_name) {
            return false;
        }
        !relative
            .parent()
            .into_iter()
            .flat_map(|dir| dir.components())
            .any(|component| self.is_disallowed_segment(component.as_str()))
    }
}

/// Walks a directory tree and collects image candidates
#[derive(Debug, Clone)]
pub struct Scanner {
    filter: ScanFilter,
    follow_symlinks: bool,
    /// Directory pruned wherever it is met, compared by identity
    excluded: Option<Arc<Excluded>>,
}

#[derive(Debug)]
struct Excluded {
    path: Utf8PathBuf,
    handle: Handle,
}

impl Scanner {
    /// Build a scanner from the filter and symlink settings of a configuration.
    ///
    /// The backup directory is not excluded here since it may not exist yet;
    /// the pass calls [`excluding`](Self::excluding) once it has created it.
    pub fn new(config: &BackupConfig) -> Self {
        Self::with_filter(ScanFilter::from_config(config), config.follow_symlinks)
    }

    pub fn with_filter(filter: ScanFilter, follow_symlinks: bool) -> Self {
        Self {
            filter,
            follow_symlinks,
            excluded: None,
        }
    }

    /// Prune `dir` from every walk, however it is reached.
    ///
    /// # Arguments
    /// * `dir` - An existing directory, usually the backup directory
    ///
    /// # Returns
    /// The scanner with the exclusion set, or the error from opening `dir`
    pub fn excluding(mut self, dir: &Utf8Path) -> io::Result<Self> {
        let handle = Handle::from_path(dir)?;
        self.excluded = Some(Arc::new(Excluded {
            path: dir.to_path_buf(),
            handle,
        }));
        Ok(self)
    }

    pub fn filter(&self) -> &ScanFilter {
        &self.filter
    }

    /// Collect every accepted regular file below `root`.
    ///
    /// Unreadable directories, entries that vanish mid-walk, symlink loops and
    /// non UTF-8 names are logged and skipped; the scan itself never fails.
    /// Entries are sorted by name within each directory, callers must not rely
    /// on the order beyond each file appearing once.
    ///
    /// # Arguments
    /// * `root` - Search root; its own name is never treated as a segment
    ///
    /// # Returns
    /// Absolute or root-relative paths (as `root` was given) of accepted images
    pub fn scan(&self, root: &Utf8Path) -> Vec<Utf8PathBuf> {
        tracing::info!("Scouting for new images in {}", root);

        let walker = WalkDir::new(root)
            .follow_links(self.follow_symlinks)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| self.should_descend(entry));

        let mut candidates = Vec::new();
        let mut skipped_errors = 0usize;

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    skipped_errors += 1;
                    if let Some(ancestor) = e.loop_ancestor() {
                        tracing::warn!(
                            "Symlink loop at {:?} (points back to {:?}), skipping",
                            e.path(),
                            ancestor
                        );
                    } else {
                        tracing::warn!("Skipping unreadable entry {:?}: {}", e.path(), e);
                    }
                    continue;
                }
            };

            // With follow_links(false) symlinks report their own type and fall through here
            if !entry.file_type().is_file() {
                continue;
            }

            let Ok(path) = Utf8PathBuf::from_path_buf(entry.into_path()) else {
                skipped_errors += 1;
                tracing::warn!("Skipping file with non UTF-8 path under {}", root);
                continue;
            };

            let Some(file_name) = path.file_name() else {
                continue;
            };
            if !self.filter.accepts_extension(file_name) {
                continue;
            }

            tracing::debug!("Located image {}", path);
            candidates.push(path);
        }

        tracing::info!(
            "Scan of {} found {} images ({} entries skipped on error)",
            root,
            candidates.len(),
            skipped_errors
        );

        candidates
    }

    /// Decide whether walkdir yields (and for directories, enters) an entry.
    fn should_descend(&self, entry: &DirEntry) -> bool {
        // Never prune the root itself, its own name is not a segment below the root
        if entry.depth() == 0 || !entry.file_type().is_dir() {
            return true;
        }

        if let Some(name) = entry.file_name().to_str() {
            if self.filter.is_disallowed_segment(name) {
                tracing::debug!("Pruning disallowed directory {:?}", entry.path());
                return false;
            }
        }

        if let Some(excluded) = &self.excluded {
            // Opening follows a symlinked directory to its target
            if Handle::from_path(entry.path()).is_ok_and(|handle| handle == excluded.handle) {
                tracing::warn!(
                    "Backup directory {} reached through {:?}, pruning",
                    excluded.path,
                    entry.path()
                );
                return false;
            }
        }

        true
    }
}
