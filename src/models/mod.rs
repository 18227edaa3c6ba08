//! Data models for PhotoCopy.
//!
//! - [`BackupConfig`]: the immutable configuration loaded from `photocopy.yaml`
//! - [`CopyMethod`]: which copy primitive the copier uses
//! - [`CopyOutcome`], [`CopySummary`], [`PassReport`]: what a pass did
//!
//! Candidate lists are plain `Vec<Utf8PathBuf>` owned by the running pass and
//! dropped when it ends; nothing here is persisted between passes.

pub mod config;
pub mod report;

pub use config::{BackupConfig, ConfigError, CopyMethod};
pub use report::{CopyOutcome, CopySummary, PassReport};
