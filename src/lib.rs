// PhotoCopy - periodic image backup
//
// This is the library crate containing the scanner, the batch copier and the scheduler.
// The binary crate (main.rs) wires them to configuration, logging and Ctrl-C.

pub mod config;
pub mod logging;
pub mod metrics;
pub mod models;
pub mod scheduler;
pub mod services;

// Re-export commonly used types for convenience
pub use config::ConfigManager;
pub use metrics::Metrics;
pub use models::{BackupConfig, CopyMethod, PassReport};
pub use scheduler::Scheduler;
pub use services::{BatchCopier, PassRunner, Scanner};

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");
