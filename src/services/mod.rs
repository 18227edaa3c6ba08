//! Services module - the scan-and-copy core of PhotoCopy.
//!
//! # Components
//!
//! - [`Scanner`]: walks the search root and returns every file whose extension
//!   is allowed and whose directory path contains no disallowed segment.
//!   Traversal errors skip the affected subtree and are logged.
//!
//! - [`BatchCopier`]: copies the candidates into the flat backup directory
//!   under fresh UUID names, at most `batch_size` at a time, waiting for each
//!   batch to settle before starting the next. Failures are isolated per file.
//!
//! - [`CopyPrimitive`]: the opaque "copy A to B" operation. [`NativeCopy`] uses
//!   the filesystem directly, [`RsyncCopy`] shells out to `rsync -za`.
//!
//! - [`PassRunner`]: one pass, scan to completion then copy to completion.
//!
//! # Usage Example
//!
//! ```ignore
//! use photocopy::services::{copy_primitive_for, PassRunner};
//!
//! let runner = PassRunner::new(config.clone(), copy_primitive_for(config.copy_method), metrics);
//! let report = runner.run_pass().await?;
//! println!("{}", report.summary());
//! ```

pub mod copier;
pub mod pass;
pub mod scanner;

pub use copier::{
    BatchCopier, CopyError, CopyPrimitive, NativeCopy, RsyncCopy, artifact_name,
    copy_primitive_for,
};
pub use pass::{Pass, PassError, PassRunner};
pub use scanner::{ScanFilter, Scanner};
