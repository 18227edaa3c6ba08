use crate::services::CopyError;
use camino::Utf8PathBuf;
use std::time::Duration;

/// Result of copying one candidate into the backup directory
#[derive(Debug)]
pub struct CopyOutcome {
    pub source: Utf8PathBuf,
    pub artifact: Utf8PathBuf,
    pub duration: Duration,
    pub result: Result<(), CopyError>,
}

impl CopyOutcome {
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }
}

/// Totals for one run of the batch copier
#[derive(Debug, Default)]
pub struct CopySummary {
    /// Number of batches started, `ceil(candidates / batch_size)`
    pub batches: usize,
    pub copied: usize,
    /// Sources that failed, with the reason. They are picked up again next pass.
    pub failed: Vec<(Utf8PathBuf, String)>,
}

impl CopySummary {
    pub fn attempted(&self) -> usize {
        self.copied + self.failed.len()
    }
}

/// Everything one pass did
#[derive(Debug, Default)]
pub struct PassReport {
    pub discovered: usize,
    pub copy: CopySummary,
    pub duration: Duration,
}

impl PassReport {
    pub fn summary(&self) -> String {
        format!(
            "{} discovered, {} copied, {} failed in {} batches ({:.2}s)",
            self.discovered,
            self.copy.copied,
            self.copy.failed.len(),
            self.copy.batches,
            self.duration.as_secs_f64()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pass_report_summary() {
        let report = PassReport {
            discovered: 3,
            copy: CopySummary {
                batches: 2,
                copied: 2,
                failed: vec![(Utf8PathBuf::from("/src/a.jpg"), "gone".to_string())],
            },
            duration: Duration::from_millis(1500),
        };

        assert_eq!(report.copy.attempted(), 3);
        let summary = report.summary();
        assert!(summary.contains("3 discovered"));
        assert!(summary.contains("2 copied"));
        assert!(summary.contains("1 failed"));
        assert!(summary.contains("2 batches"));
    }
}
