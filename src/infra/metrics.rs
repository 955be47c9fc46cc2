// ============================================================
// Layer 6 — Metrics Logger
// ============================================================
// Appends one CSV row per finished epoch, as soon as the epoch
// ends, so an interrupted run still leaves its curve behind.
//
// Output file: <report_dir>/metrics.csv
//
//   epoch,time,lr,val_loss,ppl
//   1,12.402113,20.000000,5.812003,334.517190
//   2,24.950371,20.000000,5.497120,244.040612
//
// Logging is best-effort: the controller warns on failure and
// keeps training.

use anyhow::{Context, Result};
use std::{
    fs::{self, OpenOptions},
    io::Write,
    path::PathBuf,
};

use crate::domain::record::TrainingRecord;

pub struct MetricsLogger {
    csv_path: PathBuf,
}

impl MetricsLogger {
    /// Create the directory and write the header if the file is new.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)
            .with_context(|| format!("Cannot create metrics directory '{}'", dir.display()))?;

        let csv_path = dir.join("metrics.csv");
        if !csv_path.exists() {
            let mut f = fs::File::create(&csv_path)
                .with_context(|| format!("Cannot create '{}'", csv_path.display()))?;
            writeln!(f, "epoch,time,lr,val_loss,ppl")?;
            tracing::debug!("Created metrics CSV: '{}'", csv_path.display());
        }

        Ok(Self { csv_path })
    }

    pub fn log(&self, r: &TrainingRecord) -> Result<()> {
        let mut f = OpenOptions::new()
            .append(true)
            .open(&self.csv_path)
            .with_context(|| format!("Cannot open '{}'", self.csv_path.display()))?;

        writeln!(f, "{},{:.6},{:.6},{:.6},{:.6}", r.epoch, r.time, r.lr, r.val_loss, r.ppl)?;

        tracing::debug!("Logged epoch {} metrics: val_loss={:.4}", r.epoch, r.val_loss);
        Ok(())
    }

    pub fn csv_path(&self) -> &PathBuf {
        &self.csv_path
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rows_are_appended_after_header() {
        let dir = std::env::temp_dir().join(format!("word_lm_metrics_{}", std::process::id()));
        fs::remove_dir_all(&dir).ok();

        let logger = MetricsLogger::new(&dir).unwrap();
        logger.log(&TrainingRecord::new(1, 1.5, 20.0, 2.0)).unwrap();
        logger.log(&TrainingRecord::new(2, 3.0, 5.0, 1.0)).unwrap();

        let text = fs::read_to_string(logger.csv_path()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "epoch,time,lr,val_loss,ppl");
        assert_eq!(lines.len(), 3);
        assert!(lines[2].starts_with("2,3.000000,5.000000,1.000000,2.718"));

        fs::remove_dir_all(&dir).ok();
    }
}
