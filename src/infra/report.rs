// ============================================================
// Layer 6 — JSON Report Writer
// ============================================================
// Writes <dir>/report.json once, after training ends:
//
//   { "start_time": 1718000000.1, "end_time": 1718000420.7,
//     "args": { ...TrainConfig... },
//     "records": [ { "epoch": 1, "time": .., "lr": .., "val_loss": .., "ppl": .. } ] }

use anyhow::{Context, Result};
use std::{fs, path::PathBuf};

use crate::domain::{record::TrainingReport, traits::ReportSink};

pub struct JsonReportWriter {
    dir: PathBuf,
}

impl JsonReportWriter {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn report_path(&self) -> PathBuf {
        self.dir.join("report.json")
    }
}

impl ReportSink for JsonReportWriter {
    fn write_report(&self, report: &TrainingReport) -> Result<()> {
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("Cannot create report directory '{}'", self.dir.display()))?;

        let path = self.report_path();
        let json = serde_json::to_string_pretty(report)?;
        fs::write(&path, json)
            .with_context(|| format!("Cannot write report to '{}'", path.display()))?;

        tracing::info!("Report written to '{}'", path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::record::TrainingRecord;

    #[test]
    fn test_report_layout() {
        let dir = std::env::temp_dir().join(format!("word_lm_report_{}", std::process::id()));
        let writer = JsonReportWriter::new(&dir);
        let report = TrainingReport {
            start_time: 10.0,
            end_time:   12.5,
            args:       serde_json::json!({ "model": "LSTM", "epochs": 1 }),
            records:    vec![TrainingRecord::new(1, 2.5, 20.0, 0.0)],
        };
        writer.write_report(&report).unwrap();

        let value: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(writer.report_path()).unwrap()).unwrap();
        assert_eq!(value["args"]["model"], "LSTM");
        assert_eq!(value["records"][0]["epoch"], 1);
        assert_eq!(value["records"][0]["ppl"], 1.0);
        assert_eq!(value["end_time"], 12.5);

        fs::remove_dir_all(&dir).ok();
    }
}
