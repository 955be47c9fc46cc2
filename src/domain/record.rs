// ============================================================
// Layer 3 — Training Records and Report
// ============================================================
// One TrainingRecord is produced per finished epoch. The list is
// append-only and, together with run metadata, becomes the
// TrainingReport handed to a ReportSink once training ends.
//
// Field names match the report.json layout consumed by the
// loss-curve plotting tools:
//   { "start_time", "end_time", "args", "records": [
//       { "epoch", "time", "lr", "val_loss", "ppl" }, ... ] }

use serde::{Deserialize, Serialize};

/// Validation result for a single epoch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingRecord {
    /// Epoch number, starting at 1
    pub epoch: usize,

    /// Seconds since training started
    pub time: f64,

    /// Learning rate the epoch was trained with
    pub lr: f64,

    /// Mean negative log-likelihood on the validation stream
    pub val_loss: f64,

    /// exp(val_loss)
    pub ppl: f64,
}

impl TrainingRecord {
    pub fn new(epoch: usize, time: f64, lr: f64, val_loss: f64) -> Self {
        Self { epoch, time, lr, val_loss, ppl: perplexity(val_loss) }
    }
}

/// Everything written by a ReportSink at the end of a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingReport {
    /// Unix timestamp (seconds) when the epoch loop started
    pub start_time: f64,
    /// Unix timestamp (seconds) when the report was assembled
    pub end_time: f64,
    /// The run configuration, serialised as-is
    pub args: serde_json::Value,
    pub records: Vec<TrainingRecord>,
}

/// exp(loss); lower is better.
pub fn perplexity(loss: f64) -> f64 {
    loss.exp()
}
