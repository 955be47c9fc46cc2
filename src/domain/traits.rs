// ============================================================
// Layer 3 — Core Traits (Abstractions)
// ============================================================
// Seams between the training core and its collaborators. The
// core only ever sees these traits:
//   - Dictionary        implements Vocabulary
//   - JsonReportWriter  implements ReportSink
// Checkpoint storage lives in infra because it handles burn
// modules, which this layer never names.

use anyhow::Result;
use crate::domain::record::TrainingReport;

// ─── Vocabulary ───────────────────────────────────────────────────────────────
/// Reverse mapping from token index to its text form.
pub trait Vocabulary {
    /// Number of distinct tokens (V).
    fn len(&self) -> usize;

    /// Text for `index`, or None when it is outside the vocabulary.
    fn token(&self, index: usize) -> Option<&str>;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ─── ReportSink ───────────────────────────────────────────────────────────────
/// Receives the full training report once, after the epoch loop ends.
pub trait ReportSink {
    fn write_report(&self, report: &TrainingReport) -> Result<()>;
}
