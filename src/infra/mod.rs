// ============================================================
// Layer 6 — Infrastructure Layer
// ============================================================
// File-system collaborators of the training core:
//
//   checkpoint.rs — CheckpointStore trait; file store (Burn named
//                   MessagePack recorder + JSON config sidecar)
//                   and an in-memory store.
//
//   metrics.rs    — per-epoch CSV rows, appended as epochs finish.
//
//   report.rs     — report.json written once at the end of a run.
//
// All I/O errors carry the offending path via anyhow context.

/// Best-model persistence
pub mod checkpoint;

/// Training metrics CSV logger
pub mod metrics;

/// End-of-run JSON report
pub mod report;
