// ============================================================
// Layer 4 — Data Pipeline
// ============================================================
// From text files to BPTT windows:
//
//   train.txt / valid.txt / test.txt
//       │
//       ▼
//   Corpus        → word-level tokens, <eos> per line, Dictionary
//       │
//       ▼
//   batchify      → (rows × width) matrix, time-leading
//       │
//       ▼
//   get_window    → (input, target) pairs of at most bptt rows
//       │
//       ▼
//   Window::to_tensors → Int tensors for the model
//
// Reference: Rust Book §13 (Iterators and Closures)

/// Reads the three corpus splits and builds the dictionary
pub mod corpus;

/// Column reshaping and BPTT window slicing
pub mod batcher;
