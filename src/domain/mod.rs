// ============================================================
// Layer 3 — Domain Layer
// ============================================================
// Plain Rust types and traits shared by every other layer.
//
// Rules for this layer:
//   - NO Burn framework types allowed here
//   - NO file I/O
//   - Only structs, enums and traits
//
// Reference: Rust Book §5 (Structs), §10 (Traits)

// Architecture selector (RNN_TANH, RNN_RELU, LSTM, GRU, Transformer)
pub mod model_kind;

// Per-epoch validation records and the final report
pub mod record;

// Cooperative stop flag polled at epoch boundaries
pub mod cancellation;

// Collaborator abstractions (vocabulary, report sink)
pub mod traits;
