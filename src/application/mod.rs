// ============================================================
// Layer 2 — Application / Use Cases
// ============================================================
// Orchestrates the other layers to accomplish one goal each:
// train a model, or sample text from a trained one.
//
// Rules for this layer:
//   - No tensor math here (that's Layer 5)
//   - No clap types here (that's Layer 1)
//   - Only workflow coordination
//
// Reference: Clean Architecture pattern
//            Rust Book §7 (Module System)

// The training workflow
pub mod train_use_case;

// The text generation workflow
pub mod generate_use_case;
