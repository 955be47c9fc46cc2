// ============================================================
// Layer 5 — ML / Model Layer (Burn)
// ============================================================
// This layer contains ALL Burn tensor code. The domain and
// application layers only see the types exported from here.
//
//   attention.rs  — softmax and scaled dot-product attention over
//                   dense matrices (no state)
//
//   model.rs      — LanguageModel: Recurrent (RNN_TANH, RNN_RELU,
//                   LSTM, GRU) | Transformer, with one forward
//                   contract and explicit hidden-state repackaging
//
//   clip.rs       — global L2 gradient norm and clip factor
//
//   trainer.rs    — one truncated-BPTT epoch with clipped SGD,
//                   and the evaluation pass
//
//   controller.rs — epoch loop: best-checkpoint tracking, lr
//                   annealing, cancellation, final test pass
//
//   generator.rs  — temperature-scaled multinomial sampling
//
// Backends: Autodiff<NdArray> for training and NdArray for
// inference. Build with `--features wgpu` to run on the GPU.
//
// Reference: Burn Book §3 (Building Blocks), §5 (Training)

/// Softmax and scaled dot-product attention
pub mod attention;

/// Recurrent and Transformer language models
pub mod model;

/// Global gradient-norm clipping
pub mod clip;

/// Truncated BPTT training and evaluation passes
pub mod trainer;

/// Epoch state machine around the training loop
pub mod controller;

/// Autoregressive sampling
pub mod generator;

#[cfg(not(feature = "wgpu"))]
pub type InferBackend = burn::backend::NdArray;

#[cfg(feature = "wgpu")]
pub type InferBackend = burn::backend::Wgpu;

pub type TrainBackend = burn::backend::Autodiff<InferBackend>;
