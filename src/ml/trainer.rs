// ============================================================
// Layer 5 — Training Loop (truncated BPTT)
// ============================================================
// One epoch over a batched stream, window by window:
//
//   hidden ← repackage(hidden)          cut the graph at the boundary
//   log_p, hidden ← model(input, hidden)
//   loss  ← NLL(log_p, targets)
//   grads ← ∂loss/∂θ
//   θ     ← θ − lr · clip_scale(‖grads‖₂) · grads
//
// Training runs on the Autodiff backend (dropout active).
// Evaluation runs on model.valid() — the inner backend, so no
// graph is recorded and dropout is disabled.
//
// A NaN/Inf loss or gradient norm aborts the epoch BEFORE the
// update is applied. A NaN/Inf validation loss is an error too,
// never a score.

use std::time::Instant;

use burn::{
    optim::{GradientsParams, Optimizer},
    prelude::*,
    tensor::backend::AutodiffBackend,
};

use crate::data::batcher::BatchedStream;
use crate::domain::record::perplexity;
use crate::error::{ensure_precondition, EngineError};
use crate::ml::clip::{clip_scale, global_grad_norm};
use crate::ml::model::{Hidden, LanguageModel};

/// Knobs that shape a single pass over the data.
#[derive(Debug, Clone)]
pub struct LoopConfig {
    /// Window length (truncated BPTT horizon)
    pub bptt:         usize,
    /// Max global gradient norm
    pub clip:         f64,
    /// Windows between progress lines; 0 disables them
    pub log_interval: usize,
    /// Stop after the first window
    pub dry_run:      bool,
}

/// What one training pass did.
#[derive(Debug, Clone, PartialEq)]
pub struct EpochStats {
    pub windows:   usize,
    pub mean_loss: f64,
}

/// Mean negative log-likelihood of `targets` under `log_probs` [n, V].
pub fn nll_loss<B: Backend>(log_probs: Tensor<B, 2>, targets: Tensor<B, 1, Int>) -> Tensor<B, 1> {
    let n = targets.dims()[0];
    log_probs.gather(1, targets.reshape([n, 1])).mean().neg()
}

/// Train `model` for one epoch and hand back the updated model.
pub fn train_epoch<B, O>(
    mut model: LanguageModel<B>,
    optim:     &mut O,
    data:      &BatchedStream,
    lr:        f64,
    epoch:     usize,
    cfg:       &LoopConfig,
    device:    &B::Device,
) -> Result<(LanguageModel<B>, EpochStats), EngineError>
where
    B: AutodiffBackend,
    O: Optimizer<LanguageModel<B>, B>,
{
    ensure_precondition!(cfg.bptt >= 1, "bptt must be at least 1");
    ensure_precondition!(
        data.rows() >= 2,
        "training stream has {} rows; at least 2 are needed", data.rows(),
    );
    ensure_precondition!(
        data.max_token().map_or(true, |t| t < model.ntoken()),
        "token {:?} is outside the model vocabulary of {}", data.max_token(), model.ntoken(),
    );

    let n_windows = data.num_windows(cfg.bptt)?;
    let mut hidden = model.init_hidden(data.width(), device);

    let mut windows    = 0usize;
    let mut loss_sum   = 0.0f64;
    let mut interval   = 0.0f64;
    let mut started_at = Instant::now();

    for (i, window) in data.windows(cfg.bptt)?.enumerate() {
        let (input, targets) = window.to_tensors::<B>(device);

        let (log_probs, next) = model.forward(input, hidden.map(Hidden::repackage))?;
        hidden = next;

        let loss = nll_loss(log_probs, targets);
        let loss_val = loss.clone().into_scalar().elem::<f64>();
        if !loss_val.is_finite() {
            return Err(EngineError::NumericalInstability {
                epoch, window: i, quantity: "loss", value: loss_val,
            });
        }

        // ── Backward + clipped SGD ────────────────────────────────────────────
        let grads = loss.backward();
        let norm = global_grad_norm(&model, &grads);
        if !norm.is_finite() {
            return Err(EngineError::NumericalInstability {
                epoch, window: i, quantity: "gradient norm", value: norm,
            });
        }
        let grads = GradientsParams::from_grads(grads, &model);
        model = optim.step(lr * clip_scale(norm, cfg.clip), model, grads);

        windows  += 1;
        loss_sum += loss_val;
        interval += loss_val;

        if cfg.log_interval > 0 && windows % cfg.log_interval == 0 {
            let cur_loss = interval / cfg.log_interval as f64;
            let ms_per_batch = started_at.elapsed().as_secs_f64() * 1000.0 / cfg.log_interval as f64;
            tracing::info!(
                "| epoch {:3} | {:5}/{:5} batches | lr {:02.2} | ms/batch {:5.2} | loss {:5.2} | ppl {:8.2}",
                epoch, windows, n_windows, lr, ms_per_batch, cur_loss, perplexity(cur_loss),
            );
            interval   = 0.0;
            started_at = Instant::now();
        }

        if cfg.dry_run {
            break;
        }
    }

    let mean_loss = if windows > 0 { loss_sum / windows as f64 } else { f64::NAN };
    Ok((model, EpochStats { windows, mean_loss }))
}

/// Average loss over a stream without recording gradients.
///
/// Each window's mean NLL is weighted by its length, and the sum is
/// divided by `rows − 1` (the number of predicted time steps).
/// `epoch` only labels a numerical-instability error.
pub fn evaluate<B: Backend>(
    model:  &LanguageModel<B>,
    data:   &BatchedStream,
    bptt:   usize,
    epoch:  usize,
    device: &B::Device,
) -> Result<f64, EngineError> {
    ensure_precondition!(bptt >= 1, "bptt must be at least 1");
    ensure_precondition!(
        data.rows() >= 2,
        "evaluation stream has {} rows; at least 2 are needed", data.rows(),
    );
    ensure_precondition!(
        data.max_token().map_or(true, |t| t < model.ntoken()),
        "token {:?} is outside the model vocabulary of {}", data.max_token(), model.ntoken(),
    );

    let mut hidden = model.init_hidden(data.width(), device);
    let mut total = 0.0f64;

    for (i, window) in data.windows(bptt)?.enumerate() {
        let (input, targets) = window.to_tensors::<B>(device);
        let (log_probs, next) = model.forward(input, hidden.map(Hidden::repackage))?;
        hidden = next;

        let loss = nll_loss(log_probs, targets).into_scalar().elem::<f64>();
        if !loss.is_finite() {
            return Err(EngineError::NumericalInstability {
                epoch, window: i, quantity: "validation loss", value: loss,
            });
        }
        total += window.len as f64 * loss;
    }

    let mean = total / (data.rows() - 1) as f64;
    if !mean.is_finite() {
        return Err(EngineError::NumericalInstability {
            epoch, window: 0, quantity: "validation loss", value: mean,
        });
    }
    Ok(mean)
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::{Autodiff, NdArray};
    use burn::module::{AutodiffModule, ModuleMapper, Param};
    use burn::optim::SgdConfig;

    use crate::data::batcher::batchify;
    use crate::domain::model_kind::ModelKind;
    use crate::ml::model::LanguageModelConfig;

    type B = Autodiff<NdArray>;

    fn stream() -> Vec<usize> {
        (0..120).map(|i| (i * 7 + i / 5) % 9).collect()
    }

    fn cfg(dry_run: bool) -> LoopConfig {
        LoopConfig { bptt: 4, clip: 0.25, log_interval: 2, dry_run }
    }

    fn model(kind: ModelKind) -> LanguageModel<B> {
        LanguageModelConfig::new(kind, 9, 8, 8, 1)
            .with_dropout(0.0)
            .with_max_len(32)
            .init::<B>(&Default::default())
            .unwrap()
    }

    #[test]
    fn test_nll_loss_picks_target_column() {
        let device = Default::default();
        let log_probs = Tensor::<NdArray, 2>::from_floats(
            [[(0.25f32).ln(), (0.75f32).ln()], [(0.5f32).ln(), (0.5f32).ln()]],
            &device,
        );
        let targets = Tensor::<NdArray, 1, Int>::from_ints([1, 0], &device);
        let loss = nll_loss(log_probs, targets).into_scalar().elem::<f64>();
        let expected = -((0.75f64).ln() + (0.5f64).ln()) / 2.0;
        assert!((loss - expected).abs() < 1e-5);
    }

    #[test]
    fn test_epoch_is_reproducible() {
        let device = Default::default();
        let train = batchify(&stream(), 4).unwrap();
        let valid = batchify(&stream()[..60], 3).unwrap();

        let mut losses = Vec::new();
        let base = model(ModelKind::Gru);
        for _ in 0..2 {
            let mut optim = SgdConfig::new().init();
            let (trained, stats) =
                train_epoch(base.clone(), &mut optim, &train, 1.0, 1, &cfg(false), &device).unwrap();
            assert_eq!(stats.windows, train.num_windows(4).unwrap());
            losses.push(evaluate(&trained.valid(), &valid, 4, 1, &device).unwrap());
        }
        assert!(losses[0].is_finite());
        assert!((losses[0] - losses[1]).abs() < 1e-9, "{losses:?}");
    }

    #[test]
    fn test_dry_run_stops_after_one_window() {
        let device = Default::default();
        let train = batchify(&stream(), 4).unwrap();
        let mut optim = SgdConfig::new().init();
        let (_, stats) =
            train_epoch(model(ModelKind::Transformer), &mut optim, &train, 1.0, 1, &cfg(true), &device)
                .unwrap();
        assert_eq!(stats.windows, 1);
    }

    #[test]
    fn test_recurrent_evaluation_is_window_independent() {
        // Hidden state carries across windows, so the window length only
        // changes where the graph is cut, not the loss.
        let device = Default::default();
        let data = batchify(&stream(), 3).unwrap();
        let m = model(ModelKind::Lstm).valid();
        let short = evaluate(&m, &data, 3, 1, &device).unwrap();
        let whole = evaluate(&m, &data, data.rows(), 1, &device).unwrap();
        assert!((short - whole).abs() < 1e-4, "{short} vs {whole}");
    }

    /// Multiplies every float parameter by NaN.
    struct Poison;

    impl<BB: Backend> ModuleMapper<BB> for Poison {
        fn map_float<const D: usize>(&mut self, param: Param<Tensor<BB, D>>) -> Param<Tensor<BB, D>> {
            param.map(|t| t.mul_scalar(f32::NAN))
        }
    }

    #[test]
    fn test_non_finite_validation_loss_is_an_error() {
        let device = Default::default();
        let data = batchify(&stream(), 3).unwrap();
        let m = model(ModelKind::Gru).valid().map(&mut Poison);
        let err = evaluate(&m, &data, 4, 3, &device).unwrap_err();
        assert!(matches!(
            err,
            EngineError::NumericalInstability { epoch: 3, window: 0, quantity: "validation loss", .. }
        ));
    }

    #[test]
    fn test_divergence_is_reported_not_applied() {
        // Unclipped steps of size 1e30 blow the ReLU network up within
        // a couple of windows.
        let device = Default::default();
        let train = batchify(&stream(), 4).unwrap();
        let cfg = LoopConfig { bptt: 4, clip: 1e30, log_interval: 0, dry_run: false };
        let mut optim = SgdConfig::new().init();
        let err = train_epoch(model(ModelKind::RnnRelu), &mut optim, &train, 1e30, 1, &cfg, &device)
            .unwrap_err();

        let EngineError::NumericalInstability { epoch, window, quantity, value } = err else {
            panic!("expected numerical instability, got {err:?}");
        };
        assert_eq!(epoch, 1);
        assert!(window >= 1 && window < train.num_windows(4).unwrap());
        assert!(quantity == "loss" || quantity == "gradient norm");
        assert!(!value.is_finite());
    }

    #[test]
    fn test_out_of_vocabulary_tokens_are_rejected() {
        let device = Default::default();
        let data = batchify(&(0..40).collect::<Vec<_>>(), 2).unwrap();
        let mut optim = SgdConfig::new().init();
        let err = train_epoch(model(ModelKind::RnnTanh), &mut optim, &data, 1.0, 1, &cfg(false), &device)
            .unwrap_err();
        assert!(matches!(err, EngineError::Precondition(_)));
    }
}
