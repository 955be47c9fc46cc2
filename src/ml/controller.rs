// ============================================================
// Layer 5 — Epoch Controller
// ============================================================
// Drives train_epoch across epochs and keeps the best model.
//
//   Running ──(val improves)──▶ save checkpoint, stay Running
//      │
//      └──(val ≥ best)──▶ Annealing: lr /= 4 ──▶ Running next epoch
//
//   all epochs done / cancellation seen ──▶ Stopped:
//       reload best checkpoint, evaluate once on the test stream
//
// The mutable run state (epoch, lr, best loss, records) lives in
// an explicit ControllerContext, not in globals.
//
// Cancellation is cooperative: the token is polled before each
// epoch starts, never in the middle of one.

use std::time::Instant;

use anyhow::Result;
use burn::{
    module::AutodiffModule,
    optim::SgdConfig,
    tensor::backend::AutodiffBackend,
};

use crate::data::batcher::BatchedStream;
use crate::domain::{
    cancellation::CancellationToken,
    record::{perplexity, TrainingRecord},
};
use crate::error::EngineError;
use crate::infra::{checkpoint::CheckpointStore, metrics::MetricsLogger};
use crate::ml::model::LanguageModel;
use crate::ml::trainer::{evaluate, train_epoch, LoopConfig};

const ANNEAL_FACTOR: f64 = 4.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerState {
    Running,
    Annealing,
    Stopped,
}

/// What the controller did with one epoch's validation loss.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EpochVerdict {
    Improved,
    Annealed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// Every configured epoch ran
    Completed,
    /// The cancellation token was set
    Interrupted,
}

/// Mutable training state, passed around explicitly.
#[derive(Debug, Clone)]
pub struct ControllerContext {
    /// Last epoch started (1-based, 0 before the first)
    pub epoch:         usize,
    pub lr:            f64,
    pub best_val_loss: Option<f64>,
    pub state:         ControllerState,
    pub records:       Vec<TrainingRecord>,
}

impl ControllerContext {
    pub fn new(lr: f64) -> Self {
        Self {
            epoch:         0,
            lr,
            best_val_loss: None,
            state:         ControllerState::Running,
            records:       Vec::new(),
        }
    }

    fn begin_epoch(&mut self, epoch: usize) {
        self.epoch = epoch;
        self.state = ControllerState::Running;
    }

    /// Apply the improvement rule to a finished epoch's validation loss.
    /// A NaN/Inf loss is rejected and leaves the state untouched.
    pub fn observe(&mut self, val_loss: f64) -> Result<EpochVerdict, EngineError> {
        if !val_loss.is_finite() {
            return Err(EngineError::NumericalInstability {
                epoch: self.epoch, window: 0, quantity: "validation loss", value: val_loss,
            });
        }
        Ok(match self.best_val_loss {
            Some(best) if val_loss >= best => {
                self.lr /= ANNEAL_FACTOR;
                self.state = ControllerState::Annealing;
                EpochVerdict::Annealed
            }
            _ => {
                self.best_val_loss = Some(val_loss);
                EpochVerdict::Improved
            }
        })
    }
}

/// Everything a finished run hands back.
pub struct TrainingOutcome<B: AutodiffBackend> {
    /// Best checkpoint, reloaded
    pub model:     LanguageModel<B>,
    pub context:   ControllerContext,
    pub test_loss: f64,
    pub stop:      StopReason,
}

impl<B: AutodiffBackend> TrainingOutcome<B> {
    pub fn test_ppl(&self) -> f64 {
        perplexity(self.test_loss)
    }
}

pub struct EpochController<'s, B: AutodiffBackend, S: CheckpointStore<B>> {
    store:    &'s mut S,
    metrics:  Option<MetricsLogger>,
    cancel:   CancellationToken,
    device:   B::Device,
    epochs:   usize,
    loop_cfg: LoopConfig,
}

impl<'s, B: AutodiffBackend, S: CheckpointStore<B>> EpochController<'s, B, S> {
    pub fn new(
        store:    &'s mut S,
        cancel:   CancellationToken,
        device:   B::Device,
        epochs:   usize,
        loop_cfg: LoopConfig,
    ) -> Self {
        Self { store, metrics: None, cancel, device, epochs, loop_cfg }
    }

    pub fn with_metrics(mut self, metrics: MetricsLogger) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn run(
        self,
        model: LanguageModel<B>,
        lr:    f64,
        train: &BatchedStream,
        valid: &BatchedStream,
        test:  &BatchedStream,
    ) -> Result<TrainingOutcome<B>> {
        let mut ctx   = ControllerContext::new(lr);
        let mut model = model;
        let mut optim = SgdConfig::new().init::<B, LanguageModel<B>>();
        let mut stop  = StopReason::Completed;
        let started   = Instant::now();

        for epoch in 1..=self.epochs {
            if self.cancel.is_cancelled() {
                tracing::info!("Exiting from training early");
                stop = StopReason::Interrupted;
                break;
            }
            ctx.begin_epoch(epoch);
            let epoch_start = Instant::now();

            let (trained, stats) = train_epoch(
                model, &mut optim, train, ctx.lr, epoch, &self.loop_cfg, &self.device,
            )?;
            model = trained;
            tracing::debug!("Epoch {} trained over {} windows", epoch, stats.windows);

            let val_loss = evaluate(&model.valid(), valid, self.loop_cfg.bptt, epoch, &self.device)?;

            println!("{}", "-".repeat(89));
            println!(
                "| end of epoch {:3} | time: {:5.2}s | valid loss {:5.2} | valid ppl {:8.2}",
                epoch, epoch_start.elapsed().as_secs_f64(), val_loss, perplexity(val_loss),
            );
            println!("{}", "-".repeat(89));

            let record = TrainingRecord::new(epoch, started.elapsed().as_secs_f64(), ctx.lr, val_loss);
            if let Some(metrics) = &self.metrics {
                if let Err(e) = metrics.log(&record) {
                    tracing::warn!("Could not log metrics for epoch {}: {:#}", epoch, e);
                }
            }
            ctx.records.push(record);

            match ctx.observe(val_loss)? {
                EpochVerdict::Improved => {
                    self.store.save(&model)?;
                    tracing::info!("New best validation loss {:.4}; checkpoint saved", val_loss);
                }
                EpochVerdict::Annealed => {
                    tracing::info!("No improvement; learning rate annealed to {}", ctx.lr);
                }
            }
        }
        ctx.state = ControllerState::Stopped;

        let model = if self.store.has_checkpoint() {
            self.store.load(model, &self.device)?
        } else {
            tracing::warn!("No checkpoint was saved; evaluating the current model");
            model
        };

        let test_loss = evaluate(&model.valid(), test, self.loop_cfg.bptt, ctx.epoch, &self.device)?;
        println!("{}", "=".repeat(89));
        println!(
            "| End of training | test loss {:5.2} | test ppl {:8.2}",
            test_loss, perplexity(test_loss),
        );
        println!("{}", "=".repeat(89));

        Ok(TrainingOutcome { model, context: ctx, test_loss, stop })
    }
}
