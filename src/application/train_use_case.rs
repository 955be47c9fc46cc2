// ============================================================
// Layer 2 — TrainUseCase
// ============================================================
// Orchestrates a full training run in order:
//
//   Step 1: Load the corpus               (Layer 4 - data)
//   Step 2: Batchify train/valid/test     (Layer 4 - data)
//   Step 3: Seed and build the model      (Layer 5 - ml)
//   Step 4: Wire checkpoint + metrics     (Layer 6 - infra)
//   Step 5: Run the epoch controller      (Layer 5 - ml)
//   Step 6: Write report.json             (Layer 6 - infra)
//
// Reference: Burn Book §5 (Training)

use anyhow::Result;
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use burn::tensor::backend::Backend;
use serde::{Deserialize, Serialize};

use crate::data::{batcher::batchify, corpus::Corpus};
use crate::domain::{
    cancellation::CancellationToken,
    model_kind::ModelKind,
    record::{perplexity, TrainingReport},
    traits::ReportSink,
};
use crate::infra::{
    checkpoint::FileCheckpointStore,
    metrics::MetricsLogger,
    report::JsonReportWriter,
};
use crate::ml::{
    controller::{EpochController, StopReason},
    model::LanguageModelConfig,
    trainer::LoopConfig,
    TrainBackend,
};

// ─── Training Configuration ──────────────────────────────────────────────────
// Serialisable so it can be embedded as "args" in report.json.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainConfig {
    /// Directory holding train.txt, valid.txt and test.txt
    pub data:            PathBuf,
    pub model:           ModelKind,
    pub emsize:          usize,
    pub nhid:            usize,
    pub nlayers:         usize,
    pub lr:              f64,
    pub clip:            f64,
    pub epochs:          usize,
    pub batch_size:      usize,
    pub eval_batch_size: usize,
    pub bptt:            usize,
    pub dropout:         f64,
    pub tied:            bool,
    pub seed:            u64,
    pub log_interval:    usize,
    /// Checkpoint base path; weights go to <save>.mpk.gz, config to <save>.json
    pub save:            PathBuf,
    pub nhead:           usize,
    pub dry_run:         bool,
    /// Where report.json and metrics.csv go; None skips both
    pub report_dir:      Option<PathBuf>,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            data:            PathBuf::from("data/wikitext-2"),
            model:           ModelKind::Transformer,
            emsize:          200,
            nhid:            200,
            nlayers:         2,
            lr:              20.0,
            clip:            0.25,
            epochs:          40,
            batch_size:      20,
            eval_batch_size: 10,
            bptt:            35,
            dropout:         0.2,
            tied:            false,
            seed:            1111,
            log_interval:    200,
            save:            PathBuf::from("checkpoints/model"),
            nhead:           2,
            dry_run:         false,
            report_dir:      None,
        }
    }
}

impl TrainConfig {
    pub fn model_config(&self, ntoken: usize) -> LanguageModelConfig {
        LanguageModelConfig::new(self.model, ntoken, self.emsize, self.nhid, self.nlayers)
            .with_nhead(self.nhead)
            .with_dropout(self.dropout)
            .with_tied(self.tied)
    }

    fn loop_config(&self) -> LoopConfig {
        LoopConfig {
            bptt:         self.bptt,
            clip:         self.clip,
            log_interval: self.log_interval,
            dry_run:      self.dry_run,
        }
    }
}

/// What the CLI reports once training has finished.
#[derive(Debug, Clone)]
pub struct TrainSummary {
    pub epochs_run:    usize,
    pub best_val_loss: Option<f64>,
    pub test_loss:     f64,
    pub test_ppl:      f64,
    pub stop:          StopReason,
}

// ─── TrainUseCase ─────────────────────────────────────────────────────────────
pub struct TrainUseCase {
    config: TrainConfig,
    cancel: CancellationToken,
}

impl TrainUseCase {
    pub fn new(config: TrainConfig) -> Self {
        Self { config, cancel: CancellationToken::new() }
    }

    /// Use `cancel` to stop the run at the next epoch boundary.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn execute(&self) -> Result<TrainSummary> {
        let cfg = &self.config;

        // ── Step 1: Corpus ────────────────────────────────────────────────────
        tracing::info!("Loading corpus from '{}'", cfg.data.display());
        let corpus = Corpus::load(&cfg.data)?;

        // ── Step 2: Column-batched streams ────────────────────────────────────
        let train = batchify(&corpus.train, cfg.batch_size)?;
        let valid = batchify(&corpus.valid, cfg.eval_batch_size)?;
        let test  = batchify(&corpus.test,  cfg.eval_batch_size)?;
        tracing::info!(
            "Batched: train {}x{}, valid {}x{}, test {}x{}",
            train.rows(), train.width(), valid.rows(), valid.width(), test.rows(), test.width(),
        );

        // ── Step 3: Model ─────────────────────────────────────────────────────
        let device = Default::default();
        TrainBackend::seed(&device, cfg.seed);
        let model_cfg = cfg.model_config(corpus.vocab_size());
        let model = model_cfg.init::<TrainBackend>(&device)?;
        tracing::info!("Model ready: {} with {} layers, vocab={}", cfg.model, cfg.nlayers, corpus.vocab_size());

        // ── Step 4: Checkpoint store + metrics ────────────────────────────────
        let mut store = FileCheckpointStore::new(&cfg.save, model_cfg);
        let mut controller = EpochController::new(
            &mut store, self.cancel.clone(), device, cfg.epochs, cfg.loop_config(),
        );
        if let Some(dir) = &cfg.report_dir {
            match MetricsLogger::new(dir) {
                Ok(metrics) => controller = controller.with_metrics(metrics),
                Err(e) => tracing::warn!("Metrics CSV disabled: {:#}", e),
            }
        }

        // ── Step 5: Epoch loop ────────────────────────────────────────────────
        let start_time = unix_seconds();
        let outcome = controller.run(model, cfg.lr, &train, &valid, &test)?;

        // ── Step 6: Report ────────────────────────────────────────────────────
        if let Some(dir) = &cfg.report_dir {
            let report = TrainingReport {
                start_time,
                end_time: unix_seconds(),
                args:     serde_json::to_value(cfg)?,
                records:  outcome.context.records.clone(),
            };
            JsonReportWriter::new(dir).write_report(&report)?;
        }

        Ok(TrainSummary {
            epochs_run:    outcome.context.records.len(),
            best_val_loss: outcome.context.best_val_loss,
            test_loss:     outcome.test_loss,
            test_ppl:      perplexity(outcome.test_loss),
            stop:          outcome.stop,
        })
    }
}

fn unix_seconds() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}
