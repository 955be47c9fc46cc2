// ============================================================
// Layer 2 — GenerateUseCase
// ============================================================
// Samples text from a trained checkpoint:
//
//   Step 1: Read the model config sidecar  (Layer 6 - infra)
//   Step 2: Rebuild the dictionary         (Layer 4 - data)
//   Step 3: Rebuild the model, load weights (Layer 5 + 6)
//   Step 4: Sample and write the words     (Layer 5 - ml)
//
// The dictionary is rebuilt from the same data directory used
// for training; first-seen indexing makes it identical.

use anyhow::{Context, Result};
use std::{fs, path::PathBuf};

use burn::tensor::backend::Backend;
use rand::{rngs::StdRng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::data::corpus::Corpus;
use crate::error::{ensure_precondition, EngineError};
use crate::infra::checkpoint::{CheckpointStore, FileCheckpointStore};
use crate::ml::{
    generator::{render, Generator, MIN_TEMPERATURE},
    InferBackend,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateConfig {
    /// Directory holding the training corpus
    pub data:         PathBuf,
    /// Checkpoint base path written by `train --save`
    pub checkpoint:   PathBuf,
    /// Output file for the generated text
    pub outf:         PathBuf,
    pub words:        usize,
    pub seed:         u64,
    pub temperature:  f64,
    pub log_interval: usize,
}

impl Default for GenerateConfig {
    fn default() -> Self {
        Self {
            data:         PathBuf::from("data/wikitext-2"),
            checkpoint:   PathBuf::from("checkpoints/model"),
            outf:         PathBuf::from("generated.txt"),
            words:        1000,
            seed:         1111,
            temperature:  1.0,
            log_interval: 100,
        }
    }
}

pub struct GenerateUseCase {
    config: GenerateConfig,
}

impl GenerateUseCase {
    pub fn new(config: GenerateConfig) -> Self {
        Self { config }
    }

    /// Returns the number of words written.
    pub fn execute(&self) -> Result<usize> {
        let cfg = &self.config;
        ensure_precondition!(
            cfg.temperature >= MIN_TEMPERATURE,
            "temperature has to be greater or equal {MIN_TEMPERATURE}, got {}", cfg.temperature,
        );

        // ── Step 1 + 2: Config and dictionary ─────────────────────────────────
        let model_cfg = FileCheckpointStore::load_config(&cfg.checkpoint)?;
        let corpus = Corpus::load(&cfg.data)?;
        if corpus.vocab_size() != model_cfg.ntoken {
            return Err(EngineError::precondition(format!(
                "corpus vocabulary ({}) does not match the checkpoint ({})",
                corpus.vocab_size(), model_cfg.ntoken,
            )).into());
        }

        // ── Step 3: Model ─────────────────────────────────────────────────────
        let device = Default::default();
        InferBackend::seed(&device, cfg.seed);
        let template = model_cfg.init::<InferBackend>(&device)?;
        let store = FileCheckpointStore::new(&cfg.checkpoint, model_cfg);
        let model = store.load(template, &device)?;

        // ── Step 4: Sample ────────────────────────────────────────────────────
        let mut rng = StdRng::seed_from_u64(cfg.seed);
        let words = Generator::new(&model, device, cfg.temperature)?
            .with_log_interval(cfg.log_interval)
            .generate(cfg.words, &mut rng)?;

        let text = render(&words, &corpus.dictionary);
        fs::write(&cfg.outf, text)
            .with_context(|| format!("Cannot write generated text to '{}'", cfg.outf.display()))?;
        tracing::info!("Wrote {} words to '{}'", words.len(), cfg.outf.display());

        Ok(words.len())
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::train_use_case::{TrainConfig, TrainUseCase};
    use crate::domain::model_kind::ModelKind;

    #[test]
    fn test_generate_from_trained_checkpoint() {
        let root = std::env::temp_dir().join(format!("word_lm_generate_{}", std::process::id()));
        fs::remove_dir_all(&root).ok();
        let data = root.join("data");
        fs::create_dir_all(&data).unwrap();
        let line = "a b c d e f g h\n";
        fs::write(data.join("train.txt"), line.repeat(10)).unwrap();
        fs::write(data.join("valid.txt"), line.repeat(3)).unwrap();
        fs::write(data.join("test.txt"),  line.repeat(3)).unwrap();

        let train = TrainConfig {
            data:            data.clone(),
            model:           ModelKind::Transformer,
            emsize:          8,
            nhid:            8,
            nlayers:         1,
            epochs:          1,
            batch_size:      3,
            eval_batch_size: 2,
            bptt:            5,
            dropout:         0.0,
            log_interval:    0,
            dry_run:         true,
            save:            root.join("model"),
            ..TrainConfig::default()
        };
        TrainUseCase::new(train).execute().unwrap();

        let cfg = GenerateConfig {
            data,
            checkpoint:   root.join("model"),
            outf:         root.join("out.txt"),
            words:        25,
            log_interval: 0,
            ..GenerateConfig::default()
        };
        assert_eq!(GenerateUseCase::new(cfg).execute().unwrap(), 25);

        let text = fs::read_to_string(root.join("out.txt")).unwrap();
        assert_eq!(text.split_whitespace().count(), 25);
        assert_eq!(text.matches('\n').count(), 1);

        fs::remove_dir_all(&root).ok();
    }

    #[test]
    fn test_temperature_below_floor_fails() {
        let cfg = GenerateConfig {
            checkpoint: PathBuf::from("/nonexistent/word_lm/model"),
            temperature: 0.0,
            ..GenerateConfig::default()
        };
        // Rejected before any file is touched
        let err = GenerateUseCase::new(cfg).execute().unwrap_err();
        assert!(matches!(err.downcast_ref::<EngineError>(), Some(EngineError::Precondition(_))));
    }
}
