// ============================================================
// Layer 6 — Checkpoint Stores
// ============================================================
// The epoch controller keeps exactly one "best" snapshot. It
// calls save() whenever validation loss improves and load()
// once, after the epoch loop ends.
//
//   FileCheckpointStore   — weights via Burn's named MessagePack
//                           recorder (gzip), plus the model config
//                           as a JSON sidecar so `generate` can
//                           rebuild the architecture:
//                             <path>.mpk.gz   ← weights
//                             <path>.json     ← LanguageModelConfig
//
//   MemoryCheckpointStore — keeps a clone of the model in memory.
//                           Used by tests and short experiments.
//
// Reference: Burn Book §5 (Records and Checkpointing)

use anyhow::{bail, Context, Result};
use std::{fs, path::PathBuf};
use burn::{
    prelude::*,
    record::{FullPrecisionSettings, NamedMpkGzFileRecorder, Recorder},
};

use crate::ml::model::{LanguageModel, LanguageModelConfig};

type WeightRecorder = NamedMpkGzFileRecorder<FullPrecisionSettings>;

/// Persistence for the best model seen so far.
pub trait CheckpointStore<B: Backend> {
    /// Replace the stored snapshot with `model`.
    fn save(&mut self, model: &LanguageModel<B>) -> Result<()>;

    /// Load the stored snapshot into `template` (same architecture).
    fn load(&self, template: LanguageModel<B>, device: &B::Device) -> Result<LanguageModel<B>>;

    /// Whether save() has succeeded at least once.
    fn has_checkpoint(&self) -> bool;
}

// ─── File store ───────────────────────────────────────────────────────────────
pub struct FileCheckpointStore {
    /// Base path without extension; the recorder appends `.mpk.gz`
    path:   PathBuf,
    config: LanguageModelConfig,
    saved:  bool,
}

impl FileCheckpointStore {
    pub fn new(path: impl Into<PathBuf>, config: LanguageModelConfig) -> Self {
        Self { path: path.into(), config, saved: false }
    }

    fn config_path(&self) -> PathBuf {
        self.path.with_extension("json")
    }

    /// Read the config sidecar written next to the weights at `path`.
    pub fn load_config(path: impl Into<PathBuf>) -> Result<LanguageModelConfig> {
        let path = path.into().with_extension("json");
        let json = fs::read_to_string(&path)
            .with_context(|| {
                format!(
                    "Cannot read model config from '{}'. \
                     Make sure you have run 'train' before 'generate'.",
                    path.display()
                )
            })?;
        serde_json::from_str(&json)
            .with_context(|| format!("Malformed model config in '{}'", path.display()))
    }
}

impl<B: Backend> CheckpointStore<B> for FileCheckpointStore {
    fn save(&mut self, model: &LanguageModel<B>) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("Cannot create checkpoint directory '{}'", parent.display()))?;
        }

        WeightRecorder::new()
            .record(model.clone().into_record(), self.path.clone())
            .with_context(|| {
                format!("Failed to save checkpoint to '{}'", self.path.display())
            })?;

        let config_path = self.config_path();
        fs::write(&config_path, serde_json::to_string_pretty(&self.config)?)
            .with_context(|| format!("Cannot write config to '{}'", config_path.display()))?;

        self.saved = true;
        tracing::debug!("Saved checkpoint to '{}'", self.path.display());
        Ok(())
    }

    fn load(&self, template: LanguageModel<B>, device: &B::Device) -> Result<LanguageModel<B>> {
        let record = WeightRecorder::new()
            .load(self.path.clone(), device)
            .with_context(|| {
                format!("Cannot load checkpoint '{}'. Have you trained the model first?",
                    self.path.display())
            })?;
        tracing::debug!("Loaded checkpoint from '{}'", self.path.display());
        Ok(template.load_record(record))
    }

    fn has_checkpoint(&self) -> bool {
        self.saved
    }
}

// ─── Memory store ─────────────────────────────────────────────────────────────
pub struct MemoryCheckpointStore<B: Backend> {
    best: Option<LanguageModel<B>>,
    /// Number of successful saves
    pub saves: usize,
}

impl<B: Backend> MemoryCheckpointStore<B> {
    pub fn new() -> Self {
        Self { best: None, saves: 0 }
    }
}

impl<B: Backend> Default for MemoryCheckpointStore<B> {
    fn default() -> Self {
        Self::new()
    }
}

impl<B: Backend> CheckpointStore<B> for MemoryCheckpointStore<B> {
    fn save(&mut self, model: &LanguageModel<B>) -> Result<()> {
        self.best = Some(model.clone());
        self.saves += 1;
        Ok(())
    }

    fn load(&self, _template: LanguageModel<B>, _device: &B::Device) -> Result<LanguageModel<B>> {
        match &self.best {
            Some(model) => Ok(model.clone()),
            None => bail!("No checkpoint has been saved yet"),
        }
    }

    fn has_checkpoint(&self) -> bool {
        self.best.is_some()
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;
    use crate::domain::model_kind::ModelKind;

    type B = NdArray;

    fn config() -> LanguageModelConfig {
        LanguageModelConfig::new(ModelKind::Gru, 7, 4, 4, 1).with_dropout(0.0)
    }

    fn weights(model: &LanguageModel<B>) -> Vec<f32> {
        let input = Tensor::<B, 2, Int>::from_ints([[1, 2], [3, 4]], &Default::default());
        let (out, _) = model.forward(input, None).unwrap();
        out.into_data().to_vec().unwrap()
    }

    #[test]
    fn test_file_store_round_trip() {
        let device = Default::default();
        let dir = std::env::temp_dir().join(format!("word_lm_ckpt_{}", std::process::id()));
        let base = dir.join("model");

        let model = config().init::<B>(&device).unwrap();
        let mut store = FileCheckpointStore::new(&base, config());
        assert!(!CheckpointStore::<B>::has_checkpoint(&store));
        store.save(&model).unwrap();
        assert!(CheckpointStore::<B>::has_checkpoint(&store));

        // A freshly initialised model has different weights until loaded
        let fresh = config().init::<B>(&device).unwrap();
        let loaded = store.load(fresh, &device).unwrap();
        let (a, b) = (weights(&model), weights(&loaded));
        assert!(a.iter().zip(&b).all(|(x, y)| (x - y).abs() < 1e-6));

        let cfg = FileCheckpointStore::load_config(&base).unwrap();
        assert_eq!(cfg.kind, ModelKind::Gru);
        assert_eq!(cfg.ntoken, 7);

        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_missing_checkpoint_is_an_error() {
        let device = Default::default();
        let store = FileCheckpointStore::new(std::env::temp_dir().join("word_lm_missing/model"), config());
        let template = config().init::<B>(&device).unwrap();
        assert!(store.load(template, &device).is_err());
        assert!(FileCheckpointStore::load_config("/nonexistent/word_lm/model").is_err());
    }

    #[test]
    fn test_memory_store_keeps_latest_save() {
        let device = Default::default();
        let mut store = MemoryCheckpointStore::<B>::new();
        let template = config().init::<B>(&device).unwrap();
        assert!(store.load(template.clone(), &device).is_err());

        let first  = config().init::<B>(&device).unwrap();
        let second = config().init::<B>(&device).unwrap();
        store.save(&first).unwrap();
        store.save(&second).unwrap();
        assert_eq!(store.saves, 2);
        assert_eq!(weights(&store.load(template, &device).unwrap()), weights(&second));
    }
}
