// ============================================================
// Layer 4 — Corpus Loader
// ============================================================
// Reads a word-level corpus from a directory:
//
//   data/
//     train.txt
//     valid.txt
//     test.txt
//
// Every line is split on whitespace and terminated with an
// explicit "<eos>" token, so sentence boundaries are learnable.
// Words receive consecutive indices in first-seen order, with
// train.txt read first, then valid.txt, then test.txt. Loading
// the same directory twice always yields the same indices, which
// is what lets `generate` map sampled indices back to words.

use anyhow::{Context, Result};
use std::{collections::HashMap, fs, path::Path};

use crate::domain::traits::Vocabulary;

pub const EOS: &str = "<eos>";

/// Bidirectional word ↔ index mapping.
#[derive(Debug, Clone, Default)]
pub struct Dictionary {
    word2idx: HashMap<String, usize>,
    idx2word: Vec<String>,
}

impl Dictionary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the index of `word`, assigning the next free one if unseen.
    pub fn add_word(&mut self, word: &str) -> usize {
        if let Some(&idx) = self.word2idx.get(word) {
            return idx;
        }
        let idx = self.idx2word.len();
        self.idx2word.push(word.to_string());
        self.word2idx.insert(word.to_string(), idx);
        idx
    }

    pub fn index_of(&self, word: &str) -> Option<usize> {
        self.word2idx.get(word).copied()
    }
}

impl Vocabulary for Dictionary {
    fn len(&self) -> usize {
        self.idx2word.len()
    }

    fn token(&self, index: usize) -> Option<&str> {
        self.idx2word.get(index).map(String::as_str)
    }
}

/// The three token streams plus the dictionary that produced them.
#[derive(Debug, Clone)]
pub struct Corpus {
    pub dictionary: Dictionary,
    pub train:      Vec<usize>,
    pub valid:      Vec<usize>,
    pub test:       Vec<usize>,
}

impl Corpus {
    /// Load train.txt, valid.txt and test.txt from `dir`.
    pub fn load(dir: impl AsRef<Path>) -> Result<Self> {
        let dir  = dir.as_ref();
        let read = |name: &str| -> Result<String> {
            let path = dir.join(name);
            let text = fs::read_to_string(&path)
                .with_context(|| format!("Cannot read corpus file '{}'", path.display()))?;
            tracing::debug!("Read {} bytes from '{}'", text.len(), path.display());
            Ok(text)
        };

        let corpus = Self::from_texts(&read("train.txt")?, &read("valid.txt")?, &read("test.txt")?);
        tracing::info!(
            "Corpus loaded: vocab={} train={} valid={} test={} tokens",
            corpus.vocab_size(),
            corpus.train.len(),
            corpus.valid.len(),
            corpus.test.len(),
        );
        Ok(corpus)
    }

    /// Build a corpus from in-memory texts (same tokenisation as `load`).
    pub fn from_texts(train: &str, valid: &str, test: &str) -> Self {
        let mut dictionary = Dictionary::new();
        let train = tokenize(&mut dictionary, train);
        let valid = tokenize(&mut dictionary, valid);
        let test  = tokenize(&mut dictionary, test);
        Self { dictionary, train, valid, test }
    }

    pub fn vocab_size(&self) -> usize {
        self.dictionary.len()
    }
}

/// Split each line into words, append <eos>, and map to indices.
fn tokenize(dictionary: &mut Dictionary, text: &str) -> Vec<usize> {
    text.lines()
        .flat_map(|line| line.split_whitespace().chain(std::iter::once(EOS)))
        .map(|word| dictionary.add_word(word))
        .collect()
}
