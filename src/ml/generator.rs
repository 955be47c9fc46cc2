// ============================================================
// Layer 5 — Generator (temperature sampling)
// ============================================================
// Autoregressive sampling from a trained model:
//
//   1. Seed with one token drawn uniformly from the vocabulary.
//   2. Each step:
//        recurrent   → feed only the last token, carry hidden state
//        transformer → feed the whole context without the causal
//                      mask (oldest tokens are dropped once it
//                      exceeds max_len)
//   3. weights = exp((log_p − max) / T) over the last position,
//      next token ~ Multinomial(weights). Never argmax.
//
// Log-probabilities differ from raw logits by a per-row constant,
// so scaling them by 1/T gives the same distribution.

use burn::prelude::*;
use rand::{
    distributions::{Distribution, WeightedIndex},
    Rng,
};

use crate::domain::traits::Vocabulary;
use crate::error::{ensure_precondition, EngineError};
use crate::ml::model::LanguageModel;

/// Lowest accepted sampling temperature.
pub const MIN_TEMPERATURE: f64 = 1e-3;

/// Line break after this many emitted words.
pub const WORDS_PER_LINE: usize = 20;

pub struct Generator<'m, B: Backend> {
    model:        &'m LanguageModel<B>,
    device:       B::Device,
    temperature:  f64,
    log_interval: usize,
}

impl<'m, B: Backend> Generator<'m, B> {
    pub fn new(
        model:       &'m LanguageModel<B>,
        device:      B::Device,
        temperature: f64,
    ) -> Result<Self, EngineError> {
        ensure_precondition!(
            temperature >= MIN_TEMPERATURE,
            "temperature has to be greater or equal {MIN_TEMPERATURE}, got {temperature}",
        );
        Ok(Self { model, device, temperature, log_interval: 0 })
    }

    /// Emit a progress line every `n` words; 0 disables it.
    pub fn with_log_interval(mut self, n: usize) -> Self {
        self.log_interval = n;
        self
    }

    /// Sample `n_words` token indices.
    pub fn generate<R: Rng>(&self, n_words: usize, rng: &mut R) -> Result<Vec<usize>, EngineError> {
        let ntoken = self.model.ntoken();
        let mut context = vec![rng.gen_range(0..ntoken)];
        let mut hidden  = self.model.init_hidden(1, &self.device);
        let mut words   = Vec::with_capacity(n_words);

        for i in 0..n_words {
            let input = if self.model.is_recurrent() {
                &context[context.len() - 1..]
            } else {
                &context[..]
            };
            let (log_probs, next) = self.model.forward_with(self.column(input), hidden, false)?;
            hidden = next;

            let word = sample_index(&last_row(log_probs)?, self.temperature, rng)?;
            words.push(word);

            if self.model.is_recurrent() {
                context = vec![word];
            } else {
                context.push(word);
                if let Some(max_len) = self.model.max_len() {
                    if context.len() > max_len {
                        context.drain(..context.len() - max_len);
                    }
                }
            }

            if reports_progress(i, self.log_interval) {
                tracing::info!("| Generated {}/{} words", i, n_words);
            }
        }
        Ok(words)
    }

    /// Tokens as a [len, 1] column.
    fn column(&self, tokens: &[usize]) -> Tensor<B, 2, Int> {
        let flat: Vec<i32> = tokens.iter().map(|&t| t as i32).collect();
        Tensor::<B, 1, Int>::from_ints(flat.as_slice(), &self.device).reshape([tokens.len(), 1])
    }
}

/// Progress lines go out at word 0, n, 2n, …
fn reports_progress(i: usize, log_interval: usize) -> bool {
    log_interval > 0 && i % log_interval == 0
}

/// Log-probabilities of the final time step, as host floats.
fn last_row<B: Backend>(log_probs: Tensor<B, 2>) -> Result<Vec<f32>, EngineError> {
    let [rows, vocab] = log_probs.dims();
    log_probs
        .slice([rows - 1..rows, 0..vocab])
        .into_data()
        .convert::<f32>()
        .to_vec::<f32>()
        .map_err(|e| EngineError::precondition(format!("cannot read model output: {e:?}")))
}

/// Draw one index with probability ∝ exp(score / temperature).
pub fn sample_index<R: Rng>(scores: &[f32], temperature: f64, rng: &mut R) -> Result<usize, EngineError> {
    ensure_precondition!(!scores.is_empty(), "cannot sample from an empty distribution");
    ensure_precondition!(
        temperature >= MIN_TEMPERATURE,
        "temperature has to be greater or equal {MIN_TEMPERATURE}, got {temperature}",
    );

    let max = scores.iter().copied().fold(f32::NEG_INFINITY, f32::max) as f64;
    let weights: Vec<f64> = scores
        .iter()
        .map(|&s| ((s as f64 - max) / temperature).exp())
        .collect();

    let dist = WeightedIndex::new(&weights)
        .map_err(|e| EngineError::precondition(format!("invalid sampling weights: {e}")))?;
    Ok(dist.sample(rng))
}

/// Words joined by spaces, with a newline after every 20th.
pub fn render<V: Vocabulary + ?Sized>(tokens: &[usize], vocab: &V) -> String {
    let mut out = String::new();
    for (i, &t) in tokens.iter().enumerate() {
        out.push_str(vocab.token(t).unwrap_or("<unk>"));
        out.push(if i % WORDS_PER_LINE == WORDS_PER_LINE - 1 { '\n' } else { ' ' });
    }
    out
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;
    use rand::{rngs::StdRng, SeedableRng};

    use crate::data::corpus::Dictionary;
    use crate::domain::model_kind::ModelKind;
    use crate::ml::model::LanguageModelConfig;

    type B = NdArray;

    fn model(kind: ModelKind, max_len: usize) -> LanguageModel<B> {
        LanguageModelConfig::new(kind, 10, 8, 8, 1)
            .with_dropout(0.0)
            .with_max_len(max_len)
            .init::<B>(&Default::default())
            .unwrap()
    }

    #[test]
    fn test_temperature_floor() {
        let m = model(ModelKind::Gru, 16);
        assert!(Generator::new(&m, Default::default(), 1e-4).is_err());
        assert!(Generator::new(&m, Default::default(), MIN_TEMPERATURE).is_ok());

        let mut rng = StdRng::seed_from_u64(0);
        assert!(sample_index(&[0.0, 1.0], 0.0, &mut rng).is_err());
    }

    #[test]
    fn test_low_temperature_concentrates_on_best_score() {
        let mut rng = StdRng::seed_from_u64(3);
        for _ in 0..50 {
            assert_eq!(sample_index(&[0.0, 10.0, 0.0], 0.01, &mut rng).unwrap(), 1);
        }
    }

    #[test]
    fn test_sampling_is_not_argmax() {
        // Two equal scores: both must show up
        let mut rng = StdRng::seed_from_u64(7);
        let picks: Vec<usize> = (0..200)
            .map(|_| sample_index(&[1.0, 1.0], 1.0, &mut rng).unwrap())
            .collect();
        assert!(picks.contains(&0) && picks.contains(&1));
    }

    #[test]
    fn test_generate_is_seeded_and_in_vocabulary() {
        for kind in [ModelKind::Lstm, ModelKind::Transformer] {
            let m = model(kind, 16);
            let generator = Generator::new(&m, Default::default(), 1.0).unwrap();
            let a = generator.generate(12, &mut StdRng::seed_from_u64(42)).unwrap();
            let b = generator.generate(12, &mut StdRng::seed_from_u64(42)).unwrap();
            assert_eq!(a.len(), 12);
            assert!(a.iter().all(|&t| t < 10));
            assert_eq!(a, b, "{kind}");
        }
    }

    #[test]
    fn test_transformer_context_is_capped() {
        let m = model(ModelKind::Transformer, 4);
        let generator = Generator::new(&m, Default::default(), 1.0).unwrap();
        let words = generator.generate(10, &mut StdRng::seed_from_u64(1)).unwrap();
        assert_eq!(words.len(), 10);
    }

    #[test]
    fn test_transformer_samples_from_unmasked_context() {
        let device: <B as Backend>::Device = Default::default();
        let m = LanguageModelConfig::new(ModelKind::Transformer, 10, 8, 8, 2)
            .with_dropout(0.0)
            .init::<B>(&device)
            .unwrap();
        let generator = Generator::new(&m, device, 1.0).unwrap();
        let words = generator.generate(6, &mut StdRng::seed_from_u64(9)).unwrap();

        let mut rng = StdRng::seed_from_u64(9);
        let mut context = vec![rng.gen_range(0..10)];
        for &expected in &words {
            let (log_probs, _) = m.forward_with(generator.column(&context), None, false).unwrap();
            let word = sample_index(&last_row(log_probs).unwrap(), 1.0, &mut rng).unwrap();
            assert_eq!(word, expected);
            context.push(word);
        }
    }

    #[test]
    fn test_progress_starts_at_the_first_word() {
        let logged: Vec<usize> = (0..10).filter(|&i| reports_progress(i, 4)).collect();
        assert_eq!(logged, vec![0, 4, 8]);
        assert!(!(0..10).any(|i| reports_progress(i, 0)));
    }

    #[test]
    fn test_render_breaks_lines_every_twenty_words() {
        let mut dict = Dictionary::new();
        let w = dict.add_word("w");
        let text = render(&vec![w; 41], &dict);
        assert_eq!(text.matches('\n').count(), 2);
        assert!(text.starts_with("w w "));
        assert_eq!(text.lines().next().map(|l| l.split(' ').count()), Some(20));
    }
}
