// ============================================================
// Layer 5 — Language Models (Burn)
// ============================================================
// Two closed model families behind one forward contract:
//
//   forward(input [seq, batch] Int, hidden?) →
//       (log-probabilities [seq·batch, ntoken], hidden?)
//
//   Recurrent   — embedding → stacked RNN_TANH / RNN_RELU / LSTM
//                 / GRU layers → linear decoder. Carries a hidden
//                 state from one window to the next.
//   Transformer — scaled embedding → sinusoidal positions →
//                 self-attention encoder stack (causal in training
//                 and evaluation, unmasked when sampling) → linear
//                 decoder. Stateless between calls.
//
// Rows of the output are ordered time-major, matching the
// flattened target block produced by data::batcher.
//
// Burn's LSTM/GRU and encoder layers are batch-first, so the
// input is transposed on the way in and the output on the way out.

use burn::{
    module::Param,
    nn::{
        attention::generate_autoregressive_mask,
        transformer::{TransformerEncoder, TransformerEncoderConfig, TransformerEncoderInput},
        Dropout, DropoutConfig,
        Embedding, EmbeddingConfig,
        gru::{Gru, GruConfig},
        Initializer,
        Linear, LinearConfig,
        Lstm, LstmConfig, LstmState,
        PositionalEncoding, PositionalEncodingConfig,
    },
    prelude::*,
    tensor::activation::{log_softmax, relu},
};

use crate::domain::model_kind::ModelKind;
use crate::error::{ensure_precondition, EngineError};

const INIT_RANGE: f64 = 0.1;

// ─── Configuration ────────────────────────────────────────────────────────────
// NOTE: #[derive(Config)] already generates Clone and Serialize/Deserialize.
#[derive(Config, Debug)]
pub struct LanguageModelConfig {
    pub kind:    ModelKind,
    pub ntoken:  usize,
    pub emsize:  usize,
    pub nhid:    usize,
    pub nlayers: usize,
    #[config(default = 2)]
    pub nhead:   usize,
    #[config(default = 0.2)]
    pub dropout: f64,
    #[config(default = false)]
    pub tied:    bool,
    /// Longest sequence the positional encoding covers
    #[config(default = 5000)]
    pub max_len: usize,
}

impl LanguageModelConfig {
    pub fn validate(&self) -> Result<(), EngineError> {
        ensure_precondition!(self.ntoken >= 1, "vocabulary must not be empty");
        ensure_precondition!(self.emsize >= 1 && self.nhid >= 1, "emsize and nhid must be positive");
        ensure_precondition!(self.nlayers >= 1, "nlayers must be at least 1");
        ensure_precondition!(
            (0.0..1.0).contains(&self.dropout),
            "dropout must be in [0, 1), got {}", self.dropout,
        );
        if self.tied {
            ensure_precondition!(
                self.kind.is_recurrent(),
                "weight tying is only available for recurrent models",
            );
            ensure_precondition!(
                self.nhid == self.emsize,
                "when using the tied flag, nhid ({}) must be equal to emsize ({})",
                self.nhid, self.emsize,
            );
        }
        if self.kind == ModelKind::Transformer {
            ensure_precondition!(self.nhead >= 1, "nhead must be at least 1");
            ensure_precondition!(
                self.emsize % self.nhead == 0,
                "emsize ({}) must be divisible by nhead ({})", self.emsize, self.nhead,
            );
            ensure_precondition!(self.max_len >= 1, "max_len must be positive");
        }
        Ok(())
    }

    pub fn init<B: Backend>(&self, device: &B::Device) -> Result<LanguageModel<B>, EngineError> {
        self.validate()?;
        let model = if self.kind.is_recurrent() {
            LanguageModel::Recurrent(self.init_recurrent(device))
        } else {
            LanguageModel::Transformer(self.init_transformer(device))
        };
        tracing::debug!("Initialised {} model ({} layers)", self.kind, self.nlayers);
        Ok(model)
    }

    fn uniform() -> Initializer {
        Initializer::Uniform { min: -INIT_RANGE, max: INIT_RANGE }
    }

    fn init_recurrent<B: Backend>(&self, device: &B::Device) -> RnnModel<B> {
        let encoder = EmbeddingConfig::new(self.ntoken, self.emsize)
            .with_initializer(Self::uniform())
            .init(device);

        let layers = (0..self.nlayers)
            .map(|i| {
                let d_input = if i == 0 { self.emsize } else { self.nhid };
                match self.kind {
                    ModelKind::Lstm => RecurrentLayer::Lstm(
                        LstmConfig::new(d_input, self.nhid, true).init(device),
                    ),
                    ModelKind::Gru => RecurrentLayer::Gru(
                        GruConfig::new(d_input, self.nhid, true).init(device),
                    ),
                    _ => RecurrentLayer::Elman(ElmanCell::new(
                        d_input,
                        self.nhid,
                        self.kind == ModelKind::RnnRelu,
                        device,
                    )),
                }
            })
            .collect();

        let decoder = if self.tied {
            Decoder::Tied(Param::from_tensor(Tensor::zeros([self.ntoken], device)))
        } else {
            Decoder::Linear(
                LinearConfig::new(self.nhid, self.ntoken)
                    .with_initializer(Self::uniform())
                    .init(device),
            )
        };

        RnnModel {
            encoder,
            layers,
            decoder,
            dropout: DropoutConfig::new(self.dropout).init(),
            lstm:    self.kind == ModelKind::Lstm,
            nhid:    self.nhid,
            ntoken:  self.ntoken,
        }
    }

    fn init_transformer<B: Backend>(&self, device: &B::Device) -> TransformerModel<B> {
        let encoder = EmbeddingConfig::new(self.ntoken, self.emsize)
            .with_initializer(Self::uniform())
            .init(device);
        let pos_encoder = PositionalEncodingConfig::new(self.emsize)
            .with_max_sequence_size(self.max_len)
            .init(device);
        let transformer = TransformerEncoderConfig::new(self.emsize, self.nhid, self.nhead, self.nlayers)
            .with_dropout(self.dropout)
            .init(device);
        let decoder = LinearConfig::new(self.emsize, self.ntoken)
            .with_initializer(Self::uniform())
            .init(device);

        TransformerModel {
            encoder,
            pos_encoder,
            transformer,
            decoder,
            dropout: DropoutConfig::new(self.dropout).init(),
            emsize:  self.emsize,
            ntoken:  self.ntoken,
            max_len: self.max_len,
        }
    }
}

// ─── Hidden state ─────────────────────────────────────────────────────────────
/// Per-layer recurrent state. `cell` is only present for LSTM layers.
#[derive(Debug, Clone)]
pub struct LayerState<B: Backend> {
    pub hidden: Tensor<B, 2>,
    pub cell:   Option<Tensor<B, 2>>,
}

/// Hidden state carried across windows: one entry per layer, each [batch, nhid].
#[derive(Debug, Clone)]
pub struct Hidden<B: Backend> {
    pub layers: Vec<LayerState<B>>,
}

impl<B: Backend> Hidden<B> {
    /// Same values, cut off from the autodiff graph that produced them.
    /// Applied at every window boundary so gradients never flow
    /// across windows and the graph does not grow with the epoch.
    pub fn repackage(self) -> Self {
        let layers = self.layers
            .into_iter()
            .map(|s| LayerState {
                hidden: s.hidden.detach(),
                cell:   s.cell.map(Tensor::detach),
            })
            .collect();
        Self { layers }
    }

    pub fn batch_width(&self) -> Option<usize> {
        self.layers.first().map(|s| s.hidden.dims()[0])
    }
}

// ─── LanguageModel ────────────────────────────────────────────────────────────
#[derive(Module, Debug)]
pub enum LanguageModel<B: Backend> {
    Recurrent(RnnModel<B>),
    Transformer(TransformerModel<B>),
}

impl<B: Backend> LanguageModel<B> {
    /// Run one window. `input` is [seq, batch]; returns log-probabilities
    /// [seq·batch, ntoken] and, for recurrent models, the next hidden state.
    /// The Transformer attends causally.
    pub fn forward(
        &self,
        input:  Tensor<B, 2, Int>,
        hidden: Option<Hidden<B>>,
    ) -> Result<(Tensor<B, 2>, Option<Hidden<B>>), EngineError> {
        self.forward_with(input, hidden, true)
    }

    /// Like `forward`, with the Transformer's causal mask switchable.
    /// Sampling runs unmasked; recurrent models ignore `causal`.
    pub fn forward_with(
        &self,
        input:  Tensor<B, 2, Int>,
        hidden: Option<Hidden<B>>,
        causal: bool,
    ) -> Result<(Tensor<B, 2>, Option<Hidden<B>>), EngineError> {
        match self {
            LanguageModel::Recurrent(m) => {
                let (out, hidden) = m.forward(input, hidden)?;
                Ok((out, Some(hidden)))
            }
            LanguageModel::Transformer(m) => {
                ensure_precondition!(
                    hidden.is_none(),
                    "the Transformer model carries no hidden state",
                );
                Ok((m.forward(input, causal)?, None))
            }
        }
    }

    /// Zeroed hidden state for `batch` columns; None for the Transformer.
    pub fn init_hidden(&self, batch: usize, device: &B::Device) -> Option<Hidden<B>> {
        match self {
            LanguageModel::Recurrent(m) => Some(m.init_hidden(batch, device)),
            LanguageModel::Transformer(_) => None,
        }
    }

    pub fn ntoken(&self) -> usize {
        match self {
            LanguageModel::Recurrent(m)   => m.ntoken,
            LanguageModel::Transformer(m) => m.ntoken,
        }
    }

    pub fn is_recurrent(&self) -> bool {
        matches!(self, LanguageModel::Recurrent(_))
    }

    /// Longest input the model accepts in one call, if bounded.
    pub fn max_len(&self) -> Option<usize> {
        match self {
            LanguageModel::Recurrent(_)   => None,
            LanguageModel::Transformer(m) => Some(m.max_len),
        }
    }
}

// ─── Recurrent family ─────────────────────────────────────────────────────────
#[derive(Module, Debug)]
pub struct RnnModel<B: Backend> {
    pub encoder:   Embedding<B>,
    pub layers:    Vec<RecurrentLayer<B>>,
    pub decoder:   Decoder<B>,
    pub dropout:   Dropout,
    pub lstm:      bool,
    pub nhid:      usize,
    pub ntoken:    usize,
}

impl<B: Backend> RnnModel<B> {
    pub fn init_hidden(&self, batch: usize, device: &B::Device) -> Hidden<B> {
        let zeros = || Tensor::<B, 2>::zeros([batch, self.nhid], device);
        let layers = self.layers
            .iter()
            .map(|_| LayerState {
                hidden: zeros(),
                cell:   self.lstm.then(zeros),
            })
            .collect();
        Hidden { layers }
    }

    pub fn forward(
        &self,
        input:  Tensor<B, 2, Int>,
        hidden: Option<Hidden<B>>,
    ) -> Result<(Tensor<B, 2>, Hidden<B>), EngineError> {
        let [seq_len, batch] = input.dims();
        let hidden = match hidden {
            Some(h) => h,
            None    => self.init_hidden(batch, &input.device()),
        };
        ensure_precondition!(
            hidden.layers.len() == self.layers.len(),
            "hidden state has {} layers, model has {}", hidden.layers.len(), self.layers.len(),
        );
        ensure_precondition!(
            hidden.batch_width() == Some(batch),
            "input batch width {} does not match hidden state width {:?}",
            batch, hidden.batch_width(),
        );

        // [seq, batch] → [batch, seq] → [batch, seq, emsize]
        let mut x = self.dropout.forward(self.encoder.forward(input.transpose()));

        let last = self.layers.len() - 1;
        let mut next = Vec::with_capacity(self.layers.len());
        for (i, (layer, state)) in self.layers.iter().zip(hidden.layers).enumerate() {
            let (out, state) = layer.forward(x, state);
            x = if i < last { self.dropout.forward(out) } else { out };
            next.push(state);
        }

        // [batch, seq, nhid] → [seq, batch, nhid] → [seq·batch, nhid]
        let x = self.dropout.forward(x)
            .swap_dims(0, 1)
            .reshape([seq_len * batch, self.nhid]);

        Ok((log_softmax(self.decode(x), 1), Hidden { layers: next }))
    }

    fn decode(&self, x: Tensor<B, 2>) -> Tensor<B, 2> {
        match &self.decoder {
            Decoder::Linear(linear) => linear.forward(x),
            Decoder::Tied(bias) => {
                let weight = self.encoder.weight.val(); // [ntoken, emsize]
                x.matmul(weight.transpose()) + bias.val().unsqueeze::<2>()
            }
        }
    }
}

/// Output projection of a recurrent model.
#[derive(Module, Debug)]
pub enum Decoder<B: Backend> {
    /// Own [nhid, ntoken] weights
    Linear(Linear<B>),
    /// Reuses the embedding matrix; only the bias is separate
    Tied(Param<Tensor<B, 1>>),
}

#[derive(Module, Debug)]
pub enum RecurrentLayer<B: Backend> {
    Elman(ElmanCell<B>),
    Lstm(Lstm<B>),
    Gru(Gru<B>),
}

impl<B: Backend> RecurrentLayer<B> {
    /// x: [batch, seq, d_input] → ([batch, seq, nhid], state after the last step)
    fn forward(&self, x: Tensor<B, 3>, state: LayerState<B>) -> (Tensor<B, 3>, LayerState<B>) {
        match self {
            RecurrentLayer::Elman(cell) => cell.forward(x, state.hidden),
            RecurrentLayer::Lstm(lstm) => {
                let cell = state.cell.unwrap_or_else(|| state.hidden.zeros_like());
                let (out, next) = lstm.forward(x, Some(LstmState::new(cell, state.hidden)));
                (out, LayerState { hidden: next.hidden, cell: Some(next.cell) })
            }
            RecurrentLayer::Gru(gru) => {
                let out = gru.forward(x, Some(state.hidden));
                let hidden = last_step(out.clone());
                (out, LayerState { hidden, cell: None })
            }
        }
    }
}

/// Elman recurrence: h_t = act(W_ih·x_t + W_hh·h_{t-1}), act = tanh or ReLU.
#[derive(Module, Debug)]
pub struct ElmanCell<B: Backend> {
    pub input_gate:  Linear<B>,
    pub hidden_gate: Linear<B>,
    pub relu:        bool,
}

impl<B: Backend> ElmanCell<B> {
    pub fn new(d_input: usize, d_hidden: usize, relu: bool, device: &B::Device) -> Self {
        Self {
            input_gate:  LinearConfig::new(d_input, d_hidden).init(device),
            hidden_gate: LinearConfig::new(d_hidden, d_hidden).init(device),
            relu,
        }
    }

    fn forward(&self, x: Tensor<B, 3>, mut h: Tensor<B, 2>) -> (Tensor<B, 3>, LayerState<B>) {
        let [batch, seq_len, _] = x.dims();
        let d_hidden = h.dims()[1];

        // Input projections for every step at once
        let projected = self.input_gate.forward(x);
        let mut outputs = Vec::with_capacity(seq_len);
        for t in 0..seq_len {
            let x_t = projected.clone()
                .slice([0..batch, t..t + 1, 0..d_hidden])
                .reshape([batch, d_hidden]);
            let pre = x_t + self.hidden_gate.forward(h);
            h = if self.relu { relu(pre) } else { pre.tanh() };
            outputs.push(h.clone());
        }

        (Tensor::stack(outputs, 1), LayerState { hidden: h, cell: None })
    }
}

/// [batch, seq, d] → [batch, d] at the final time step.
fn last_step<B: Backend>(x: Tensor<B, 3>) -> Tensor<B, 2> {
    let [batch, seq_len, d] = x.dims();
    x.slice([0..batch, seq_len - 1..seq_len, 0..d]).reshape([batch, d])
}

// ─── Transformer family ───────────────────────────────────────────────────────
#[derive(Module, Debug)]
pub struct TransformerModel<B: Backend> {
    pub encoder:     Embedding<B>,
    pub pos_encoder: PositionalEncoding<B>,
    pub transformer: TransformerEncoder<B>,
    pub decoder:     Linear<B>,
    pub dropout:     Dropout,
    pub emsize:      usize,
    pub ntoken:      usize,
    pub max_len:     usize,
}

impl<B: Backend> TransformerModel<B> {
    /// With `causal`, position t only attends to positions ≤ t.
    pub fn forward(&self, input: Tensor<B, 2, Int>, causal: bool) -> Result<Tensor<B, 2>, EngineError> {
        let [seq_len, batch] = input.dims();
        ensure_precondition!(
            seq_len <= self.max_len,
            "sequence length {} exceeds positional encoding capacity {}", seq_len, self.max_len,
        );
        let device = input.device();

        let x = self.encoder.forward(input.transpose())
            .mul_scalar((self.emsize as f64).sqrt());
        let x = self.dropout.forward(self.pos_encoder.forward(x));

        let mut encoder_input = TransformerEncoderInput::new(x);
        if causal {
            let mask = generate_autoregressive_mask::<B>(batch, seq_len, &device);
            encoder_input = encoder_input.mask_attn(mask);
        }
        let x = self.transformer.forward(encoder_input);

        let x = x.swap_dims(0, 1).reshape([seq_len * batch, self.emsize]);
        Ok(log_softmax(self.decoder.forward(x), 1))
    }
}
