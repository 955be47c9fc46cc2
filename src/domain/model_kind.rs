// ============================================================
// Layer 3 — Model Kind
// ============================================================
// The five architectures a run can train. The spelling matches
// the names users already pass on the command line and that end
// up in saved configs and reports: RNN_TANH, RNN_RELU, LSTM,
// GRU and Transformer.

use std::{fmt, str::FromStr};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ModelKind {
    #[serde(rename = "RNN_TANH")]
    RnnTanh,
    #[serde(rename = "RNN_RELU")]
    RnnRelu,
    #[serde(rename = "LSTM")]
    Lstm,
    #[serde(rename = "GRU")]
    Gru,
    #[serde(rename = "Transformer")]
    Transformer,
}

impl ModelKind {
    pub const ALL: [ModelKind; 5] = [
        ModelKind::RnnTanh,
        ModelKind::RnnRelu,
        ModelKind::Lstm,
        ModelKind::Gru,
        ModelKind::Transformer,
    ];

    /// Recurrent kinds carry a hidden state between windows.
    pub fn is_recurrent(self) -> bool {
        !matches!(self, ModelKind::Transformer)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ModelKind::RnnTanh     => "RNN_TANH",
            ModelKind::RnnRelu     => "RNN_RELU",
            ModelKind::Lstm        => "LSTM",
            ModelKind::Gru         => "GRU",
            ModelKind::Transformer => "Transformer",
        }
    }
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModelKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ModelKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| format!(
                "unknown model type '{s}' (expected one of RNN_TANH, RNN_RELU, LSTM, GRU, Transformer)"
            ))
    }
}
