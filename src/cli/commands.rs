// ============================================================
// Layer 1 — CLI Commands and Arguments
// ============================================================
// Defines the two subcommands: `train` and `generate`.
//
// clap's derive macros generate --help, error messages for
// bad values, and string → number/enum conversion.
//
// Reference: Rust Book §12 (Building a CLI Program)

use clap::{Args, Subcommand};
use std::path::PathBuf;

use crate::application::{
    generate_use_case::GenerateConfig,
    train_use_case::TrainConfig,
};
use crate::domain::model_kind::ModelKind;

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Train a language model on train.txt / valid.txt / test.txt
    Train(TrainArgs),

    /// Sample words from a trained checkpoint
    Generate(GenerateArgs),
}

#[derive(Args, Debug)]
pub struct TrainArgs {
    /// Location of the data corpus
    #[arg(long, default_value = "data/wikitext-2")]
    pub data: PathBuf,

    /// Type of network (RNN_TANH, RNN_RELU, LSTM, GRU, Transformer)
    #[arg(long, default_value = "Transformer")]
    pub model: ModelKind,

    /// Size of word embeddings
    #[arg(long, default_value_t = 200)]
    pub emsize: usize,

    /// Number of hidden units per layer
    #[arg(long, default_value_t = 200)]
    pub nhid: usize,

    #[arg(long, default_value_t = 2)]
    pub nlayers: usize,

    /// Initial learning rate
    #[arg(long, default_value_t = 20.0)]
    pub lr: f64,

    /// Gradient clipping threshold (global L2 norm)
    #[arg(long, default_value_t = 0.25)]
    pub clip: f64,

    /// Upper epoch limit
    #[arg(long, default_value_t = 40)]
    pub epochs: usize,

    #[arg(long, default_value_t = 20)]
    pub batch_size: usize,

    /// Batch width for the validation and test streams
    #[arg(long, default_value_t = 10)]
    pub eval_batch_size: usize,

    /// Sequence length (truncated BPTT window)
    #[arg(long, default_value_t = 35)]
    pub bptt: usize,

    /// Dropout applied to layers (0 = no dropout)
    #[arg(long, default_value_t = 0.2)]
    pub dropout: f64,

    /// Tie the word embedding and softmax weights
    #[arg(long)]
    pub tied: bool,

    #[arg(long, default_value_t = 1111)]
    pub seed: u64,

    /// Report interval, in windows
    #[arg(long, default_value_t = 200)]
    pub log_interval: usize,

    /// Path to save the final model (extension is replaced)
    #[arg(long, default_value = "checkpoints/model")]
    pub save: PathBuf,

    /// Number of heads in the encoder/decoder of the Transformer model
    #[arg(long, default_value_t = 2)]
    pub nhead: usize,

    /// Verify the code and the model with a single window per pass
    #[arg(long)]
    pub dry_run: bool,

    /// Directory for report.json and metrics.csv
    #[arg(long)]
    pub report_dir: Option<PathBuf>,
}

/// The application layer never sees clap types.
impl From<TrainArgs> for TrainConfig {
    fn from(a: TrainArgs) -> Self {
        TrainConfig {
            data:            a.data,
            model:           a.model,
            emsize:          a.emsize,
            nhid:            a.nhid,
            nlayers:         a.nlayers,
            lr:              a.lr,
            clip:            a.clip,
            epochs:          a.epochs,
            batch_size:      a.batch_size,
            eval_batch_size: a.eval_batch_size,
            bptt:            a.bptt,
            dropout:         a.dropout,
            tied:            a.tied,
            seed:            a.seed,
            log_interval:    a.log_interval,
            save:            a.save,
            nhead:           a.nhead,
            dry_run:         a.dry_run,
            report_dir:      a.report_dir,
        }
    }
}

#[derive(Args, Debug)]
pub struct GenerateArgs {
    /// Location of the data corpus (same as used for training)
    #[arg(long, default_value = "data/wikitext-2")]
    pub data: PathBuf,

    /// Checkpoint base path written by `train --save`
    #[arg(long, default_value = "checkpoints/model")]
    pub checkpoint: PathBuf,

    /// Output file for generated text
    #[arg(long, default_value = "generated.txt")]
    pub outf: PathBuf,

    /// Number of words to generate
    #[arg(long, default_value_t = 1000)]
    pub words: usize,

    #[arg(long, default_value_t = 1111)]
    pub seed: u64,

    /// Higher values increase diversity; must be >= 1e-3
    #[arg(long, default_value_t = 1.0)]
    pub temperature: f64,

    /// Reporting interval, in words
    #[arg(long, default_value_t = 100)]
    pub log_interval: usize,
}

impl From<GenerateArgs> for GenerateConfig {
    fn from(a: GenerateArgs) -> Self {
        GenerateConfig {
            data:         a.data,
            checkpoint:   a.checkpoint,
            outf:         a.outf,
            words:        a.words,
            seed:         a.seed,
            temperature:  a.temperature,
            log_interval: a.log_interval,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::Cli;
    use clap::Parser;

    #[test]
    fn test_train_defaults_and_model_names() {
        let cli = Cli::parse_from(["word-lm", "train", "--model", "RNN_RELU", "--tied"]);
        let Commands::Train(args) = cli.command else { panic!("expected train") };
        let cfg: TrainConfig = args.into();
        assert_eq!(cfg.model, ModelKind::RnnRelu);
        assert!(cfg.tied);
        assert_eq!((cfg.bptt, cfg.eval_batch_size), (35, 10));
    }

    #[test]
    fn test_unknown_model_is_rejected() {
        assert!(Cli::try_parse_from(["word-lm", "train", "--model", "CNN"]).is_err());
    }

    #[test]
    fn test_generate_args() {
        let cli = Cli::parse_from(["word-lm", "generate", "--words", "50", "--temperature", "0.5"]);
        let Commands::Generate(args) = cli.command else { panic!("expected generate") };
        let cfg: GenerateConfig = args.into();
        assert_eq!((cfg.words, cfg.temperature), (50, 0.5));
    }
}
