// ============================================================
// Layer 1 — CLI / Presentation Layer
// ============================================================
// Parses arguments with clap and hands off to Layer 2.
//
//   1. `train`    — trains a language model on a word corpus
//   2. `generate` — samples text from a saved checkpoint
//
// The Ctrl-C handler lives here: it only flips the cancellation
// token, and the epoch controller decides when to look at it.
//
// Reference: Rust Book §12 (CLI programs)

pub mod commands;

use anyhow::Result;
use clap::Parser;
use commands::{Commands, GenerateArgs, TrainArgs};

use crate::application::{
    generate_use_case::GenerateUseCase,
    train_use_case::TrainUseCase,
};
use crate::domain::cancellation::CancellationToken;
use crate::ml::controller::StopReason;

#[derive(Parser, Debug)]
#[command(
    name = "word-lm",
    version = "0.1.0",
    about = "Train an RNN/LSTM/GRU/Transformer word-level language model, then sample from it."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    pub fn run(self) -> Result<()> {
        match self.command {
            Commands::Train(args)    => run_train(args),
            Commands::Generate(args) => run_generate(args),
        }
    }
}

fn run_train(args: TrainArgs) -> Result<()> {
    tracing::info!("Starting training on corpus in: {}", args.data.display());

    let cancel = CancellationToken::new();
    let handle = cancel.clone();
    if let Err(e) = ctrlc::set_handler(move || handle.cancel()) {
        tracing::warn!("Ctrl-C handler not installed: {}", e);
    }

    let summary = TrainUseCase::new(args.into())
        .with_cancellation(cancel)
        .execute()?;

    if summary.stop == StopReason::Interrupted {
        println!("Training interrupted after {} epochs; best checkpoint kept.", summary.epochs_run);
    } else {
        println!("Training complete. Checkpoint saved.");
    }
    Ok(())
}

fn run_generate(args: GenerateArgs) -> Result<()> {
    let outf = args.outf.clone();
    let words = GenerateUseCase::new(args.into()).execute()?;
    println!("Generated {} words into '{}'", words, outf.display());
    Ok(())
}
