// ============================================================
// Layer 1 — CLI / Presentation Layer
// ============================================================
// Entry point for all user interaction. Uses the `clap` crate
// to parse command line arguments; all work is delegated to
// Layer 2 (application).
//
// Two commands are supported:
//   1. `train`     — trains a model on a parallel corpus
//   2. `translate` — loads the best checkpoint and translates a file
//
// Reference: Rust Book §7 (Modules), §12 (CLI programs)

pub mod commands;

use anyhow::Result;
use clap::Parser;
use commands::{Commands, TrainArgs, TranslateArgs};
use std::path::Path;

#[derive(Parser, Debug)]
#[command(
    name = "seq2seq-nmt",
    version,
    about = "Train an LSTM encoder-decoder translation model, then translate with it."
)]
pub struct Cli {
    /// The subcommand to run (train or translate)
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Dispatch to the matching use case. The CLI layer only routes.
    pub fn run(self) -> Result<()> {
        match self.command {
            Commands::Train(args)     => run_train(args),
            Commands::Translate(args) => run_translate(args),
        }
    }
}

fn run_train(args: TrainArgs) -> Result<()> {
    use crate::application::train_use_case::TrainUseCase;

    let use_case = TrainUseCase::new(args.into());
    let state    = use_case.execute()?;

    match state.best_epoch {
        Some(epoch) => println!(
            "Training complete. Best validation loss {:.4} at epoch {}.",
            state.best_val_loss, epoch
        ),
        None => println!("Training complete. No epoch improved on the initial state."),
    }
    Ok(())
}

fn run_translate(args: TranslateArgs) -> Result<()> {
    use crate::application::translate_use_case::TranslateUseCase;

    let use_case = TranslateUseCase::new(
        &args.checkpoint_dir,
        args.device,
        args.batch_size,
        args.max_decode_len,
    )?;
    let written = use_case.run(&args.input_path(), Path::new(&args.output))?;

    println!("Wrote {} translations to {}", written, args.output);
    Ok(())
}
