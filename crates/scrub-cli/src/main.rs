//! Scrub CLI - Remove a backdoor trigger from a trained classifier
//!
//! Usage:
//!   scrub unlearn --model wrn-16-1 --pretrained weight/pretrained.safetensors \
//!       --test-clean data/test-clean.bin --test-bad data/test-bad.bin
//!   scrub eval --checkpoint weight/ABL_results/wrn-16-1-unlearning_epochs19.safetensors \
//!       --model wrn-16-1 --test-clean data/test-clean.bin --test-bad data/test-bad.bin
//!   scrub inspect --archive isolation/wrn-16-1-isolation1%-examples.bin

mod eval;
mod inspect;
mod unlearn;

use clap::{ArgAction, Parser, Subcommand};
use scrub_training::RunConfig;
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "scrub",
    about = "Two-phase backdoor unlearning for image classifiers",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run finetuning then gradient-ascent unlearning on an isolation split
    Unlearn {
        /// Run on CUDA device 0 (fatal if unavailable; no CPU fallback)
        #[arg(long)]
        cuda: bool,

        /// Architecture key: wrn-16-1, wrn-16-2, wrn-40-1, wrn-40-2, cnn
        #[arg(long, default_value = "wrn-16-1")]
        model: String,

        /// Number of label classes
        #[arg(long, default_value = "10")]
        num_classes: usize,

        /// Pretrained (backdoored) model state (.safetensors)
        #[arg(long)]
        pretrained: PathBuf,

        /// Batch size for every source
        #[arg(long, default_value = "64")]
        batch_size: usize,

        /// Initial finetuning learning rate (unlearning rates are fixed)
        #[arg(long, default_value = "0.1")]
        lr_finetune_init: f64,

        /// SGD momentum
        #[arg(long, default_value = "0.9")]
        momentum: f64,

        /// L2 weight decay
        #[arg(long, default_value = "1e-4")]
        weight_decay: f64,

        /// Disable Nesterov lookahead
        #[arg(long = "no-nesterov", action = ArgAction::SetFalse)]
        nesterov: bool,

        /// Skip the finetuning phase
        #[arg(long = "no-finetune", action = ArgAction::SetFalse)]
        finetune: bool,

        /// Finetuning epoch count
        #[arg(long, default_value = "60")]
        finetune_epochs: usize,

        /// Unlearning epoch count, including the baseline epoch 0
        #[arg(long, default_value = "20")]
        unlearning_epochs: usize,

        /// Checkpoint every N unlearning epochs
        #[arg(long, default_value = "5")]
        interval: usize,

        /// Disable checkpoint writing
        #[arg(long = "no-save", action = ArgAction::SetFalse)]
        save: bool,

        /// Console metric line every N batches (0 = quiet)
        #[arg(long, default_value = "100")]
        print_freq: usize,

        /// Fraction of the training set in the isolation split
        #[arg(long, default_value = "0.01")]
        isolation_ratio: f64,

        /// Directory holding the isolation/other example archives
        #[arg(long, default_value = "isolation")]
        isolate_dir: PathBuf,

        /// Output directory for checkpoint records
        #[arg(long, default_value = "weight/ABL_results")]
        checkpoint_dir: PathBuf,

        /// Output directory for the progress CSV
        #[arg(long, default_value = "logs")]
        log_dir: PathBuf,

        /// Clean test archive
        #[arg(long)]
        test_clean: PathBuf,

        /// Backdoor-triggered test archive
        #[arg(long)]
        test_bad: PathBuf,
    },

    /// Dual-evaluate a checkpoint without training
    Eval {
        /// Checkpoint or pretrained model state (.safetensors)
        #[arg(long)]
        checkpoint: PathBuf,

        /// Architecture key (must match the checkpoint)
        #[arg(long, default_value = "wrn-16-1")]
        model: String,

        #[arg(long, default_value = "10")]
        num_classes: usize,

        #[arg(long, default_value = "64")]
        batch_size: usize,

        /// Clean test archive
        #[arg(long)]
        test_clean: PathBuf,

        /// Backdoor-triggered test archive
        #[arg(long)]
        test_bad: PathBuf,

        /// Run on CUDA device 0
        #[arg(long)]
        cuda: bool,
    },

    /// Show an example archive's header summary
    Inspect {
        /// Path to archive .bin file
        #[arg(long)]
        archive: PathBuf,
    },
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Unlearn {
            cuda, model, num_classes, pretrained,
            batch_size, lr_finetune_init, momentum, weight_decay, nesterov,
            finetune, finetune_epochs, unlearning_epochs, interval, save,
            print_freq, isolation_ratio, isolate_dir, checkpoint_dir, log_dir,
            test_clean, test_bad,
        } => {
            let config = RunConfig {
                cuda,
                model,
                num_classes,
                pretrained,
                batch_size,
                print_freq,
                lr_finetune_init,
                momentum,
                weight_decay,
                nesterov,
                finetune,
                finetune_epochs,
                unlearning_epochs,
                interval,
                save,
                isolation_ratio,
                isolate_dir,
                checkpoint_dir,
                log_dir,
                test_clean,
                test_bad,
            };
            unlearn::run(&config)
        }
        Commands::Eval {
            checkpoint, model, num_classes, batch_size,
            test_clean, test_bad, cuda,
        } => eval::run(checkpoint, model, num_classes, batch_size, test_clean, test_bad, cuda),
        Commands::Inspect { archive } => inspect::run(archive),
    }
}
