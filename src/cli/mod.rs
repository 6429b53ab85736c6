// ============================================================
// Layer 1 — CLI / Presentation Layer
// ============================================================
// Parses arguments with clap and hands off to Layer 2.
//
//   1. `train`       — simulate, stream, freeze and train
//   2. `show-config` — print a saved run configuration
//
// Reference: Rust Book §7 (Modules), §12 (CLI programs)

pub mod commands;

use anyhow::Result;
use clap::Parser;
use commands::{Commands, ShowConfigArgs, TrainArgs};

use crate::application::pipeline::PipelineConfig;
use crate::infra::checkpoint::CheckpointManager;

#[derive(Parser, Debug)]
#[command(
    name = "two-level-decoder",
    version,
    about = "Train a two-stage neural decoder for the rectangular surface code."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Route to the matching use case; no computation here.
    pub fn run(self) -> Result<()> {
        match self.command {
            Commands::Train(args)      => run_train(args),
            Commands::ShowConfig(args) => run_show_config(args),
        }
    }
}

fn run_train(args: TrainArgs) -> Result<()> {
    use crate::application::train_use_case::TrainUseCase;

    tracing::info!("Starting training run '{}' in '{}'", args.name, args.path);
    let summary = TrainUseCase::new(args.into()).execute()?;

    println!("Training complete.");
    for report in [&summary.low, &summary.high] {
        println!(
            "  {:<10} best accuracy {:>6.2}% at epoch {}/{} ({} checkpoint writes)",
            report.stage.to_string(),
            report.best_accuracy * 100.0,
            report.best_epoch,
            report.epochs,
            report.checkpoint_writes,
        );
    }
    println!(
        "  derived labels: {} train, {} valid",
        summary.derived.train, summary.derived.valid
    );
    Ok(())
}

fn run_show_config(args: ShowConfigArgs) -> Result<()> {
    let config: PipelineConfig = CheckpointManager::open(&args.path).load_config(&args.name)?;
    println!("{}", serde_json::to_string_pretty(&config)?);
    Ok(())
}
