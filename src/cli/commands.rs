// ============================================================
// Layer 1 — CLI Commands and Arguments
// ============================================================
// Defines the subcommands `train` and `show-config` and all
// their configurable flags.
//
// Reference: Rust Book §12 (Building a CLI Program)

use clap::{Args, Subcommand};

use crate::application::{pipeline::PipelineConfig, train_use_case::TrainConfig};
use crate::data::simulator::SimulationConfig;
use crate::ml::trainer::StageConfig;

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Simulate samples and train both decoder stages
    Train(TrainArgs),

    /// Print the configuration a previous run was started with
    ShowConfig(ShowConfigArgs),
}

/// All arguments for the `train` command.
#[derive(Args, Debug)]
pub struct TrainArgs {
    /// Code distance (odd, at least 3)
    #[arg(long, default_value_t = 7)]
    pub distance: usize,

    /// Measurement rounds per sample
    #[arg(long, default_value_t = 1)]
    pub rounds: usize,

    /// Depolarising data-qubit error rate, split evenly over X, Y, Z
    #[arg(long, default_value_t = 0.01)]
    pub p: f64,

    /// Measurement error rate
    #[arg(long, default_value_t = 0.0)]
    pub pm: f64,

    #[arg(long, default_value_t = 2000)]
    pub train_samples: usize,

    #[arg(long, default_value_t = 500)]
    pub valid_samples: usize,

    /// Samples per streamed insert
    #[arg(long, default_value_t = 100)]
    pub insert_batch: usize,

    /// Directory for checkpoints and metrics
    #[arg(long, default_value = "checkpoints")]
    pub path: String,

    /// Checkpoint base name; writes {name}_lo and {name}_hi
    #[arg(long, default_value = "decoder")]
    pub name: String,

    #[arg(long, default_value_t = 10)]
    pub epochs: usize,

    /// Epochs for stage two; defaults to --epochs
    #[arg(long)]
    pub high_epochs: Option<usize>,

    #[arg(long, default_value_t = 1e-3)]
    pub lr: f64,

    #[arg(long, default_value_t = 32)]
    pub batch_size: usize,

    #[arg(long, default_value_t = 42)]
    pub seed: u64,
}

/// Convert CLI TrainArgs into the application-layer TrainConfig.
/// The application layer never sees clap types.
impl From<TrainArgs> for TrainConfig {
    fn from(a: TrainArgs) -> Self {
        let low = StageConfig { epochs: a.epochs, learning_rate: a.lr, batch_size: a.batch_size };
        let high = StageConfig { epochs: a.high_epochs.unwrap_or(a.epochs), ..low };

        let mut simulation = SimulationConfig::depolarizing(a.distance, a.p, a.seed);
        simulation.rounds = a.rounds;
        simulation.pm     = a.pm;

        TrainConfig {
            simulation,
            train_samples: a.train_samples,
            valid_samples: a.valid_samples,
            test_samples:  0,
            insert_batch:  a.insert_batch,
            pipeline: PipelineConfig {
                path: a.path,
                name: Some(a.name),
                seed: a.seed,
                low,
                high,
            },
        }
    }
}

/// All arguments for the `show-config` command
#[derive(Args, Debug)]
pub struct ShowConfigArgs {
    #[arg(long, default_value = "checkpoints")]
    pub path: String,

    #[arg(long, default_value = "decoder")]
    pub name: String,
}
