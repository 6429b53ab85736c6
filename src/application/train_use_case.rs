// ============================================================
// Layer 2 — TrainUseCase
// ============================================================
// Drives the pipeline end to end from simulated data:
//
//   Step 1: Build the syndrome simulator   (Layer 4 - data)
//   Step 2: Configure path and name        (Layer 2 - pipeline)
//   Step 3: Stream train / valid / test    (Layer 2 - pipeline)
//   Step 4: Freeze the datasets            (Layer 2 - pipeline)
//   Step 5: Run both training stages       (Layer 5 - ml)
//
// Reference: Burn Book §5 (Training)

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::application::pipeline::{Pipeline, PipelineConfig, TrainingSummary};
use crate::data::simulator::{SimulationConfig, SyndromeSimulator};
use crate::domain::error::Result as DecoderResult;
use crate::domain::sample::SampleBatch;

#[cfg(not(feature = "wgpu"))]
type MyBackend = burn::backend::Autodiff<burn::backend::NdArray>;
#[cfg(feature = "wgpu")]
type MyBackend = burn::backend::Autodiff<burn::backend::Wgpu>;

// ─── Training Configuration ──────────────────────────────────────────────────
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainConfig {
    pub simulation:    SimulationConfig,
    pub train_samples: usize,
    pub valid_samples: usize,
    pub test_samples:  usize,
    /// Samples per streamed insert
    pub insert_batch:  usize,
    pub pipeline:      PipelineConfig,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            simulation:    SimulationConfig::default(),
            train_samples: 2000,
            valid_samples: 500,
            test_samples:  0,
            insert_batch:  100,
            pipeline:      PipelineConfig::default(),
        }
    }
}

// ─── TrainUseCase ─────────────────────────────────────────────────────────────
pub struct TrainUseCase {
    config: TrainConfig,
}

impl TrainUseCase {
    pub fn new(config: TrainConfig) -> Self {
        Self { config }
    }

    pub fn execute(&self) -> Result<TrainingSummary> {
        let cfg = &self.config;
        anyhow::ensure!(cfg.insert_batch > 0, "insert batch size must be at least 1");

        // ── Step 1: Simulator ─────────────────────────────────────────────────
        let mut simulator = SyndromeSimulator::new(cfg.simulation.clone())
            .context("invalid simulation settings")?;
        tracing::info!(
            "Simulating distance-{} code, {} round(s), px={} py={} pz={} pm={}",
            cfg.simulation.distance, cfg.simulation.rounds,
            cfg.simulation.px, cfg.simulation.py, cfg.simulation.pz, cfg.simulation.pm,
        );

        // ── Step 2: Configure ─────────────────────────────────────────────────
        let mut pipeline = Pipeline::<MyBackend>::new(cfg.pipeline.clone(), Default::default());
        pipeline.set_path(cfg.pipeline.path.clone())?;
        if let Some(name) = &cfg.pipeline.name {
            pipeline.set_name(name.clone())?;
        }

        // ── Step 3: Stream samples ────────────────────────────────────────────
        stream(&mut simulator, cfg.train_samples, cfg.insert_batch, |b| pipeline.receive_train_data(b))?;
        stream(&mut simulator, cfg.valid_samples, cfg.insert_batch, |b| pipeline.receive_valid_data(b))?;
        stream(&mut simulator, cfg.test_samples, cfg.insert_batch, |b| pipeline.receive_test_data(b))?;

        // ── Step 4: Freeze ────────────────────────────────────────────────────
        let counts = pipeline.init_dataset()?;
        tracing::info!("Frozen datasets: {} train, {} valid", counts.train, counts.valid);

        // ── Step 5: Train both stages ─────────────────────────────────────────
        let summary = pipeline
            .begin_training()
            .with_context(|| format!("training failed in state '{}'", pipeline.state()))?;
        Ok(summary)
    }
}

/// Feed `total` simulated samples to `sink` in inserts of at most `chunk`.
fn stream<F>(simulator: &mut SyndromeSimulator, total: usize, chunk: usize, mut sink: F) -> Result<()>
where
    F: FnMut(SampleBatch) -> DecoderResult<()>,
{
    let mut remaining = total;
    while remaining > 0 {
        let n = remaining.min(chunk);
        sink(simulator.batch(n)?)?;
        remaining -= n;
    }
    Ok(())
}
