// ============================================================
// Layer 2 — Pipeline
// ============================================================
// Owns every piece of run state and sequences the two stages:
//
//   Configuring ──receive──▶ Ingesting ──init_dataset──▶ Frozen
//        │                                                  │
//        └──── set_path / set_name (any idle state) ────────┤
//                                                           ▼
//   Done ◀── TrainingStageTwo ◀── DerivingLabels ◀── TrainingStageOne
//    │                                                      ▲
//    └──────────────── begin_training (re-run) ─────────────┘
//
// Every streamed batch lands in two parallel datasets per split:
// the stage-one dataset keeps the physical errors as labels, the
// stage-two dataset keeps only the syndromes and receives derived
// logical labels after stage one has been trained.
//
// A failed begin_training leaves the pipeline in the state it
// failed in; nothing is retried or rolled back.

use std::fmt;

use burn::{module::AutodiffModule, optim::AdamConfig, tensor::backend::AutodiffBackend};
use ndarray::{Array3, ArrayView4};
use serde::{Deserialize, Serialize};

use crate::data::dataset::{FrozenDataset, LogicalLabels, PhysicalLabels, SplitDataset};
use crate::domain::error::{DecoderError, Result};
use crate::domain::oracle::{LogicalClassOracle, PhysicalCorrectionOracle};
use crate::domain::sample::{check_error_classes, SampleBatch, Split, SplitCounts, Stage};
use crate::domain::surface_code::RectangularCode;
use crate::infra::{checkpoint::CheckpointManager, metrics::MetricsLogger};
use crate::ml::{
    labeler::LabelDeriver,
    model::{HighLevelDecoder, HighLevelDecoderConfig, LowLevelDecoder, LowLevelDecoderConfig},
    trainer::{StageConfig, StageReport, StageTrainer},
};

// ─── Configuration ────────────────────────────────────────────────────────────
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Directory for checkpoints, metrics and the saved config
    pub path: String,
    /// Checkpoint base name; files are `{name}_lo` and `{name}_hi`
    pub name: Option<String>,
    pub seed: u64,
    pub low:  StageConfig,
    pub high: StageConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            path: ".".to_string(),
            name: None,
            seed: 42,
            low:  StageConfig::default(),
            high: StageConfig::default(),
        }
    }
}

impl PipelineConfig {
    fn stem(name: &str, stage: Stage) -> String {
        format!("{name}_{}", stage.suffix())
    }
}

// ─── State ────────────────────────────────────────────────────────────────────
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PipelineState {
    Configuring,
    Ingesting,
    Frozen,
    TrainingStageOne,
    DerivingLabels,
    TrainingStageTwo,
    Done,
}

impl PipelineState {
    fn is_training(&self) -> bool {
        matches!(
            self,
            PipelineState::TrainingStageOne | PipelineState::DerivingLabels | PipelineState::TrainingStageTwo
        )
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PipelineState::Configuring      => "configuring",
            PipelineState::Ingesting        => "ingesting",
            PipelineState::Frozen           => "frozen",
            PipelineState::TrainingStageOne => "training stage one",
            PipelineState::DerivingLabels   => "deriving labels",
            PipelineState::TrainingStageTwo => "training stage two",
            PipelineState::Done             => "done",
        };
        write!(f, "{s}")
    }
}

/// Requests received per ingestion endpoint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestCounters {
    pub train: usize,
    pub valid: usize,
    pub test:  usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingSummary {
    pub low:  StageReport,
    pub high: StageReport,
    /// Samples that received a derived stage-two label, per split
    pub derived: SplitCounts,
}

/// Both stages' datasets for one split.
struct SplitData {
    low:  SplitDataset<PhysicalLabels>,
    high: SplitDataset<LogicalLabels>,
}

impl SplitData {
    fn new(split: Split) -> Self {
        Self {
            low:  SplitDataset::with_streamed_labels(split),
            high: SplitDataset::with_attached_labels(split),
        }
    }
}

// ─── Pipeline ─────────────────────────────────────────────────────────────────
pub struct Pipeline<B: AutodiffBackend> {
    config:    PipelineConfig,
    state:     PipelineState,
    device:    B::Device,
    evaluator: RectangularCode,
    counters:  IngestCounters,
    train:     SplitData,
    valid:     SplitData,
    labelled:  Option<(FrozenDataset<LogicalLabels>, FrozenDataset<LogicalLabels>)>,
    low_model:  Option<LowLevelDecoder<B>>,
    high_model: Option<HighLevelDecoder<B>>,
}

impl<B: AutodiffBackend> Pipeline<B> {
    pub fn new(config: PipelineConfig, device: B::Device) -> Self {
        Self {
            config,
            state:      PipelineState::Configuring,
            device,
            evaluator:  RectangularCode::new(),
            counters:   IngestCounters::default(),
            train:      SplitData::new(Split::Train),
            valid:      SplitData::new(Split::Valid),
            labelled:   None,
            low_model:  None,
            high_model: None,
        }
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn counters(&self) -> IngestCounters {
        self.counters
    }

    /// Final-epoch stage-one model, once stage one has completed.
    pub fn low_model(&self) -> Option<&LowLevelDecoder<B>> {
        self.low_model.as_ref()
    }

    pub fn high_model(&self) -> Option<&HighLevelDecoder<B>> {
        self.high_model.as_ref()
    }

    /// Stage-one dataset of a split, once frozen.
    pub fn dataset(&self, split: Split) -> Result<&FrozenDataset<PhysicalLabels>> {
        self.split_data(split).low.frozen()
    }

    /// Stage-two dataset with derived labels from the latest run.
    pub fn labelled_dataset(&self, split: Split) -> Option<&FrozenDataset<LogicalLabels>> {
        self.labelled.as_ref().map(|(train, valid)| match split {
            Split::Train => train,
            Split::Valid => valid,
        })
    }

    fn split_data(&self, split: Split) -> &SplitData {
        match split {
            Split::Train => &self.train,
            Split::Valid => &self.valid,
        }
    }

    fn split_data_mut(&mut self, split: Split) -> &mut SplitData {
        match split {
            Split::Train => &mut self.train,
            Split::Valid => &mut self.valid,
        }
    }

    // ── Configuration ─────────────────────────────────────────────────────────

    fn ensure_idle(&self, operation: &str) -> Result<()> {
        if self.state.is_training() {
            return Err(DecoderError::lifecycle(format!(
                "{operation} is not allowed while {}",
                self.state
            )));
        }
        Ok(())
    }

    /// Checkpoint directory. Not checked until training starts.
    pub fn set_path(&mut self, path: impl Into<String>) -> Result<()> {
        self.ensure_idle("set_path")?;
        self.config.path = path.into();
        tracing::debug!("Checkpoint path set to '{}'", self.config.path);
        Ok(())
    }

    pub fn set_name(&mut self, name: impl Into<String>) -> Result<()> {
        self.ensure_idle("set_name")?;
        let name = name.into();
        if name.is_empty() {
            return Err(DecoderError::InvalidConfig("checkpoint name must not be empty".into()));
        }
        tracing::debug!("Checkpoint name set to '{name}'");
        self.config.name = Some(name);
        Ok(())
    }

    // ── Ingestion ─────────────────────────────────────────────────────────────

    fn receive(&mut self, split: Split, data: SampleBatch) -> Result<()> {
        if !matches!(self.state, PipelineState::Configuring | PipelineState::Ingesting) {
            return Err(DecoderError::lifecycle(format!(
                "cannot receive {split} data while {}",
                self.state
            )));
        }

        let SampleBatch { syndromes, errors } = data;
        check_error_classes(&errors)?;
        let n = errors.dim().0;
        let buffers = self.split_data_mut(split);
        // Stage one first: it checks both syndrome and error shapes,
        // so the stage-two insert cannot fail after it succeeds.
        buffers.low.insert(syndromes.clone(), Some(errors))?;
        buffers.high.insert(syndromes, None)?;

        match split {
            Split::Train => self.counters.train += 1,
            Split::Valid => self.counters.valid += 1,
        }
        if self.state == PipelineState::Configuring {
            tracing::info!("First batch received, ingesting");
            self.state = PipelineState::Ingesting;
        }
        tracing::debug!("Received {n} {split} samples");
        Ok(())
    }

    pub fn receive_train_data(&mut self, data: SampleBatch) -> Result<()> {
        self.receive(Split::Train, data)
    }

    pub fn receive_valid_data(&mut self, data: SampleBatch) -> Result<()> {
        self.receive(Split::Valid, data)
    }

    /// Accepted and counted, but not stored.
    pub fn receive_test_data(&mut self, data: SampleBatch) -> Result<()> {
        self.counters.test += 1;
        tracing::debug!("Ignored {} test samples", data.len());
        Ok(())
    }

    /// Freeze every buffer at once and report per-split lengths.
    pub fn init_dataset(&mut self) -> Result<SplitCounts> {
        match self.state {
            PipelineState::Ingesting => {}
            PipelineState::Configuring => {
                return Err(DecoderError::empty("no data has been received"));
            }
            other => {
                return Err(DecoderError::lifecycle(format!("cannot freeze datasets while {other}")));
            }
        }

        // Check before freezing anything so a failure leaves all
        // buffers open
        for split in Split::ALL {
            if self.split_data(split).low.sample_count() == 0 {
                return Err(DecoderError::empty(format!("no {split} data has been received")));
            }
        }

        let mut counts = SplitCounts::default();
        for split in Split::ALL {
            let data = self.split_data_mut(split);
            data.low.freeze()?;
            data.high.freeze()?;
            counts.set(split, data.low.len()?);
        }
        self.state = PipelineState::Frozen;

        tracing::info!(
            "Datasets frozen: train={} valid={} (requests: train={} valid={} test={})",
            counts.train, counts.valid,
            self.counters.train, self.counters.valid, self.counters.test,
        );
        Ok(counts)
    }

    // ── Training ──────────────────────────────────────────────────────────────

    /// Train stage one, derive stage-two labels, train stage two.
    pub fn begin_training(&mut self) -> Result<TrainingSummary> {
        match self.state {
            PipelineState::Frozen | PipelineState::Done => {}
            PipelineState::Configuring => {
                return Err(DecoderError::empty("no data has been received"));
            }
            other => {
                return Err(DecoderError::lifecycle(format!("cannot begin training while {other}")));
            }
        }
        let name = self.config.name.clone().ok_or_else(|| {
            DecoderError::lifecycle("set_name must be called before begin_training")
        })?;
        self.config.low.validate()?;
        self.config.high.validate()?;

        let checkpoints = CheckpointManager::new(&self.config.path)?;
        let metrics     = MetricsLogger::new(&self.config.path)?;
        checkpoints.save_config(&name, &self.config)?;
        B::seed(self.config.seed);
        self.labelled = None;

        // ── Stage one ─────────────────────────────────────────────────────────
        self.state = PipelineState::TrainingStageOne;
        let low_train = self.train.low.frozen()?;
        let low_valid = self.valid.low.frozen()?;
        let (channels, x, y) = low_train.syndrome_shape();

        let trainer = StageTrainer::new(
            Stage::Low,
            self.config.low,
            self.config.seed,
            PipelineConfig::stem(&name, Stage::Low),
            PhysicalCorrectionOracle::new(&self.evaluator, (x, y)),
            &checkpoints,
            &metrics,
        )?;
        let model: LowLevelDecoder<B> = LowLevelDecoderConfig::new(channels, x, y).init(&self.device);
        let optim = AdamConfig::new().init::<B, LowLevelDecoder<B>>();
        let (low_model, low_report) = trainer.run(model, optim, low_train, low_valid, &self.device)?;
        if low_report.final_differs_from_best() {
            tracing::warn!(
                "Stage-one labels come from epoch {} weights; best checkpoint is epoch {}",
                low_report.epochs,
                low_report.best_epoch
            );
        }

        let inference  = low_model.valid();
        self.low_model = Some(low_model);

        // ── Label derivation ──────────────────────────────────────────────────
        self.state = PipelineState::DerivingLabels;
        let deriver = LabelDeriver::new(&self.evaluator, self.config.low.batch_size)?;
        let high_train = deriver.attach(&inference, low_train, self.train.high.frozen()?, &self.device)?;
        let high_valid = deriver.attach(&inference, low_valid, self.valid.high.frozen()?, &self.device)?;
        let derived = SplitCounts { train: high_train.len(), valid: high_valid.len() };

        // ── Stage two ─────────────────────────────────────────────────────────
        self.state = PipelineState::TrainingStageTwo;
        let trainer = StageTrainer::new(
            Stage::High,
            self.config.high,
            self.config.seed.wrapping_add(1),
            PipelineConfig::stem(&name, Stage::High),
            LogicalClassOracle,
            &checkpoints,
            &metrics,
        )?;
        let model: HighLevelDecoder<B> = HighLevelDecoderConfig::new(channels).init(&self.device);
        let optim = AdamConfig::new().init::<B, HighLevelDecoder<B>>();
        let (high_model, high_report) = trainer.run(model, optim, &high_train, &high_valid, &self.device)?;
        if high_report.final_differs_from_best() {
            tracing::warn!(
                "Stage-two model in memory is from epoch {}; best checkpoint is epoch {}",
                high_report.epochs,
                high_report.best_epoch
            );
        }
        self.high_model = Some(high_model);
        self.labelled   = Some((high_train, high_valid));
        self.state      = PipelineState::Done;

        tracing::info!(
            "Training complete: stage one {:.1}%, stage two {:.1}%",
            low_report.best_accuracy * 100.0,
            high_report.best_accuracy * 100.0
        );
        Ok(TrainingSummary { low: low_report, high: high_report, derived })
    }

    /// Replace both in-memory models with the best-epoch weights
    /// checkpointed under the configured path and name.
    ///
    /// Needs frozen datasets for the syndrome shape. Nothing changes
    /// unless both checkpoints load.
    pub fn restore_best_models(&mut self) -> Result<()> {
        if !matches!(self.state, PipelineState::Frozen | PipelineState::Done) {
            return Err(DecoderError::lifecycle(format!(
                "cannot restore checkpoints while {}",
                self.state
            )));
        }
        let name = self.config.name.clone().ok_or_else(|| {
            DecoderError::lifecycle("set_name must be called before restoring checkpoints")
        })?;
        let (channels, x, y) = self.train.low.frozen()?.syndrome_shape();

        let checkpoints = CheckpointManager::open(&self.config.path);
        let low: LowLevelDecoder<B> = checkpoints.load_model(
            LowLevelDecoderConfig::new(channels, x, y).init(&self.device),
            &PipelineConfig::stem(&name, Stage::Low),
            &self.device,
        )?;
        let high: HighLevelDecoder<B> = checkpoints.load_model(
            HighLevelDecoderConfig::new(channels).init(&self.device),
            &PipelineConfig::stem(&name, Stage::High),
            &self.device,
        )?;

        self.low_model  = Some(low);
        self.high_model = Some(high);
        tracing::info!("Restored best '{name}' checkpoints from '{}'", self.config.path);
        Ok(())
    }

    // ── Query ─────────────────────────────────────────────────────────────────

    /// Placeholder correction for a `[batch, channel, x, y]` syndrome
    /// batch: all-identity `[batch, x, y]`. Needs a trained stage one.
    pub fn query_data(&self, syndromes: ArrayView4<'_, i32>) -> Result<Array3<i32>> {
        if self.low_model.is_none() {
            return Err(DecoderError::lifecycle("query_data needs a trained stage-one model"));
        }
        let (b, _, x, y) = syndromes.dim();
        Ok(Array3::zeros((b, x, y)))
    }
}
