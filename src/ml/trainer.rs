// ============================================================
// Layer 5 — Stage Training Loop
// ============================================================
// Fixed-epoch train + validation loop for either decoder stage.
//
// Per epoch:
//   1. train pass   — shuffled DataLoader, loss → backward → Adam step
//   2. valid pass   — model.valid() on the inner backend, loss and
//                     arg-max predictions judged by the stage oracle
//   3. checkpoint   — written only on a strict new best accuracy
//
// No early stopping. The model handed back is the final-epoch
// model, which need not be the one on disk.
//
// Key Burn insight:
//   - Training uses an AutodiffBackend for gradients
//   - model.valid() returns the model on B::InnerBackend
//   - so the validation batcher also uses B::InnerBackend
//
// Reference: Burn Book §5, Kingma & Ba (2015) Adam

use burn::{
    module::AutodiffModule,
    optim::{GradientsParams, Optimizer},
    prelude::*,
    tensor::backend::AutodiffBackend,
};
use ndarray::RemoveAxis;
use serde::{Deserialize, Serialize};

use crate::data::{
    batcher::{sequential_loader, shuffled_loader, DecoderLoader},
    dataset::FrozenDataset,
};
use crate::domain::error::{DecoderError, Result};
use crate::domain::sample::Stage;
use crate::domain::traits::CorrectnessOracle;
use crate::infra::{
    checkpoint::CheckpointManager,
    metrics::{EpochMetrics, MetricsLogger},
};
use crate::ml::model::{predict_classes, StageModel};

// ─── StageConfig ──────────────────────────────────────────────────────────────
/// Hyperparameters bound to one stage before its run starts.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StageConfig {
    pub epochs:        usize,
    pub learning_rate: f64,
    pub batch_size:    usize,
}

impl StageConfig {
    pub fn validate(&self) -> Result<()> {
        if self.epochs == 0 {
            return Err(DecoderError::InvalidConfig("epochs must be at least 1".into()));
        }
        if self.batch_size == 0 {
            return Err(DecoderError::InvalidConfig("batch size must be at least 1".into()));
        }
        if self.learning_rate.is_nan() || self.learning_rate <= 0.0 {
            return Err(DecoderError::InvalidConfig(format!(
                "learning rate must be positive, got {}",
                self.learning_rate
            )));
        }
        Ok(())
    }
}

impl Default for StageConfig {
    fn default() -> Self {
        Self { epochs: 10, learning_rate: 1e-3, batch_size: 32 }
    }
}

// ─── BestAccuracyTracker ──────────────────────────────────────────────────────
/// Running maximum of validation accuracy for one stage run.
#[derive(Debug, Clone, Copy, Default)]
pub struct BestAccuracyTracker {
    best: Option<(f64, usize)>,
}

impl BestAccuracyTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an epoch's accuracy. Returns true when it strictly
    /// beats every earlier epoch; ties and NaN never do.
    pub fn observe(&mut self, epoch: usize, accuracy: f64) -> bool {
        let improved = match self.best {
            None => !accuracy.is_nan(),
            Some((best, _)) => accuracy > best,
        };
        if improved {
            self.best = Some((accuracy, epoch));
        }
        improved
    }

    pub fn best_accuracy(&self) -> Option<f64> {
        self.best.map(|(acc, _)| acc)
    }

    pub fn best_epoch(&self) -> Option<usize> {
        self.best.map(|(_, epoch)| epoch)
    }
}

// ─── StageReport ──────────────────────────────────────────────────────────────
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageReport {
    pub stage:             Stage,
    pub best_accuracy:     f64,
    pub best_epoch:        usize,
    pub epochs:            usize,
    pub checkpoint_writes: usize,
}

impl StageReport {
    /// True when the in-memory final model is not the checkpointed one.
    pub fn final_differs_from_best(&self) -> bool {
        self.best_epoch != self.epochs
    }
}

// ─── StageTrainer ─────────────────────────────────────────────────────────────
pub struct StageTrainer<'a, C: CorrectnessOracle> {
    stage:       Stage,
    config:      StageConfig,
    seed:        u64,
    stem:        String,
    oracle:      C,
    checkpoints: &'a CheckpointManager,
    metrics:     &'a MetricsLogger,
}

struct EpochPass {
    mean_loss: f64,
    correct:   usize,
    total:     usize,
}

impl<'a, C: CorrectnessOracle> StageTrainer<'a, C> {
    /// `stem` is the checkpoint file name without extension.
    pub fn new(
        stage:       Stage,
        config:      StageConfig,
        seed:        u64,
        stem:        impl Into<String>,
        oracle:      C,
        checkpoints: &'a CheckpointManager,
        metrics:     &'a MetricsLogger,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self { stage, config, seed, stem: stem.into(), oracle, checkpoints, metrics })
    }

    /// Train `model` for the configured number of epochs and return
    /// the final-epoch model with a report of the run.
    pub fn run<B, M, O, D>(
        &self,
        mut model: M,
        mut optim: O,
        train:     &FrozenDataset<D>,
        valid:     &FrozenDataset<D>,
        device:    &B::Device,
    ) -> Result<(M, StageReport)>
    where
        B: AutodiffBackend,
        M: StageModel<B> + AutodiffModule<B>,
        M::InnerModule: StageModel<B::InnerBackend>,
        O: Optimizer<M, B>,
        D: RemoveAxis + 'static,
    {
        if train.is_empty() || valid.is_empty() {
            return Err(DecoderError::empty(format!(
                "{} stage needs samples in both splits (train={}, valid={})",
                self.stage,
                train.len(),
                valid.len()
            )));
        }

        let cfg = self.config;
        // Training loader (AutodiffBackend), reshuffled every epoch
        let train_loader = shuffled_loader::<B, D>(train, device, cfg.batch_size, self.seed)?;
        // Validation loader (InnerBackend), every sample in order
        let (valid_loader, _) = sequential_loader::<B::InnerBackend, D>(valid, device, cfg.batch_size, false)?;

        tracing::info!(
            "Training {} decoder: {} epochs, lr={}, batch_size={}, train={}, valid={}",
            self.stage, cfg.epochs, cfg.learning_rate, cfg.batch_size, train.len(), valid.len()
        );

        let mut tracker = BestAccuracyTracker::new();
        let mut writes  = 0usize;

        for epoch in 1..=cfg.epochs {

            // ── Training phase ────────────────────────────────────────────────
            let mut loss_sum = 0.0f64;
            let mut batches  = 0usize;

            for batch in train_loader.iter() {
                let logits = model.class_logits(batch.syndromes);
                let loss   = model.loss(logits, batch.labels);

                loss_sum += loss.clone().into_scalar().elem::<f64>();
                batches  += 1;

                // Gradients are rebuilt from scratch by each backward
                let grads = loss.backward();
                let grads = GradientsParams::from_grads(grads, &model);
                model = optim.step(cfg.learning_rate, model, grads);
            }
            let train_loss = loss_sum / batches.max(1) as f64;

            // ── Validation phase ──────────────────────────────────────────────
            let result = self.validate(&model.valid(), &valid_loader)?;
            if result.total == 0 {
                return Err(DecoderError::empty(format!("{} validation pass saw no samples", self.stage)));
            }
            let accuracy = result.correct as f64 / result.total as f64;

            // ── Checkpoint decision ───────────────────────────────────────────
            let checkpointed = tracker.observe(epoch, accuracy);
            if checkpointed {
                self.checkpoints.save_model::<B, M>(&model, &self.stem)?;
                writes += 1;
            }

            tracing::info!(
                "{} epoch {:>3}/{} | train_loss={:.4} | val_loss={:.4} | accuracy={:.1}%{}",
                self.stage, epoch, cfg.epochs, train_loss, result.mean_loss,
                accuracy * 100.0,
                if checkpointed { " | checkpoint saved" } else { "" },
            );

            self.metrics.log(&EpochMetrics {
                stage: self.stage,
                epoch,
                train_loss,
                val_loss: result.mean_loss,
                accuracy,
                checkpointed,
            })?;
        }

        let report = StageReport {
            stage:             self.stage,
            best_accuracy:     tracker.best_accuracy().unwrap_or(0.0),
            best_epoch:        tracker.best_epoch().unwrap_or(0),
            epochs:            cfg.epochs,
            checkpoint_writes: writes,
        };
        tracing::info!(
            "{} decoder done: best accuracy {:.1}% at epoch {}, {} checkpoint write(s)",
            self.stage, report.best_accuracy * 100.0, report.best_epoch, report.checkpoint_writes
        );
        Ok((model, report))
    }

    fn validate<B, M>(&self, model: &M, loader: &DecoderLoader<B>) -> Result<EpochPass>
    where
        B: Backend,
        M: StageModel<B>,
    {
        let mut loss_sum = 0.0f64;
        let mut batches  = 0usize;
        let mut correct  = 0usize;
        let mut total    = 0usize;

        for batch in loader.iter() {
            let logits = model.class_logits(batch.syndromes);
            loss_sum += model
                .loss(logits.clone(), batch.labels)
                .into_scalar()
                .elem::<f64>();
            batches += 1;

            let predictions = predict_classes(logits)?;
            let verdicts = self.oracle.judge(&batch.host_labels, &predictions, batch.samples)?;
            correct += verdicts.into_iter().filter(|&ok| ok).count();
            total   += batch.samples;
        }

        Ok(EpochPass { mean_loss: loss_sum / batches.max(1) as f64, correct, total })
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::dataset::{LogicalLabels, PhysicalLabels, SplitDataset};
    use crate::domain::oracle::{LogicalClassOracle, PhysicalCorrectionOracle};
    use crate::domain::sample::Split;
    use crate::domain::surface_code::RectangularCode;
    use crate::ml::model::{HighLevelDecoder, HighLevelDecoderConfig, LowLevelDecoder, LowLevelDecoderConfig};
    use burn::backend::{Autodiff, NdArray};
    use burn::optim::AdamConfig;
    use ndarray::{Array1, Array3, Array4};
    use tempfile::TempDir;

    type TestBackend = Autodiff<NdArray>;

    fn stage_config(epochs: usize) -> StageConfig {
        StageConfig { epochs, learning_rate: 1e-3, batch_size: 4 }
    }

    fn logical_split(split: Split, n: usize) -> FrozenDataset<LogicalLabels> {
        let mut ds = SplitDataset::<LogicalLabels>::with_attached_labels(split);
        ds.insert(Array4::from_shape_fn((n, 1, 5, 5), |(b, _, i, j)| ((b + i + j) % 2) as i32), None)
            .unwrap();
        ds.freeze().unwrap();
        ds.attach_labels(Array1::from_iter((0..n).map(|b| (b % 4) as i32))).unwrap();
        ds.frozen().unwrap().clone()
    }

    fn physical_split(split: Split, n: usize) -> FrozenDataset<PhysicalLabels> {
        let mut ds = SplitDataset::<PhysicalLabels>::with_streamed_labels(split);
        ds.insert(Array4::zeros((n, 1, 5, 5)), Some(Array3::zeros((n, 5, 5)))).unwrap();
        ds.freeze().unwrap();
        ds.frozen().unwrap().clone()
    }

    /// `(accuracy, checkpointed)` of every logged epoch whose row starts with `prefix`.
    fn logged_epochs(metrics: &MetricsLogger, prefix: &str) -> Vec<(f64, bool)> {
        std::fs::read_to_string(metrics.csv_path())
            .unwrap()
            .lines()
            .filter(|l| l.starts_with(prefix))
            .map(|l| {
                let cols: Vec<&str> = l.split(',').collect();
                (cols[4].parse().unwrap(), cols[5].parse().unwrap())
            })
            .collect()
    }

    fn high_level_run(config: StageConfig, tmp: &TempDir) -> (StageReport, MetricsLogger) {
        let checkpoints = CheckpointManager::new(tmp.path()).unwrap();
        let metrics = MetricsLogger::new(tmp.path()).unwrap();
        let device = Default::default();

        let train = logical_split(Split::Train, 12);
        let valid = logical_split(Split::Valid, 8);
        let model: HighLevelDecoder<TestBackend> = HighLevelDecoderConfig::new(1).init(&device);
        let optim = AdamConfig::new().init::<TestBackend, HighLevelDecoder<TestBackend>>();

        let trainer = StageTrainer::new(
            Stage::High, config, 11, "run_hi", LogicalClassOracle, &checkpoints, &metrics,
        )
        .unwrap();
        let (_, report) = trainer.run(model, optim, &train, &valid, &device).unwrap();
        (report, metrics)
    }

    #[test]
    fn test_run_checkpoints_exactly_at_strict_running_maxima() {
        let tmp = TempDir::new().unwrap();
        let config = StageConfig { epochs: 6, learning_rate: 5e-2, batch_size: 4 };
        let (report, metrics) = high_level_run(config, &tmp);

        let rows = logged_epochs(&metrics, "hi,");
        assert_eq!(rows.len(), 6);
        let mut best: Option<f64> = None;
        for (epoch, &(accuracy, checkpointed)) in rows.iter().enumerate() {
            let improved = best.map_or(true, |b| accuracy > b);
            assert_eq!(checkpointed, improved, "epoch {} accuracy {accuracy}", epoch + 1);
            if improved {
                best = Some(accuracy);
            }
        }
        assert_eq!(report.checkpoint_writes, rows.iter().filter(|(_, c)| *c).count());
    }

    #[test]
    fn test_tied_accuracy_does_not_rewrite_checkpoint() {
        let tmp = TempDir::new().unwrap();
        // a vanishing step leaves every prediction, and so the accuracy, unchanged
        let config = StageConfig { epochs: 4, learning_rate: 1e-12, batch_size: 4 };
        let (report, metrics) = high_level_run(config, &tmp);

        let rows = logged_epochs(&metrics, "hi,");
        assert_eq!(rows.len(), 4);
        assert!(rows[0].1);
        for &(accuracy, checkpointed) in &rows[1..] {
            assert_eq!(accuracy, rows[0].0);
            assert!(!checkpointed);
        }
        assert_eq!(report.checkpoint_writes, 1);
        assert_eq!(report.best_epoch, 1);
        assert!(report.final_differs_from_best());
    }

    #[test]
    fn test_writes_only_on_strict_running_maximum() {
        let mut tracker = BestAccuracyTracker::new();
        let writes: Vec<usize> = [0.5, 0.5, 0.7, 0.6, 0.9]
            .into_iter()
            .zip(1..)
            .filter(|&(acc, epoch)| tracker.observe(epoch, acc))
            .map(|(_, epoch)| epoch)
            .collect();
        assert_eq!(writes, vec![1, 3, 5]);
        assert_eq!(tracker.best_accuracy(), Some(0.9));
        assert_eq!(tracker.best_epoch(), Some(5));
    }

    #[test]
    fn test_first_epoch_always_writes_even_at_zero() {
        let mut tracker = BestAccuracyTracker::new();
        assert!(tracker.observe(1, 0.0));
        assert!(!tracker.observe(2, 0.0));
    }

    #[test]
    fn test_invalid_stage_config_is_rejected() {
        assert!(StageConfig { epochs: 0, ..stage_config(1) }.validate().is_err());
        assert!(StageConfig { batch_size: 0, ..stage_config(1) }.validate().is_err());
        assert!(StageConfig { learning_rate: 0.0, ..stage_config(1) }.validate().is_err());
        assert!(stage_config(1).validate().is_ok());
    }

    #[test]
    fn test_high_level_run_checkpoints_and_logs() {
        let tmp = TempDir::new().unwrap();
        let checkpoints = CheckpointManager::new(tmp.path()).unwrap();
        let metrics = MetricsLogger::new(tmp.path()).unwrap();
        let device = Default::default();

        let train = logical_split(Split::Train, 10);
        let valid = logical_split(Split::Valid, 6);
        let model: HighLevelDecoder<TestBackend> = HighLevelDecoderConfig::new(1).init(&device);
        let optim = AdamConfig::new().init::<TestBackend, HighLevelDecoder<TestBackend>>();

        let trainer = StageTrainer::new(
            Stage::High, stage_config(3), 7, "run_hi", LogicalClassOracle, &checkpoints, &metrics,
        )
        .unwrap();
        let (_, report) = trainer.run(model, optim, &train, &valid, &device).unwrap();

        assert_eq!(report.epochs, 3);
        assert!(report.checkpoint_writes >= 1);
        assert!((1..=3).contains(&report.best_epoch));
        assert!((0.0..=1.0).contains(&report.best_accuracy));
        assert!(checkpoints.checkpoint_file("run_hi").exists());

        let csv = std::fs::read_to_string(metrics.csv_path()).unwrap();
        assert_eq!(csv.lines().filter(|l| l.starts_with("hi,")).count(), 3);
    }

    #[test]
    fn test_low_level_run_uses_physical_oracle() {
        let tmp = TempDir::new().unwrap();
        let checkpoints = CheckpointManager::new(tmp.path()).unwrap();
        let metrics = MetricsLogger::new(tmp.path()).unwrap();
        let device = Default::default();
        let code = RectangularCode::new();

        // All-identity errors: any all-identity prediction is correct
        let train = physical_split(Split::Train, 6);
        let valid = physical_split(Split::Valid, 5);
        let model: LowLevelDecoder<TestBackend> = LowLevelDecoderConfig::new(1, 5, 5).init(&device);
        let optim = AdamConfig::new().init::<TestBackend, LowLevelDecoder<TestBackend>>();

        let trainer = StageTrainer::new(
            Stage::Low,
            stage_config(2),
            3,
            "run_lo",
            PhysicalCorrectionOracle::new(&code, (5, 5)),
            &checkpoints,
            &metrics,
        )
        .unwrap();
        let (_, report) = trainer.run(model, optim, &train, &valid, &device).unwrap();
        assert_eq!(report.stage, Stage::Low);
        assert!(checkpoints.checkpoint_file("run_lo").exists());
    }

    #[test]
    fn test_unlabelled_validation_split_aborts_run() {
        let tmp = TempDir::new().unwrap();
        let checkpoints = CheckpointManager::new(tmp.path()).unwrap();
        let metrics = MetricsLogger::new(tmp.path()).unwrap();
        let device = Default::default();

        let train = logical_split(Split::Train, 4);
        let valid = logical_split(Split::Valid, 4);
        let model: HighLevelDecoder<TestBackend> = HighLevelDecoderConfig::new(1).init(&device);
        let optim = AdamConfig::new().init::<TestBackend, HighLevelDecoder<TestBackend>>();
        let trainer = StageTrainer::new(
            Stage::High, stage_config(1), 0, "run_hi", LogicalClassOracle, &checkpoints, &metrics,
        )
        .unwrap();

        // an unlabelled validation split cannot be batched
        let mut unlabelled = SplitDataset::<LogicalLabels>::with_attached_labels(Split::Valid);
        unlabelled.insert(Array4::zeros((4, 1, 5, 5)), None).unwrap();
        unlabelled.freeze().unwrap();
        let err = trainer
            .run(model.clone(), optim, &train, unlabelled.frozen().unwrap(), &device)
            .unwrap_err();
        assert!(matches!(err, DecoderError::Lifecycle(_)));

        let optim = AdamConfig::new().init::<TestBackend, HighLevelDecoder<TestBackend>>();
        assert!(trainer.run(model, optim, &train, &valid, &device).is_ok());
    }
}
