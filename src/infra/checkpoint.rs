// ============================================================
// Layer 6 — Checkpoint Manager
// ============================================================
// Saves and restores stage model weights using Burn's
// CompactRecorder, plus the run configuration as JSON.
//
// File naming convention (inside the configured path):
//   {name}_lo.mpk        ← best stage-one weights so far
//   {name}_hi.mpk        ← best stage-two weights so far
//   {name}_config.json   ← configuration the run was started with
//
// A checkpoint is overwritten in place whenever its stage
// reaches a new best validation accuracy. There is no
// versioning or rotation.
//
// Burn's CompactRecorder:
//   - Serialises model parameters to MessagePack format
//   - Stores floats at half precision
//   - Type-safe: loading fails if architecture doesn't match
//
// Reference: Burn Book §5 (Records and Checkpointing)

use std::{
    fs,
    path::{Path, PathBuf},
};

use burn::{
    prelude::*,
    record::{CompactRecorder, Recorder},
};
use serde::{de::DeserializeOwned, Serialize};

use crate::domain::error::{DecoderError, Result};

/// Extension CompactRecorder gives its files.
pub const CHECKPOINT_EXTENSION: &str = "mpk";

/// Manages saving and loading of stage checkpoints.
/// All files are stored in the configured directory.
#[derive(Debug, Clone)]
pub struct CheckpointManager {
    dir: PathBuf,
}

impl CheckpointManager {
    /// Create a new CheckpointManager, creating the directory
    /// (and its parents) if it doesn't already exist.
    pub fn new(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    /// Point at an existing directory without touching the filesystem,
    /// for reading back checkpoints and configs.
    pub fn open(dir: impl AsRef<Path>) -> Self {
        Self { dir: dir.as_ref().to_path_buf() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of a checkpoint without the recorder's extension.
    pub fn stem_path(&self, stem: &str) -> PathBuf {
        self.dir.join(stem)
    }

    /// Path of a checkpoint as written to disk.
    pub fn checkpoint_file(&self, stem: &str) -> PathBuf {
        self.stem_path(stem).with_extension(CHECKPOINT_EXTENSION)
    }

    /// Save model weights under `stem`, replacing any earlier file.
    pub fn save_model<B: Backend, M: Module<B>>(&self, model: &M, stem: &str) -> Result<()> {
        let path = self.stem_path(stem);
        CompactRecorder::new()
            .record(model.clone().into_record(), path.clone())
            .map_err(|e| DecoderError::Checkpoint {
                path:    path.display().to_string(),
                message: e.to_string(),
            })?;

        tracing::debug!("Saved checkpoint '{}'", path.display());
        Ok(())
    }

    /// Load weights saved under `stem` into a freshly initialised
    /// model of the same architecture.
    pub fn load_model<B: Backend, M: Module<B>>(
        &self,
        model:  M,
        stem:   &str,
        device: &B::Device,
    ) -> Result<M> {
        let path = self.stem_path(stem);
        let record = CompactRecorder::new()
            .load(path.clone(), device)
            .map_err(|e| DecoderError::Checkpoint {
                path:    path.display().to_string(),
                message: format!("cannot load checkpoint: {e}"),
            })?;

        tracing::info!("Loaded checkpoint '{}'", path.display());
        Ok(model.load_record(record))
    }

    /// Write a configuration as pretty JSON to `{name}_config.json`.
    pub fn save_config<T: Serialize>(&self, name: &str, cfg: &T) -> Result<()> {
        let path = self.config_path(name);
        fs::write(&path, serde_json::to_string_pretty(cfg)?)?;
        tracing::debug!("Saved run config to '{}'", path.display());
        Ok(())
    }

    /// Read back a configuration written by `save_config`.
    pub fn load_config<T: DeserializeOwned>(&self, name: &str) -> Result<T> {
        let path = self.config_path(name);
        let json = fs::read_to_string(&path).map_err(|e| DecoderError::Checkpoint {
            path:    path.display().to_string(),
            message: format!("cannot read config: {e}"),
        })?;
        Ok(serde_json::from_str(&json)?)
    }

    fn config_path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{name}_config.json"))
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::ml::model::{HighLevelDecoder, HighLevelDecoderConfig};
    use burn::backend::NdArray;
    use serde::Deserialize;
    use tempfile::TempDir;

    type TestBackend = NdArray;

    #[test]
    fn test_model_round_trip_restores_outputs() {
        let tmp = TempDir::new().unwrap();
        let manager = CheckpointManager::new(tmp.path()).unwrap();
        let device = Default::default();

        let config = HighLevelDecoderConfig::new(1);
        let saved: HighLevelDecoder<TestBackend> = config.init(&device);
        manager.save_model(&saved, "run_hi").unwrap();
        assert!(manager.checkpoint_file("run_hi").exists());

        let fresh: HighLevelDecoder<TestBackend> = config.init(&device);
        let loaded = manager.load_model(fresh, "run_hi", &device).unwrap();

        let input = Tensor::<TestBackend, 4>::ones([2, 1, 5, 5], &device);
        let a = saved.forward(input.clone()).into_data().to_vec::<f32>().unwrap();
        let b = loaded.forward(input).into_data().to_vec::<f32>().unwrap();
        for (x, y) in a.iter().zip(&b) {
            // half-precision storage
            assert!((x - y).abs() < 1e-2, "{x} vs {y}");
        }
    }

    #[test]
    fn test_missing_checkpoint_is_reported() {
        let tmp = TempDir::new().unwrap();
        let manager = CheckpointManager::new(tmp.path()).unwrap();
        let device = Default::default();
        let model: HighLevelDecoder<TestBackend> = HighLevelDecoderConfig::new(1).init(&device);
        let err = manager.load_model(model, "absent_hi", &device).unwrap_err();
        assert!(matches!(err, DecoderError::Checkpoint { .. }));
    }

    #[test]
    fn test_open_does_not_create_directory() {
        let tmp = TempDir::new().unwrap();
        let missing = tmp.path().join("absent");
        let manager = CheckpointManager::open(&missing);
        let err = manager.load_config::<serde_json::Value>("run").unwrap_err();
        assert!(matches!(err, DecoderError::Checkpoint { .. }));
        assert!(!missing.exists());
    }

    #[test]
    fn test_config_round_trip() {
        #[derive(Debug, PartialEq, Serialize, Deserialize)]
        struct Sample {
            epochs: usize,
            name:   String,
        }

        let tmp = TempDir::new().unwrap();
        let manager = CheckpointManager::new(tmp.path().join("nested")).unwrap();
        let cfg = Sample { epochs: 3, name: "run".into() };
        manager.save_config("run", &cfg).unwrap();
        assert!(tmp.path().join("nested/run_config.json").exists());
        assert_eq!(manager.load_config::<Sample>("run").unwrap(), cfg);
    }
}
