// ============================================================
// Layer 6 — Metrics Logger
// ============================================================
// Records one CSV row per stage epoch.
//
// Metrics recorded per epoch:
//   - stage:        low-level or high-level
//   - epoch:        the epoch number (1, 2, 3, ...)
//   - train_loss:   mean loss over training batches
//   - val_loss:     mean loss over validation batches
//   - accuracy:     correct / total validation samples
//   - checkpointed: whether this epoch wrote a checkpoint
//
// Output file: {path}/metrics.csv
//
// Example CSV output:
//   stage,epoch,train_loss,val_loss,accuracy,checkpointed
//   lo,1,1.084200,0.913100,0.640000,true
//   lo,2,0.875500,0.902300,0.600000,false
//
// Reference: Rust Book §12 (I/O and File Handling)

use std::{
    fs::{self, OpenOptions},
    io::Write,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};

use crate::domain::error::Result;
use crate::domain::sample::Stage;

const HEADER: &str = "stage,epoch,train_loss,val_loss,accuracy,checkpointed";

/// One row of metrics data for a single stage epoch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpochMetrics {
    pub stage: Stage,

    /// Starts at 1
    pub epoch: usize,

    pub train_loss: f64,
    pub val_loss:   f64,

    /// Fraction of validation samples the oracle judged correct
    /// Range: [0.0, 1.0]
    pub accuracy: f64,

    pub checkpointed: bool,
}

/// Appends epoch metrics to a CSV file for later analysis.
#[derive(Debug, Clone)]
pub struct MetricsLogger {
    csv_path: PathBuf,
}

impl MetricsLogger {
    /// Writes the CSV header if the file doesn't exist yet, so
    /// repeated runs append to the same log.
    pub fn new(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;

        let csv_path = dir.join("metrics.csv");
        if !csv_path.exists() {
            let mut f = fs::File::create(&csv_path)?;
            writeln!(f, "{HEADER}")?;
            tracing::debug!("Created metrics CSV: '{}'", csv_path.display());
        }

        Ok(Self { csv_path })
    }

    pub fn log(&self, m: &EpochMetrics) -> Result<()> {
        let mut f = OpenOptions::new().append(true).open(&self.csv_path)?;

        writeln!(
            f,
            "{},{},{:.6},{:.6},{:.6},{}",
            m.stage.suffix(),
            m.epoch,
            m.train_loss,
            m.val_loss,
            m.accuracy,
            m.checkpointed,
        )?;

        tracing::debug!(
            "Logged {} epoch {} metrics: train_loss={:.4}, val_loss={:.4}",
            m.stage,
            m.epoch,
            m.train_loss,
            m.val_loss,
        );
        Ok(())
    }

    pub fn csv_path(&self) -> &Path {
        &self.csv_path
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn row(stage: Stage, epoch: usize, checkpointed: bool) -> EpochMetrics {
        EpochMetrics { stage, epoch, train_loss: 1.5, val_loss: 1.25, accuracy: 0.5, checkpointed }
    }

    #[test]
    fn test_rows_are_appended_under_one_header() {
        let tmp = TempDir::new().unwrap();
        let logger = MetricsLogger::new(tmp.path()).unwrap();
        logger.log(&row(Stage::Low, 1, true)).unwrap();
        logger.log(&row(Stage::High, 1, false)).unwrap();

        // a second logger on the same directory keeps the file
        MetricsLogger::new(tmp.path()).unwrap().log(&row(Stage::High, 2, true)).unwrap();

        let text = fs::read_to_string(logger.csv_path()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], HEADER);
        assert_eq!(lines[1], "lo,1,1.500000,1.250000,0.500000,true");
        assert_eq!(lines[2], "hi,1,1.500000,1.250000,0.500000,false");
        assert_eq!(lines.len(), 4);
    }
}
