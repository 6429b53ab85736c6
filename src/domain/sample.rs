// ============================================================
// Layer 3 — Sample Domain Types
// ============================================================
// A streamed batch of (syndrome, physical error) pairs, plus the
// small enums that name data splits and decoder stages.
//
// Shapes:
//   syndromes: [batch, channel, x, y]  (channel = measurement rounds)
//   errors:    [batch, x, y]           (Pauli per position, I=0 X=1 Y=2 Z=3)

use std::fmt;

use ndarray::{Array3, Array4};
use serde::{Deserialize, Serialize};

use crate::domain::error::{DecoderError, Result};

/// Number of Pauli / logical-error classes predicted by either stage.
pub const NUM_CLASSES: usize = 4;

/// One streamed insert: a syndrome batch and its physical-error batch.
/// Both arrays share the leading batch axis.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleBatch {
    pub syndromes: Array4<i32>,
    pub errors:    Array3<i32>,
}

impl SampleBatch {
    /// Pair a syndrome batch with its error batch.
    ///
    /// Fails with `ShapeMismatch` when the leading batch dimensions
    /// differ or the error grid is not the syndrome grid, and with
    /// `InvalidClass` when an error value is not a Pauli class.
    pub fn new(syndromes: Array4<i32>, errors: Array3<i32>) -> Result<Self> {
        let [sb, _, sx, sy] = dims4(&syndromes);
        let (eb, ex, ey) = errors.dim();
        if sb != eb {
            return Err(DecoderError::shape(format!(
                "syndrome batch has {sb} samples but error batch has {eb}"
            )));
        }
        if (sx, sy) != (ex, ey) {
            return Err(DecoderError::shape(format!(
                "syndrome grid {sx}x{sy} does not match error grid {ex}x{ey}"
            )));
        }
        check_error_classes(&errors)?;
        Ok(Self { syndromes, errors })
    }

    pub fn len(&self) -> usize {
        self.errors.dim().0
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Every physical-error value must lie in `0..NUM_CLASSES`.
pub fn check_error_classes(errors: &Array3<i32>) -> Result<()> {
    let classes = NUM_CLASSES as i32;
    for (sample, grid) in errors.outer_iter().enumerate() {
        if let Some(&value) = grid.iter().find(|&&v| !(0..classes).contains(&v)) {
            return Err(DecoderError::InvalidClass { sample, value, classes: NUM_CLASSES });
        }
    }
    Ok(())
}

fn dims4(a: &Array4<i32>) -> [usize; 4] {
    let (b, c, x, y) = a.dim();
    [b, c, x, y]
}

// ─── Split ────────────────────────────────────────────────────────────────────
/// The two data splits the training buffers are kept for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Split {
    Train,
    Valid,
}

impl Split {
    pub const ALL: [Split; 2] = [Split::Train, Split::Valid];
}

impl fmt::Display for Split {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Split::Train => write!(f, "train"),
            Split::Valid => write!(f, "valid"),
        }
    }
}

// ─── Stage ────────────────────────────────────────────────────────────────────
/// Which of the two decoders a trainer, checkpoint or metric belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Stage {
    /// Stage one: syndrome → per-qubit physical correction
    Low,
    /// Stage two: syndrome → logical-error class
    High,
}

impl Stage {
    /// Suffix appended to the checkpoint base name.
    pub fn suffix(&self) -> &'static str {
        match self {
            Stage::Low  => "lo",
            Stage::High => "hi",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Low  => write!(f, "low-level"),
            Stage::High => write!(f, "high-level"),
        }
    }
}

/// Per-split sample counts reported after freezing or label derivation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SplitCounts {
    pub train: usize,
    pub valid: usize,
}

impl SplitCounts {
    pub fn set(&mut self, split: Split, count: usize) {
        match split {
            Split::Train => self.train = count,
            Split::Valid => self.valid = count,
        }
    }
}
