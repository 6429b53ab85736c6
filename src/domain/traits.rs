// ============================================================
// Layer 3 — Core Traits (Abstractions)
// ============================================================
// The two seams the training pipeline depends on but does not
// own:
//
//   CorrectionEvaluator — the code-specific Pauli arithmetic
//                         (is a corrected error trivial? which
//                         logical class does a residual fall in?)
//   CorrectnessOracle   — turns (label, prediction) pairs into a
//                         per-sample correct/incorrect verdict
//                         for validation accuracy
//
// Implementations:
//   - RectangularCode        → CorrectionEvaluator
//   - PhysicalCorrectionOracle, LogicalClassOracle → CorrectnessOracle
//
// Reference: Rust Book §10 (Traits: Defining Shared Behaviour)

use ndarray::{Array1, Array2, Array3, ArrayView1, ArrayView3};

use crate::domain::error::Result;

// ─── CorrectionEvaluator ──────────────────────────────────────────────────────
/// Pauli-frame arithmetic over batches of `[batch, x, y]` error grids.
pub trait CorrectionEvaluator {
    /// Position-type grid: 1 marks a non-data (measurement) position,
    /// 0 marks a data qubit.
    fn qubit_type(&self, x: usize, y: usize) -> Array2<i32>;

    /// Multiply each error by its correction at every data position.
    fn apply_physical_correction(
        &self,
        errors:      ArrayView3<'_, i32>,
        corrections: ArrayView3<'_, i32>,
    ) -> Result<Array3<i32>>;

    /// True for every sample whose error triggers no stabilizer.
    fn is_valid(&self, errors: ArrayView3<'_, i32>) -> Array1<bool>;

    /// Logical equivalence class per sample, in {0, 1, 2, 3}.
    fn logical_error(&self, errors: ArrayView3<'_, i32>) -> Array1<i32>;

    /// Apply a logical operator of the given class to each sample.
    fn apply_logical_error(
        &self,
        errors:  ArrayView3<'_, i32>,
        classes: ArrayView1<'_, i32>,
    ) -> Result<Array3<i32>>;
}

// ─── CorrectnessOracle ────────────────────────────────────────────────────────
/// Scores a validation batch.
///
/// `labels` and `predictions` are flat, row-major, and hold
/// `labels.len() / samples` entries per sample.
pub trait CorrectnessOracle {
    fn judge(&self, labels: &[i32], predictions: &[i32], samples: usize) -> Result<Vec<bool>>;
}
