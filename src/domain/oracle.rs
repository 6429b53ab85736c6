// ============================================================
// Layer 3 — Correctness Oracles
// ============================================================
// Validation accuracy is not plain label equality for stage one:
// a predicted correction counts as correct when, multiplied into
// the true error, it leaves a residual that is both undetected
// and logically trivial. Many different corrections satisfy that.
//
// Stage two predicts a class directly, so equality suffices.

use ndarray::Array3;

use crate::domain::error::{DecoderError, Result};
use crate::domain::surface_code::PAULI_I;
use crate::domain::traits::{CorrectionEvaluator, CorrectnessOracle};

fn check_lengths(labels: &[i32], predictions: &[i32], expected: usize) -> Result<()> {
    if labels.len() != expected || predictions.len() != expected {
        return Err(DecoderError::shape(format!(
            "expected {expected} entries, got {} labels and {} predictions",
            labels.len(),
            predictions.len()
        )));
    }
    Ok(())
}

/// Stage-one oracle: physical error label vs predicted correction.
pub struct PhysicalCorrectionOracle<'a, E: CorrectionEvaluator> {
    evaluator: &'a E,
    grid:      (usize, usize),
}

impl<'a, E: CorrectionEvaluator> PhysicalCorrectionOracle<'a, E> {
    pub fn new(evaluator: &'a E, grid: (usize, usize)) -> Self {
        Self { evaluator, grid }
    }
}

impl<E: CorrectionEvaluator> CorrectnessOracle for PhysicalCorrectionOracle<'_, E> {
    fn judge(&self, labels: &[i32], predictions: &[i32], samples: usize) -> Result<Vec<bool>> {
        let (x, y) = self.grid;
        check_lengths(labels, predictions, samples * x * y)?;

        let shape = (samples, x, y);
        let errors = Array3::from_shape_vec(shape, labels.to_vec())
            .map_err(|e| DecoderError::shape(e.to_string()))?;
        let corrections = Array3::from_shape_vec(shape, predictions.to_vec())
            .map_err(|e| DecoderError::shape(e.to_string()))?;

        let residual = self
            .evaluator
            .apply_physical_correction(errors.view(), corrections.view())?;
        let valid   = self.evaluator.is_valid(residual.view());
        let logical = self.evaluator.logical_error(residual.view());

        Ok(valid
            .iter()
            .zip(logical.iter())
            .map(|(&ok, &class)| ok && class == PAULI_I)
            .collect())
    }
}

/// Stage-two oracle: derived logical class vs predicted class.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogicalClassOracle;

impl CorrectnessOracle for LogicalClassOracle {
    fn judge(&self, labels: &[i32], predictions: &[i32], samples: usize) -> Result<Vec<bool>> {
        check_lengths(labels, predictions, samples)?;
        Ok(labels.iter().zip(predictions).map(|(a, b)| a == b).collect())
    }
}
