// ============================================================
// Layer 3 — Rectangular Surface Code
// ============================================================
// Pauli arithmetic for an x-by-y rectangular surface code.
// x rows, y columns, both odd. The first and last rows are
// Z-edges, the first and last columns are X-edges.
//
// With x = 3, y = 5 the position types are:
//
//   D - Z - D - Z - D
//   |   |   |   |   |
//   X - D - X - D - X
//   |   |   |   |   |
//   D - Z - D - Z - D
//
//   D = data qubit        (i + j even)
//   Z = measure-Z          (i even, j odd)  fires on X/Y neighbours
//   X = measure-X          (i odd,  j even) fires on Z/Y neighbours
//
// Paulis are encoded I=0, X=1, Y=2, Z=3 and multiplied with the
// phase-free product table below.

use ndarray::{Array1, Array2, Array3, ArrayView1, ArrayView2, ArrayView3, Axis};

use crate::domain::error::{DecoderError, Result};
use crate::domain::traits::CorrectionEvaluator;

pub const PAULI_I: i32 = 0;
pub const PAULI_X: i32 = 1;
pub const PAULI_Y: i32 = 2;
pub const PAULI_Z: i32 = 3;

const PAULI_MULT: [[i32; 4]; 4] = [
    [0, 1, 2, 3],
    [1, 0, 3, 2],
    [2, 3, 0, 1],
    [3, 2, 1, 0],
];

/// Product of two Paulis, ignoring global phase.
pub fn pauli_mult(a: i32, b: i32) -> i32 {
    PAULI_MULT[(a & 3) as usize][(b & 3) as usize]
}

fn is_xy(p: i32) -> bool {
    p == PAULI_X || p == PAULI_Y
}

fn is_zy(p: i32) -> bool {
    p == PAULI_Z || p == PAULI_Y
}

pub fn is_data(i: usize, j: usize) -> bool {
    (i + j) % 2 == 0
}

/// 1 at measurement positions, 0 at data qubits.
pub fn qubit_type(x: usize, y: usize) -> Array2<i32> {
    Array2::from_shape_fn((x, y), |(i, j)| if is_data(i, j) { 0 } else { 1 })
}

/// Syndrome produced by a single error grid: 1 where a measure-Z or
/// measure-X position sees an odd number of anticommuting neighbours.
pub fn syndrome(error: ArrayView2<'_, i32>) -> Array2<i32> {
    let (x, y) = error.dim();
    let mut out = Array2::<i32>::zeros((x, y));
    for i in 0..x {
        for j in 0..y {
            if is_data(i, j) {
                continue;
            }
            // measure-Z on even rows, measure-X on odd rows
            let fires: fn(i32) -> bool = if i % 2 == 0 { is_xy } else { is_zy };
            let mut count = 0;
            if i > 0         && fires(error[[i - 1, j]]) { count += 1; }
            if i + 1 < x     && fires(error[[i + 1, j]]) { count += 1; }
            if j > 0         && fires(error[[i, j - 1]]) { count += 1; }
            if j + 1 < y     && fires(error[[i, j + 1]]) { count += 1; }
            out[[i, j]] = count % 2;
        }
    }
    out
}

/// The rectangular-code `CorrectionEvaluator`.
#[derive(Debug, Clone, Copy, Default)]
pub struct RectangularCode;

impl RectangularCode {
    pub fn new() -> Self {
        Self
    }

    fn sample_logical_error(error: ArrayView2<'_, i32>) -> i32 {
        let (x, y) = error.dim();
        // Z/Y along the first row flips the logical Z
        let z_count = (0..y).step_by(2).filter(|&j| is_zy(error[[0, j]])).count();
        // X/Y down the first column flips the logical X
        let x_count = (0..x).step_by(2).filter(|&i| is_xy(error[[i, 0]])).count();

        let mut class = PAULI_I;
        if z_count % 2 == 1 {
            class = pauli_mult(class, PAULI_Z);
        }
        if x_count % 2 == 1 {
            class = pauli_mult(class, PAULI_X);
        }
        class
    }
}

fn check_same_shape(a: &ArrayView3<'_, i32>, b: &ArrayView3<'_, i32>) -> Result<()> {
    if a.dim() != b.dim() {
        return Err(DecoderError::shape(format!(
            "error batch {:?} and correction batch {:?} differ",
            a.dim(),
            b.dim()
        )));
    }
    Ok(())
}

impl CorrectionEvaluator for RectangularCode {
    fn qubit_type(&self, x: usize, y: usize) -> Array2<i32> {
        qubit_type(x, y)
    }

    fn apply_physical_correction(
        &self,
        errors:      ArrayView3<'_, i32>,
        corrections: ArrayView3<'_, i32>,
    ) -> Result<Array3<i32>> {
        check_same_shape(&errors, &corrections)?;
        let mut out = errors.to_owned();
        let (_, x, y) = out.dim();
        for (mut grid, corr) in out.outer_iter_mut().zip(corrections.outer_iter()) {
            for i in 0..x {
                for j in (i % 2..y).step_by(2) {
                    grid[[i, j]] = pauli_mult(grid[[i, j]], corr[[i, j]]);
                }
            }
        }
        Ok(out)
    }

    fn is_valid(&self, errors: ArrayView3<'_, i32>) -> Array1<bool> {
        errors
            .axis_iter(Axis(0))
            .map(|grid| syndrome(grid).iter().all(|&s| s == 0))
            .collect()
    }

    fn logical_error(&self, errors: ArrayView3<'_, i32>) -> Array1<i32> {
        errors
            .axis_iter(Axis(0))
            .map(Self::sample_logical_error)
            .collect()
    }

    fn apply_logical_error(
        &self,
        errors:  ArrayView3<'_, i32>,
        classes: ArrayView1<'_, i32>,
    ) -> Result<Array3<i32>> {
        let (b, x, y) = errors.dim();
        if classes.len() != b {
            return Err(DecoderError::shape(format!(
                "{} logical classes for {b} error grids",
                classes.len()
            )));
        }
        let mut out = errors.to_owned();
        for (mut grid, &class) in out.outer_iter_mut().zip(classes.iter()) {
            if class == PAULI_X || class == PAULI_Y {
                for j in (0..y).step_by(2) {
                    grid[[0, j]] = pauli_mult(grid[[0, j]], PAULI_X);
                }
            }
            if class == PAULI_Z || class == PAULI_Y {
                for i in (0..x).step_by(2) {
                    grid[[i, 0]] = pauli_mult(grid[[i, 0]], PAULI_Z);
                }
            }
        }
        Ok(out)
    }
}
