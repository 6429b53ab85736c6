// ============================================================
// Layer 4 — Syndrome Simulator
// ============================================================
// Generates labelled samples for the rectangular surface code
// under i.i.d. noise, so the pipeline can be driven end to end
// without an external data source.
//
// One sample, `rounds` measurement rounds:
//   for each round t:
//     1. draw a Pauli on every data qubit   (I, X, Y, Z with 1-p, px, py, pz)
//     2. multiply it into the accumulated data error
//     3. measure: true syndrome of the accumulated error,
//        with each measurement flipped with probability pm
//     4. channel t = measured syndrome XOR measured syndrome of round t-1
//   target = accumulated data error after the last round
//
// Reference: rand crate documentation (StdRng, Rng::gen)

use ndarray::{Array2, Array3, Array4, Axis};
use rand::{rngs::StdRng, Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::domain::error::{DecoderError, Result};
use crate::domain::sample::SampleBatch;
use crate::domain::surface_code::{self, pauli_mult, PAULI_I, PAULI_X, PAULI_Y, PAULI_Z};

/// Physical noise and geometry for the simulator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationConfig {
    /// Code distance: the grid is `distance × distance`, odd
    pub distance: usize,
    /// Measurement rounds per sample (syndrome channels)
    pub rounds: usize,
    pub px: f64,
    pub py: f64,
    pub pz: f64,
    /// Measurement flip probability
    pub pm: f64,
    pub seed: u64,
}

impl SimulationConfig {
    /// Depolarising noise of strength `p` split evenly over X, Y, Z.
    pub fn depolarizing(distance: usize, p: f64, seed: u64) -> Self {
        Self { distance, rounds: 1, px: p / 3.0, py: p / 3.0, pz: p / 3.0, pm: 0.0, seed }
    }

    pub fn validate(&self) -> Result<()> {
        if self.distance < 3 || self.distance % 2 == 0 {
            return Err(DecoderError::InvalidConfig(format!(
                "distance must be odd and at least 3, got {}",
                self.distance
            )));
        }
        if self.rounds == 0 {
            return Err(DecoderError::InvalidConfig("rounds must be at least 1".into()));
        }
        let total = self.px + self.py + self.pz;
        let probabilities = [self.px, self.py, self.pz, self.pm];
        if probabilities.iter().any(|p| !(0.0..=1.0).contains(p)) || total > 1.0 {
            return Err(DecoderError::InvalidConfig(format!(
                "noise probabilities out of range: px={} py={} pz={} pm={}",
                self.px, self.py, self.pz, self.pm
            )));
        }
        Ok(())
    }
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self::depolarizing(7, 0.01, 0)
    }
}

pub struct SyndromeSimulator {
    config: SimulationConfig,
    rng:    StdRng,
}

impl SyndromeSimulator {
    pub fn new(config: SimulationConfig) -> Result<Self> {
        config.validate()?;
        let rng = StdRng::seed_from_u64(config.seed);
        Ok(Self { config, rng })
    }

    fn draw_pauli(&mut self) -> i32 {
        let r: f64 = self.rng.gen();
        let SimulationConfig { px, py, pz, .. } = self.config;
        if r < px {
            PAULI_X
        } else if r < px + py {
            PAULI_Y
        } else if r < px + py + pz {
            PAULI_Z
        } else {
            PAULI_I
        }
    }

    /// One sample: `([rounds, d, d] syndrome changes, [d, d] error)`
    fn sample(&mut self) -> (Array3<i32>, Array2<i32>) {
        let d = self.config.distance;
        let mut error    = Array2::<i32>::zeros((d, d));
        let mut changes  = Array3::<i32>::zeros((self.config.rounds, d, d));
        let mut previous = Array2::<i32>::zeros((d, d));

        for mut channel in changes.axis_iter_mut(Axis(0)) {
            for i in 0..d {
                for j in 0..d {
                    if surface_code::is_data(i, j) {
                        let p = self.draw_pauli();
                        error[[i, j]] = pauli_mult(error[[i, j]], p);
                    }
                }
            }

            let mut measured = surface_code::syndrome(error.view());
            for ((i, j), value) in measured.indexed_iter_mut() {
                if !surface_code::is_data(i, j) && self.rng.gen_bool(self.config.pm) {
                    *value ^= 1;
                }
            }

            channel.assign(&(&measured ^ &previous));
            previous = measured;
        }

        (changes, error)
    }

    /// `n` samples packed as a streamable batch.
    pub fn batch(&mut self, n: usize) -> Result<SampleBatch> {
        let d = self.config.distance;
        let mut syndromes = Array4::<i32>::zeros((n, self.config.rounds, d, d));
        let mut errors    = Array3::<i32>::zeros((n, d, d));

        for b in 0..n {
            let (changes, error) = self.sample();
            syndromes.index_axis_mut(Axis(0), b).assign(&changes);
            errors.index_axis_mut(Axis(0), b).assign(&error);
        }

        SampleBatch::new(syndromes, errors)
    }
}
