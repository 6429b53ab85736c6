// ============================================================
// Layer 5 — Decoder Models
// ============================================================
// Both stages implement `StageModel`, the capability the trainer
// and label deriver are written against:
//
//   class_logits(syndromes) → [predictions, 4]
//   loss(logits, labels)    → scalar, differentiable
//
// Stage one predicts one Pauli class per grid position, so its
// natural [batch, 4, x, y] output is flattened to [batch*x*y, 4]
// with the class axis last. Measurement positions are masked out
// of its loss. Stage two predicts one class per sample.
//
// Reference: Burn Book §3 (Building Blocks)

use burn::{
    nn::{
        conv::{Conv2d, Conv2dConfig},
        loss::CrossEntropyLossConfig,
        Linear, LinearConfig, PaddingConfig2d,
    },
    prelude::*,
    tensor::activation::{log_softmax, relu},
};

use crate::domain::error::DecoderError;
use crate::domain::sample::NUM_CLASSES;
use crate::domain::surface_code::qubit_type;

// ─── StageModel ───────────────────────────────────────────────────────────────
pub trait StageModel<B: Backend>: Module<B> {
    /// Class scores with the class axis last: `[predictions, NUM_CLASSES]`.
    fn class_logits(&self, syndromes: Tensor<B, 4>) -> Tensor<B, 2>;

    /// Training loss of `logits` against row-aligned `labels`.
    fn loss(&self, logits: Tensor<B, 2>, labels: Tensor<B, 1, Int>) -> Tensor<B, 1>;
}

fn same_conv<B: Backend>(channels: [usize; 2], device: &B::Device) -> Conv2d<B> {
    Conv2dConfig::new(channels, [3, 3])
        .with_padding(PaddingConfig2d::Explicit(1, 1))
        .init(device)
}

// ─── Stage one ────────────────────────────────────────────────────────────────
#[derive(Config, Debug)]
pub struct LowLevelDecoderConfig {
    /// Syndrome channels (measurement rounds)
    pub channels: usize,
    pub x: usize,
    pub y: usize,
    #[config(default = 16)]
    pub hidden: usize,
}

impl LowLevelDecoderConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> LowLevelDecoder<B> {
        LowLevelDecoder {
            conv1: same_conv([self.channels, self.hidden], device),
            conv2: same_conv([self.hidden, self.hidden], device),
            head:  Conv2dConfig::new([self.hidden, NUM_CLASSES], [1, 1]).init(device),
            x:     self.x,
            y:     self.y,
        }
    }
}

#[derive(Module, Debug)]
pub struct LowLevelDecoder<B: Backend> {
    pub conv1: Conv2d<B>,
    pub conv2: Conv2d<B>,
    pub head:  Conv2d<B>,
    pub x:     usize,
    pub y:     usize,
}

impl<B: Backend> LowLevelDecoder<B> {
    /// syndromes: [batch, channel, x, y] → per-qubit logits [batch, 4, x, y]
    pub fn forward(&self, syndromes: Tensor<B, 4>) -> Tensor<B, 4> {
        let out = relu(self.conv1.forward(syndromes));
        let out = relu(self.conv2.forward(out));
        self.head.forward(out)
    }

    /// 1.0 for every data-qubit row of a flattened batch, 0.0 elsewhere
    fn data_mask(&self, rows: usize, device: &B::Device) -> Tensor<B, 1> {
        let per_sample: Vec<f32> = qubit_type(self.x, self.y)
            .iter()
            .map(|&t| if t == 0 { 1.0 } else { 0.0 })
            .collect();
        let samples = rows / per_sample.len().max(1);
        let mask: Vec<f32> = per_sample.iter().copied().cycle().take(samples * per_sample.len()).collect();
        Tensor::<B, 1>::from_floats(mask.as_slice(), device)
    }
}

impl<B: Backend> StageModel<B> for LowLevelDecoder<B> {
    fn class_logits(&self, syndromes: Tensor<B, 4>) -> Tensor<B, 2> {
        let logits = self.forward(syndromes);
        let [batch, classes, x, y] = logits.dims();
        logits.permute([0, 2, 3, 1]).reshape([batch * x * y, classes])
    }

    fn loss(&self, logits: Tensor<B, 2>, labels: Tensor<B, 1, Int>) -> Tensor<B, 1> {
        let [rows, _] = logits.dims();
        let mask = self.data_mask(rows, &logits.device());

        // Cross entropy restricted to data-qubit positions
        let log_probs = log_softmax(logits, 1);
        let picked    = log_probs.gather(1, labels.reshape([rows, 1])).reshape([rows]);
        let counted   = mask.clone().sum().clamp_min(1.0);
        picked.mul(mask).sum().div(counted).neg()
    }
}

// ─── Stage two ────────────────────────────────────────────────────────────────
#[derive(Config, Debug)]
pub struct HighLevelDecoderConfig {
    pub channels: usize,
    #[config(default = 16)]
    pub hidden: usize,
    #[config(default = 64)]
    pub features: usize,
}

impl HighLevelDecoderConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> HighLevelDecoder<B> {
        HighLevelDecoder {
            conv1: same_conv([self.channels, self.hidden], device),
            conv2: same_conv([self.hidden, self.hidden], device),
            conv3: same_conv([self.hidden, self.features], device),
            fc1:   LinearConfig::new(self.features, self.hidden).init(device),
            fc2:   LinearConfig::new(self.hidden, NUM_CLASSES).init(device),
        }
    }
}

#[derive(Module, Debug)]
pub struct HighLevelDecoder<B: Backend> {
    pub conv1: Conv2d<B>,
    pub conv2: Conv2d<B>,
    pub conv3: Conv2d<B>,
    pub fc1:   Linear<B>,
    pub fc2:   Linear<B>,
}

impl<B: Backend> HighLevelDecoder<B> {
    /// syndromes: [batch, channel, x, y] → logical-class logits [batch, 4]
    pub fn forward(&self, syndromes: Tensor<B, 4>) -> Tensor<B, 2> {
        let out = relu(self.conv1.forward(syndromes));
        let out = relu(self.conv2.forward(out));
        let out = relu(self.conv3.forward(out));

        // Global average over the grid
        let [batch, features, _, _] = out.dims();
        let pooled = out.mean_dim(3).mean_dim(2).reshape([batch, features]);

        let out = relu(self.fc1.forward(pooled));
        self.fc2.forward(out)
    }
}

impl<B: Backend> StageModel<B> for HighLevelDecoder<B> {
    fn class_logits(&self, syndromes: Tensor<B, 4>) -> Tensor<B, 2> {
        self.forward(syndromes)
    }

    fn loss(&self, logits: Tensor<B, 2>, labels: Tensor<B, 1, Int>) -> Tensor<B, 1> {
        CrossEntropyLossConfig::new()
            .init(&logits.device())
            .forward(logits, labels)
    }
}

// ─── Prediction ───────────────────────────────────────────────────────────────
/// Index of the largest score; ties go to the first occurrence.
pub fn argmax_first(row: &[f32]) -> usize {
    let mut best = 0;
    for (i, &v) in row.iter().enumerate().skip(1) {
        if v > row[best] {
            best = i;
        }
    }
    best
}

/// Host-side arg-max over the class axis of `[predictions, classes]`.
pub fn predict_classes<B: Backend>(logits: Tensor<B, 2>) -> crate::domain::error::Result<Vec<i32>> {
    let [_, classes] = logits.dims();
    let values = logits
        .into_data()
        .convert::<f32>()
        .to_vec::<f32>()
        .map_err(|e| DecoderError::TensorData(format!("{e:?}")))?;
    Ok(values
        .chunks(classes.max(1))
        .map(|row| argmax_first(row) as i32)
        .collect())
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type TestBackend = NdArray;

    #[test]
    fn test_low_level_shapes() {
        let device = Default::default();
        let model: LowLevelDecoder<TestBackend> = LowLevelDecoderConfig::new(2, 5, 5).init(&device);
        let input = Tensor::<TestBackend, 4>::zeros([3, 2, 5, 5], &device);
        assert_eq!(model.forward(input.clone()).dims(), [3, 4, 5, 5]);
        assert_eq!(model.class_logits(input).dims(), [75, 4]);
    }

    #[test]
    fn test_high_level_shapes() {
        let device = Default::default();
        let model: HighLevelDecoder<TestBackend> = HighLevelDecoderConfig::new(1).init(&device);
        let input = Tensor::<TestBackend, 4>::zeros([3, 1, 7, 7], &device);
        assert_eq!(model.class_logits(input).dims(), [3, 4]);
    }

    #[test]
    fn test_low_level_loss_ignores_measurement_positions() {
        let device = Default::default();
        let model: LowLevelDecoder<TestBackend> = LowLevelDecoderConfig::new(1, 3, 3).init(&device);

        // Data rows score the label class highly; measurement rows
        // score a wrong class. Only data rows should count.
        let types = qubit_type(3, 3);
        let mut scores = Vec::new();
        for &t in types.iter() {
            let hot = if t == 0 { 0 } else { 3 };
            for c in 0..NUM_CLASSES {
                scores.push(if c == hot { 50.0f32 } else { 0.0 });
            }
        }
        let logits = Tensor::<TestBackend, 1>::from_floats(scores.as_slice(), &device).reshape([9, 4]);
        let labels = Tensor::<TestBackend, 1, Int>::from_ints([0i32; 9].as_slice(), &device);
        let loss: f32 = model.loss(logits, labels).into_scalar().elem();
        assert!(loss < 1e-3, "loss was {loss}");
    }

    #[test]
    fn test_argmax_prefers_first_tie() {
        assert_eq!(argmax_first(&[0.5, 0.9, 0.9, 0.1]), 1);
        assert_eq!(argmax_first(&[1.0, 1.0, 1.0, 1.0]), 0);
        assert_eq!(argmax_first(&[0.0, 0.0, 0.0, 2.0]), 3);
    }

    #[test]
    fn test_predict_classes_per_row() {
        let device = Default::default();
        let logits = Tensor::<TestBackend, 1>::from_floats(
            [0.0f32, 3.0, 1.0, 0.0, 5.0, 0.0, 0.0, 5.0].as_slice(),
            &device,
        )
        .reshape([2, 4]);
        assert_eq!(predict_classes(logits).unwrap(), vec![1, 0]);
    }
}
