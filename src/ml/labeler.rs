// ============================================================
// Layer 5 — Label Derivation
// ============================================================
// Turns stage-one predictions into stage-two targets.
//
//   for each chunk of `batch_size` samples, in dataset order:
//     correction = argmax(stage-one logits)        [n, x, y]
//     residual   = apply_physical_correction(error, correction)
//     label      = logical_error(residual)         [n]
//
// The scan visits whole chunks only. Trailing samples that do
// not fill a chunk get no label and are left out of the
// labelled stage-two dataset rather than padded.
//
// The model passed in should be the inference-mode model
// (`model.valid()`), so no autodiff graph is recorded.

use burn::prelude::*;
use ndarray::{Array1, Array3};

use crate::data::{
    batcher::sequential_loader,
    dataset::{FrozenDataset, LogicalLabels, PhysicalLabels},
};
use crate::domain::error::{DecoderError, Result};
use crate::domain::traits::CorrectionEvaluator;
use crate::ml::model::{predict_classes, StageModel};

pub struct LabelDeriver<'a, E: CorrectionEvaluator> {
    evaluator:  &'a E,
    batch_size: usize,
}

impl<'a, E: CorrectionEvaluator> LabelDeriver<'a, E> {
    pub fn new(evaluator: &'a E, batch_size: usize) -> Result<Self> {
        if batch_size == 0 {
            return Err(DecoderError::InvalidConfig("batch size must be at least 1".into()));
        }
        Ok(Self { evaluator, batch_size })
    }

    /// Logical-error class for every sample the scan covers.
    pub fn derive<B, M>(
        &self,
        model:  &M,
        source: &FrozenDataset<PhysicalLabels>,
        device: &B::Device,
    ) -> Result<Array1<i32>>
    where
        B: Backend,
        M: StageModel<B>,
    {
        let (_, x, y) = source.syndrome_shape();
        let (loader, covered) = sequential_loader::<B, PhysicalLabels>(source, device, self.batch_size, true)?;

        let mut labels = Vec::with_capacity(covered);
        for batch in loader.iter() {
            let shape = (batch.samples, x, y);

            let predictions = predict_classes(model.class_logits(batch.syndromes))?;
            let corrections = Array3::from_shape_vec(shape, predictions)
                .map_err(|e| DecoderError::shape(e.to_string()))?;
            let errors = Array3::from_shape_vec(shape, batch.host_labels)
                .map_err(|e| DecoderError::shape(e.to_string()))?;

            let residual = self
                .evaluator
                .apply_physical_correction(errors.view(), corrections.view())?;
            labels.extend(self.evaluator.logical_error(residual.view()));
        }

        Ok(Array1::from(labels))
    }

    /// Derive labels from `source` and return a labelled copy of the
    /// matching prefix of `target`, the unlabelled stage-two dataset.
    pub fn attach<B, M>(
        &self,
        model:  &M,
        source: &FrozenDataset<PhysicalLabels>,
        target: &FrozenDataset<LogicalLabels>,
        device: &B::Device,
    ) -> Result<FrozenDataset<LogicalLabels>>
    where
        B: Backend,
        M: StageModel<B>,
    {
        if source.len() != target.len() {
            return Err(DecoderError::shape(format!(
                "{} split has {} stage-one samples but {} stage-two samples",
                source.split(),
                source.len(),
                target.len()
            )));
        }

        let labels  = self.derive(model, source, device)?;
        let covered = labels.len();
        let dropped = source.len() - covered;
        if dropped > 0 {
            tracing::warn!(
                "{} split: {} trailing sample(s) beyond a whole batch of {} were not labelled",
                source.split(),
                dropped,
                self.batch_size
            );
        }

        let mut labelled = target.head(covered)?;
        labelled.attach_labels(labels)?;
        tracing::info!("Derived {} logical labels for the {} split", covered, source.split());
        Ok(labelled)
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::dataset::SplitDataset;
    use crate::domain::sample::Split;
    use crate::domain::surface_code::RectangularCode;
    use crate::ml::model::{LowLevelDecoder, LowLevelDecoderConfig};
    use burn::backend::NdArray;
    use ndarray::Array4;

    type TestBackend = NdArray;

    /// Matching stage-one and unlabelled stage-two datasets of `n` samples.
    fn datasets(n: usize) -> (FrozenDataset<PhysicalLabels>, FrozenDataset<LogicalLabels>) {
        let syndromes = Array4::from_shape_fn((n, 1, 5, 5), |(b, _, i, j)| ((b * 7 + i * 3 + j) % 2) as i32);
        let errors = Array3::from_shape_fn((n, 5, 5), |(b, i, j)| {
            if (i + j) % 2 == 0 { ((b + i) % 4) as i32 } else { 0 }
        });

        let mut lo = SplitDataset::<PhysicalLabels>::with_streamed_labels(Split::Train);
        lo.insert(syndromes.clone(), Some(errors)).unwrap();
        lo.freeze().unwrap();

        let mut hi = SplitDataset::<LogicalLabels>::with_attached_labels(Split::Train);
        hi.insert(syndromes, None).unwrap();
        hi.freeze().unwrap();

        (lo.frozen().unwrap().clone(), hi.frozen().unwrap().clone())
    }

    fn model() -> LowLevelDecoder<TestBackend> {
        LowLevelDecoderConfig::new(1, 5, 5).init(&Default::default())
    }

    #[test]
    fn test_derivation_is_deterministic() {
        let code  = RectangularCode::new();
        let (lo, _) = datasets(9);
        let model = model();
        let deriver = LabelDeriver::new(&code, 4).unwrap();
        let device = Default::default();

        let a = deriver.derive(&model, &lo, &device).unwrap();
        let b = deriver.derive(&model, &lo, &device).unwrap();
        assert_eq!(a, b);
        assert!(a.iter().all(|c| (0..4).contains(c)));
    }

    #[test]
    fn test_exact_multiple_labels_every_sample() {
        let code = RectangularCode::new();
        let (lo, hi) = datasets(8);
        let deriver = LabelDeriver::new(&code, 4).unwrap();
        let labelled = deriver.attach(&model(), &lo, &hi, &Default::default()).unwrap();
        assert_eq!(labelled.len(), 8);
        assert!(labelled.has_labels());
    }

    #[test]
    fn test_trailing_remainder_is_excluded() {
        let code = RectangularCode::new();
        let (lo, hi) = datasets(9);
        let deriver = LabelDeriver::new(&code, 4).unwrap();
        let labelled = deriver.attach(&model(), &lo, &hi, &Default::default()).unwrap();
        assert_eq!(labelled.len(), 8);
        // the unlabelled source keeps all nine samples
        assert_eq!(hi.len(), 9);
        assert!(!hi.has_labels());
        assert_eq!(labelled.syndromes(), hi.syndromes().slice(ndarray::s![..8, .., .., ..]));
    }

    #[test]
    fn test_split_smaller_than_one_batch_is_empty() {
        let code = RectangularCode::new();
        let (lo, hi) = datasets(3);
        let deriver = LabelDeriver::new(&code, 4).unwrap();
        let err = deriver.attach(&model(), &lo, &hi, &Default::default()).unwrap_err();
        assert!(matches!(err, DecoderError::EmptyDataset(_)));
    }

    #[test]
    fn test_identity_prediction_labels_true_logical_class() {
        // A model whose logits always favour class 0 predicts no
        // correction, so each label is the logical class of the error.
        let code = RectangularCode::new();
        let (lo, _) = datasets(4);
        let device = Default::default();
        let mut model = model();
        let bias = Tensor::<TestBackend, 1>::from_floats([100.0f32, 0.0, 0.0, 0.0].as_slice(), &device);
        let weight = Tensor::<TestBackend, 4>::zeros([4, 16, 1, 1], &device);
        model.head.weight = burn::module::Param::from_tensor(weight);
        model.head.bias = Some(burn::module::Param::from_tensor(bias));

        let deriver = LabelDeriver::new(&code, 2).unwrap();
        let labels = deriver.derive(&model, &lo, &device).unwrap();
        let errors = lo.labels().unwrap();
        assert_eq!(labels, code.logical_error(errors));
    }
}
