// ============================================================
// Layer 4 — Decoder Batcher and Data Loaders
// ============================================================
// Two pieces:
//
//   DecoderBatcher — implements Burn's Batcher trait. Collates a
//                    Vec<DecoderSample> into device tensors by
//                    concatenating every tuple position along the
//                    batch axis, in the order the samples arrive.
//
//   loaders        — Burn DataLoaders over a FrozenDataset:
//                      shuffled_loader   fresh permutation on every
//                                        `iter()`, worker threads
//                      sequential_loader dataset order, optionally
//                                        stopping before the short
//                                        final batch
//
// Tensor layout handed to the models:
//   syndromes: [batch, channel, x, y] float
//   labels:    [batch * positions]    int, row-major flattened
//
// Reference: Burn Book §4 (Batcher, DataLoader)

use std::sync::Arc;

use burn::{
    data::{
        dataloader::{batcher::Batcher, DataLoader, DataLoaderBuilder},
        dataset::transform::PartialDataset,
    },
    prelude::*,
};
use ndarray::{Dimension, RemoveAxis};

use crate::data::dataset::{DecoderSample, FrozenDataset};
use crate::domain::error::{DecoderError, Result};

/// Worker threads materialising shuffled training batches.
pub const TRAIN_WORKERS: usize = 1;

/// A loader yielding collated decoder batches.
pub type DecoderLoader<B> = Arc<dyn DataLoader<DecoderBatch<B>>>;

// ─── DecoderBatch ─────────────────────────────────────────────────────────────
#[derive(Debug, Clone)]
pub struct DecoderBatch<B: Backend> {
    /// Syndromes — shape: [batch, channel, x, y]
    pub syndromes: Tensor<B, 4>,

    /// Labels flattened row-major — shape: [batch * positions]
    /// positions = x * y for stage one, 1 for stage two
    pub labels: Tensor<B, 1, Int>,

    /// Host copy of `labels`, used by the correctness oracles
    pub host_labels: Vec<i32>,

    /// Number of samples in the batch
    pub samples: usize,
}

// ─── DecoderBatcher ───────────────────────────────────────────────────────────
#[derive(Clone, Debug)]
pub struct DecoderBatcher<B: Backend> {
    pub device: B::Device,
}

impl<B: Backend> DecoderBatcher<B> {
    pub fn new(device: B::Device) -> Self {
        Self { device }
    }
}

impl<B: Backend, L: Dimension> Batcher<DecoderSample<L>, DecoderBatch<B>> for DecoderBatcher<B> {
    fn batch(&self, items: Vec<DecoderSample<L>>) -> DecoderBatch<B> {
        let samples = items.len();
        let (channels, x, y) = items
            .first()
            .map(|s| s.syndrome.dim())
            .unwrap_or((0, 0, 0));

        // Concatenate in arrival order; iter() walks each array row-major
        let syndrome_flat: Vec<f32> = items
            .iter()
            .flat_map(|s| s.syndrome.iter().map(|&v| v as f32))
            .collect();
        let host_labels: Vec<i32> = items
            .iter()
            .flat_map(|s| s.label.iter().copied())
            .collect();

        let syndromes = Tensor::<B, 1>::from_floats(syndrome_flat.as_slice(), &self.device)
            .reshape([samples, channels, x, y]);
        let labels = Tensor::<B, 1, Int>::from_ints(host_labels.as_slice(), &self.device);

        DecoderBatch { syndromes, labels, host_labels, samples }
    }
}

// ─── Loaders ──────────────────────────────────────────────────────────────────

/// Samples covered by whole batches of `batch_size`.
pub fn whole_batches(len: usize, batch_size: usize) -> usize {
    len / batch_size.max(1) * batch_size
}

fn check_loadable<D: RemoveAxis>(dataset: &FrozenDataset<D>, batch_size: usize) -> Result<()> {
    if batch_size == 0 {
        return Err(DecoderError::InvalidConfig("batch size must be at least 1".into()));
    }
    if !dataset.has_labels() {
        return Err(DecoderError::lifecycle(format!(
            "{} split cannot be batched before labels are attached",
            dataset.split()
        )));
    }
    Ok(())
}

/// Shuffled loader over the whole split. Every `iter()` draws a new
/// permutation from a generator seeded once with `seed`.
pub fn shuffled_loader<B, D>(
    dataset:    &FrozenDataset<D>,
    device:     &B::Device,
    batch_size: usize,
    seed:       u64,
) -> Result<DecoderLoader<B>>
where
    B: Backend,
    D: RemoveAxis + 'static,
{
    check_loadable(dataset, batch_size)?;
    let loader = DataLoaderBuilder::<DecoderSample<D::Smaller>, DecoderBatch<B>>::new(
        DecoderBatcher::<B>::new(device.clone()),
    )
    .batch_size(batch_size)
    .shuffle(seed)
    .num_workers(TRAIN_WORKERS)
    .build(Arc::new(dataset.clone()));
    Ok(loader)
}

/// Loader in dataset order. With `drop_remainder` the samples past the
/// last whole batch are never visited. Returns the loader and the
/// number of samples one pass covers.
pub fn sequential_loader<B, D>(
    dataset:        &FrozenDataset<D>,
    device:         &B::Device,
    batch_size:     usize,
    drop_remainder: bool,
) -> Result<(DecoderLoader<B>, usize)>
where
    B: Backend,
    D: RemoveAxis + 'static,
{
    check_loadable(dataset, batch_size)?;
    let covered = if drop_remainder {
        whole_batches(dataset.len(), batch_size)
    } else {
        dataset.len()
    };
    let window = PartialDataset::new(Arc::new(dataset.clone()), 0, covered);
    let loader = DataLoaderBuilder::<DecoderSample<D::Smaller>, DecoderBatch<B>>::new(
        DecoderBatcher::<B>::new(device.clone()),
    )
    .batch_size(batch_size)
    .build(window);
    Ok((loader, covered))
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::dataset::{LogicalLabels, PhysicalLabels, SplitDataset};
    use crate::domain::sample::Split;
    use burn::backend::NdArray;
    use ndarray::{Array1, Array3, Array4};

    type TestBackend = NdArray;

    /// Sample b has syndrome value b everywhere and logical label b
    fn logical_dataset(n: usize) -> FrozenDataset<LogicalLabels> {
        let mut ds = SplitDataset::<LogicalLabels>::with_attached_labels(Split::Train);
        ds.insert(Array4::from_shape_fn((n, 1, 3, 3), |(b, _, _, _)| b as i32), None).unwrap();
        ds.freeze().unwrap();
        ds.attach_labels(Array1::from_iter(0..n as i32)).unwrap();
        ds.frozen().unwrap().clone()
    }

    fn collect_labels(loader: &DecoderLoader<TestBackend>) -> Vec<Vec<i32>> {
        loader.iter().map(|b| b.host_labels).collect()
    }

    #[test]
    fn test_partial_final_batch_is_kept() {
        let ds = logical_dataset(7);
        let (loader, covered) = sequential_loader::<TestBackend, _>(&ds, &Default::default(), 3, false).unwrap();
        assert_eq!(covered, 7);
        assert_eq!(collect_labels(&loader), vec![vec![0, 1, 2], vec![3, 4, 5], vec![6]]);
    }

    #[test]
    fn test_drop_remainder_skips_tail() {
        let ds = logical_dataset(7);
        let (loader, covered) = sequential_loader::<TestBackend, _>(&ds, &Default::default(), 3, true).unwrap();
        assert_eq!(covered, 6);
        assert_eq!(collect_labels(&loader), vec![vec![0, 1, 2], vec![3, 4, 5]]);
    }

    #[test]
    fn test_smaller_than_one_batch_covers_nothing() {
        let ds = logical_dataset(2);
        let (loader, covered) = sequential_loader::<TestBackend, _>(&ds, &Default::default(), 3, true).unwrap();
        assert_eq!(covered, 0);
        assert!(collect_labels(&loader).is_empty());
    }

    #[test]
    fn test_every_pass_is_a_permutation() {
        let ds = logical_dataset(10);
        let loader = shuffled_loader::<TestBackend, _>(&ds, &Default::default(), 4, 7).unwrap();
        let mut passes = Vec::new();
        for _ in 0..3 {
            let mut seen: Vec<i32> = collect_labels(&loader).into_iter().flatten().collect();
            passes.push(seen.clone());
            seen.sort_unstable();
            assert_eq!(seen, (0..10).collect::<Vec<_>>());
        }
        // fresh shuffle on each pass
        assert!(passes[0] != passes[1] || passes[1] != passes[2]);
    }

    #[test]
    fn test_collation_concatenates_in_order() {
        let ds = logical_dataset(4);
        let (loader, _) = sequential_loader::<TestBackend, _>(&ds, &Default::default(), 4, false).unwrap();
        let batch = loader.iter().next().unwrap();
        assert_eq!(batch.samples, 4);
        assert_eq!(batch.syndromes.dims(), [4, 1, 3, 3]);
        let values = batch.syndromes.into_data().convert::<f32>().to_vec::<f32>().unwrap();
        // sample 2 occupies the third block of nine values
        assert!(values[18..27].iter().all(|&v| v == 2.0));
    }

    #[test]
    fn test_physical_labels_flatten_per_position() {
        let mut ds = SplitDataset::<PhysicalLabels>::with_streamed_labels(Split::Valid);
        ds.insert(Array4::zeros((2, 1, 3, 3)), Some(Array3::from_elem((2, 3, 3), 1))).unwrap();
        ds.freeze().unwrap();
        let frozen = ds.frozen().unwrap();
        let (loader, _) = sequential_loader::<TestBackend, _>(frozen, &Default::default(), 2, false).unwrap();
        let batch = loader.iter().next().unwrap();
        assert_eq!(batch.labels.dims(), [18]);
        assert_eq!(batch.host_labels, vec![1; 18]);
    }

    #[test]
    fn test_unlabelled_dataset_cannot_be_batched() {
        let mut ds = SplitDataset::<LogicalLabels>::with_attached_labels(Split::Train);
        ds.insert(Array4::zeros((2, 1, 3, 3)), None).unwrap();
        ds.freeze().unwrap();
        let frozen = ds.frozen().unwrap();
        let err = shuffled_loader::<TestBackend, _>(frozen, &Default::default(), 2, 0).err();
        assert!(matches!(err, Some(DecoderError::Lifecycle(_))));
    }

    #[test]
    fn test_zero_batch_size_is_rejected() {
        let ds = logical_dataset(2);
        assert!(sequential_loader::<TestBackend, _>(&ds, &Default::default(), 0, false).is_err());
        assert_eq!(whole_batches(9, 4), 8);
    }
}
