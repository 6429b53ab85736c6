// ============================================================
// Layer 4 — Split Dataset (SampleBuffer → FrozenDataset)
// ============================================================
// One data split for one decoder stage. Two states:
//
//   OPEN    — a SampleBuffer: append-only list of streamed batches
//   FROZEN  — a FrozenDataset: one concatenated syndrome array,
//             one concatenated label array, fixed length
//
// OPEN → FROZEN happens exactly once, through `freeze()`.
// A FrozenDataset is a Burn `Dataset`, so the data loaders batch
// it directly.
//
// Labels are generic over their ndarray dimension:
//   stage one: PhysicalLabels = Ix3 → [n, x, y]  streamed with the syndromes
//   stage two: LogicalLabels  = Ix1 → [n]        attached after freezing
//
// Reference: ndarray crate documentation (concatenate, index_axis)
//            Rust Book §6 (Enums and Pattern Matching)

use burn::data::dataset::Dataset;
use ndarray::{concatenate, Array, Array3, Array4, ArrayView, ArrayView4, Axis, Ix1, Ix3, RemoveAxis, Slice};

use crate::domain::error::{DecoderError, Result};
use crate::domain::sample::Split;

/// Per-position physical-error labels, `[n, x, y]`
pub type PhysicalLabels = Ix3;
/// Per-sample logical-error classes, `[n]`
pub type LogicalLabels = Ix1;

/// One indexed sample: a syndrome `[channel, x, y]` and its label
/// with the batch axis removed.
#[derive(Debug, Clone, PartialEq)]
pub struct DecoderSample<L: ndarray::Dimension> {
    pub syndrome: Array3<i32>,
    pub label:    Array<i32, L>,
}

// ─── SampleBuffer ─────────────────────────────────────────────────────────────
/// The OPEN state: batches in insertion order.
#[derive(Debug, Clone)]
pub struct SampleBuffer<D: RemoveAxis> {
    syndromes: Vec<Array4<i32>>,
    /// `None` for buffers whose labels are attached after freezing
    labels:    Option<Vec<Array<i32, D>>>,
}

impl<D: RemoveAxis> SampleBuffer<D> {
    fn new(streamed_labels: bool) -> Self {
        Self {
            syndromes: Vec::new(),
            labels:    streamed_labels.then(Vec::new),
        }
    }

    fn sample_count(&self) -> usize {
        self.syndromes.iter().map(|s| s.len_of(Axis(0))).sum()
    }

    fn insert(&mut self, syndromes: Array4<i32>, labels: Option<Array<i32, D>>) -> Result<()> {
        let n = syndromes.len_of(Axis(0));

        // Every batch after the first must match its non-batch shape
        if let Some(first) = self.syndromes.first() {
            if first.shape()[1..] != syndromes.shape()[1..] {
                return Err(DecoderError::shape(format!(
                    "syndrome batch shape {:?} does not match earlier batches {:?}",
                    &syndromes.shape()[1..],
                    &first.shape()[1..]
                )));
            }
        }

        match (&mut self.labels, labels) {
            (Some(stored), Some(labels)) => {
                if labels.len_of(Axis(0)) != n {
                    return Err(DecoderError::shape(format!(
                        "{n} syndromes but {} labels",
                        labels.len_of(Axis(0))
                    )));
                }
                if let Some(first) = stored.first() {
                    if first.shape()[1..] != labels.shape()[1..] {
                        return Err(DecoderError::shape(format!(
                            "label batch shape {:?} does not match earlier batches {:?}",
                            &labels.shape()[1..],
                            &first.shape()[1..]
                        )));
                    }
                }
                stored.push(labels);
            }
            (None, None) => {}
            (Some(_), None) => {
                return Err(DecoderError::shape("this buffer requires streamed labels"));
            }
            (None, Some(_)) => {
                return Err(DecoderError::shape(
                    "this buffer takes labels only after freezing",
                ));
            }
        }

        self.syndromes.push(syndromes);
        Ok(())
    }

    fn freeze(&self, split: Split) -> Result<FrozenDataset<D>> {
        if self.syndromes.is_empty() {
            return Err(DecoderError::empty(format!("no batches inserted into {split} split")));
        }
        if self.sample_count() == 0 {
            return Err(DecoderError::empty(format!("{split} split holds zero samples")));
        }

        let views: Vec<ArrayView4<'_, i32>> = self.syndromes.iter().map(|a| a.view()).collect();
        let syndromes = concatenate(Axis(0), &views)
            .map_err(|e| DecoderError::shape(e.to_string()))?;

        let labels = match &self.labels {
            Some(stored) => {
                let views: Vec<ArrayView<'_, i32, D>> = stored.iter().map(|a| a.view()).collect();
                Some(concatenate(Axis(0), &views).map_err(|e| DecoderError::shape(e.to_string()))?)
            }
            None => None,
        };

        let length = syndromes.len_of(Axis(0));
        Ok(FrozenDataset { split, syndromes, labels, length })
    }
}

// ─── FrozenDataset ────────────────────────────────────────────────────────────
/// The FROZEN state: immutable samples with a length fixed at creation.
#[derive(Debug, Clone)]
pub struct FrozenDataset<D: RemoveAxis> {
    split:     Split,
    syndromes: Array4<i32>,
    labels:    Option<Array<i32, D>>,
    length:    usize,
}

impl<D: RemoveAxis> FrozenDataset<D> {
    pub fn split(&self) -> Split {
        self.split
    }

    pub fn len(&self) -> usize {
        self.length
    }

    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    pub fn has_labels(&self) -> bool {
        self.labels.is_some()
    }

    /// `(channels, x, y)` of every syndrome in the dataset
    pub fn syndrome_shape(&self) -> (usize, usize, usize) {
        let (_, c, x, y) = self.syndromes.dim();
        (c, x, y)
    }

    pub fn syndromes(&self) -> ArrayView4<'_, i32> {
        self.syndromes.view()
    }

    pub fn labels(&self) -> Option<ArrayView<'_, i32, D>> {
        self.labels.as_ref().map(|l| l.view())
    }

    /// The sample at `index`. Labels must be present.
    pub fn get(&self, index: usize) -> Result<DecoderSample<D::Smaller>> {
        if index >= self.length {
            return Err(DecoderError::Index { index, length: self.length });
        }
        let labels = self.labels.as_ref().ok_or_else(|| {
            DecoderError::lifecycle(format!("{} split has no labels attached yet", self.split))
        })?;
        Ok(DecoderSample {
            syndrome: self.syndromes.index_axis(Axis(0), index).to_owned(),
            label:    labels.index_axis(Axis(0), index).to_owned(),
        })
    }

    /// Attach labels to a dataset frozen without them.
    pub fn attach_labels(&mut self, labels: Array<i32, D>) -> Result<()> {
        if self.labels.is_some() {
            return Err(DecoderError::lifecycle(format!(
                "{} split already carries labels",
                self.split
            )));
        }
        let count = labels.len_of(Axis(0));
        if count != self.length {
            return Err(DecoderError::shape(format!(
                "{count} labels for a {} split of length {}",
                self.split, self.length
            )));
        }
        self.labels = Some(labels);
        Ok(())
    }

    /// A new frozen dataset holding the first `n` samples.
    pub fn head(&self, n: usize) -> Result<FrozenDataset<D>> {
        if n > self.length {
            return Err(DecoderError::Index { index: n, length: self.length });
        }
        if n == 0 {
            return Err(DecoderError::empty(format!("empty prefix of {} split", self.split)));
        }
        let range = Slice::from(0..n);
        Ok(FrozenDataset {
            split:     self.split,
            syndromes: self.syndromes.slice_axis(Axis(0), range).to_owned(),
            labels:    self.labels.as_ref().map(|l| l.slice_axis(Axis(0), range).to_owned()),
            length:    n,
        })
    }
}

// Yields nothing while labels are missing; loaders check `has_labels` first.
impl<D: RemoveAxis> Dataset<DecoderSample<D::Smaller>> for FrozenDataset<D> {
    fn get(&self, index: usize) -> Option<DecoderSample<D::Smaller>> {
        FrozenDataset::get(self, index).ok()
    }

    fn len(&self) -> usize {
        self.length
    }
}

// ─── SplitDataset ─────────────────────────────────────────────────────────────
#[derive(Debug, Clone)]
enum DatasetState<D: RemoveAxis> {
    Open(SampleBuffer<D>),
    Frozen(FrozenDataset<D>),
}

/// A split's dataset for one stage, carrying its own lifecycle.
#[derive(Debug, Clone)]
pub struct SplitDataset<D: RemoveAxis> {
    split: Split,
    state: DatasetState<D>,
}

impl<D: RemoveAxis> SplitDataset<D> {
    /// Labels arrive with each inserted batch (stage one).
    pub fn with_streamed_labels(split: Split) -> Self {
        Self { split, state: DatasetState::Open(SampleBuffer::new(true)) }
    }

    /// Labels are attached after freezing (stage two).
    pub fn with_attached_labels(split: Split) -> Self {
        Self { split, state: DatasetState::Open(SampleBuffer::new(false)) }
    }

    pub fn split(&self) -> Split {
        self.split
    }

    pub fn is_frozen(&self) -> bool {
        matches!(self.state, DatasetState::Frozen(_))
    }

    /// Samples inserted so far, in either state.
    pub fn sample_count(&self) -> usize {
        match &self.state {
            DatasetState::Open(buffer)   => buffer.sample_count(),
            DatasetState::Frozen(frozen) => frozen.len(),
        }
    }

    pub fn insert(&mut self, syndromes: Array4<i32>, labels: Option<Array<i32, D>>) -> Result<()> {
        match &mut self.state {
            DatasetState::Open(buffer) => buffer.insert(syndromes, labels),
            DatasetState::Frozen(_) => Err(DecoderError::lifecycle(format!(
                "insert into frozen {} split",
                self.split
            ))),
        }
    }

    pub fn freeze(&mut self) -> Result<()> {
        let frozen = match &self.state {
            DatasetState::Open(buffer) => buffer.freeze(self.split)?,
            DatasetState::Frozen(_) => {
                return Err(DecoderError::lifecycle(format!(
                    "{} split is already frozen",
                    self.split
                )));
            }
        };
        tracing::debug!("Froze {} split with {} samples", self.split, frozen.len());
        self.state = DatasetState::Frozen(frozen);
        Ok(())
    }

    pub fn frozen(&self) -> Result<&FrozenDataset<D>> {
        match &self.state {
            DatasetState::Frozen(frozen) => Ok(frozen),
            DatasetState::Open(_) => Err(DecoderError::lifecycle(format!(
                "{} split is not frozen yet",
                self.split
            ))),
        }
    }

    fn frozen_mut(&mut self) -> Result<&mut FrozenDataset<D>> {
        match &mut self.state {
            DatasetState::Frozen(frozen) => Ok(frozen),
            DatasetState::Open(_) => Err(DecoderError::lifecycle(format!(
                "{} split is not frozen yet",
                self.split
            ))),
        }
    }

    pub fn len(&self) -> Result<usize> {
        self.frozen().map(FrozenDataset::len)
    }

    pub fn get(&self, index: usize) -> Result<DecoderSample<D::Smaller>> {
        self.frozen()?.get(index)
    }

    pub fn attach_labels(&mut self, labels: Array<i32, D>) -> Result<()> {
        self.frozen_mut()?.attach_labels(labels)
    }
}
