// ============================================================
// Layer 4 — Data Pipeline
// ============================================================
// Everything between a streamed sample batch and a device
// tensor batch:
//
//   SyndromeSimulator  → generates (syndrome, error) batches
//       │
//       ▼
//   SplitDataset       → OPEN buffer, then FROZEN dataset
//       │
//       ▼
//   DataLoader         → shuffled or ordered batches of samples
//       │
//       ▼
//   DecoderBatcher     → collates samples into Burn tensors
//
// Reference: Burn Book §4 (Datasets and Dataloaders)

/// Split datasets with the append → freeze lifecycle
pub mod dataset;

/// Implements Burn's Batcher trait and builds the data loaders
pub mod batcher;

/// I.i.d. noise simulator for the rectangular surface code
pub mod simulator;
