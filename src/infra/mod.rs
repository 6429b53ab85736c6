// ============================================================
// Layer 6 — Infrastructure Layer
// ============================================================
// Cross-cutting persistence used by the trainer and the
// pipeline:
//
//   checkpoint.rs — stage model weights via Burn's
//                   CompactRecorder, and the run configuration
//                   as JSON.
//
//   metrics.rs    — per-epoch CSV of losses, validation
//                   accuracy and checkpoint writes.
//
// Reference: Rust Book §7 (Modules)
//            Burn Book §5 (Checkpointing)

/// Model checkpoint saving and loading
pub mod checkpoint;

/// Training metrics CSV logger
pub mod metrics;
