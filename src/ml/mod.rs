// ============================================================
// Layer 5 — ML / Model Layer (Burn)
// ============================================================
// The two decoder stages and everything that drives them:
//
//   model.rs    — StageModel capability trait, the per-qubit
//                 stage-one decoder, the per-sample stage-two
//                 decoder and host-side arg-max
//
//   trainer.rs  — fixed-epoch train/validate loop with the
//                 best-accuracy checkpoint policy
//
//   labeler.rs  — runs a trained stage-one model over a split
//                 and attaches logical-error labels to the
//                 stage-two dataset
//
// Reference: Burn Book §3 (Building Blocks)
//            Burn Book §5 (Training)

/// Decoder architectures behind the StageModel trait
pub mod model;

/// Stage training loop with checkpointing
pub mod trainer;

/// Stage-one → stage-two label derivation
pub mod labeler;
