// ============================================================
// Layer 2 — Application / Use Cases
// ============================================================
// Workflow coordination only: no model math and no printing.
//
//   pipeline.rs       — the stateful ingest → freeze → train
//                       orchestrator behind every control call
//
//   train_use_case.rs — simulate data, stream it into a
//                       Pipeline and run both stages
//
// Reference: Clean Architecture pattern
//            Rust Book §7 (Module System)

/// Two-stage training orchestrator and its lifecycle
pub mod pipeline;

/// The end-to-end training workflow
pub mod train_use_case;
