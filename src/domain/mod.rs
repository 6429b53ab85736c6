// ============================================================
// Layer 3 — Domain Layer
// ============================================================
// Plain Rust types and traits that define what the decoder
// pipeline works with. No Burn types here: host-side arrays are
// `ndarray` arrays, errors are a single `thiserror` enum.
//
// Reference: Rust Book §5 (Structs), §10 (Traits)

/// Error taxonomy shared by every layer
pub mod error;

/// Streamed sample batches, splits and stages
pub mod sample;

/// Capability traits for code arithmetic and validation scoring
pub mod traits;

/// Rectangular surface-code Pauli arithmetic
pub mod surface_code;

/// Per-stage validation correctness oracles
pub mod oracle;
