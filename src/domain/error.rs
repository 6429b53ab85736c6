// ============================================================
// Layer 3 — Error Taxonomy
// ============================================================
// Every failure the pipeline can surface to a caller.
// None of these are recovered at the point of origin: the
// current call aborts and the error travels up with `?`.
//
//   Lifecycle     — operation invalid for the current state
//                   (insert after freeze, re-freeze, re-run)
//   EmptyDataset  — freeze or training with zero samples
//   ShapeMismatch — label/sample count or batch shape disagrees
//   Index         — dataset access outside [0, length)
//   InvalidClass  — a physical-error value outside the Pauli classes
//
// Reference: thiserror crate documentation
//            Rust Book §9 (Error Handling)

use thiserror::Error;

pub type Result<T> = std::result::Result<T, DecoderError>;

#[derive(Error, Debug)]
pub enum DecoderError {
    #[error("lifecycle error: {0}")]
    Lifecycle(String),

    #[error("empty dataset: {0}")]
    EmptyDataset(String),

    #[error("shape mismatch: {0}")]
    ShapeMismatch(String),

    #[error("index {index} out of range for dataset of length {length}")]
    Index { index: usize, length: usize },

    #[error("sample {sample} holds error class {value}, expected 0..{classes}")]
    InvalidClass { sample: usize, value: i32, classes: usize },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("checkpoint error at '{path}': {message}")]
    Checkpoint { path: String, message: String },

    #[error("tensor data error: {0}")]
    TensorData(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serde_json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl DecoderError {
    pub(crate) fn lifecycle<S: Into<String>>(msg: S) -> Self {
        Self::Lifecycle(msg.into())
    }

    pub(crate) fn shape<S: Into<String>>(msg: S) -> Self {
        Self::ShapeMismatch(msg.into())
    }

    pub(crate) fn empty<S: Into<String>>(msg: S) -> Self {
        Self::EmptyDataset(msg.into())
    }
}
