//! Error types shared across the decoding pipeline.

use thiserror::Error;

/// Errors produced while scoring or decoding.
#[derive(Debug, Error)]
pub enum InferenceError {
    /// Temperature scaling is undefined for non-positive values.
    #[error("temperature must be positive, got {0}")]
    InvalidTemperature(f32),

    /// The oracle was asked to score an empty token sequence.
    #[error("cannot score an empty input sequence")]
    EmptyInput,

    /// A token id fell outside the model vocabulary.
    #[error("token id {id} outside vocabulary of size {vocab_size}")]
    TokenOutOfRange { id: usize, vocab_size: usize },

    /// The context grew past the maximum sequence length the model supports.
    #[error("position {position} exceeds maximum sequence length {max_seq_len}")]
    ContextOverflow { position: usize, max_seq_len: usize },

    /// A failure inside the scoring oracle; propagated unchanged, no retries.
    #[error("oracle failure: {0}")]
    Oracle(String),
}

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, InferenceError>;
