//! Turn-based dialogue generation over a causal language model.
//!
//! The core is the restricted-sampling pipeline: [`filter`] shapes one step's
//! logits into a candidate set, [`sampler`] draws from it, and [`decoder`]
//! runs the fixed-length incremental decode loop against an opaque scoring
//! oracle. Everything else is boundary glue: [`model`] is a reference oracle,
//! [`tokenizer`] and [`history`] handle the text/context boundary, and
//! [`context`] persists finished exchanges for the chat binary.

pub mod context;
pub mod decoder;
pub mod error;
pub mod filter;
pub mod history;
pub mod model;
pub mod sampler;
pub mod tokenizer;

pub use decoder::{DecodeParams, Decoder, Oracle, Step};
pub use error::{InferenceError, Result};
pub use filter::{softmax, top_filtering, FILTER_VALUE};
pub use sampler::Sampler;
