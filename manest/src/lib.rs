//! Manest: a minimal character-level language model on a resonant reservoir.
//!
//! Core mapping:
//!   - Symbol = complex unit embedding (phase carries identity)
//!   - Context = state of a fixed complex echo-state reservoir
//!   - Prediction = ridge readout from reservoir features to the next embedding
//!   - Decoding = nearest stored embedding, fed back to keep generation on-vocabulary

pub mod errors;
pub mod types;
pub mod config;
pub mod artifact;
pub mod text;
