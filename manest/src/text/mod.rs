//! Resonant character language model.
//!
//! A character-level model on reservoir computing: characters become complex
//! unit embeddings, a fixed complex-valued recurrent reservoir turns the
//! sequence into states, and a ridge-regression readout maps each state to
//! the embedding of the next character.
//!
//! Architecture:
//!   - Tokenizer: characters ↔ resonant embeddings (append-only vocabulary)
//!   - Reservoir: fixed random complex recurrence, bounded by construction
//!   - Readout: closed-form ridge regression, the only trained part
//!   - Engine: one session's tokenizer + reservoir + readout, training protocol
//!   - Chat: autoregressive generation as an explicit state machine
//!
//! Flow:
//!   text → encode → reservoir.forward per char → features
//!        → readout.fit (train) / readout.predict (chat) → decode → next char

pub mod tokenizer;
pub mod reservoir;
pub mod readout;
pub mod corpus;
pub mod engine;
pub mod chat;
