//! Resonant tokenizer: characters ↔ complex unit embeddings.
//!
//! Every character gets one row in an append-only embedding table the first
//! time it is seen. Row `i` is a vector of `dim` phasors `e^{iθ}/√dim`, with
//! phases drawn from a ChaCha8 stream seeded by the tokenizer seed and `i`,
//! so the whole table has unit norm per row and is reproducible.
//!
//! Decoding is a nearest-neighbor search over the table using the real part
//! of the complex inner product. Because every row has the same norm this is
//! the same ranking as Euclidean distance.

use std::collections::HashMap;

use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::errors::{ManestError, Result};
use crate::types::{resonance, ComplexVec};

pub const DEFAULT_SEED: u64 = 42;

// ---------------------------------------------------------------------------
// SymbolRegistry: ordered, append-only vocabulary
// ---------------------------------------------------------------------------

/// Ordered vocabulary. Insertion order is the symbol index; nothing is ever removed.
#[derive(Clone, Debug, Default)]
pub struct SymbolRegistry {
    symbols: Vec<char>,
    index: HashMap<char, usize>,
}

impl SymbolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn from_symbols(symbols: Vec<char>) -> Option<Self> {
        let mut index = HashMap::with_capacity(symbols.len());
        for (i, &c) in symbols.iter().enumerate() {
            if index.insert(c, i).is_some() {
                return None;
            }
        }
        Some(Self { symbols, index })
    }

    pub fn get(&self, c: char) -> Option<usize> {
        self.index.get(&c).copied()
    }

    /// Index of `c`, and whether it was newly appended.
    pub fn intern(&mut self, c: char) -> (usize, bool) {
        if let Some(&i) = self.index.get(&c) {
            return (i, false);
        }
        let i = self.symbols.len();
        self.symbols.push(c);
        self.index.insert(c, i);
        (i, true)
    }

    pub fn symbol(&self, index: usize) -> Option<char> {
        self.symbols.get(index).copied()
    }

    pub fn symbols(&self) -> &[char] {
        &self.symbols
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }
}

// ---------------------------------------------------------------------------
// ResonantTokenizer
// ---------------------------------------------------------------------------

#[derive(Clone, Debug)]
pub struct ResonantTokenizer {
    pub dim: usize,
    seed: u64,
    registry: SymbolRegistry,
    /// Real parts, one row per symbol.
    pub embeddings_r: Vec<Vec<f64>>,
    /// Imaginary parts, one row per symbol.
    pub embeddings_i: Vec<Vec<f64>>,
}

impl ResonantTokenizer {
    pub fn new(dim: usize) -> Self {
        Self::with_seed(dim, DEFAULT_SEED)
    }

    pub fn with_seed(dim: usize, seed: u64) -> Self {
        Self {
            dim,
            seed,
            registry: SymbolRegistry::new(),
            embeddings_r: Vec::new(),
            embeddings_i: Vec::new(),
        }
    }

    /// Encode `text`, growing the vocabulary for unseen characters.
    ///
    /// The returned view resolves embeddings lazily by index; call
    /// [`Encoded::to_parts`] to materialize `(real_seq, imag_seq)`.
    pub fn encode(&mut self, text: &str) -> Encoded<'_> {
        let ids = self.encode_ids(text);
        Encoded { tokenizer: self, ids }
    }

    /// Encode `text` to symbol indices, growing the vocabulary as needed.
    pub fn encode_ids(&mut self, text: &str) -> Vec<usize> {
        text.chars().map(|c| self.intern(c)).collect()
    }

    fn intern(&mut self, c: char) -> usize {
        let (index, fresh) = self.registry.intern(c);
        if fresh {
            let row = embedding_for(self.seed, index, self.dim);
            self.embeddings_r.push(row.real());
            self.embeddings_i.push(row.imag());
        }
        index
    }

    /// Index of the row most resonant with `(real, imag)`.
    ///
    /// Total: ties and NaN scores fall back to the lowest index, and an
    /// empty vocabulary yields 0.
    pub fn decode(&self, real: &[f64], imag: &[f64]) -> usize {
        let mut best = 0usize;
        let mut best_score = f64::NEG_INFINITY;
        for (i, (er, ei)) in self.embeddings_r.iter().zip(&self.embeddings_i).enumerate() {
            let score = resonance(er, ei, real, imag);
            if score > best_score {
                best_score = score;
                best = i;
            }
        }
        best
    }

    /// Decode a sequence of predicted vectors into text.
    pub fn decode_sequence(&self, reals: &[Vec<f64>], imags: &[Vec<f64>]) -> String {
        reals
            .iter()
            .zip(imags)
            .filter_map(|(r, i)| self.registry.symbol(self.decode(r, i)))
            .collect()
    }

    pub fn symbol(&self, index: usize) -> Option<char> {
        self.registry.symbol(index)
    }

    pub fn index_of(&self, c: char) -> Option<usize> {
        self.registry.get(c)
    }

    /// Stored `(real, imag)` embedding of symbol `index`.
    pub fn embedding(&self, index: usize) -> Option<(&[f64], &[f64])> {
        Some((
            self.embeddings_r.get(index)?.as_slice(),
            self.embeddings_i.get(index)?.as_slice(),
        ))
    }

    pub fn vocab_size(&self) -> usize {
        self.registry.len()
    }

    pub fn symbols(&self) -> &[char] {
        self.registry.symbols()
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn snapshot(&self) -> VocabularySnapshot {
        VocabularySnapshot {
            dim: self.dim,
            seed: self.seed,
            symbols: self.registry.symbols().to_vec(),
            embeddings_r: self.embeddings_r.clone(),
            embeddings_i: self.embeddings_i.clone(),
        }
    }

    /// Rebuild a tokenizer from persisted state. The stored table is used
    /// verbatim rather than regenerated.
    pub fn from_snapshot(snapshot: VocabularySnapshot) -> Result<Self> {
        let VocabularySnapshot { dim, seed, symbols, embeddings_r, embeddings_i } = snapshot;
        let rows = symbols.len();
        if embeddings_r.len() != rows || embeddings_i.len() != rows {
            return Err(ManestError::InvalidInput(format!(
                "vocabulary has {rows} symbols but {}/{} embedding rows",
                embeddings_r.len(),
                embeddings_i.len()
            )));
        }
        if let Some(row) = embeddings_r.iter().chain(&embeddings_i).find(|r| r.len() != dim) {
            return Err(ManestError::DimensionMismatch { expected: dim, got: row.len() });
        }
        let registry = SymbolRegistry::from_symbols(symbols)
            .ok_or_else(|| ManestError::InvalidInput("duplicate symbol in vocabulary".to_string()))?;
        Ok(Self { dim, seed, registry, embeddings_r, embeddings_i })
    }
}

/// Deterministic embedding row for vocabulary slot `index`.
fn embedding_for(seed: u64, index: usize, dim: usize) -> ComplexVec {
    let stream = seed ^ (index as u64).wrapping_add(1).wrapping_mul(0x9E37_79B9_7F4A_7C15);
    let mut rng = ChaCha8Rng::seed_from_u64(stream);
    let phases: Vec<f64> = (0..dim)
        .map(|_| rng.gen_range(0.0..std::f64::consts::TAU))
        .collect();
    ComplexVec::from_phases(&phases)
}

// ---------------------------------------------------------------------------
// Encoded: lazily resolved embedding sequence
// ---------------------------------------------------------------------------

/// Result of [`ResonantTokenizer::encode`].
pub struct Encoded<'a> {
    tokenizer: &'a ResonantTokenizer,
    ids: Vec<usize>,
}

impl<'a> Encoded<'a> {
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn ids(&self) -> &[usize] {
        &self.ids
    }

    /// `(real, imag)` embedding at position `t`.
    pub fn get(&self, t: usize) -> Option<(&'a [f64], &'a [f64])> {
        let id = *self.ids.get(t)?;
        self.tokenizer.embedding(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'a [f64], &'a [f64])> + '_ {
        let tokenizer = self.tokenizer;
        self.ids.iter().filter_map(move |&id| tokenizer.embedding(id))
    }

    /// Materialize as `(real_seq, imag_seq)`.
    pub fn to_parts(&self) -> (Vec<Vec<f64>>, Vec<Vec<f64>>) {
        self.iter().map(|(r, i)| (r.to_vec(), i.to_vec())).unzip()
    }
}

// ---------------------------------------------------------------------------
// Persistence
// ---------------------------------------------------------------------------

/// Embedding table as stored inside the brain artifact.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VocabularySnapshot {
    pub dim: usize,
    pub seed: u64,
    pub symbols: Vec<char>,
    pub embeddings_r: Vec<Vec<f64>>,
    pub embeddings_i: Vec<Vec<f64>>,
}
