//! Brain engine: owns tokenizer, reservoir and readout for one session.
//!
//! Lifecycle:
//!   - `initialize`: restore the brain (`.nawa`) and readout if present,
//!     otherwise build a fresh reservoir with the configured physics.
//!   - `train`: one pass over the corpus, next-character targets, one ridge
//!     solve, then both artifacts are saved.
//!   - chat lives in [`super::chat`].

use serde::Serialize;
use tracing::info;

use crate::config::BrainConfig;
use crate::errors::{ManestError, Result};
use super::readout::ReadoutLayer;
use super::reservoir::ReservoirLayer;
use super::tokenizer::ResonantTokenizer;

// ---------------------------------------------------------------------------
// TrainReport
// ---------------------------------------------------------------------------

/// Summary of one `train` call.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TrainReport {
    /// Characters driven through the reservoir.
    pub characters: usize,
    pub vocab_size: usize,
    pub feature_dim: usize,
    pub output_dim: usize,
}

// ---------------------------------------------------------------------------
// BrainEngine
// ---------------------------------------------------------------------------

pub struct BrainEngine {
    pub config: BrainConfig,
    pub tokenizer: ResonantTokenizer,
    pub reservoir: ReservoirLayer,
    pub readout: ReadoutLayer,
}

impl BrainEngine {
    /// In-memory engine with nothing loaded from disk.
    pub fn new(config: BrainConfig) -> Result<Self> {
        config.validate()?;
        let dim = config.core.dim;
        let tokenizer = ResonantTokenizer::new(dim);
        let mut reservoir = ReservoirLayer::new(dim);
        let phy = config.physics;
        reservoir.set_config(phy.beta, phy.dt, phy.stiffness, phy.decay)?;
        let readout = ReadoutLayer::new(dim * 4, dim * 2, config.training.alpha);
        Ok(Self { config, tokenizer, reservoir, readout })
    }

    /// Build the engine, restoring any artifacts under `storage.path`.
    ///
    /// A present but unreadable artifact is fatal; nothing falls back to defaults.
    pub fn initialize(config: BrainConfig) -> Result<Self> {
        std::fs::create_dir_all(&config.storage.path)?;
        info!(name = %config.name, dim = config.core.dim, "initializing");

        let mut engine = Self::new(config)?;
        let brain_file = engine.config.brain_file();
        if brain_file.exists() {
            info!(path = %brain_file.display(), "loading brain structure");
            let (reservoir, tokenizer) =
                ReservoirLayer::load_with_vocabulary(&brain_file, engine.config.core.dim)?;
            if reservoir.config() != engine.config.physics {
                info!("persisted physics differ from config; keeping persisted values");
            }
            engine.reservoir = reservoir;
            engine.tokenizer = tokenizer;
        } else {
            info!("creating new brain structure");
        }

        let readout_file = engine.config.readout_file();
        if readout_file.exists() {
            info!(path = %readout_file.display(), "loading readout");
            engine.readout.load(&readout_file)?;
            let configured = engine.config.training.alpha;
            if engine.readout.alpha() != configured {
                info!(persisted = engine.readout.alpha(), configured, "refitting will use configured alpha");
            }
            engine.readout.set_alpha(configured)?;
        }
        Ok(engine)
    }

    pub fn dim(&self) -> usize {
        self.config.core.dim
    }

    pub fn is_trained(&self) -> bool {
        self.readout.is_trained()
    }

    /// Next-character training over a flattened corpus, then save.
    ///
    /// Target at step `t` is character `t + 1`; the last target is a space.
    /// On error nothing is written.
    pub fn train(&mut self, corpus: &str) -> Result<TrainReport> {
        let report = self.fit_corpus(corpus)?;
        self.save()?;
        Ok(report)
    }

    /// [`train`](Self::train) without saving.
    pub fn fit_corpus(&mut self, corpus: &str) -> Result<TrainReport> {
        if corpus.trim().is_empty() {
            return Err(ManestError::EmptyCorpus("corpus is empty".to_string()));
        }

        let inputs = self.tokenizer.encode_ids(corpus);
        let mut shifted: String = corpus.chars().skip(1).collect();
        shifted.push(' ');
        let targets = self.tokenizer.encode_ids(&shifted);
        info!(characters = inputs.len(), vocab = self.tokenizer.vocab_size(), "resonating corpus");

        let dim = self.dim();
        let mut acc = self.readout.accumulator();
        let mut target = vec![0.0; 2 * dim];
        for (&input, &next) in inputs.iter().zip(&targets) {
            let (xr, xi) = embedding_of(&self.tokenizer, input)?;
            let state = self.reservoir.forward(xr, xi);

            let (tr, ti) = embedding_of(&self.tokenizer, next)?;
            target[..dim].copy_from_slice(tr);
            target[dim..].copy_from_slice(ti);
            acc.push(&state, &target)?;
        }

        info!(samples = acc.samples(), "fitting readout");
        self.readout.fit_accumulated(&acc)?;

        Ok(TrainReport {
            characters: inputs.len(),
            vocab_size: self.tokenizer.vocab_size(),
            feature_dim: self.readout.input_dim,
            output_dim: self.readout.output_dim,
        })
    }

    /// Write the brain (reservoir + vocabulary) and, if trained, the readout.
    ///
    /// Both artifacts are fully written before either destination is
    /// replaced; the readout is committed first.
    pub fn save(&self) -> Result<()> {
        let brain_file = self.config.brain_file();
        let brain = self.reservoir.stage_with_vocabulary(&brain_file, &self.tokenizer)?;
        if self.readout.is_trained() {
            let readout_file = self.config.readout_file();
            self.readout.stage(&readout_file)?.commit()?;
            info!(path = %readout_file.display(), "readout saved");
        }
        brain.commit()?;
        info!(path = %brain_file.display(), vocab = self.tokenizer.vocab_size(), "brain saved");
        Ok(())
    }

    /// Feed text through the reservoir without predicting.
    pub fn prime(&mut self, text: &str) {
        let encoded = self.tokenizer.encode(text);
        for (re, im) in encoded.iter() {
            self.reservoir.forward(re, im);
        }
    }

    /// Predict from the current state and snap to the nearest symbol.
    ///
    /// Returns the symbol index and its character.
    pub fn predict_next(&self) -> Result<(usize, char)> {
        let dim = self.dim();
        let prediction = self.readout.predict(&self.reservoir.get_state())?;
        let index = self.tokenizer.decode(&prediction[..dim], &prediction[dim..]);
        let symbol = self
            .tokenizer
            .symbol(index)
            .ok_or_else(|| ManestError::InvalidInput("vocabulary is empty".to_string()))?;
        Ok((index, symbol))
    }

    /// Feed the stored embedding of symbol `index` back into the reservoir.
    pub fn feed_symbol(&mut self, index: usize) -> Result<()> {
        let (re, im) = embedding_of(&self.tokenizer, index)?;
        self.reservoir.forward(re, im);
        Ok(())
    }
}

fn embedding_of(tokenizer: &ResonantTokenizer, index: usize) -> Result<(&[f64], &[f64])> {
    tokenizer
        .embedding(index)
        .ok_or_else(|| ManestError::InvalidInput(format!("symbol {index} is not in the vocabulary")))
}
