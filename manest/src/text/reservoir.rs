//! Resonant reservoir: a complex-valued echo-state network.
//!
//! Fixed random topology, four physics constants, only the readout is trained.
//!
//! Per node `n`, one step with input phasor vector `x`:
//!
//! ```text
//!   u_n  = Σ_m W[n,m]·(z_m / B) + √dim·w_in[n]·x_n
//!   z_n ← (1 − decay) · e^{iω_n·dt} · (z_n + dt·beta·sat(u_n)) / (1 + dt·stiffness)
//! ```
//!
//! `sat(c) = tanh(|c|)·c/|c|` keeps the phase and caps the amplitude below 1.
//! The restoring term is integrated implicitly, so the map contracts for any
//! `dt > 0`, and every component obeys
//!
//! ```text
//!   |z_n| ≤ B = (1 − decay)·dt·beta / (dt·stiffness + decay)
//! ```
//!
//! Features handed to the readout are built from `s = z / B`:
//! `[Re s, Im s, |s|², Re(s²)]`, length `4·dim`, each entry in `[-1, 1]`.

use std::path::Path;

use num_complex::Complex64;
use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::artifact::{read_artifact, stage_artifact, write_artifact, ArtifactKind, StagedArtifact};
use crate::errors::{ManestError, Result};
use crate::text::tokenizer::{ResonantTokenizer, VocabularySnapshot};

pub const DEFAULT_SEED: u64 = 42;

/// Maximum recurrent connections per node.
const MAX_FAN_IN: usize = 16;

// ---------------------------------------------------------------------------
// PhysicsConfig
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PhysicsConfig {
    /// Coupling gain on the saturated drive.
    pub beta: f64,
    /// Integration step.
    pub dt: f64,
    /// Restoring-force gain.
    pub stiffness: f64,
    /// Leak rate per step, in `[0, 1)`.
    pub decay: f64,
}

impl Default for PhysicsConfig {
    fn default() -> Self {
        Self { beta: 25.0, dt: 0.5, stiffness: 0.9, decay: 0.01 }
    }
}

impl PhysicsConfig {
    pub fn validate(&self) -> Result<()> {
        let Self { beta, dt, stiffness, decay } = *self;
        if ![beta, dt, stiffness, decay].iter().all(|v| v.is_finite()) {
            return Err(ManestError::InvalidInput("physics values must be finite".to_string()));
        }
        if beta <= 0.0 {
            return Err(ManestError::InvalidInput(format!("beta must be > 0, got {beta}")));
        }
        if dt <= 0.0 {
            return Err(ManestError::InvalidInput(format!("dt must be > 0, got {dt}")));
        }
        if stiffness < 0.0 {
            return Err(ManestError::InvalidInput(format!("stiffness must be >= 0, got {stiffness}")));
        }
        if !(0.0..1.0).contains(&decay) {
            return Err(ManestError::InvalidInput(format!("decay must be in [0, 1), got {decay}")));
        }
        if dt * stiffness + decay <= 0.0 {
            return Err(ManestError::InvalidInput(
                "dt*stiffness + decay must be > 0 for the state to stay bounded".to_string(),
            ));
        }
        Ok(())
    }

    /// Per-component amplitude bound `B`.
    pub fn state_bound(&self) -> f64 {
        (1.0 - self.decay) * self.dt * self.beta / (self.dt * self.stiffness + self.decay)
    }
}

// ---------------------------------------------------------------------------
// Topology: fixed random weights
// ---------------------------------------------------------------------------

/// Fixed random weights. Generated once from a seed, then only ever persisted.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Topology {
    pub fan_in: usize,
    /// Source node of each recurrent connection, `fan_in` per target, row-major.
    pub sources: Vec<u32>,
    /// Complex weight of each recurrent connection.
    pub weights: Vec<Complex64>,
    /// Per-node input phasor.
    pub input: Vec<Complex64>,
    /// Per-node natural frequency in `[-π, π)`.
    pub omega: Vec<f64>,
}

impl Topology {
    /// Sparse complex recurrence with spectral radius ≈ 1
    /// (magnitude `1/√fan_in`, uniform random phase).
    pub fn generate(dim: usize, seed: u64) -> Self {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let fan_in = dim.min(MAX_FAN_IN);
        let mag = 1.0 / (fan_in.max(1) as f64).sqrt();
        let tau = std::f64::consts::TAU;

        let mut sources = Vec::with_capacity(dim * fan_in);
        let mut weights = Vec::with_capacity(dim * fan_in);
        for _ in 0..dim {
            for _ in 0..fan_in {
                sources.push(rng.gen_range(0..dim) as u32);
                weights.push(Complex64::from_polar(mag, rng.gen_range(0.0..tau)));
            }
        }

        let input = (0..dim)
            .map(|_| Complex64::from_polar(1.0, rng.gen_range(0.0..tau)))
            .collect();
        let omega = (0..dim)
            .map(|_| rng.gen_range(-std::f64::consts::PI..std::f64::consts::PI))
            .collect();

        Self { fan_in, sources, weights, input, omega }
    }

    fn check(&self, dim: usize) -> std::result::Result<(), String> {
        if self.fan_in > dim.max(1) {
            return Err(format!("fan_in {} exceeds dim {}", self.fan_in, dim));
        }
        let conns = dim * self.fan_in;
        if self.sources.len() != conns || self.weights.len() != conns {
            return Err(format!(
                "expected {} connections, found {}/{}",
                conns,
                self.sources.len(),
                self.weights.len()
            ));
        }
        if self.input.len() != dim || self.omega.len() != dim {
            return Err(format!(
                "expected {} input phasors and frequencies, found {}/{}",
                dim,
                self.input.len(),
                self.omega.len()
            ));
        }
        if let Some(&s) = self.sources.iter().find(|&&s| s as usize >= dim) {
            return Err(format!("connection source {s} out of range"));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// ReservoirLayer
// ---------------------------------------------------------------------------

#[derive(Clone, Debug)]
pub struct ReservoirLayer {
    dim: usize,
    config: PhysicsConfig,
    seed: u64,
    topology: Topology,
    state: Vec<Complex64>,
    /// Set once weights come from disk; physics can no longer change.
    finalized: bool,
    // Step-invariant coefficients, refreshed on every config change.
    gain: f64,
    drive: f64,
    rotors: Vec<Complex64>,
}

impl ReservoirLayer {
    /// New reservoir with default physics and seed.
    pub fn new(dim: usize) -> Self {
        Self::with_seed(dim, DEFAULT_SEED)
    }

    pub fn with_seed(dim: usize, seed: u64) -> Self {
        let topology = Topology::generate(dim, seed);
        let mut layer = Self {
            dim,
            config: PhysicsConfig::default(),
            seed,
            topology,
            state: vec![Complex64::new(0.0, 0.0); dim],
            finalized: false,
            gain: 0.0,
            drive: 0.0,
            rotors: Vec::new(),
        };
        layer.refresh_coefficients();
        layer
    }

    /// Set the physics constants. Rejected once the reservoir was loaded from disk.
    pub fn set_config(&mut self, beta: f64, dt: f64, stiffness: f64, decay: f64) -> Result<()> {
        if self.finalized {
            return Err(ManestError::Reconfigure(
                "physics are fixed after loading a persisted reservoir".to_string(),
            ));
        }
        let config = PhysicsConfig { beta, dt, stiffness, decay };
        config.validate()?;
        self.config = config;
        self.refresh_coefficients();
        Ok(())
    }

    fn refresh_coefficients(&mut self) {
        let PhysicsConfig { beta, dt, stiffness, decay } = self.config;
        self.gain = (1.0 - decay) / (1.0 + dt * stiffness);
        self.drive = dt * beta;
        self.rotors = self
            .topology
            .omega
            .iter()
            .map(|&w| Complex64::from_polar(self.gain, w * dt))
            .collect();
    }

    /// Advance one step and return the feature vector of the new state.
    ///
    /// Inputs shorter than `dim` are zero-padded; extra components are ignored.
    pub fn forward(&mut self, input_real: &[f64], input_imag: &[f64]) -> Vec<f64> {
        let dim = self.dim;
        let fan_in = self.topology.fan_in;
        let inv_bound = self.inv_bound();
        let input_gain = (dim as f64).sqrt();

        let mut next = Vec::with_capacity(dim);
        for n in 0..dim {
            let row = n * fan_in..(n + 1) * fan_in;
            let mut u = Complex64::new(0.0, 0.0);
            for (&src, &w) in self.topology.sources[row.clone()].iter().zip(&self.topology.weights[row]) {
                u += w * self.state[src as usize];
            }
            u *= inv_bound;

            let x = Complex64::new(
                input_real.get(n).copied().unwrap_or(0.0),
                input_imag.get(n).copied().unwrap_or(0.0),
            );
            u += self.topology.input[n] * x * input_gain;

            next.push(self.rotors[n] * (self.state[n] + sat(u) * self.drive));
        }
        self.state = next;

        self.get_state()
    }

    /// Feature vector `[Re s, Im s, |s|², Re(s²)]` for `s = z / B`. No side effects.
    pub fn get_state(&self) -> Vec<f64> {
        let dim = self.dim;
        let inv_bound = self.inv_bound();
        let mut features = vec![0.0; 4 * dim];
        for (n, z) in self.state.iter().enumerate() {
            let s = *z * inv_bound;
            features[n] = s.re;
            features[dim + n] = s.im;
            features[2 * dim + n] = s.norm_sqr();
            features[3 * dim + n] = s.re * s.re - s.im * s.im;
        }
        features
    }

    fn inv_bound(&self) -> f64 {
        let bound = self.config.state_bound();
        if bound > 0.0 { 1.0 / bound } else { 1.0 }
    }

    /// Zero the state, keeping topology and physics.
    pub fn reset(&mut self) {
        self.state.iter_mut().for_each(|z| *z = Complex64::new(0.0, 0.0));
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    /// Length of [`get_state`](Self::get_state).
    pub fn feature_dim(&self) -> usize {
        4 * self.dim
    }

    pub fn config(&self) -> PhysicsConfig {
        self.config
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    /// Raw complex state.
    pub fn state(&self) -> &[Complex64] {
        &self.state
    }

    pub fn state_norm(&self) -> f64 {
        self.state.iter().map(|z| z.norm_sqr()).sum::<f64>().sqrt()
    }

    /// Per-component amplitude bound for the current physics.
    pub fn state_bound(&self) -> f64 {
        self.config.state_bound()
    }

    // -----------------------------------------------------------------------
    // Persistence
    // -----------------------------------------------------------------------

    pub fn snapshot(&self) -> ReservoirSnapshot {
        ReservoirSnapshot {
            dim: self.dim,
            seed: self.seed,
            physics: self.config,
            topology: self.topology.clone(),
            state: self.state.clone(),
        }
    }

    /// Replace weights, physics and state with a snapshot of the same `dim`.
    pub fn restore(&mut self, snapshot: ReservoirSnapshot) -> Result<()> {
        if snapshot.dim != self.dim {
            return Err(ManestError::DimensionMismatch { expected: self.dim, got: snapshot.dim });
        }
        snapshot.physics.validate()?;
        snapshot.topology.check(snapshot.dim).map_err(ManestError::InvalidInput)?;
        if snapshot.state.len() != snapshot.dim {
            return Err(ManestError::DimensionMismatch { expected: snapshot.dim, got: snapshot.state.len() });
        }

        self.seed = snapshot.seed;
        self.config = snapshot.physics;
        self.topology = snapshot.topology;
        self.state = snapshot.state;
        self.finalized = true;
        self.refresh_coefficients();
        Ok(())
    }

    /// Persist topology, physics and state (no vocabulary).
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let artifact = BrainArtifact { reservoir: self.snapshot(), vocabulary: None };
        write_artifact(path.as_ref(), ArtifactKind::Brain, &artifact)
    }

    /// Persist the reservoir together with the tokenizer's embedding table.
    pub fn save_with_vocabulary(&self, path: impl AsRef<Path>, tokenizer: &ResonantTokenizer) -> Result<()> {
        let path = path.as_ref();
        self.stage_with_vocabulary(path, tokenizer)?.commit()?;
        info!(path = %path.display(), vocab = tokenizer.vocab_size(), "brain saved");
        Ok(())
    }

    /// Write the brain artifact beside `path` without replacing it yet.
    pub fn stage_with_vocabulary(
        &self,
        path: impl AsRef<Path>,
        tokenizer: &ResonantTokenizer,
    ) -> Result<StagedArtifact> {
        if tokenizer.dim != self.dim {
            return Err(ManestError::DimensionMismatch { expected: self.dim, got: tokenizer.dim });
        }
        let artifact = BrainArtifact {
            reservoir: self.snapshot(),
            vocabulary: Some(tokenizer.snapshot()),
        };
        stage_artifact(path.as_ref(), ArtifactKind::Brain, &artifact)
    }

    /// Restore from a brain artifact. Any decode or shape problem is a
    /// [`ManestError::CorruptArtifact`].
    pub fn load(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let artifact: BrainArtifact = read_artifact(path, ArtifactKind::Brain)?;
        self.restore(artifact.reservoir)
            .map_err(|e| ManestError::corrupt(path, e.to_string()))
    }

    /// Restore reservoir and tokenizer from one brain artifact.
    pub fn load_with_vocabulary(path: impl AsRef<Path>, dim: usize) -> Result<(Self, ResonantTokenizer)> {
        let path = path.as_ref();
        let artifact: BrainArtifact = read_artifact(path, ArtifactKind::Brain)?;

        let mut reservoir = Self::with_seed(dim, artifact.reservoir.seed);
        reservoir
            .restore(artifact.reservoir)
            .map_err(|e| ManestError::corrupt(path, e.to_string()))?;

        let vocabulary = artifact
            .vocabulary
            .ok_or_else(|| ManestError::corrupt(path, "no vocabulary section"))?;
        if vocabulary.dim != dim {
            return Err(ManestError::corrupt(
                path,
                format!("vocabulary dim {} does not match configured dim {}", vocabulary.dim, dim),
            ));
        }
        let tokenizer = ResonantTokenizer::from_snapshot(vocabulary)
            .map_err(|e| ManestError::corrupt(path, e.to_string()))?;

        info!(path = %path.display(), dim, vocab = tokenizer.vocab_size(), "brain loaded");
        Ok((reservoir, tokenizer))
    }
}

/// Saturating complex activation: phase kept, amplitude `tanh(|c|)`.
fn sat(c: Complex64) -> Complex64 {
    let r = c.norm();
    if r > 1e-12 {
        c * (r.tanh() / r)
    } else {
        c
    }
}

// ---------------------------------------------------------------------------
// Persisted form
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ReservoirSnapshot {
    pub dim: usize,
    pub seed: u64,
    pub physics: PhysicsConfig,
    pub topology: Topology,
    pub state: Vec<Complex64>,
}

/// Payload of the `.nawa` file.
#[derive(Clone, Debug, Serialize, Deserialize)]
struct BrainArtifact {
    reservoir: ReservoirSnapshot,
    vocabulary: Option<VocabularySnapshot>,
}
