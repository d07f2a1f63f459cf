//! Ridge readout: the only trained component.
//!
//! Maps reservoir features (`4·dim`) to a target embedding (`2·dim`, real
//! parts then imaginary parts) with a bias-free linear map
//!
//! ```text
//!   W_out = (XᵀX + αI)⁻¹ XᵀY
//! ```
//!
//! solved in closed form through a Cholesky factorization of the
//! regularized Gram matrix. `α > 0` makes that matrix positive definite even
//! when there are fewer samples than features.
//!
//! Training streams samples into a [`RidgeAccumulator`], so the `N × 4·dim`
//! state matrix never has to exist in memory.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::artifact::{read_artifact, stage_artifact, ArtifactKind, StagedArtifact};
use crate::errors::{ManestError, Result};

// ---------------------------------------------------------------------------
// RidgeAccumulator: streaming normal equations
// ---------------------------------------------------------------------------

/// Running `XᵀX` (upper triangle) and `XᵀY`.
#[derive(Clone, Debug)]
pub struct RidgeAccumulator {
    input_dim: usize,
    output_dim: usize,
    /// input_dim × input_dim, row-major; only `j >= i` is filled until solve.
    xtx: Vec<f64>,
    /// input_dim × output_dim, row-major.
    xty: Vec<f64>,
    samples: usize,
}

impl RidgeAccumulator {
    pub fn new(input_dim: usize, output_dim: usize) -> Self {
        Self {
            input_dim,
            output_dim,
            xtx: vec![0.0; input_dim * input_dim],
            xty: vec![0.0; input_dim * output_dim],
            samples: 0,
        }
    }

    /// Add one `(x, y)` pair.
    pub fn push(&mut self, x: &[f64], y: &[f64]) -> Result<()> {
        if x.len() != self.input_dim {
            return Err(ManestError::DimensionMismatch { expected: self.input_dim, got: x.len() });
        }
        if y.len() != self.output_dim {
            return Err(ManestError::DimensionMismatch { expected: self.output_dim, got: y.len() });
        }

        let fd = self.input_dim;
        let od = self.output_dim;
        for i in 0..fd {
            let xi = x[i];
            if xi == 0.0 {
                continue;
            }
            let row = &mut self.xtx[i * fd..(i + 1) * fd];
            for j in i..fd {
                row[j] += xi * x[j];
            }
            let out = &mut self.xty[i * od..(i + 1) * od];
            for (o, &yo) in out.iter_mut().zip(y) {
                *o += xi * yo;
            }
        }
        self.samples += 1;
        Ok(())
    }

    pub fn samples(&self) -> usize {
        self.samples
    }

    pub fn input_dim(&self) -> usize {
        self.input_dim
    }

    pub fn output_dim(&self) -> usize {
        self.output_dim
    }

    /// Solve `(XᵀX + αI) W = XᵀY`. Returns `W_out` as output_dim × input_dim, row-major.
    pub fn solve(&self, alpha: f64) -> Result<Vec<f64>> {
        if !(alpha.is_finite() && alpha > 0.0) {
            return Err(ManestError::InvalidInput(format!("alpha must be > 0, got {alpha}")));
        }
        if self.samples == 0 {
            return Err(ManestError::InvalidInput("no training samples".to_string()));
        }

        let fd = self.input_dim;
        let od = self.output_dim;

        let mut gram = self.xtx.clone();
        for i in 0..fd {
            gram[i * fd + i] += alpha;
        }
        cholesky_in_place(&mut gram, fd)?;

        let mut w_out = vec![0.0; od * fd];
        let mut column = vec![0.0; fd];
        for o in 0..od {
            for i in 0..fd {
                column[i] = self.xty[i * od + o];
            }
            cholesky_solve(&gram, fd, &mut column);
            w_out[o * fd..(o + 1) * fd].copy_from_slice(&column);
        }

        if w_out.iter().any(|w| !w.is_finite()) {
            return Err(ManestError::Numerical("ridge solution is not finite".to_string()));
        }
        Ok(w_out)
    }
}

// ---------------------------------------------------------------------------
// ReadoutLayer
// ---------------------------------------------------------------------------

#[derive(Clone, Debug)]
pub struct ReadoutLayer {
    pub input_dim: usize,
    pub output_dim: usize,
    alpha: f64,
    /// output_dim × input_dim, row-major. `None` until fitted.
    w_out: Option<Vec<f64>>,
}

impl ReadoutLayer {
    pub fn new(input_dim: usize, output_dim: usize, alpha: f64) -> Self {
        Self { input_dim, output_dim, alpha, w_out: None }
    }

    /// Fresh accumulator shaped for this layer.
    pub fn accumulator(&self) -> RidgeAccumulator {
        RidgeAccumulator::new(self.input_dim, self.output_dim)
    }

    /// Fit on paired rows of `x` (features) and `y` (targets), replacing any previous weights.
    pub fn fit(&mut self, x: &[Vec<f64>], y: &[Vec<f64>]) -> Result<()> {
        if x.is_empty() {
            return Err(ManestError::InvalidInput("cannot fit on an empty batch".to_string()));
        }
        if x.len() != y.len() {
            return Err(ManestError::InvalidInput(format!(
                "{} feature rows but {} target rows",
                x.len(),
                y.len()
            )));
        }
        let mut acc = self.accumulator();
        for (xi, yi) in x.iter().zip(y) {
            acc.push(xi, yi)?;
        }
        self.fit_accumulated(&acc)
    }

    /// Solve a pre-filled accumulator, replacing any previous weights.
    pub fn fit_accumulated(&mut self, acc: &RidgeAccumulator) -> Result<()> {
        if acc.input_dim() != self.input_dim {
            return Err(ManestError::DimensionMismatch { expected: self.input_dim, got: acc.input_dim() });
        }
        if acc.output_dim() != self.output_dim {
            return Err(ManestError::DimensionMismatch { expected: self.output_dim, got: acc.output_dim() });
        }
        debug!(samples = acc.samples(), input_dim = self.input_dim, output_dim = self.output_dim, alpha = self.alpha, "solving ridge readout");
        self.w_out = Some(acc.solve(self.alpha)?);
        Ok(())
    }

    /// `W_out · features`.
    pub fn predict(&self, features: &[f64]) -> Result<Vec<f64>> {
        let w = self.w_out.as_ref().ok_or(ManestError::Untrained)?;
        if features.len() != self.input_dim {
            return Err(ManestError::DimensionMismatch { expected: self.input_dim, got: features.len() });
        }
        Ok(w.chunks_exact(self.input_dim)
            .map(|row| row.iter().zip(features).map(|(a, b)| a * b).sum())
            .collect())
    }

    pub fn is_trained(&self) -> bool {
        self.w_out.is_some()
    }

    pub fn weights(&self) -> Option<&[f64]> {
        self.w_out.as_deref()
    }

    pub fn alpha(&self) -> f64 {
        self.alpha
    }

    /// Regularization used by the next fit. Existing weights are kept.
    pub fn set_alpha(&mut self, alpha: f64) -> Result<()> {
        if !(alpha.is_finite() && alpha > 0.0) {
            return Err(ManestError::InvalidInput(format!("alpha must be > 0, got {alpha}")));
        }
        self.alpha = alpha;
        Ok(())
    }

    /// Persist `W_out` and `alpha`. Fails when untrained.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        self.stage(path)?.commit()?;
        info!(path = %path.display(), "readout saved");
        Ok(())
    }

    /// Write the readout artifact beside `path` without replacing it yet.
    pub fn stage(&self, path: impl AsRef<Path>) -> Result<StagedArtifact> {
        let w_out = self.w_out.clone().ok_or(ManestError::Untrained)?;
        let artifact = ReadoutArtifact {
            input_dim: self.input_dim,
            output_dim: self.output_dim,
            alpha: self.alpha,
            w_out,
        };
        stage_artifact(path.as_ref(), ArtifactKind::Readout, &artifact)
    }

    /// Restore weights, checking their shape against this layer's dimensions.
    ///
    /// The persisted `alpha` replaces the configured one.
    pub fn load(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let artifact: ReadoutArtifact = read_artifact(path, ArtifactKind::Readout)?;

        if artifact.input_dim != self.input_dim || artifact.output_dim != self.output_dim {
            return Err(ManestError::corrupt(
                path,
                format!(
                    "readout shape {}x{} does not match expected {}x{}",
                    artifact.output_dim, artifact.input_dim, self.output_dim, self.input_dim
                ),
            ));
        }
        if artifact.w_out.len() != artifact.input_dim * artifact.output_dim {
            return Err(ManestError::corrupt(path, "weight count does not match shape"));
        }
        if !(artifact.alpha.is_finite() && artifact.alpha > 0.0) {
            return Err(ManestError::corrupt(path, format!("invalid alpha {}", artifact.alpha)));
        }

        self.alpha = artifact.alpha;
        self.w_out = Some(artifact.w_out);
        info!(path = %path.display(), "readout loaded");
        Ok(())
    }
}

#[derive(Serialize, Deserialize)]
struct ReadoutArtifact {
    input_dim: usize,
    output_dim: usize,
    alpha: f64,
    w_out: Vec<f64>,
}

// ---------------------------------------------------------------------------
// Cholesky
// ---------------------------------------------------------------------------

/// Factor a symmetric positive-definite matrix in place as `L·Lᵀ`.
///
/// Reads only the upper triangle of `a`; on return the lower triangle
/// (diagonal included) holds `L`.
fn cholesky_in_place(a: &mut [f64], n: usize) -> Result<()> {
    for j in 0..n {
        let mut diag = a[j * n + j];
        for k in 0..j {
            diag -= a[j * n + k] * a[j * n + k];
        }
        if !(diag > 0.0 && diag.is_finite()) {
            return Err(ManestError::Numerical(format!(
                "Gram matrix not positive definite at pivot {j} ({diag})"
            )));
        }
        let ljj = diag.sqrt();
        a[j * n + j] = ljj;

        for i in (j + 1)..n {
            // Upper-triangle source: a[j][i] == a[i][j] of the symmetric input.
            let mut v = a[j * n + i];
            for k in 0..j {
                v -= a[i * n + k] * a[j * n + k];
            }
            a[i * n + j] = v / ljj;
        }
    }
    Ok(())
}

/// Solve `L·Lᵀ·x = b` in place, with `L` from [`cholesky_in_place`].
fn cholesky_solve(l: &[f64], n: usize, b: &mut [f64]) {
    for i in 0..n {
        let mut v = b[i];
        for k in 0..i {
            v -= l[i * n + k] * b[k];
        }
        b[i] = v / l[i * n + i];
    }
    for i in (0..n).rev() {
        let mut v = b[i];
        for k in (i + 1)..n {
            v -= l[k * n + i] * b[k];
        }
        b[i] = v / l[i * n + i];
    }
}
