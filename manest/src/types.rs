//! Core Manest types: ComplexVec.

use num_complex::Complex64;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// ComplexVec: complex-valued vector (Complex64)
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ComplexVec {
    pub data: Vec<Complex64>,
}

impl ComplexVec {
    /// Build from split real / imaginary parts. Missing components are zero.
    pub fn from_parts(re: &[f64], im: &[f64]) -> Self {
        let dim = re.len().max(im.len());
        Self {
            data: (0..dim)
                .map(|k| {
                    Complex64::new(
                        re.get(k).copied().unwrap_or(0.0),
                        im.get(k).copied().unwrap_or(0.0),
                    )
                })
                .collect(),
        }
    }

    /// Unit-magnitude phasors scaled by `1/√dim`, so the whole vector has unit norm.
    pub fn from_phases(phases: &[f64]) -> Self {
        let mag = 1.0 / (phases.len().max(1) as f64).sqrt();
        Self {
            data: phases.iter().map(|&p| Complex64::from_polar(mag, p)).collect(),
        }
    }

    pub fn dim(&self) -> usize {
        self.data.len()
    }

    pub fn real(&self) -> Vec<f64> {
        self.data.iter().map(|c| c.re).collect()
    }

    pub fn imag(&self) -> Vec<f64> {
        self.data.iter().map(|c| c.im).collect()
    }

    pub fn norm(&self) -> f64 {
        self.data.iter().map(|c| c.norm_sqr()).sum::<f64>().sqrt()
    }
}

/// Real part of the Hermitian inner product ⟨a, b⟩ over split parts.
///
/// Equals `Σ a_re·b_re + a_im·b_im`; extra components on either side are ignored.
pub fn resonance(a_re: &[f64], a_im: &[f64], b_re: &[f64], b_im: &[f64]) -> f64 {
    let re: f64 = a_re.iter().zip(b_re).map(|(x, y)| x * y).sum();
    let im: f64 = a_im.iter().zip(b_im).map(|(x, y)| x * y).sum();
    re + im
}
