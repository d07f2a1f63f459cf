//! Brain configuration (`brain.toml`).
//!
//! ```toml
//! name = "Mahestra"
//!
//! [core]
//! dim = 256
//!
//! [physics]
//! beta = 25.0
//! dt = 0.5
//! stiffness = 0.9
//! decay = 0.01
//!
//! [training]
//! alpha = 0.05
//!
//! [storage]
//! path = "./brains"
//! ```
//!
//! The engine only ever sees a validated [`BrainConfig`]; parsing happens here.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::errors::{ManestError, Result};
use crate::text::reservoir::PhysicsConfig;

/// Template written by `manest init`.
pub const DEFAULT_TOML: &str = r#"name = "Mahestra"

[core]
dim = 256

[physics]
beta = 25.0
dt = 0.5
stiffness = 0.9
decay = 0.01

[training]
alpha = 0.05

[storage]
path = "./brains"
"#;

// ---------------------------------------------------------------------------
// Sections
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CoreConfig {
    /// Complex embedding / reservoir dimension.
    pub dim: usize,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TrainingConfig {
    /// Ridge penalty. Must be strictly positive.
    pub alpha: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StorageConfig {
    pub path: PathBuf,
}

// ---------------------------------------------------------------------------
// BrainConfig
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BrainConfig {
    pub name: String,
    pub core: CoreConfig,
    pub physics: PhysicsConfig,
    pub training: TrainingConfig,
    pub storage: StorageConfig,
}

impl Default for BrainConfig {
    fn default() -> Self {
        Self {
            name: "Mahestra".to_string(),
            core: CoreConfig { dim: 256 },
            physics: PhysicsConfig::default(),
            training: TrainingConfig { alpha: 0.05 },
            storage: StorageConfig { path: PathBuf::from("./brains") },
        }
    }
}

impl BrainConfig {
    /// Read, parse and validate a TOML config file.
    ///
    /// Every failure, including a missing file, is a [`ManestError::Config`].
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ManestError::Config(format!(
                "config '{}' not found, run `manest init` first",
                path.display()
            )));
        }

        let contents = std::fs::read_to_string(path).map_err(|e| {
            ManestError::Config(format!("failed to read config '{}': {}", path.display(), e))
        })?;

        Self::from_toml_str(&contents).map_err(|e| match e {
            ManestError::Config(msg) => ManestError::Config(format!("{}: {}", path.display(), msg)),
            other => other,
        })
    }

    /// Parse and validate a TOML string.
    pub fn from_toml_str(toml_str: &str) -> Result<Self> {
        let config: Self = toml::from_str(toml_str)
            .map_err(|e| ManestError::Config(format!("failed to parse TOML: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(ManestError::Config("name must not be empty".to_string()));
        }
        if self.name.contains(['/', '\\']) {
            return Err(ManestError::Config(format!(
                "name '{}' must not contain path separators",
                self.name
            )));
        }
        if self.core.dim == 0 {
            return Err(ManestError::Config("[core] dim must be > 0".to_string()));
        }
        self.physics
            .validate()
            .map_err(|e| ManestError::Config(format!("[physics] {e}")))?;
        if !(self.training.alpha.is_finite() && self.training.alpha > 0.0) {
            return Err(ManestError::Config(format!(
                "[training] alpha must be a positive finite number, got {}",
                self.training.alpha
            )));
        }
        if self.storage.path.as_os_str().is_empty() {
            return Err(ManestError::Config("[storage] path must not be empty".to_string()));
        }
        Ok(())
    }

    /// `{storage.path}/{name}.nawa`
    pub fn brain_file(&self) -> PathBuf {
        self.storage.path.join(format!("{}.nawa", self.name))
    }

    /// `{storage.path}/{name}_readout.bin`
    pub fn readout_file(&self) -> PathBuf {
        self.storage.path.join(format!("{}_readout.bin", self.name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_template_parses_to_default() {
        let config = BrainConfig::from_toml_str(DEFAULT_TOML).unwrap();
        assert_eq!(config, BrainConfig::default());
    }

    #[test]
    fn test_paths() {
        let config = BrainConfig::default();
        assert_eq!(config.brain_file(), PathBuf::from("./brains/Mahestra.nawa"));
        assert_eq!(config.readout_file(), PathBuf::from("./brains/Mahestra_readout.bin"));
    }

    #[test]
    fn test_rejects_non_positive_alpha() {
        let toml_str = DEFAULT_TOML.replace("alpha = 0.05", "alpha = 0.0");
        let err = BrainConfig::from_toml_str(&toml_str).unwrap_err();
        assert!(matches!(err, ManestError::Config(_)), "{err}");
    }

    #[test]
    fn test_rejects_zero_dim() {
        let toml_str = DEFAULT_TOML.replace("dim = 256", "dim = 0");
        assert!(BrainConfig::from_toml_str(&toml_str).is_err());
    }

    #[test]
    fn test_rejects_missing_section() {
        let toml_str = DEFAULT_TOML.replace("[training]\nalpha = 0.05\n", "");
        let err = BrainConfig::from_toml_str(&toml_str).unwrap_err();
        assert!(err.to_string().contains("parse"), "{err}");
    }

    #[test]
    fn test_missing_file_is_config_error() {
        let err = BrainConfig::from_file("/definitely/not/here/brain.toml").unwrap_err();
        assert!(matches!(err, ManestError::Config(_)));
    }

    #[test]
    fn test_rejects_unstable_physics() {
        let toml_str = DEFAULT_TOML
            .replace("stiffness = 0.9", "stiffness = 0.0")
            .replace("decay = 0.01", "decay = 0.0");
        let err = BrainConfig::from_toml_str(&toml_str).unwrap_err();
        assert!(err.to_string().contains("[physics]"), "{err}");
    }
}
