//! Evaluation settings.
//!
//! Every field has a default, so a partial (or absent) settings file is
//! always usable. Files are TOML:
//!
//! ```toml
//! tolerance = 1e-6
//! max_circular_iterations = 100
//!
//! [backend]
//! program = "node"
//! args = ["scripts/calc_wrapper.js"]
//! timeout_secs = 30
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Tunables for one evaluation session.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Settings {
    /// Numeric diff at or below this still counts as a match.
    #[serde(default = "default_tolerance")]
    pub tolerance: f64,
    /// Diffs below this are reported as exact matches.
    #[serde(default = "default_exact_epsilon")]
    pub exact_epsilon: f64,
    /// Iteration cap for the circular-reference solver.
    #[serde(default = "default_max_circular_iterations")]
    pub max_circular_iterations: u32,
    /// Max per-iteration change below which a circular group has converged.
    #[serde(default = "default_convergence_threshold")]
    pub convergence_threshold: f64,
    #[serde(default)]
    pub backend: BackendSettings,
}

/// How to reach the calculation backend.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BackendSettings {
    #[serde(default = "default_program")]
    pub program: String,
    #[serde(default = "default_args")]
    pub args: Vec<String>,
    /// Bounded wait per batch call.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_tolerance() -> f64 {
    1e-6
}

fn default_exact_epsilon() -> f64 {
    1e-10
}

fn default_max_circular_iterations() -> u32 {
    100
}

fn default_convergence_threshold() -> f64 {
    1e-6
}

fn default_program() -> String {
    "node".into()
}

fn default_args() -> Vec<String> {
    vec!["scripts/calc_wrapper.js".into()]
}

fn default_timeout_secs() -> u64 {
    30
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            tolerance: default_tolerance(),
            exact_epsilon: default_exact_epsilon(),
            max_circular_iterations: default_max_circular_iterations(),
            convergence_threshold: default_convergence_threshold(),
            backend: BackendSettings::default(),
        }
    }
}

impl Default for BackendSettings {
    fn default() -> Self {
        Self {
            program: default_program(),
            args: default_args(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl Settings {
    /// Parse settings from TOML text.
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        let settings: Settings =
            toml::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }

    /// Load settings from a file path.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|e| ConfigError::Io(e.to_string()))?;
        Self::from_toml(&text)
    }

    /// Load from the platform config dir (`<config>/gridcheck/settings.toml`),
    /// falling back to defaults when no file exists.
    pub fn load_default() -> Result<Self, ConfigError> {
        let Some(dir) = dirs::config_dir() else {
            return Ok(Self::default());
        };
        let path = dir.join("gridcheck").join("settings.toml");
        if !path.exists() {
            return Ok(Self::default());
        }
        Self::load(&path)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.tolerance.is_finite() || self.tolerance < 0.0 {
            return Err(ConfigError::Invalid(format!(
                "tolerance must be a finite non-negative number, got {}",
                self.tolerance
            )));
        }
        if !self.convergence_threshold.is_finite() || self.convergence_threshold <= 0.0 {
            return Err(ConfigError::Invalid(format!(
                "convergence_threshold must be a finite positive number, got {}",
                self.convergence_threshold
            )));
        }
        if self.max_circular_iterations == 0 {
            return Err(ConfigError::Invalid(
                "max_circular_iterations must be at least 1".into(),
            ));
        }
        if self.backend.timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "backend.timeout_secs must be at least 1".into(),
            ));
        }
        if self.backend.program.is_empty() {
            return Err(ConfigError::Invalid("backend.program is empty".into()));
        }
        Ok(())
    }

    pub fn backend_timeout(&self) -> Duration {
        Duration::from_secs(self.backend.timeout_secs)
    }
}

/// Error type for settings loading.
#[derive(Debug)]
pub enum ConfigError {
    /// TOML parse / deserialization error.
    Parse(String),
    /// A parsed value is out of range.
    Invalid(String),
    /// File read error.
    Io(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Parse(msg) => write!(f, "settings parse error: {msg}"),
            Self::Invalid(msg) => write!(f, "invalid settings: {msg}"),
            Self::Io(msg) => write!(f, "settings IO error: {msg}"),
        }
    }
}

impl std::error::Error for ConfigError {}
