//! Configuration file support for Shipwright.
//!
//! Two configuration file locations are merged:
//! - Global: `~/.shipwright/config.toml` - User-wide defaults
//! - Project: `.shipwright/config.toml` - Project-specific overrides
//!
//! Project config takes precedence over global config, and command-line
//! options take precedence over both.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Environment variables fingerprinted into the build spec by default.
pub const DEFAULT_SPEC_ENVIRONMENT: &[&str] = &["PYTHONNOUSERSITE", "PYTHONPATH"];

/// Shipwright configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct Config {
    /// Native build settings
    pub build: BuildConfig,

    /// Interpreter settings
    pub python: PythonConfig,

    /// Build spec settings
    pub spec: SpecConfig,

    /// Output settings
    pub output: OutputConfig,
}

/// Native build configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct BuildConfig {
    /// Path to the CMake executable
    pub cmake_executable: Option<PathBuf>,

    /// Generator to use instead of probing the platform defaults
    pub generator: Option<String>,

    /// Default number of parallel build jobs
    pub jobs: Option<usize>,
}

/// Interpreter configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct PythonConfig {
    /// Interpreter whose headers and library are handed to CMake
    pub executable: Option<PathBuf>,
}

/// Build spec configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct SpecConfig {
    /// Environment variables whose values invalidate a previous configure
    pub environment: Vec<String>,
}

impl Default for SpecConfig {
    fn default() -> Self {
        SpecConfig {
            environment: DEFAULT_SPEC_ENVIRONMENT.iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// Output configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct OutputConfig {
    /// Do not list files copied between the source and install trees
    pub hide_listing: bool,
}

impl Config {
    /// Load configuration from a file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config: {}", path.display()))?;

        toml::from_str(&contents)
            .with_context(|| format!("failed to parse config: {}", path.display()))
    }

    /// Load configuration with fallback to defaults if the file is missing or broken.
    pub fn load_or_default(path: &Path) -> Self {
        if path.exists() {
            Self::load(path).unwrap_or_else(|e| {
                tracing::warn!("Failed to load config from {}: {:#}", path.display(), e);
                Self::default()
            })
        } else {
            Self::default()
        }
    }

    /// Merge another config into this one (other takes precedence).
    pub fn merge(&mut self, other: Config) {
        if other.build.cmake_executable.is_some() {
            self.build.cmake_executable = other.build.cmake_executable;
        }
        if other.build.generator.is_some() {
            self.build.generator = other.build.generator;
        }
        if other.build.jobs.is_some() {
            self.build.jobs = other.build.jobs;
        }
        if other.python.executable.is_some() {
            self.python.executable = other.python.executable;
        }
        if other.spec.environment != SpecConfig::default().environment {
            self.spec.environment = other.spec.environment;
        }
        if other.output.hide_listing {
            self.output.hide_listing = true;
        }
    }
}

/// Load merged configuration from global and project locations.
///
/// Order of precedence (highest to lowest):
/// 1. Project config (.shipwright/config.toml)
/// 2. Global config (~/.shipwright/config.toml)
/// 3. Defaults
pub fn load_config(global_path: Option<&Path>, project_path: &Path) -> Config {
    let mut config = Config::default();

    if let Some(global_path) = global_path {
        config.merge(Config::load_or_default(global_path));
    }

    config.merge(Config::load_or_default(project_path));

    config
}

/// Get the global config directory (~/.shipwright).
pub fn global_config_dir() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|b| b.home_dir().join(".shipwright"))
}

/// Get the global config path (~/.shipwright/config.toml).
pub fn global_config_path() -> Option<PathBuf> {
    global_config_dir().map(|dir| dir.join("config.toml"))
}

/// Get the project config path (.shipwright/config.toml).
pub fn project_config_path(project_root: &Path) -> PathBuf {
    project_root.join(".shipwright").join("config.toml")
}
