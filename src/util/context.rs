//! Global context for Shipwright operations.
//!
//! Provides centralized access to the project root, configuration and paths.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};

use crate::util::config::{global_config_path, load_config, project_config_path, Config};

/// Name of the project declaration file.
pub const MANIFEST_NAME: &str = "Shipwright.toml";

/// Global context shared by one invocation.
#[derive(Debug, Clone)]
pub struct GlobalContext {
    /// Project root; every relative path in the project is resolved against it.
    project_root: PathBuf,

    /// Merged global + project configuration.
    config: Config,

    /// Process environment captured when the context was created.
    env: BTreeMap<String, String>,
}

impl GlobalContext {
    /// Create a context rooted at the current directory.
    pub fn new() -> Result<Self> {
        let cwd = std::env::current_dir().context("failed to get current directory")?;
        Ok(Self::with_root(cwd))
    }

    /// Create a context rooted at the directory containing `manifest_path`.
    pub fn from_manifest_path(manifest_path: &Path) -> Result<Self> {
        let manifest_path = if manifest_path.is_absolute() {
            manifest_path.to_path_buf()
        } else {
            std::env::current_dir()
                .context("failed to get current directory")?
                .join(manifest_path)
        };

        let root = manifest_path
            .parent()
            .map(Path::to_path_buf)
            .context("manifest path has no parent directory")?;
        Ok(Self::with_root(root))
    }

    /// Create a context for an explicit project root, loading its configuration.
    pub fn with_root(project_root: PathBuf) -> Self {
        let config = load_config(
            global_config_path().as_deref(),
            &project_config_path(&project_root),
        );
        GlobalContext {
            project_root,
            config,
            env: std::env::vars_os()
                .filter_map(|(k, v)| Some((k.into_string().ok()?, v.into_string().ok()?)))
                .collect(),
        }
    }

    /// Create a context with an explicit configuration and an empty
    /// environment (used by tests).
    pub fn with_config(project_root: PathBuf, config: Config) -> Self {
        GlobalContext {
            project_root,
            config,
            env: BTreeMap::new(),
        }
    }

    /// Replace the environment snapshot.
    pub fn with_env<I, K, V>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.env = vars.into_iter().map(|(k, v)| (k.into(), v.into())).collect();
        self
    }

    /// Look up an environment variable; empty values count as unset.
    pub fn get_env(&self, key: &str) -> Option<&str> {
        self.env.get(key).map(String::as_str).filter(|v| !v.is_empty())
    }

    /// Look up an environment variable, keeping empty values.
    pub fn get_env_raw(&self, key: &str) -> Option<&str> {
        self.env.get(key).map(String::as_str)
    }

    pub fn project_root(&self) -> &Path {
        &self.project_root
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Path of the project declaration file.
    pub fn manifest_path(&self) -> PathBuf {
        self.project_root.join(MANIFEST_NAME)
    }

    /// Locate the project declaration file, failing with a hint when absent.
    pub fn find_manifest(&self) -> Result<PathBuf> {
        let path = self.manifest_path();
        if !path.is_file() {
            bail!(
                "could not find `{}` in `{}`\n\
                 help: create one declaring the packages, modules and scripts of the project",
                MANIFEST_NAME,
                self.project_root.display()
            );
        }
        Ok(path)
    }
}
