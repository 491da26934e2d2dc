//! `Shipwright.toml` project declarations.
//!
//! The declarations mirror what a packaging framework knows about a project:
//! packages and where their sources live, standalone modules, scripts and
//! loose data files. The `[cmake]` table configures the native build.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use semver::Version;
use serde::{Deserialize, Serialize};

use crate::core::errors::ShimError;

fn default_languages() -> Vec<String> {
    vec!["C".to_string(), "CXX".to_string()]
}

fn default_install_target() -> String {
    "install".to_string()
}

/// The `[cmake]` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case", deny_unknown_fields)]
pub struct CMakeSection {
    /// Configure arguments declared by the project
    pub args: Vec<String>,

    /// Directory holding the top-level `CMakeLists.txt`, relative to the root
    pub source_dir: String,

    /// Subdirectory of the install tree used as `CMAKE_INSTALL_PREFIX`
    pub install_dir: String,

    /// Languages the probe project enables
    pub languages: Vec<String>,

    /// Oldest CMake release able to build the project
    pub minimum_version: Option<String>,

    /// Target performing the install
    pub install_target: String,

    /// Also run the native build for `sdist`
    pub with_sdist: bool,
}

impl Default for CMakeSection {
    fn default() -> Self {
        CMakeSection {
            args: Vec::new(),
            source_dir: String::new(),
            install_dir: String::new(),
            languages: default_languages(),
            minimum_version: None,
            install_target: default_install_target(),
            with_sdist: false,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "kebab-case", deny_unknown_fields)]
struct RawProject {
    packages: Vec<String>,
    package_dir: BTreeMap<String, String>,
    package_data: BTreeMap<String, Vec<String>>,
    py_modules: Vec<String>,
    scripts: Vec<String>,
    data_files: BTreeMap<String, Vec<String>>,
    include_package_data: bool,
    cmake: CMakeSection,
}

/// Parsed and validated project declarations.
#[derive(Debug, Clone)]
pub struct Project {
    pub root: PathBuf,
    pub packages: Vec<String>,
    pub package_dir: BTreeMap<String, String>,
    pub package_data: BTreeMap<String, Vec<String>>,
    pub py_modules: Vec<String>,
    pub scripts: Vec<String>,
    pub data_files: BTreeMap<String, BTreeSet<String>>,
    pub include_package_data: bool,
    pub cmake: CMakeSection,
}

impl Project {
    /// Load declarations from a `Shipwright.toml` file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read project file: {}", path.display()))?;

        Self::parse(&content, path)
    }

    /// Parse declarations; `path` locates the project root.
    pub fn parse(content: &str, path: &Path) -> Result<Self> {
        let raw: RawProject = toml::from_str(content)
            .with_context(|| format!("failed to parse {}", path.display()))?;

        let root = path.parent().unwrap_or(Path::new(".")).to_path_buf();

        let mut package_dir = raw.package_dir;
        for (package, prefix) in package_dir.iter_mut() {
            if prefix.len() > 1 && prefix.ends_with('/') {
                tracing::warn!(
                    "package-dir entry {:?} = {:?} ends with a trailing slash; ignoring it",
                    package,
                    prefix
                );
                prefix.pop();
            }
        }

        let data_files = raw
            .data_files
            .into_iter()
            .map(|(dir, files)| {
                let dir = if dir.is_empty() { ".".to_string() } else { dir };
                (dir, files.into_iter().collect())
            })
            .collect();

        let mut cmake = raw.cmake;
        if cmake.source_dir == "." {
            cmake.source_dir.clear();
        }

        Ok(Project {
            root,
            packages: raw.packages,
            package_dir,
            package_data: raw.package_data,
            py_modules: raw.py_modules,
            scripts: raw.scripts,
            data_files,
            include_package_data: raw.include_package_data,
            cmake,
        })
    }

    /// Reject declarations the native build cannot honour.
    pub fn validate(&self) -> Result<(), ShimError> {
        if Path::new(&self.cmake.install_dir).is_absolute() {
            return Err(ShimError::invalid_project(format!(
                "cmake.install-dir is set to an absolute path; a relative path is expected\n  \
                 project root: {}\n  cmake install directory: {}",
                self.root.display(),
                self.cmake.install_dir
            )));
        }

        if !self.source_dir().exists() {
            return Err(ShimError::invalid_project(format!(
                "cmake.source-dir is set to a nonexistent directory\n  \
                 project root: {}\n  cmake source directory: {}",
                self.root.display(),
                self.cmake.source_dir
            )));
        }

        if self.cmake.args.iter().any(|arg| arg.contains("CMAKE_INSTALL_PREFIX")) {
            return Err(ShimError::invalid_project(
                "CMAKE_INSTALL_PREFIX may not be passed via cmake.args",
            ));
        }

        if let Some(min) = &self.cmake.minimum_version {
            if lenient_version(min).is_none() {
                return Err(ShimError::invalid_project(format!(
                    "cmake.minimum-version `{}` is not a version number",
                    min
                )));
            }
        }

        Ok(())
    }

    /// Absolute path of the directory holding `CMakeLists.txt`.
    pub fn source_dir(&self) -> PathBuf {
        if self.cmake.source_dir.is_empty() {
            self.root.clone()
        } else {
            self.root.join(&self.cmake.source_dir)
        }
    }

    pub fn has_cmakelists(&self) -> bool {
        self.source_dir().join("CMakeLists.txt").is_file()
    }

    /// Source directory of every declared package.
    ///
    /// Packages without an explicit entry map `a.b` to `a/b`, below the root
    /// package directory (`package-dir[""]`) when one is declared.
    pub fn resolved_package_dir(&self) -> BTreeMap<String, String> {
        let mut package_dir = self.package_dir.clone();
        let root = self.package_dir.get("").cloned();

        for package in &self.packages {
            if package_dir.contains_key(package) {
                continue;
            }
            let dir = package.replace('.', "/");
            let dir = match &root {
                Some(root) if !root.is_empty() => format!("{}/{}", root.trim_end_matches('/'), dir),
                _ => dir,
            };
            package_dir.insert(package.clone(), dir);
        }

        package_dir
    }
}

/// Parse a tool version such as `3.28`, `3.28.1` or `3.29.0-rc2`.
///
/// Missing components are zero; any pre-release tag is dropped.
pub fn lenient_version(text: &str) -> Option<Version> {
    let core = text.trim().split(['-', '+']).next()?;
    let mut parts = core.split('.').map(|p| p.parse::<u64>());

    let major = parts.next()?.ok()?;
    let minor = parts.next().map(|p| p.ok()).unwrap_or(Some(0))?;
    let patch = parts.next().map(|p| p.ok()).unwrap_or(Some(0))?;

    Some(Version::new(major, minor, patch))
}
