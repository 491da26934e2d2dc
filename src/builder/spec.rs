//! Build spec persistence.
//!
//! The build spec captures every input of a configure step: the configure
//! command line, the CMake release, the target interpreter and platform, and
//! the values of the configured environment variables. Configure is skipped
//! only when a freshly computed spec equals the stored one.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::util::fs::write_string;
use crate::util::hash::Fingerprint;

/// Interpreter identity recorded in the spec.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterpreterIdentity {
    pub executable: String,
    pub version: String,
}

/// Inputs of one configure step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildSpec {
    /// CMake executable followed by the configure arguments
    pub args: Vec<String>,

    /// CMake release
    pub version: String,

    /// Target interpreter
    pub interpreter: InterpreterIdentity,

    /// Platform name of the build directory
    pub platform: String,

    /// Tracked environment variables; `None` when unset
    pub environment: BTreeMap<String, Option<String>>,
}

impl BuildSpec {
    /// Record the configured environment variables through `lookup`.
    pub fn capture_environment<'a>(
        names: impl IntoIterator<Item = &'a String>,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> BTreeMap<String, Option<String>> {
        names
            .into_iter()
            .map(|name| (name.clone(), lookup(name)))
            .collect()
    }

    /// Digest over every field, stable across runs.
    pub fn fingerprint(&self) -> String {
        let mut fp = Fingerprint::new();
        fp.section("args").list(self.args.iter().map(String::as_str));
        fp.section("cmake").field(&self.version);
        fp.section("interpreter")
            .field(&self.interpreter.executable)
            .field(&self.interpreter.version);
        fp.section("platform").field(&self.platform);
        fp.section("environment");
        for (name, value) in &self.environment {
            fp.field(name).optional(value.as_deref());
        }
        fp.finish()
    }

    /// Load a stored spec.
    ///
    /// A missing or unreadable file means "no spec": the caller configures
    /// again rather than failing.
    pub fn load(path: &Path) -> Option<Self> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(_) => return None,
        };

        match serde_json::from_str::<StoredSpec>(&content) {
            Ok(stored) if stored.fingerprint == stored.spec.fingerprint() => Some(stored.spec),
            Ok(_) => {
                tracing::debug!("build spec {} has a stale digest; ignoring it", path.display());
                None
            }
            Err(e) => {
                tracing::debug!("failed to parse build spec {}: {}", path.display(), e);
                None
            }
        }
    }

    /// Persist the spec, creating the build directory if needed.
    pub fn save(&self, path: &Path) -> Result<()> {
        let stored = StoredSpec {
            fingerprint: self.fingerprint(),
            spec: self.clone(),
        };
        let content = serde_json::to_string_pretty(&stored)?;
        write_string(path, &content)
    }

    /// Whether a configure with `self` can be skipped given the stored spec.
    pub fn is_fresh(&self, stored: Option<&BuildSpec>) -> bool {
        match stored {
            Some(stored) => stored.fingerprint() == self.fingerprint(),
            None => false,
        }
    }
}

#[derive(Serialize, Deserialize)]
struct StoredSpec {
    fingerprint: String,
    spec: BuildSpec,
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn spec(env_value: Option<&str>) -> BuildSpec {
        let names = vec!["PYTHONPATH".to_string()];
        BuildSpec {
            args: vec!["cmake".into(), "-DFOO:BOOL=ON".into()],
            version: "3.28.1".into(),
            interpreter: InterpreterIdentity {
                executable: "/usr/bin/python3".into(),
                version: "3.12.1".into(),
            },
            platform: "linux-x86_64".into(),
            environment: BuildSpec::capture_environment(&names, |_| env_value.map(String::from)),
        }
    }

    #[test]
    fn test_save_and_load() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("cmake-build").join("CMakeSpec.json");

        let current = spec(Some("/site"));
        current.save(&path).unwrap();

        let loaded = BuildSpec::load(&path);
        assert_eq!(loaded.as_ref(), Some(&current));
        assert!(current.is_fresh(loaded.as_ref()));
    }

    #[test]
    fn test_environment_change_is_not_fresh() {
        let stored = spec(None);
        assert!(!spec(Some("/site")).is_fresh(Some(&stored)));
        assert!(!spec(Some("")).is_fresh(Some(&stored)));
        assert!(spec(None).is_fresh(Some(&stored)));
    }

    #[test]
    fn test_missing_or_corrupt_spec() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("CMakeSpec.json");
        assert!(BuildSpec::load(&path).is_none());

        std::fs::write(&path, "{not json").unwrap();
        assert!(BuildSpec::load(&path).is_none());
        assert!(!spec(None).is_fresh(None));
    }
}
