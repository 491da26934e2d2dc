//! Test fixtures for common test scenarios.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tempfile::TempDir;

use crate::util::config::Config;
use crate::util::context::{GlobalContext, MANIFEST_NAME};

/// Fixture for a project directory.
#[derive(Debug, Clone, Default)]
pub struct ProjectFixture {
    /// Shipwright.toml content.
    pub manifest: String,
    /// Files relative to the project root -> content.
    pub files: BTreeMap<PathBuf, String>,
}

impl ProjectFixture {
    pub fn new(manifest: impl Into<String>) -> Self {
        ProjectFixture {
            manifest: manifest.into(),
            files: BTreeMap::new(),
        }
    }

    /// A project with one package `hello`, one script and a `CMakeLists.txt`.
    pub fn hello() -> Self {
        ProjectFixture::new(
            r#"packages = ["hello"]
scripts = ["run.sh"]
"#,
        )
        .file("hello/__init__.py", "")
        .file(
            "CMakeLists.txt",
            "cmake_minimum_required(VERSION 3.15)\nproject(hello C)\n",
        )
    }

    pub fn file(mut self, path: impl Into<PathBuf>, content: impl Into<String>) -> Self {
        self.files.insert(path.into(), content.into());
        self
    }

    /// Write the fixture into `root`.
    pub fn write_to(&self, root: &Path) -> std::io::Result<()> {
        std::fs::write(root.join(MANIFEST_NAME), &self.manifest)?;
        for (path, content) in &self.files {
            let full = root.join(path);
            if let Some(parent) = full.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(full, content)?;
        }
        Ok(())
    }

    /// Write the fixture into a fresh temporary directory.
    pub fn create(&self) -> std::io::Result<TempDir> {
        let tmp = TempDir::new()?;
        self.write_to(tmp.path())?;
        Ok(tmp)
    }
}

/// Context rooted at `root` with tool paths pinned to bare names, so mock
/// expectations can match `cmake ...` and `python3 ...`.
pub fn test_context(root: &Path) -> GlobalContext {
    let mut config = Config::default();
    config.build.cmake_executable = Some(PathBuf::from("cmake"));
    config.python.executable = Some(PathBuf::from("python3"));
    GlobalContext::with_config(root.to_path_buf(), config)
}

/// Interpreter description as printed by the interpreter query script.
pub fn interpreter_json(prefix: &Path) -> String {
    serde_json::json!({
        "executable": prefix.join("bin").join("python3"),
        "prefix": prefix,
        "version": "3.12.1",
        "version_info": [3, 12, 1],
        "implementation": "cpython",
        "abiflags": "",
        "platform": "linux-x86_64",
        "config_vars": {
            "VERSION": "3.12",
            "INCLUDEPY": prefix.join("include").join("python3.12"),
            "LIBDIR": prefix.join("lib"),
            "LDLIBRARY": "libpython3.12.so",
        },
        "paths": {},
    })
    .to_string()
}

/// `cmake --version` output.
pub const CMAKE_VERSION_OUTPUT: &str = "cmake version 3.28.1\n\nCMake suite maintained and supported by Kitware (kitware.com/cmake).\n";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hello_fixture() {
        let tmp = ProjectFixture::hello().create().unwrap();
        assert!(tmp.path().join(MANIFEST_NAME).is_file());
        assert!(tmp.path().join("hello/__init__.py").is_file());
        assert!(tmp.path().join("CMakeLists.txt").is_file());
    }
}
