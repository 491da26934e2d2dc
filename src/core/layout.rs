//! On-disk layout of generated build state.
//!
//! ```text
//! _skbuild/<plat-name>-<py major.minor>/
//!   cmake-build/            native build directory
//!     CMakeCache.txt        written by CMake; carries the generator marker
//!     CMakeSpec.json        persisted build spec
//!   cmake-install/          native install root
//!   setuptools/             packaging framework staging area
//!   cmake_test_compile/     generator probe scratch project (transient)
//! ```

use std::path::{Path, PathBuf};

use crate::util::context::GlobalContext;
use crate::util::process::ProcessBuilder;

/// Top-level directory for all generated state.
pub const SKBUILD_DIR: &str = "_skbuild";

/// Scratch directory of the generator probe.
pub const PROBE_DIR: &str = "cmake_test_compile";

const MACOS_ARCHITECTURES: &[&str] = &["x86_64", "arm64"];

/// Paths of the per-platform build state of one project.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildLayout {
    root: PathBuf,
    plat_name: String,
    python_version: String,
}

impl BuildLayout {
    /// `python_version` is `major.minor` of the target interpreter.
    pub fn new(root: impl Into<PathBuf>, plat_name: impl Into<String>, python_version: impl Into<String>) -> Self {
        BuildLayout {
            root: root.into(),
            plat_name: plat_name.into(),
            python_version: python_version.into(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn plat_name(&self) -> &str {
        &self.plat_name
    }

    /// `_skbuild/<plat>-<ver>` relative to the project root.
    pub fn relative_skbuild_dir(&self) -> PathBuf {
        Path::new(SKBUILD_DIR).join(format!("{}-{}", self.plat_name, self.python_version))
    }

    pub fn skbuild_dir(&self) -> PathBuf {
        self.root.join(self.relative_skbuild_dir())
    }

    pub fn relative_build_dir(&self) -> PathBuf {
        self.relative_skbuild_dir().join("cmake-build")
    }

    pub fn build_dir(&self) -> PathBuf {
        self.root.join(self.relative_build_dir())
    }

    pub fn relative_install_dir(&self) -> PathBuf {
        self.relative_skbuild_dir().join("cmake-install")
    }

    pub fn install_dir(&self) -> PathBuf {
        self.root.join(self.relative_install_dir())
    }

    pub fn setuptools_dir(&self) -> PathBuf {
        self.skbuild_dir().join("setuptools")
    }

    pub fn spec_file(&self) -> PathBuf {
        self.build_dir().join("CMakeSpec.json")
    }

    pub fn cmake_cache(&self) -> PathBuf {
        self.build_dir().join("CMakeCache.txt")
    }

    pub fn probe_dir(&self) -> PathBuf {
        self.skbuild_dir().join(PROBE_DIR)
    }
}

/// Default platform name, e.g. `linux-x86_64`, `win-amd64`, `macosx-11.0-arm64`.
///
/// On macOS the deployment target and architecture overrides are read from
/// the environment snapshot of `gctx`.
pub fn default_plat_name(gctx: &GlobalContext) -> String {
    let arch = std::env::consts::ARCH;
    match std::env::consts::OS {
        "windows" => match arch {
            "x86_64" => "win-amd64".to_string(),
            "aarch64" => "win-arm64".to_string(),
            _ => "win32".to_string(),
        },
        "macos" => {
            let release = gctx
                .get_env("MACOSX_DEPLOYMENT_TARGET")
                .map(String::from)
                .or_else(macos_release)
                .unwrap_or_else(|| "11.0".to_string());
            let machine = match arch {
                "aarch64" => "arm64",
                other => other,
            };
            macos_plat_name(
                &release,
                machine,
                gctx.get_env("ARCHFLAGS"),
                gctx.get_env("CMAKE_OSX_ARCHITECTURES"),
            )
        }
        os => {
            let machine = match arch {
                "x86" => "i686",
                other => other,
            };
            format!("{}-{}", os, machine)
        }
    }
}

fn macos_release() -> Option<String> {
    let output = ProcessBuilder::new("sw_vers")
        .arg("-productVersion")
        .exec()
        .ok()?;
    output.success().then(|| output.stdout_lossy().trim().to_string())
}

/// Compose `macosx-<major>.<minor>-<arch>`.
///
/// On macOS 11 and later only the major version matters. `ARCHFLAGS`
/// (`-arch x86_64 -arch arm64`) and then `CMAKE_OSX_ARCHITECTURES` override
/// the machine; requesting both supported architectures yields `universal2`.
pub fn macos_plat_name(
    release: &str,
    machine: &str,
    archflags: Option<&str>,
    osx_architectures: Option<&str>,
) -> String {
    let mut parts = release.split('.');
    let major = parts.next().unwrap_or("11");
    let mut minor = parts.next().unwrap_or("0");
    if major.parse::<u32>().map(|m| m >= 11).unwrap_or(false) {
        minor = "0";
    }

    let mut machine = machine.to_string();
    if let Some(flags) = archflags {
        let requested: Vec<&str> = MACOS_ARCHITECTURES
            .iter()
            .copied()
            .filter(|arch| flags.split_whitespace().any(|f| f == *arch))
            .collect();
        machine = requested.join(";");
    }
    if let Some(archs) = osx_architectures {
        machine = archs.to_string();
    }

    format!("macosx-{}.{}-{}", major, minor, universal_machine(&machine))
}

/// `x86_64;arm64` in any order becomes `universal2`.
pub fn universal_machine(machine: &str) -> String {
    let mut archs: Vec<&str> = machine.split(';').filter(|a| !a.is_empty()).collect();
    archs.sort_unstable();
    archs.dedup();
    if archs == ["arm64", "x86_64"] {
        "universal2".to_string()
    } else {
        machine.to_string()
    }
}
