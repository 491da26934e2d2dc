//! Target interpreter discovery.
//!
//! The interpreter is queried once through a short script printing its
//! identity and build configuration as JSON. Include directory and runtime
//! library are then located from that snapshot without running it again.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::Value;

use crate::core::errors::ShimError;
use crate::util::process::{Executor, ProcessBuilder};

const QUERY_SCRIPT: &str = r#"
import json, sys, sysconfig
names = ["VERSION", "py_version_short", "INCLUDEPY", "INCLUDEDIR", "LIBDIR",
         "LDLIBRARY", "LIBRARY", "MULTIARCH", "multiarchsubdir", "WITH_PYMALLOC",
         "WITH_DYLD", "LIBDEST"]
paths = {}
for key in ("include", "platinclude"):
    try:
        paths[key] = sysconfig.get_path(key)
    except KeyError:
        pass
print(json.dumps({
    "executable": sys.executable,
    "prefix": sys.prefix,
    "version": sys.version.split(" ")[0],
    "version_info": list(sys.version_info[:3]),
    "implementation": sys.implementation.name,
    "abiflags": getattr(sys, "abiflags", ""),
    "platform": sysconfig.get_platform(),
    "config_vars": {name: sysconfig.get_config_var(name) for name in names},
    "paths": paths,
}))
"#;

/// Snapshot of the target interpreter.
#[derive(Debug, Clone, Deserialize)]
pub struct InterpreterInfo {
    pub executable: PathBuf,
    pub prefix: PathBuf,
    /// Full version string, e.g. `3.12.1`.
    pub version: String,
    pub version_info: Vec<u32>,
    /// `cpython`, `pypy`, ...
    pub implementation: String,
    #[serde(default)]
    pub abiflags: String,
    /// Build platform tag, e.g. `linux-x86_64` or `win-amd64`.
    pub platform: String,
    #[serde(default)]
    pub config_vars: BTreeMap<String, Value>,
    #[serde(default)]
    pub paths: BTreeMap<String, String>,
}

impl InterpreterInfo {
    /// Run `python` and capture its identity.
    pub fn probe(executor: &dyn Executor, python: &Path) -> Result<Self> {
        let cmd = ProcessBuilder::new(python).arg("-c").arg(QUERY_SCRIPT);
        let output = executor.exec(&cmd).map_err(|e| ShimError::ToolMissing {
            tool: python.display().to_string(),
            detail: format!("{:#}", e),
        })?;

        if !output.success() {
            return Err(ShimError::ToolMissing {
                tool: python.display().to_string(),
                detail: format!("interpreter query failed: {}", output.stderr_lossy().trim()),
            }
            .into());
        }

        Self::from_json(&output.stdout_lossy())
    }

    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text.trim()).context("failed to parse interpreter description")
    }

    /// A configuration variable rendered as a string; `None` when unset or empty.
    pub fn config_var(&self, name: &str) -> Option<String> {
        match self.config_vars.get(name)? {
            Value::String(s) if !s.is_empty() => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(if *b { "1" } else { "0" }.to_string()),
            _ => None,
        }
    }

    /// Whether a configuration variable is set to a truthy value.
    pub fn config_flag(&self, name: &str) -> bool {
        match self.config_vars.get(name) {
            Some(Value::Number(n)) => n.as_i64().map(|v| v != 0).unwrap_or(true),
            Some(Value::Bool(b)) => *b,
            Some(Value::String(s)) => !s.is_empty() && s != "0",
            _ => false,
        }
    }

    pub fn is_windows(&self) -> bool {
        self.platform.starts_with("win")
    }

    pub fn is_pypy(&self) -> bool {
        self.implementation == "pypy"
    }

    /// `major.minor`, used to name the build directory.
    pub fn short_version(&self) -> String {
        match self.version_info.as_slice() {
            [major, minor, ..] => format!("{}.{}", major, minor),
            _ => self.version.split('.').take(2).collect::<Vec<_>>().join("."),
        }
    }

    /// Version as spelled in library and include directory names.
    pub fn python_version(&self) -> String {
        self.config_var("VERSION")
            .or_else(|| self.config_var("py_version_short"))
            .unwrap_or_else(|| self.short_version())
    }

    /// Directory containing `Python.h`.
    pub fn include_dir(&self) -> Option<PathBuf> {
        let include_py = self.config_var("INCLUDEPY").map(PathBuf::from);
        if let Some(dir) = &include_py {
            if dir.join("Python.h").exists() {
                return include_py;
            }
        }

        let python_version = self.python_version();
        let parent = |p: PathBuf| p.parent().map(Path::to_path_buf);

        let mut prefixes: Vec<PathBuf> = Vec::new();
        prefixes.extend(include_py.clone().and_then(parent));
        prefixes.extend(self.config_var("INCLUDEDIR").map(PathBuf::from));
        prefixes.extend(self.paths.get("include").map(PathBuf::from).and_then(parent));
        prefixes.extend(self.paths.get("platinclude").map(PathBuf::from).and_then(parent));

        let mut versions = vec![python_version.clone()];
        if !python_version.is_empty() {
            versions.push(String::new());
            if self.config_flag("WITH_PYMALLOC") {
                versions.push(format!("{}m", python_version));
            }
        }

        for prefix in &prefixes {
            for version in &versions {
                let candidate = prefix.join(format!("python{}", version));
                if candidate.join("Python.h").exists() {
                    return Some(candidate);
                }
            }
        }

        include_py
    }

    /// Path of the runtime library to link extensions against.
    ///
    /// `dist_extra_config` is the distutils configuration named by
    /// `DIST_EXTRA_CONFIG`, consulted first when targeting Windows.
    pub fn library(&self, dist_extra_config: Option<&Path>) -> Option<PathBuf> {
        if self.is_windows() {
            if let Some(lib) = dist_extra_config.and_then(|config| self.cross_compile_library(config)) {
                return Some(lib);
            }
        }

        if let (Some(libdir), Some(ldlibrary)) = (self.config_var("LIBDIR"), self.config_var("LDLIBRARY")) {
            let mut libdir = PathBuf::from(libdir);
            if libdir.exists() {
                if let Some(masd) = self.multiarch_subdir() {
                    let with_masd = libdir.join(masd);
                    if with_masd.exists() {
                        libdir = with_masd;
                    }
                }
                let mut libpath = libdir.join(ldlibrary);
                if self.is_windows() && libpath.extension().map(|e| e == "dll").unwrap_or(false) {
                    libpath.set_extension("lib");
                }
                if libpath.is_file() {
                    return Some(libpath);
                }
            }
        }

        self.guess_library()
    }

    fn multiarch_subdir(&self) -> Option<String> {
        if self.config_var("MULTIARCH").is_none() {
            return None;
        }
        let masd = self.config_var("multiarchsubdir")?;
        Some(masd.trim_start_matches(['/', '\\']).to_string())
    }

    /// `[build_ext] library_dirs` of the distutils config used when
    /// cross-compiling on Windows.
    fn cross_compile_library(&self, config: &Path) -> Option<PathBuf> {
        let content = std::fs::read_to_string(config).ok()?;
        let library_dirs = ini_value(&content, "build_ext", "library_dirs")?;
        let minor = self.version_info.get(1)?;
        Some(PathBuf::from(library_dirs).join(format!("python3{}.lib", minor)))
    }

    /// Search for a dynamic library when the configured one is static or missing.
    fn guess_library(&self) -> Option<PathBuf> {
        let library = self.config_var("LIBRARY");
        let is_static = library
            .as_deref()
            .map(|lib| lib.ends_with(".a"))
            .unwrap_or(true);

        if !is_static {
            return library.map(PathBuf::from).filter(|p| p.exists());
        }

        self.library_candidates().into_iter().find(|candidate| candidate.exists())
    }

    /// Every candidate library path, in search order.
    pub fn library_candidates(&self) -> Vec<PathBuf> {
        let python_version = self.python_version();

        let prefixes = ["", "lib"];

        let mut implementations = vec!["python"];
        let mut suffixes = vec![""];
        if self.is_pypy() {
            implementations.splice(0..0, ["pypy-c", "pypy3-c", "pypy"]);
            suffixes.push("-c");
        }

        let mut extensions = vec![".lib", ".so", ".a"];
        let ldlibrary = self.config_var("LDLIBRARY").unwrap_or_default();
        if self.config_flag("WITH_DYLD") || ldlibrary.ends_with(".dylib") {
            extensions.insert(0, ".dylib");
        }

        let mut versions = vec![python_version.clone()];
        if !python_version.is_empty() {
            versions.push(String::new());
            let compact: String = python_version.split('.').take(2).collect();
            versions.insert(0, compact);
        }

        let mut abiflags = vec![self.abiflags.clone()];
        if !self.abiflags.is_empty() {
            abiflags.push(String::new());
        }

        let mut libdirs = Vec::new();
        let libdir = self.config_var("LIBDIR");
        if libdir.is_none() {
            let libs = match self.config_var("LIBDEST") {
                Some(libdest) => PathBuf::from(libdest).join("..").join("libs"),
                None => PathBuf::from("libs"),
            };
            libdirs.push(libs);
        }
        if let Some(libdir) = libdir {
            if let Some(masd) = self.multiarch_subdir() {
                libdirs.push(PathBuf::from(&libdir).join(masd));
            }
            libdirs.push(PathBuf::from(libdir));
        }

        let mut candidates = Vec::new();
        for libdir in &libdirs {
            for pre in prefixes {
                for imp in &implementations {
                    for ext in &extensions {
                        for ver in &versions {
                            for abi in &abiflags {
                                for suf in &suffixes {
                                    candidates.push(
                                        libdir.join(format!("{}{}{}{}{}{}", pre, imp, ver, abi, suf, ext)),
                                    );
                                }
                            }
                        }
                    }
                }
            }
        }
        candidates
    }
}

/// Look up `key` in `[section]` of an INI-style file.
fn ini_value(content: &str, section: &str, key: &str) -> Option<String> {
    let mut in_section = false;
    for line in content.lines().map(str::trim) {
        if line.starts_with('[') && line.ends_with(']') {
            in_section = line[1..line.len() - 1].trim() == section;
            continue;
        }
        if !in_section || line.starts_with('#') || line.starts_with(';') {
            continue;
        }
        if let Some((k, v)) = line.split_once(['=', ':']) {
            if k.trim() == key && !v.trim().is_empty() {
                return Some(v.trim().to_string());
            }
        }
    }
    None
}
