//! CMake facade.
//!
//! Configures the native project into the per-platform build directory,
//! drives the build and install targets, and reads back the install
//! manifest. Every command runs with an explicit working directory.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use regex::Regex;
use walkdir::WalkDir;

use crate::builder::probe::GeneratorResolver;
use crate::builder::python::InterpreterInfo;
use crate::builder::spec::BuildSpec;
use crate::core::errors::ShimError;
use crate::core::generator::Generator;
use crate::core::layout::BuildLayout;
use crate::core::platform::Platform;
use crate::core::project::lenient_version;
use crate::util::args::pop_arg;
use crate::util::fs::{ensure_dir, glob_files, normalize_path, read_to_string, to_unix_path};
use crate::util::process::{find_cmake, Executor, ProcessBuilder};
use crate::util::shell::{format_duration, Shell, Status};

/// Extra configure arguments; replaces `CMAKE_ARGS` when set.
pub const CONFIGURE_OPTIONS_ENV: &str = "SHIPWRIGHT_CONFIGURE_OPTIONS";

/// Extra arguments passed to the native build tool.
pub const BUILD_OPTIONS_ENV: &str = "SHIPWRIGHT_BUILD_OPTIONS";

/// Conventional variable carrying configure arguments.
pub const CMAKE_ARGS_ENV: &str = "CMAKE_ARGS";

const DEFAULT_CONFIG: &str = "Release";

/// An install rule with a fixed destination, as written to `cmake_install.cmake`.
const INSTALL_RULE_PATTERN: &str = r#"[ \t]*file\(INSTALL DESTINATION "([^"]+)".*"([^"]+)"\).*"#;

/// Inputs of a configure step.
#[derive(Debug, Clone)]
pub struct ConfigureOptions<'a> {
    /// Configure arguments; `-G` and `-A` are taken out and honoured
    pub clargs: Vec<String>,
    /// Generator requested by configuration or environment
    pub generator_name: Option<String>,
    /// Trust the requested generator without probing it
    pub skip_generator_test: bool,
    /// Absolute directory of the top-level `CMakeLists.txt`
    pub source_dir: PathBuf,
    /// Subdirectory of the install tree used as install prefix
    pub install_dir: String,
    /// Languages the probe project enables
    pub languages: Vec<String>,
    /// Keep the probe directory for inspection
    pub keep_probe: bool,
    pub interpreter: &'a InterpreterInfo,
    /// Distutils config of a Windows cross-compile (`DIST_EXTRA_CONFIG`)
    pub dist_extra_config: Option<PathBuf>,
}

/// Drives CMake for one build layout.
pub struct CMaker<'a> {
    executor: &'a dyn Executor,
    shell: &'a Shell,
    cmake: PathBuf,
    version: String,
    platform: Platform,
    layout: BuildLayout,
}

impl<'a> CMaker<'a> {
    /// Locate CMake (unless given) and record its version.
    pub fn new(
        executor: &'a dyn Executor,
        shell: &'a Shell,
        cmake: Option<&Path>,
        platform: Platform,
        layout: BuildLayout,
    ) -> Result<Self> {
        let cmake = match cmake {
            Some(path) => path.to_path_buf(),
            None => find_cmake().ok_or_else(|| ShimError::ToolMissing {
                tool: "cmake".to_string(),
                detail: "neither `cmake` nor `cmake3` was found on PATH".to_string(),
            })?,
        };
        let version = cmake_version(executor, &cmake)?;
        tracing::debug!("using {} (version {})", cmake.display(), version);

        Ok(CMaker {
            executor,
            shell,
            cmake,
            version,
            platform,
            layout,
        })
    }

    pub fn cmake_executable(&self) -> &Path {
        &self.cmake
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn layout(&self) -> &BuildLayout {
        &self.layout
    }

    /// Value of `variable` in the build directory's `CMakeCache.txt`.
    pub fn get_cached(&self, variable: &str) -> Option<String> {
        let content = std::fs::read_to_string(self.layout.cmake_cache()).ok()?;
        let prefix = format!("{}:", variable);
        content
            .lines()
            .find(|line| line.starts_with(&prefix))
            .and_then(|line| line.split_once('='))
            .map(|(_, value)| value.trim().to_string())
    }

    /// Generator recorded by a previous configure.
    pub fn get_cached_generator_name(&self) -> Option<String> {
        self.get_cached("CMAKE_GENERATOR")
    }

    /// Environment of the generator recorded by a previous configure.
    pub fn get_cached_generator_env(&self) -> Option<BTreeMap<String, String>> {
        let name = self.get_cached_generator_name()?;
        Some(self.platform.get_generator(&name).env().clone())
    }

    /// Configure unless the stored build spec equals `spec` and a previous
    /// configure left its generator marker. Returns the generator environment.
    pub fn configure_if_needed(
        &self,
        spec: &BuildSpec,
        opts: &ConfigureOptions<'_>,
    ) -> Result<BTreeMap<String, String>> {
        let spec_file = self.layout.spec_file();
        let stored = BuildSpec::load(&spec_file);

        if let Some(env) = self.get_cached_generator_env() {
            if spec.is_fresh(stored.as_ref()) {
                self.shell
                    .status(Status::Skipped, "configure (build inputs unchanged)");
                return Ok(env);
            }
        }

        let env = self.configure(opts)?;
        spec.save(&spec_file)?;
        Ok(env)
    }

    /// Run the configure step and return the generator environment.
    pub fn configure(&self, opts: &ConfigureOptions<'_>) -> Result<BTreeMap<String, String>> {
        let (clargs, generator_name) = pop_arg("-G", &opts.clargs, opts.generator_name.as_deref());
        let (clargs, architecture) = pop_arg("-A", &clargs, None);

        let build_dir = self.layout.build_dir();
        let install_dir = self.layout.install_dir();
        ensure_dir(&build_dir)?;
        ensure_dir(&install_dir)?;
        ensure_dir(&self.layout.setuptools_dir())?;

        let generator = self.resolve_generator(generator_name.as_deref(), architecture.as_deref(), opts)?;

        let prefix = normalize_path(&install_dir.join(&opts.install_dir));
        let mut args = vec![opts.source_dir.display().to_string()];
        args.extend(generator.command_line_args());
        args.push("--no-warn-unused-cli".to_string());
        args.push(format!("-DCMAKE_INSTALL_PREFIX:PATH={}", to_unix_path(&prefix)));
        args.extend(python_hints(opts.interpreter, &self.platform, opts.dist_extra_config.as_deref()));
        args.extend(clargs);

        let cmd = ProcessBuilder::new(&self.cmake)
            .args(&args)
            .envs(generator.env())
            .cwd(&build_dir);
        tracing::info!("configuring: {}", cmd.display_command());

        let output = {
            let _spinner = self.shell.spinner(
                Status::Configuring,
                format!("{} with `{}`", opts.source_dir.display(), generator),
            );
            self.executor
                .exec(&cmd)
                .with_context(|| format!("failed to run `{}`", cmd.display_command()))?
        };
        self.shell.tool_output(&output.combined());

        if !output.success() {
            return Err(ShimError::Configure {
                command: cmd.display_command(),
                source_dir: opts.source_dir.clone(),
                build_dir,
                output: output.combined(),
            }
            .into());
        }

        self.check_for_bad_installs()?;
        Ok(generator.env().clone())
    }

    fn resolve_generator(
        &self,
        name: Option<&str>,
        architecture: Option<&str>,
        opts: &ConfigureOptions<'_>,
    ) -> Result<Generator> {
        if let (true, Some(name)) = (opts.skip_generator_test, name) {
            let gen = self.platform.get_generator(name);
            return Ok(match architecture {
                Some(arch) => gen.with_architecture(Some(arch.to_string())),
                None => gen,
            });
        }

        let candidates = self.platform.candidates(name, architecture);
        GeneratorResolver::new(self.executor, self.shell, &self.cmake, self.layout.probe_dir())
            .keep_probe(opts.keep_probe)
            .with_installation_help(
                self.platform
                    .installation_help(&opts.interpreter.short_version()),
            )
            .resolve(None, &opts.languages, &candidates)
    }

    /// Reject install rules whose destination escapes the install tree.
    pub fn check_for_bad_installs(&self) -> Result<()> {
        let re = Regex::new(INSTALL_RULE_PATTERN)?;
        let root = self.layout.root();
        let install_dir = normalize_path(&self.layout.install_dir());
        let install_prefix = to_unix_path(&install_dir);

        let mut violating = Vec::new();
        for entry in WalkDir::new(self.layout.build_dir())
            .into_iter()
            .filter_map(|e| e.ok())
        {
            let path = entry.path();
            if !entry.file_type().is_file() || path.extension().map(|e| e != "cmake").unwrap_or(true) {
                continue;
            }
            let Ok(content) = std::fs::read_to_string(path) else {
                continue;
            };

            for caps in content.lines().filter_map(|line| re.captures(line)) {
                let destination = caps[1].replace("${CMAKE_INSTALL_PREFIX}", &install_prefix);
                let destination = normalize_path(&root.join(destination));
                if destination.starts_with(&install_dir) {
                    continue;
                }
                let file = Path::new(&caps[2])
                    .file_name()
                    .map(PathBuf::from)
                    .unwrap_or_default();
                violating.push(destination.join(file));
            }
        }

        if violating.is_empty() {
            return Ok(());
        }
        Err(ShimError::ManifestViolation {
            project_root: root.to_path_buf(),
            violating_files: violating,
        }
        .into())
    }

    /// Build, then run the install target.
    ///
    /// `--config` and `--install-target` are taken out of `clargs`; the rest
    /// goes to the native build tool. A non-default install target is
    /// preceded by a plain build.
    pub fn make(&self, clargs: &[String], install_target: &str, env: &BTreeMap<String, String>) -> Result<()> {
        let (clargs, config) = pop_arg("--config", clargs, Some(DEFAULT_CONFIG));
        let (clargs, install_target) = pop_arg("--install-target", &clargs, Some(install_target));
        let config = config.unwrap_or_else(|| DEFAULT_CONFIG.to_string());
        let install_target = install_target.unwrap_or_default();

        let build_dir = self.layout.build_dir();
        if !build_dir.exists() {
            return Err(ShimError::Build {
                command: format!("{} --build .", self.cmake.display()),
                install_target,
                build_dir: build_dir.clone(),
                output: format!(
                    "CMake build folder ({}) does not exist. Did you forget to run configure before make?",
                    build_dir.display()
                ),
            }
            .into());
        }

        if install_target != "install" {
            self.make_impl(&clargs, &config, None, env)?;
        }
        self.make_impl(&clargs, &config, Some(&install_target), env)
    }

    fn make_impl(
        &self,
        clargs: &[String],
        config: &str,
        target: Option<&str>,
        env: &BTreeMap<String, String>,
    ) -> Result<()> {
        let build_dir = self.layout.build_dir();

        let mut args = vec!["--build".to_string(), ".".to_string()];
        if let Some(target) = target {
            args.push("--target".to_string());
            args.push(target.to_string());
        }
        args.extend(["--config".to_string(), config.to_string(), "--".to_string()]);
        args.extend(clargs.iter().filter(|arg| !arg.is_empty()).cloned());

        let cmd = ProcessBuilder::new(&self.cmake)
            .args(&args)
            .envs(env)
            .cwd(&build_dir);
        tracing::info!("building: {}", cmd.display_command());

        let output = {
            let (status, what) = match target {
                Some(target) => (Status::Installing, format!("target `{}` ({})", target, config)),
                None => (Status::Building, format!("all targets ({})", config)),
            };
            let spinner = self.shell.spinner(status, what);
            let output = self
                .executor
                .exec(&cmd)
                .with_context(|| format!("failed to run `{}`", cmd.display_command()))?;
            tracing::debug!("build step took {}", format_duration(spinner.elapsed()));
            output
        };
        self.shell.tool_output(&output.combined());

        if !output.success() {
            return Err(ShimError::Build {
                command: cmd.display_command(),
                install_target: target.unwrap_or_default().to_string(),
                build_dir,
                output: output.combined(),
            }
            .into());
        }
        Ok(())
    }

    /// Files listed by the install manifest.
    ///
    /// Paths under the project root are returned relative to it; others are
    /// kept as written so the classifier can reject them.
    pub fn install(&self) -> Result<Vec<PathBuf>> {
        let manifests = glob_files(&self.layout.build_dir(), "install_manifest*.txt")?;
        let Some(manifest) = manifests.first() else {
            return Ok(Vec::new());
        };

        let content = read_to_string(manifest)?;
        let root = self.layout.root();
        Ok(content
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| {
                let path = normalize_path(Path::new(line));
                match path.strip_prefix(root) {
                    Ok(relative) => relative.to_path_buf(),
                    Err(_) => path,
                }
            })
            .collect())
    }
}

/// Version reported by `cmake --version`.
pub fn cmake_version(executor: &dyn Executor, cmake: &Path) -> Result<String> {
    let missing = |detail: String| ShimError::ToolMissing {
        tool: cmake.display().to_string(),
        detail,
    };

    let output = executor
        .exec(&ProcessBuilder::new(cmake).arg("--version"))
        .map_err(|e| missing(format!("Problem with the CMake installation: {:#}", e)))?;
    if !output.success() {
        return Err(missing("Problem with the CMake installation, aborting build.".to_string()).into());
    }

    let stdout = output.stdout_lossy();
    match stdout.lines().next().and_then(|line| line.split_whitespace().last()) {
        Some(version) => Ok(version.to_string()),
        None => Err(missing(format!("unrecognized version output: {:?}", stdout)).into()),
    }
}

/// Fail when `actual` is older than `required`.
pub fn check_minimum_version(required: &str, actual: &str) -> Result<(), ShimError> {
    let (Some(required_v), Some(actual_v)) = (lenient_version(required), lenient_version(actual)) else {
        return Ok(());
    };
    if actual_v < required_v {
        return Err(ShimError::ToolMissing {
            tool: "cmake".to_string(),
            detail: format!(
                "CMake version {} or higher is required. CMake version {} is being used",
                required, actual
            ),
        });
    }
    Ok(())
}

/// Whether `args` defines the cache variable `name`, optionally with `value`.
///
/// The last definition wins, as it does for CMake itself.
pub fn has_cmake_cache_arg(args: &[String], name: &str, value: Option<&str>) -> bool {
    let define = format!("-D{}", name);
    for arg in args.iter().rev() {
        let Some(rest) = arg.strip_prefix(&define) else {
            continue;
        };
        if !rest.starts_with(':') && !rest.starts_with('=') {
            continue;
        }
        return match value {
            None => true,
            Some(expected) => rest.split_once('=').map(|(_, v)| v == expected).unwrap_or(false),
        };
    }
    false
}

/// Configure arguments contributed by the environment.
pub fn configure_env_args(
    configure_options: Option<&str>,
    cmake_args: Option<&str>,
) -> Result<Vec<String>, ShimError> {
    if let Some(options) = configure_options {
        let args = split_env(CONFIGURE_OPTIONS_ENV, options)?;
        if args.iter().any(|arg| arg.contains("CMAKE_INSTALL_PREFIX")) {
            return Err(ShimError::usage(format!(
                "CMAKE_INSTALL_PREFIX may not be passed via {}",
                CONFIGURE_OPTIONS_ENV
            )));
        }
        return Ok(args);
    }

    match cmake_args {
        Some(value) => Ok(split_env(CMAKE_ARGS_ENV, value)?
            .into_iter()
            .filter(|arg| !arg.contains("CMAKE_INSTALL_PREFIX"))
            .collect()),
        None => Ok(Vec::new()),
    }
}

/// Build-tool arguments contributed by the environment.
pub fn build_env_args(build_options: Option<&str>) -> Result<Vec<String>, ShimError> {
    match build_options {
        Some(value) => split_env(BUILD_OPTIONS_ENV, value),
        None => Ok(Vec::new()),
    }
}

fn split_env(name: &str, value: &str) -> Result<Vec<String>, ShimError> {
    shlex::split(value)
        .ok_or_else(|| ShimError::usage(format!("{} is not a valid shell-style argument list", name)))
}

/// Interpreter location hints for both the legacy and the modern
/// `FindPython` modules.
fn python_hints(
    interp: &InterpreterInfo,
    platform: &Platform,
    dist_extra_config: Option<&Path>,
) -> Vec<String> {
    let executable = interp.executable.display().to_string();
    let include_dir = interp.include_dir();
    let library = interp.library(dist_extra_config);

    let mut args = vec![
        format!("-DPYTHON_VERSION_STRING:STRING={}", interp.version),
        "-DSKBUILD:INTERNAL=TRUE".to_string(),
        format!("-DPYTHON_EXECUTABLE:PATH={}", executable),
    ];
    if let Some(include) = &include_dir {
        args.push(format!("-DPYTHON_INCLUDE_DIR:PATH={}", include.display()));
    }
    if let Some(lib) = &library {
        args.push(format!("-DPYTHON_LIBRARY:PATH={}", lib.display()));
    }

    for prefix in ["-DPython", "-DPython3"] {
        args.push(format!("{}_EXECUTABLE:PATH={}", prefix, executable));
        args.push(format!("{}_ROOT_DIR:PATH={}", prefix, interp.prefix.display()));
        args.push(format!("{}_FIND_REGISTRY:STRING=NEVER", prefix));
        if let Some(include) = &include_dir {
            args.push(format!("{}_INCLUDE_DIR:PATH={}", prefix, include.display()));
        }
        if let (Platform::Windows { .. }, Some(lib)) = (platform, &library) {
            args.push(format!("{}_LIBRARY:PATH={}", prefix, lib.display()));
        }
        if interp.is_pypy() {
            args.push(format!("{}_FIND_IMPLEMENTATIONS:STRING=PyPy", prefix));
        }
    }

    args
}
