//! The setup operation.
//!
//! Decides whether the native build runs, drives configure/build/install
//! through [`CMaker`], classifies the install manifest and rewrites the
//! project declarations so the packaging framework picks the installed
//! files up. The result is a [`SetupPlan`].

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use anyhow::Result;
use serde::Serialize;

use crate::builder::classify::{Classification, Classifier, PackagePrefixes};
use crate::builder::cmake::{
    build_env_args, check_minimum_version, configure_env_args, has_cmake_cache_arg, CMaker,
    ConfigureOptions, BUILD_OPTIONS_ENV, CMAKE_ARGS_ENV, CONFIGURE_OPTIONS_ENV,
};
use crate::builder::python::InterpreterInfo;
use crate::builder::spec::{BuildSpec, InterpreterIdentity};
use crate::core::errors::ShimError;
use crate::core::layout::{default_plat_name, universal_machine, BuildLayout};
use crate::core::platform::Platform;
use crate::core::project::Project;
use crate::ops::args::PartitionedArgs;
use crate::ops::clean::clean;
use crate::util::context::GlobalContext;
use crate::util::fs::{copy_file, glob_files, read_to_string, relative_path, to_unix_path};
use crate::util::process::{find_python, Executor};
use crate::util::shell::{Shell, Status};

/// Packaging commands that need the native build.
pub const NATIVE_BUILD_COMMANDS: &[&str] = &[
    "build",
    "build_ext",
    "develop",
    "install",
    "install_lib",
    "bdist",
    "bdist_dumb",
    "bdist_egg",
    "bdist_rpm",
    "bdist_wininst",
    "bdist_wheel",
];

/// Options that only display metadata.
const DISPLAY_OPTIONS: &[&str] = &[
    "--help",
    "-h",
    "--help-commands",
    "--version",
    "--name",
    "--fullname",
    "--author",
    "--author-email",
    "--maintainer",
    "--maintainer-email",
    "--contact",
    "--contact-email",
    "--url",
    "--license",
    "--licence",
    "--description",
    "--long-description",
    "--platforms",
    "--classifiers",
    "--keywords",
    "--provides",
    "--requires",
    "--obsoletes",
];

/// Options for [`setup`].
#[derive(Debug, Clone, Default)]
pub struct SetupOptions {
    /// The partitioned command line
    pub args: PartitionedArgs,
    /// Reuse the existing build and install trees
    pub skip_cmake: bool,
    /// Run the native build even when nothing asks for it
    pub force_cmake: bool,
    /// Platform name of the build directory
    pub plat_name: Option<String>,
    /// Do not list copied files
    pub hide_listing: bool,
    /// Keep the generator probe directory
    pub keep_probe: bool,
}

/// Everything [`setup`] needs from its caller.
pub struct SetupContext<'a> {
    pub gctx: &'a GlobalContext,
    pub shell: &'a Shell,
    pub executor: &'a dyn Executor,
    pub platform: Platform,
}

/// One `data_files` entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DataFiles {
    pub dir: String,
    pub files: Vec<String>,
}

/// Declarations handed to the packaging framework.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct SetupPlan {
    /// Whether the native build ran (or was reused with `--skip-cmake`)
    pub native_build: bool,
    pub packages: Vec<String>,
    pub package_dir: BTreeMap<String, String>,
    pub package_data: BTreeMap<String, Vec<String>>,
    pub py_modules: Vec<String>,
    pub scripts: Vec<String>,
    pub data_files: Vec<DataFiles>,
    pub include_package_data: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub zip_safe: Option<bool>,
    pub has_ext_modules: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plat_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub install_dir: Option<String>,
    /// Arguments left for the packaging framework
    pub packaging_args: Vec<String>,
}

impl SetupPlan {
    /// The project's own declarations, untouched.
    fn passthrough(project: &Project, has_cmakelists: bool, packaging_args: &[String]) -> Self {
        SetupPlan {
            native_build: false,
            packages: project.packages.clone(),
            package_dir: project.package_dir.clone(),
            package_data: project.package_data.clone(),
            py_modules: project.py_modules.clone(),
            scripts: project.scripts.clone(),
            data_files: data_files_list(&project.data_files),
            include_package_data: project.include_package_data,
            zip_safe: None,
            has_ext_modules: has_cmakelists,
            plat_name: None,
            install_dir: None,
            packaging_args: packaging_args.to_vec(),
        }
    }
}

fn data_files_list(data_files: &BTreeMap<String, BTreeSet<String>>) -> Vec<DataFiles> {
    data_files
        .iter()
        .map(|(dir, files)| DataFiles {
            dir: dir.clone(),
            files: files.iter().cloned().collect(),
        })
        .collect()
}

/// Packaging command names: the tokens that are not options.
pub fn command_names(packaging: &[String]) -> Vec<&str> {
    packaging
        .iter()
        .map(String::as_str)
        .filter(|arg| !arg.starts_with('-'))
        .collect()
}

/// Whether any of `commands` needs the native build.
pub fn should_run_cmake(commands: &[&str], with_sdist: bool) -> bool {
    commands
        .iter()
        .any(|c| NATIVE_BUILD_COMMANDS.contains(c) || (with_sdist && *c == "sdist"))
}

fn is_display_only(packaging: &[String]) -> bool {
    packaging.iter().any(|arg| {
        let name = arg.split('=').next().unwrap_or(arg);
        DISPLAY_OPTIONS.contains(&name)
    })
}

fn is_developer_mode(commands: &[&str], packaging: &[String]) -> bool {
    commands.contains(&"develop")
        || (commands.contains(&"build_ext")
            && packaging.iter().any(|arg| arg == "--inplace" || arg == "-i"))
}

/// Run the native build for the project of `ctx` and produce the plan.
pub fn setup(ctx: &SetupContext<'_>, opts: &SetupOptions) -> Result<SetupPlan> {
    let gctx = ctx.gctx;
    let config = gctx.config();
    let root = gctx.project_root();

    let project = Project::load(&gctx.find_manifest()?)?;
    project.validate()?;

    let packaging = &opts.args.packaging;
    let commands = command_names(packaging);
    let has_cmakelists = project.has_cmakelists();

    if commands.contains(&"clean") {
        let plat_name = opts.plat_name.clone().unwrap_or_else(|| default_plat_name(gctx));
        clean(ctx.shell, root, &plat_name)?;
    }

    if !has_cmakelists {
        ctx.shell
            .status(Status::Skipped, "native build (no CMakeLists.txt found)");
    }

    let skip = is_display_only(packaging)
        || !should_run_cmake(&commands, project.cmake.with_sdist)
        || !has_cmakelists;
    if skip && !opts.force_cmake {
        tracing::debug!("native build not needed for commands {:?}", commands);
        return Ok(SetupPlan::passthrough(&project, has_cmakelists, packaging));
    }

    let python = config
        .python
        .executable
        .clone()
        .or_else(|| gctx.get_env("PYTHON").map(PathBuf::from))
        .or_else(find_python)
        .ok_or_else(|| ShimError::ToolMissing {
            tool: "python".to_string(),
            detail: "no interpreter found on PATH; set python.executable in the configuration".to_string(),
        })?;
    let interpreter = InterpreterInfo::probe(ctx.executor, &python)?;

    let mut cmake_args = configure_env_args(
        gctx.get_env(CONFIGURE_OPTIONS_ENV),
        gctx.get_env(CMAKE_ARGS_ENV),
    )?;
    cmake_args.extend(project.cmake.args.iter().cloned());
    cmake_args.extend(opts.args.configure.iter().cloned());

    let mut plat_name = opts.plat_name.clone().unwrap_or_else(|| default_plat_name(gctx));
    if ctx.platform == Platform::MacOs {
        plat_name = apply_macos_args(&plat_name, &mut cmake_args);
    }

    let build_type = build_type(&mut cmake_args);
    let mut make_args = opts.args.build_tool.clone();
    if let Some(jobs) = config.build.jobs {
        if !make_args.iter().any(|arg| arg.starts_with("-j")) {
            make_args.push(format!("-j{}", jobs));
        }
    }
    make_args.push("--config".to_string());
    make_args.push(build_type);
    make_args.extend(build_env_args(gctx.get_env(BUILD_OPTIONS_ENV))?);

    let layout = BuildLayout::new(root, plat_name.clone(), interpreter.short_version());
    let cmake = opts
        .args
        .options
        .cmake_executable
        .clone()
        .or_else(|| config.build.cmake_executable.clone());
    let cmaker = CMaker::new(
        ctx.executor,
        ctx.shell,
        cmake.as_deref(),
        ctx.platform.clone(),
        layout.clone(),
    )?;

    // Covers the build, classification and copy steps; restored on return.
    let _listing = (opts.hide_listing || config.output.hide_listing)
        .then(|| ctx.shell.suppress_listing());

    if opts.skip_cmake {
        ctx.shell
            .status(Status::Skipped, "configure and build (--skip-cmake)");
    } else {
        if let Some(minimum) = &project.cmake.minimum_version {
            check_minimum_version(minimum, cmaker.version())?;
        }

        let spec = BuildSpec {
            args: std::iter::once(cmaker.cmake_executable().display().to_string())
                .chain(cmake_args.iter().cloned())
                .collect(),
            version: cmaker.version().to_string(),
            interpreter: InterpreterIdentity {
                executable: interpreter.executable.display().to_string(),
                version: interpreter.version.clone(),
            },
            platform: plat_name.clone(),
            environment: BuildSpec::capture_environment(&config.spec.environment, |name| {
                gctx.get_env_raw(name).map(String::from)
            }),
        };

        let configure_opts = ConfigureOptions {
            clargs: cmake_args,
            generator_name: config
                .build
                .generator
                .clone()
                .or_else(|| gctx.get_env("CMAKE_GENERATOR").map(String::from)),
            skip_generator_test: opts.args.options.skip_generator_test,
            source_dir: project.source_dir(),
            install_dir: project.cmake.install_dir.clone(),
            languages: project.cmake.languages.clone(),
            keep_probe: opts.keep_probe,
            interpreter: &interpreter,
            dist_extra_config: gctx.get_env("DIST_EXTRA_CONFIG").map(PathBuf::from),
        };

        let env = cmaker.configure_if_needed(&spec, &configure_opts)?;
        cmaker.make(&make_args, &project.cmake.install_target, &env)?;
    }

    let package_dir = project.resolved_package_dir();
    let prefixes = PackagePrefixes::new(&package_dir, &project.packages);
    let classifier = Classifier::new(&prefixes, layout.relative_install_dir());

    let mut classification = Classification::new(&project.py_modules, &project.scripts)
        .with_declared(&project.package_data, &project.data_files);
    classifier.classify(&cmaker.install()?, &mut classification)?;

    let mut manifest_in_files = Vec::new();
    let manifest_in = root.join("MANIFEST.in");
    if project.include_package_data && manifest_in.is_file() {
        for pattern in parse_manifest_in(&read_to_string(&manifest_in)?) {
            for file in glob_files(root, &pattern)? {
                let relative = to_unix_path(relative_path(root, &file));
                classifier.classify_file(&relative, &mut classification);
                manifest_in_files.push(relative);
            }
        }
    }

    let developer_mode = is_developer_mode(&commands, packaging);
    let copier = Copier {
        shell: ctx.shell,
        root,
        layout: &layout,
        package_dir: &package_dir,
    };
    if developer_mode {
        ctx.shell
            .status(Status::Info, "copying installed files into the source tree");
        copier.copy_back(&classification)?;
    } else {
        copier.consolidate_package_modules(&project.packages, &classification)?;
        copier.consolidate_package_data(&project.package_data)?;
        copier.copy_into_install_tree(&manifest_in_files)?;
    }

    ctx.shell.status(
        Status::Finished,
        format!("native build in {}", layout.relative_install_dir().display()),
    );

    Ok(plan_from(
        &project,
        &layout,
        &package_dir,
        classification,
        developer_mode,
        has_cmakelists,
        packaging,
    ))
}

fn plan_from(
    project: &Project,
    layout: &BuildLayout,
    package_dir: &BTreeMap<String, String>,
    classification: Classification,
    developer_mode: bool,
    has_cmakelists: bool,
    packaging: &[String],
) -> SetupPlan {
    let install_rel = to_unix_path(layout.relative_install_dir());
    let install_dir = layout.install_dir();

    let mut final_package_dir: BTreeMap<String, String> = package_dir
        .iter()
        .map(|(package, prefix)| {
            let dir = if !developer_mode && !package.is_empty() && install_dir.join(prefix).exists() {
                format!("{}/{}", install_rel, prefix)
            } else {
                prefix.clone()
            };
            (package.clone(), dir)
        })
        .collect();

    if !developer_mode && !package_dir.contains_key("") && classification.found_modules().next().is_some() {
        final_package_dir.insert(String::new(), install_rel.clone());
    }

    let scripts = project
        .scripts
        .iter()
        .map(|script| match classification.script_paths.get(script) {
            Some(installed) => format!("{}/{}", install_rel, installed),
            None => script.clone(),
        })
        .collect();

    SetupPlan {
        native_build: true,
        packages: project.packages.clone(),
        package_dir: final_package_dir,
        package_data: classification.package_data,
        py_modules: project.py_modules.clone(),
        scripts,
        data_files: data_files_list(&classification.data_files),
        include_package_data: project.include_package_data,
        zip_safe: Some(false),
        has_ext_modules: has_cmakelists,
        plat_name: Some(layout.plat_name().to_string()),
        install_dir: Some(install_rel),
        packaging_args: packaging.to_vec(),
    }
}

/// Moves files between the source tree and the install tree.
struct Copier<'a> {
    shell: &'a Shell,
    root: &'a Path,
    layout: &'a BuildLayout,
    package_dir: &'a BTreeMap<String, String>,
}

impl Copier<'_> {
    fn copy(&self, src: &Path, dst: &Path) -> Result<()> {
        if let Some(created) = copy_file(src, dst)? {
            self.shell
                .listing(format!("creating directory {}", created.display()));
        }
        self.shell
            .listing(format!("copying {} -> {}", src.display(), dst.display()));
        Ok(())
    }

    fn prefix(&self, package: &str) -> String {
        self.package_dir
            .get(package)
            .cloned()
            .unwrap_or_else(|| package.replace('.', "/"))
    }

    /// Developer mode: bring installed package data and modules into the
    /// source tree so the project works in place.
    fn copy_back(&self, classification: &Classification) -> Result<()> {
        let install_dir = self.layout.install_dir();

        for (package, files) in &classification.package_data {
            let prefix = self.prefix(package);
            for file in files {
                let src = install_dir.join(&prefix).join(file);
                if !src.is_file() {
                    continue;
                }
                self.copy(&src, &self.root.join(&prefix).join(file))?;
            }
        }

        for module in classification.found_modules() {
            let file = format!("{}.py", module.replace('.', "/"));
            let src = install_dir.join(&file);
            if src.is_file() {
                self.copy(&src, &self.root.join(&file))?;
            }
        }
        Ok(())
    }

    /// Copy the source modules of every package into the install tree.
    ///
    /// Files CMake installed are left alone.
    fn consolidate_package_modules(&self, packages: &[String], classification: &Classification) -> Result<()> {
        let install_dir = self.layout.install_dir();

        for package in packages {
            let prefix = self.prefix(package);
            let source = self.root.join(&prefix);
            if !source.is_dir() {
                continue;
            }
            let installed = classification
                .package_data
                .get(package)
                .map(|files| files.iter().map(String::as_str).collect::<BTreeSet<_>>())
                .unwrap_or_default();

            for module in glob_files(&source, "*.py")? {
                let Some(name) = module.file_name().map(|n| n.to_string_lossy().into_owned()) else {
                    continue;
                };
                let dst = install_dir.join(&prefix).join(&name);
                if installed.contains(name.as_str()) || dst.exists() {
                    continue;
                }
                self.copy(&module, &dst)?;
            }
        }
        Ok(())
    }

    /// Copy declared package data from the source tree into the install tree.
    fn consolidate_package_data(&self, package_data: &BTreeMap<String, Vec<String>>) -> Result<()> {
        let install_dir = self.layout.install_dir();

        for (package, patterns) in package_data {
            let prefix = self.prefix(package);
            let source = self.root.join(&prefix);
            for pattern in patterns {
                for file in glob_files(&source, pattern)? {
                    let dst = install_dir.join(&prefix).join(relative_path(&source, &file));
                    if !dst.exists() {
                        self.copy(&file, &dst)?;
                    }
                }
            }
        }
        Ok(())
    }

    fn copy_into_install_tree(&self, files: &[String]) -> Result<()> {
        let install_dir = self.layout.install_dir();
        for file in files {
            let dst = install_dir.join(file);
            if !dst.exists() {
                self.copy(&self.root.join(file), &dst)?;
            }
        }
        Ok(())
    }
}

/// Build type from the last `CMAKE_BUILD_TYPE` definition, adding a
/// `Release` definition when there is none.
pub fn build_type(cmake_args: &mut Vec<String>) -> String {
    for arg in cmake_args.iter().rev() {
        let Some(rest) = arg.strip_prefix("-DCMAKE_BUILD_TYPE") else {
            continue;
        };
        if rest.starts_with(':') || rest.starts_with('=') {
            if let Some((_, value)) = rest.split_once('=') {
                return value.to_string();
            }
        }
    }

    cmake_args.push("-DCMAKE_BUILD_TYPE:STRING=Release".to_string());
    "Release".to_string()
}

/// Reconcile a macOS platform name with `CMAKE_OSX_*` arguments.
///
/// Arguments override the version and machine of `plat_name`; the resulting
/// values are then passed to CMake unless already defined.
pub fn apply_macos_args(plat_name: &str, cmake_args: &mut Vec<String>) -> String {
    let mut parts = plat_name.splitn(3, '-');
    let (Some(_), Some(version), Some(machine)) = (parts.next(), parts.next(), parts.next()) else {
        return plat_name.to_string();
    };
    let mut version = version.to_string();
    let mut machine = machine.to_string();

    for arg in cmake_args.iter() {
        let Some((_, value)) = arg.split_once('=') else {
            continue;
        };
        if arg.contains("CMAKE_OSX_DEPLOYMENT_TARGET") {
            version = value.to_string();
        }
        if arg.contains("CMAKE_OSX_ARCHITECTURES") {
            machine = universal_machine(value);
        }
    }

    if !has_cmake_cache_arg(cmake_args, "CMAKE_OSX_DEPLOYMENT_TARGET", None) {
        cmake_args.push(format!("-DCMAKE_OSX_DEPLOYMENT_TARGET:STRING={}", version));
    }
    if !has_cmake_cache_arg(cmake_args, "CMAKE_OSX_ARCHITECTURES", None) {
        let archs = if machine == "universal2" { "x86_64;arm64" } else { machine.as_str() };
        cmake_args.push(format!("-DCMAKE_OSX_ARCHITECTURES:STRING={}", archs));
    }

    format!("macosx-{}-{}", version, machine)
}

/// Glob patterns named by `include`, `recursive-include` and `graft` lines.
///
/// Exclusion directives are not applied.
pub fn parse_manifest_in(content: &str) -> Vec<String> {
    let mut patterns = Vec::new();
    for line in content.lines().map(str::trim) {
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let words: Vec<&str> = line.split_whitespace().collect();
        match words.as_slice() {
            ["include", rest @ ..] => patterns.extend(rest.iter().map(|p| p.to_string())),
            ["recursive-include", dir, rest @ ..] => {
                let dir = dir.trim_end_matches('/');
                patterns.extend(rest.iter().map(|p| format!("{}/**/{}", dir, p)));
            }
            ["graft", dir] => patterns.push(format!("{}/**/*", dir.trim_end_matches('/'))),
            _ => tracing::debug!("ignoring MANIFEST.in line: {}", line),
        }
    }
    patterns
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ops::args::partition;
    use crate::util::process::{ProcessBuilder, ProcessOutput};
    use crate::test_support::{
        interpreter_json, test_context, MockExecutor, MockProcessOutput, ProjectFixture,
        CMAKE_VERSION_OUTPUT,
    };

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn options(argv: &[&str]) -> SetupOptions {
        let mut full = vec!["shipwright"];
        full.extend_from_slice(argv);
        SetupOptions {
            args: partition(&strings(&full)).unwrap(),
            plat_name: Some("linux-x86_64".to_string()),
            ..Default::default()
        }
    }

    fn toolchain(root: &Path) -> MockExecutor {
        let exec = MockExecutor::new();
        exec.expect_prefix("python3 -c", MockProcessOutput::success(interpreter_json(&root.join("py"))));
        exec.expect("cmake --version", MockProcessOutput::success(CMAKE_VERSION_OUTPUT));
        exec.expect_prefix("cmake ./ -G", MockProcessOutput::success(""));
        exec.expect_contains("--no-warn-unused-cli", MockProcessOutput::success(""));
        exec.expect_prefix("cmake --build", MockProcessOutput::success(""));
        exec
    }

    /// Lay out what `cmake --install` would leave behind.
    fn fake_install(root: &Path, files: &[&str]) {
        let layout = BuildLayout::new(root, "linux-x86_64", "3.12");
        std::fs::create_dir_all(layout.build_dir()).unwrap();

        let mut manifest = String::new();
        for file in files {
            let path = layout.install_dir().join(file);
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            std::fs::write(&path, "binary").unwrap();
            manifest.push_str(&format!("{}\n", path.display()));
        }
        std::fs::write(layout.build_dir().join("install_manifest.txt"), manifest).unwrap();
    }

    #[test]
    fn test_hello_project_end_to_end() {
        let tmp = ProjectFixture::hello().create().unwrap();
        let root = tmp.path();
        fake_install(root, &["hello/_ext.so", "bin/run.sh"]);

        let gctx = test_context(root);
        let shell = Shell::quiet();
        let exec = toolchain(root);
        let ctx = SetupContext {
            gctx: &gctx,
            shell: &shell,
            executor: &exec,
            platform: Platform::Linux,
        };

        let plan = setup(&ctx, &options(&["bdist_wheel"])).unwrap();

        let install = "_skbuild/linux-x86_64-3.12/cmake-install";
        assert!(plan.native_build);
        assert_eq!(plan.package_data.len(), 1);
        assert_eq!(plan.package_data["hello"], strings(&["_ext.so"]));
        assert_eq!(plan.scripts, vec![format!("{}/bin/run.sh", install)]);
        assert!(plan.data_files.is_empty());
        assert_eq!(plan.package_dir["hello"], format!("{}/hello", install));
        assert_eq!(plan.zip_safe, Some(false));
        assert!(plan.has_ext_modules);
        assert_eq!(plan.packaging_args, strings(&["bdist_wheel"]));

        // Source modules join the CMake output.
        assert!(root.join(install).join("hello/__init__.py").is_file());

        let configure = &exec.calls_containing("--no-warn-unused-cli")[0];
        assert!(configure.contains("-DCMAKE_BUILD_TYPE:STRING=Release"));
        assert_eq!(
            exec.calls_containing("--build"),
            vec!["cmake --build . --target install --config Release --"]
        );
    }

    #[test]
    fn test_second_run_skips_configure() {
        let tmp = ProjectFixture::hello().create().unwrap();
        let root = tmp.path();
        fake_install(root, &["hello/_ext.so"]);

        let layout = BuildLayout::new(root, "linux-x86_64", "3.12");
        std::fs::write(layout.cmake_cache(), "CMAKE_GENERATOR:INTERNAL=Unix Makefiles\n").unwrap();

        let gctx = test_context(root);
        let shell = Shell::quiet();
        let exec = toolchain(root);
        let ctx = SetupContext {
            gctx: &gctx,
            shell: &shell,
            executor: &exec,
            platform: Platform::Linux,
        };

        setup(&ctx, &options(&["build"])).unwrap();
        setup(&ctx, &options(&["build"])).unwrap();

        assert_eq!(exec.calls_containing("--no-warn-unused-cli").len(), 1);
        assert_eq!(exec.calls_containing("--build").len(), 2);
    }

    #[test]
    fn test_empty_environment_variable_forces_reconfigure() {
        let tmp = ProjectFixture::hello().create().unwrap();
        let root = tmp.path();
        fake_install(root, &["hello/_ext.so"]);

        let layout = BuildLayout::new(root, "linux-x86_64", "3.12");
        std::fs::write(layout.cmake_cache(), "CMAKE_GENERATOR:INTERNAL=Unix Makefiles\n").unwrap();

        let shell = Shell::quiet();
        let exec = toolchain(root);

        let unset = test_context(root);
        let ctx = SetupContext {
            gctx: &unset,
            shell: &shell,
            executor: &exec,
            platform: Platform::Linux,
        };
        setup(&ctx, &options(&["build"])).unwrap();

        let empty = test_context(root).with_env([("PYTHONNOUSERSITE", "")]);
        let ctx = SetupContext {
            gctx: &empty,
            shell: &shell,
            executor: &exec,
            platform: Platform::Linux,
        };
        setup(&ctx, &options(&["build"])).unwrap();

        assert_eq!(exec.calls_containing("--no-warn-unused-cli").len(), 2);
    }

    /// Notes whether file listings were visible when each command ran.
    struct VisibilityRecorder<'a> {
        inner: MockExecutor,
        shell: &'a Shell,
        seen: std::sync::Mutex<Vec<(String, bool)>>,
    }

    impl Executor for VisibilityRecorder<'_> {
        fn exec(&self, cmd: &ProcessBuilder) -> Result<ProcessOutput> {
            self.seen
                .lock()
                .unwrap()
                .push((cmd.display_command(), self.shell.listing_visible()));
            self.inner.exec(cmd)
        }
    }

    #[test]
    fn test_hide_listing_covers_build_and_is_restored() {
        let tmp = ProjectFixture::hello().create().unwrap();
        let root = tmp.path();
        fake_install(root, &["hello/_ext.so"]);

        let gctx = test_context(root);
        let shell = Shell::from_flags(false, false, false);
        let exec = VisibilityRecorder {
            inner: toolchain(root),
            shell: &shell,
            seen: std::sync::Mutex::new(Vec::new()),
        };
        let ctx = SetupContext {
            gctx: &gctx,
            shell: &shell,
            executor: &exec,
            platform: Platform::Linux,
        };

        let opts = SetupOptions {
            hide_listing: true,
            ..options(&["build"])
        };
        setup(&ctx, &opts).unwrap();

        let seen = exec.seen.lock().unwrap();
        let native: Vec<&(String, bool)> = seen
            .iter()
            .filter(|(command, _)| command.contains("--no-warn-unused-cli") || command.contains("--build"))
            .collect();
        assert_eq!(native.len(), 2);
        assert!(native.iter().all(|(_, visible)| !visible));
        assert!(shell.listing_visible());
    }

    #[test]
    fn test_no_cmakelists_passes_through() {
        let tmp = ProjectFixture::new("packages = [\"hello\"]\n")
            .file("hello/__init__.py", "")
            .create()
            .unwrap();

        let gctx = test_context(tmp.path());
        let shell = Shell::quiet();
        let exec = MockExecutor::new();
        let ctx = SetupContext {
            gctx: &gctx,
            shell: &shell,
            executor: &exec,
            platform: Platform::Linux,
        };

        let plan = setup(&ctx, &options(&["bdist_wheel"])).unwrap();
        assert!(!plan.native_build);
        assert!(!plan.has_ext_modules);
        assert_eq!(plan.zip_safe, None);
        assert!(exec.calls().is_empty());
    }

    #[test]
    fn test_commands_that_do_not_need_native_build() {
        let tmp = ProjectFixture::hello().create().unwrap();
        let gctx = test_context(tmp.path());
        let shell = Shell::quiet();
        let exec = MockExecutor::new();
        let ctx = SetupContext {
            gctx: &gctx,
            shell: &shell,
            executor: &exec,
            platform: Platform::Linux,
        };

        let cases: [&[&str]; 4] = [&["sdist"], &["egg_info"], &["bdist_wheel", "--name"], &[]];
        for argv in cases {
            let plan = setup(&ctx, &options(argv)).unwrap();
            assert!(!plan.native_build, "{:?} should not build", argv);
            assert!(plan.has_ext_modules);
        }
        assert!(exec.calls().is_empty());
    }

    #[test]
    fn test_developer_mode_copies_back() {
        let tmp = ProjectFixture::hello().create().unwrap();
        let root = tmp.path();
        fake_install(root, &["hello/_ext.so"]);

        let gctx = test_context(root);
        let shell = Shell::quiet();
        let exec = toolchain(root);
        let ctx = SetupContext {
            gctx: &gctx,
            shell: &shell,
            executor: &exec,
            platform: Platform::Linux,
        };

        let plan = setup(&ctx, &options(&["build_ext", "--inplace"])).unwrap();

        assert!(root.join("hello/_ext.so").is_file());
        assert_eq!(plan.package_dir["hello"], "hello");
    }

    #[test]
    fn test_installed_module_outside_root_fails() {
        let tmp = ProjectFixture::hello().create().unwrap();
        let root = tmp.path();
        fake_install(root, &["hello/_ext.so"]);

        let layout = BuildLayout::new(root, "linux-x86_64", "3.12");
        let manifest = layout.build_dir().join("install_manifest.txt");
        let mut content = std::fs::read_to_string(&manifest).unwrap();
        content.push_str("/usr/local/lib/libhello.so\n");
        std::fs::write(&manifest, content).unwrap();

        let gctx = test_context(root);
        let shell = Shell::quiet();
        let exec = toolchain(root);
        let ctx = SetupContext {
            gctx: &gctx,
            shell: &shell,
            executor: &exec,
            platform: Platform::Linux,
        };

        let err = setup(&ctx, &options(&["build"])).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ShimError>(),
            Some(ShimError::ManifestViolation { .. })
        ));
    }

    #[test]
    fn test_minimum_version_enforced() {
        let tmp = ProjectFixture::hello()
            .file(
                "Shipwright.toml",
                "packages = [\"hello\"]\n\n[cmake]\nminimum-version = \"3.99\"\n",
            )
            .create()
            .unwrap();

        let gctx = test_context(tmp.path());
        let shell = Shell::quiet();
        let exec = toolchain(tmp.path());
        let ctx = SetupContext {
            gctx: &gctx,
            shell: &shell,
            executor: &exec,
            platform: Platform::Linux,
        };

        let err = setup(&ctx, &options(&["build"])).unwrap_err();
        assert!(err.to_string().contains("CMake version 3.99 or higher is required"));
        assert!(exec.calls_containing("--no-warn-unused-cli").is_empty());
    }

    #[test]
    fn test_environment_arguments_reach_configure() {
        let tmp = ProjectFixture::hello().create().unwrap();
        let root = tmp.path();
        fake_install(root, &[]);

        let gctx = test_context(root).with_env([
            ("CMAKE_ARGS", "-DFROM_ENV=1"),
            ("SHIPWRIGHT_BUILD_OPTIONS", "VERBOSE=1"),
        ]);
        let shell = Shell::quiet();
        let exec = toolchain(root);
        let ctx = SetupContext {
            gctx: &gctx,
            shell: &shell,
            executor: &exec,
            platform: Platform::Linux,
        };

        setup(&ctx, &options(&["build", "--build-type", "Debug", "--", "-DCLI=1"])).unwrap();

        let configure = &exec.calls_containing("--no-warn-unused-cli")[0];
        let env_at = configure.find("-DFROM_ENV=1").unwrap();
        let cli_at = configure.find("-DCLI=1").unwrap();
        assert!(env_at < cli_at);
        assert!(configure.contains("-DCMAKE_BUILD_TYPE:STRING=Debug"));
        assert!(!configure.contains("-DCMAKE_BUILD_TYPE:STRING=Release"));
        assert_eq!(
            exec.calls_containing("--build"),
            vec!["cmake --build . --target install --config Debug -- VERBOSE=1"]
        );
    }

    #[test]
    fn test_manifest_in_files_are_classified() {
        let tmp = ProjectFixture::new("packages = [\"hello\"]\ninclude-package-data = true\n")
            .file("hello/__init__.py", "")
            .file("hello/data.txt", "data")
            .file("CMakeLists.txt", "project(hello NONE)\n")
            .file("MANIFEST.in", "include hello/*.txt\n")
            .create()
            .unwrap();
        let root = tmp.path();
        fake_install(root, &[]);

        let gctx = test_context(root);
        let shell = Shell::quiet();
        let exec = toolchain(root);
        let ctx = SetupContext {
            gctx: &gctx,
            shell: &shell,
            executor: &exec,
            platform: Platform::Linux,
        };

        let plan = setup(&ctx, &options(&["build"])).unwrap();
        assert_eq!(plan.package_data["hello"], strings(&["data.txt"]));
        assert!(root
            .join("_skbuild/linux-x86_64-3.12/cmake-install/hello/data.txt")
            .is_file());
    }

    #[test]
    fn test_build_type() {
        let mut args = strings(&["-DCMAKE_BUILD_TYPE=Debug", "-DCMAKE_BUILD_TYPE:STRING=RelWithDebInfo"]);
        assert_eq!(build_type(&mut args), "RelWithDebInfo");
        assert_eq!(args.len(), 2);

        let mut args = strings(&["-DFOO=1"]);
        assert_eq!(build_type(&mut args), "Release");
        assert_eq!(args.last().unwrap(), "-DCMAKE_BUILD_TYPE:STRING=Release");
    }

    #[test]
    fn test_macos_args() {
        let mut args = Vec::new();
        let plat = apply_macos_args("macosx-11.0-arm64", &mut args);
        assert_eq!(plat, "macosx-11.0-arm64");
        assert_eq!(
            args,
            strings(&[
                "-DCMAKE_OSX_DEPLOYMENT_TARGET:STRING=11.0",
                "-DCMAKE_OSX_ARCHITECTURES:STRING=arm64",
            ])
        );

        let mut args = strings(&["-DCMAKE_OSX_ARCHITECTURES=arm64;x86_64"]);
        let plat = apply_macos_args("macosx-12.0-arm64", &mut args);
        assert_eq!(plat, "macosx-12.0-universal2");
        assert_eq!(args.len(), 2);
        assert_eq!(args[1], "-DCMAKE_OSX_DEPLOYMENT_TARGET:STRING=12.0");
    }

    #[test]
    fn test_parse_manifest_in() {
        let content = "# comment\ninclude README.md hello/*.txt\nrecursive-include data *.dat\nexclude x\ngraft assets/\n";
        assert_eq!(
            parse_manifest_in(content),
            strings(&["README.md", "hello/*.txt", "data/**/*.dat", "assets/**/*"])
        );
    }

    #[test]
    fn test_should_run_cmake() {
        assert!(should_run_cmake(&["bdist_wheel"], false));
        assert!(!should_run_cmake(&["sdist"], false));
        assert!(should_run_cmake(&["sdist"], true));
        assert!(!should_run_cmake(&[], false));
    }
}
