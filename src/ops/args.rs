//! Partitioning of the shim command line.
//!
//! ```text
//! shipwright <packaging args> [-- <configure args> [-- <build-tool args>]]
//! ```
//!
//! A handful of options are lifted out of the packaging group and rewritten
//! into the configure or build-tool group, so `--build-type Debug` and
//! `-DCMAKE_BUILD_TYPE:STRING=Debug` after the first separator are the same.

use std::path::PathBuf;

use clap::{Args, Parser};

use crate::core::errors::ShimError;
use crate::util::args::{extract_options, OptionSpec};

/// Separates the argument groups.
pub const SEPARATOR: &str = "--";

/// Options lifted from the packaging group.
#[derive(Debug, Clone, Default, PartialEq, Eq, Args)]
#[command(next_help_heading = "Build options")]
pub struct BuildOptions {
    /// Build type passed to CMake as CMAKE_BUILD_TYPE
    #[arg(long, value_name = "TYPE")]
    pub build_type: Option<String>,

    /// CMake generator to use
    #[arg(short = 'G', long, value_name = "NAME")]
    pub generator: Option<String>,

    /// Number of parallel jobs for the native build tool
    #[arg(short = 'j', value_name = "N")]
    pub jobs: Option<u32>,

    /// Path to the CMake executable
    #[arg(long, value_name = "PATH")]
    pub cmake_executable: Option<PathBuf>,

    /// CMake target performing the install
    #[arg(long, value_name = "TARGET")]
    pub install_target: Option<String>,

    /// Trust --generator without probing it
    #[arg(long)]
    pub skip_generator_test: bool,
}

impl BuildOptions {
    /// Tokens understood by [`BuildOptions`], for extraction from a mixed list.
    pub const SPECS: &'static [OptionSpec] = &[
        OptionSpec::value("build-type"),
        OptionSpec::value("generator").with_short('G'),
        OptionSpec::short_value('j'),
        OptionSpec::value("cmake-executable"),
        OptionSpec::value("install-target"),
        OptionSpec::flag("skip-generator-test"),
    ];
}

#[derive(Debug, Parser)]
#[command(no_binary_name = true, disable_help_flag = true, disable_version_flag = true)]
#[command(args_override_self = true)]
struct LiftedParser {
    #[command(flatten)]
    options: BuildOptions,
}

/// The three argument groups, before any option is lifted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArgumentGroups {
    /// Invoked program name
    pub program: Option<String>,
    /// Arguments before the first separator
    pub packaging: Vec<String>,
    /// Arguments between the separators
    pub configure: Vec<String>,
    /// Arguments after the second separator
    pub build_tool: Vec<String>,
}

impl ArgumentGroups {
    /// Split `argv` (program name first) on the `--` separators.
    pub fn split(argv: &[String]) -> Result<Self, ShimError> {
        let (program, rest) = match argv.split_first() {
            Some((program, rest)) => (Some(program.clone()), rest),
            None => (None, argv),
        };

        let mut groups: Vec<&[String]> = rest.split(|arg| arg == SEPARATOR).collect();
        if groups.len() > 3 {
            return Err(ShimError::usage(
                "Too many '--' separators provided (expected at most 2)",
            ));
        }
        groups.resize(3, &[]);

        Ok(ArgumentGroups {
            program,
            packaging: groups[0].to_vec(),
            configure: groups[1].to_vec(),
            build_tool: groups[2].to_vec(),
        })
    }

    /// The command line these groups were split from.
    pub fn join(&self) -> Vec<String> {
        let mut argv: Vec<String> = self.program.iter().cloned().collect();
        argv.extend(self.packaging.iter().cloned());
        if !self.configure.is_empty() || !self.build_tool.is_empty() {
            argv.push(SEPARATOR.to_string());
            argv.extend(self.configure.iter().cloned());
        }
        if !self.build_tool.is_empty() {
            argv.push(SEPARATOR.to_string());
            argv.extend(self.build_tool.iter().cloned());
        }
        argv
    }
}

/// A shim command line with the lifted options applied.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PartitionedArgs {
    pub program: Option<String>,
    /// Arguments for the packaging framework
    pub packaging: Vec<String>,
    /// Arguments for the configure step
    pub configure: Vec<String>,
    /// Arguments for the native build tool
    pub build_tool: Vec<String>,
    /// Options lifted from the packaging group
    pub options: BuildOptions,
}

/// Split `argv` and lift the build options out of the packaging group.
///
/// `-C...` and `-D...` tokens in the packaging group are moved to the end of
/// the configure group. Unknown packaging options are left in place.
pub fn partition(argv: &[String]) -> Result<PartitionedArgs, ShimError> {
    let groups = ArgumentGroups::split(argv)?;

    let (defines, packaging): (Vec<String>, Vec<String>) = groups
        .packaging
        .into_iter()
        .partition(|arg| arg.starts_with("-C") || arg.starts_with("-D"));

    let mut configure = groups.configure;
    configure.extend(defines);
    let mut build_tool = groups.build_tool;

    let (lifted, packaging) = extract_options(&packaging, BuildOptions::SPECS);
    let options = LiftedParser::try_parse_from(&lifted)
        .map_err(|e| ShimError::usage(e.to_string().trim_start_matches("error: ").trim()))?
        .options;

    if options.skip_generator_test && options.generator.is_none() {
        return Err(ShimError::usage(
            "Specifying --skip-generator-test requires --generator to also be specified.",
        ));
    }

    if let Some(build_type) = &options.build_type {
        configure.push(format!("-DCMAKE_BUILD_TYPE:STRING={}", build_type));
    }
    if let Some(generator) = &options.generator {
        configure.push("-G".to_string());
        configure.push(generator.clone());
    }
    if let Some(jobs) = options.jobs {
        build_tool.push("-j".to_string());
        build_tool.push(jobs.to_string());
    }
    if let Some(target) = &options.install_target {
        build_tool.push("--install-target".to_string());
        build_tool.push(target.clone());
    }

    if configure.iter().any(|arg| arg.contains("CMAKE_INSTALL_PREFIX")) {
        return Err(ShimError::usage(
            "CMAKE_INSTALL_PREFIX may not be passed to the shipwright CLI.",
        ));
    }

    Ok(PartitionedArgs {
        program: groups.program,
        packaging,
        configure,
        build_tool,
        options,
    })
}
