//! CLI definitions using clap.
//!
//! Only the shim's own options are parsed here. Everything else on the
//! command line belongs to the packaging framework, CMake or the native
//! build tool and is split off by [`shipwright::ops::partition`] first.

use std::path::PathBuf;

use clap::Parser;
use shipwright::ops::BuildOptions;
use shipwright::util::args::OptionSpec;

const AFTER_HELP: &str = "\
Arguments after a first `--` are passed to CMake when configuring.
Arguments after a second `--` are passed to the native build tool.";

/// Shipwright - delegate the native part of a package build to CMake
#[derive(Debug, Parser)]
#[command(name = "shipwright")]
#[command(author, version, about, long_about = None)]
#[command(override_usage = "shipwright [OPTIONS] [COMMANDS]... [-- <CMAKE ARGS>... [-- <BUILD TOOL ARGS>...]]")]
#[command(after_help = AFTER_HELP)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long)]
    pub verbose: bool,

    /// Print nothing but errors
    #[arg(short, long)]
    pub quiet: bool,

    /// Do not list the files copied between trees
    #[arg(long)]
    pub hide_listing: bool,

    /// Run the native build even when no command needs it
    #[arg(long)]
    pub force_cmake: bool,

    /// Reuse the existing build and install trees
    #[arg(long, conflicts_with = "force_cmake")]
    pub skip_cmake: bool,

    /// Platform name of the build directory
    #[arg(long, value_name = "NAME")]
    pub plat_name: Option<String>,

    /// Keep the generator probe directory for inspection
    #[arg(long)]
    pub keep_probe: bool,

    /// Path to Shipwright.toml
    #[arg(long, value_name = "PATH")]
    pub manifest_path: Option<PathBuf>,

    /// Write the setup plan to a file instead of stdout
    #[arg(long, value_name = "FILE")]
    pub plan: Option<PathBuf>,

    #[command(flatten)]
    pub build: BuildOptions,
}

impl Cli {
    /// Tokens parsed by [`Cli`]; the build options are lifted earlier.
    pub const SPECS: &'static [OptionSpec] = &[
        OptionSpec::flag("verbose").with_short('v'),
        OptionSpec::flag("quiet").with_short('q'),
        OptionSpec::flag("hide-listing"),
        OptionSpec::flag("force-cmake"),
        OptionSpec::flag("skip-cmake"),
        OptionSpec::value("plat-name"),
        OptionSpec::flag("keep-probe"),
        OptionSpec::value("manifest-path"),
        OptionSpec::value("plan"),
        OptionSpec::flag("help").with_short('h'),
        OptionSpec::flag("version").with_short('V'),
    ];
}
