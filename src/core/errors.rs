//! Error kinds surfaced by the build orchestration.

use std::path::PathBuf;

use thiserror::Error;

use crate::util::diagnostic::Diagnostic;

/// Fatal failure of a shim invocation.
///
/// None of these are retried. The only fallback behaviour in the system is the
/// sequential search over generator candidates, which reports
/// [`ShimError::GeneratorNotFound`] once every candidate has failed.
#[derive(Debug, Error)]
pub enum ShimError {
    #[error("{message}")]
    Usage { message: String },

    #[error("could not find a working CMake generator for languages: {}", languages.join(", "))]
    GeneratorNotFound {
        languages: Vec<String>,
        tried: Vec<String>,
        installation_help: String,
    },

    #[error("an error occurred while configuring with CMake")]
    Configure {
        command: String,
        source_dir: PathBuf,
        build_dir: PathBuf,
        output: String,
    },

    #[error("an error occurred while building with CMake")]
    Build {
        command: String,
        install_target: String,
        build_dir: PathBuf,
        output: String,
    },

    #[error("CMake-installed files must be within the project root")]
    ManifestViolation {
        project_root: PathBuf,
        violating_files: Vec<PathBuf>,
    },

    #[error("`{tool}` could not be used: {detail}")]
    ToolMissing { tool: String, detail: String },

    #[error("unsupported platform: {platform}")]
    UnsupportedPlatform { platform: String },

    #[error("{message}")]
    InvalidProject { message: String },
}

impl ShimError {
    pub fn usage(message: impl Into<String>) -> Self {
        ShimError::Usage {
            message: message.into(),
        }
    }

    pub fn invalid_project(message: impl Into<String>) -> Self {
        ShimError::InvalidProject {
            message: message.into(),
        }
    }

    /// Stable identifier of the error kind.
    pub fn code(&self) -> &'static str {
        match self {
            ShimError::Usage { .. } => "shipwright::usage",
            ShimError::GeneratorNotFound { .. } => "shipwright::generator_not_found",
            ShimError::Configure { .. } => "shipwright::configure",
            ShimError::Build { .. } => "shipwright::build",
            ShimError::ManifestViolation { .. } => "shipwright::manifest_violation",
            ShimError::ToolMissing { .. } => "shipwright::tool_missing",
            ShimError::UnsupportedPlatform { .. } => "shipwright::unsupported_platform",
            ShimError::InvalidProject { .. } => "shipwright::invalid_project",
        }
    }

    /// Process exit status for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            ShimError::Usage { .. } => 2,
            _ => 1,
        }
    }

    /// Convert to a user-friendly diagnostic.
    pub fn to_diagnostic(&self) -> Diagnostic {
        let diag = Diagnostic::error(self.to_string()).with_code(self.code());

        match self {
            ShimError::Usage { .. } => diag.with_suggestion(
                "Run `shipwright --help` to see the recognized options",
            ),

            ShimError::GeneratorNotFound {
                tried,
                installation_help,
                ..
            } => {
                let mut diag = diag;
                for name in tried {
                    diag = diag.with_context(format!("tried generator: {}", name));
                }
                if !installation_help.is_empty() {
                    diag = diag.with_suggestion(installation_help.clone());
                }
                diag.with_suggestion("Pass an explicit generator with `-G <name>`")
            }

            ShimError::Configure {
                command,
                source_dir,
                build_dir,
                output,
            } => diag
                .with_location(build_dir)
                .with_context(format!("command: {}", command))
                .with_context(format!("source directory: {}", source_dir.display()))
                .with_output(output)
                .with_suggestion("See CMake's output above for more information"),

            ShimError::Build {
                command,
                install_target,
                build_dir,
                output,
            } => diag
                .with_location(build_dir)
                .with_context(format!("command: {}", command))
                .with_context(format!("install target: {}", install_target))
                .with_output(output)
                .with_suggestion("Check the install target is valid and see CMake's output"),

            ShimError::ManifestViolation {
                project_root,
                violating_files,
            } => {
                let mut diag = diag.with_location(project_root);
                for file in violating_files {
                    diag = diag.with_context(format!("violating file: {}", file.display()));
                }
                diag.with_suggestion(
                    "Install files relative to CMAKE_INSTALL_PREFIX instead of absolute destinations",
                )
            }

            ShimError::ToolMissing { tool, .. } => diag
                .with_suggestion(format!("Install {} and ensure it is on PATH", tool))
                .with_suggestion("Or point to it with `--cmake-executable <path>`"),

            ShimError::UnsupportedPlatform { .. } | ShimError::InvalidProject { .. } => diag,
        }
    }
}
