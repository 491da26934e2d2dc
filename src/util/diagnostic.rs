//! Rendering of fatal errors for the terminal.
//!
//! A diagnostic is a headline tagged with a stable code, the facts needed to
//! reproduce the failure, the tail of the native tool's output when a tool
//! failed, and numbered suggestions.
//!
//! ```text
//! error[shipwright::configure]: an error occurred while configuring with CMake
//!   --> /work/proj/_skbuild/linux-x86_64-3.12/cmake-build
//!   command: cmake /work/proj -G Ninja ...
//!
//!   | CMake Error at CMakeLists.txt:3 (project):
//!   |   No CMAKE_C_COMPILER could be found.
//!
//! help: consider:
//!   1. See CMake's output above for more information
//! ```

use std::fmt;
use std::path::PathBuf;

/// Lines of tool output kept in a diagnostic.
pub const OUTPUT_TAIL: usize = 20;

const RED: &str = "\x1b[1;31m";
const GREEN: &str = "\x1b[1;32m";
const RESET: &str = "\x1b[0m";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Diagnostic {
    pub message: String,
    /// Stable identifier such as `shipwright::usage`
    pub code: Option<&'static str>,
    /// Directory or file the failure is about
    pub location: Option<PathBuf>,
    pub context: Vec<String>,
    /// Last lines printed by the failing tool
    pub output: Vec<String>,
    pub suggestions: Vec<String>,
}

impl Diagnostic {
    pub fn error(message: impl Into<String>) -> Self {
        Diagnostic {
            message: message.into(),
            ..Default::default()
        }
    }

    pub fn with_code(mut self, code: &'static str) -> Self {
        self.code = Some(code);
        self
    }

    pub fn with_location(mut self, path: impl Into<PathBuf>) -> Self {
        self.location = Some(path.into());
        self
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context.push(context.into());
        self
    }

    /// Attach the last [`OUTPUT_TAIL`] lines of `output`.
    pub fn with_output(mut self, output: &str) -> Self {
        let lines: Vec<&str> = output.lines().collect();
        let start = lines.len().saturating_sub(OUTPUT_TAIL);
        self.output = lines[start..].iter().map(|line| line.to_string()).collect();
        self
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestions.push(suggestion.into());
        self
    }

    /// Render for a terminal, with ANSI colors when `color` is set.
    pub fn format(&self, color: bool) -> String {
        let paint = |style: &str, text: &str| {
            if color {
                format!("{}{}{}", style, text, RESET)
            } else {
                text.to_string()
            }
        };

        let headline = match self.code {
            Some(code) => format!("error[{}]", code),
            None => "error".to_string(),
        };
        let mut out = format!("{}: {}\n", paint(RED, &headline), self.message);

        if let Some(path) = &self.location {
            out.push_str(&format!("  --> {}\n", path.display()));
        }
        for line in &self.context {
            out.push_str(&format!("  {}\n", line));
        }

        if !self.output.is_empty() {
            out.push('\n');
            for line in &self.output {
                out.push_str(&format!("  | {}\n", line));
            }
        }

        if !self.suggestions.is_empty() {
            out.push_str(&format!("\n{}: consider:\n", paint(GREEN, "help")));
            for (i, suggestion) in self.suggestions.iter().enumerate() {
                out.push_str(&format!("  {}. {}\n", i + 1, suggestion));
            }
        }

        out
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.format(false))
    }
}

/// Print a diagnostic to stderr.
pub fn emit(diagnostic: &Diagnostic, color: bool) {
    eprint!("{}", diagnostic.format(color));
}
