//! Centralized shell output.
//!
//! The Shell carries everything that decides what reaches the terminal:
//! verbosity, colors, and whether file listings (`copying a -> b`) are shown.
//! It is passed explicitly to the code that prints, never stored globally.

use std::fmt::Display;
use std::io::{self, IsTerminal};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use indicatif::{ProgressBar, ProgressStyle};

/// Output verbosity level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Verbosity {
    /// --quiet: errors only, no spinners
    Quiet,
    /// Default: status messages + spinners
    #[default]
    Normal,
    /// --verbose: native tool output is echoed, no spinners
    Verbose,
}

/// Status types for output messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    // Success statuses (green)
    Finished,
    Removed,
    Found,

    // In-progress statuses (cyan)
    Probing,
    Configuring,
    Building,
    Installing,

    // Info statuses (blue)
    Info,

    // Warning statuses (yellow)
    Skipped,
    Warning,

    // Error status (red)
    Error,
}

impl Status {
    /// Get the display text for this status.
    fn as_str(&self) -> &'static str {
        match self {
            Status::Finished => "Finished",
            Status::Removed => "Removed",
            Status::Found => "Found",
            Status::Probing => "Probing",
            Status::Configuring => "Configuring",
            Status::Building => "Building",
            Status::Installing => "Installing",
            Status::Info => "Info",
            Status::Skipped => "Skipped",
            Status::Warning => "Warning",
            Status::Error => "error",
        }
    }

    /// Get the ANSI color code for this status.
    fn color_code(&self) -> &'static str {
        match self {
            Status::Finished | Status::Removed | Status::Found => "\x1b[1;32m",
            Status::Probing | Status::Configuring | Status::Building | Status::Installing => {
                "\x1b[1;36m"
            }
            Status::Info => "\x1b[1;34m",
            Status::Skipped | Status::Warning => "\x1b[1;33m",
            Status::Error => "\x1b[1;31m",
        }
    }
}

const STATUS_WIDTH: usize = 12;

/// Central shell for all CLI output.
#[derive(Debug)]
pub struct Shell {
    verbosity: Verbosity,
    use_color: bool,
    hide_listing: AtomicBool,
}

impl Shell {
    /// Create a new shell with the given verbosity.
    pub fn new(verbosity: Verbosity) -> Self {
        Shell {
            verbosity,
            use_color: io::stderr().is_terminal(),
            hide_listing: AtomicBool::new(false),
        }
    }

    /// Create a shell from CLI flags. Quiet wins over verbose.
    pub fn from_flags(quiet: bool, verbose: bool, hide_listing: bool) -> Self {
        let verbosity = if quiet {
            Verbosity::Quiet
        } else if verbose {
            Verbosity::Verbose
        } else {
            Verbosity::Normal
        };

        let shell = Shell::new(verbosity);
        shell.hide_listing.store(hide_listing, Ordering::SeqCst);
        shell
    }

    /// A shell that prints nothing but errors, for tests and embedding.
    pub fn quiet() -> Self {
        Shell::new(Verbosity::Quiet)
    }

    pub fn is_quiet(&self) -> bool {
        self.verbosity == Verbosity::Quiet
    }

    pub fn is_verbose(&self) -> bool {
        self.verbosity == Verbosity::Verbose
    }

    pub fn use_color(&self) -> bool {
        self.use_color
    }

    /// Whether file listings are currently printed.
    pub fn listing_visible(&self) -> bool {
        !self.is_quiet() && !self.hide_listing.load(Ordering::SeqCst)
    }

    /// Hide file listings until the returned guard is dropped.
    ///
    /// The previous setting is restored on drop, including during unwinding.
    pub fn suppress_listing(&self) -> ListingGuard<'_> {
        let previous = self.hide_listing.swap(true, Ordering::SeqCst);
        ListingGuard {
            shell: self,
            previous,
        }
    }

    /// Print a status message.
    ///
    /// Format: `{status:>12} {message}`. In quiet mode only errors are printed.
    pub fn status(&self, status: Status, msg: impl Display) {
        if self.is_quiet() && status != Status::Error {
            return;
        }

        eprintln!("{} {}", self.format_status(status), msg);
    }

    /// Print a warning message.
    pub fn warn(&self, msg: impl Display) {
        self.status(Status::Warning, msg);
    }

    /// Print a file-listing line such as `copying a -> b`.
    pub fn listing(&self, msg: impl Display) {
        if self.listing_visible() {
            eprintln!("{}", msg);
        }
    }

    /// Echo captured output of a native tool in verbose mode.
    pub fn tool_output(&self, text: &str) {
        if self.is_verbose() && !text.is_empty() {
            eprint!("{}", text);
            if !text.ends_with('\n') {
                eprintln!();
            }
        }
    }

    /// Show a spinner while a long-running step executes.
    ///
    /// Only drawn in normal mode on a terminal; the spinner clears itself when
    /// the returned value is dropped.
    pub fn spinner(&self, status: Status, msg: impl Display) -> Spinner {
        let message = format!("{} {}", self.format_status(status), msg);
        let pb = if self.verbosity == Verbosity::Normal && self.use_color {
            let pb = ProgressBar::new_spinner();
            if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.green} {msg}") {
                pb.set_style(style);
            }
            pb.set_message(message);
            pb.enable_steady_tick(Duration::from_millis(100));
            Some(pb)
        } else {
            self.status(status, msg);
            None
        };

        Spinner {
            pb,
            start: Instant::now(),
        }
    }

    /// Format a status prefix with optional color.
    fn format_status(&self, status: Status) -> String {
        let text = status.as_str();

        if self.use_color {
            format!("{}{:>width$}\x1b[0m", status.color_code(), text, width = STATUS_WIDTH)
        } else {
            format!("{:>width$}", text, width = STATUS_WIDTH)
        }
    }
}

impl Default for Shell {
    fn default() -> Self {
        Shell::new(Verbosity::default())
    }
}

/// Restores listing visibility when dropped.
pub struct ListingGuard<'a> {
    shell: &'a Shell,
    previous: bool,
}

impl Drop for ListingGuard<'_> {
    fn drop(&mut self) {
        self.shell.hide_listing.store(self.previous, Ordering::SeqCst);
    }
}

/// Spinner handle returned by [`Shell::spinner`].
pub struct Spinner {
    pb: Option<ProgressBar>,
    start: Instant,
}

impl Spinner {
    /// Time since the spinner started.
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}

impl Drop for Spinner {
    fn drop(&mut self) {
        if let Some(pb) = self.pb.take() {
            pb.finish_and_clear();
        }
    }
}

/// Format a duration in a human-readable way.
pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs_f64();
    if secs < 60.0 {
        format!("{:.2}s", secs)
    } else {
        format!("{:.1}m", secs / 60.0)
    }
}
