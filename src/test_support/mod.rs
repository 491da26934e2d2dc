//! Test utilities and mocks for Shipwright unit tests.
//!
//! [`MockExecutor`] stands in for CMake and the interpreter behind the
//! [`Executor`] seam. It answers commands from scripted expectations and
//! records every invocation together with its working directory and
//! environment overrides, so tests can assert how often and where a tool ran.
//!
//! # Example
//!
//! ```rust,ignore
//! use shipwright::test_support::{MockExecutor, MockProcessOutput};
//!
//! let exec = MockExecutor::new();
//! exec.expect("cmake --version", MockProcessOutput::success("cmake version 3.28.1"));
//! exec.expect_contains("-G Ninja", MockProcessOutput::failure(1, "no ninja"));
//! ```

pub mod fixtures;

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard};

use anyhow::{bail, Result};

use crate::util::process::{Executor, ProcessBuilder, ProcessOutput};

pub use fixtures::*;

/// Scripted result of a command.
#[derive(Debug, Clone, Default)]
pub struct MockProcessOutput {
    pub status: i32,
    pub stdout: String,
    pub stderr: String,
    /// The command could not be started at all.
    pub spawn_error: Option<String>,
}

impl MockProcessOutput {
    pub fn success(stdout: impl Into<String>) -> Self {
        MockProcessOutput {
            stdout: stdout.into(),
            ..Default::default()
        }
    }

    pub fn failure(status: i32, stderr: impl Into<String>) -> Self {
        MockProcessOutput {
            status,
            stderr: stderr.into(),
            ..Default::default()
        }
    }

    pub fn with_output(status: i32, stdout: impl Into<String>, stderr: impl Into<String>) -> Self {
        MockProcessOutput {
            status,
            stdout: stdout.into(),
            stderr: stderr.into(),
            spawn_error: None,
        }
    }

    /// The program does not exist.
    pub fn not_found() -> Self {
        MockProcessOutput {
            spawn_error: Some("No such file or directory (os error 2)".to_string()),
            ..Default::default()
        }
    }

    fn reply(&self, command: &str) -> Result<ProcessOutput> {
        if let Some(err) = &self.spawn_error {
            bail!("failed to spawn `{}`: {}", command, err);
        }
        Ok(ProcessOutput {
            code: Some(self.status),
            stdout: self.stdout.clone().into_bytes(),
            stderr: self.stderr.clone().into_bytes(),
        })
    }
}

/// How an expectation selects commands.
///
/// Commands are the program followed by its arguments, joined with single
/// spaces and without quoting.
#[derive(Debug, Clone)]
pub enum CommandPattern {
    Exact(String),
    Prefix(String),
    Contains(String),
}

impl CommandPattern {
    pub fn matches(&self, command: &str) -> bool {
        match self {
            CommandPattern::Exact(s) => command == s,
            CommandPattern::Prefix(s) => command.starts_with(s.as_str()),
            CommandPattern::Contains(s) => command.contains(s.as_str()),
        }
    }
}

/// A pattern, its scripted output and an optional use limit.
#[derive(Debug, Clone)]
pub struct CommandExpectation {
    pub pattern: CommandPattern,
    pub output: MockProcessOutput,
    pub limit: Option<usize>,
    pub used: usize,
}

impl CommandExpectation {
    pub fn new(pattern: CommandPattern, output: MockProcessOutput) -> Self {
        CommandExpectation {
            pattern,
            output,
            limit: None,
            used: 0,
        }
    }

    /// Answer at most `n` commands.
    pub fn times(mut self, n: usize) -> Self {
        self.limit = Some(n);
        self
    }

    fn available(&self) -> bool {
        self.limit.map_or(true, |limit| self.used < limit)
    }
}

/// One command seen by the mock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedCall {
    pub command: String,
    pub cwd: Option<PathBuf>,
    pub env: BTreeMap<String, String>,
}

#[derive(Debug, Default)]
struct MockState {
    expectations: Vec<CommandExpectation>,
    calls: Vec<RecordedCall>,
    default_output: Option<MockProcessOutput>,
}

/// Mock process executor.
///
/// Expectations are tried in insertion order; the first available match
/// answers. Commands matching nothing fail unless a default is set.
#[derive(Debug, Default)]
pub struct MockExecutor {
    state: Mutex<MockState>,
}

impl MockExecutor {
    pub fn new() -> Self {
        MockExecutor::default()
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn expect(&self, command: &str, output: MockProcessOutput) -> &Self {
        self.expect_pattern(CommandExpectation::new(
            CommandPattern::Exact(command.to_string()),
            output,
        ))
    }

    pub fn expect_prefix(&self, prefix: &str, output: MockProcessOutput) -> &Self {
        self.expect_pattern(CommandExpectation::new(
            CommandPattern::Prefix(prefix.to_string()),
            output,
        ))
    }

    pub fn expect_contains(&self, substring: &str, output: MockProcessOutput) -> &Self {
        self.expect_pattern(CommandExpectation::new(
            CommandPattern::Contains(substring.to_string()),
            output,
        ))
    }

    pub fn expect_pattern(&self, expectation: CommandExpectation) -> &Self {
        self.state().expectations.push(expectation);
        self
    }

    /// Answer for commands no expectation matches.
    pub fn set_default(&self, output: MockProcessOutput) -> &Self {
        self.state().default_output = Some(output);
        self
    }

    /// Every command run so far, in order.
    pub fn calls(&self) -> Vec<String> {
        self.state().calls.iter().map(|call| call.command.clone()).collect()
    }

    pub fn calls_containing(&self, substring: &str) -> Vec<String> {
        self.recorded_containing(substring)
            .into_iter()
            .map(|call| call.command)
            .collect()
    }

    /// Full records of the commands containing `substring`.
    pub fn recorded_containing(&self, substring: &str) -> Vec<RecordedCall> {
        self.state()
            .calls
            .iter()
            .filter(|call| call.command.contains(substring))
            .cloned()
            .collect()
    }

    pub fn clear_calls(&self) {
        self.state().calls.clear();
    }

    /// Fail unless every limited expectation was used exactly its limit.
    pub fn verify(&self) -> Result<()> {
        for (i, exp) in self.state().expectations.iter().enumerate() {
            if let Some(limit) = exp.limit {
                if exp.used != limit {
                    bail!("expectation {} ({:?}) answered {} of {} commands", i, exp.pattern, exp.used, limit);
                }
            }
        }
        Ok(())
    }
}

impl Executor for MockExecutor {
    fn exec(&self, cmd: &ProcessBuilder) -> Result<ProcessOutput> {
        let command = std::iter::once(cmd.get_program().display().to_string())
            .chain(cmd.get_args().iter().cloned())
            .collect::<Vec<_>>()
            .join(" ");

        let mut guard = self.state();
        let state = &mut *guard;
        state.calls.push(RecordedCall {
            command: command.clone(),
            cwd: cmd.get_cwd().map(PathBuf::from),
            env: cmd.get_env().clone(),
        });

        let output = match state
            .expectations
            .iter_mut()
            .find(|exp| exp.available() && exp.pattern.matches(&command))
        {
            Some(exp) => {
                exp.used += 1;
                exp.output.clone()
            }
            None => match &state.default_output {
                Some(default) => default.clone(),
                None => bail!("unexpected command: {}", command),
            },
        };
        output.reply(&command)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_executor() {
        let exec = MockExecutor::new();
        exec.expect("cmake --version", MockProcessOutput::success("cmake version 3.28.1"));

        let output = exec
            .exec(&ProcessBuilder::new("cmake").arg("--version"))
            .unwrap();
        assert!(output.success());
        assert_eq!(output.stdout_lossy(), "cmake version 3.28.1");
        assert_eq!(exec.calls(), vec!["cmake --version"]);

        assert!(exec.exec(&ProcessBuilder::new("ninja")).is_err());
    }

    #[test]
    fn test_expectation_limit() {
        let exec = MockExecutor::new();
        exec.expect_pattern(
            CommandExpectation::new(
                CommandPattern::Prefix("cmake".into()),
                MockProcessOutput::failure(1, "first"),
            )
            .times(1),
        );
        exec.expect_prefix("cmake", MockProcessOutput::success("second"));

        let pb = ProcessBuilder::new("cmake").arg(".");
        assert!(!exec.exec(&pb).unwrap().success());
        assert!(exec.exec(&pb).unwrap().success());
        assert!(exec.verify().is_ok());
    }

    #[test]
    fn test_records_cwd_and_env() {
        let exec = MockExecutor::new();
        exec.set_default(MockProcessOutput::with_output(0, "out", "err"));

        let pb = ProcessBuilder::new("cmake")
            .arg("--build")
            .cwd("/tmp/build")
            .env("MAKEFLAGS", "-j2");
        let output = exec.exec(&pb).unwrap();
        assert_eq!(output.combined(), "out\nerr");

        let calls = exec.recorded_containing("--build");
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].cwd, Some(PathBuf::from("/tmp/build")));
        assert_eq!(calls[0].env.get("MAKEFLAGS").map(String::as_str), Some("-j2"));
    }

    #[test]
    fn test_spawn_failure() {
        let exec = MockExecutor::new();
        exec.expect_prefix("ninja", MockProcessOutput::not_found());

        let err = exec.exec(&ProcessBuilder::new("ninja").arg("--version")).unwrap_err();
        assert!(err.to_string().contains("failed to spawn `ninja --version`"));
        assert_eq!(exec.calls().len(), 1);
    }
}
