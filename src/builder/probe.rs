//! Generator probing.
//!
//! Candidates are tried in order by configuring a throwaway project that
//! enables the requested languages. The first generator that configures is
//! used for the real build.

use std::path::{Path, PathBuf};

use anyhow::Result;

use crate::core::errors::ShimError;
use crate::core::generator::Generator;
use crate::util::fs::{ensure_dir, remove_dir_all_if_exists, remove_file_if_exists, write_string};
use crate::util::process::{Executor, ProcessBuilder};
use crate::util::shell::{Shell, Status};

/// Scratch directory removed when dropped, unless asked to keep it.
pub struct ProbeDir {
    path: PathBuf,
    keep: bool,
}

impl ProbeDir {
    pub fn create(path: impl Into<PathBuf>, keep: bool) -> Result<Self> {
        let path = path.into();
        remove_dir_all_if_exists(&path)?;
        ensure_dir(&path)?;
        Ok(ProbeDir { path, keep })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ProbeDir {
    fn drop(&mut self) {
        if self.keep {
            return;
        }
        if let Err(e) = remove_dir_all_if_exists(&self.path) {
            tracing::warn!("failed to remove probe directory: {:#}", e);
        }
    }
}

/// Picks the first working generator.
pub struct GeneratorResolver<'a> {
    executor: &'a dyn Executor,
    shell: &'a Shell,
    cmake: &'a Path,
    probe_dir: PathBuf,
    keep_probe: bool,
    installation_help: String,
}

impl<'a> GeneratorResolver<'a> {
    pub fn new(
        executor: &'a dyn Executor,
        shell: &'a Shell,
        cmake: &'a Path,
        probe_dir: impl Into<PathBuf>,
    ) -> Self {
        GeneratorResolver {
            executor,
            shell,
            cmake,
            probe_dir: probe_dir.into(),
            keep_probe: false,
            installation_help: String::new(),
        }
    }

    /// Leave the probe directory behind for inspection.
    pub fn keep_probe(mut self, keep: bool) -> Self {
        self.keep_probe = keep;
        self
    }

    /// Guidance attached to [`ShimError::GeneratorNotFound`].
    pub fn with_installation_help(mut self, help: impl Into<String>) -> Self {
        self.installation_help = help.into();
        self
    }

    /// Return the first candidate that configures a project enabling `languages`.
    ///
    /// An explicit generator replaces the candidate list entirely.
    pub fn resolve(
        &self,
        explicit: Option<Generator>,
        languages: &[String],
        candidates: &[Generator],
    ) -> Result<Generator> {
        let candidates: Vec<Generator> = match explicit {
            Some(gen) => vec![gen],
            None => candidates.to_vec(),
        };

        let probe = ProbeDir::create(&self.probe_dir, self.keep_probe)?;
        write_string(&probe.path().join("CMakeLists.txt"), &probe_project(languages))?;

        let mut tried = Vec::new();
        for gen in &candidates {
            tried.push(gen.to_string());
            if self.try_generator(probe.path(), gen)? {
                self.shell.status(Status::Found, format!("generator `{}`", gen));
                return Ok(gen.clone());
            }
        }

        Err(ShimError::GeneratorNotFound {
            languages: languages.to_vec(),
            tried,
            installation_help: self.installation_help.clone(),
        }
        .into())
    }

    fn try_generator(&self, dir: &Path, gen: &Generator) -> Result<bool> {
        // State from a previous candidate would pin its generator.
        remove_file_if_exists(&dir.join("CMakeCache.txt"))?;
        remove_dir_all_if_exists(&dir.join("CMakeFiles"))?;

        let cmd = ProcessBuilder::new(self.cmake)
            .arg("./")
            .args(gen.command_line_args())
            .envs(gen.env())
            .cwd(dir);

        let _spinner = self.shell.spinner(Status::Probing, format!("generator `{}`", gen));
        match self.executor.exec(&cmd) {
            Ok(output) if output.success() => Ok(true),
            Ok(output) => {
                tracing::debug!("generator `{}` failed:\n{}", gen, output.combined());
                self.shell.tool_output(&output.combined());
                Ok(false)
            }
            Err(e) => {
                tracing::debug!("generator `{}` could not run: {:#}", gen, e);
                Ok(false)
            }
        }
    }
}

fn probe_project(languages: &[String]) -> String {
    let mut content = String::from(
        "cmake_minimum_required(VERSION 2.8...3.28)\nproject(compiler_test NONE)\n",
    );
    for language in languages {
        content.push_str(&format!("enable_language({})\n", language));
    }
    content
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{MockExecutor, MockProcessOutput};
    use tempfile::TempDir;

    fn languages() -> Vec<String> {
        vec!["C".to_string(), "CXX".to_string()]
    }

    #[test]
    fn test_first_working_generator_wins() {
        let tmp = TempDir::new().unwrap();
        let probe_dir = tmp.path().join("cmake_test_compile");

        let exec = MockExecutor::new();
        exec.expect_contains("-G G1", MockProcessOutput::failure(1, "no G1"));
        exec.expect_contains("-G G2", MockProcessOutput::success(""));
        exec.expect_contains("-G G3", MockProcessOutput::success(""));

        let shell = Shell::quiet();
        let cmake = PathBuf::from("cmake");
        let resolver = GeneratorResolver::new(&exec, &shell, &cmake, &probe_dir);
        let candidates = vec![Generator::new("G1"), Generator::new("G2"), Generator::new("G3")];

        let gen = resolver.resolve(None, &languages(), &candidates).unwrap();

        assert_eq!(gen.name(), "G2");
        assert_eq!(exec.calls(), vec!["cmake ./ -G G1", "cmake ./ -G G2"]);
        let recorded = exec.recorded_containing("-G G2");
        assert_eq!(recorded[0].cwd.as_deref(), Some(probe_dir.as_path()));
        assert!(!probe_dir.exists());
    }

    #[test]
    fn test_explicit_generator_skips_candidates() {
        let tmp = TempDir::new().unwrap();
        let exec = MockExecutor::new();
        exec.expect_contains("-G Ninja", MockProcessOutput::success(""));

        let shell = Shell::quiet();
        let cmake = PathBuf::from("cmake");
        let resolver = GeneratorResolver::new(&exec, &shell, &cmake, tmp.path().join("probe"));

        let gen = resolver
            .resolve(
                Some(Generator::new("Ninja")),
                &languages(),
                &[Generator::new("Unix Makefiles")],
            )
            .unwrap();

        assert_eq!(gen.name(), "Ninja");
        assert_eq!(exec.calls().len(), 1);
    }

    #[test]
    fn test_failing_explicit_generator_does_not_fall_back() {
        let tmp = TempDir::new().unwrap();
        let exec = MockExecutor::new();
        exec.expect_contains("-G Bogus", MockProcessOutput::failure(1, "unknown generator"));
        exec.expect_contains("-G Ninja", MockProcessOutput::success(""));

        let shell = Shell::quiet();
        let cmake = PathBuf::from("cmake");
        let resolver = GeneratorResolver::new(&exec, &shell, &cmake, tmp.path().join("probe"));

        let err = resolver
            .resolve(Some(Generator::new("Bogus")), &languages(), &[Generator::new("Ninja")])
            .unwrap_err();

        match err.downcast_ref::<ShimError>() {
            Some(ShimError::GeneratorNotFound { tried, .. }) => assert_eq!(tried, &["Bogus"]),
            other => panic!("unexpected error: {:?}", other),
        }
        assert_eq!(exec.calls(), vec!["cmake ./ -G Bogus"]);
    }

    #[test]
    fn test_all_candidates_fail() {
        let tmp = TempDir::new().unwrap();
        let probe_dir = tmp.path().join("probe");
        let exec = MockExecutor::new();
        exec.set_default(MockProcessOutput::failure(1, "no compiler"));

        let shell = Shell::quiet();
        let cmake = PathBuf::from("cmake");
        let resolver = GeneratorResolver::new(&exec, &shell, &cmake, &probe_dir)
            .with_installation_help("install a compiler");

        let err = resolver
            .resolve(None, &languages(), &[Generator::new("Ninja"), Generator::new("Unix Makefiles")])
            .unwrap_err();

        match err.downcast_ref::<ShimError>() {
            Some(ShimError::GeneratorNotFound {
                languages,
                tried,
                installation_help,
            }) => {
                assert_eq!(languages, &["C", "CXX"]);
                assert_eq!(tried, &["Ninja", "Unix Makefiles"]);
                assert_eq!(installation_help, "install a compiler");
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert!(!probe_dir.exists());
    }

    #[test]
    fn test_keep_probe_directory() {
        let tmp = TempDir::new().unwrap();
        let probe_dir = tmp.path().join("probe");
        let exec = MockExecutor::new();
        exec.set_default(MockProcessOutput::success(""));

        let shell = Shell::quiet();
        let cmake = PathBuf::from("cmake");
        GeneratorResolver::new(&exec, &shell, &cmake, &probe_dir)
            .keep_probe(true)
            .resolve(None, &languages(), &[Generator::new("Ninja")])
            .unwrap();

        let content = std::fs::read_to_string(probe_dir.join("CMakeLists.txt")).unwrap();
        assert!(content.contains("enable_language(C)\nenable_language(CXX)"));
    }
}
