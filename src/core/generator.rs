//! Native build-system generators.

use std::collections::BTreeMap;
use std::fmt;

/// A CMake generator together with everything needed to invoke it.
///
/// Immutable once built; the builder methods consume and return `self`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Generator {
    name: String,
    args: Vec<String>,
    env: BTreeMap<String, String>,
    toolset: Option<String>,
    architecture: Option<String>,
}

impl Generator {
    pub fn new(name: impl Into<String>) -> Self {
        Generator {
            name: name.into(),
            args: Vec::new(),
            env: BTreeMap::new(),
            toolset: None,
            architecture: None,
        }
    }

    /// Extra configure arguments always passed with this generator.
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Environment overrides applied to every native-tool call.
    pub fn with_env(mut self, env: BTreeMap<String, String>) -> Self {
        self.env = env;
        self
    }

    pub fn with_toolset(mut self, toolset: impl Into<String>) -> Self {
        self.toolset = Some(toolset.into());
        self
    }

    pub fn with_architecture(mut self, architecture: Option<String>) -> Self {
        self.architecture = architecture;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    pub fn env(&self) -> &BTreeMap<String, String> {
        &self.env
    }

    pub fn toolset(&self) -> Option<&str> {
        self.toolset.as_deref()
    }

    pub fn architecture(&self) -> Option<&str> {
        self.architecture.as_deref()
    }

    /// IDE generators are the only ones accepting `-A`.
    pub fn is_visual_studio(&self) -> bool {
        self.name.contains("Visual Studio")
    }

    /// Arguments selecting this generator on a configure command line.
    ///
    /// `-G <name>`, the generator's own extra arguments, then `-T` and `-A`
    /// when they apply.
    pub fn command_line_args(&self) -> Vec<String> {
        let mut args = vec!["-G".to_string(), self.name.clone()];
        args.extend(self.args.iter().cloned());

        if let Some(toolset) = &self.toolset {
            args.push("-T".to_string());
            args.push(toolset.clone());
        }
        if let (Some(arch), true) = (&self.architecture, self.is_visual_studio()) {
            args.push("-A".to_string());
            args.push(arch.clone());
        }

        args
    }
}

impl fmt::Display for Generator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)?;
        if let Some(toolset) = &self.toolset {
            write!(f, " {}", toolset)?;
        }
        if let Some(arch) = &self.architecture {
            write!(f, " {}", arch)?;
        }
        Ok(())
    }
}
