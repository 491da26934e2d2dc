//! Platform kinds and their generator candidates.
//!
//! Each platform owns an ordered list of generators, most preferred first,
//! and a hint telling the user how to install a working toolchain when none
//! of them configures.

use crate::core::errors::ShimError;
use crate::core::generator::Generator;
use crate::util::context::GlobalContext;

/// Visual Studio releases tried on Windows, newest toolset first.
const VS_YEARS_AND_TOOLSETS: &[(&str, &str)] = &[
    ("2022", "v144"),
    ("2022", "v143"),
    ("2019", "v142"),
    ("2017", "v141"),
];

fn vs_year_to_version(year: &str) -> u32 {
    match year {
        "2017" => 15,
        "2019" => 16,
        _ => 17,
    }
}

fn vs_year_to_msc_ver(year: &str) -> &'static str {
    match year {
        "2017" => "1910",
        "2019" => "1920",
        _ => "1930",
    }
}

/// The closed set of supported platforms.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Platform {
    Linux,
    MacOs,
    Bsd,
    Cygwin,
    Msys,
    Aix,
    SunOs,
    /// Windows, with the target architecture as spelled by Visual Studio
    /// (`x64`, `Win32`, `ARM64`).
    Windows { arch: String },
}

impl Platform {
    /// Map a system name (as reported by `uname -s`, lowercased) to a platform.
    pub fn from_system_name(name: &str) -> Result<Platform, ShimError> {
        Platform::detect(name, None)
    }

    /// Like [`Platform::from_system_name`], with the extension suffix of the
    /// target (`SETUPTOOLS_EXT_SUFFIX`) selecting the Windows architecture.
    pub fn detect(name: &str, ext_suffix: Option<&str>) -> Result<Platform, ShimError> {
        let name = name.to_lowercase();
        let platform = match name.as_str() {
            "windows" => Platform::Windows {
                arch: windows_arch(ext_suffix.unwrap_or_default()),
            },
            "linux" => Platform::Linux,
            "darwin" | "macos" => Platform::MacOs,
            "freebsd" | "os400" | "openbsd" => Platform::Bsd,
            "aix" => Platform::Aix,
            "sunos" | "solaris" | "illumos" => Platform::SunOs,
            n if n.starts_with("cygwin") => Platform::Cygwin,
            n if n.starts_with("msys") => Platform::Msys,
            _ => return Err(ShimError::UnsupportedPlatform { platform: name }),
        };
        Ok(platform)
    }

    /// The platform this binary runs on.
    pub fn current(gctx: &GlobalContext) -> Result<Platform, ShimError> {
        Platform::detect(std::env::consts::OS, gctx.get_env("SETUPTOOLS_EXT_SUFFIX"))
    }

    /// Short lowercase name.
    pub fn name(&self) -> &'static str {
        match self {
            Platform::Linux => "linux",
            Platform::MacOs => "darwin",
            Platform::Bsd => "bsd",
            Platform::Cygwin => "cygwin",
            Platform::Msys => "msys",
            Platform::Aix => "aix",
            Platform::SunOs => "sunos",
            Platform::Windows { .. } => "windows",
        }
    }

    /// Candidate generators, most preferred first.
    pub fn default_generators(&self) -> Vec<Generator> {
        match self {
            Platform::Linux | Platform::MacOs | Platform::Bsd | Platform::Aix | Platform::SunOs => {
                vec![Generator::new("Unix Makefiles")]
            }
            Platform::Cygwin | Platform::Msys => {
                vec![Generator::new("Ninja"), Generator::new("Unix Makefiles")]
            }
            Platform::Windows { arch } => windows_generators(arch),
        }
    }

    /// Guidance printed when no candidate generator works.
    pub fn installation_help(&self, python_version: &str) -> String {
        match self {
            Platform::Linux => format!(
                "Building Linux wheels for Python {} requires a compiler (e.g gcc).\n\
                 It can be installed using your distribution's package manager, for example:\n\n  \
                 sudo apt-get install build-essential",
                python_version
            ),
            Platform::MacOs => format!(
                "Building macOS wheels for Python {} requires XCode.\n\
                 Get it with:\n\n  xcode-select --install",
                python_version
            ),
            Platform::Bsd => format!(
                "Building BSD wheels for Python {} requires a compiler (e.g clang) and make.\n\
                 They can be installed using the system package manager.",
                python_version
            ),
            Platform::Cygwin => format!(
                "Building Cygwin wheels for Python {} requires Cygwin packages\n\
                 ninja or make and compilers from e.g. gcc-core and gcc-g++.\n\
                 Get them here:\n\n  https://cygwin.com/packages/package_list.html",
                python_version
            ),
            Platform::Msys => format!(
                "Building MSYS wheels for Python {} requires MSYS packages\n\
                 ninja or make and compilers from e.g. gcc.",
                python_version
            ),
            Platform::Aix => format!(
                "Building AIX wheels for Python {} requires IBM XL C/C++.\n\
                 Get it here:\n\n  https://www.ibm.com/products/xl-c-aix-compiler-power",
                python_version
            ),
            Platform::SunOs => format!(
                "Building SunOS wheels for Python {} requires build toolchain.\n\
                 It can be installed using:\n\n  pkg install build-essential",
                python_version
            ),
            Platform::Windows { .. } => "Building windows wheels requires Microsoft Visual Studio.\n\
                 Get it from:\n\n  https://visualstudio.microsoft.com/vs/"
                .to_string(),
        }
    }

    /// The candidate generator called `name`, or a plain generator of that name.
    ///
    /// Used to recover the environment of a generator recorded in a cache file.
    pub fn get_generator(&self, name: &str) -> Generator {
        self.default_generators()
            .into_iter()
            .find(|gen| gen.name() == name)
            .unwrap_or_else(|| Generator::new(name))
    }

    /// Candidates to try for an optional explicit generator name.
    ///
    /// An explicit name collapses the list to that single generator.
    pub fn candidates(&self, explicit: Option<&str>, architecture: Option<&str>) -> Vec<Generator> {
        match explicit {
            Some(name) => {
                let gen = self.get_generator(name);
                let gen = match architecture {
                    Some(arch) => gen.with_architecture(Some(arch.to_string())),
                    None => gen,
                };
                vec![gen]
            }
            None => self
                .default_generators()
                .into_iter()
                .map(|gen| match architecture {
                    Some(arch) => gen.with_architecture(Some(arch.to_string())),
                    None => gen,
                })
                .collect(),
        }
    }
}

fn windows_generators(arch: &str) -> Vec<Generator> {
    let mut generators = Vec::new();
    let mut nmake = Vec::new();

    for (year, toolset) in VS_YEARS_AND_TOOLSETS {
        let force_msvc = format!("-D_SKBUILD_FORCE_MSVC={}", vs_year_to_msc_ver(year));

        generators.push(
            Generator::new("Ninja")
                .with_args([force_msvc.clone()])
                .with_architecture(Some(arch.to_string())),
        );
        generators.push(
            Generator::new(format!("Visual Studio {} {}", vs_year_to_version(year), year))
                .with_toolset(*toolset)
                .with_architecture(Some(arch.to_string())),
        );
        nmake.push(
            Generator::new("NMake Makefiles")
                .with_args([force_msvc])
                .with_architecture(Some(arch.to_string())),
        );
    }

    generators.extend(nmake);
    generators
}

/// Visual Studio spelling of the target architecture.
fn windows_arch(ext_suffix: &str) -> String {
    if std::env::consts::ARCH == "aarch64" || ext_suffix.to_lowercase().contains("arm64") {
        "ARM64".to_string()
    } else if cfg!(target_pointer_width = "64") {
        "x64".to_string()
    } else {
        "Win32".to_string()
    }
}
