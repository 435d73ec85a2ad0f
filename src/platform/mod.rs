//! Platform families and their naming, flag, and shell conventions.
//!
//! Declarations never format flags or file names themselves. They ask the
//! [`Platform`] selected at startup, so the Linux and Darwin variants differ
//! only where their toolchains do.

use std::fmt;
use std::str::FromStr;

use camino::{Utf8Path, Utf8PathBuf};
use itertools::Itertools;

use crate::error::EngineError;

mod darwin;
mod linux;

pub use darwin::Darwin;
pub use linux::Linux;

/// Supported platform families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PlatformFamily {
    /// GNU/Linux toolchains.
    Linux,
    /// macOS toolchains.
    Darwin,
}

impl PlatformFamily {
    /// Family of the host the engine was compiled for.
    #[must_use]
    pub const fn host() -> Self {
        if cfg!(target_os = "macos") {
            Self::Darwin
        } else {
            Self::Linux
        }
    }

    /// Lower-case name used in rule-file paths and on the command line.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Linux => "linux",
            Self::Darwin => "darwin",
        }
    }

    /// Construct the [`Platform`] implementation for this family.
    #[must_use]
    pub fn platform(self) -> Box<dyn Platform> {
        match self {
            Self::Linux => Box::new(Linux),
            Self::Darwin => Box::new(Darwin),
        }
    }
}

impl fmt::Display for PlatformFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PlatformFamily {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "linux" => Ok(Self::Linux),
            "darwin" | "osx" | "macos" => Ok(Self::Darwin),
            _ => Err(EngineError::UnsupportedPlatform { name: s.to_owned() }),
        }
    }
}

/// Naming, directive, and shell-command conventions of one platform family.
pub trait Platform: fmt::Debug {
    /// Family this implementation belongs to.
    fn family(&self) -> PlatformFamily;

    /// Name of the directory holding this platform's shared rule files.
    fn rule_directory(&self) -> &'static str;

    /// Suffix of shared libraries, including the leading dot.
    fn shared_library_suffix(&self) -> &'static str;

    /// Suffix of executables. Empty on every supported family.
    fn executable_suffix(&self) -> &'static str {
        ""
    }

    /// Suffix of static archives, including the leading dot.
    fn archive_suffix(&self) -> &'static str {
        ".a"
    }

    /// Format an include directive for already resolved, unique paths.
    fn include_directive(&self, paths: &[Utf8PathBuf]) -> String {
        paths.iter().map(|p| format!("-I {p}")).join(" ")
    }

    /// Format a library search directive for already resolved, unique paths.
    fn library_directive(&self, paths: &[Utf8PathBuf]) -> String;

    /// Linker flags recording `soname` inside a versioned shared library.
    fn soname_directive(&self, soname: &str) -> String;

    /// Shell command removing `path` without failing when it is absent.
    fn remove(&self, path: &str) -> String {
        format!("rm -f {path}")
    }

    /// Shell command creating a symbolic link `link` pointing at `target`.
    fn symlink(&self, target: &str, link: &str) -> String {
        format!("ln -s {target} {link}")
    }

    /// Shell command creating `path` and any missing parents.
    fn make_directory(&self, path: &str) -> String {
        format!("mkdir -p {path}")
    }

    /// Shell command copying `file` into the directory `destination`.
    fn install(&self, file: &str, destination: &str) -> String {
        format!("cp -p {file} {destination}")
    }

    /// Shell command changing the working directory.
    fn change_directory(&self, path: &str) -> String {
        format!("cd {path}")
    }

    /// Platform-specific Ninja definitions shipped under the build home.
    fn ninja_platform_file(&self, build_home: &Utf8Path) -> Utf8PathBuf {
        build_home
            .join("make")
            .join("ninja")
            .join(format!("{}.ninja", self.rule_directory()))
    }

    /// Makefiles every generated rule-backend descriptor includes.
    fn make_includes(&self, build_home: &Utf8Path) -> Vec<Utf8PathBuf> {
        let root = build_home.join("make").join("platform");
        vec![
            root.join("common.mk"),
            root.join(self.rule_directory()).join("static.mk"),
        ]
    }
}
