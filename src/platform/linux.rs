//! GNU/Linux conventions.

use camino::Utf8PathBuf;
use itertools::Itertools;

use super::{Platform, PlatformFamily};

/// Linker option that lets the link step find indirect shared-library
/// dependencies in the same directories as `-L`.
const RPATH_LINK_OPTION: &str = "-Wl,-rpath-link=";

/// GNU/Linux toolchain conventions.
#[derive(Debug, Clone, Copy, Default)]
pub struct Linux;

impl Platform for Linux {
    fn family(&self) -> PlatformFamily {
        PlatformFamily::Linux
    }

    fn rule_directory(&self) -> &'static str {
        "linux"
    }

    fn shared_library_suffix(&self) -> &'static str {
        ".so"
    }

    fn library_directive(&self, paths: &[Utf8PathBuf]) -> String {
        paths
            .iter()
            .map(|p| format!("-L {p} {RPATH_LINK_OPTION}{p}"))
            .join(" ")
    }

    fn soname_directive(&self, soname: &str) -> String {
        format!("-Wl,-soname,{soname}")
    }
}
