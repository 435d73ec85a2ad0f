//! macOS conventions.

use camino::Utf8PathBuf;
use itertools::Itertools;

use super::{Platform, PlatformFamily};

/// macOS toolchain conventions.
#[derive(Debug, Clone, Copy, Default)]
pub struct Darwin;

impl Platform for Darwin {
    fn family(&self) -> PlatformFamily {
        PlatformFamily::Darwin
    }

    fn rule_directory(&self) -> &'static str {
        "osx"
    }

    fn shared_library_suffix(&self) -> &'static str {
        ".dylib"
    }

    // The Darwin linker records install names instead, so `-L` suffices.
    fn library_directive(&self, paths: &[Utf8PathBuf]) -> String {
        paths.iter().map(|p| format!("-L {p}")).join(" ")
    }

    fn soname_directive(&self, soname: &str) -> String {
        format!("-install_name @rpath/{soname}")
    }
}
