//! Artifact identity and platform naming.
//!
//! A [`Target`] couples the logical name a description author wrote (for
//! example `bin/casual-common`) with the absolute, platform-formatted file the
//! executor will produce. Naming is a pure function of platform, kind, name
//! and version, so resolving the same declaration twice always yields the
//! same path.

use std::fmt;
use std::str::FromStr;

use camino::{Utf8Component, Utf8Path, Utf8PathBuf};

use crate::directive::absolutize;
use crate::error::{EngineError, EngineResult};
use crate::platform::Platform;

/// Directory object files are written to, mirroring the source layout.
pub const OBJECT_DIRECTORY: &str = "obj";
/// Suffix of object files.
pub const OBJECT_SUFFIX: &str = "o";
/// Suffix of compiler-generated dependency files.
pub const DEPENDENCY_SUFFIX: &str = "d";

/// Kinds of artifacts a declaration can produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TargetKind {
    /// A compiled translation unit.
    Object,
    /// A linked executable.
    Executable,
    /// A shared library, optionally versioned.
    SharedLibrary,
    /// A static archive.
    Archive,
    /// An executable linked by the service-aware server linker.
    Server,
    /// An executable linked against the unit-test framework.
    Unittest,
    /// An aggregate with no file of its own.
    Phony,
}

impl TargetKind {
    /// Whether the kind is produced by a link step.
    #[must_use]
    pub const fn is_linked(self) -> bool {
        !matches!(self, Self::Object | Self::Phony)
    }
}

impl fmt::Display for TargetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Object => "object",
            Self::Executable => "executable",
            Self::SharedLibrary => "shared library",
            Self::Archive => "archive",
            Self::Server => "server",
            Self::Unittest => "unit test",
            Self::Phony => "phony",
        })
    }
}

/// Shared-library version used to derive the SONAME chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Version {
    /// Interface version, recorded as the SONAME.
    pub major: u32,
    /// Compatible revision.
    pub minor: u32,
}

impl Version {
    /// Create a version from its parts.
    #[must_use]
    pub const fn new(major: u32, minor: u32) -> Self {
        Self { major, minor }
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

impl FromStr for Version {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || EngineError::InvalidVersion {
            version: s.to_owned(),
        };
        let (major_text, minor_text) = s.trim().split_once('.').ok_or_else(invalid)?;
        Ok(Self {
            major: major_text.parse().map_err(|_| invalid())?,
            minor: minor_text.parse().map_err(|_| invalid())?,
        })
    }
}

/// A symbolic link created as a build step.
///
/// The link is always removed before it is recreated so regenerating it is
/// idempotent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Symlink {
    /// Path of the link itself.
    pub link: Utf8PathBuf,
    /// File the link points at, in the same directory.
    pub target: Utf8PathBuf,
}

impl Symlink {
    /// Link contents: the target's file name, so links survive relocation.
    #[must_use]
    pub fn relative_target(&self) -> &str {
        self.target.file_name().unwrap_or(self.target.as_str())
    }
}

/// The progressively more specific names of a versioned shared library.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SonameChain {
    /// Name used by the linker, for example `libfoo.so`.
    pub linker_name: Utf8PathBuf,
    /// Name recorded in the library, for example `libfoo.so.2`.
    pub soname: Utf8PathBuf,
    /// The file the link step writes, for example `libfoo.so.2.3`.
    pub real_name: Utf8PathBuf,
}

impl SonameChain {
    /// Chain for an unversioned linker name and a version.
    #[must_use]
    pub fn new(linker_name: Utf8PathBuf, version: Version) -> Self {
        let soname = Utf8PathBuf::from(format!("{linker_name}.{}", version.major));
        let real_name = Utf8PathBuf::from(format!("{linker_name}.{version}"));
        Self {
            linker_name,
            soname,
            real_name,
        }
    }

    /// The links to create, most specific first: SONAME to real file, then
    /// linker name to SONAME.
    #[must_use]
    pub fn links(&self) -> [Symlink; 2] {
        [
            Symlink {
                link: self.soname.clone(),
                target: self.real_name.clone(),
            },
            Symlink {
                link: self.linker_name.clone(),
                target: self.soname.clone(),
            },
        ]
    }

    /// The same chain placed in another directory.
    #[must_use]
    pub fn relocate(&self, directory: &Utf8Path) -> Self {
        let place = |p: &Utf8Path| directory.join(p.file_name().unwrap_or(p.as_str()));
        Self {
            linker_name: place(&self.linker_name),
            soname: place(&self.soname),
            real_name: place(&self.real_name),
        }
    }
}

/// An artifact declared within a scope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    name: String,
    kind: TargetKind,
    path: Utf8PathBuf,
    version: Option<Version>,
}

impl Target {
    /// Construct a target from already resolved parts.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        kind: TargetKind,
        path: Utf8PathBuf,
        version: Option<Version>,
    ) -> Self {
        Self {
            name: name.into(),
            kind,
            path,
            version,
        }
    }

    /// Logical name as declared.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Short alias: the last component of the logical name.
    #[must_use]
    pub fn alias(&self) -> &str {
        self.name.rsplit('/').next().unwrap_or(&self.name)
    }

    /// Artifact kind.
    #[must_use]
    pub const fn kind(&self) -> TargetKind {
        self.kind
    }

    /// Absolute path of the file the producing step writes.
    #[must_use]
    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    /// Version of a shared library, if any.
    #[must_use]
    pub const fn version(&self) -> Option<Version> {
        self.version
    }

    /// SONAME chain for versioned shared libraries.
    #[must_use]
    pub fn soname_chain(&self) -> Option<SonameChain> {
        let version = self.version?;
        let linker_name = self.path.as_str().strip_suffix(&format!(".{version}"))?;
        Some(SonameChain::new(Utf8PathBuf::from(linker_name), version))
    }

    /// Path other declarations should depend on: the linker name for
    /// versioned libraries, otherwise the artifact itself.
    #[must_use]
    pub fn link_path(&self) -> Utf8PathBuf {
        self.soname_chain()
            .map_or_else(|| self.path.clone(), |chain| chain.linker_name)
    }
}

/// File name of a library for `kind`, without any version suffix.
///
/// # Errors
///
/// Returns [`EngineError::UnsupportedNaming`] for kinds that are neither
/// shared libraries nor archives.
pub fn library_file_name(
    platform: &dyn Platform,
    kind: TargetKind,
    name: &str,
) -> EngineResult<String> {
    match kind {
        TargetKind::SharedLibrary => Ok(format!("lib{name}{}", platform.shared_library_suffix())),
        TargetKind::Archive => Ok(format!("lib{name}{}", platform.archive_suffix())),
        other => Err(EngineError::UnsupportedNaming {
            kind: other,
            naming: "library",
        }),
    }
}

/// File name of the artifact written for `kind`.
///
/// # Errors
///
/// Returns [`EngineError::UnsupportedNaming`] for objects and phony targets,
/// which are not named from a logical name.
pub fn artifact_file_name(
    platform: &dyn Platform,
    kind: TargetKind,
    name: &str,
    version: Option<Version>,
) -> EngineResult<String> {
    match kind {
        TargetKind::SharedLibrary => {
            let base = library_file_name(platform, kind, name)?;
            Ok(version.map_or_else(|| base.clone(), |v| format!("{base}.{v}")))
        }
        TargetKind::Archive => library_file_name(platform, kind, name),
        TargetKind::Executable | TargetKind::Server | TargetKind::Unittest => {
            Ok(format!("{name}{}", platform.executable_suffix()))
        }
        TargetKind::Object | TargetKind::Phony => Err(EngineError::UnsupportedNaming {
            kind,
            naming: "artifact",
        }),
    }
}

/// Resolve a linked target declared as `name` from the directory `base`.
///
/// The directory part of `name` is kept; the last component is formatted
/// according to `kind`.
///
/// # Errors
///
/// Returns [`EngineError::InvalidTargetName`] for empty names and
/// [`EngineError::UnsupportedNaming`] for kinds that are not linked.
pub fn resolve_linked(
    platform: &dyn Platform,
    base: &Utf8Path,
    kind: TargetKind,
    name: &str,
    version: Option<Version>,
) -> EngineResult<Target> {
    let logical = Utf8Path::new(name);
    let basename = logical
        .file_name()
        .filter(|_| !name.ends_with('/'))
        .ok_or_else(|| EngineError::InvalidTargetName {
            name: name.to_owned(),
        })?;
    let directory = absolutize(base, logical.parent().unwrap_or_else(|| Utf8Path::new("")));
    let file = artifact_file_name(platform, kind, basename, version)?;
    Ok(Target::new(name, kind, directory.join(file), version))
}

/// Default object file for `source`: `obj/<source without extension>.o`.
///
/// Absolute sources are mirrored below `obj/` as well, with their root
/// dropped, so objects never land outside the object directory.
#[must_use]
pub fn default_object_name(source: &str) -> Utf8PathBuf {
    let mirrored: Utf8PathBuf = Utf8Path::new(source)
        .components()
        .filter(|component| {
            matches!(
                component,
                Utf8Component::Normal(_) | Utf8Component::ParentDir
            )
        })
        .collect();
    Utf8Path::new(OBJECT_DIRECTORY).join(mirrored.with_extension(OBJECT_SUFFIX))
}

/// Dependency file the compiler writes next to `object`.
#[must_use]
pub fn dependency_file(object: &Utf8Path) -> Utf8PathBuf {
    object.with_extension(DEPENDENCY_SUFFIX)
}
