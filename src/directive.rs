//! Path and directive resolution.
//!
//! Build descriptions are written as if local to their own directory. Every
//! relative path is therefore resolved against the declaring description's
//! directory, never the process working directory. Resolution is lexical:
//! the referenced files usually do not exist yet when descriptors are
//! generated.

use camino::{Utf8Component, Utf8Path, Utf8PathBuf};
use indexmap::IndexSet;

use crate::platform::Platform;

/// Default include search path, relative to each description.
pub const DEFAULT_INCLUDE_PATH: &str = "include";
/// Default library search path, relative to each description.
pub const DEFAULT_LIBRARY_PATH: &str = "bin";

/// Resolve `path` against `base`, normalising `.` and `..` components.
///
/// Absolute paths pass through (normalised). `base` is expected to be
/// absolute.
///
/// # Examples
///
/// ```
/// use camino::{Utf8Path, Utf8PathBuf};
/// use cmk::directive::absolutize;
///
/// let base = Utf8Path::new("/src/broker");
/// assert_eq!(absolutize(base, "../common/include"), Utf8PathBuf::from("/src/common/include"));
/// assert_eq!(absolutize(base, "/usr/include"), Utf8PathBuf::from("/usr/include"));
/// ```
#[must_use]
pub fn absolutize(base: &Utf8Path, path: impl AsRef<Utf8Path>) -> Utf8PathBuf {
    let relative = path.as_ref();
    if relative.is_absolute() {
        normalize(relative)
    } else {
        normalize(&base.join(relative))
    }
}

/// Lexically normalise `path`. `..` never climbs above the root.
#[must_use]
pub fn normalize(path: &Utf8Path) -> Utf8PathBuf {
    let mut out = Utf8PathBuf::new();
    for component in path.components() {
        match component {
            Utf8Component::Prefix(prefix) => out.push(prefix.as_str()),
            Utf8Component::RootDir => out.push("/"),
            Utf8Component::CurDir => {}
            Utf8Component::ParentDir => match out.components().next_back() {
                Some(Utf8Component::Normal(_)) => {
                    out.pop();
                }
                Some(Utf8Component::RootDir | Utf8Component::Prefix(_)) => {}
                _ => out.push(".."),
            },
            Utf8Component::Normal(part) => out.push(part),
        }
    }
    out
}

/// Ordered, duplicate-free list of declared search paths.
///
/// Entries keep the form they were declared in; they are resolved only when
/// a directive is formatted, against the directory of the declaration that
/// uses them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchPaths {
    entries: IndexSet<Utf8PathBuf>,
}

impl SearchPaths {
    /// Search paths seeded with a single default entry.
    #[must_use]
    pub fn with_default(entry: &str) -> Self {
        let mut paths = Self::default();
        paths.push(entry);
        paths
    }

    /// Append one entry unless it is already present.
    pub fn push(&mut self, entry: impl Into<Utf8PathBuf>) {
        self.entries.insert(entry.into());
    }

    /// Append entries in order, skipping duplicates.
    pub fn extend<I, P>(&mut self, entries: I)
    where
        I: IntoIterator<Item = P>,
        P: Into<Utf8PathBuf>,
    {
        for entry in entries {
            self.push(entry);
        }
    }

    /// Declared entries in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = &Utf8Path> {
        self.entries.iter().map(Utf8PathBuf::as_path)
    }

    /// Resolve every entry against `base`, removing paths that collapse to
    /// the same location.
    #[must_use]
    pub fn resolve(&self, base: &Utf8Path) -> Vec<Utf8PathBuf> {
        self.entries
            .iter()
            .map(|entry| absolutize(base, entry))
            .collect::<IndexSet<_>>()
            .into_iter()
            .collect()
    }

    /// `-I` directive for these paths as seen from `base`.
    #[must_use]
    pub fn include_directive(&self, base: &Utf8Path, platform: &dyn Platform) -> String {
        platform.include_directive(&self.resolve(base))
    }

    /// `-L` directive (plus any platform runtime-path flags) from `base`.
    #[must_use]
    pub fn library_directive(&self, base: &Utf8Path, platform: &dyn Platform) -> String {
        platform.library_directive(&self.resolve(base))
    }
}
