//! Destinations for rendered descriptors.
//!
//! The engine stages every finalized scope's descriptor and hands the whole
//! set to a [`DescriptorSink`] once the primary scope closes, so a failed
//! evaluation never leaves a partial tree of descriptors behind.

use std::io::{self, Write};

use camino::{Utf8Path, Utf8PathBuf};
use cap_std::{ambient_authority, fs as cap_fs};
use indexmap::IndexMap;
use tracing::info;

use crate::error::{EngineError, EngineResult};

/// Receives descriptors in commit order, children before parents.
pub trait DescriptorSink {
    /// Persist `content` as the descriptor at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Write`] when the descriptor cannot be stored.
    fn write(&mut self, path: &Utf8Path, content: &str) -> EngineResult<()>;
}

/// Writes descriptors to the filesystem, creating parent directories.
#[derive(Debug, Default, Clone, Copy)]
pub struct FileSink;

impl DescriptorSink for FileSink {
    fn write(&mut self, path: &Utf8Path, content: &str) -> EngineResult<()> {
        let to_error = |source| EngineError::Write {
            path: path.to_path_buf(),
            source,
        };
        let (dir, relative) = open_nearest_ancestor(path).map_err(to_error)?;
        write_descriptor(&dir, &relative, content).map_err(to_error)?;
        info!("Generated descriptor at {path}");
        Ok(())
    }
}

/// Write `content` to `path` below `dir`, creating missing parents.
fn write_descriptor(dir: &cap_fs::Dir, path: &Utf8Path, content: &str) -> io::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_str().is_empty()) {
        dir.create_dir_all(parent.as_str())?;
    }
    let mut file = dir.create(path.as_str())?;
    file.write_all(content.as_bytes())?;
    file.flush()?;
    file.sync_all()
}

/// Open the closest existing directory above `path`.
///
/// Returns the directory and `path` relative to it. Relative paths resolve
/// against the working directory.
fn open_nearest_ancestor(path: &Utf8Path) -> io::Result<(cap_fs::Dir, Utf8PathBuf)> {
    if path.is_relative() {
        let dir = cap_fs::Dir::open_ambient_dir(".", ambient_authority())?;
        return Ok((dir, path.to_path_buf()));
    }
    let mut ancestors = path.ancestors();
    ancestors.next();
    let (base, dir) = ancestors
        .find_map(|candidate| {
            cap_fs::Dir::open_ambient_dir(candidate.as_str(), ambient_authority())
                .ok()
                .map(|dir| (candidate, dir))
        })
        .ok_or_else(|| {
            io::Error::new(io::ErrorKind::NotFound, "no existing ancestor directory")
        })?;
    let relative = path.strip_prefix(base).map_err(io::Error::other)?;
    Ok((dir, relative.to_path_buf()))
}

/// Keeps descriptors in memory, keyed by path in commit order.
#[derive(Debug, Default, Clone)]
pub struct MemorySink {
    descriptors: IndexMap<Utf8PathBuf, String>,
    writes: usize,
}

impl MemorySink {
    /// An empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Content written for `path`, if any.
    #[must_use]
    pub fn get(&self, path: impl AsRef<Utf8Path>) -> Option<&str> {
        self.descriptors.get(path.as_ref()).map(String::as_str)
    }

    /// All descriptors in commit order.
    pub fn iter(&self) -> impl Iterator<Item = (&Utf8Path, &str)> {
        self.descriptors
            .iter()
            .map(|(path, content)| (path.as_path(), content.as_str()))
    }

    /// Number of descriptors held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    /// Whether nothing has been written.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    /// Number of write calls received, including rewrites of one path.
    #[must_use]
    pub const fn writes(&self) -> usize {
        self.writes
    }
}

impl DescriptorSink for MemorySink {
    fn write(&mut self, path: &Utf8Path, content: &str) -> EngineResult<()> {
        self.writes += 1;
        self.descriptors
            .insert(path.to_path_buf(), content.to_owned());
        Ok(())
    }
}

impl<S: DescriptorSink + ?Sized> DescriptorSink for &mut S {
    fn write(&mut self, path: &Utf8Path, content: &str) -> EngineResult<()> {
        (**self).write(path, content)
    }
}
