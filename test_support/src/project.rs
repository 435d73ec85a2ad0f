//! Temporary projects made of build descriptions.

use std::fs;

use anyhow::{Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use tempfile::TempDir;

/// A temporary directory holding build descriptions and a build home.
///
/// The directory is removed when the project is dropped.
///
/// # Examples
///
/// ```
/// use test_support::Project;
///
/// let project = Project::new().expect("project");
/// let description = project
///     .write("app/makefile.yml", "steps: []\n")
///     .expect("write");
/// assert!(description.ends_with("app/makefile.yml"));
/// assert!(description.is_absolute());
/// ```
#[derive(Debug)]
pub struct Project {
    _dir: TempDir,
    root: Utf8PathBuf,
}

impl Project {
    /// Create an empty project with a `home/` build home.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created or its path is
    /// not UTF-8.
    pub fn new() -> Result<Self> {
        let dir = TempDir::new().context("create project directory")?;
        let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf())
            .map_err(|p| anyhow::anyhow!("non UTF-8 temp dir {}", p.display()))?;
        fs::create_dir_all(root.join("home")).context("create build home")?;
        Ok(Self { _dir: dir, root })
    }

    /// Project root.
    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    /// Build home under the project root.
    pub fn home(&self) -> Utf8PathBuf {
        self.root.join("home")
    }

    /// Absolute path of `relative` inside the project.
    pub fn path(&self, relative: &str) -> Utf8PathBuf {
        self.root.join(relative)
    }

    /// Write `content` to `relative`, creating parent directories.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn write(&self, relative: &str, content: &str) -> Result<Utf8PathBuf> {
        let path = self.path(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| format!("create {parent}"))?;
        }
        fs::write(&path, content).with_context(|| format!("write {path}"))?;
        Ok(path)
    }

    /// Read `relative` back.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read.
    pub fn read(&self, relative: &str) -> Result<String> {
        let path = self.path(relative);
        fs::read_to_string(&path).with_context(|| format!("read {path}"))
    }
}
