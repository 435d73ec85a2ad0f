//! Descriptor emission backends.
//!
//! A backend turns one finalized scope into the text of its descriptor. The
//! engine decides when a scope is rendered and where the result goes; the
//! backend only decides what the descriptor is called and what it says.

use std::fmt;

use camino::{Utf8Path, Utf8PathBuf};
use clap::ValueEnum;

use crate::config::EngineConfig;
use crate::ir::{Nesting, OrderOnly, Statement};
use crate::ledger::BuildState;
use crate::platform::Platform;

mod make;
mod ninja;

pub use make::Make;
pub use ninja::Ninja;

/// File name of the primary Ninja descriptor.
pub const NINJA_PRIMARY_FILE: &str = "build.ninja";

/// Script that deploys an artifact, found on `PATH`.
pub const DEPLOY_SCRIPT: &str = "make.deploy.ksh";

/// Descriptor formats the engine can emit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, ValueEnum)]
pub enum BackendKind {
    /// Ninja build files sharing one target namespace.
    #[default]
    Ninja,
    /// Self-contained GNU Make makefiles.
    Make,
}

impl BackendKind {
    /// Construct the backend for this kind.
    #[must_use]
    pub fn backend(self) -> Box<dyn Backend> {
        match self {
            Self::Ninja => Box::new(Ninja),
            Self::Make => Box::new(Make),
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Ninja => "ninja",
            Self::Make => "make",
        })
    }
}

/// Everything a backend may read while rendering one scope.
#[derive(Clone, Copy)]
pub struct FrameView<'a> {
    /// Description evaluated by the scope.
    pub description: &'a Utf8Path,
    /// Directory relative paths of the scope resolve against.
    pub base_dir: &'a Utf8Path,
    /// How the scope was opened.
    pub nesting: Nesting,
    /// Whether this is the first scope of the evaluation.
    pub primary: bool,
    /// The scope's ledger, with absorbed children when namespaces are shared.
    pub ledger: &'a BuildState,
    /// Ledgers of the enclosing scopes, innermost first.
    pub ancestors: &'a [&'a BuildState],
    /// Declarations in the order they were made.
    pub statements: &'a [Statement],
    /// Extra order-only prerequisites by target path.
    pub order_only: &'a OrderOnly,
    /// Platform conventions.
    pub platform: &'a dyn Platform,
    /// Engine configuration.
    pub config: &'a EngineConfig,
    /// Whether any scope of the evaluation asked for sequential execution.
    pub sequential: bool,
}

impl FrameView<'_> {
    /// Path a link step depends on for the library `name`, when the library
    /// is built in view of this scope.
    #[must_use]
    pub fn resolve_library(&self, name: &str) -> Option<Utf8PathBuf> {
        std::iter::once(self.ledger)
            .chain(self.ancestors.iter().copied())
            .find_map(|ledger| ledger.alias(name))
            .map(crate::target::Target::link_path)
    }
}

impl fmt::Debug for FrameView<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrameView")
            .field("description", &self.description)
            .field("nesting", &self.nesting)
            .field("primary", &self.primary)
            .finish_non_exhaustive()
    }
}

/// A descriptor format.
pub trait Backend: fmt::Debug {
    /// Which format this is.
    fn kind(&self) -> BackendKind;

    /// Whether every descriptor of an evaluation shares one target namespace.
    ///
    /// Shared namespaces require each output to be produced once across the
    /// whole tree, and let nested scopes see the libraries of enclosing ones.
    fn shares_namespace(&self) -> bool;

    /// Path of the descriptor written for a scope.
    fn descriptor_path(
        &self,
        description: &Utf8Path,
        nesting: Nesting,
        name: Option<&str>,
        primary: bool,
    ) -> Utf8PathBuf;

    /// Render a finalized scope.
    fn render(&self, frame: &FrameView<'_>) -> String;

    /// Target names the descriptors define themselves.
    ///
    /// No declaration may produce one of these, and no library may be
    /// referenced by one.
    fn reserved_targets(&self) -> &'static [&'static str] {
        &[]
    }
}

/// `<description>.<name>.<extension>` or `<description>.<extension>`.
fn sibling_descriptor(description: &Utf8Path, name: Option<&str>, extension: &str) -> Utf8PathBuf {
    let suffix = name.map_or_else(
        || extension.to_owned(),
        |scope| format!("{}.{extension}", scope.replace('/', "_")),
    );
    Utf8PathBuf::from(format!("{description}.{suffix}"))
}

/// `-l name` for every library, space separated.
fn library_flags(libraries: &[String]) -> String {
    libraries
        .iter()
        .filter(|name| !name.is_empty())
        .map(|name| format!("-l {name}"))
        .collect::<Vec<_>>()
        .join(" ")
}
