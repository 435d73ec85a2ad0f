//! Registry entries backing each scope.

use camino::{Utf8Path, Utf8PathBuf};
use indexmap::IndexMap;

use crate::directive::{DEFAULT_INCLUDE_PATH, DEFAULT_LIBRARY_PATH, SearchPaths};
use crate::error::{EngineError, EngineResult};
use crate::ir::{CompileStep, Nesting, OrderOnly, Statement};
use crate::ledger::BuildState;
use crate::target::Target;

/// Index of a frame in the engine's registry.
pub(crate) type FrameId = usize;

/// Identity of a frame: its description plus the name of an inherit scope.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) struct FrameKey {
    pub(crate) description: Utf8PathBuf,
    pub(crate) name: Option<String>,
}

/// Lifecycle of a scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Accepting declarations.
    Open,
    /// Being rendered; declarations are rejected.
    Finalizing,
    /// Rendered and staged or written.
    Closed,
}

/// Everything recorded for one scope.
#[derive(Debug)]
pub(crate) struct Frame {
    pub(crate) key: FrameKey,
    pub(crate) descriptor: Utf8PathBuf,
    pub(crate) base_dir: Utf8PathBuf,
    pub(crate) nesting: Nesting,
    pub(crate) primary: bool,
    pub(crate) parent: Option<FrameId>,
    pub(crate) phase: Phase,
    pub(crate) ledger: BuildState,
    pub(crate) include_paths: SearchPaths,
    pub(crate) library_paths: SearchPaths,
    pub(crate) statements: Vec<Statement>,
    pub(crate) order_only: OrderOnly,
    declared: IndexMap<String, Target>,
}

impl Frame {
    /// A frame with fresh search paths and ledger, or, for inherit frames,
    /// the parent's search paths and pre-build statements.
    pub(crate) fn new(
        key: FrameKey,
        descriptor: Utf8PathBuf,
        nesting: Nesting,
        primary: bool,
        parent: Option<(FrameId, &Self)>,
    ) -> Self {
        let base_dir = key
            .description
            .parent()
            .map_or_else(Utf8PathBuf::new, Utf8Path::to_path_buf);
        let (ledger, include_paths, library_paths) = match parent {
            Some((_, outer)) if nesting == Nesting::Inherit => (
                BuildState::inherit(&outer.ledger),
                outer.include_paths.clone(),
                outer.library_paths.clone(),
            ),
            _ => (
                BuildState::new(),
                SearchPaths::with_default(DEFAULT_INCLUDE_PATH),
                SearchPaths::with_default(DEFAULT_LIBRARY_PATH),
            ),
        };
        Self {
            key,
            descriptor,
            base_dir,
            nesting,
            primary,
            parent: parent.map(|(id, _)| id),
            phase: Phase::Open,
            ledger,
            include_paths,
            library_paths,
            statements: Vec::new(),
            order_only: OrderOnly::new(),
            declared: IndexMap::new(),
        }
    }

    pub(crate) fn description(&self) -> &Utf8Path {
        &self.key.description
    }

    pub(crate) fn ensure_open(&self) -> EngineResult<()> {
        if self.phase == Phase::Open {
            Ok(())
        } else {
            Err(EngineError::ScopeClosed {
                description: self.key.description.clone(),
            })
        }
    }

    /// Record a logical name, rejecting redeclarations.
    pub(crate) fn declare(&mut self, target: &Target) -> EngineResult<()> {
        if let Some(existing) = self.declared.get(target.name()) {
            return Err(if existing.kind() == target.kind() {
                EngineError::DuplicateTarget {
                    name: target.name().to_owned(),
                    kind: target.kind(),
                    description: self.key.description.clone(),
                }
            } else {
                EngineError::ConflictingTarget {
                    name: target.name().to_owned(),
                    existing: existing.kind(),
                    requested: target.kind(),
                }
            });
        }
        self.declared
            .insert(target.name().to_owned(), target.clone());
        Ok(())
    }

    /// A declared target by logical name, or a linked target by alias.
    pub(crate) fn lookup(&self, name: &str) -> Option<&Target> {
        self.declared.get(name).or_else(|| {
            self.declared
                .values()
                .filter(|target| target.kind().is_linked())
                .find(|target| target.alias() == name)
        })
    }

    /// The compile step already recorded for `object`, if any.
    pub(crate) fn compile_step(&self, object: &Utf8Path) -> Option<&CompileStep> {
        self.statements.iter().find_map(|statement| match statement {
            Statement::Compile(step) if step.object == object => Some(step),
            _ => None,
        })
    }

    pub(crate) fn references(&self, descriptor: &Utf8Path) -> bool {
        self.statements.iter().any(|statement| {
            matches!(statement, Statement::Subscope(reference) if reference.descriptor == descriptor)
        })
    }

    pub(crate) fn resolve(&self, path: impl AsRef<Utf8Path>) -> Utf8PathBuf {
        crate::directive::absolutize(&self.base_dir, path)
    }
}
