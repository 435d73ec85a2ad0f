//! The engine coordinating scopes, rendering and descriptor output.
//!
//! [`Engine`] owns every frame opened during one evaluation together with
//! the stack of frames still open. Declarations are made through [`Scope`]
//! handles, which borrow the engine mutably; nested scopes borrow their
//! parent, so frames can only close in the reverse order they were opened.
//!
//! Descriptors are staged as frames close and handed to the
//! [`DescriptorSink`] once the primary frame (the first one opened) closes.
//! Nothing is written if any frame failed to finalize or was abandoned, and
//! closing the primary frame then reports [`EngineError::EvaluationFailed`].

use std::collections::HashMap;

use camino::{Utf8Path, Utf8PathBuf};
use tracing::{debug, info};

use crate::backend::{Backend, FrameView};
use crate::config::EngineConfig;
use crate::directive::normalize;
use crate::error::{EngineError, EngineResult};
use crate::ir::{Nesting, ScopeReference, Statement, dependency_edges, find_cycle};
use crate::ledger::BuildState;
use crate::platform::Platform;
use crate::sink::{DescriptorSink, FileSink};
use crate::target::Target;

mod frame;
mod scope;

pub use frame::Phase;
pub use scope::{InstallTarget, Scope, ServerDefinition, ServerOptions};

use frame::{Frame, FrameId, FrameKey};

/// Coordinator of one evaluation.
#[derive(Debug)]
pub struct Engine<S: DescriptorSink = FileSink> {
    config: EngineConfig,
    platform: Box<dyn Platform>,
    backend: Box<dyn Backend>,
    sink: S,
    frames: Vec<Frame>,
    registry: HashMap<FrameKey, FrameId>,
    stack: Vec<FrameId>,
    outputs: HashMap<Utf8PathBuf, FrameId>,
    staged: Vec<(Utf8PathBuf, String)>,
    committed: bool,
    failed: bool,
    failure: Option<EngineError>,
    sequential: bool,
}

impl<S: DescriptorSink> Engine<S> {
    /// An engine writing descriptors to `sink`.
    #[must_use]
    pub fn new(config: EngineConfig, sink: S) -> Self {
        Self {
            platform: config.platform.platform(),
            backend: config.backend.backend(),
            config,
            sink,
            frames: Vec::new(),
            registry: HashMap::new(),
            stack: Vec::new(),
            outputs: HashMap::new(),
            staged: Vec::new(),
            committed: false,
            failed: false,
            failure: None,
            sequential: false,
        }
    }

    /// Open the scope for `description`.
    ///
    /// The first scope ever opened is the primary scope. Opening a
    /// description whose scope has already closed returns a closed handle.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::WorkingDirectory`] or
    /// [`EngineError::NonUtf8Path`] when a relative description cannot be
    /// made absolute.
    pub fn open(&mut self, description: impl AsRef<Utf8Path>) -> EngineResult<Scope<'_, S>> {
        let absolute = absolute_description(description.as_ref())?;
        let key = FrameKey {
            description: absolute,
            name: None,
        };
        let (id, _) = self.enter(key, Nesting::Root, None)?;
        Ok(Scope::new(self, id))
    }

    /// Configuration in effect.
    #[must_use]
    pub const fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Sink receiving descriptors.
    #[must_use]
    pub const fn sink(&self) -> &S {
        &self.sink
    }

    /// Consume the engine, returning its sink.
    #[must_use]
    pub fn into_sink(self) -> S {
        self.sink
    }

    /// Descriptor paths of every frame opened so far, in opening order.
    pub fn descriptors(&self) -> impl Iterator<Item = &Utf8Path> {
        self.frames.iter().map(|frame| frame.descriptor.as_path())
    }

    #[expect(
        clippy::indexing_slicing,
        reason = "frame ids are only minted by `enter` and frames are never removed"
    )]
    pub(crate) fn frame(&self, id: FrameId) -> &Frame {
        &self.frames[id]
    }

    #[expect(
        clippy::indexing_slicing,
        reason = "frame ids are only minted by `enter` and frames are never removed"
    )]
    pub(crate) fn frame_mut(&mut self, id: FrameId) -> &mut Frame {
        &mut self.frames[id]
    }

    pub(crate) fn platform(&self) -> &dyn Platform {
        self.platform.as_ref()
    }

    /// Find or create the frame for `key`.
    ///
    /// Returns the frame and whether it was created by this call.
    pub(crate) fn enter(
        &mut self,
        key: FrameKey,
        nesting: Nesting,
        parent: Option<FrameId>,
    ) -> EngineResult<(FrameId, bool)> {
        if let Some(&id) = self.registry.get(&key) {
            let frame = self.frame(id);
            if frame.phase != Phase::Closed {
                return Err(self.recursion(id, &key));
            }
            debug!(descriptor = %frame.descriptor, "reusing closed scope");
            return Ok((id, false));
        }
        let primary = self.frames.is_empty();
        let descriptor = self.backend.descriptor_path(
            &key.description,
            nesting,
            key.name.as_deref(),
            primary,
        );
        let frame = Frame::new(
            key.clone(),
            descriptor,
            nesting,
            primary,
            parent.map(|id| (id, self.frame(id))),
        );
        debug!(
            description = %key.description,
            descriptor = %frame.descriptor,
            ?nesting,
            primary,
            "opened scope"
        );
        let id = self.frames.len();
        self.frames.push(frame);
        if primary {
            for name in self.backend.reserved_targets() {
                self.outputs.insert(Utf8PathBuf::from(*name), id);
            }
        }
        self.registry.insert(key, id);
        self.stack.push(id);
        Ok((id, true))
    }

    /// Open a nested frame under `parent` and record the reference to it.
    pub(crate) fn enter_nested(
        &mut self,
        parent: FrameId,
        key: FrameKey,
        nesting: Nesting,
    ) -> EngineResult<FrameId> {
        self.frame(parent).ensure_open()?;
        let (id, created) = self.enter(key, nesting, Some(parent))?;
        let child = self.frame(id);
        let reference = ScopeReference {
            description: child.key.description.clone(),
            descriptor: child.descriptor.clone(),
            nesting,
        };
        let record = created
            || (!self.backend.shares_namespace()
                && !self.frame(parent).references(&reference.descriptor));
        if record {
            self.frame_mut(parent)
                .statements
                .push(Statement::Subscope(reference));
        }
        Ok(id)
    }

    fn recursion(&self, id: FrameId, key: &FrameKey) -> EngineError {
        let start = self
            .stack
            .iter()
            .position(|open| *open == id)
            .unwrap_or_default();
        let mut chain: Vec<Utf8PathBuf> = self
            .stack
            .iter()
            .skip(start)
            .map(|open| self.frame(*open).key.description.clone())
            .collect();
        chain.push(key.description.clone());
        EngineError::RecursiveBuild { chain }
    }

    /// Claim `path` as produced by frame `id`.
    ///
    /// When descriptors share a namespace an output may be produced once per
    /// evaluation, otherwise once per frame.
    pub(crate) fn claim_output(&mut self, id: FrameId, path: &Utf8Path) -> EngineResult<()> {
        if let Some(&owner) = self.outputs.get(path) {
            if owner == id || self.backend.shares_namespace() {
                return Err(EngineError::DuplicateOutput {
                    path: path.to_path_buf(),
                });
            }
        }
        self.outputs.insert(path.to_path_buf(), id);
        Ok(())
    }

    /// Reject a library reference that names a reserved target.
    ///
    /// Its fallback would be a second definition of that target.
    pub(crate) fn ensure_unreserved(&self, name: &str) -> EngineResult<()> {
        if self
            .backend
            .reserved_targets()
            .iter()
            .any(|reserved| *reserved == name)
        {
            return Err(EngineError::DuplicateOutput { path: name.into() });
        }
        Ok(())
    }

    /// Library aliases visible to frame `id`, innermost first.
    fn visible_ledgers(&self, id: FrameId) -> Vec<&BuildState> {
        let mut ledgers = Vec::new();
        if self.backend.shares_namespace() {
            let mut next = self.frame(id).parent;
            while let Some(parent) = next {
                let frame = self.frame(parent);
                ledgers.push(&frame.ledger);
                next = frame.parent;
            }
        }
        ledgers
    }

    /// Library built for alias `name` as seen from frame `id`.
    pub(crate) fn find_library(&self, id: FrameId, name: &str) -> Option<&Target> {
        std::iter::once(&self.frame(id).ledger)
            .chain(self.visible_ledgers(id))
            .find_map(|ledger| ledger.alias(name))
    }

    /// Resolve a library name to the path it stands for in frame `id`.
    pub(crate) fn resolve_library(&self, id: FrameId, name: &str) -> Option<Utf8PathBuf> {
        self.find_library(id, name).map(Target::link_path)
    }

    /// Finalize frame `id` exactly once.
    ///
    /// Checks the frame's local graph for cycles, renders it, stages the
    /// descriptor and, for the primary frame, commits everything staged.
    /// Calling it again on a frame that is finalizing or closed does nothing.
    pub(crate) fn finalize_frame(&mut self, id: FrameId) -> EngineResult<()> {
        if self.frame(id).phase != Phase::Open {
            return Ok(());
        }
        self.frame_mut(id).phase = Phase::Finalizing;
        let result = self.render_frame(id);
        self.stack.retain(|open| *open != id);
        self.frame_mut(id).phase = Phase::Closed;
        match result {
            Ok(content) => self.close(id, content),
            Err(err) => {
                self.failed = true;
                Err(err)
            }
        }
    }

    /// Close frame `id` without rendering it and discard the evaluation.
    pub(crate) fn abandon_frame(&mut self, id: FrameId) {
        if self.frame(id).phase == Phase::Closed {
            return;
        }
        debug!(descriptor = %self.frame(id).descriptor, "abandoned scope");
        self.failed = true;
        self.staged.clear();
        self.stack.retain(|open| *open != id);
        self.frame_mut(id).phase = Phase::Closed;
    }

    /// Keep `err` as the cause reported when the evaluation commits.
    ///
    /// Used for failures no caller can observe, such as a scope failing to
    /// finalize while it is dropped. Only the first failure is kept.
    pub(crate) fn record_failure(&mut self, err: EngineError) {
        self.failed = true;
        self.failure.get_or_insert(err);
    }

    fn check_cycles(&self, id: FrameId) -> EngineResult<()> {
        let frame = self.frame(id);
        let edges = dependency_edges(&frame.statements, &frame.order_only, |name| {
            self.resolve_library(id, name)
        });
        find_cycle(&edges).map_or(Ok(()), |cycle| {
            Err(EngineError::CircularDependency { cycle })
        })
    }

    fn render_frame(&mut self, id: FrameId) -> EngineResult<String> {
        self.check_cycles(id)?;
        if !self.frame(id).ledger.parallel() {
            self.sequential = true;
        }
        let frame = self.frame(id);
        let ancestors = self.visible_ledgers(id);
        let view = FrameView {
            description: frame.description(),
            base_dir: &frame.base_dir,
            nesting: frame.nesting,
            primary: frame.primary,
            ledger: &frame.ledger,
            ancestors: &ancestors,
            statements: &frame.statements,
            order_only: &frame.order_only,
            platform: self.platform.as_ref(),
            config: &self.config,
            sequential: self.sequential,
        };
        Ok(self.backend.render(&view))
    }

    fn close(&mut self, id: FrameId, content: String) -> EngineResult<()> {
        let frame = self.frame(id);
        let descriptor = frame.descriptor.clone();
        let primary = frame.primary;
        debug!(descriptor = %descriptor, "closed scope");
        if self.backend.shares_namespace() {
            if let Some(parent) = frame.parent {
                let child = frame.ledger.clone();
                self.frame_mut(parent).ledger.absorb(&child);
            }
        }
        self.staged.push((descriptor, content));
        if primary || self.committed {
            self.commit()?;
        }
        Ok(())
    }

    fn commit(&mut self) -> EngineResult<()> {
        if self.failed {
            self.staged.clear();
            return Err(EngineError::EvaluationFailed {
                source: self.failure.take().map(Box::new),
            });
        }
        for (path, content) in std::mem::take(&mut self.staged) {
            self.sink.write(&path, &content)?;
        }
        if !self.committed {
            info!(count = self.frames.len(), "committed descriptors");
        }
        self.committed = true;
        Ok(())
    }
}

/// `description` as an absolute, normalised path.
fn absolute_description(description: &Utf8Path) -> EngineResult<Utf8PathBuf> {
    if description.is_absolute() {
        return Ok(normalize(description));
    }
    let cwd = std::env::current_dir().map_err(|source| EngineError::WorkingDirectory { source })?;
    let base = Utf8PathBuf::from_path_buf(cwd).map_err(|path| EngineError::NonUtf8Path {
        path: path.display().to_string(),
    })?;
    Ok(normalize(&base.join(description)))
}
