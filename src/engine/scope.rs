//! Scope handles and the target declaration API.
//!
//! Every declaration resolves relative paths against the directory of the
//! description that owns the scope, registers its outputs in the scope's
//! ledger and appends one or more statements for the backend to render.

use camino::{Utf8Path, Utf8PathBuf};
use tracing::{debug, error};

use super::Engine;
use super::frame::{Frame, FrameId, FrameKey, Phase};
use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use crate::ir::{CompileStep, DeployStep, InstallStep, LinkStep, Nesting, Statement};
use crate::ledger::BuildState;
use crate::platform::Platform;
use crate::sink::{DescriptorSink, FileSink};
use crate::target::{Target, TargetKind, Version, default_object_name, resolve_linked};

/// Services exposed by a server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerDefinition {
    /// A server-definition file, relative to the declaring description.
    File(Utf8PathBuf),
    /// An explicit list of service names.
    Services(Vec<String>),
}

/// Server-specific inputs of [`Scope::link_server`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerOptions {
    /// Services the server advertises.
    pub definition: ServerDefinition,
    /// Resource keys linked into the server.
    pub resources: Vec<String>,
    /// Resource properties file, relative to the declaring description.
    pub configuration: Option<Utf8PathBuf>,
}

impl ServerOptions {
    /// Options with only a definition.
    #[must_use]
    pub const fn new(definition: ServerDefinition) -> Self {
        Self {
            definition,
            resources: Vec::new(),
            configuration: None,
        }
    }
}

/// What [`Scope::install`] copies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstallTarget {
    /// A declared target (by logical name or alias) or a file.
    Single(String),
    /// A target installed into a subdirectory of the destination.
    Relocated {
        /// Target or file installed.
        target: String,
        /// Subdirectory of the destination.
        subdirectory: String,
    },
    /// Several install targets sharing a destination.
    Many(Vec<InstallTarget>),
}

/// Handle through which declarations are made against one scope.
///
/// Dropping an open handle finalizes its scope. A failure is logged and
/// later fails the commit of the primary scope; use [`Scope::finish`] to
/// observe it directly.
pub struct Scope<'e, S: DescriptorSink = FileSink> {
    engine: &'e mut Engine<S>,
    id: FrameId,
}

impl<'e, S: DescriptorSink> Scope<'e, S> {
    pub(crate) const fn new(engine: &'e mut Engine<S>, id: FrameId) -> Self {
        Self { engine, id }
    }

    fn frame(&self) -> &Frame {
        self.engine.frame(self.id)
    }

    fn open_frame(&mut self) -> EngineResult<&mut Frame> {
        let frame = self.engine.frame_mut(self.id);
        frame.ensure_open()?;
        Ok(frame)
    }

    /// Configuration of the engine the scope belongs to.
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        self.engine.config()
    }

    /// Platform conventions in effect.
    #[must_use]
    pub fn platform(&self) -> &dyn Platform {
        self.engine.platform()
    }

    /// Description evaluated by this scope.
    #[must_use]
    pub fn description(&self) -> &Utf8Path {
        self.frame().description()
    }

    /// Descriptor this scope writes.
    #[must_use]
    pub fn descriptor(&self) -> &Utf8Path {
        &self.frame().descriptor
    }

    /// Directory relative paths resolve against.
    #[must_use]
    pub fn base_dir(&self) -> &Utf8Path {
        &self.frame().base_dir
    }

    /// How this scope was opened.
    #[must_use]
    pub fn nesting(&self) -> Nesting {
        self.frame().nesting
    }

    /// Whether this is the first scope of the evaluation.
    #[must_use]
    pub fn is_primary(&self) -> bool {
        self.frame().primary
    }

    /// Current lifecycle phase.
    #[must_use]
    pub fn phase(&self) -> Phase {
        self.frame().phase
    }

    /// Whether declarations are still accepted.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.phase() == Phase::Open
    }

    /// The scope's ledger.
    #[must_use]
    pub fn ledger(&self) -> &BuildState {
        &self.frame().ledger
    }

    /// Statements recorded so far.
    #[must_use]
    pub fn statements(&self) -> &[Statement] {
        &self.frame().statements
    }

    /// Extend the include search paths.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::ScopeClosed`] when the scope is not open.
    pub fn include_paths<I, P>(&mut self, paths: I) -> EngineResult<()>
    where
        I: IntoIterator<Item = P>,
        P: Into<Utf8PathBuf>,
    {
        self.open_frame()?.include_paths.extend(paths);
        Ok(())
    }

    /// Extend the library search paths.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::ScopeClosed`] when the scope is not open.
    pub fn library_paths<I, P>(&mut self, paths: I) -> EngineResult<()>
    where
        I: IntoIterator<Item = P>,
        P: Into<Utf8PathBuf>,
    {
        self.open_frame()?.library_paths.extend(paths);
        Ok(())
    }

    /// Queue a raw line emitted at the top of the descriptor.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::ScopeClosed`] when the scope is not open.
    pub fn add_pre_build_statement(&mut self, statement: impl Into<String>) -> EngineResult<()> {
        self.open_frame()?.ledger.add_pre_build_statement(statement);
        Ok(())
    }

    /// Choose parallel or sequential execution. The first choice sticks.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::ScopeClosed`] when the scope is not open.
    pub fn set_parallel(&mut self, parallel: bool) -> EngineResult<()> {
        self.open_frame()?.ledger.set_parallel(parallel);
        Ok(())
    }

    /// Compile `source` into `object`, by default `obj/<source stem>.o`.
    ///
    /// Repeating an identical compile is a no-op. Returns the absolute
    /// object path.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::ScopeClosed`] when the scope is not open,
    /// [`EngineError::DuplicateTarget`] when the object is already compiled
    /// differently, and [`EngineError::DuplicateOutput`] when another scope
    /// produces it.
    pub fn compile(
        &mut self,
        source: &str,
        object: Option<&str>,
        directive: &str,
    ) -> EngineResult<Utf8PathBuf> {
        self.frame().ensure_open()?;
        let frame = self.frame();
        let object_path =
            frame.resolve(object.map_or_else(|| default_object_name(source), Utf8PathBuf::from));
        let step = CompileStep {
            source: frame.resolve(source),
            object: object_path.clone(),
            include_directive: frame
                .include_paths
                .include_directive(&frame.base_dir, self.engine.platform()),
            directive: directive.trim().to_owned(),
        };
        if frame.compile_step(&object_path) == Some(&step) {
            debug!(object = %object_path, "identical compile already declared");
            return Ok(object_path);
        }
        let target = Target::new(object_path.as_str(), TargetKind::Object, object_path.clone(), None);
        self.engine.frame_mut(self.id).declare(&target)?;
        self.engine.claim_output(self.id, &object_path)?;

        debug!(source = %step.source, object = %object_path, "declared compile");
        let owner = self.engine.frame_mut(self.id);
        if let Some(directory) = object_path.parent() {
            owner.ledger.register_clean_path(directory);
            owner.ledger.register_path_for_creation(directory);
        }
        owner.ledger.register_compile(object_path.clone());
        owner.statements.push(Statement::Compile(step));
        Ok(object_path)
    }

    /// Link an executable.
    ///
    /// # Errors
    ///
    /// Returns the errors of [`Scope::compile`] plus
    /// [`EngineError::ConflictingTarget`] and
    /// [`EngineError::InvalidTargetName`].
    pub fn link_executable(
        &mut self,
        name: &str,
        objects: &[Utf8PathBuf],
        libraries: &[&str],
    ) -> EngineResult<Target> {
        self.link(Link::new(TargetKind::Executable, name, objects, libraries))
    }

    /// Link a shared library, versioned when `version` is given.
    ///
    /// The library is reachable by its alias, the last component of `name`.
    ///
    /// # Errors
    ///
    /// As [`Scope::link_executable`].
    pub fn link_library(
        &mut self,
        name: &str,
        objects: &[Utf8PathBuf],
        libraries: &[&str],
        version: Option<Version>,
    ) -> EngineResult<Target> {
        let mut link = Link::new(TargetKind::SharedLibrary, name, objects, libraries);
        link.version = version;
        self.link(link)
    }

    /// Link a static archive.
    ///
    /// # Errors
    ///
    /// As [`Scope::link_executable`].
    pub fn link_archive(&mut self, name: &str, objects: &[Utf8PathBuf]) -> EngineResult<Target> {
        self.link(Link::new(TargetKind::Archive, name, objects, &[]))
    }

    /// Link a server through the service-aware server linker.
    ///
    /// # Errors
    ///
    /// As [`Scope::link_executable`].
    pub fn link_server(
        &mut self,
        name: &str,
        objects: &[Utf8PathBuf],
        libraries: &[&str],
        options: &ServerOptions,
    ) -> EngineResult<Target> {
        let frame = self.frame();
        let mut directive = String::new();
        if !options.resources.is_empty() {
            directive.push_str(" --resource-keys ");
            directive.push_str(&options.resources.join(" "));
        }
        if let Some(configuration) = &options.configuration {
            directive.push_str(&format!(" --properties-file {}", frame.resolve(configuration)));
        }
        match &options.definition {
            ServerDefinition::File(path) => {
                directive.push_str(&format!(" --server-definition {}", frame.resolve(path)));
            }
            ServerDefinition::Services(services) => {
                directive.push_str(" -s ");
                directive.push_str(&services.join(" "));
            }
        }
        let mut link = Link::new(TargetKind::Server, name, objects, libraries);
        link.server_directive = Some(directive.trim_start().to_owned());
        self.link(link)
    }

    /// Link a unit-test binary against the configured test framework.
    ///
    /// The framework's libraries and library path are added for this link
    /// only.
    ///
    /// # Errors
    ///
    /// As [`Scope::link_executable`].
    pub fn link_unittest(
        &mut self,
        name: &str,
        objects: &[Utf8PathBuf],
        libraries: &[&str],
    ) -> EngineResult<Target> {
        self.link(Link::new(TargetKind::Unittest, name, objects, libraries))
    }

    fn link(&mut self, link: Link<'_>) -> EngineResult<Target> {
        self.frame().ensure_open()?;
        let platform = self.engine.platform();
        let unittest = &self.engine.config().unittest;
        let frame = self.frame();
        let target = resolve_linked(platform, &frame.base_dir, link.kind, link.name, link.version)?;
        let mut libraries: Vec<String> = link.libraries.iter().map(|l| (*l).to_owned()).collect();
        let mut library_paths = frame.library_paths.clone();
        if link.kind == TargetKind::Unittest {
            libraries.extend(unittest.libraries.iter().cloned());
            library_paths.push(unittest.library_path.clone());
        }
        let referenced: Vec<String> = libraries.iter().filter(|l| !l.is_empty()).cloned().collect();
        let step = LinkStep {
            target: target.clone(),
            objects: link.objects.iter().map(|o| frame.resolve(o)).collect(),
            libraries,
            library_directive: library_paths.library_directive(&frame.base_dir, platform),
            library_paths: library_paths.resolve(&frame.base_dir),
            include_directive: (link.kind == TargetKind::Server)
                .then(|| frame.include_paths.include_directive(&frame.base_dir, platform)),
            server_directive: link.server_directive,
            soname_directive: target.soname_chain().and_then(|chain| {
                chain
                    .soname
                    .file_name()
                    .map(|soname| platform.soname_directive(soname))
            }),
        };
        let is_library = matches!(link.kind, TargetKind::SharedLibrary | TargetKind::Archive);
        let statement = Statement::Link(step);
        let outputs = statement.outputs();

        for library in &referenced {
            self.engine.ensure_unreserved(library)?;
        }
        self.engine.frame_mut(self.id).declare(&target)?;
        for output in &outputs {
            self.engine.claim_output(self.id, output)?;
        }
        if is_library {
            self.engine.claim_output(self.id, Utf8Path::new(target.alias()))?;
        }

        let owner = self.engine.frame_mut(self.id);
        owner.ledger.register_link(target.path());
        if link.kind == TargetKind::Unittest {
            owner.ledger.register_test(target.path());
        }
        for library in referenced {
            owner.ledger.register_phony_dependency(library);
        }
        for output in outputs {
            owner.ledger.register_file_for_removal(output);
        }
        if let Some(directory) = target.path().parent() {
            owner.ledger.register_path_for_creation(directory);
        }
        owner.statements.push(statement);
        if is_library {
            owner.ledger.register_alias(target.alias(), target.clone());
            owner.statements.push(Statement::Alias {
                alias: target.alias().to_owned(),
                target: target.clone(),
            });
        }
        debug!(name = target.name(), kind = %target.kind(), path = %target.path(), "declared link");
        Ok(target)
    }

    /// Install targets or files into `destination`.
    ///
    /// Versioned libraries get their SONAME chain recreated at the
    /// destination. Returns the installed files.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::ScopeClosed`] when the scope is not open and
    /// [`EngineError::DuplicateOutput`] when a file is installed twice.
    pub fn install(
        &mut self,
        target: &InstallTarget,
        destination: &str,
    ) -> EngineResult<Vec<Utf8PathBuf>> {
        self.frame().ensure_open()?;
        let root = self.frame().resolve(destination);
        let mut installed = Vec::new();
        self.install_into(target, &root, &mut installed)?;
        Ok(installed)
    }

    fn install_into(
        &mut self,
        target: &InstallTarget,
        destination: &Utf8Path,
        installed: &mut Vec<Utf8PathBuf>,
    ) -> EngineResult<()> {
        match target {
            InstallTarget::Single(name) => {
                installed.push(self.install_one(name, destination)?);
            }
            InstallTarget::Relocated {
                target: name,
                subdirectory,
            } => {
                let nested = crate::directive::absolutize(destination, subdirectory);
                installed.push(self.install_one(name, &nested)?);
            }
            InstallTarget::Many(targets) => {
                for each in targets {
                    self.install_into(each, destination, installed)?;
                }
            }
        }
        Ok(())
    }

    fn install_one(&mut self, name: &str, destination: &Utf8Path) -> EngineResult<Utf8PathBuf> {
        let built = self
            .frame()
            .lookup(name)
            .filter(|t| t.kind().is_linked())
            .or_else(|| self.engine.find_library(self.id, name))
            .cloned();
        let (source, chain) = match &built {
            Some(target) => (target.path().to_path_buf(), target.soname_chain()),
            None => (self.frame().resolve(name), None),
        };
        let file_name = source.file_name().unwrap_or(name);
        let step = InstallStep {
            name: built.as_ref().map_or(name, Target::name).to_owned(),
            installed: destination.join(file_name),
            destination: destination.to_path_buf(),
            soname: chain.map(|c| c.relocate(destination)),
            source,
        };
        let statement = Statement::Install(step.clone());
        for output in statement.outputs() {
            self.engine.claim_output(self.id, &output)?;
        }
        let owner = self.engine.frame_mut(self.id);
        owner.ledger.register_install(step.installed.clone());
        owner.ledger.register_path_for_creation(destination);
        owner.statements.push(statement);
        debug!(source = %step.source, destination = %destination, "declared install");
        Ok(step.installed)
    }

    /// Hand a target linked by this scope to the deploy script, which
    /// receives the artifact and `directive`.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::UnknownTarget`] when `name` is not linked by
    /// this scope and [`EngineError::DuplicateOutput`] when the target is
    /// already deployed.
    pub fn deploy(&mut self, name: &str, directive: &str) -> EngineResult<()> {
        self.frame().ensure_open()?;
        let frame = self.frame();
        let target = frame
            .lookup(name)
            .filter(|target| target.kind().is_linked())
            .cloned()
            .ok_or_else(|| EngineError::UnknownTarget {
                name: name.to_owned(),
                description: frame.description().to_path_buf(),
            })?;
        let step = DeployStep {
            target,
            directive: directive.trim().to_owned(),
        };
        let goal = step.goal();
        self.engine.claim_output(self.id, Utf8Path::new(&goal))?;
        debug!(name, goal = %goal, "declared deploy");
        let owner = self.engine.frame_mut(self.id);
        owner.ledger.register_deploy(goal);
        owner.statements.push(Statement::Deploy(step));
        Ok(())
    }

    /// Make `target` wait for `prerequisites` without linking against them.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::UnknownTarget`] when `target` is not declared
    /// in this scope or a prerequisite is neither declared nor a visible
    /// library.
    pub fn dependencies(&mut self, target: &str, prerequisites: &[&str]) -> EngineResult<()> {
        self.frame().ensure_open()?;
        let unknown = |name: &str, frame: &Frame| EngineError::UnknownTarget {
            name: name.to_owned(),
            description: frame.description().to_path_buf(),
        };
        let frame = self.frame();
        let output = frame
            .lookup(target)
            .map(|t| t.path().to_path_buf())
            .ok_or_else(|| unknown(target, frame))?;
        let resolved: Vec<Utf8PathBuf> = prerequisites
            .iter()
            .map(|name| {
                frame
                    .lookup(name)
                    .map(Target::link_path)
                    .or_else(|| self.engine.resolve_library(self.id, name))
                    .ok_or_else(|| unknown(name, frame))
            })
            .collect::<EngineResult<_>>()?;
        debug!(name = target, prerequisites = ?prerequisites, "declared dependencies");
        self.engine
            .frame_mut(self.id)
            .order_only
            .entry(output)
            .or_default()
            .extend(resolved);
        Ok(())
    }

    /// Open (or reuse) an independent scope for another description,
    /// resolved against this scope's directory.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::ScopeClosed`] when this scope is not open and
    /// [`EngineError::RecursiveBuild`] when the description is still being
    /// evaluated.
    pub fn build(&mut self, description: impl AsRef<Utf8Path>) -> EngineResult<Scope<'_, S>> {
        let key = FrameKey {
            description: self.frame().resolve(description),
            name: None,
        };
        let id = self.engine.enter_nested(self.id, key, Nesting::Independent)?;
        Ok(Scope::new(&mut *self.engine, id))
    }

    /// Open (or reuse) a named scope over the same description that starts
    /// from this scope's search paths and pre-build statements.
    ///
    /// # Errors
    ///
    /// As [`Scope::build`].
    pub fn inherit(&mut self, name: &str) -> EngineResult<Scope<'_, S>> {
        let frame = self.frame();
        let qualified = frame
            .key
            .name
            .as_ref()
            .map_or_else(|| name.to_owned(), |outer| format!("{outer}/{name}"));
        let key = FrameKey {
            description: frame.key.description.clone(),
            name: Some(qualified),
        };
        let id = self.engine.enter_nested(self.id, key, Nesting::Inherit)?;
        Ok(Scope::new(&mut *self.engine, id))
    }

    /// Finalize the scope now. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::CircularDependency`] when the scope's targets
    /// depend on each other in a loop. Finalizing the primary scope returns
    /// [`EngineError::EvaluationFailed`] when another scope failed or was
    /// abandoned, or the sink's error when committing fails.
    pub fn finalize(&mut self) -> EngineResult<()> {
        self.engine.finalize_frame(self.id)
    }

    /// Close the scope without rendering it.
    ///
    /// The whole evaluation is abandoned: nothing staged so far or staged
    /// later is written.
    pub fn abandon(self) {
        self.engine.abandon_frame(self.id);
    }

    /// Finalize and release the scope.
    ///
    /// # Errors
    ///
    /// As [`Scope::finalize`].
    pub fn finish(mut self) -> EngineResult<()> {
        self.finalize()
    }
}

impl<S: DescriptorSink> Drop for Scope<'_, S> {
    fn drop(&mut self) {
        if !self.is_open() {
            return;
        }
        if let Err(err) = self.engine.finalize_frame(self.id) {
            error!(
                error = %err,
                description = %self.description(),
                "failed to finalize scope"
            );
            self.engine.record_failure(err);
        }
    }
}

/// Inputs shared by every link declaration.
struct Link<'a> {
    kind: TargetKind,
    name: &'a str,
    objects: &'a [Utf8PathBuf],
    libraries: &'a [&'a str],
    version: Option<Version>,
    server_directive: Option<String>,
}

impl<'a> Link<'a> {
    const fn new(
        kind: TargetKind,
        name: &'a str,
        objects: &'a [Utf8PathBuf],
        libraries: &'a [&'a str],
    ) -> Self {
        Self {
            kind,
            name,
            objects,
            libraries,
            version: None,
            server_directive: None,
        }
    }
}
