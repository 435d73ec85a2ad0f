//! Evaluation of descriptions against the engine.
//!
//! Each description is evaluated in its own scope. `build` steps evaluate
//! the referenced description in an independent scope unless it has already
//! been evaluated, and `scope` steps evaluate their steps in an inherit
//! scope over the same description.

use camino::{Utf8Path, Utf8PathBuf};
use tracing::debug;

use super::{
    ArchiveSpec, Description, DescriptionError, LibrarySpec, LinkSpec, NamedScope, ServerSpec,
    Step,
};
use crate::engine::{Engine, InstallTarget, Scope, ServerDefinition, ServerOptions};
use crate::error::EngineError;
use crate::sink::DescriptorSink;
use crate::target::Version;

/// File name looked up when no description is given.
pub const DEFAULT_DESCRIPTION: &str = "makefile.yml";

/// Evaluate `description` as the primary scope of `engine`.
///
/// # Errors
///
/// Returns the first [`DescriptionError`] raised by the description or any
/// description it builds. Nothing is written in that case.
pub fn evaluate<S: DescriptorSink>(
    engine: &mut Engine<S>,
    description: &Utf8Path,
) -> Result<(), DescriptionError> {
    let mut scope = engine
        .open(description)
        .map_err(declaration(description.to_path_buf()))?;
    if let Err(err) = evaluate_file(&mut scope) {
        scope.abandon();
        return Err(err);
    }
    let path = scope.description().to_path_buf();
    scope.finish().map_err(declaration(path))
}

fn declaration(path: Utf8PathBuf) -> impl FnOnce(EngineError) -> DescriptionError {
    move |source| DescriptionError::Declaration { path, source }
}

/// Load the scope's description and evaluate it, unless the scope has
/// already been evaluated.
fn evaluate_file<S: DescriptorSink>(scope: &mut Scope<'_, S>) -> Result<(), DescriptionError> {
    if !scope.is_open() {
        debug!(description = %scope.description(), "description already evaluated");
        return Ok(());
    }
    let description = Description::from_path(scope.description())?;
    let mut eval = Evaluator { scope };
    eval.settings(
        &description.include_paths,
        &description.library_paths,
        &description.pre_build,
        description.parallel,
    )?;
    eval.steps(&description.steps)
}

struct Evaluator<'s, 'e, S: DescriptorSink> {
    scope: &'s mut Scope<'e, S>,
}

impl<S: DescriptorSink> Evaluator<'_, '_, S> {
    fn declared<T>(&self, result: Result<T, EngineError>) -> Result<T, DescriptionError> {
        result.map_err(declaration(self.scope.description().to_path_buf()))
    }

    fn settings(
        &mut self,
        include_paths: &[String],
        library_paths: &[String],
        pre_build: &[String],
        parallel: Option<bool>,
    ) -> Result<(), DescriptionError> {
        let result = self.apply_settings(include_paths, library_paths, pre_build, parallel);
        self.declared(result)
    }

    fn apply_settings(
        &mut self,
        include_paths: &[String],
        library_paths: &[String],
        pre_build: &[String],
        parallel: Option<bool>,
    ) -> Result<(), EngineError> {
        self.scope.include_paths(include_paths.iter().map(String::as_str))?;
        self.scope.library_paths(library_paths.iter().map(String::as_str))?;
        for line in pre_build {
            self.scope.add_pre_build_statement(line.as_str())?;
        }
        if let Some(mode) = parallel {
            self.scope.set_parallel(mode)?;
        }
        Ok(())
    }

    fn steps(&mut self, steps: &[Step]) -> Result<(), DescriptionError> {
        for step in steps {
            self.step(step)?;
        }
        Ok(())
    }

    fn step(&mut self, step: &Step) -> Result<(), DescriptionError> {
        let declared = match step {
            Step::Build(path) => return self.build(path),
            Step::Scope(named) => return self.inherit(named),
            Step::Compile(spec) => self
                .scope
                .compile(&spec.source, spec.object.as_deref(), &spec.directive)
                .map(drop),
            Step::Executable(spec) => self.executable(spec),
            Step::Unittest(spec) => self.unittest(spec),
            Step::Library(spec) => self.library(spec),
            Step::Archive(spec) => self.archive(spec),
            Step::Server(spec) => self.server(spec),
            Step::Install(spec) => {
                let targets = InstallTarget::Many(spec.targets.iter().map(Into::into).collect());
                self.scope.install(&targets, &spec.destination).map(drop)
            }
            Step::Dependencies(spec) => self
                .scope
                .dependencies(&spec.target, &names(&spec.prerequisites)),
            Step::Deploy(spec) => self.scope.deploy(&spec.target, &spec.directive),
        };
        self.declared(declared)
    }

    fn build(&mut self, path: &str) -> Result<(), DescriptionError> {
        let here = self.scope.description().to_path_buf();
        let mut nested = self.scope.build(path).map_err(declaration(here))?;
        evaluate_file(&mut nested)?;
        let nested_path = nested.description().to_path_buf();
        nested.finish().map_err(declaration(nested_path))
    }

    fn inherit(&mut self, named: &NamedScope) -> Result<(), DescriptionError> {
        let here = self.scope.description().to_path_buf();
        let mut nested = self.scope.inherit(&named.name).map_err(declaration(here))?;
        if nested.is_open() {
            let mut eval = Evaluator { scope: &mut nested };
            eval.settings(
                &named.include_paths,
                &named.library_paths,
                &named.pre_build,
                named.parallel,
            )?;
            eval.steps(&named.steps)?;
        }
        let nested_path = nested.description().to_path_buf();
        nested.finish().map_err(declaration(nested_path))
    }

    /// Compile `sources` with `directive` and append the prebuilt objects.
    fn compile_all(
        &mut self,
        sources: &[String],
        objects: &[String],
        directive: &str,
    ) -> Result<Vec<Utf8PathBuf>, EngineError> {
        let mut compiled = sources
            .iter()
            .map(|source| self.scope.compile(source, None, directive))
            .collect::<Result<Vec<_>, _>>()?;
        compiled.extend(objects.iter().map(Utf8PathBuf::from));
        Ok(compiled)
    }

    fn executable(&mut self, spec: &LinkSpec) -> Result<(), EngineError> {
        let objects = self.compile_all(&spec.sources, &spec.objects, &spec.directive)?;
        self.scope
            .link_executable(&spec.name, &objects, &names(&spec.libraries))?;
        Ok(())
    }

    fn unittest(&mut self, spec: &LinkSpec) -> Result<(), EngineError> {
        let framework = self.scope.config().unittest.include_path.clone();
        let include = self.scope.platform().include_directive(&[framework]);
        let directive = format!("{} {include}", spec.directive).trim().to_owned();
        let objects = self.compile_all(&spec.sources, &spec.objects, &directive)?;
        self.scope
            .link_unittest(&spec.name, &objects, &names(&spec.libraries))?;
        Ok(())
    }

    fn library(&mut self, spec: &LibrarySpec) -> Result<(), EngineError> {
        let version = spec
            .version
            .as_deref()
            .map(str::parse::<Version>)
            .transpose()?;
        let objects = self.compile_all(&spec.sources, &spec.objects, &spec.directive)?;
        self.scope
            .link_library(&spec.name, &objects, &names(&spec.libraries), version)?;
        Ok(())
    }

    fn archive(&mut self, spec: &ArchiveSpec) -> Result<(), EngineError> {
        let objects = self.compile_all(&spec.sources, &spec.objects, &spec.directive)?;
        self.scope.link_archive(&spec.name, &objects)?;
        Ok(())
    }

    fn server(&mut self, spec: &ServerSpec) -> Result<(), EngineError> {
        let objects = self.compile_all(&spec.sources, &spec.objects, &spec.directive)?;
        let options = ServerOptions {
            definition: ServerDefinition::from(&spec.definition),
            resources: spec.resources.clone(),
            configuration: spec.configuration.as_deref().map(Utf8PathBuf::from),
        };
        self.scope
            .link_server(&spec.name, &objects, &names(&spec.libraries), &options)?;
        Ok(())
    }
}

fn names(values: &[String]) -> Vec<&str> {
    values.iter().map(String::as_str).collect()
}
