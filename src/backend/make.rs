//! GNU Make descriptor generator.
//!
//! Unlike Ninja, every makefile stands on its own: nested scopes are run by
//! recursive `$(MAKE)` invocations, so each descriptor carries its own
//! prologue, aggregates, fallbacks, directory rules and clean targets.

use std::fmt::{self, Display, Formatter};

use camino::{Utf8Path, Utf8PathBuf};
use itertools::Itertools;

use super::{Backend, BackendKind, DEPLOY_SCRIPT, FrameView, library_flags, sibling_descriptor};
use crate::ir::{
    CompileStep, DeployStep, InstallStep, LinkStep, Nesting, ScopeReference, Statement,
};
use crate::target::{SonameChain, TargetKind, dependency_file, library_file_name};

/// Goals forwarded to nested makefiles.
const FORWARDED_GOALS: [&str; 9] = [
    "link",
    "clean_exe",
    "clean_object",
    "clean_dependency",
    "compile",
    "install",
    "test",
    "deploy",
    "cross",
];

/// Goals that never name a file.
const PHONY_GOALS: [&str; 11] = [
    "make",
    "clean",
    "link",
    "clean_exe",
    "clean_object",
    "clean_dependency",
    "compile",
    "install",
    "test",
    "deploy",
    "cross",
];

/// Goals that exist in every makefile, even with nothing to do.
const EMPTY_GOALS: [&str; 6] = ["compile", "link", "test", "install", "deploy", "cross"];

/// The rule backend.
#[derive(Debug, Default, Clone, Copy)]
pub struct Make;

impl Backend for Make {
    fn kind(&self) -> BackendKind {
        BackendKind::Make
    }

    fn shares_namespace(&self) -> bool {
        false
    }

    fn descriptor_path(
        &self,
        description: &Utf8Path,
        nesting: Nesting,
        name: Option<&str>,
        _primary: bool,
    ) -> Utf8PathBuf {
        match nesting {
            Nesting::Inherit => sibling_descriptor(description, name, "mk"),
            Nesting::Root | Nesting::Independent => sibling_descriptor(description, None, "mk"),
        }
    }

    fn render(&self, frame: &FrameView<'_>) -> String {
        MakeFile { view: frame }.to_string()
    }
}

/// `target_` followed by `name` with path separators flattened.
#[must_use]
pub fn target_name(name: &str) -> String {
    format!("target_{}", flatten(name))
}

fn flatten(name: &str) -> String {
    name.trim_start_matches('/').replace('/', "_")
}

fn multiline<S: AsRef<str>>(values: &[S]) -> String {
    values
        .iter()
        .map(AsRef::as_ref)
        .collect::<Vec<_>>()
        .join(" \\\n   ")
}

/// Space-join the non-empty parts of a recipe line.
fn command(parts: &[&str]) -> String {
    parts
        .iter()
        .map(|part| part.trim())
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

fn comment(f: &mut Formatter<'_>, lines: &[&str]) -> fmt::Result {
    writeln!(f, "#")?;
    for line in lines {
        writeln!(f, "# {line}")?;
    }
    writeln!(f, "#")
}

struct MakeFile<'a, 'v> {
    view: &'a FrameView<'v>,
}

impl MakeFile<'_, '_> {
    fn prologue(&self, f: &mut Formatter<'_>) -> fmt::Result {
        comment(f, &["If no target is given we assume 'all'"])?;
        writeln!(f, "all:")?;
        writeln!(f)?;
        comment(
            f,
            &["Goals that run even if a file with the same name exists"],
        )?;
        writeln!(f, ".PHONY: {}", PHONY_GOALS.join(" "))?;
        writeln!(f)?;
        for goal in EMPTY_GOALS {
            writeln!(f, "{goal}:")?;
        }
        writeln!(f)?;
        let view = self.view;
        for include in view.platform.make_includes(&view.config.build_home) {
            writeln!(f, "include {include}")?;
        }
        writeln!(f)?;
        let pre_build = view.ledger.pre_build_statements();
        for statement in pre_build {
            writeln!(f, "{statement}")?;
        }
        if !pre_build.is_empty() {
            writeln!(f)?;
        }
        Ok(())
    }

    /// Search path unit tests run with, set once per makefile.
    fn unittest_library_path(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let unittests: Vec<&LinkStep> = self
            .view
            .statements
            .iter()
            .filter_map(|statement| match statement {
                Statement::Link(step) if step.target.kind() == TargetKind::Unittest => Some(step),
                _ => None,
            })
            .collect();
        if unittests.is_empty() {
            return Ok(());
        }
        let paths = unittests
            .iter()
            .flat_map(|step| step.library_paths.iter().map(|path| path.as_str()))
            .chain(["$(PLATFORMLIB_DIR)"])
            .unique()
            .join(":");
        comment(
            f,
            &["Set LD_LIBRARY_PATH so that unittest has access to dependent libraries"],
        )?;
        writeln!(f, "LOCAL_LD_LIBRARY_PATH = {paths}")?;
        writeln!(f)
    }

    fn compile(f: &mut Formatter<'_>, step: &CompileStep) -> fmt::Result {
        let object = step.object.as_str();
        let dependency = dependency_file(&step.object);
        comment(f, &[format!("Compiles: {}", step.source).as_str()])?;
        writeln!(f, "compile: {object}")?;
        writeln!(f)?;
        match step.object.parent() {
            Some(dir) => writeln!(f, "{object}: {} | {dir}", step.source)?,
            None => writeln!(f, "{object}: {}", step.source)?,
        }
        writeln!(
            f,
            "\t{}",
            command(&[
                "$(COMPILER) $(COMPILE_DIRECTIVES)",
                step.directive.as_str(),
                step.include_directive.as_str(),
                format!("-MMD -MF {dependency} -o {object} -c {}", step.source).as_str(),
            ])
        )?;
        writeln!(f)?;
        writeln!(f, "-include {dependency}")?;
        writeln!(f)
    }

    /// Prerequisite for library `name`: the real file when built here,
    /// otherwise the fallback library and archive names.
    fn library_prerequisites(&self, name: &str) -> Vec<String> {
        if let Some(target) = self.view.ledger.alias(name) {
            return vec![target.path().to_string()];
        }
        fallback_names(self.view, name)
    }

    fn link(&self, f: &mut Formatter<'_>, step: &LinkStep) -> fmt::Result {
        let target = &step.target;
        let output = target.path();
        let name = target_name(target.name());
        let objects = format!("$(objects_{name})");
        let libs = format!("$(libs_{name})");
        let dependencies: Vec<String> = step
            .libraries
            .iter()
            .filter(|library| !library.is_empty())
            .flat_map(|library| self.library_prerequisites(library))
            .collect();

        let file = output.file_name().unwrap_or(output.as_str());
        comment(f, &[format!("Links: {file}").as_str()])?;
        writeln!(f, "link: {name}")?;
        if target.kind() == TargetKind::Unittest {
            writeln!(f, "test: {name}")?;
        }
        writeln!(f)?;
        writeln!(f, "{name}: {output}")?;
        writeln!(f)?;
        writeln!(f, "objects_{name} = {}", multiline(&step.objects))?;
        writeln!(f)?;
        writeln!(f, "libs_{name} = {}", library_flags(&step.libraries))?;
        writeln!(f)?;
        writeln!(f, "dependency_{name} = {}", multiline(&dependencies))?;
        writeln!(f)?;

        let mut order_only: Vec<String> = output
            .parent()
            .map(ToString::to_string)
            .into_iter()
            .collect();
        if let Some(extra) = self.view.order_only.get(output) {
            order_only.extend(extra.iter().map(ToString::to_string));
        }
        write!(f, "{output}: {objects} $(dependency_{name})")?;
        if !order_only.is_empty() {
            write!(f, " | {}", order_only.join(" "))?;
        }
        writeln!(f)?;

        let out = format!("-o {output}");
        let recipe = match target.kind() {
            TargetKind::Archive => command(&["$(ARCHIVER)", output.as_str(), objects.as_str()]),
            TargetKind::SharedLibrary => command(&[
                "$(LIBRARY_LINKER)",
                out.as_str(),
                objects.as_str(),
                step.library_directive.as_str(),
                libs.as_str(),
                step.soname_directive.as_deref().unwrap_or_default(),
            ]),
            TargetKind::Server => command(&[
                "$(SERVER_LINKER)",
                out.as_str(),
                objects.as_str(),
                step.library_directive.as_str(),
                libs.as_str(),
                step.server_directive.as_deref().unwrap_or_default(),
                step.include_directive.as_deref().unwrap_or_default(),
            ]),
            _ => command(&[
                "$(EXECUTABLE_LINKER)",
                out.as_str(),
                objects.as_str(),
                step.library_directive.as_str(),
                libs.as_str(),
            ]),
        };
        writeln!(f, "\t{recipe}")?;
        if let Some(chain) = step.soname_chain() {
            self.symlinks(f, &chain)?;
            let [soname, linker] = chain.links();
            writeln!(f)?;
            writeln!(f, "{} {}: {output}", soname.link, linker.link)?;
        }
        writeln!(f)
    }

    fn symlinks(&self, f: &mut Formatter<'_>, chain: &SonameChain) -> fmt::Result {
        let platform = self.view.platform;
        for link in chain.links() {
            writeln!(f, "\t{}", platform.remove(link.link.as_str()))?;
            writeln!(
                f,
                "\t{}",
                platform.symlink(link.relative_target(), link.link.as_str())
            )?;
        }
        Ok(())
    }

    fn install(&self, f: &mut Formatter<'_>, step: &InstallStep) -> fmt::Result {
        let name = format!("install_{}", flatten(step.installed.as_str()));
        writeln!(f, "install: {name}")?;
        writeln!(f)?;
        writeln!(f, "{name}: {} | {}", step.source, step.destination)?;
        writeln!(
            f,
            "\t{}",
            self.view
                .platform
                .install(step.source.as_str(), step.destination.as_str())
        )?;
        if let Some(chain) = &step.soname {
            self.symlinks(f, chain)?;
        }
        writeln!(f)
    }

    fn deploy(f: &mut Formatter<'_>, step: &DeployStep) -> fmt::Result {
        let goal = step.goal();
        let artifact = step.target.path();
        writeln!(f, "deploy: {goal}")?;
        writeln!(f)?;
        writeln!(f, "{goal}: {artifact}")?;
        writeln!(
            f,
            "\t-@{}",
            command(&[DEPLOY_SCRIPT, artifact.as_str(), step.directive.as_str()])
        )?;
        writeln!(f)
    }

    fn fallbacks(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let names: Vec<String> = self
            .view
            .ledger
            .fallback_libraries()
            .flat_map(|library| fallback_names(self.view, library))
            .collect();
        if names.is_empty() {
            return Ok(());
        }
        comment(
            f,
            &[
                "Libraries not built here. They must be intermediate, or an existing",
                "file older than its dependencies would always trigger a relink.",
            ],
        )?;
        for name in &names {
            writeln!(f, ".INTERMEDIATE: {name}")?;
        }
        writeln!(f)?;
        comment(f, &["Empty targets used when the real target is absent"])?;
        for name in &names {
            writeln!(f, "{name}:")?;
        }
        writeln!(f)
    }

    fn epilogue(&self, f: &mut Formatter<'_>) -> fmt::Result {
        comment(f, &["Make sure recursive makefiles get the linker"])?;
        writeln!(f, "export EXECUTABLE_LINKER")?;
        writeln!(f)?;
        comment(f, &["de facto target \"all\""])?;
        writeln!(f, "all: compile link")?;
        writeln!(f)?;
        if self.view.ledger.parallel() {
            comment(
                f,
                &[
                    "This makefile will run in parallel by default",
                    "but sequential processing can be forced",
                ],
            )?;
            writeln!(f, "ifdef FORCE_NOTPARALLEL")?;
            writeln!(f, ".NOTPARALLEL:")?;
            writeln!(f, "endif")?;
        } else {
            comment(
                f,
                &[
                    "This makefile will be processed sequentially",
                    "but parallel processing can be forced",
                ],
            )?;
            writeln!(f, "ifdef FORCE_NOTPARALLEL")?;
            writeln!(f, ".NOTPARALLEL:")?;
            writeln!(f, "endif")?;
            writeln!(f, "ifndef FORCE_PARALLEL")?;
            writeln!(f, ".NOTPARALLEL:")?;
            writeln!(f, "endif")?;
        }
        writeln!(f)
    }

    fn nested(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let references: Vec<&ScopeReference> = self
            .view
            .statements
            .iter()
            .filter_map(|statement| match statement {
                Statement::Subscope(reference) => Some(reference),
                _ => None,
            })
            .collect();
        if references.is_empty() {
            return Ok(());
        }
        let mut build_targets = Vec::new();
        let mut make_targets = Vec::new();
        for reference in references {
            let build = format!("build_{}", flatten(reference.descriptor.as_str()));
            match reference.nesting {
                Nesting::Inherit => {
                    comment(
                        f,
                        &[format!("targets to handle scope build for {}", reference.description).as_str()],
                    )?;
                    writeln!(f, "{build}:")?;
                    writeln!(f, "\t@$(MAKE) $(MAKECMDGOALS) -f {}", reference.descriptor)?;
                    writeln!(f)?;
                    make_targets.push(build.clone());
                }
                Nesting::Root | Nesting::Independent => {
                    let make = format!("make_{}", flatten(reference.descriptor.as_str()));
                    self.recursive(f, reference, &build, &make)?;
                    make_targets.push(make);
                }
            }
            build_targets.push(build);
        }
        comment(f, &["set up dependencies to build-targets"])?;
        writeln!(f, "nested_build_targets = {}", multiline(&build_targets))?;
        writeln!(f)?;
        for goal in FORWARDED_GOALS {
            writeln!(f, "{goal}: $(nested_build_targets)")?;
        }
        writeln!(f)?;
        writeln!(f, "nested_make_targets = {}", multiline(&make_targets))?;
        writeln!(f)?;
        writeln!(f, "make: $(nested_make_targets)")?;
        writeln!(f)
    }

    fn recursive(
        &self,
        f: &mut Formatter<'_>,
        reference: &ScopeReference,
        build: &str,
        make: &str,
    ) -> fmt::Result {
        let view = self.view;
        let description = &reference.description;
        let descriptor = &reference.descriptor;
        let directory = description.parent().map_or(".", Utf8Path::as_str);
        let regenerate = format!(
            "{} && {} --backend make --platform {} -f {description} generate",
            view.platform.change_directory(directory),
            view.config.generator,
            view.platform.family(),
        );
        let run = format!("$(MAKE) -C \"{directory}\" $(MAKECMDGOALS) -f {descriptor}");
        comment(f, &[format!("targets to handle recursive stuff for {description}").as_str()])?;
        writeln!(f, "{descriptor}: {description}")?;
        writeln!(f, "\t@echo generates makefile from {description}")?;
        writeln!(f, "\t@{regenerate}")?;
        writeln!(f)?;
        writeln!(f, "{build}: {descriptor}")?;
        writeln!(f, "\t@echo {description} $(MAKECMDGOALS)")?;
        writeln!(f, "\t@{run}")?;
        writeln!(f)?;
        writeln!(f, "{make}:")?;
        writeln!(f, "\t@echo generates makefile from {description}")?;
        writeln!(f, "\t@{regenerate}")?;
        writeln!(f, "\t@{run}")?;
        writeln!(f)
    }

    fn directories_and_clean(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let view = self.view;
        let platform = view.platform;
        for directory in view.ledger.paths_to_create() {
            writeln!(f, "{directory}:")?;
            writeln!(f, "\t{}", platform.make_directory(directory.as_str()))?;
            writeln!(f)?;
        }
        writeln!(f, "clean: clean_object clean_dependency clean_exe")?;
        writeln!(f, "clean_object:")?;
        for directory in view.ledger.clean_paths() {
            writeln!(f, "\t-{}", platform.remove(&format!("{directory}/*.o")))?;
        }
        writeln!(f, "clean_dependency:")?;
        for directory in view.ledger.clean_paths() {
            writeln!(f, "\t-{}", platform.remove(&format!("{directory}/*.d")))?;
        }
        writeln!(f, "clean_exe:")?;
        for file in view.ledger.files_to_remove() {
            writeln!(f, "\t-{}", platform.remove(file.as_str()))?;
        }
        Ok(())
    }
}

/// File names that stand in for an external library: the shared library
/// first, then the archive.
fn fallback_names(view: &FrameView<'_>, name: &str) -> Vec<String> {
    [TargetKind::SharedLibrary, TargetKind::Archive]
        .into_iter()
        .filter_map(|kind| library_file_name(view.platform, kind, name).ok())
        .collect()
}

impl Display for MakeFile<'_, '_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        self.prologue(f)?;
        self.unittest_library_path(f)?;
        for statement in self.view.statements {
            match statement {
                Statement::Compile(step) => Self::compile(f, step)?,
                Statement::Link(step) => self.link(f, step)?,
                Statement::Install(step) => self.install(f, step)?,
                Statement::Deploy(step) => Self::deploy(f, step)?,
                Statement::Alias { .. } | Statement::Subscope(_) => {}
            }
        }
        self.fallbacks(f)?;
        self.epilogue(f)?;
        self.nested(f)?;
        self.directories_and_clean(f)
    }
}
