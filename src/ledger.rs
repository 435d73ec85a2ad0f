//! The per-scope build state ledger.
//!
//! A [`BuildState`] accumulates everything a scope's declarations register.
//! All collections are insertion-ordered sets so duplicate registration is
//! harmless and emission order is reproducible. The ledger alone is enough to
//! rebuild the `compile`, `link`, `test`, `install`, `deploy` and `all`
//! aggregates and the fallback targets for libraries referenced but never
//! built.

use camino::{Utf8Path, Utf8PathBuf};
use indexmap::{IndexMap, IndexSet};

use crate::target::Target;

/// Accumulated declarations of a single scope.
#[derive(Debug, Clone, Default)]
pub struct BuildState {
    compile_outputs: IndexSet<Utf8PathBuf>,
    link_outputs: IndexSet<Utf8PathBuf>,
    test_outputs: IndexSet<Utf8PathBuf>,
    install_outputs: IndexSet<Utf8PathBuf>,
    deploy_goals: IndexSet<String>,
    phony_dependencies: IndexSet<String>,
    aliases: IndexMap<String, Target>,
    clean_paths: IndexSet<Utf8PathBuf>,
    files_to_remove: IndexSet<Utf8PathBuf>,
    paths_to_create: IndexSet<Utf8PathBuf>,
    pre_build_statements: Vec<String>,
    parallel: Option<bool>,
}

impl BuildState {
    /// A fresh ledger for an independent scope.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A ledger for an inheriting scope: carries over the parent's pre-build
    /// statements and nothing else.
    #[must_use]
    pub fn inherit(parent: &Self) -> Self {
        Self {
            pre_build_statements: parent.pre_build_statements.clone(),
            ..Self::default()
        }
    }

    /// Record an object file produced by a compile step.
    pub fn register_compile(&mut self, output: impl Into<Utf8PathBuf>) {
        self.compile_outputs.insert(output.into());
    }

    /// Record an artifact produced by a link step.
    pub fn register_link(&mut self, output: impl Into<Utf8PathBuf>) {
        self.link_outputs.insert(output.into());
    }

    /// Record a unit-test binary.
    pub fn register_test(&mut self, output: impl Into<Utf8PathBuf>) {
        self.test_outputs.insert(output.into());
    }

    /// Record an installed file.
    pub fn register_install(&mut self, output: impl Into<Utf8PathBuf>) {
        self.install_outputs.insert(output.into());
    }

    /// Record the phony goal of a deployment.
    pub fn register_deploy(&mut self, goal: impl Into<String>) {
        self.deploy_goals.insert(goal.into());
    }

    /// Record a library referenced as a dependency, built here or not.
    pub fn register_phony_dependency(&mut self, name: impl Into<String>) {
        self.phony_dependencies.insert(name.into());
    }

    /// Map a short library alias to the target that builds it.
    pub fn register_alias(&mut self, alias: impl Into<String>, target: Target) {
        self.aliases.insert(alias.into(), target);
    }

    /// Record an object directory whose contents `clean` removes.
    pub fn register_clean_path(&mut self, directory: impl Into<Utf8PathBuf>) {
        self.clean_paths.insert(directory.into());
    }

    /// Record a generated file `clean` removes.
    pub fn register_file_for_removal(&mut self, path: impl Into<Utf8PathBuf>) {
        self.files_to_remove.insert(path.into());
    }

    /// Record a directory that must exist before artifacts are written.
    pub fn register_path_for_creation(&mut self, directory: impl Into<Utf8PathBuf>) {
        self.paths_to_create.insert(directory.into());
    }

    /// Queue a raw statement emitted at the top of the descriptor.
    pub fn add_pre_build_statement(&mut self, statement: impl Into<String>) {
        self.pre_build_statements.push(statement.into());
    }

    /// Choose parallel or sequential execution. The first choice sticks.
    pub fn set_parallel(&mut self, parallel: bool) {
        self.parallel.get_or_insert(parallel);
    }

    /// Whether the descriptor may run in parallel. Defaults to `true`.
    #[must_use]
    pub fn parallel(&self) -> bool {
        self.parallel.unwrap_or(true)
    }

    /// Object files, in registration order.
    #[must_use]
    pub const fn compile_outputs(&self) -> &IndexSet<Utf8PathBuf> {
        &self.compile_outputs
    }

    /// Link artifacts, in registration order.
    #[must_use]
    pub const fn link_outputs(&self) -> &IndexSet<Utf8PathBuf> {
        &self.link_outputs
    }

    /// Unit-test binaries, in registration order.
    #[must_use]
    pub const fn test_outputs(&self) -> &IndexSet<Utf8PathBuf> {
        &self.test_outputs
    }

    /// Installed files, in registration order.
    #[must_use]
    pub const fn install_outputs(&self) -> &IndexSet<Utf8PathBuf> {
        &self.install_outputs
    }

    /// Phony goals of the deployments, in declaration order.
    #[must_use]
    pub const fn deploy_goals(&self) -> &IndexSet<String> {
        &self.deploy_goals
    }

    /// Every library referenced as a dependency.
    #[must_use]
    pub const fn phony_dependencies(&self) -> &IndexSet<String> {
        &self.phony_dependencies
    }

    /// Library aliases known to this ledger.
    #[must_use]
    pub const fn aliases(&self) -> &IndexMap<String, Target> {
        &self.aliases
    }

    /// Target built for `alias`, if any.
    #[must_use]
    pub fn alias(&self, alias: &str) -> Option<&Target> {
        self.aliases.get(alias)
    }

    /// Object directories to clean.
    #[must_use]
    pub const fn clean_paths(&self) -> &IndexSet<Utf8PathBuf> {
        &self.clean_paths
    }

    /// Files to remove on clean.
    #[must_use]
    pub const fn files_to_remove(&self) -> &IndexSet<Utf8PathBuf> {
        &self.files_to_remove
    }

    /// Directories to create.
    #[must_use]
    pub const fn paths_to_create(&self) -> &IndexSet<Utf8PathBuf> {
        &self.paths_to_create
    }

    /// Raw prologue statements.
    #[must_use]
    pub fn pre_build_statements(&self) -> &[String] {
        &self.pre_build_statements
    }

    /// Libraries that need a no-op fallback target: referenced as a
    /// dependency but never aliased here. Each appears once.
    pub fn fallback_libraries(&self) -> impl Iterator<Item = &str> {
        self.phony_dependencies
            .iter()
            .filter(|name| !self.aliases.contains_key(name.as_str()))
            .map(String::as_str)
    }

    /// Whether `path` is produced by a link step of this ledger.
    #[must_use]
    pub fn links(&self, path: &Utf8Path) -> bool {
        self.link_outputs.contains(path)
    }

    /// Merge a finalized child's graph-wide records into this ledger.
    ///
    /// Used by backends whose descriptors share one target namespace, where
    /// the aggregates and fallbacks of the whole tree are emitted once by the
    /// primary scope.
    pub fn absorb(&mut self, child: &Self) {
        self.compile_outputs.extend(child.compile_outputs.iter().cloned());
        self.link_outputs.extend(child.link_outputs.iter().cloned());
        self.test_outputs.extend(child.test_outputs.iter().cloned());
        self.install_outputs.extend(child.install_outputs.iter().cloned());
        self.deploy_goals.extend(child.deploy_goals.iter().cloned());
        self.phony_dependencies
            .extend(child.phony_dependencies.iter().cloned());
        for (alias, target) in &child.aliases {
            self.aliases
                .entry(alias.clone())
                .or_insert_with(|| target.clone());
        }
        self.paths_to_create
            .extend(child.paths_to_create.iter().cloned());
    }
}
