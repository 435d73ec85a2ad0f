//! Backend-agnostic statements recorded by each scope.
//!
//! Declarations append [`Statement`]s in the order they are made; the
//! backends render them verbatim at finalization. Nothing in this module
//! carries Ninja or Make syntax.
//!
//! # Examples
//!
//! ```
//! use camino::Utf8PathBuf;
//! use cmk::ir::{CompileStep, Statement};
//!
//! let step = Statement::Compile(CompileStep {
//!     source: Utf8PathBuf::from("/p/a.cpp"),
//!     object: Utf8PathBuf::from("/p/obj/a.o"),
//!     include_directive: "-I /p/include".into(),
//!     directive: String::new(),
//! });
//! assert_eq!(step.outputs(), vec![Utf8PathBuf::from("/p/obj/a.o")]);
//! ```

use std::collections::HashMap;

use camino::{Utf8Path, Utf8PathBuf};
use indexmap::{IndexMap, IndexSet};

use crate::target::{SonameChain, Symlink, Target};

mod cycle;

pub(crate) use cycle::find_cycle;

/// How a nested scope relates to the scope that opened it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Nesting {
    /// A top-level scope opened directly on the engine.
    Root,
    /// A separate description with a fresh ledger and search paths.
    Independent,
    /// A named sub-scope that starts from its parent's pre-build statements
    /// and search paths.
    Inherit,
}

/// Compile one translation unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileStep {
    /// Absolute source path.
    pub source: Utf8PathBuf,
    /// Absolute object path.
    pub object: Utf8PathBuf,
    /// Resolved `-I` flags of the declaring scope.
    pub include_directive: String,
    /// Extra flags for this translation unit only.
    pub directive: String,
}

/// Link objects into an executable, library, archive, server or unit test.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkStep {
    /// The artifact produced.
    pub target: Target,
    /// Absolute object paths.
    pub objects: Vec<Utf8PathBuf>,
    /// Short library names, resolved against aliases at render time.
    pub libraries: Vec<String>,
    /// Resolved `-L` flags of the declaring scope.
    pub library_directive: String,
    /// Absolute library search paths behind `library_directive`.
    pub library_paths: Vec<Utf8PathBuf>,
    /// Resolved `-I` flags, for link steps that also generate code.
    pub include_directive: Option<String>,
    /// Opaque directive handed to the server generator.
    pub server_directive: Option<String>,
    /// Linker flags recording the SONAME of a versioned library.
    pub soname_directive: Option<String>,
}

impl LinkStep {
    /// SONAME chain to create after linking, for versioned libraries.
    #[must_use]
    pub fn soname_chain(&self) -> Option<SonameChain> {
        self.target.soname_chain()
    }
}

/// Copy one artifact into a destination directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallStep {
    /// Logical name of what is installed, used to name rule targets.
    pub name: String,
    /// File copied.
    pub source: Utf8PathBuf,
    /// Directory copied into.
    pub destination: Utf8PathBuf,
    /// Resulting file.
    pub installed: Utf8PathBuf,
    /// SONAME chain recreated in `destination`.
    pub soname: Option<SonameChain>,
}

/// Hand a linked artifact to the deploy script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeployStep {
    /// Target deployed.
    pub target: Target,
    /// Opaque argument passed to the deploy script.
    pub directive: String,
}

impl DeployStep {
    /// Phony goal that runs this deployment, such as `deploy_target_bin_app`.
    #[must_use]
    pub fn goal(&self) -> String {
        format!(
            "deploy_target_{}",
            self.target.name().trim_start_matches('/').replace('/', "_")
        )
    }
}

/// Reference from a scope to the descriptor of a nested scope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScopeReference {
    /// Description evaluated by the nested scope.
    pub description: Utf8PathBuf,
    /// Descriptor file the nested scope writes.
    pub descriptor: Utf8PathBuf,
    /// Relationship to the referencing scope.
    pub nesting: Nesting,
}

/// One declaration recorded by a scope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Statement {
    /// A compile step.
    Compile(CompileStep),
    /// A link step.
    Link(LinkStep),
    /// A short alias for a library built by this scope.
    Alias {
        /// Alias other declarations depend on.
        alias: String,
        /// Target the alias stands for.
        target: Target,
    },
    /// An install step.
    Install(InstallStep),
    /// A deployment of a linked target.
    Deploy(DeployStep),
    /// A nested scope's descriptor.
    Subscope(ScopeReference),
}

impl Statement {
    /// Files this statement produces.
    #[must_use]
    pub fn outputs(&self) -> Vec<Utf8PathBuf> {
        match self {
            Self::Compile(step) => vec![step.object.clone()],
            Self::Link(step) => {
                let mut outs = vec![step.target.path().to_path_buf()];
                if let Some(chain) = step.soname_chain() {
                    outs.extend(chain.links().into_iter().map(|link| link.link));
                }
                outs
            }
            Self::Install(step) => {
                let mut outs = vec![step.installed.clone()];
                if let Some(chain) = &step.soname {
                    outs.extend(chain.links().into_iter().map(|link| link.link));
                }
                outs
            }
            Self::Alias { .. } | Self::Deploy(_) | Self::Subscope(_) => Vec::new(),
        }
    }
}

/// Extra order-only prerequisites attached to declared targets.
pub type OrderOnly = IndexMap<Utf8PathBuf, IndexSet<Utf8PathBuf>>;

/// Dependency edges of a scope's statements, keyed by output.
///
/// `resolve` maps a short library name to the path it stands for when the
/// library is built in view of this scope.
pub(crate) fn dependency_edges(
    statements: &[Statement],
    order_only: &OrderOnly,
    resolve: impl Fn(&str) -> Option<Utf8PathBuf>,
) -> HashMap<Utf8PathBuf, Vec<Utf8PathBuf>> {
    let mut edges: HashMap<Utf8PathBuf, Vec<Utf8PathBuf>> = HashMap::new();
    let mut add = |out: &Utf8Path, input: Utf8PathBuf| {
        edges.entry(out.to_path_buf()).or_default().push(input);
    };
    for statement in statements {
        match statement {
            Statement::Compile(step) => add(&step.object, step.source.clone()),
            Statement::Link(step) => {
                let out = step.target.path();
                for object in &step.objects {
                    add(out, object.clone());
                }
                for library in step.libraries.iter().filter_map(|l| resolve(l)) {
                    add(out, library);
                }
                let chain = step.soname_chain();
                for Symlink { link, target } in chain.iter().flat_map(SonameChain::links) {
                    add(&link, target);
                }
            }
            Statement::Install(step) => add(&step.installed, step.source.clone()),
            Statement::Alias { .. } | Statement::Deploy(_) | Statement::Subscope(_) => {}
        }
    }
    for (target, prerequisites) in order_only {
        for prerequisite in prerequisites {
            add(target, prerequisite.clone());
        }
    }
    edges
}
