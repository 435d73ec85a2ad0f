//! The YAML build-description format.
//!
//! A description lists search paths, prologue lines and an ordered list of
//! steps, each a single-key map naming the declaration:
//!
//! ```yaml
//! include_paths: [include, ../common/include]
//! steps:
//!   - build: common/makefile.yml
//!   - library: { name: bin/common, sources: [source/a.cpp], version: "2.3" }
//!   - executable: { name: bin/app, sources: [source/main.cpp], libraries: [common] }
//!   - install: { targets: [app, [common, lib]], destination: /opt/app }
//! ```
//!
//! Loading goes through a JSON value first: YAML errors carry a source span
//! while shape errors (unknown keys, malformed install entries) name the
//! offending description.
//!
//! ```rust
//! use cmk::description::{Description, Step};
//!
//! let yaml = "steps:\n  - archive: { name: bin/logic, sources: [a.cpp] }\n";
//! let description = Description::from_str_named(yaml, "makefile.yml").expect("parse");
//! assert!(matches!(description.steps.as_slice(), [Step::Archive(_)]));
//! ```

use std::fs;

use camino::{Utf8Path, Utf8PathBuf};
use miette::Diagnostic;
use serde::{Deserialize, Deserializer};
use thiserror::Error;

use crate::engine::{InstallTarget, ServerDefinition};
use crate::error::EngineError;

mod diagnostics;
mod run;

pub use run::{DEFAULT_DESCRIPTION, evaluate};

/// Errors raised while loading or evaluating a description.
#[derive(Debug, Error, Diagnostic)]
pub enum DescriptionError {
    /// The description file could not be read.
    #[error("failed to read {path}")]
    #[diagnostic(code(cmk::description::read))]
    Read {
        /// Description path.
        path: Utf8PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The description is not valid YAML.
    #[error("failed to parse {path}")]
    #[diagnostic(code(cmk::description::parse))]
    Parse {
        /// Description path.
        path: Utf8PathBuf,
        /// Diagnostic pointing at the offending text.
        #[source]
        #[diagnostic_source]
        source: Box<dyn Diagnostic + Send + Sync + 'static>,
    },

    /// The YAML is well formed but does not describe a build.
    #[error("invalid build description {path}")]
    #[diagnostic(
        code(cmk::description::structure),
        help("each step is a single-key map such as `- executable: {{ name: bin/app }}`")
    )]
    Structure {
        /// Description path.
        path: Utf8PathBuf,
        /// Shape error.
        #[source]
        source: serde_json::Error,
    },

    /// A step was rejected by the engine.
    #[error("in {path}")]
    #[diagnostic(code(cmk::description::declaration))]
    Declaration {
        /// Description path.
        path: Utf8PathBuf,
        /// Engine error raised by the step.
        #[source]
        #[diagnostic_source]
        source: EngineError,
    },
}

/// A parsed build description.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Description {
    /// Extra include search paths.
    #[serde(default)]
    pub include_paths: Vec<String>,
    /// Extra library search paths.
    #[serde(default)]
    pub library_paths: Vec<String>,
    /// Raw lines emitted at the top of the descriptor.
    #[serde(default)]
    pub pre_build: Vec<String>,
    /// Parallel execution mode, parallel when unset.
    pub parallel: Option<bool>,
    /// Declarations, in order.
    #[serde(default)]
    pub steps: Vec<Step>,
}

impl Description {
    /// Parse `yaml`, naming it `name` in diagnostics.
    ///
    /// # Errors
    ///
    /// Returns [`DescriptionError::Parse`] for invalid YAML and
    /// [`DescriptionError::Structure`] for a document of the wrong shape.
    pub fn from_str_named(yaml: &str, name: &str) -> Result<Self, DescriptionError> {
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        let document: serde_json::Value =
            serde_saphyr::from_str(yaml).map_err(|err| DescriptionError::Parse {
                path: Utf8PathBuf::from(name),
                source: diagnostics::map_yaml_error(err, yaml, name),
            })?;
        // A document holding only comments.
        if document.is_null() {
            return Ok(Self::default());
        }
        serde_json::from_value(document).map_err(|source| DescriptionError::Structure {
            path: Utf8PathBuf::from(name),
            source,
        })
    }

    /// Read and parse the description at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`DescriptionError::Read`] when the file cannot be read, and
    /// the errors of [`Description::from_str_named`].
    pub fn from_path(path: &Utf8Path) -> Result<Self, DescriptionError> {
        let text = fs::read_to_string(path).map_err(|source| DescriptionError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_str_named(&text, path.as_str())
    }
}

/// One declaration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    /// Evaluate another description in an independent scope.
    Build(String),
    /// Evaluate nested steps in a named inherit scope.
    Scope(NamedScope),
    /// Compile one source.
    Compile(CompileSpec),
    /// Link an executable.
    Executable(LinkSpec),
    /// Link a shared library.
    Library(LibrarySpec),
    /// Link a static archive.
    Archive(ArchiveSpec),
    /// Link a server.
    Server(ServerSpec),
    /// Link a unit-test binary.
    Unittest(LinkSpec),
    /// Install artifacts.
    Install(InstallSpec),
    /// Order one target after others.
    Dependencies(DependenciesSpec),
    /// Hand a linked target to the deploy script.
    Deploy(DeploySpec),
}

/// Steps evaluated in a named scope over the same description.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NamedScope {
    /// Scope name, used in the descriptor file name.
    pub name: String,
    /// Extra include search paths.
    #[serde(default)]
    pub include_paths: Vec<String>,
    /// Extra library search paths.
    #[serde(default)]
    pub library_paths: Vec<String>,
    /// Raw lines added after the inherited ones.
    #[serde(default)]
    pub pre_build: Vec<String>,
    /// Parallel execution mode.
    pub parallel: Option<bool>,
    /// Declarations, in order.
    #[serde(default)]
    pub steps: Vec<Step>,
}

/// A compile step.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CompileSpec {
    /// Source file.
    pub source: String,
    /// Object file, `obj/<stem>.o` when unset.
    pub object: Option<String>,
    /// Extra compiler flags.
    #[serde(default)]
    pub directive: String,
}

/// Executables and unit tests.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LinkSpec {
    /// Logical name, e.g. `bin/app`.
    pub name: String,
    /// Sources compiled with default object names.
    #[serde(default)]
    pub sources: Vec<String>,
    /// Objects compiled elsewhere.
    #[serde(default)]
    pub objects: Vec<String>,
    /// Libraries linked against, by short name.
    #[serde(default)]
    pub libraries: Vec<String>,
    /// Extra compiler flags for `sources`.
    #[serde(default)]
    pub directive: String,
}

/// A shared library.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LibrarySpec {
    /// Logical name, e.g. `bin/common`.
    pub name: String,
    /// Sources compiled with default object names.
    #[serde(default)]
    pub sources: Vec<String>,
    /// Objects compiled elsewhere.
    #[serde(default)]
    pub objects: Vec<String>,
    /// Libraries linked against, by short name.
    #[serde(default)]
    pub libraries: Vec<String>,
    /// Extra compiler flags for `sources`.
    #[serde(default)]
    pub directive: String,
    /// `MAJOR.MINOR` version enabling the SONAME chain.
    #[serde(default, deserialize_with = "version_text")]
    pub version: Option<String>,
}

/// A static archive.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ArchiveSpec {
    /// Logical name, e.g. `bin/logic`.
    pub name: String,
    /// Sources compiled with default object names.
    #[serde(default)]
    pub sources: Vec<String>,
    /// Objects compiled elsewhere.
    #[serde(default)]
    pub objects: Vec<String>,
    /// Extra compiler flags for `sources`.
    #[serde(default)]
    pub directive: String,
}

/// A server.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerSpec {
    /// Logical name, e.g. `bin/casual-broker`.
    pub name: String,
    /// Sources compiled with default object names.
    #[serde(default)]
    pub sources: Vec<String>,
    /// Objects compiled elsewhere.
    #[serde(default)]
    pub objects: Vec<String>,
    /// Libraries linked against, by short name.
    #[serde(default)]
    pub libraries: Vec<String>,
    /// Extra compiler flags for `sources`.
    #[serde(default)]
    pub directive: String,
    /// Definition file or list of services.
    pub definition: DefinitionSpec,
    /// Resource keys.
    #[serde(default)]
    pub resources: Vec<String>,
    /// Resource properties file.
    pub configuration: Option<String>,
}

/// A server definition file or its services.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum DefinitionSpec {
    /// Path to a definition file.
    File(String),
    /// Service names.
    Services(Vec<String>),
}

impl From<&DefinitionSpec> for ServerDefinition {
    fn from(spec: &DefinitionSpec) -> Self {
        match spec {
            DefinitionSpec::File(path) => Self::File(Utf8PathBuf::from(path)),
            DefinitionSpec::Services(services) => Self::Services(services.clone()),
        }
    }
}

/// An install step.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InstallSpec {
    /// What to install.
    pub targets: Vec<InstallEntry>,
    /// Destination directory.
    pub destination: String,
}

/// One entry of [`InstallSpec::targets`].
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum InstallEntry {
    /// A target or file.
    Single(String),
    /// `[target, subdirectory]`.
    Relocated(String, String),
}

impl From<&InstallEntry> for InstallTarget {
    fn from(entry: &InstallEntry) -> Self {
        match entry {
            InstallEntry::Single(name) => Self::Single(name.clone()),
            InstallEntry::Relocated(target, subdirectory) => Self::Relocated {
                target: target.clone(),
                subdirectory: subdirectory.clone(),
            },
        }
    }
}

/// Order-only prerequisites of a declared target.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DependenciesSpec {
    /// Declared target, by logical name or alias.
    pub target: String,
    /// Targets or libraries it waits for.
    pub prerequisites: Vec<String>,
}

/// A deployment of a target linked in the same scope.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DeploySpec {
    /// Linked target, by logical name or alias.
    pub target: String,
    /// Argument passed to the deploy script.
    #[serde(default)]
    pub directive: String,
}

/// Accept versions written as strings or bare numbers.
fn version_text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    match value {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(serde_json::Value::String(text)) => Ok(Some(text)),
        Some(serde_json::Value::Number(number)) => Ok(Some(number.to_string())),
        Some(other) => Err(serde::de::Error::custom(format!(
            "expected a MAJOR.MINOR version, found {other}"
        ))),
    }
}
