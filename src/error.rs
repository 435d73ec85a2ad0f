//! Error types raised by the build-description engine.
//!
//! Every failure is fatal at the point it is detected: configuration errors
//! abort before any scope opens, declaration errors abort the declaration
//! that triggered them, and I/O errors abort the commit of staged
//! descriptors.

use camino::Utf8PathBuf;
use miette::Diagnostic;
use thiserror::Error;

use crate::target::TargetKind;

/// Convenience alias for results produced by the engine.
pub type EngineResult<T> = Result<T, EngineError>;

/// Errors raised while declaring, finalizing, or emitting build scopes.
#[derive(Debug, Error, Diagnostic)]
pub enum EngineError {
    /// The build home environment variable is not set.
    #[error("{var} is not set")]
    #[diagnostic(
        code(cmk::config::missing_build_home),
        help("export {var} to the directory holding the shared make/ rule files")
    )]
    MissingBuildHome {
        /// Name of the missing variable.
        var: &'static str,
    },

    /// The platform override names a family the engine does not know.
    #[error("unsupported platform '{name}'")]
    #[diagnostic(
        code(cmk::config::unsupported_platform),
        help("use 'linux' or 'darwin'")
    )]
    UnsupportedPlatform {
        /// Value supplied by the caller.
        name: String,
    },

    /// A path handed to the engine is not valid UTF-8.
    #[error("path is not valid UTF-8: {path}")]
    #[diagnostic(code(cmk::config::non_utf8_path))]
    NonUtf8Path {
        /// Lossy rendering of the offending path.
        path: String,
    },

    /// The working directory needed to resolve a relative description is
    /// unavailable.
    #[error("cannot determine the working directory")]
    #[diagnostic(code(cmk::config::working_directory))]
    WorkingDirectory {
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Library or archive naming was requested for a kind that has none.
    #[error("{kind} targets have no {naming} name")]
    #[diagnostic(code(cmk::target::unsupported_naming))]
    UnsupportedNaming {
        /// Kind that was passed in.
        kind: TargetKind,
        /// Naming scheme that was requested.
        naming: &'static str,
    },

    /// A shared-library version is not of the form `MAJOR.MINOR`.
    #[error("invalid library version '{version}', expected MAJOR.MINOR")]
    #[diagnostic(code(cmk::target::invalid_version))]
    InvalidVersion {
        /// Text that failed to parse.
        version: String,
    },

    /// A target name is empty or ends in a path separator.
    #[error("invalid target name '{name}'")]
    #[diagnostic(code(cmk::target::invalid_name))]
    InvalidTargetName {
        /// Name that was rejected.
        name: String,
    },

    /// The same logical name was declared twice with different kinds.
    #[error("target '{name}' already declared as {existing}, cannot redeclare as {requested}")]
    #[diagnostic(code(cmk::declare::conflicting_target))]
    ConflictingTarget {
        /// Logical target name.
        name: String,
        /// Kind of the first declaration.
        existing: TargetKind,
        /// Kind of the rejected declaration.
        requested: TargetKind,
    },

    /// The same logical name was declared twice with the same kind.
    #[error("{kind} target '{name}' declared twice in {description}")]
    #[diagnostic(code(cmk::declare::duplicate_target))]
    DuplicateTarget {
        /// Logical target name.
        name: String,
        /// Kind of both declarations.
        kind: TargetKind,
        /// Description file that owns the scope.
        description: Utf8PathBuf,
    },

    /// An output path is already produced by another statement.
    #[error("output {path} is produced by more than one statement")]
    #[diagnostic(code(cmk::declare::duplicate_output))]
    DuplicateOutput {
        /// Output claimed twice.
        path: Utf8PathBuf,
    },

    /// A dependency declaration names a target the scope does not know.
    #[error("unknown target '{name}' in {description}")]
    #[diagnostic(code(cmk::declare::unknown_target))]
    UnknownTarget {
        /// Name that could not be resolved.
        name: String,
        /// Description file that owns the scope.
        description: Utf8PathBuf,
    },

    /// A declaration was made against a scope that is no longer open.
    #[error("scope for {description} is closed")]
    #[diagnostic(code(cmk::scope::closed))]
    ScopeClosed {
        /// Description file of the closed scope.
        description: Utf8PathBuf,
    },

    /// A nested build would re-enter a description that is still open.
    #[error("recursive build: {}", chain.iter().map(ToString::to_string).collect::<Vec<_>>().join(" -> "))]
    #[diagnostic(code(cmk::scope::recursive_build))]
    RecursiveBuild {
        /// Descriptions from the re-entered frame to the offending request.
        chain: Vec<Utf8PathBuf>,
    },

    /// The declared targets of one scope depend on each other in a loop.
    #[error("circular dependency: {}", cycle.iter().map(ToString::to_string).collect::<Vec<_>>().join(" -> "))]
    #[diagnostic(code(cmk::scope::circular_dependency))]
    CircularDependency {
        /// Nodes forming the cycle, first node repeated at the end.
        cycle: Vec<Utf8PathBuf>,
    },

    /// An earlier scope failed or was abandoned, so nothing was written.
    #[error("evaluation failed, no descriptors were written")]
    #[diagnostic(code(cmk::scope::evaluation_failed))]
    EvaluationFailed {
        /// First failure recorded while finalizing a dropped scope.
        #[source]
        source: Option<Box<EngineError>>,
    },

    /// Writing a descriptor failed.
    #[error("failed to write {path}")]
    #[diagnostic(code(cmk::sink::write))]
    Write {
        /// Descriptor path.
        path: Utf8PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}
