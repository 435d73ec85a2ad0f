//! Test utilities shared by the cmk integration tests.
//!
//! Provides mocked and real environment helpers for the build-home
//! variables and a writer for temporary projects made of build
//! descriptions.

pub mod env;
pub mod project;
pub mod scoped_env;

pub use project::Project;
pub use scoped_env::ScopedEnv;
