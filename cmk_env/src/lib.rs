#![forbid(unsafe_code)]

//! Names of the environment variables `cmk` reads.
//!
//! Kept apart from the main crate so integration tests can set the same
//! variables the binary looks up.

/// Root of the shared rule files (`make/ninja`, `make/platform`).
///
/// Generation fails when it is unset.
///
/// ```
/// assert_eq!(cmk_env::BUILD_HOME_ENV, "CMK_BUILD_HOME");
/// ```
pub const BUILD_HOME_ENV: &str = "CMK_BUILD_HOME";

/// Platform family to generate for, `linux` or `darwin`. Defaults to the
/// host.
pub const PLATFORM_ENV: &str = "CMK_PLATFORM";
