//! Mocked environments for configuration tests.

use std::env::VarError;

use cmk_env::{BUILD_HOME_ENV, PLATFORM_ENV};
use mockable::MockEnv;

/// A `MockEnv` exposing `home` as the build home and, optionally, a
/// platform override. Every other variable is unset.
///
/// # Examples
///
/// ```
/// use mockable::Env;
/// use test_support::env::build_home_env;
///
/// let env = build_home_env("/opt/cmk", Some("linux"));
/// assert_eq!(env.raw("CMK_BUILD_HOME").ok().as_deref(), Some("/opt/cmk"));
/// assert!(env.raw("HOME").is_err());
/// ```
pub fn build_home_env(home: &str, platform: Option<&str>) -> MockEnv {
    let home_value = home.to_owned();
    let platform_value = platform.map(str::to_owned);
    let mut env = MockEnv::new();
    env.expect_raw().returning(move |key| {
        let value = match key {
            k if k == BUILD_HOME_ENV => Some(home_value.clone()),
            k if k == PLATFORM_ENV => platform_value.clone(),
            _ => None,
        };
        value.ok_or(VarError::NotPresent)
    });
    env
}
