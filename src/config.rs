//! Engine configuration.
//!
//! Configuration is read from the environment through [`mockable::Env`] so
//! tests can supply their own variables, then adjusted by command-line
//! overrides.

use camino::{Utf8Path, Utf8PathBuf};
use cmk_env::{BUILD_HOME_ENV, PLATFORM_ENV};
use mockable::Env;

use crate::backend::BackendKind;
use crate::error::{EngineError, EngineResult};
use crate::platform::PlatformFamily;

/// Program invoked by generated makefiles to regenerate stale descriptors.
pub const DEFAULT_GENERATOR: &str = "cmk";

/// Unit-test framework linked into every unit-test binary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnittestConfig {
    /// Libraries appended to each unit-test link, in order.
    pub libraries: Vec<String>,
    /// Library search path of the framework.
    pub library_path: Utf8PathBuf,
    /// Header search path of the framework.
    pub include_path: Utf8PathBuf,
}

impl UnittestConfig {
    /// The bundled `gtest` layout under `build_home`.
    #[must_use]
    pub fn under(build_home: &Utf8Path) -> Self {
        let root = build_home.join("thirdparty").join("unittest").join("gtest");
        Self {
            libraries: vec!["gtest".to_owned(), "gtest_main".to_owned()],
            library_path: root.join("bin"),
            include_path: root.join("include"),
        }
    }
}

/// Settings shared by every scope of one evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Root of the shared platform rule files.
    pub build_home: Utf8PathBuf,
    /// Platform whose naming and flags are used.
    pub platform: PlatformFamily,
    /// Descriptor format to emit.
    pub backend: BackendKind,
    /// Unit-test framework settings.
    pub unittest: UnittestConfig,
    /// Program generated makefiles call to regenerate themselves.
    pub generator: String,
}

impl EngineConfig {
    /// Configuration with host defaults rooted at `build_home`.
    #[must_use]
    pub fn new(home: impl Into<Utf8PathBuf>) -> Self {
        let build_home = home.into();
        Self {
            unittest: UnittestConfig::under(&build_home),
            build_home,
            platform: PlatformFamily::host(),
            backend: BackendKind::Ninja,
            generator: DEFAULT_GENERATOR.to_owned(),
        }
    }

    /// Read configuration from `env`.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::MissingBuildHome`] when the build home variable
    /// is unset or empty, and [`EngineError::UnsupportedPlatform`] for an
    /// unknown platform override.
    pub fn from_env(env: &impl Env) -> EngineResult<Self> {
        let home = env
            .raw(BUILD_HOME_ENV)
            .ok()
            .filter(|value| !value.trim().is_empty())
            .ok_or(EngineError::MissingBuildHome {
                var: BUILD_HOME_ENV,
            })?;
        let mut config = Self::new(home);
        if let Ok(name) = env.raw(PLATFORM_ENV) {
            config.platform = name.parse()?;
        }
        tracing::debug!(
            build_home = %config.build_home,
            platform = %config.platform,
            "loaded engine configuration"
        );
        Ok(config)
    }

    /// Replace the backend.
    #[must_use]
    pub const fn with_backend(mut self, backend: BackendKind) -> Self {
        self.backend = backend;
        self
    }

    /// Replace the platform.
    #[must_use]
    pub const fn with_platform(mut self, platform: PlatformFamily) -> Self {
        self.platform = platform;
        self
    }

    /// Replace the regeneration program.
    #[must_use]
    pub fn with_generator(mut self, generator: impl Into<String>) -> Self {
        self.generator = generator.into();
        self
    }
}
