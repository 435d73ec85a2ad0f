//! cmk core library.
//!
//! Build descriptions declare compiles, links, installs and nested
//! sub-projects through [`engine::Scope`] handles. The [`engine::Engine`]
//! accumulates the declarations of each scope in a [`ledger::BuildState`]
//! and a list of [`ir::Statement`]s, and renders every scope into a Ninja or
//! GNU Make descriptor through a [`backend::Backend`] once it is released.
//!
//! ```
//! use cmk::backend::BackendKind;
//! use cmk::config::EngineConfig;
//! use cmk::engine::Engine;
//! use cmk::platform::PlatformFamily;
//! use cmk::sink::MemorySink;
//!
//! let config = EngineConfig::new("/opt/cmk")
//!     .with_backend(BackendKind::Ninja)
//!     .with_platform(PlatformFamily::Linux);
//! let mut engine = Engine::new(config, MemorySink::new());
//! let mut scope = engine.open("/work/app/makefile.yml").expect("open");
//! let object = scope.compile("source/main.cpp", None, "").expect("compile");
//! scope.link_executable("bin/app", &[object], &["common"]).expect("link");
//! scope.finish().expect("finalize");
//! let ninja = engine.sink().get("/work/app/build.ninja").expect("descriptor");
//! assert!(ninja.contains("build /work/app/bin/app: linkexecutable /work/app/obj/source/main.o"));
//! assert!(ninja.contains("build common: phony"));
//! ```

pub mod backend;
pub mod cli;
pub mod config;
pub mod description;
pub mod directive;
pub mod engine;
pub mod error;
pub mod ir;
pub mod ledger;
pub mod platform;
pub mod runner;
pub mod sink;
pub mod target;
