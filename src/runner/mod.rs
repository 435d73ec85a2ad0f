//! CLI execution and command dispatch logic.
//!
//! This module keeps `main` minimal by providing a single entry point that
//! turns the parsed [`Cli`] into an [`EngineConfig`], evaluates the build
//! description and either writes the descriptors or prints them.

use std::io::{self, Write};

use anyhow::{Context, Result, anyhow};
use camino::Utf8PathBuf;
use mockable::{DefaultEnv, Env};
use tracing::debug;

use crate::cli::{Cli, Commands};
use crate::config::EngineConfig;
use crate::description::evaluate;
use crate::engine::Engine;
use crate::sink::{FileSink, MemorySink};

/// Execute the parsed [`Cli`] command against the process environment.
///
/// # Errors
///
/// Returns an error if configuration is incomplete, the description cannot
/// be evaluated or the descriptors cannot be written.
pub fn run(cli: &Cli) -> Result<()> {
    let stdout = io::stdout();
    run_with(cli, &DefaultEnv::new(), &mut stdout.lock())
}

/// Execute `cli` reading configuration from `env` and printing to `out`.
///
/// # Errors
///
/// As [`run`].
pub fn run_with(cli: &Cli, env: &impl Env, out: &mut impl Write) -> Result<()> {
    let config = configure(cli, env)?;
    let description = description_path(cli)?;
    debug!(description = %description, backend = %config.backend, "evaluating description");
    match cli.command.unwrap_or(Commands::Generate) {
        Commands::Generate => {
            let mut engine = Engine::new(config, FileSink);
            evaluate(&mut engine, &description)
                .with_context(|| format!("generating descriptors for {description}"))?;
        }
        Commands::Show => {
            let mut engine = Engine::new(config, MemorySink::new());
            evaluate(&mut engine, &description)
                .with_context(|| format!("generating descriptors for {description}"))?;
            show(engine.sink(), out).context("writing descriptors to stdout")?;
        }
    }
    Ok(())
}

/// Environment configuration with command-line overrides applied.
fn configure(cli: &Cli, env: &impl Env) -> Result<EngineConfig> {
    let mut config = EngineConfig::from_env(env)
        .context("reading configuration")?
        .with_backend(cli.backend);
    if let Some(platform) = cli.platform {
        config = config.with_platform(platform);
    }
    if let Some(generator) = &cli.generator {
        config = config.with_generator(generator.as_str());
    }
    Ok(config)
}

fn description_path(cli: &Cli) -> Result<Utf8PathBuf> {
    let path = cli
        .directory
        .as_ref()
        .map_or_else(|| cli.file.clone(), |dir| dir.join(&cli.file));
    Utf8PathBuf::from_path_buf(path)
        .map_err(|invalid| anyhow!("description path {} is not valid UTF-8", invalid.display()))
}

fn show(sink: &MemorySink, out: &mut impl Write) -> io::Result<()> {
    for (path, content) in sink.iter() {
        writeln!(out, "# {path}")?;
        out.write_all(content.as_bytes())?;
        if !content.ends_with('\n') {
            writeln!(out)?;
        }
    }
    out.flush()
}
