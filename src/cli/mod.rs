//! Command line interface definition using clap.
//!
//! This module defines the [`Cli`] structure and its subcommands.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::backend::BackendKind;
use crate::description::DEFAULT_DESCRIPTION;
use crate::platform::PlatformFamily;

fn parse_platform(s: &str) -> Result<PlatformFamily, String> {
    s.parse().map_err(|err: crate::error::EngineError| err.to_string())
}

/// Generate Ninja or Make descriptors from YAML build descriptions.
#[derive(Debug, Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Build description to evaluate.
    #[arg(short, long, value_name = "FILE", default_value = DEFAULT_DESCRIPTION)]
    pub file: PathBuf,

    /// Change to this directory before doing anything.
    #[arg(short = 'C', long, value_name = "DIR")]
    pub directory: Option<PathBuf>,

    /// Descriptor format to generate.
    #[arg(long, value_enum, default_value_t = BackendKind::Ninja)]
    pub backend: BackendKind,

    /// Platform family whose naming and flags are used.
    ///
    /// Overrides `CMK_PLATFORM` and the host platform.
    #[arg(long, value_name = "FAMILY", value_parser = parse_platform)]
    pub platform: Option<PlatformFamily>,

    /// Program generated makefiles run to regenerate themselves.
    #[arg(long, value_name = "PROGRAM")]
    pub generator: Option<String>,

    /// Enable verbose logging output.
    #[arg(short, long)]
    pub verbose: bool,

    /// Optional subcommand to execute; defaults to `generate` when omitted.
    #[command(subcommand)]
    pub command: Option<Commands>,
}

impl Cli {
    /// Apply the default command if none was specified.
    #[must_use]
    pub fn with_default_command(mut self) -> Self {
        if self.command.is_none() {
            self.command = Some(Commands::Generate);
        }
        self
    }
}

/// Available top-level commands.
#[derive(Debug, Subcommand, PartialEq, Eq, Clone, Copy)]
pub enum Commands {
    /// Write the descriptors next to their descriptions.
    Generate,

    /// Print the descriptors instead of writing them.
    Show,
}
