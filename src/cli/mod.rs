//! Command-line interface

pub mod commands;
pub mod output;

use clap::{Parser, Subcommand};
use commands::{LaunchCommand, ListCommand, RegisterCommand, RunStepCommand, StatusCommand, TerminateCommand};

/// Cluster launch tool built around registered templates
#[derive(Debug, Parser, Clone)]
#[command(name = "launchpad")]
#[command(version = "0.1.0")]
#[command(about = "Assemble, override, and launch clusters from registered templates", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Keep the registry in memory instead of the on-disk database
    #[arg(long, global = true)]
    pub ephemeral: bool,
}

/// Available commands
#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Register a template file (profile, configuration, or launch function)
    Register(RegisterCommand),

    /// Launch a cluster through a registered launch function
    Launch(LaunchCommand),

    /// Show the current status of a cluster
    Status(StatusCommand),

    /// Request termination of a cluster
    Terminate(TerminateCommand),

    /// List registered templates in a namespace
    List(ListCommand),

    /// Submit a step to a running cluster
    RunStep(RunStepCommand),
}

impl Cli {
    /// Parse CLI arguments from environment
    pub fn from_args() -> Self {
        Self::parse()
    }

    /// Parse CLI arguments from a slice
    pub fn try_parse_from<I, T>(itr: I) -> Result<Self, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        <Self as Parser>::try_parse_from(itr)
    }
}

use std::ffi::OsString;
