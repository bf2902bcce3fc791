//! CLI argument parsing via clap.

use clap::{Parser, Subcommand};

/// A headless agent harness for OpenAI-compatible APIs.
///
/// With no subcommand, runs the line-delimited JSON worker over
/// stdin/stdout.
#[derive(Debug, Parser)]
#[command(name = "heddle", version = heddle::build_info::VERSION)]
pub struct Args {
    /// Override the default model id used by `init`.
    #[arg(short = 'm', long = "model", global = true)]
    pub model: Option<String>,

    /// Override the provider base URL.
    #[arg(long = "base-url", global = true)]
    pub base_url: Option<String>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

/// Top-level CLI subcommands.
#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Run the headless stdio worker (the default mode).
    Worker,
    /// Print version and build metadata.
    Version,
}
