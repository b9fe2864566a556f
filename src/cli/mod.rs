//! Command-line interface

use clap::Parser;
use std::ffi::OsString;

/// Run a request through the demo lookup pipeline
#[derive(Debug, Parser, Clone)]
#[command(name = "pipechain")]
#[command(author = "Pipechain Contributors")]
#[command(version = "0.1.0")]
#[command(about = "Runs a lookup through an auth -> logging -> db pipeline", long_about = None)]
pub struct Cli {
    /// User to look up
    #[arg(short, long, default_value = "bob")]
    pub user: String,

    /// Path to a YAML demo configuration
    #[arg(short, long)]
    pub config: Option<String>,

    /// Cancel the run after this many milliseconds (overrides the config)
    #[arg(long)]
    pub timeout_ms: Option<u64>,

    /// Cancel before the run starts
    #[arg(long)]
    pub cancel: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,
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
