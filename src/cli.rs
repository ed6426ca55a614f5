// src/cli.rs

//! CLI argument parsing using `clap`.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

/// Command-line arguments for `flowgraph`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "flowgraph",
    version,
    about = "Compile declared tasks into independent DAGs and run them with data-locality-aware scheduling.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the config file (TOML).
    ///
    /// Default: `$FLOWGRAPH_CONFIG`, else `Flowgraph.toml` in the current
    /// working directory.
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Compile and print the DAGs, but don't execute anything.
    #[arg(long)]
    pub dry_run: bool,

    /// Worker hosts, overriding `[config].hosts`.
    #[arg(long, value_name = "HOST", value_delimiter = ',')]
    pub hosts: Vec<String>,

    /// New DAGs admitted per activation scan, overriding `[config].max_dags`.
    #[arg(long, value_name = "N")]
    pub max_dags: Option<usize>,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `FLOWGRAPH_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hosts_split_on_commas() {
        let args = CliArgs::parse_from(["flowgraph", "--hosts", "a,b", "--max-dags", "2"]);
        assert_eq!(args.hosts, vec!["a".to_string(), "b".to_string()]);
        assert_eq!(args.max_dags, Some(2));
        assert!(args.config.is_none());
        assert!(!args.dry_run);
    }
}
