//! CLI argument parsing for the trace rule engine.
//!
//! The core has no persistence layer, so each invocation is
//! self-contained: it loads a rule set and a span/trace in
//! one process and reports what matched, rather than exposing `Load`/
//! `Unload` as separate long-lived commands over some daemon.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "trace-rule-engine")]
#[command(version)]
#[command(about = "Compile and evaluate trace rules against spans", long_about = None)]
pub struct Cli {
    /// Path to an engine config TOML file (capacity cap, default timeout).
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Load a rule set and report compile stats and any parse errors,
    /// without evaluating anything.
    Validate {
        /// Path to a TOML rule set (see `[[rule]]` tables).
        rules_file: PathBuf,
    },
    /// Load a rule set and evaluate it against one JSON-encoded span.
    EvalSpan {
        rules_file: PathBuf,
        span_file: PathBuf,
    },
    /// Load a rule set and evaluate it against a JSON array of spans
    /// forming one trace.
    EvalTrace {
        rules_file: PathBuf,
        trace_file: PathBuf,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_validate_subcommand() {
        let cli = Cli::parse_from(["trace-rule-engine", "validate", "rules.toml"]);
        match cli.command {
            Command::Validate { rules_file } => assert_eq!(rules_file, PathBuf::from("rules.toml")),
            other => panic!("expected Validate, got {other:?}"),
        }
    }

    #[test]
    fn parses_global_config_flag_before_subcommand() {
        let cli = Cli::parse_from([
            "trace-rule-engine",
            "--config",
            "engine.toml",
            "eval-span",
            "rules.toml",
            "span.json",
        ]);
        assert_eq!(cli.config, Some(PathBuf::from("engine.toml")));
        assert!(matches!(cli.command, Command::EvalSpan { .. }));
    }
}
