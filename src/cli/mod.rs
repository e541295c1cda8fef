//! # CLI Module
//!
//! Command-line interface for leakscope using `clap` derive macros.
//!
//! ## Commands
//!
//! - `analyze` - Run the information-flow analysis over a batch file or tree
//! - `policy` - Print the effective default policy as JSON
//! - `version` - Show version information

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Leakscope command-line interface.
///
/// A per-method information-flow analyzer. The input is not source code but
/// the already-parsed representation produced by an external front-end:
/// JSON batch files of basic blocks, instructions, and control-flow edges.
#[derive(Parser, Debug)]
#[command(name = "leakscope")]
#[command(version)]
#[command(about = "Information-flow analyzer detecting leaks of sensitive data to observable sinks")]
#[command(long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands for the leakscope CLI.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Analyze method batches for source-to-sink information flow.
    ///
    /// Accepts a single JSON batch file or a directory, in which case every
    /// `*.json` file in the tree is treated as a batch.
    Analyze {
        /// Path to the batch file or directory to analyze.
        #[arg(value_name = "PATH")]
        path: PathBuf,

        /// Output format for the findings report.
        ///
        /// Supported formats:
        /// - `terminal`: Colorized console output (default)
        /// - `json`: Machine-readable JSON format
        #[arg(short, long, default_value = "terminal")]
        format: String,

        /// Load the analysis policy from a JSON file.
        ///
        /// Flags below override individual fields of the loaded policy.
        #[arg(short, long)]
        policy: Option<PathBuf>,

        /// Treat only these zero-based parameter positions as sources.
        ///
        /// Example: --source-params 0,2
        #[arg(long, value_delimiter = ',')]
        source_params: Vec<usize>,

        /// Treat only parameters of these type names as sources.
        ///
        /// Example: --source-types Secret,EnclaveKey
        #[arg(long, value_delimiter = ',')]
        source_types: Vec<String>,

        /// Sink categories to report.
        ///
        /// Valid values: external, shared, annotated. Default: all.
        #[arg(long, value_delimiter = ',')]
        sinks: Vec<String>,

        /// Treat the receiver object (`this`) as a sensitive source.
        #[arg(long)]
        source_this: bool,

        /// Call-site taint pass-through precision.
        ///
        /// Valid values: conservative (default), transparent.
        #[arg(long)]
        call_policy: Option<String>,

        /// Worklist step cap per method. Zero derives a cap from graph size.
        #[arg(long)]
        max_iterations: Option<usize>,
    },

    /// Print the effective default policy as JSON.
    ///
    /// Useful as a starting point for a `--policy` file.
    Policy,

    /// Print version information.
    Version,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    /// Verify that the CLI definition is valid.
    #[test]
    fn verify_cli() {
        Cli::command().debug_assert();
    }
}
