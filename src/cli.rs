//! Command-line argument parsing.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::client::OutputFormat;

/// Uptime report from a metrics server
#[derive(Parser, Debug)]
#[command(name = "promuptime", version, long_about = None)]
pub struct Cli {
    /// Config file path
    #[arg(long, global = true, default_value = "uptime.yml")]
    pub config: PathBuf,

    /// URL of the metrics server (overrides the config file)
    #[arg(long, global = true)]
    pub server: Option<String>,

    /// Timeout in seconds for each request to the server
    #[arg(long, global = true)]
    pub timeout: Option<f64>,

    /// Print query results as descriptive text instead of delimited rows
    #[arg(long, global = true)]
    pub text: bool,

    /// Single-character delimiter for delimited output
    #[arg(long, global = true, default_value = ";", value_parser = parse_delimiter)]
    pub delimiter: char,

    /// Write the HTML report to a file instead of stdout
    #[arg(long, global = true)]
    pub output: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Commands {
    /// Evaluate all configured endpoints and emit the report (default)
    Report,

    /// Run an instant query
    Query {
        /// Query expression
        expr: String,
    },

    /// Run a range query
    QueryRange {
        /// Query expression
        expr: String,
        /// End of the range as a Unix timestamp
        end: f64,
        /// Length of the range in seconds
        range: u64,
        /// Resolution step in seconds (default: range / 250, at least 1)
        step: Option<u64>,
    },

    /// List known series names
    Metrics,
}

impl Cli {
    pub fn output_format(&self) -> OutputFormat {
        if self.text {
            OutputFormat::Text
        } else {
            OutputFormat::Delimited(self.delimiter)
        }
    }
}

/// Accept one character that cannot appear inside a rendered number.
fn parse_delimiter(s: &str) -> Result<char, String> {
    let mut chars = s.chars();
    let c = match (chars.next(), chars.next()) {
        (Some(c), None) => c,
        _ => return Err(format!("delimiter must be a single character, got {:?}", s)),
    };

    if c.is_alphanumeric() || c == '.' || c == '+' || c == '-' {
        return Err(format!("delimiter {:?} can appear inside values", c));
    }
    if c.is_whitespace() && c != '\t' {
        return Err("only tab is allowed as a whitespace delimiter".to_string());
    }
    Ok(c)
}
