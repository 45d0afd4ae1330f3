use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Load CSV batches into a staging table exactly once per file",
    long_about = None
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Import every source file in a directory into the target table
    Ingest(IngestArgs),
    /// Show the success or failure ledger
    Ledger(LedgerArgs),
}

#[derive(Debug, Args)]
pub struct IngestArgs {
    /// Directory containing the source files
    #[arg(short = 's', long = "source")]
    pub source: PathBuf,
    /// SQLite database file holding the target table and ledgers
    #[arg(short = 'd', long = "database")]
    pub database: PathBuf,
    #[command(flatten)]
    pub target: TargetArgs,
    /// Key column used to skip rows already present in the target table
    #[arg(short = 'k', long = "key-column")]
    pub key_column: Option<String>,
    /// Date column; unparseable values become the sentinel date (replaces profile list)
    #[arg(long = "date-column", action = clap::ArgAction::Append)]
    pub date_columns: Vec<String>,
    /// Date column whose unparseable values are left empty (replaces profile list)
    #[arg(long = "nullable-date-column", action = clap::ArgAction::Append)]
    pub nullable_date_columns: Vec<String>,
    /// Timestamp column rendered as YYYY-MM-DD HH:MM (replaces profile list)
    #[arg(long = "datetime-column", action = clap::ArgAction::Append)]
    pub datetime_columns: Vec<String>,
    /// Only files with this extension are imported
    #[arg(long = "extension", default_value = "csv")]
    pub extension: String,
    /// CSV delimiter character (supports ',', 'tab', ';', '|')
    #[arg(long, value_parser = parse_delimiter)]
    pub delimiter: Option<u8>,
    /// Character encoding of the source files (defaults to utf-8)
    #[arg(long = "input-encoding")]
    pub input_encoding: Option<String>,
    /// Write the run summary as JSON to this path
    #[arg(long = "report")]
    pub report: Option<PathBuf>,
    /// Exit with an error status when any file failed
    #[arg(long = "strict")]
    pub strict: bool,
}

#[derive(Debug, Args)]
pub struct LedgerArgs {
    /// SQLite database file holding the ledgers
    #[arg(short = 'd', long = "database")]
    pub database: PathBuf,
    #[command(flatten)]
    pub target: TargetArgs,
    /// Show the failure ledger instead of the success ledger
    #[arg(long = "failures")]
    pub failures: bool,
}

/// Profile selection shared by every subcommand.
#[derive(Debug, Args)]
pub struct TargetArgs {
    /// YAML target profile describing table, key and date columns
    #[arg(short = 'p', long = "profile")]
    pub profile: Option<PathBuf>,
    /// Target table name (overrides the profile)
    #[arg(short = 't', long = "table")]
    pub table: Option<String>,
    /// Success ledger table name (overrides the profile)
    #[arg(long = "success-ledger")]
    pub success_ledger: Option<String>,
    /// Failure ledger table name (overrides the profile)
    #[arg(long = "failure-ledger")]
    pub failure_ledger: Option<String>,
}

pub fn parse_delimiter(value: &str) -> Result<u8, String> {
    match value {
        "tab" | "\\t" => Ok(b'\t'),
        "comma" => Ok(b','),
        "semicolon" => Ok(b';'),
        "pipe" => Ok(b'|'),
        other if other.len() == 1 && other.is_ascii() => Ok(other.as_bytes()[0]),
        other => Err(format!("Unsupported delimiter '{other}'")),
    }
}
