use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Aggregate placement spreadsheets into dashboard metrics",
    long_about = None
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// List the built-in dashboard views
    Views,
    /// Print a view definition as YAML
    Schema(SchemaArgs),
    /// Check a spreadsheet's headers against a view's required columns
    Validate(ValidateArgs),
    /// Compute a view's aggregates for a spreadsheet
    Aggregate(AggregateArgs),
    /// Write the rows passing the filters to CSV
    Export(ExportArgs),
}

/// Selects either a built-in view or a YAML view definition.
#[derive(Debug, Clone, Args)]
pub struct ViewSelection {
    /// Built-in view name (see `views`)
    #[arg(short, long, conflicts_with = "view_file")]
    pub view: Option<String>,
    /// YAML view definition file
    #[arg(long = "view-file")]
    pub view_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Args)]
pub struct InputArgs {
    /// Input .csv or .xlsx file
    #[arg(short = 'i', long = "input")]
    pub input: PathBuf,
    /// CSV delimiter character (supports ',', 'tab', ';', '|')
    #[arg(long, value_parser = parse_delimiter)]
    pub delimiter: Option<u8>,
    /// Character encoding of CSV input (defaults to utf-8)
    #[arg(long = "input-encoding")]
    pub input_encoding: Option<String>,
}

#[derive(Debug, Clone, Args)]
pub struct FilterArgs {
    /// Filters such as `Dept=CSE`, `Package>=50000` or `Batch=all`
    #[arg(long = "filter", action = clap::ArgAction::Append)]
    pub filters: Vec<String>,
    /// Case-insensitive text matched against every cell
    #[arg(long)]
    pub search: Option<String>,
}

#[derive(Debug, Args)]
pub struct SchemaArgs {
    #[command(flatten)]
    pub selection: ViewSelection,
    /// Write the YAML to this file instead of stdout
    #[arg(short = 'o', long = "output")]
    pub output: Option<PathBuf>,
}

#[derive(Debug, Args)]
pub struct ValidateArgs {
    #[command(flatten)]
    pub input: InputArgs,
    #[command(flatten)]
    pub selection: ViewSelection,
}

#[derive(Debug, Args)]
pub struct AggregateArgs {
    #[command(flatten)]
    pub input: InputArgs,
    #[command(flatten)]
    pub selection: ViewSelection,
    #[command(flatten)]
    pub filter: FilterArgs,
    /// Output format
    #[arg(long, default_value = "table")]
    pub format: OutputFormat,
    /// Write the result to this file instead of stdout
    #[arg(short = 'o', long = "output")]
    pub output: Option<PathBuf>,
}

#[derive(Debug, Args)]
pub struct ExportArgs {
    #[command(flatten)]
    pub input: InputArgs,
    #[command(flatten)]
    pub selection: ViewSelection,
    #[command(flatten)]
    pub filter: FilterArgs,
    /// Output CSV file (stdout if omitted)
    #[arg(short = 'o', long = "output")]
    pub output: Option<PathBuf>,
    /// Delimiter to use for output (defaults to ',')
    #[arg(long = "output-delimiter", value_parser = parse_delimiter)]
    pub output_delimiter: Option<u8>,
    /// Limit number of rows emitted
    #[arg(long)]
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, Copy, Default, ValueEnum, PartialEq, Eq)]
#[value(rename_all = "kebab-case")]
pub enum OutputFormat {
    #[default]
    Table,
    Json,
}

pub fn parse_delimiter(value: &str) -> Result<u8, String> {
    match value {
        "tab" | "\t" => Ok(b'\t'),
        "comma" | "," => Ok(b','),
        "pipe" | "|" => Ok(b'|'),
        "semicolon" | ";" => Ok(b';'),
        other => {
            let mut chars = other.chars();
            let first = chars
                .next()
                .ok_or_else(|| "Delimiter cannot be empty".to_string())?;
            if chars.next().is_some() {
                return Err(format!("Delimiter '{other}' must be a single character"));
            }
            if !first.is_ascii() {
                return Err("Delimiter must be ASCII".to_string());
            }
            Ok(first as u8)
        }
    }
}
