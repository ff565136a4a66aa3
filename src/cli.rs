use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::io_utils::parse_delimiter;

#[derive(Debug, Parser)]
#[command(author, version, about = "Map uploaded CSV files onto registered field layouts", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Show the detected encoding and header labels of a file
    Probe(ProbeArgs),
    /// Report which map option would import a file
    Resolve(ResolveArgs),
    /// Write the keyed record data extracted from a file as JSON
    Extract(ExtractArgs),
    /// Import a file: resolve, extract, validate and export failed rows
    Import(ImportArgs),
}

#[derive(Debug, Args)]
pub struct ProbeArgs {
    /// Input CSV file to inspect (`-` reads stdin)
    #[arg(short = 'i', long = "input")]
    pub input: PathBuf,
    /// Source encoding to assume instead of detecting it
    #[arg(long = "encoding")]
    pub encoding: Option<String>,
    /// CSV delimiter character (supports ',', 'tab', ';', '|')
    #[arg(long, value_parser = parse_delimiter)]
    pub delimiter: Option<u8>,
    /// Map option file; when given, each option's verdict is listed
    #[arg(short = 'c', long = "config")]
    pub config: Option<PathBuf>,
}

#[derive(Debug, Args)]
pub struct ResolveArgs {
    /// Map option file (YAML)
    #[arg(short = 'c', long = "config")]
    pub config: PathBuf,
    /// Input CSV file (`-` reads stdin)
    #[arg(short = 'i', long = "input")]
    pub input: PathBuf,
}

#[derive(Debug, Args)]
pub struct ExtractArgs {
    /// Map option file (YAML)
    #[arg(short = 'c', long = "config")]
    pub config: PathBuf,
    /// Input CSV file (`-` reads stdin)
    #[arg(short = 'i', long = "input")]
    pub input: PathBuf,
    /// Destination JSON file (stdout if omitted)
    #[arg(short = 'o', long = "output")]
    pub output: Option<PathBuf>,
}

#[derive(Debug, Args)]
pub struct ImportArgs {
    /// Map option file (YAML)
    #[arg(short = 'c', long = "config")]
    pub config: PathBuf,
    /// Input CSV file (`-` reads stdin)
    #[arg(short = 'i', long = "input")]
    pub input: PathBuf,
    /// Destination JSON file for valid records (stdout if omitted)
    #[arg(short = 'o', long = "output")]
    pub output: Option<PathBuf>,
    /// Write rows that failed validation to this CSV file
    #[arg(long = "invalid-output")]
    pub invalid_output: Option<PathBuf>,
    /// Override the configured upload size limit in bytes
    #[arg(long = "max-upload-bytes")]
    pub max_upload_bytes: Option<u64>,
}
