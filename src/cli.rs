use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::pipeline::ErrorPolicy;

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Pack delimited text into fixed-width binary records",
    long_about = None
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Transcode a CSV file into fixed-width little-endian records
    Pack(PackArgs),
    /// Print the compiled record layout for a schema
    Layout(LayoutArgs),
    /// Decode a packed file back into CSV using its schema
    Unpack(UnpackArgs),
    /// Write a schema as a YAML file that can be edited and passed to --schema
    SchemaTemplate(SchemaTemplateArgs),
}

/// Exactly one way of naming the schema.
#[derive(Debug, Args)]
#[group(required = true, multiple = false)]
pub struct SchemaSource {
    /// YAML schema file
    #[arg(short = 's', long = "schema")]
    pub schema: Option<PathBuf>,
    /// Inline schema such as `time:f64,side:i8,price:i32:fixed_point(4)`
    #[arg(short = 'f', long = "fields")]
    pub fields: Option<String>,
    /// Built-in schema
    #[arg(long, value_enum)]
    pub preset: Option<Preset>,
}

#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq)]
#[value(rename_all = "kebab-case")]
pub enum Preset {
    /// LOBSTER message files (26-byte records)
    Lobster,
}

#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq, Default)]
#[value(rename_all = "kebab-case")]
pub enum OnError {
    /// Stop at the first invalid row
    #[default]
    Abort,
    /// Log invalid rows and leave them out of the output
    Skip,
}

impl From<OnError> for ErrorPolicy {
    fn from(value: OnError) -> Self {
        match value {
            OnError::Abort => ErrorPolicy::Abort,
            OnError::Skip => ErrorPolicy::SkipAndLog,
        }
    }
}

#[derive(Debug, Args)]
pub struct PackArgs {
    /// Input CSV file (`-` for stdin)
    #[arg(short = 'i', long = "input")]
    pub input: PathBuf,
    /// Output binary file (stdout if omitted)
    #[arg(short = 'o', long = "output")]
    pub output: Option<PathBuf>,
    #[command(flatten)]
    pub source: SchemaSource,
    /// Delimiter character (sniffed from the first 1024 bytes when omitted)
    #[arg(long, value_parser = parse_delimiter)]
    pub delimiter: Option<u8>,
    /// Treat the first row as a header and skip it
    #[arg(long)]
    pub header: bool,
    /// What to do with rows that fail validation
    #[arg(long = "on-error", value_enum, default_value = "abort")]
    pub on_error: OnError,
    /// Character encoding of the input file (defaults to utf-8)
    #[arg(long = "input-encoding")]
    pub input_encoding: Option<String>,
    /// Stop after writing this many records
    #[arg(long)]
    pub limit: Option<u64>,
}

#[derive(Debug, Args)]
pub struct LayoutArgs {
    #[command(flatten)]
    pub source: SchemaSource,
    /// Emit the layout as JSON instead of a table
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Args)]
pub struct UnpackArgs {
    /// Packed binary file (`-` for stdin)
    #[arg(short = 'i', long = "input")]
    pub input: PathBuf,
    /// Output CSV file (stdout if omitted)
    #[arg(short = 'o', long = "output")]
    pub output: Option<PathBuf>,
    #[command(flatten)]
    pub source: SchemaSource,
    /// Delimiter for the CSV output
    #[arg(long, value_parser = parse_delimiter, default_value = ",")]
    pub delimiter: u8,
    /// Omit the header row
    #[arg(long = "no-header")]
    pub no_header: bool,
    /// Stop after this many records
    #[arg(long)]
    pub limit: Option<u64>,
}

#[derive(Debug, Args)]
pub struct SchemaTemplateArgs {
    #[command(flatten)]
    pub source: SchemaSource,
    /// Destination YAML file (stdout if omitted)
    #[arg(short = 'o', long = "output")]
    pub output: Option<PathBuf>,
}

pub fn parse_delimiter(value: &str) -> Result<u8, String> {
    match value {
        "tab" | "\\t" | "\t" => Ok(b'\t'),
        "comma" | "," => Ok(b','),
        "|" | "pipe" => Ok(b'|'),
        ";" | "semicolon" => Ok(b';'),
        other => {
            let mut chars = other.chars();
            let first = chars
                .next()
                .ok_or_else(|| "Delimiter cannot be empty".to_string())?;
            if chars.next().is_some() {
                return Err("Delimiter must be a single character".to_string());
            }
            if !first.is_ascii() {
                return Err("Delimiter must be ASCII".to_string());
            }
            Ok(first as u8)
        }
    }
}
