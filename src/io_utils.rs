//! I/O helpers shared by the commands and the transcoding core.
//!
//! - **Delimiter resolution**: explicit override first, then `.tsv` → tab;
//!   anything else is left to dialect sniffing.
//! - **Encoding**: input cells are decoded via `encoding_rs`, defaulting to
//!   UTF-8.
//! - **Reader/writer construction**: dialect-configured CSV readers, the
//!   packed record writer, and the CSV writer used by `unpack`.
//! - **stdin/stdout**: the `-` path convention routes through standard streams.

use std::{
    fs::File,
    io::{BufReader, BufWriter, Read, Write},
    path::Path,
};

use anyhow::{Context, Result, anyhow};
use encoding_rs::{Encoding, UTF_8};

use crate::dialect::Dialect;

pub const DEFAULT_TSV_DELIMITER: u8 = b'\t';

pub fn is_dash(path: &Path) -> bool {
    path == Path::new("-")
}

pub fn resolve_encoding(label: Option<&str>) -> Result<&'static Encoding> {
    if let Some(value) = label {
        Encoding::for_label(value.trim().as_bytes())
            .ok_or_else(|| anyhow!("Unknown encoding '{value}'"))
    } else {
        Ok(UTF_8)
    }
}

/// Returns the delimiter to force, or `None` to let the input be sniffed.
pub fn resolve_input_delimiter(path: &Path, provided: Option<u8>) -> Option<u8> {
    provided.or_else(|| match path.extension().and_then(|ext| ext.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("tsv") => Some(DEFAULT_TSV_DELIMITER),
        _ => None,
    })
}

/// CSV reader for the row source. Headers are handled by the row source
/// itself so that line numbering stays under its control, and records may be
/// ragged because arity is validated per row.
pub fn open_dialect_reader<R>(reader: R, dialect: &Dialect) -> csv::Reader<R>
where
    R: Read,
{
    let mut builder = csv::ReaderBuilder::new();
    builder
        .has_headers(false)
        .delimiter(dialect.delimiter)
        .quote(dialect.quote)
        .double_quote(true)
        .flexible(true);
    builder.from_reader(reader)
}

pub fn open_input_file(path: &Path) -> Result<BufReader<File>> {
    let file = File::open(path).with_context(|| format!("Opening input file {path:?}"))?;
    Ok(BufReader::new(file))
}

/// Destination for packed records; stdout when `path` is absent or `-`.
pub fn open_record_writer(path: Option<&Path>) -> Result<Box<dyn Write>> {
    let writer: Box<dyn Write> = match path {
        Some(p) if !is_dash(p) => Box::new(BufWriter::new(
            File::create(p).with_context(|| format!("Creating output file {p:?}"))?,
        )),
        _ => Box::new(BufWriter::new(std::io::stdout().lock())),
    };
    Ok(writer)
}

pub fn open_csv_writer(path: Option<&Path>, delimiter: u8) -> Result<csv::Writer<Box<dyn Write>>> {
    let base = open_record_writer(path)?;
    let mut builder = csv::WriterBuilder::new();
    builder
        .delimiter(delimiter)
        .quote_style(csv::QuoteStyle::Necessary)
        .double_quote(true);
    Ok(builder.from_writer(base))
}

pub fn decode_bytes(bytes: &[u8], encoding: &'static Encoding) -> Result<String> {
    let (text, _, had_errors) = encoding.decode(bytes);
    if had_errors {
        Err(anyhow!(
            "Failed to decode text with encoding {}",
            encoding.name()
        ))
    } else {
        Ok(text.into_owned())
    }
}

pub fn decode_record(record: &csv::ByteRecord, encoding: &'static Encoding) -> Result<Vec<String>> {
    record
        .iter()
        .map(|field| decode_bytes(field, encoding))
        .collect()
}
