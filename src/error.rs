//! Error taxonomy for the transcoding core.
//!
//! Schema and dialect errors are raised before the first row is read. Row
//! errors always carry the data line number and the raw cells so the
//! offending input can be located without re-running the job.

use std::io;

use itertools::Itertools;
use thiserror::Error;

use crate::schema::{BinaryKind, Scalar};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaError {
    #[error("schema must declare at least one field")]
    Empty,
    #[error("field at position {position} has an empty name")]
    EmptyName { position: usize },
    #[error("duplicate field name '{name}' at positions {first} and {second}")]
    DuplicateName {
        name: String,
        first: usize,
        second: usize,
    },
    #[error("field '{name}': fixed-point scale {scale} exceeds the maximum of {max}")]
    InvalidScale { name: String, scale: u32, max: u32 },
    #[error("invalid field declaration '{declaration}': {reason}")]
    InvalidDeclaration { declaration: String, reason: String },
}

#[derive(Debug, Error)]
pub enum DialectError {
    #[error(
        "unable to detect a consistent delimiter from {sample_len} sampled byte(s); supply an explicit delimiter"
    )]
    Undetectable { sample_len: usize },
    #[error("reading dialect sample: {0}")]
    Sample(#[from] io::Error),
}

/// A single cell that its field's conversion rule rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("field '{field}' (column {column}) cannot parse '{cell}': {message}")]
pub struct FieldParseError {
    pub field: String,
    pub column: usize,
    pub cell: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EncodeError {
    #[error("record carries {actual} value(s) but the layout declares {expected}")]
    Arity { expected: usize, actual: usize },
    #[error("value {value} for field '{field}' does not fit {kind}")]
    OutOfRange {
        field: String,
        kind: BinaryKind,
        value: String,
    },
    #[error("value {value} for field '{field}' cannot be stored as {kind}")]
    TypeMismatch {
        field: String,
        kind: BinaryKind,
        value: String,
    },
    #[error("record buffer holds {actual} byte(s) but the layout requires {expected}")]
    RecordLength { expected: usize, actual: usize },
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum RowError {
    #[error("line {line}: expected at least {expected} column(s), got {actual}: {raw:?}")]
    TooFewColumns {
        line: u64,
        expected: usize,
        actual: usize,
        raw: Vec<String>,
    },
    #[error("line {line}: error parsing row {raw:?}: {cause}")]
    ParseFailure {
        line: u64,
        raw: Vec<String>,
        cause: FieldParseError,
    },
    #[error("line {line}: packing failed for values [{}]: {cause}", render_values(.values))]
    EncodingFailure {
        line: u64,
        values: Vec<Scalar>,
        cause: EncodeError,
    },
}

impl RowError {
    pub fn line(&self) -> u64 {
        match self {
            RowError::TooFewColumns { line, .. }
            | RowError::ParseFailure { line, .. }
            | RowError::EncodingFailure { line, .. } => *line,
        }
    }
}

fn render_values(values: &[Scalar]) -> String {
    values.iter().join(", ")
}

#[derive(Debug, Error)]
pub enum TranscodeError {
    #[error(transparent)]
    Schema(#[from] SchemaError),
    #[error(transparent)]
    Dialect(#[from] DialectError),
    #[error(transparent)]
    Row(#[from] RowError),
    #[error("line {line}: malformed delimited input: {cause}")]
    Csv { line: u64, cause: csv::Error },
    #[error("line {line}: {message}")]
    Decode { line: u64, message: String },
    #[error("I/O failure: {0}")]
    Io(#[from] io::Error),
}

impl TranscodeError {
    /// Data line the failure points at, when the failure is tied to one.
    pub fn line(&self) -> Option<u64> {
        match self {
            TranscodeError::Row(err) => Some(err.line()),
            TranscodeError::Csv { line, .. } | TranscodeError::Decode { line, .. } => Some(*line),
            _ => None,
        }
    }
}
