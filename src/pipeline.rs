//! Row pipeline: arity check, per-field parse, pack, emit.
//!
//! A [`Transcoder`] owns the schema and its compiled layout for the lifetime
//! of a run. Rows are pulled one at a time from a [`RowSource`], packed into a
//! single reusable buffer, and appended to a [`RecordSink`] only once the whole
//! record has been encoded. The sink is flushed on every exit path.

use std::io::{Read, Seek, Write};

use encoding_rs::{Encoding, UTF_8};
use log::{debug, warn};

use crate::{
    dialect::{self, Dialect},
    error::{DialectError, FieldParseError, RowError, TranscodeError},
    layout::{CompiledLayout, compile},
    rows::{Row, RowSource},
    schema::{Scalar, ScalarParser, Schema},
    sink::RecordSink,
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ErrorPolicy {
    /// Stop at the first bad row and return its error.
    #[default]
    Abort,
    /// Log the bad row, leave it out of the output, keep going.
    SkipAndLog,
}

#[derive(Debug, Clone)]
pub struct TranscodeOptions {
    pub delimiter: Option<u8>,
    pub has_header: bool,
    pub error_policy: ErrorPolicy,
    pub encoding: &'static Encoding,
    pub limit: Option<u64>,
}

impl Default for TranscodeOptions {
    fn default() -> Self {
        Self {
            delimiter: None,
            has_header: false,
            error_policy: ErrorPolicy::Abort,
            encoding: UTF_8,
            limit: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TranscodeSummary {
    pub record_width: usize,
    pub rows_read: u64,
    pub blank_rows: u64,
    pub records_written: u64,
    pub rows_rejected: u64,
    pub bytes_written: u64,
}

#[derive(Debug, Clone)]
pub struct Transcoder {
    schema: Schema,
    layout: CompiledLayout,
    options: TranscodeOptions,
}

impl Transcoder {
    pub fn new(schema: Schema, options: TranscodeOptions) -> Self {
        let layout = compile(&schema);
        debug!(
            "Compiled layout {} ({} byte record): {}",
            layout.signature(),
            layout.record_width(),
            layout.describe()
        );
        Self {
            schema,
            layout,
            options,
        }
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn layout(&self) -> &CompiledLayout {
        &self.layout
    }

    pub fn options(&self) -> &TranscodeOptions {
        &self.options
    }

    /// Resolves the dialect of a seekable input, leaving it positioned where
    /// it started.
    pub fn resolve_seekable<R>(&self, input: &mut R) -> Result<Dialect, TranscodeError>
    where
        R: Read + Seek,
    {
        let sample = match self.options.delimiter {
            Some(_) => Vec::new(),
            None => dialect::sample_and_rewind(input).map_err(DialectError::Sample)?,
        };
        Ok(dialect::resolve(
            self.options.delimiter,
            &sample,
            self.options.has_header,
        )?)
    }

    /// Resolves the dialect of a non-seekable stream and returns a reader that
    /// replays the sampled bytes.
    pub fn resolve_stream<R>(&self, input: R) -> Result<(Dialect, Box<dyn Read>), TranscodeError>
    where
        R: Read + 'static,
    {
        if self.options.delimiter.is_some() {
            let dialect = dialect::resolve(self.options.delimiter, &[], self.options.has_header)?;
            return Ok((dialect, Box::new(input)));
        }
        let (sample, replay) =
            dialect::sample_and_replay(input).map_err(DialectError::Sample)?;
        let dialect = dialect::resolve(None, &sample, self.options.has_header)?;
        Ok((dialect, Box::new(replay)))
    }

    /// Resolves the dialect of `input` and transcodes it into `output`.
    pub fn transcode<R, W>(&self, mut input: R, output: W) -> Result<TranscodeSummary, TranscodeError>
    where
        R: Read + Seek,
        W: Write,
    {
        let dialect = self.resolve_seekable(&mut input)?;
        self.run(input, &dialect, output)
    }

    /// Streams every row of `input` through the pipeline into `output`.
    pub fn run<R, W>(
        &self,
        input: R,
        dialect: &Dialect,
        output: W,
    ) -> Result<TranscodeSummary, TranscodeError>
    where
        R: Read,
        W: Write,
    {
        let mut rows = RowSource::new(input, dialect, self.options.encoding);
        let mut sink = RecordSink::new(output, self.layout.record_width());
        let outcome = self.pump(&mut rows, &mut sink);
        let flushed = sink.flush();
        let mut summary = outcome?;
        flushed?;
        summary.blank_rows = rows.blank_rows_skipped();
        summary.bytes_written = sink.bytes_written();
        Ok(summary)
    }

    fn pump<R, W>(
        &self,
        rows: &mut RowSource<R>,
        sink: &mut RecordSink<W>,
    ) -> Result<TranscodeSummary, TranscodeError>
    where
        R: Read,
        W: Write,
    {
        let mut summary = TranscodeSummary {
            record_width: self.layout.record_width(),
            ..TranscodeSummary::default()
        };
        if self.options.limit == Some(0) {
            return Ok(summary);
        }
        let mut buffer = vec![0u8; self.layout.record_width()];
        for row in rows.by_ref() {
            let row = row?;
            summary.rows_read += 1;
            match self.pack_row(&row, &mut buffer) {
                Ok(()) => {
                    sink.append(&buffer)?;
                    summary.records_written += 1;
                }
                Err(err) => match self.options.error_policy {
                    ErrorPolicy::Abort => return Err(err.into()),
                    ErrorPolicy::SkipAndLog => {
                        warn!("Skipping row: {err}");
                        summary.rows_rejected += 1;
                    }
                },
            }
            if self
                .options
                .limit
                .is_some_and(|limit| summary.records_written >= limit)
            {
                debug!("Record limit reached after line {}", row.line_number);
                break;
            }
        }
        Ok(summary)
    }

    /// Validates, parses and packs one row into `buf`.
    pub fn pack_row(&self, row: &Row, buf: &mut [u8]) -> Result<(), RowError> {
        let values = self.parse_row(row)?;
        self.layout
            .pack(&values, buf)
            .map_err(|cause| RowError::EncodingFailure {
                line: row.line_number,
                values,
                cause,
            })
    }

    /// Converts the leading `arity` cells of `row`; trailing cells are ignored.
    pub fn parse_row(&self, row: &Row) -> Result<Vec<Scalar>, RowError> {
        let expected = self.schema.arity();
        if row.cells.len() < expected {
            return Err(RowError::TooFewColumns {
                line: row.line_number,
                expected,
                actual: row.cells.len(),
                raw: row.cells.clone(),
            });
        }
        self.schema
            .fields()
            .iter()
            .zip(&row.cells)
            .enumerate()
            .map(|(idx, (field, cell))| {
                field
                    .parse
                    .parse_scalar(cell)
                    .map_err(|err| RowError::ParseFailure {
                        line: row.line_number,
                        raw: row.cells.clone(),
                        cause: FieldParseError {
                            field: field.name.clone(),
                            column: idx + 1,
                            cell: cell.clone(),
                            message: format!("{err:#}"),
                        },
                    })
            })
            .collect()
    }
}
