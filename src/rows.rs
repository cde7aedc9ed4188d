//! Row source: a lazy, single-pass sequence of line-numbered text rows.
//!
//! Line numbers are 1-based physical lines counted from the start of data,
//! i.e. after the optional header record. Blank lines and rows whose cells
//! are all whitespace are never yielded but still occupy their line, so a
//! reported line number always points at the offending line of the file.
//!
//! The `csv` reader stamps record positions before it skips blank lines and
//! counts a CRLF terminator's `\n` lazily, so lines are derived here instead:
//! `LineTracker` records the offset of every `\n` the reader pulls in, and a
//! record's line is found from the byte offset where the reader stopped.

use std::{
    collections::VecDeque,
    io::{self, Read},
};

use csv::ByteRecord;
use encoding_rs::Encoding;
use log::trace;

use crate::{dialect::Dialect, error::TranscodeError, io_utils};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Row {
    pub line_number: u64,
    pub cells: Vec<String>,
}

impl Row {
    pub fn is_blank(&self) -> bool {
        self.cells.iter().all(|cell| cell.trim().is_empty())
    }
}

/// Reader adapter that remembers where line feeds occur in the raw input.
///
/// Offsets below the last retired position are folded into a counter so the
/// queue only spans the reader's read-ahead buffer.
struct LineTracker<R> {
    inner: R,
    offset: u64,
    pending: VecDeque<u64>,
    retired: u64,
}

impl<R: Read> LineTracker<R> {
    fn new(inner: R) -> Self {
        Self {
            inner,
            offset: 0,
            pending: VecDeque::new(),
            retired: 0,
        }
    }

    /// 1-based line holding the byte at `offset`.
    fn line_at(&self, offset: u64) -> u64 {
        let before = self.pending.iter().take_while(|&&nl| nl < offset).count() as u64;
        1 + self.retired + before
    }

    fn is_newline(&self, offset: u64) -> bool {
        self.pending.contains(&offset)
    }

    /// Forgets individual line feeds before `offset`, keeping their count.
    fn retire(&mut self, offset: u64) {
        while self.pending.front().is_some_and(|&nl| nl < offset) {
            self.pending.pop_front();
            self.retired += 1;
        }
    }
}

impl<R: Read> Read for LineTracker<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let read = self.inner.read(buf)?;
        for (idx, byte) in buf[..read].iter().enumerate() {
            if *byte == b'\n' {
                self.pending.push_back(self.offset + idx as u64);
            }
        }
        self.offset += read as u64;
        Ok(read)
    }
}

pub struct RowSource<R: Read> {
    reader: csv::Reader<LineTracker<R>>,
    record: ByteRecord,
    encoding: &'static Encoding,
    header_pending: bool,
    line_base: u64,
    blank_rows: u64,
    finished: bool,
}

impl<R: Read> RowSource<R> {
    pub fn new(input: R, dialect: &Dialect, encoding: &'static Encoding) -> Self {
        Self {
            reader: io_utils::open_dialect_reader(LineTracker::new(input), dialect),
            record: ByteRecord::new(),
            encoding,
            header_pending: dialect.has_header,
            line_base: 0,
            blank_rows: 0,
            finished: false,
        }
    }

    /// Number of blank or whitespace-only rows dropped so far.
    pub fn blank_rows_skipped(&self) -> u64 {
        self.blank_rows
    }

    fn relative_line(&self, physical: u64) -> u64 {
        physical.saturating_sub(self.line_base)
    }

    /// Physical lines of the record just read, as `(first, last)`.
    ///
    /// The reader stops somewhere inside the record terminator, so the last
    /// content byte sits before any consumed `\n`. Unquoted cells never hold
    /// line breaks, which makes the `\n`s inside the cells exactly the lines
    /// the record spans.
    fn record_lines(&mut self) -> (u64, u64) {
        let consumed = self.reader.position().byte();
        let tracker = self.reader.get_mut();
        let mut last = consumed.saturating_sub(1);
        if last > 0 && tracker.is_newline(last) {
            last -= 1;
        }
        let end = tracker.line_at(last);
        tracker.retire(consumed);
        let embedded = self
            .record
            .iter()
            .map(|cell| cell.iter().filter(|&&b| b == b'\n').count() as u64)
            .sum::<u64>();
        (end.saturating_sub(embedded), end)
    }

    fn csv_error(&self, err: csv::Error) -> TranscodeError {
        let consumed = self.reader.position().byte();
        let physical = self.reader.get_ref().line_at(consumed);
        TranscodeError::Csv {
            line: self.relative_line(physical),
            cause: err,
        }
    }

    fn skip_header(&mut self) -> Result<(), TranscodeError> {
        if self
            .reader
            .read_byte_record(&mut self.record)
            .map_err(|err| self.csv_error(err))?
        {
            let (_, last) = self.record_lines();
            self.line_base = last;
            trace!("Skipped header record ending on line {last}");
        }
        Ok(())
    }

    fn next_row(&mut self) -> Result<Option<Row>, TranscodeError> {
        if self.header_pending {
            self.header_pending = false;
            self.skip_header()?;
        }
        loop {
            let more = self
                .reader
                .read_byte_record(&mut self.record)
                .map_err(|err| self.csv_error(err))?;
            if !more {
                return Ok(None);
            }
            let (first, _) = self.record_lines();
            let line_number = self.relative_line(first);
            let cells = io_utils::decode_record(&self.record, self.encoding).map_err(|err| {
                TranscodeError::Decode {
                    line: line_number,
                    message: err.to_string(),
                }
            })?;
            let row = Row { line_number, cells };
            if row.is_blank() {
                self.blank_rows += 1;
                trace!("Skipping blank row on line {line_number}");
                continue;
            }
            return Ok(Some(row));
        }
    }
}

impl<R: Read> Iterator for RowSource<R> {
    type Item = Result<Row, TranscodeError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        match self.next_row() {
            Ok(Some(row)) => Some(Ok(row)),
            Ok(None) => {
                self.finished = true;
                None
            }
            Err(err) => {
                self.finished = true;
                Some(Err(err))
            }
        }
    }
}
