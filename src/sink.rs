//! Packed record output and its inverse.
//!
//! [`RecordSink`] appends whole records only: every call writes exactly one
//! `record_width`-byte buffer, so the output is always a clean multiple of
//! the record width. [`RecordReader`] walks such a stream back record by
//! record and unpacks each one with the same compiled layout.

use std::io::{self, Read, Write};

use crate::{layout::CompiledLayout, schema::Scalar};

pub struct RecordSink<W: Write> {
    inner: W,
    record_width: usize,
    records: u64,
    bytes: u64,
}

impl<W: Write> RecordSink<W> {
    pub fn new(inner: W, record_width: usize) -> Self {
        Self {
            inner,
            record_width,
            records: 0,
            bytes: 0,
        }
    }

    pub fn append(&mut self, record: &[u8]) -> io::Result<()> {
        if record.len() != self.record_width {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!(
                    "record of {} byte(s) does not match the {}-byte layout",
                    record.len(),
                    self.record_width
                ),
            ));
        }
        self.inner.write_all(record)?;
        self.records += 1;
        self.bytes += record.len() as u64;
        Ok(())
    }

    pub fn records_written(&self) -> u64 {
        self.records
    }

    pub fn bytes_written(&self) -> u64 {
        self.bytes
    }

    pub fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

pub struct RecordReader<'a, R: Read> {
    inner: R,
    layout: &'a CompiledLayout,
    buffer: Vec<u8>,
    records: u64,
    finished: bool,
}

impl<'a, R: Read> RecordReader<'a, R> {
    pub fn new(inner: R, layout: &'a CompiledLayout) -> Self {
        Self {
            inner,
            layout,
            buffer: vec![0u8; layout.record_width()],
            records: 0,
            finished: false,
        }
    }

    pub fn records_read(&self) -> u64 {
        self.records
    }

    /// Fills the record buffer, returning how many bytes were available.
    fn fill(&mut self) -> io::Result<usize> {
        let mut filled = 0usize;
        while filled < self.buffer.len() {
            match self.inner.read(&mut self.buffer[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => return Err(err),
            }
        }
        Ok(filled)
    }

    fn next_record(&mut self) -> io::Result<Option<Vec<Scalar>>> {
        let filled = self.fill()?;
        if filled == 0 {
            return Ok(None);
        }
        if filled < self.buffer.len() {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!(
                    "trailing {filled} byte(s) after record {} do not form a complete {}-byte record",
                    self.records,
                    self.buffer.len()
                ),
            ));
        }
        let values = self
            .layout
            .unpack(&self.buffer)
            .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))?;
        self.records += 1;
        Ok(Some(values))
    }
}

impl<R: Read> Iterator for RecordReader<'_, R> {
    type Item = io::Result<Vec<Scalar>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        let outcome = self.next_record();
        if !matches!(outcome, Ok(Some(_))) {
            self.finished = true;
        }
        outcome.transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{layout::compile, schema::Schema};

    fn pair_layout() -> CompiledLayout {
        compile(&Schema::from_declarations("x:int32,y:int32").unwrap())
    }

    #[test]
    fn append_counts_records_and_bytes() {
        let mut sink = RecordSink::new(Vec::new(), 4);
        sink.append(&[1, 2, 3, 4]).unwrap();
        sink.append(&[5, 6, 7, 8]).unwrap();
        assert_eq!(sink.records_written(), 2);
        assert_eq!(sink.bytes_written(), 8);
        assert_eq!(sink.into_inner(), vec![1, 2, 3, 4, 5, 6, 7, 8]);
    }

    #[test]
    fn append_rejects_partial_records_without_writing() {
        let mut sink = RecordSink::new(Vec::new(), 4);
        let err = sink.append(&[1, 2, 3]).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
        assert_eq!(sink.records_written(), 0);
        assert!(sink.into_inner().is_empty());
    }

    #[test]
    fn reader_walks_records_in_order() {
        let layout = pair_layout();
        let mut bytes = layout
            .pack_to_vec(&[Scalar::Integer(1), Scalar::Integer(2)])
            .unwrap();
        bytes.extend(
            layout
                .pack_to_vec(&[Scalar::Integer(3), Scalar::Integer(-4)])
                .unwrap(),
        );
        let mut reader = RecordReader::new(bytes.as_slice(), &layout);
        let records: Vec<_> = reader.by_ref().collect::<io::Result<_>>().unwrap();
        assert_eq!(
            records,
            vec![
                vec![Scalar::Integer(1), Scalar::Integer(2)],
                vec![Scalar::Integer(3), Scalar::Integer(-4)],
            ]
        );
        assert_eq!(reader.records_read(), 2);
    }

    #[test]
    fn reader_reports_trailing_partial_record() {
        let layout = pair_layout();
        let mut bytes = layout
            .pack_to_vec(&[Scalar::Integer(1), Scalar::Integer(2)])
            .unwrap();
        bytes.extend([0u8, 0, 0]);
        let mut reader = RecordReader::new(bytes.as_slice(), &layout);
        assert!(reader.next().unwrap().is_ok());
        let err = reader.next().unwrap().unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
        assert!(reader.next().is_none());
    }
}
