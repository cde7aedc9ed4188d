//! Delimiter and quote resolution.
//!
//! An explicit delimiter always wins. Otherwise the first [`SAMPLE_SIZE`]
//! bytes of the input are sniffed: each candidate delimiter is counted per
//! record outside quoted sections, and the candidate whose per-record count is
//! both non-zero and the most consistent is chosen. Sampling never consumes
//! input: seekable readers are rewound, streams are replayed.

use std::{
    collections::HashMap,
    io::{self, Chain, Cursor, Read, Seek, SeekFrom},
};

use log::debug;

use crate::{error::DialectError, printable_delimiter};

pub const SAMPLE_SIZE: usize = 1024;
pub const DEFAULT_QUOTE: u8 = b'"';

const DELIMITER_CANDIDATES: &[u8] = b",\t;|:";
const QUOTE_CANDIDATES: &[u8] = b"\"'";
const CONSISTENCY_PERCENT: usize = 90;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dialect {
    pub delimiter: u8,
    pub quote: u8,
    pub has_header: bool,
}

impl Dialect {
    pub fn new(delimiter: u8, has_header: bool) -> Self {
        Self {
            delimiter,
            quote: DEFAULT_QUOTE,
            has_header,
        }
    }
}

pub fn resolve(
    explicit_delimiter: Option<u8>,
    sample: &[u8],
    has_header: bool,
) -> Result<Dialect, DialectError> {
    if let Some(delimiter) = explicit_delimiter {
        return Ok(Dialect::new(delimiter, has_header));
    }
    let truncated = sample.len() >= SAMPLE_SIZE;
    let text = String::from_utf8_lossy(sample);
    let quote = detect_quote(&text);
    let records = split_records(&text, quote, truncated);
    let delimiter = detect_delimiter(&records, quote).ok_or(DialectError::Undetectable {
        sample_len: sample.len(),
    })?;
    debug!(
        "Sniffed delimiter '{}' and quote '{}' from {} record(s) in a {}-byte sample",
        printable_delimiter(delimiter),
        quote as char,
        records.len(),
        sample.len()
    );
    Ok(Dialect {
        delimiter,
        quote,
        has_header,
    })
}

/// Reads up to [`SAMPLE_SIZE`] bytes and seeks back to where reading began.
pub fn sample_and_rewind<R>(reader: &mut R) -> io::Result<Vec<u8>>
where
    R: Read + Seek,
{
    let start = reader.stream_position()?;
    let mut sample = Vec::with_capacity(SAMPLE_SIZE);
    reader
        .by_ref()
        .take(SAMPLE_SIZE as u64)
        .read_to_end(&mut sample)?;
    reader.seek(SeekFrom::Start(start))?;
    Ok(sample)
}

/// Reads up to [`SAMPLE_SIZE`] bytes from a non-seekable stream and returns
/// them together with a reader that yields the sample again before the rest
/// of the stream.
pub fn sample_and_replay<R>(mut reader: R) -> io::Result<(Vec<u8>, Chain<Cursor<Vec<u8>>, R>)>
where
    R: Read,
{
    let mut sample = Vec::with_capacity(SAMPLE_SIZE);
    reader
        .by_ref()
        .take(SAMPLE_SIZE as u64)
        .read_to_end(&mut sample)?;
    let replay = Cursor::new(sample.clone()).chain(reader);
    Ok((sample, replay))
}

fn is_field_edge(byte: Option<u8>) -> bool {
    match byte {
        None => true,
        Some(b) => b == b'\n' || b == b'\r' || b == b' ' || DELIMITER_CANDIDATES.contains(&b),
    }
}

/// A quote candidate scores when it opens a field and a matching close ends
/// one, so apostrophes inside words do not count.
fn detect_quote(text: &str) -> u8 {
    let bytes = text.as_bytes();
    let mut best = (DEFAULT_QUOTE, 0usize);
    for &quote in QUOTE_CANDIDATES {
        let mut score = 0usize;
        let mut idx = 0usize;
        while idx < bytes.len() {
            let prev = idx.checked_sub(1).map(|p| bytes[p]);
            if bytes[idx] == quote && is_field_edge(prev) {
                if let Some(close) = bytes[idx + 1..].iter().position(|&b| b == quote) {
                    let end = idx + 1 + close;
                    if is_field_edge(bytes.get(end + 1).copied()) {
                        score += 1;
                        idx = end + 1;
                        continue;
                    }
                }
            }
            idx += 1;
        }
        if score > best.1 {
            best = (quote, score);
        }
    }
    best.0
}

/// Splits the sample into logical records, honouring quoted line breaks.
/// When the sample filled the buffer its trailing record is probably cut
/// short and is dropped, unless it is the only one.
fn split_records(text: &str, quote: u8, truncated: bool) -> Vec<String> {
    let mut records = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    for ch in text.chars() {
        if ch == quote as char {
            in_quotes = !in_quotes;
        }
        if ch == '\n' && !in_quotes {
            records.push(std::mem::take(&mut current));
            continue;
        }
        current.push(ch);
    }
    let tail_complete = !truncated || records.is_empty();
    if !current.is_empty() && tail_complete {
        records.push(current);
    }
    records
        .into_iter()
        .map(|record| record.trim_end_matches('\r').to_string())
        .filter(|record| !record.trim().is_empty())
        .collect()
}

fn count_outside_quotes(record: &str, delimiter: u8, quote: u8) -> usize {
    let mut in_quotes = false;
    let mut count = 0usize;
    for &byte in record.as_bytes() {
        if byte == quote {
            in_quotes = !in_quotes;
        } else if byte == delimiter && !in_quotes {
            count += 1;
        }
    }
    count
}

fn detect_delimiter(records: &[String], quote: u8) -> Option<u8> {
    if records.is_empty() {
        return None;
    }
    let mut best: Option<(u8, usize)> = None;
    for &candidate in DELIMITER_CANDIDATES {
        let mut frequencies: HashMap<usize, usize> = HashMap::new();
        for record in records {
            *frequencies
                .entry(count_outside_quotes(record, candidate, quote))
                .or_insert(0) += 1;
        }
        // Modal count per record; ties go to the larger count.
        let Some((mode, agreeing)) = frequencies
            .into_iter()
            .max_by(|a, b| a.1.cmp(&b.1).then(a.0.cmp(&b.0)))
        else {
            continue;
        };
        if mode == 0 || agreeing * 100 < records.len() * CONSISTENCY_PERCENT {
            continue;
        }
        debug!(
            "Delimiter candidate '{}': {} per record in {}/{} record(s)",
            printable_delimiter(candidate),
            mode,
            agreeing,
            records.len()
        );
        if best.is_none_or(|(_, score)| agreeing > score) {
            best = Some((candidate, agreeing));
        }
    }
    best.map(|(delimiter, _)| delimiter)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sniff(sample: &str) -> Result<Dialect, DialectError> {
        resolve(None, sample.as_bytes(), false)
    }

    #[test]
    fn explicit_delimiter_skips_sampling() {
        let dialect = resolve(Some(b'|'), b"", true).unwrap();
        assert_eq!(dialect, Dialect::new(b'|', true));
    }

    #[test]
    fn sniffs_common_delimiters() {
        assert_eq!(sniff("1,2,3\n4,5,6\n").unwrap().delimiter, b',');
        assert_eq!(sniff("1\t2\n3\t4\n").unwrap().delimiter, b'\t');
        assert_eq!(sniff("a;b;c\n1;2;3\n4;5;6").unwrap().delimiter, b';');
        assert_eq!(sniff("1|2\n3|4\n").unwrap().delimiter, b'|');
    }

    #[test]
    fn prefers_earlier_candidate_when_equally_consistent() {
        let sample = "2024-01-01 09:30:00,101.5\n2024-01-01 09:30:01,101.6\n";
        assert_eq!(sniff(sample).unwrap().delimiter, b',');
    }

    #[test]
    fn delimiters_inside_quotes_are_ignored() {
        let sample = "\"a;b\",1;2\n\"c;d\",3;4\n";
        let dialect = sniff(sample).unwrap();
        assert_eq!(dialect.delimiter, b',');
        assert_eq!(dialect.quote, b'"');
    }

    #[test]
    fn detects_single_quote_character() {
        let sample = "'x,y';1\n'z,w';2\n";
        let dialect = sniff(sample).unwrap();
        assert_eq!(dialect.quote, b'\'');
        assert_eq!(dialect.delimiter, b';');
    }

    #[test]
    fn single_column_and_empty_samples_are_undetectable() {
        assert!(matches!(
            sniff("1\n2\n3\n"),
            Err(DialectError::Undetectable { sample_len: 6 })
        ));
        assert!(matches!(sniff(""), Err(DialectError::Undetectable { .. })));
        assert!(matches!(
            sniff("\n  \n"),
            Err(DialectError::Undetectable { .. })
        ));
    }

    #[test]
    fn inconsistent_counts_are_rejected() {
        let sample = "a,b\nc\nd\ne,f,g,h\n";
        assert!(sniff(sample).is_err());
    }

    #[test]
    fn truncated_tail_record_is_ignored() {
        let mut sample = String::new();
        while sample.len() < SAMPLE_SIZE {
            sample.push_str("1,2,3\n");
        }
        sample.truncate(SAMPLE_SIZE - 1);
        sample.push('|');
        assert_eq!(sniff(&sample).unwrap().delimiter, b',');
    }

    #[test]
    fn sample_and_rewind_restores_position() {
        let mut cursor = Cursor::new(b"x,y\n1,2\n".to_vec());
        let sample = sample_and_rewind(&mut cursor).unwrap();
        assert_eq!(sample, b"x,y\n1,2\n");
        assert_eq!(cursor.position(), 0);
        let mut rest = String::new();
        cursor.read_to_string(&mut rest).unwrap();
        assert_eq!(rest, "x,y\n1,2\n");
    }

    #[test]
    fn sample_and_replay_keeps_every_byte() {
        let payload: Vec<u8> = (0..3000u32).map(|i| b'a' + (i % 26) as u8).collect();
        let (sample, mut replay) = sample_and_replay(Cursor::new(payload.clone())).unwrap();
        assert_eq!(sample.len(), SAMPLE_SIZE);
        let mut all = Vec::new();
        replay.read_to_end(&mut all).unwrap();
        assert_eq!(all, payload);
    }
}
