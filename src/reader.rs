//! Line-oriented record reader.

use std::error::Error;
use std::fmt;
use std::fmt::Display;
use std::io;
use std::io::prelude::*;

use log;

use crate::record::{FormatError, Record};

/// Record stream error.
#[derive(Debug)]
pub enum RecordError {
    /// Underlying stream read error.
    IO(io::Error),
    /// Malformed record line.
    Format { line: u64, err: FormatError },
}

impl Error for RecordError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        Some(match &self {
            RecordError::IO(err) => err,
            RecordError::Format { err, .. } => err,
        })
    }
}

impl Display for RecordError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self {
            RecordError::IO(err) => write!(f, "record stream read failed: {}", err),
            RecordError::Format { line, err } => write!(f, "malformed record at line {}: {}", line, err),
        }
    }
}

impl From<io::Error> for RecordError {
    fn from(err: io::Error) -> Self {
        RecordError::IO(err)
    }
}

/// Malformed record handling policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MalformedPolicy {
    /// Report a malformed line as an error.
    Fail,
    /// Treat the first malformed line as the end of input.
    Truncate,
}

impl Default for MalformedPolicy {
    fn default() -> Self {
        MalformedPolicy::Fail
    }
}

/// Reads `key value` records from a buffered stream, one record per line. Blank lines are skipped.
/// Lines are split on ASCII whitespace, any other bytes are kept as they are.
/// The reader is fused: after the end of input or an error it keeps returning [`None`].
pub struct RecordReader<R> {
    reader: R,
    policy: MalformedPolicy,
    line: Vec<u8>,
    line_no: u64,
    done: bool,
}

impl<R: BufRead> RecordReader<R> {
    pub fn new(reader: R) -> Self {
        Self::with_policy(reader, MalformedPolicy::default())
    }

    pub fn with_policy(reader: R, policy: MalformedPolicy) -> Self {
        RecordReader {
            reader,
            policy,
            line: Vec::new(),
            line_no: 0,
            done: false,
        }
    }
}

impl<R: BufRead> Iterator for RecordReader<R> {
    type Item = Result<Record, RecordError>;

    fn next(&mut self) -> Option<Self::Item> {
        while !self.done {
            self.line.clear();
            match self.reader.read_until(b'\n', &mut self.line) {
                Ok(0) => self.done = true,
                Ok(_) => {
                    self.line_no += 1;
                    if self.line.iter().all(u8::is_ascii_whitespace) {
                        continue;
                    }
                    match Record::parse(&self.line) {
                        Ok(record) => return Some(Ok(record)),
                        Err(err) if self.policy == MalformedPolicy::Truncate => {
                            log::warn!(
                                "malformed record at line {} ({}), treating it as end of input",
                                self.line_no,
                                err
                            );
                            self.done = true;
                        }
                        Err(err) => {
                            self.done = true;
                            return Some(Err(RecordError::Format {
                                line: self.line_no,
                                err,
                            }));
                        }
                    }
                }
                Err(err) => {
                    self.done = true;
                    return Some(Err(RecordError::IO(err)));
                }
            }
        }

        None
    }
}

/// Reads the memory limit header: the first whitespace-delimited token of the stream holding a number of bytes.
/// Only the token is consumed, whatever follows it on the same line is left in the stream as record input.
pub fn read_memory_limit<R: BufRead>(reader: &mut R) -> io::Result<u64> {
    let mut token = Vec::new();
    loop {
        let buf = reader.fill_buf()?;
        if buf.is_empty() {
            break;
        }

        let mut used = 0;
        let mut complete = false;
        for &byte in buf {
            if !byte.is_ascii_whitespace() {
                token.push(byte);
            } else if !token.is_empty() {
                complete = true;
                break;
            }
            used += 1;
        }
        reader.consume(used);

        if complete {
            break;
        }
    }

    if token.is_empty() {
        return Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            "memory limit expected before the first record",
        ));
    }

    return std::str::from_utf8(&token)
        .map_err(|err| err.to_string())
        .and_then(|header| header.parse::<u64>().map_err(|err| err.to_string()))
        .map_err(|err| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                format!(
                    "memory limit '{}' is not a number of bytes: {}",
                    String::from_utf8_lossy(&token),
                    err
                ),
            )
        });
}

#[cfg(test)]
mod test {
    use std::io::{self, Cursor};

    use rstest::*;

    use super::{read_memory_limit, MalformedPolicy, RecordError, RecordReader};
    use crate::record::{FormatError, Record};

    #[test]
    fn test_reader() {
        let input = Cursor::new("a 1\n\n  b 2  \nc 3");
        let records: Result<Vec<Record>, RecordError> = RecordReader::new(input).collect();

        assert_eq!(
            records.unwrap(),
            vec![Record::new("a", "1"), Record::new("b", "2"), Record::new("c", "3")]
        );
    }

    #[test]
    fn test_reader_fails_on_malformed_line() {
        let mut reader = RecordReader::new(Cursor::new("a 1\nb\nc 3\n"));

        assert_eq!(reader.next().unwrap().unwrap(), Record::new("a", "1"));
        match reader.next() {
            Some(Err(RecordError::Format { line, err })) => {
                assert_eq!(line, 2);
                assert_eq!(err, FormatError { tokens: 1 });
            }
            other => panic!("unexpected result: {:?}", other),
        }
        assert!(reader.next().is_none());
    }

    #[rstest]
    #[case("a 1\nb 2\nc\n", 2)]
    #[case("a 1\nb 2 extra\nc 3\n", 1)]
    #[case("a 1\nb 2\n", 2)]
    fn test_reader_truncates_on_malformed_line(#[case] input: &str, #[case] expected_len: usize) {
        let reader = RecordReader::with_policy(Cursor::new(input.to_string()), MalformedPolicy::Truncate);
        let records: Result<Vec<Record>, RecordError> = reader.collect();

        assert_eq!(records.unwrap().len(), expected_len);
    }

    #[test]
    fn test_reader_keeps_non_utf8_bytes() {
        let input = Cursor::new(b"k \xe9t\xe9\nk a\n".to_vec());
        let records: Result<Vec<Record>, RecordError> = RecordReader::new(input).collect();

        assert_eq!(
            records.unwrap(),
            vec![Record::new("k", &b"\xe9t\xe9"[..]), Record::new("k", "a")]
        );
    }

    #[rstest]
    #[case("1048576\na b\n", Some(1048576))]
    #[case("\n  42  \n", Some(42))]
    #[case("1048576 a a\n", Some(1048576))]
    #[case("7", Some(7))]
    #[case("lots\n", None)]
    #[case("12MB\n", None)]
    #[case(" \n\t", None)]
    #[case("", None)]
    fn test_read_memory_limit(#[case] input: &str, #[case] expected: Option<u64>) {
        let mut cursor = Cursor::new(input.to_string());
        let actual = read_memory_limit(&mut cursor).ok();

        assert_eq!(actual, expected);
    }

    #[test]
    fn test_records_follow_memory_limit() {
        let mut input = io::BufReader::new(Cursor::new("100\nk v\n"));
        assert_eq!(read_memory_limit(&mut input).unwrap(), 100);

        let records: Vec<Record> = RecordReader::new(input).map(Result::unwrap).collect();
        assert_eq!(records, vec![Record::new("k", "v")]);
    }

    #[test]
    fn test_records_share_memory_limit_line() {
        // a tiny buffer makes the header and the first record span several reads
        let mut input = io::BufReader::with_capacity(3, Cursor::new("1048576 a a\nb b\n"));
        assert_eq!(read_memory_limit(&mut input).unwrap(), 1048576);

        let records: Vec<Record> = RecordReader::new(input).map(Result::unwrap).collect();
        assert_eq!(records, vec![Record::new("a", "a"), Record::new("b", "b")]);
    }
}
