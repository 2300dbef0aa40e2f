//! Grouping of sorted records by key.

use std::error::Error;
use std::fmt;
use std::fmt::Display;
use std::io;
use std::io::prelude::*;

use crate::record::Record;

/// Grouping error.
#[derive(Debug)]
pub enum GroupError<E: Error> {
    /// Output stream write error.
    Output(io::Error),
    /// Record stream error.
    Input(E),
}

impl<E> Error for GroupError<E>
where
    E: Error + 'static,
{
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        Some(match &self {
            GroupError::Output(err) => err,
            GroupError::Input(err) => err,
        })
    }
}

impl<E: Error> Display for GroupError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self {
            GroupError::Output(err) => write!(f, "output write failed: {}", err),
            GroupError::Input(err) => write!(f, "record stream error: {}", err),
        }
    }
}

/// Grouping statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GroupStats {
    /// Number of grouped records.
    pub records: u64,
    /// Number of distinct keys, i.e. output lines.
    pub keys: u64,
}

/// Writes records sorted by key as one `key value1 value2 ...` line per distinct key.
/// Records must arrive sorted, otherwise a key may be reported on several lines.
pub struct GroupWriter<W: Write> {
    output: W,
    current_key: Option<Vec<u8>>,
    stats: GroupStats,
}

impl<W: Write> GroupWriter<W> {
    pub fn new(output: W) -> Self {
        GroupWriter {
            output,
            current_key: None,
            stats: GroupStats::default(),
        }
    }

    /// Appends a record to the current line or starts a new line if the record key differs.
    pub fn write(&mut self, record: Record) -> io::Result<()> {
        self.stats.records += 1;

        if self.current_key.as_deref() == Some(record.key.as_slice()) {
            self.output.write_all(b" ")?;
            return self.output.write_all(&record.value);
        }

        if self.current_key.is_some() {
            self.output.write_all(b"\n")?;
        }
        record.write_to(&mut self.output)?;
        self.stats.keys += 1;
        self.current_key = Some(record.key);

        return Ok(());
    }

    /// Terminates the last line, if any, and flushes the output.
    pub fn finish(mut self) -> io::Result<(W, GroupStats)> {
        if self.current_key.is_some() {
            self.output.write_all(b"\n")?;
        }
        self.output.flush()?;

        return Ok((self.output, self.stats));
    }
}

/// Groups a sorted record stream and writes the groups to `output`.
pub fn write_groups<E, I, W>(records: I, output: W) -> Result<GroupStats, GroupError<E>>
where
    E: Error,
    I: IntoIterator<Item = Result<Record, E>>,
    W: Write,
{
    let mut writer = GroupWriter::new(output);
    for record in records.into_iter() {
        let record = record.map_err(GroupError::Input)?;
        writer.write(record).map_err(GroupError::Output)?;
    }
    let (_, stats) = writer.finish().map_err(GroupError::Output)?;

    return Ok(stats);
}

#[cfg(test)]
mod test {
    use std::io::{self, ErrorKind};

    use rstest::*;

    use super::{write_groups, GroupError, GroupStats, GroupWriter};
    use crate::record::Record;

    fn sorted(pairs: &[(&str, &str)]) -> Vec<Result<Record, io::Error>> {
        let mut records = Vec::from_iter(pairs.iter().map(|(k, v)| Record::new(*k, *v)));
        records.sort();
        Vec::from_iter(records.into_iter().map(Ok))
    }

    #[rstest]
    #[case(&[], "", 0)]
    #[case(&[("a", "a")], "a a\n", 1)]
    #[case(&[("a", "b"), ("a", "a")], "a a b\n", 1)]
    #[case(&[("b", "b"), ("a", "a")], "a a\nb b\n", 2)]
    #[case(&[("a", "x"), ("a", "x"), ("b", "y")], "a x x\nb y\n", 2)]
    #[case(&[("", "x")], " x\n", 1)]
    fn test_write_groups(#[case] pairs: &[(&str, &str)], #[case] expected: &str, #[case] keys: u64) {
        let mut output = Vec::new();
        let stats = write_groups(sorted(pairs), &mut output).unwrap();

        assert_eq!(String::from_utf8(output).unwrap(), expected);
        assert_eq!(
            stats,
            GroupStats {
                records: pairs.len() as u64,
                keys
            }
        );
    }

    #[test]
    fn test_group_writer_returns_output() {
        let mut writer = GroupWriter::new(Vec::new());
        writer.write(Record::new("k", "1")).unwrap();
        writer.write(Record::new("k", "2")).unwrap();

        let (output, stats) = writer.finish().unwrap();
        assert_eq!(output, b"k 1 2\n");
        assert_eq!(stats.keys, 1);
    }

    #[test]
    fn test_group_writer_keeps_bytes() {
        let mut writer = GroupWriter::new(Vec::new());
        writer.write(Record::new("k", "a")).unwrap();
        writer.write(Record::new("k", &b"\xe9t\xe9"[..])).unwrap();
        writer.write(Record::new(&b"\xff"[..], "b")).unwrap();

        let (output, stats) = writer.finish().unwrap();
        assert_eq!(output, b"k a \xe9t\xe9\n\xff b\n");
        assert_eq!(stats.keys, 2);
    }

    #[test]
    fn test_write_groups_input_error() {
        let records: Vec<Result<Record, io::Error>> = vec![
            Ok(Record::new("a", "a")),
            Err(io::Error::new(ErrorKind::Other, "test error")),
        ];

        let mut output = Vec::new();
        match write_groups(records, &mut output) {
            Err(GroupError::Input(err)) => assert_eq!(err.to_string(), "test error"),
            other => panic!("unexpected result: {:?}", other),
        }
    }
}
