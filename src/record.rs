//! Key-value record.

use std::error::Error;
use std::fmt;
use std::fmt::Display;
use std::io;
use std::mem;
use std::str::FromStr;

use deepsize::DeepSizeOf;

/// Record format error. A record line must consist of exactly two whitespace-delimited tokens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormatError {
    /// Number of tokens found in the line.
    pub tokens: usize,
}

impl Error for FormatError {}

impl Display for FormatError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "expected 2 whitespace-delimited tokens, found {}", self.tokens)
    }
}

/// Key-value pair. Records are ordered by key first, then by value, both byte-lexicographically.
/// Keys and values are opaque byte strings: they are not required to be valid UTF-8.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, DeepSizeOf, serde::Serialize, serde::Deserialize)]
pub struct Record {
    pub key: Vec<u8>,
    pub value: Vec<u8>,
}

impl Record {
    pub fn new(key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) -> Self {
        Record {
            key: key.into(),
            value: value.into(),
        }
    }

    /// Parses a `key value` line. Tokens are separated by ASCII whitespace.
    pub fn parse(line: &[u8]) -> Result<Self, FormatError> {
        let mut tokens = line.split(u8::is_ascii_whitespace).filter(|token| !token.is_empty());
        match (tokens.next(), tokens.next(), tokens.next()) {
            (Some(key), Some(value), None) => Ok(Record::new(key, value)),
            (None, _, _) => Err(FormatError { tokens: 0 }),
            (Some(_), None, _) => Err(FormatError { tokens: 1 }),
            (Some(_), Some(_), Some(_)) => Err(FormatError {
                tokens: 3 + tokens.count(),
            }),
        }
    }

    /// Writes the record as `key value` without a line terminator.
    pub fn write_to<W: io::Write>(&self, writer: &mut W) -> io::Result<()> {
        writer.write_all(&self.key)?;
        writer.write_all(b" ")?;
        writer.write_all(&self.value)
    }

    /// Returns the number of heap bytes allocated by the key and value.
    /// Uses allocated capacity instead of length, so the estimate never falls behind the allocator.
    pub fn footprint(&self) -> usize {
        self.deep_size_of() - mem::size_of::<Self>()
    }
}

/// Lossy text form, invalid UTF-8 sequences are replaced. Use [`Record::write_to`] to get the exact bytes.
impl Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {}",
            String::from_utf8_lossy(&self.key),
            String::from_utf8_lossy(&self.value)
        )
    }
}

impl FromStr for Record {
    type Err = FormatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Record::parse(s.as_bytes())
    }
}

#[cfg(test)]
mod test {
    use rstest::*;

    use super::{FormatError, Record};

    #[rstest]
    #[case("a b", Ok(Record::new("a", "b")))]
    #[case("  key\tvalue  ", Ok(Record::new("key", "value")))]
    #[case("k v\r\n", Ok(Record::new("k", "v")))]
    #[case("", Err(FormatError { tokens: 0 }))]
    #[case("lonely", Err(FormatError { tokens: 1 }))]
    #[case("a b c d", Err(FormatError { tokens: 4 }))]
    fn test_parse(#[case] line: &str, #[case] expected: Result<Record, FormatError>) {
        assert_eq!(line.parse::<Record>(), expected);
    }

    #[test]
    fn test_parse_non_utf8() {
        let record = Record::parse(b"k \xe9t\xe9\n").unwrap();

        assert_eq!(record.key, b"k");
        assert_eq!(record.value, b"\xe9t\xe9");
    }

    #[test]
    fn test_write_to() {
        let mut output = Vec::new();
        Record::new("k", &b"\xff"[..]).write_to(&mut output).unwrap();

        assert_eq!(output, b"k \xff");
    }

    #[test]
    fn test_display() {
        assert_eq!(Record::new("k", "v").to_string(), "k v");
        assert_eq!(Record::new("k", &b"\xff"[..]).to_string(), "k \u{fffd}");
    }

    #[test]
    fn test_ordering() {
        let mut records = vec![
            Record::new("b", "a"),
            Record::new("a", "c"),
            Record::new("a", &b"\xe9"[..]),
            Record::new("a", "b"),
            Record::new("B", "z"),
        ];
        records.sort();

        assert_eq!(
            records,
            vec![
                Record::new("B", "z"),
                Record::new("a", "b"),
                Record::new("a", "c"),
                Record::new("a", &b"\xe9"[..]),
                Record::new("b", "a"),
            ]
        );
    }

    #[test]
    fn test_footprint_uses_capacity() {
        let mut key = Vec::with_capacity(32);
        key.push(b'k');
        let record = Record::new(key, "value");

        assert_eq!(record.footprint(), 32 + record.value.capacity());
        assert!(record.footprint() > record.key.len() + record.value.len());
    }
}
