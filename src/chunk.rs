//! External chunks: sorted record runs stored in spill files.

use std::error::Error;
use std::fmt;
use std::fmt::Display;
use std::fs;
use std::io;
use std::io::prelude::*;
use std::marker::PhantomData;

use crate::reader::{RecordError, RecordReader};
use crate::record::Record;
use crate::spill::{SpillDir, SpillFile};

/// External chunk creation error.
#[derive(Debug)]
pub enum ExternalChunkError<S: Error> {
    /// Spill file creation or write error.
    IO(io::Error),
    /// Data serialization error.
    SerializationError(S),
}

impl<S: Error> Error for ExternalChunkError<S> {}

impl<S: Error> Display for ExternalChunkError<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExternalChunkError::IO(err) => write!(f, "{}", err),
            ExternalChunkError::SerializationError(err) => write!(f, "{}", err),
        }
    }
}

impl<S: Error> From<io::Error> for ExternalChunkError<S> {
    fn from(err: io::Error) -> Self {
        ExternalChunkError::IO(err)
    }
}

/// External chunk interface. Provides methods for storing a sorted run in a spill file and reading it back.
/// A chunk owns its spill file, so the file is removed once the chunk is dropped.
pub trait ExternalChunk<T>: Sized + Iterator<Item = Result<T, Self::DeserializationError>> {
    /// Spill file extension.
    const EXTENSION: &'static str;

    type SerializationError: Error;
    type DeserializationError: Error;

    /// Writes items to a new spill file allocated in `dir`.
    fn build(
        dir: &SpillDir,
        items: impl IntoIterator<Item = T>,
        buf_size: usize,
    ) -> Result<SpillFile, ExternalChunkError<Self::SerializationError>> {
        let path = dir.next_path(Self::EXTENSION);
        let tmp_file = fs::File::create(&path)?;
        let mut spill_file = SpillFile::new(path);

        let mut chunk_writer = io::BufWriter::with_capacity(buf_size, tmp_file);
        Self::dump(&mut chunk_writer, items).map_err(ExternalChunkError::SerializationError)?;
        chunk_writer.flush()?;

        spill_file.set_len(chunk_writer.get_ref().metadata()?.len());

        return Ok(spill_file);
    }

    /// Opens a spill file for reading using a dedicated buffer of `buf_size` bytes.
    fn open(file: SpillFile, buf_size: usize) -> io::Result<Self> {
        let chunk_reader = io::BufReader::with_capacity(buf_size, fs::File::open(file.path())?);
        let file_len = file.len();

        return Ok(Self::new(chunk_reader.take(file_len), file));
    }

    /// Creates an instance of an external chunk.
    fn new(reader: io::Take<io::BufReader<fs::File>>, file: SpillFile) -> Self;

    /// Dumps items to an external file.
    fn dump(
        chunk_writer: &mut io::BufWriter<fs::File>,
        items: impl IntoIterator<Item = T>,
    ) -> Result<(), Self::SerializationError>;
}

/// Plain text external chunk. Stores one `key value` record per line.
pub struct TextExternalChunk {
    reader: RecordReader<io::Take<io::BufReader<fs::File>>>,
    _file: SpillFile,
}

impl ExternalChunk<Record> for TextExternalChunk {
    const EXTENSION: &'static str = "txt";

    type SerializationError = io::Error;
    type DeserializationError = RecordError;

    fn new(reader: io::Take<io::BufReader<fs::File>>, file: SpillFile) -> Self {
        TextExternalChunk {
            reader: RecordReader::new(reader),
            _file: file,
        }
    }

    fn dump(
        chunk_writer: &mut io::BufWriter<fs::File>,
        items: impl IntoIterator<Item = Record>,
    ) -> Result<(), Self::SerializationError> {
        for item in items.into_iter() {
            item.write_to(chunk_writer)?;
            chunk_writer.write_all(b"\n")?;
        }

        return Ok(());
    }
}

impl Iterator for TextExternalChunk {
    type Item = Result<Record, RecordError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.reader.next()
    }
}

/// RMP (Rust MessagePack) external chunk implementation.
/// It uses MessagePack as a data serialization format.
/// For more information see https://msgpack.org/.
pub struct RmpExternalChunk<T> {
    reader: io::Take<io::BufReader<fs::File>>,
    _file: SpillFile,

    item_type: PhantomData<T>,
}

impl<T> ExternalChunk<T> for RmpExternalChunk<T>
where
    T: serde::ser::Serialize + serde::de::DeserializeOwned,
{
    const EXTENSION: &'static str = "rmp";

    type SerializationError = rmp_serde::encode::Error;
    type DeserializationError = rmp_serde::decode::Error;

    fn new(reader: io::Take<io::BufReader<fs::File>>, file: SpillFile) -> Self {
        RmpExternalChunk {
            reader,
            _file: file,
            item_type: PhantomData,
        }
    }

    fn dump(
        mut chunk_writer: &mut io::BufWriter<fs::File>,
        items: impl IntoIterator<Item = T>,
    ) -> Result<(), Self::SerializationError> {
        for item in items.into_iter() {
            rmp_serde::encode::write(&mut chunk_writer, &item)?;
        }

        return Ok(());
    }
}

impl<T> Iterator for RmpExternalChunk<T>
where
    T: serde::ser::Serialize + serde::de::DeserializeOwned,
{
    type Item = Result<T, rmp_serde::decode::Error>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.reader.limit() == 0 {
            None
        } else {
            Some(rmp_serde::decode::from_read(&mut self.reader))
        }
    }
}

#[cfg(test)]
mod test {
    use rstest::*;

    use super::{ExternalChunk, RmpExternalChunk, TextExternalChunk};
    use crate::record::Record;
    use crate::spill::SpillDir;

    #[fixture]
    fn spill_dir() -> SpillDir {
        SpillDir::new(None).unwrap()
    }

    fn records() -> Vec<Record> {
        Vec::from_iter((0..100).map(|i| Record::new(format!("{:03}", i / 10), format!("{:03}", i))))
    }

    #[rstest]
    fn test_text_chunk(spill_dir: SpillDir) {
        let saved = records();

        let file = TextExternalChunk::build(&spill_dir, saved.clone(), 4096).unwrap();
        assert!(file.path().extension().unwrap() == "txt");
        assert!(file.len() > 0);

        let chunk = TextExternalChunk::open(file, 4096).unwrap();
        let restored: Result<Vec<Record>, _> = chunk.collect();

        assert_eq!(restored.unwrap(), saved);
    }

    #[rstest]
    fn test_text_chunk_non_utf8(spill_dir: SpillDir) {
        let saved = vec![Record::new("k", &b"\xe9t\xe9"[..]), Record::new(&b"\xff"[..], "v")];

        let file = TextExternalChunk::build(&spill_dir, saved.clone(), 4096).unwrap();
        let restored: Result<Vec<Record>, _> = TextExternalChunk::open(file, 4096).unwrap().collect();

        assert_eq!(restored.unwrap(), saved);
    }

    #[rstest]
    fn test_rmp_chunk(spill_dir: SpillDir) {
        let saved = records();

        let file = RmpExternalChunk::<Record>::build(&spill_dir, saved.clone(), 4096).unwrap();
        let chunk: RmpExternalChunk<Record> = ExternalChunk::open(file, 4096).unwrap();
        let restored: Result<Vec<Record>, _> = chunk.collect();

        assert_eq!(restored.unwrap(), saved);
    }

    #[rstest]
    fn test_empty_chunk(spill_dir: SpillDir) {
        let file = TextExternalChunk::build(&spill_dir, Vec::new(), 4096).unwrap();
        assert!(file.is_empty());

        let mut chunk = TextExternalChunk::open(file, 4096).unwrap();
        assert!(chunk.next().is_none());
    }

    #[rstest]
    fn test_chunk_removes_file_when_dropped(spill_dir: SpillDir) {
        let file = TextExternalChunk::build(&spill_dir, records(), 4096).unwrap();
        let path = file.path().to_path_buf();

        let mut chunk = TextExternalChunk::open(file, 4096).unwrap();
        assert!(chunk.next().is_some());
        assert!(path.exists());

        drop(chunk);
        assert!(!path.exists());
    }
}
