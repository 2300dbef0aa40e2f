//! External sorter.

use log;
use std::collections::VecDeque;
use std::error::Error;
use std::fmt;
use std::fmt::{Debug, Display};
use std::io;
use std::io::prelude::*;
use std::marker::PhantomData;
use std::path::Path;

use crate::buffer::MemoryLimitedBuffer;
use crate::chunk::{ExternalChunk, ExternalChunkError, TextExternalChunk};
use crate::group::{write_groups, GroupError};
use crate::merger::BinaryHeapMerger;
use crate::record::Record;
use crate::spill::{SpillDir, SpillFile};

/// Default memory limit (64 MiB).
pub const DEFAULT_MEMORY_LIMIT: u64 = 64 * 1024 * 1024;

/// Default spill file read/write buffer size (256 KiB).
pub const DEFAULT_RW_BUF_SIZE: usize = 256 * 1024;

/// Sorting error.
#[derive(Debug)]
pub enum SortError<S: Error, D: Error, I: Error> {
    /// Temporary directory or file creation error.
    TempDir(io::Error),
    /// Common I/O error.
    IO(io::Error),
    /// Data serialization error.
    SerializationError(S),
    /// Data deserialization error.
    DeserializationError(D),
    /// Input data stream error
    InputError(I),
    /// Memory limit and buffer size leave no room for merging.
    Config(String),
}

impl<S, D, I> Error for SortError<S, D, I>
where
    S: Error + 'static,
    D: Error + 'static,
    I: Error + 'static,
{
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        Some(match &self {
            SortError::TempDir(err) => err,
            SortError::IO(err) => err,
            SortError::SerializationError(err) => err,
            SortError::DeserializationError(err) => err,
            SortError::InputError(err) => err,
            SortError::Config(_) => return None,
        })
    }
}

impl<S: Error, D: Error, I: Error> Display for SortError<S, D, I> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self {
            SortError::TempDir(err) => write!(f, "temporary directory or file not created: {}", err),
            SortError::IO(err) => write!(f, "I/O operation failed: {}", err),
            SortError::SerializationError(err) => write!(f, "data serialization error: {}", err),
            SortError::DeserializationError(err) => write!(f, "data deserialization error: {}", err),
            SortError::InputError(err) => write!(f, "input data stream error: {}", err),
            SortError::Config(msg) => write!(f, "invalid configuration: {}", msg),
        }
    }
}

impl<S: Error, D: Error, I: Error> From<ExternalChunkError<S>> for SortError<S, D, I> {
    fn from(err: ExternalChunkError<S>) -> Self {
        match err {
            ExternalChunkError::IO(err) => SortError::IO(err),
            ExternalChunkError::SerializationError(err) => SortError::SerializationError(err),
        }
    }
}

/// Sorting error produced by a sorter using `C` chunks and `E` input errors.
pub type ChunkSortError<C, E> =
    SortError<<C as ExternalChunk<Record>>::SerializationError, <C as ExternalChunk<Record>>::DeserializationError, E>;

/// Grouping pipeline statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineStats {
    /// Number of input records.
    pub records: u64,
    /// Number of spill files created from the input.
    pub spill_files: usize,
    /// Number of batch merges performed to fit the fan-in limit.
    pub merge_rounds: usize,
    /// Number of distinct keys written.
    pub keys: u64,
}

/// External sorter builder. Provides methods for [`ExternalSorter`] initialization.
#[derive(Clone)]
pub struct ExternalSorterBuilder<E, C = TextExternalChunk>
where
    E: Error,
    C: ExternalChunk<Record>,
{
    /// Directory to be used to store temporary data.
    tmp_dir: Option<Box<Path>>,
    /// Memory limit in bytes.
    memory_limit: u64,
    /// Chunk file read/write buffer size.
    rw_buf_size: usize,

    /// External chunk type.
    external_chunk_type: PhantomData<C>,
    /// Input error type.
    input_error_type: PhantomData<E>,
}

impl<E, C> ExternalSorterBuilder<E, C>
where
    E: Error,
    C: ExternalChunk<Record>,
{
    /// Creates an instance of a builder with default parameters.
    pub fn new() -> Self {
        ExternalSorterBuilder::default()
    }

    /// Builds an [`ExternalSorter`] instance using provided configuration.
    pub fn build(self) -> Result<ExternalSorter<E, C>, ChunkSortError<C, E>> {
        ExternalSorter::new(self.tmp_dir.as_deref(), self.memory_limit, self.rw_buf_size)
    }

    /// Sets directory to be used to store temporary data.
    pub fn with_tmp_dir(mut self, path: &Path) -> ExternalSorterBuilder<E, C> {
        self.tmp_dir = Some(path.into());
        return self;
    }

    /// Sets the memory limit in bytes.
    pub fn with_memory_limit(mut self, memory_limit: u64) -> ExternalSorterBuilder<E, C> {
        self.memory_limit = memory_limit;
        return self;
    }

    /// Sets chunk read/write buffer size.
    pub fn with_rw_buf_size(mut self, buf_size: usize) -> ExternalSorterBuilder<E, C> {
        self.rw_buf_size = buf_size;
        return self;
    }
}

impl<E, C> Default for ExternalSorterBuilder<E, C>
where
    E: Error,
    C: ExternalChunk<Record>,
{
    fn default() -> Self {
        ExternalSorterBuilder {
            tmp_dir: None,
            memory_limit: DEFAULT_MEMORY_LIMIT,
            rw_buf_size: DEFAULT_RW_BUF_SIZE,
            external_chunk_type: PhantomData,
            input_error_type: PhantomData,
        }
    }
}

/// External sorter.
///
/// Half of the memory limit is granted to the in-memory spill buffer, the rest is left to allocator overhead.
/// The same half bounds the read buffers of simultaneously open spill files, one buffer being reserved
/// for the output stream.
pub struct ExternalSorter<E, C = TextExternalChunk>
where
    E: Error,
    C: ExternalChunk<Record>,
{
    /// Directory to be used to store temporary data.
    spill_dir: SpillDir,
    /// Spill buffer memory budget in bytes.
    spill_budget: u64,
    /// Chunk file read/write buffer size.
    rw_buf_size: usize,

    /// External chunk type.
    external_chunk_type: PhantomData<C>,
    /// Input error type.
    input_error_type: PhantomData<E>,
}

impl<E, C> ExternalSorter<E, C>
where
    E: Error,
    C: ExternalChunk<Record>,
{
    /// Creates a new external sorter instance.
    ///
    /// # Arguments
    /// * `tmp_path` - Directory to be used to store temporary data. If parameter is [`None`] default OS temporary
    ///   directory will be used.
    /// * `memory_limit` - Maximum memory in bytes the sorter is allowed to use.
    /// * `rw_buf_size` - Chunks file read/write buffer size.
    pub fn new(tmp_path: Option<&Path>, memory_limit: u64, rw_buf_size: usize) -> Result<Self, ChunkSortError<C, E>> {
        if rw_buf_size == 0 {
            return Err(SortError::Config("read/write buffer size must be positive".to_string()));
        }

        let sorter = ExternalSorter {
            spill_dir: SpillDir::new(tmp_path).map_err(SortError::TempDir)?,
            spill_budget: memory_limit / 2,
            rw_buf_size,
            external_chunk_type: PhantomData,
            input_error_type: PhantomData,
        };

        log::info!(
            "memory limit: {} bytes (spill budget: {} bytes, buffer size: {} bytes, max open files: {})",
            memory_limit,
            sorter.spill_budget,
            rw_buf_size,
            sorter.max_open_files()
        );

        return Ok(sorter);
    }

    /// Returns the number of spill files that can be merged at once.
    pub fn max_open_files(&self) -> usize {
        ((self.spill_budget / self.rw_buf_size as u64) as usize).saturating_sub(1)
    }

    /// Returns the directory spill files are stored in.
    pub fn tmp_dir(&self) -> &Path {
        self.spill_dir.path()
    }

    /// Sorts data from the input.
    /// Returns an iterator that can be used to get sorted data stream.
    ///
    /// # Arguments
    /// * `input` - Input stream data to be fetched from
    pub fn sort<I>(&self, input: I) -> Result<BinaryHeapMerger<Record, C::DeserializationError, C>, ChunkSortError<C, E>>
    where
        I: IntoIterator<Item = Result<Record, E>>,
    {
        let files = self.spill(input)?;
        let (files, _) = self.reduce_counted(files)?;

        return self.merge(files);
    }

    /// Groups input records by key and writes one `key value1 value2 ...` line per distinct key to the output.
    /// Keys and values of every key are written in ascending order.
    ///
    /// # Arguments
    /// * `input` - Input stream data to be fetched from
    /// * `output` - Output stream groups to be written to
    pub fn group<I, W>(&self, input: I, output: W) -> Result<PipelineStats, ChunkSortError<C, E>>
    where
        I: IntoIterator<Item = Result<Record, E>>,
        W: Write,
    {
        let files = self.spill(input)?;
        let spill_files = files.len();

        let (files, merge_rounds) = self.reduce_counted(files)?;
        let merger = self.merge(files)?;

        log::debug!("grouping records of {} files", merger.chunks_number());
        let stats = write_groups(merger, output).map_err(|err| match err {
            GroupError::Output(err) => SortError::IO(err),
            GroupError::Input(err) => SortError::DeserializationError(err),
        })?;

        log::info!(
            "grouped {} records into {} keys ({} spill files, {} merge rounds)",
            stats.records,
            stats.keys,
            spill_files,
            merge_rounds
        );

        return Ok(PipelineStats {
            records: stats.records,
            spill_files,
            merge_rounds,
            keys: stats.keys,
        });
    }

    /// Splits the input into sorted spill files, each holding about a spill budget worth of records.
    ///
    /// # Arguments
    /// * `input` - Input stream data to be fetched from
    pub fn spill<I>(&self, input: I) -> Result<Vec<SpillFile>, ChunkSortError<C, E>>
    where
        I: IntoIterator<Item = Result<Record, E>>,
    {
        let mut chunk_buf = MemoryLimitedBuffer::new(self.spill_budget);
        let mut spill_files = Vec::new();

        for item in input.into_iter() {
            match item {
                Ok(item) => chunk_buf.push(item),
                Err(err) => return Err(SortError::InputError(err)),
            }

            if chunk_buf.is_full() {
                spill_files.push(self.create_chunk(chunk_buf)?);
                chunk_buf = MemoryLimitedBuffer::new(self.spill_budget);
            }
        }

        if chunk_buf.len() > 0 {
            spill_files.push(self.create_chunk(chunk_buf)?);
        }

        log::debug!("external sort preparation done ({} spill files)", spill_files.len());

        return Ok(spill_files);
    }

    /// Merges spill files in batches until their number does not exceed [`ExternalSorter::max_open_files`].
    /// Files are returned unchanged if they already fit.
    ///
    /// # Arguments
    /// * `files` - Sorted spill files
    pub fn reduce(&self, files: Vec<SpillFile>) -> Result<Vec<SpillFile>, ChunkSortError<C, E>> {
        self.reduce_counted(files).map(|(files, _)| files)
    }

    /// Opens spill files and merges them in a single sorted stream.
    ///
    /// # Arguments
    /// * `files` - Sorted spill files
    pub fn merge(
        &self,
        files: Vec<SpillFile>,
    ) -> Result<BinaryHeapMerger<Record, C::DeserializationError, C>, ChunkSortError<C, E>> {
        let chunks = files
            .into_iter()
            .map(|file| C::open(file, self.rw_buf_size))
            .collect::<Result<Vec<C>, _>>()
            .map_err(SortError::IO)?;

        return BinaryHeapMerger::new(chunks).map_err(SortError::DeserializationError);
    }

    fn reduce_counted(&self, files: Vec<SpillFile>) -> Result<(Vec<SpillFile>, usize), ChunkSortError<C, E>> {
        let max_files = self.max_open_files();
        if files.len() <= max_files {
            return Ok((files, 0));
        }
        if max_files < 2 {
            return Err(SortError::Config(format!(
                "{} spill files to merge but the memory limit allows only {} open files of {} bytes",
                files.len(),
                max_files,
                self.rw_buf_size
            )));
        }

        let mut queue = VecDeque::from(files);
        let mut rounds = 0;
        while queue.len() > max_files {
            let batch = Vec::from_iter(queue.drain(..max_files));
            log::debug!("merging {} spill files ({} left)", batch.len(), queue.len());

            queue.push_back(self.merge_chunks(batch)?);
            rounds += 1;
        }

        log::debug!("{} merge rounds done ({} spill files left)", rounds, queue.len());

        return Ok((Vec::from(queue), rounds));
    }

    fn merge_chunks(&self, files: Vec<SpillFile>) -> Result<SpillFile, ChunkSortError<C, E>> {
        let merger = self.merge(files)?;

        let mut failure = None;
        let items = merger.map_while(|item| match item {
            Ok(item) => Some(item),
            Err(err) => {
                failure = Some(err);
                None
            }
        });
        let merged = C::build(&self.spill_dir, items, self.rw_buf_size)?;

        if let Some(err) = failure {
            return Err(SortError::DeserializationError(err));
        }

        return Ok(merged);
    }

    fn create_chunk(&self, mut buffer: MemoryLimitedBuffer<Record>) -> Result<SpillFile, ChunkSortError<C, E>> {
        log::debug!("sorting chunk data ({} records, {} bytes) ...", buffer.len(), buffer.mem_size());
        buffer.sort();

        log::debug!("saving chunk data");
        let spill_file = C::build(&self.spill_dir, buffer, self.rw_buf_size)?;

        return Ok(spill_file);
    }
}

impl<E, C> Debug for ExternalSorter<E, C>
where
    E: Error,
    C: ExternalChunk<Record>,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExternalSorter")
            .field("tmp_dir", &self.spill_dir.path())
            .field("spill_budget", &self.spill_budget)
            .field("rw_buf_size", &self.rw_buf_size)
            .finish()
    }
}
