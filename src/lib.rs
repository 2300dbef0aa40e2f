//! `ext-group` is a rust external group-by-key implementation.
//!
//! It groups a stream of `key value` records by key, producing one `key value1 value2 ...` line per distinct key,
//! with keys and the values of every key in ascending order, while the input may be much larger than the main
//! memory (RAM) of a computer. Grouping is achieved by external sorting. During the first pass the input is split
//! into chunks that each fit in the memory limit, every chunk is sorted and saved to a spill file. If there are
//! more spill files than the memory limit allows to read at once, they are merged in batches until they fit.
//! During the last pass the remaining files are merged and consecutive records with the same key are written as
//! a single line. For more information see [External Sorting](https://en.wikipedia.org/wiki/External_sorting).
//!
//! # Overview
//!
//! `ext-group` supports the following features:
//!
//! * **Memory limit support:**
//!   the in-memory chunk size and the number of simultaneously open spill files are derived from the memory limit.
//! * **Serialization format agnostic:**
//!   spill files are stored as plain text by default, `MessagePack` can be used instead or substituted by your
//!   custom format.
//! * **Scratch space cleanup:**
//!   every spill file is removed as soon as it has been merged, the temporary directory is removed with the sorter.
//!
//! # Example
//!
//! ```no_run
//! use std::fs;
//! use std::io;
//! use std::path;
//!
//! use ext_group::{ExternalSorter, ExternalSorterBuilder, RecordError, RecordReader};
//!
//! fn main() {
//!     let input_reader = io::BufReader::new(fs::File::open("input.txt").unwrap());
//!     let output_writer = io::BufWriter::new(fs::File::create("output.txt").unwrap());
//!
//!     let sorter: ExternalSorter<RecordError> = ExternalSorterBuilder::new()
//!         .with_tmp_dir(path::Path::new("./"))
//!         .with_memory_limit(50 * 1024 * 1024)
//!         .build()
//!         .unwrap();
//!
//!     sorter.group(RecordReader::new(input_reader), output_writer).unwrap();
//! }
//! ```

pub mod buffer;
pub mod chunk;
pub mod group;
pub mod merger;
pub mod reader;
pub mod record;
pub mod sort;
pub mod spill;

pub use buffer::MemoryLimitedBuffer;
pub use chunk::{ExternalChunk, ExternalChunkError, RmpExternalChunk, TextExternalChunk};
pub use group::{write_groups, GroupError, GroupStats, GroupWriter};
pub use merger::BinaryHeapMerger;
pub use reader::{read_memory_limit, MalformedPolicy, RecordError, RecordReader};
pub use record::{FormatError, Record};
pub use sort::{ExternalSorter, ExternalSorterBuilder, PipelineStats, SortError};
pub use spill::{SpillDir, SpillFile};
