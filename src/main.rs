use std::fs;
use std::io::{self, prelude::*};
use std::path;
use std::process;

use bytesize::ByteSize;
use clap::ArgEnum;
use env_logger;
use log;

use ext_group::{
    read_memory_limit, ExternalChunk, ExternalSorterBuilder, MalformedPolicy, Record, RecordError, RecordReader,
    RmpExternalChunk, TextExternalChunk,
};

fn main() {
    let arg_parser = build_arg_parser();

    let log_level: LogLevel = arg_parser.value_of_t_or_exit("log_level");
    init_logger(log_level);

    let format: ChunkFormat = arg_parser.value_of_t_or_exit("format");
    let policy: Policy = arg_parser.value_of_t_or_exit("on_malformed");
    let tmp_dir: Option<&str> = arg_parser.value_of("tmp_dir");
    let buffer_size = arg_parser.value_of("buffer_size").expect("value has default");
    let buffer_size = buffer_size.parse::<ByteSize>().expect("value is pre-validated").as_u64() as usize;

    let mut input_stream: Box<dyn BufRead> = match arg_parser.value_of("input") {
        Some(input) => match fs::File::open(input) {
            Ok(file) => Box::new(io::BufReader::with_capacity(buffer_size, file)),
            Err(err) => {
                log::error!("input file opening error: {}", err);
                process::exit(1);
            }
        },
        None => Box::new(io::BufReader::with_capacity(buffer_size, io::stdin())),
    };

    let output_stream: Box<dyn Write> = match arg_parser.value_of("output") {
        Some(output) => match fs::File::create(output) {
            Ok(file) => Box::new(io::BufWriter::with_capacity(buffer_size, file)),
            Err(err) => {
                log::error!("output file creation error: {}", err);
                process::exit(1);
            }
        },
        None => Box::new(io::BufWriter::with_capacity(buffer_size, io::stdout())),
    };

    let memory_limit = match arg_parser.value_of("memory_limit") {
        Some(memory_limit) => memory_limit.parse::<ByteSize>().expect("value is pre-validated").as_u64(),
        None => match read_memory_limit(&mut input_stream) {
            Ok(memory_limit) => memory_limit,
            Err(err) => {
                log::error!("memory limit reading error: {}", err);
                process::exit(1);
            }
        },
    };

    let records = RecordReader::with_policy(input_stream, policy.into());
    let settings = Settings {
        tmp_dir,
        memory_limit,
        buffer_size,
    };

    match format {
        ChunkFormat::Text => run::<TextExternalChunk>(settings, records, output_stream),
        ChunkFormat::Rmp => run::<RmpExternalChunk<Record>>(settings, records, output_stream),
    }
}

struct Settings<'a> {
    tmp_dir: Option<&'a str>,
    memory_limit: u64,
    buffer_size: usize,
}

fn run<C>(settings: Settings, records: RecordReader<Box<dyn BufRead>>, output_stream: Box<dyn Write>)
where
    C: ExternalChunk<Record>,
{
    let mut sorter_builder = ExternalSorterBuilder::<RecordError, C>::new()
        .with_memory_limit(settings.memory_limit)
        .with_rw_buf_size(settings.buffer_size);

    if let Some(tmp_dir) = settings.tmp_dir {
        sorter_builder = sorter_builder.with_tmp_dir(path::Path::new(tmp_dir));
    }

    let sorter = match sorter_builder.build() {
        Ok(sorter) => sorter,
        Err(err) => {
            log::error!("sorter initialization error: {}", err);
            process::exit(1);
        }
    };

    if let Err(err) = sorter.group(records, output_stream) {
        log::error!("data grouping error: {}", err);
        process::exit(1);
    }
}

#[derive(Copy, Clone, clap::ArgEnum)]
enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn possible_values() -> impl Iterator<Item = clap::PossibleValue<'static>> {
        Self::value_variants().iter().filter_map(|v| v.to_possible_value())
    }
}

impl std::str::FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        <LogLevel as clap::ArgEnum>::from_str(s, false)
    }
}

/// Spill file format.
#[derive(Copy, Clone, clap::ArgEnum)]
enum ChunkFormat {
    Text,
    Rmp,
}

impl ChunkFormat {
    pub fn possible_values() -> impl Iterator<Item = clap::PossibleValue<'static>> {
        ChunkFormat::value_variants().iter().filter_map(|v| v.to_possible_value())
    }
}

impl std::str::FromStr for ChunkFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        <ChunkFormat as clap::ArgEnum>::from_str(s, false)
    }
}

/// Malformed record handling.
#[derive(Copy, Clone, clap::ArgEnum)]
enum Policy {
    Fail,
    Truncate,
}

impl Policy {
    pub fn possible_values() -> impl Iterator<Item = clap::PossibleValue<'static>> {
        Policy::value_variants().iter().filter_map(|v| v.to_possible_value())
    }
}

impl std::str::FromStr for Policy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        <Policy as clap::ArgEnum>::from_str(s, false)
    }
}

impl From<Policy> for MalformedPolicy {
    fn from(policy: Policy) -> Self {
        match policy {
            Policy::Fail => MalformedPolicy::Fail,
            Policy::Truncate => MalformedPolicy::Truncate,
        }
    }
}

fn validate_size(v: &str) -> Result<(), String> {
    match v.parse::<ByteSize>() {
        Ok(size) if size.as_u64() > 0 => Ok(()),
        Ok(_) => Err("size must be positive".to_string()),
        Err(err) => Err(format!("size format incorrect: {}", err)),
    }
}

fn build_arg_parser() -> clap::ArgMatches {
    clap::App::new("ext-group")
        .about("external group-by-key: groups 'key value' records into 'key value1 value2 ...' lines")
        .arg(
            clap::Arg::new("input")
                .short('i')
                .long("input")
                .help("file to be grouped (default: stdin)")
                .takes_value(true),
        )
        .arg(
            clap::Arg::new("output")
                .short('o')
                .long("output")
                .help("result file (default: stdout)")
                .takes_value(true),
        )
        .arg(
            clap::Arg::new("memory_limit")
                .short('m')
                .long("memory-limit")
                .help("memory limit (default: the first line of the input, in bytes)")
                .takes_value(true)
                .validator(validate_size),
        )
        .arg(
            clap::Arg::new("buffer_size")
                .short('b')
                .long("buffer-size")
                .help("read/write buffer size of every file")
                .takes_value(true)
                .default_value("256KiB")
                .validator(validate_size),
        )
        .arg(
            clap::Arg::new("format")
                .short('f')
                .long("format")
                .help("spill file format")
                .takes_value(true)
                .default_value("text")
                .possible_values(ChunkFormat::possible_values()),
        )
        .arg(
            clap::Arg::new("on_malformed")
                .long("on-malformed")
                .help("malformed record handling: fail or treat as the end of input")
                .takes_value(true)
                .default_value("fail")
                .possible_values(Policy::possible_values()),
        )
        .arg(
            clap::Arg::new("log_level")
                .short('l')
                .long("loglevel")
                .help("logging level")
                .takes_value(true)
                .default_value("info")
                .possible_values(LogLevel::possible_values()),
        )
        .arg(
            clap::Arg::new("tmp_dir")
                .short('d')
                .long("tmp-dir")
                .help("directory to be used to store temporary data")
                .takes_value(true),
        )
        .get_matches()
}

fn init_logger(log_level: LogLevel) {
    env_logger::Builder::new()
        .filter_level(match log_level {
            LogLevel::Off => log::LevelFilter::Off,
            LogLevel::Error => log::LevelFilter::Error,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Trace => log::LevelFilter::Trace,
        })
        .format_timestamp_millis()
        .init();
}

#[cfg(test)]
mod test {
    use rstest::*;

    use super::{ChunkFormat, LogLevel, Policy};
    use ext_group::MalformedPolicy;

    #[rstest]
    #[case("text", Some(true))]
    #[case("rmp", Some(false))]
    #[case("json", None)]
    #[case("TEXT", None)]
    fn test_chunk_format(#[case] value: &str, #[case] is_text: Option<bool>) {
        let format = value.parse::<ChunkFormat>().ok();
        assert_eq!(format.map(|f| matches!(f, ChunkFormat::Text)), is_text);
    }

    #[rstest]
    #[case("fail", Some(MalformedPolicy::Fail))]
    #[case("truncate", Some(MalformedPolicy::Truncate))]
    #[case("skip", None)]
    fn test_policy(#[case] value: &str, #[case] expected: Option<MalformedPolicy>) {
        assert_eq!(value.parse::<Policy>().ok().map(MalformedPolicy::from), expected);
    }

    fn names(values: impl Iterator<Item = clap::PossibleValue<'static>>) -> Vec<String> {
        Vec::from_iter(values.map(|v| v.get_name().to_string()))
    }

    #[test]
    fn test_possible_values() {
        assert_eq!(
            names(LogLevel::possible_values()),
            vec!["off", "error", "warn", "info", "debug", "trace"]
        );
        assert_eq!(names(ChunkFormat::possible_values()), vec!["text", "rmp"]);
        assert_eq!(names(Policy::possible_values()), vec!["fail", "truncate"]);
    }
}
