use clap::{Args, Subcommand};
use std::path::PathBuf;

use kvnl_codec::{DEFAULT_MAX_VALUE, DEFAULT_SIZED_THRESHOLD};

use crate::exit::CliResult;
use crate::output::OutputFormat;

pub mod decode;
pub mod encode;
pub mod ndview;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Write records to a file or stdout.
    Encode(EncodeArgs),
    /// Read records from a file or stdin and print them.
    Decode(DecodeArgs),
    /// Dump raw array memory as dtype/shape/strides/data records.
    Ndview(NdviewArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Encode(args) => encode::run(args),
        Command::Decode(args) => decode::run(args, format),
        Command::Ndview(args) => ndview::run(args),
        Command::Version(args) => version::run(args),
    }
}

/// Value of a `--line` argument.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LineValue {
    Text(String),
    File(PathBuf),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LineArg {
    pub key: String,
    pub value: LineValue,
}

/// Parse `KEY=VALUE`, or `KEY=@PATH` to read the value from a file.
pub fn parse_line(input: &str) -> Result<LineArg, String> {
    let (key, value) = input
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got {input:?}"))?;
    let value = match value.strip_prefix('@') {
        Some(path) if !path.is_empty() => LineValue::File(PathBuf::from(path)),
        _ => LineValue::Text(value.to_string()),
    };
    Ok(LineArg {
        key: key.to_string(),
        value,
    })
}

#[derive(Args, Debug)]
pub struct EncodeArgs {
    /// Record to write, in order; `KEY=@PATH` reads the value from a file.
    #[arg(long = "line", value_name = "KEY=VALUE", required = true, value_parser = parse_line)]
    pub lines: Vec<LineArg>,
    /// Write to a file instead of stdout.
    #[arg(long, short = 'o', value_name = "FILE")]
    pub output: Option<PathBuf>,
    /// Declare the size of every value.
    #[arg(long, conflicts_with = "delimited")]
    pub sized: bool,
    /// Terminate every value with a newline instead of declaring its size.
    #[arg(long)]
    pub delimited: bool,
    /// Values longer than this are written sized when neither mode is forced.
    #[arg(long, value_name = "BYTES", default_value_t = DEFAULT_SIZED_THRESHOLD)]
    pub sized_threshold: usize,
    /// Finish the stream with an empty-line record.
    #[arg(long)]
    pub terminate: bool,
}

#[derive(Args, Debug)]
pub struct DecodeArgs {
    /// Input file. Default: stdin.
    pub file: Option<PathBuf>,
    /// Reject values larger than this.
    #[arg(long, value_name = "BYTES", default_value_t = DEFAULT_MAX_VALUE)]
    pub max_value_size: usize,
    /// Print record count, byte count and checksum after the records.
    #[arg(long)]
    pub summary: bool,
}

#[derive(Args, Debug)]
pub struct NdviewArgs {
    /// Comma-separated element counts, outermost axis first (e.g. 2,3,4).
    #[arg(long)]
    pub shape: String,
    /// Element type tag written to the dtype record.
    #[arg(long, default_value = "u8")]
    pub dtype: String,
    /// Bytes per element.
    #[arg(long, default_value = "1")]
    pub item_size: usize,
    /// Raw array memory. Default: stdin.
    #[arg(long, value_name = "FILE")]
    pub input: Option<PathBuf>,
    /// Write to a file instead of stdout.
    #[arg(long, short = 'o', value_name = "FILE")]
    pub output: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}
