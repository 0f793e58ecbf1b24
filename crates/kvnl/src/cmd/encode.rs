use std::collections::hash_map::DefaultHasher;
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::Path;

use kvnl_codec::{CodecConfig, HasherChecksum, LineWriter};
use tracing::info;

use crate::cmd::{EncodeArgs, LineArg, LineValue};
use crate::exit::{io_error, kvnl_error, CliResult, SUCCESS};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Mode {
    Auto,
    Sized,
    Delimited,
}

pub fn run(args: EncodeArgs) -> CliResult<i32> {
    let mode = match (args.sized, args.delimited) {
        (true, _) => Mode::Sized,
        (_, true) => Mode::Delimited,
        _ => Mode::Auto,
    };
    let config = CodecConfig {
        sized_threshold: args.sized_threshold,
        ..CodecConfig::default()
    };

    let sink = open_output(args.output.as_deref())?;
    let mut writer =
        LineWriter::with_checksum(sink, config, HasherChecksum::new(DefaultHasher::new()));

    let mut bytes = 0usize;
    for line in &args.lines {
        let value = resolve_value(line)?;
        bytes += write_one(&mut writer, &line.key, &value, mode)
            .map_err(|err| kvnl_error(&format!("failed writing {:?}", line.key), err))?;
    }
    if args.terminate {
        bytes += writer
            .write_empty_line()
            .map_err(|err| kvnl_error("failed writing empty line", err))?;
    }
    writer
        .flush()
        .map_err(|err| kvnl_error("flush failed", err))?;

    let checksum = writer.checksum();
    info!(
        records = args.lines.len(),
        bytes,
        checksum = %format!("{:016x}", checksum.finish()),
        "encoded records"
    );
    Ok(SUCCESS)
}

fn write_one<W: Write, C: kvnl_codec::Checksum>(
    writer: &mut LineWriter<W, C>,
    key: &str,
    value: &[u8],
    mode: Mode,
) -> kvnl_codec::Result<usize> {
    match mode {
        Mode::Auto => writer.write_line(key, value),
        Mode::Sized => writer.write_sized(key, value),
        Mode::Delimited => writer.write_delimited(key, value),
    }
}

pub(crate) fn open_output(path: Option<&Path>) -> CliResult<Box<dyn Write>> {
    match path {
        Some(path) => {
            let file = File::create(path).map_err(|err| {
                io_error(&format!("failed creating {}", path.display()), err)
            })?;
            Ok(Box::new(BufWriter::new(file)))
        }
        None => Ok(Box::new(BufWriter::new(io::stdout().lock()))),
    }
}

fn resolve_value(line: &LineArg) -> CliResult<Vec<u8>> {
    match &line.value {
        LineValue::Text(text) => Ok(text.as_bytes().to_vec()),
        LineValue::File(path) => fs::read(path)
            .map_err(|err| io_error(&format!("failed reading {}", path.display()), err)),
    }
}
