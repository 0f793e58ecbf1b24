use std::collections::hash_map::DefaultHasher;
use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::Path;

use kvnl_codec::{CodecConfig, HasherChecksum, LineReader, Record};
use tracing::{debug, info};

use crate::cmd::DecodeArgs;
use crate::exit::{io_error, kvnl_error, CliResult, SUCCESS};
use crate::output::{print_records, print_summary, OutputFormat};

pub fn run(args: DecodeArgs, format: OutputFormat) -> CliResult<i32> {
    let source = open_input(args.file.as_deref())?;
    let config = CodecConfig {
        max_value_size: args.max_value_size,
        ..CodecConfig::default()
    };
    let mut reader =
        LineReader::with_checksum(source, config, HasherChecksum::new(DefaultHasher::new()));

    let (records, failure) = collect_records(&mut reader);
    print_records(&records, format);

    if let Some(err) = failure {
        debug!(decoded = records.len(), "decode stopped early");
        return Err(kvnl_error(
            &format!("decode failed after {} records", records.len()),
            err,
        ));
    }

    let checksum = reader.checksum();
    info!(records = records.len(), bytes = checksum.bytes(), "decoded records");
    if args.summary {
        print_summary(records.len(), checksum.bytes(), checksum.finish(), format);
    }
    Ok(SUCCESS)
}

/// Read until the stream ends cleanly or the first error.
fn collect_records<R: Read, C: kvnl_codec::Checksum>(
    reader: &mut LineReader<R, C>,
) -> (Vec<Record>, Option<kvnl_codec::KvnlError>) {
    let mut records = Vec::new();
    for record in reader.records() {
        match record {
            Ok(record) => records.push(record),
            Err(err) => return (records, Some(err)),
        }
    }
    (records, None)
}

fn open_input(path: Option<&Path>) -> CliResult<Box<dyn Read>> {
    match path {
        Some(path) => {
            let file = File::open(path)
                .map_err(|err| io_error(&format!("failed opening {}", path.display()), err))?;
            Ok(Box::new(BufReader::new(file)))
        }
        None => Ok(Box::new(BufReader::new(io::stdin().lock()))),
    }
}
