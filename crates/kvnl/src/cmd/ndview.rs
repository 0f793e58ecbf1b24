use std::fs;
use std::io::{self, Read};

use kvnl_codec::{parse_shape, LineWriter, NdView};
use tracing::info;

use crate::cmd::encode::open_output;
use crate::cmd::NdviewArgs;
use crate::exit::{io_error, kvnl_error, CliError, CliResult, SUCCESS, USAGE};

pub fn run(args: NdviewArgs) -> CliResult<i32> {
    if args.item_size == 0 {
        return Err(CliError::new(USAGE, "--item-size must be greater than zero"));
    }
    let shape = parse_shape(&args.shape).map_err(|err| CliError::new(USAGE, err.to_string()))?;
    let memory = read_input(&args)?;

    let expected = shape
        .iter()
        .try_fold(args.item_size, |acc, &n| acc.checked_mul(n))
        .ok_or_else(|| CliError::new(USAGE, "shape overflows the address space"))?;
    if memory.len() != expected {
        return Err(CliError::new(
            USAGE,
            format!(
                "input holds {} bytes, shape {} of {}-byte items needs {expected}",
                memory.len(),
                args.shape,
                args.item_size
            ),
        ));
    }

    let view = NdView::row_major(&memory, shape, args.item_size)
        .map_err(|err| kvnl_error("invalid view", err))?;
    let mut writer = LineWriter::new(open_output(args.output.as_deref())?);
    let written = writer
        .write_ndview(&view, &args.dtype, args.item_size)
        .map_err(|err| kvnl_error("failed writing array", err))?;
    writer
        .flush()
        .map_err(|err| kvnl_error("flush failed", err))?;

    info!(dtype = %args.dtype, bytes = written, "encoded array");
    Ok(SUCCESS)
}

fn read_input(args: &NdviewArgs) -> CliResult<Vec<u8>> {
    match &args.input {
        Some(path) => fs::read(path)
            .map_err(|err| io_error(&format!("failed reading {}", path.display()), err)),
        None => {
            let mut memory = Vec::new();
            io::stdin()
                .lock()
                .read_to_end(&mut memory)
                .map_err(|err| io_error("failed reading stdin", err))?;
            Ok(memory)
        }
    }
}
