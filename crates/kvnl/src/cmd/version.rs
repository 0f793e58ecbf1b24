use crate::cmd::VersionArgs;
use crate::exit::{CliResult, SUCCESS};

pub fn run(args: VersionArgs) -> CliResult<i32> {
    if !args.extended {
        println!("kvnl {}", env!("CARGO_PKG_VERSION"));
        return Ok(SUCCESS);
    }

    println!("name: kvnl");
    println!("version: {}", env!("CARGO_PKG_VERSION"));
    println!(
        "target: {}",
        option_env!("KVNL_BUILD_TARGET").unwrap_or("unknown")
    );
    println!("target_os: {}", std::env::consts::OS);
    println!("target_arch: {}", std::env::consts::ARCH);
    println!("word_size: {}", kvnl_buf::word_size());
    println!("page_size: {}", kvnl_buf::page_size());
    println!(
        "sized_threshold: {}",
        kvnl_codec::DEFAULT_SIZED_THRESHOLD
    );
    println!("max_value_size: {}", kvnl_codec::DEFAULT_MAX_VALUE);

    Ok(SUCCESS)
}
