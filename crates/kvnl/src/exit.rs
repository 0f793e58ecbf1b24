use std::fmt;
use std::io;

use kvnl_buf::BufError;
use kvnl_codec::KvnlError;

pub const SUCCESS: i32 = 0;
pub const FAILURE: i32 = 1;
pub const PERMISSION_DENIED: i32 = 50;
pub const DATA_INVALID: i32 = 60;
pub const USAGE: i32 = 64;
pub const INTERNAL: i32 = 125;

pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug)]
pub struct CliError {
    pub code: i32,
    pub message: String,
}

impl CliError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

pub fn io_error(context: &str, err: io::Error) -> CliError {
    let code = match err.kind() {
        io::ErrorKind::PermissionDenied => PERMISSION_DENIED,
        io::ErrorKind::NotFound => USAGE,
        io::ErrorKind::BrokenPipe => FAILURE,
        _ => INTERNAL,
    };
    CliError::new(code, format!("{context}: {err}"))
}

pub fn buf_error(context: &str, err: BufError) -> CliError {
    let code = if err.is_usage_error() {
        INTERNAL
    } else {
        FAILURE
    };
    CliError::new(code, format!("{context}: {err}"))
}

pub fn kvnl_error(context: &str, err: KvnlError) -> CliError {
    match err {
        KvnlError::Io { source, .. } => io_error(context, source),
        KvnlError::Buffer(err) => buf_error(context, err),
        KvnlError::EmbeddedNewline { .. } => CliError::new(USAGE, format!("{context}: {err}")),
        ref other if other.is_data_error() || other.is_end_of_stream() => {
            CliError::new(DATA_INVALID, format!("{context}: {err} (code {:#06x})", err.code()))
        }
        other => CliError::new(INTERNAL, format!("{context}: {other}")),
    }
}
