//! Streaming key/value-newline record codec.
//!
//! Every record on the wire is one of:
//! - `key=value\n` where the value holds no newline
//! - `key:size=value\n` where exactly `size` bytes of value follow
//! - a lone `\n`, the empty-line record
//!
//! The free functions in [`codec`] read and write single records through any
//! `Read`/`Write` stream, staging text in a caller-supplied [`Buf`]. The
//! [`LineReader`] and [`LineWriter`] wrappers own the stream and scratch
//! buffer for sequential use.
//!
//! [`Buf`]: kvnl_buf::Buf

pub mod checksum;
pub mod codec;
pub mod error;
pub mod ndview;
pub mod reader;
pub mod writer;

pub use checksum::{Checksum, HasherChecksum, NoChecksum};
pub use codec::{
    encode_specification, read_line, read_some, read_specification, read_value, wants_sized,
    write_line, write_ndview, write_newline, write_some, write_sizes, write_specification,
    write_value, CodecConfig, Line, Record, Scratch, Specification, DEFAULT_MAX_VALUE,
    DEFAULT_SIZED_THRESHOLD, EMPTY_LINE,
};
pub use error::{KvnlError, Result};
pub use ndview::{parse_shape, row_major_strides, Extent, NdView, Strided};
pub use reader::{LineReader, Records};
pub use writer::LineWriter;
