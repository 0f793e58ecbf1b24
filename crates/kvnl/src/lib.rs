//! Self-describing streaming key/value-newline records.
//!
//! kvnl persists named byte blobs, including flat dumps of strided arrays, as
//! `key=value\n` or `key:size=value\n` records on any byte stream.
//!
//! # Crate Structure
//!
//! - [`buf`]: Growable scratch buffer and byte-range helpers
//! - [`codec`]: Record encoding and decoding, reader/writer wrappers

/// Re-export buffer types.
pub mod buf {
    pub use kvnl_buf::*;
}

/// Re-export codec types.
pub mod codec {
    pub use kvnl_codec::*;
}
