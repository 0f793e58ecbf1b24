use kvnl_buf::BufError;

/// Errors that can occur while encoding or decoding records.
#[derive(Debug, thiserror::Error)]
pub enum KvnlError {
    /// The scratch buffer could not be resized or was in an unusable state.
    #[error("scratch buffer error: {0}")]
    Buffer(#[from] BufError),

    /// A specification contains `=` or a newline, or ended with a bare newline.
    #[error("malformed specification {:?}", String::from_utf8_lossy(.raw))]
    MalformedSpecification { raw: Vec<u8> },

    /// The declared size after the last `:` is not a non-negative decimal.
    #[error("malformed size in specification {:?}", String::from_utf8_lossy(.raw))]
    MalformedSize { raw: Vec<u8> },

    /// The stream ended before the read completed.
    #[error("end of stream after {} bytes", .partial.len())]
    EndOfStream { partial: Vec<u8> },

    /// The underlying stream failed after `transferred` bytes of the operation.
    #[error("stream I/O error after {transferred} bytes: {source}")]
    Io {
        source: std::io::Error,
        transferred: usize,
    },

    /// A sized value was not followed by exactly one newline.
    #[error("expected newline after sized value, got {:?}", String::from_utf8_lossy(.got))]
    ExpectedNewline { got: Vec<u8> },

    /// A read was given neither (or both) of a size and a delimiter set.
    #[error("read needs exactly one of a size or a non-empty delimiter set")]
    MissingTermination,

    /// A value exceeds the configured maximum.
    #[error("value too large ({size} bytes, max {max})")]
    ValueTooLarge { size: usize, max: usize },

    /// A value to be written newline-delimited contains a newline.
    #[error("delimited value for key {key:?} contains a newline")]
    EmbeddedNewline { key: String },

    /// A strided view has an inconsistent layout or an extent outside its memory.
    #[error("invalid strided view: {0}")]
    InvalidView(&'static str),
}

impl KvnlError {
    /// Stable numeric code for diagnostics.
    pub fn code(&self) -> u32 {
        match self {
            KvnlError::MalformedSpecification { .. } => 0x1001,
            KvnlError::Buffer(_) => 0x1002,
            KvnlError::MalformedSize { .. } => 0x1004,
            KvnlError::EndOfStream { .. } => 0x1005,
            KvnlError::Io { .. } => 0x1006,
            KvnlError::ExpectedNewline { .. } => 0x1007,
            KvnlError::MissingTermination => 0x1008,
            KvnlError::ValueTooLarge { .. } => 0x1009,
            KvnlError::InvalidView(_) => 0x100a,
            KvnlError::EmbeddedNewline { .. } => 0x100b,
        }
    }

    pub fn is_end_of_stream(&self) -> bool {
        matches!(self, KvnlError::EndOfStream { .. })
    }

    /// End of stream with nothing read: the stream ended on a record boundary.
    pub fn is_clean_end(&self) -> bool {
        matches!(self, KvnlError::EndOfStream { partial } if partial.is_empty())
    }

    /// Data errors describe bad bytes on the wire rather than a failing stream.
    pub fn is_data_error(&self) -> bool {
        matches!(
            self,
            KvnlError::MalformedSpecification { .. }
                | KvnlError::MalformedSize { .. }
                | KvnlError::ExpectedNewline { .. }
                | KvnlError::ValueTooLarge { .. }
        )
    }

    /// Shift the transferred count of an I/O error by `offset` bytes.
    pub(crate) fn after(self, offset: usize) -> Self {
        match self {
            KvnlError::Io {
                source,
                transferred,
            } => KvnlError::Io {
                source,
                transferred: transferred + offset,
            },
            other => other,
        }
    }
}

pub type Result<T> = std::result::Result<T, KvnlError>;
