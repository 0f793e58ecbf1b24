use std::io::Read;

use kvnl_buf::Buf;
use tracing::trace;

use crate::checksum::{Checksum, NoChecksum};
use crate::codec::{read_line_limited, CodecConfig, Line, Record};
use crate::error::Result;

/// Reads records from any `Read` stream.
///
/// Each record is decoded into a scratch buffer owned by the reader. The
/// stream is read one byte at a time while scanning for delimiters, so wrap
/// unbuffered sources in a [`std::io::BufReader`].
pub struct LineReader<R, C = NoChecksum> {
    inner: R,
    scratch: Buf,
    config: CodecConfig,
    checksum: C,
}

impl<R: Read> LineReader<R> {
    /// Create a new line reader with default configuration.
    pub fn new(inner: R) -> Self {
        Self::with_config(inner, CodecConfig::default())
    }

    /// Create a new line reader with explicit configuration.
    pub fn with_config(inner: R, config: CodecConfig) -> Self {
        Self::with_checksum(inner, config, NoChecksum)
    }
}

impl<R: Read, C: Checksum> LineReader<R, C> {
    /// Create a line reader that feeds every accepted byte range to `checksum`.
    pub fn with_checksum(inner: R, config: CodecConfig, checksum: C) -> Self {
        Self {
            inner,
            scratch: Buf::grow_only(2.0),
            config,
            checksum,
        }
    }

    /// Read the next record, borrowing the reader's scratch buffer.
    ///
    /// Values longer than the configured maximum are rejected with
    /// [`KvnlError::ValueTooLarge`](crate::KvnlError::ValueTooLarge) before
    /// they are buffered. At the end of the stream this returns
    /// [`KvnlError::EndOfStream`](crate::KvnlError::EndOfStream); an empty
    /// `partial` means the stream ended on a record boundary.
    pub fn read_line(&mut self) -> Result<Line<'_>> {
        let line = read_line_limited(
            &mut self.inner,
            &mut self.scratch,
            self.config.max_value_size,
            Some(&mut self.checksum),
        )?;
        trace!(
            key = %String::from_utf8_lossy(line.key()),
            size = line.value.len(),
            "read record"
        );
        Ok(line)
    }

    /// Read the next record into an owned [`Record`].
    pub fn read_record(&mut self) -> Result<Record> {
        self.read_line()?.to_record()
    }

    /// Iterate over the remaining records until the stream ends cleanly.
    ///
    /// The iterator yields the first error and then stops.
    pub fn records(&mut self) -> Records<'_, R, C> {
        Records {
            reader: self,
            done: false,
        }
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &R {
        &self.inner
    }

    /// Mutably borrow the underlying stream.
    pub fn get_mut(&mut self) -> &mut R {
        &mut self.inner
    }

    /// Consume the reader and return the inner stream.
    pub fn into_inner(self) -> R {
        self.inner
    }

    /// Update maximum value size for subsequent reads.
    pub fn set_max_value_size(&mut self, max_value_size: usize) {
        self.config.max_value_size = max_value_size;
    }

    /// Current reader configuration.
    pub fn config(&self) -> &CodecConfig {
        &self.config
    }

    pub fn checksum(&self) -> &C {
        &self.checksum
    }

    /// Consume the reader and return the stream and checksum.
    pub fn into_parts(self) -> (R, C) {
        (self.inner, self.checksum)
    }
}

/// Iterator returned by [`LineReader::records`].
pub struct Records<'a, R, C> {
    reader: &'a mut LineReader<R, C>,
    done: bool,
}

impl<R: Read, C: Checksum> Iterator for Records<'_, R, C> {
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.reader.read_record() {
            Ok(record) => Some(Ok(record)),
            Err(err) if err.is_clean_end() => {
                self.done = true;
                None
            }
            Err(err) => {
                self.done = true;
                Some(Err(err))
            }
        }
    }
}
