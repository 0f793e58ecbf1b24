use std::fmt::Display;
use std::io::{ErrorKind, Write};

use kvnl_buf::Buf;
use tracing::trace;

use crate::checksum::{Checksum, NoChecksum};
use crate::codec::{
    wants_sized, write_line, write_ndview, write_sizes, CodecConfig, Record, Scratch, EMPTY_LINE,
};
use crate::error::{KvnlError, Result};
use crate::ndview::Strided;

/// Writes records to any `Write` stream.
///
/// Nothing is buffered beyond the specification scratch; call
/// [`LineWriter::flush`] when the stream buffers internally.
pub struct LineWriter<W, C = NoChecksum> {
    inner: W,
    scratch: Buf,
    config: CodecConfig,
    checksum: C,
}

impl<W: Write> LineWriter<W> {
    /// Create a new line writer with default configuration.
    pub fn new(inner: W) -> Self {
        Self::with_config(inner, CodecConfig::default())
    }

    /// Create a new line writer with explicit configuration.
    pub fn with_config(inner: W, config: CodecConfig) -> Self {
        Self::with_checksum(inner, config, NoChecksum)
    }
}

impl<W: Write, C: Checksum> LineWriter<W, C> {
    /// Create a line writer that feeds every written byte range to `checksum`.
    pub fn with_checksum(inner: W, config: CodecConfig, checksum: C) -> Self {
        Self {
            inner,
            scratch: Buf::grow_only(2.0),
            config,
            checksum,
        }
    }

    /// Write a record, sizing the value if it is longer than the configured
    /// threshold or contains a newline. Returns the bytes written.
    pub fn write_line(&mut self, key: &str, value: &[u8]) -> Result<usize> {
        let sized = wants_sized(value, self.config.sized_threshold);
        self.write(key, value, sized)
    }

    /// Write a record with a declared size.
    pub fn write_sized(&mut self, key: &str, value: &[u8]) -> Result<usize> {
        self.write(key, value, true)
    }

    /// Write a newline-delimited record.
    ///
    /// The value must not contain a newline.
    pub fn write_delimited(&mut self, key: &str, value: &[u8]) -> Result<usize> {
        if value.contains(&b'\n') {
            return Err(KvnlError::EmbeddedNewline {
                key: key.to_owned(),
            });
        }
        self.write(key, value, false)
    }

    pub fn write_empty_line(&mut self) -> Result<usize> {
        self.write("\n", b"", false)
    }

    /// Write an owned record, keeping its declared size if it has one.
    pub fn write_record(&mut self, record: &Record) -> Result<usize> {
        if record.is_empty_line() {
            return self.write_empty_line();
        }
        match record.size {
            Some(_) => self.write_sized(&record.key, &record.value),
            None => self.write_line(&record.key, &record.value),
        }
    }

    /// Write `values` as a space-separated list.
    pub fn write_sizes<T: Display>(&mut self, key: &str, values: &[T]) -> Result<usize> {
        write_sizes(
            &mut self.inner,
            key,
            values,
            Some(&mut self.checksum),
            Scratch::Borrowed(&mut self.scratch),
        )
    }

    /// Write a strided array as its `dtype`, `shape`, `strides` and `data` records.
    pub fn write_ndview<V: Strided + ?Sized>(
        &mut self,
        ndview: &V,
        dtype: &str,
        item_size: usize,
    ) -> Result<usize> {
        let size = ndview.extent(item_size)?.len();
        self.check_size(size)?;
        write_ndview(
            &mut self.inner,
            ndview,
            dtype,
            item_size,
            Some(&mut self.checksum),
            Scratch::Borrowed(&mut self.scratch),
        )
    }

    /// Flush the underlying stream.
    pub fn flush(&mut self) -> Result<()> {
        loop {
            match self.inner.flush() {
                Ok(()) => return Ok(()),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(source) => {
                    return Err(KvnlError::Io {
                        source,
                        transferred: 0,
                    })
                }
            }
        }
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &W {
        &self.inner
    }

    /// Mutably borrow the underlying stream.
    pub fn get_mut(&mut self) -> &mut W {
        &mut self.inner
    }

    /// Consume the writer and return the inner stream.
    pub fn into_inner(self) -> W {
        self.inner
    }

    /// Update maximum value size for subsequent writes.
    pub fn set_max_value_size(&mut self, max_value_size: usize) {
        self.config.max_value_size = max_value_size;
    }

    /// Current writer configuration.
    pub fn config(&self) -> &CodecConfig {
        &self.config
    }

    pub fn checksum(&self) -> &C {
        &self.checksum
    }

    /// Consume the writer and return the stream and checksum.
    pub fn into_parts(self) -> (W, C) {
        (self.inner, self.checksum)
    }

    fn write(&mut self, key: &str, value: &[u8], sized: bool) -> Result<usize> {
        self.check_size(value.len())?;
        let written = write_line(
            &mut self.inner,
            key,
            value,
            Some(sized),
            Some(&mut self.checksum),
            Scratch::Borrowed(&mut self.scratch),
        )?;
        if key.as_bytes() != EMPTY_LINE {
            trace!(key, size = value.len(), sized, written, "wrote record");
        }
        Ok(written)
    }

    fn check_size(&self, size: usize) -> Result<()> {
        if size > self.config.max_value_size {
            return Err(KvnlError::ValueTooLarge {
                size,
                max: self.config.max_value_size,
            });
        }
        Ok(())
    }
}
