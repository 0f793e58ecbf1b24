use std::fmt::{Display, Write as _};
use std::io::{ErrorKind, Read, Write};
use std::ops::Range;

use bytes::Bytes;
use kvnl_buf::{view, Buf, BufError};
use tracing::debug;

use crate::checksum::{reborrow, Checksum};
use crate::error::{KvnlError, Result};
use crate::ndview::Strided;

/// The empty-line record, and the key that denotes it.
pub const EMPTY_LINE: &[u8] = b"\n";

/// Separates a specification from its value.
pub const SEPARATOR: u8 = b'=';

/// Separates a key from its declared size.
pub const SIZE_MARKER: u8 = b':';

/// Terminates every record.
pub const NEWLINE: u8 = b'\n';

/// Values longer than this are written with a declared size by default.
pub const DEFAULT_SIZED_THRESHOLD: usize = 1024;

/// Default maximum value size: 16 MiB.
pub const DEFAULT_MAX_VALUE: usize = 16 * 1024 * 1024;

const SPECIFICATION_DELIMITERS: &[u8] = b"=\n";
const VALUE_DELIMITERS: &[u8] = b"\n";

/// Configuration shared by [`LineReader`](crate::LineReader) and
/// [`LineWriter`](crate::LineWriter).
#[derive(Debug, Clone)]
pub struct CodecConfig {
    /// Values longer than this are written sized unless told otherwise.
    pub sized_threshold: usize,
    /// Largest value a writer accepts and a reader allocates for.
    pub max_value_size: usize,
}

impl Default for CodecConfig {
    fn default() -> Self {
        Self {
            sized_threshold: DEFAULT_SIZED_THRESHOLD,
            max_value_size: DEFAULT_MAX_VALUE,
        }
    }
}

/// Scratch storage for one codec call.
///
/// Either a buffer the caller keeps across calls, or one owned by the call
/// and freed when it returns.
pub enum Scratch<'a> {
    Borrowed(&'a mut Buf),
    Scoped(Buf),
}

impl Scratch<'_> {
    /// A call-local buffer that grows by doubling and never shrinks.
    pub fn scoped() -> Self {
        Scratch::Scoped(Buf::grow_only(2.0))
    }

    pub fn buf(&mut self) -> &mut Buf {
        match self {
            Scratch::Borrowed(buf) => buf,
            Scratch::Scoped(buf) => buf,
        }
    }
}

impl<'a> From<&'a mut Buf> for Scratch<'a> {
    fn from(buf: &'a mut Buf) -> Self {
        Scratch::Borrowed(buf)
    }
}

impl<'a> From<Option<&'a mut Buf>> for Scratch<'a> {
    fn from(buf: Option<&'a mut Buf>) -> Self {
        match buf {
            Some(buf) => Scratch::Borrowed(buf),
            None => Scratch::scoped(),
        }
    }
}

/// A decoded specification, borrowing the scratch buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Specification<'a> {
    /// The key; [`EMPTY_LINE`] for the empty-line record.
    pub key: &'a [u8],
    /// Declared value size, absent for newline-delimited values.
    pub size: Option<usize>,
}

impl Specification<'_> {
    pub fn is_empty_line(&self) -> bool {
        self.key == EMPTY_LINE
    }
}

/// A decoded record, borrowing the scratch buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Line<'a> {
    pub specification: Specification<'a>,
    pub value: &'a [u8],
}

impl Line<'_> {
    pub fn key(&self) -> &[u8] {
        self.specification.key
    }

    pub fn is_empty_line(&self) -> bool {
        self.specification.is_empty_line()
    }

    /// Copy into an owned [`Record`]; keys must be UTF-8 text.
    pub fn to_record(&self) -> Result<Record> {
        let key = std::str::from_utf8(self.key()).map_err(|_| {
            KvnlError::MalformedSpecification {
                raw: self.key().to_vec(),
            }
        })?;
        Ok(Record {
            key: key.to_owned(),
            size: self.specification.size,
            value: Bytes::copy_from_slice(self.value),
        })
    }
}

/// An owned record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub key: String,
    /// Declared size when the record was (or should be) written sized.
    pub size: Option<usize>,
    pub value: Bytes,
}

impl Record {
    /// A record whose encoding is chosen when it is written.
    pub fn new(key: impl Into<String>, value: impl Into<Bytes>) -> Self {
        Self {
            key: key.into(),
            size: None,
            value: value.into(),
        }
    }

    /// A record that is always written with a declared size.
    pub fn sized(key: impl Into<String>, value: impl Into<Bytes>) -> Self {
        let value = value.into();
        Self {
            key: key.into(),
            size: Some(value.len()),
            value,
        }
    }

    pub fn empty_line() -> Self {
        Self::new("\n", Bytes::new())
    }

    pub fn is_empty_line(&self) -> bool {
        self.key.as_bytes() == EMPTY_LINE
    }

    /// Encoded length of this record on the wire.
    pub fn wire_size(&self) -> usize {
        if self.is_empty_line() {
            return EMPTY_LINE.len();
        }
        let size = self.size.map_or(0, |n| 1 + decimal_len(n));
        self.key.len() + size + 1 + self.value.len() + 1
    }
}

/// Whether a value must be, or by default is, written with a declared size.
pub fn wants_sized(value: &[u8], threshold: usize) -> bool {
    value.len() > threshold || value.contains(&NEWLINE)
}

fn decimal_len(mut n: usize) -> usize {
    let mut digits = 1;
    while n >= 10 {
        n /= 10;
        digits += 1;
    }
    digits
}

/// Write `bytes` in full, reporting them to `checksum` first.
pub fn write_some<W: Write + ?Sized>(
    stream: &mut W,
    bytes: &[u8],
    checksum: Option<&mut dyn Checksum>,
) -> Result<usize> {
    if let Some(checksum) = checksum {
        checksum.update(bytes);
    }

    let mut offset = 0usize;
    while offset < bytes.len() {
        match stream.write(&bytes[offset..]) {
            Ok(0) => {
                return Err(KvnlError::Io {
                    source: ErrorKind::WriteZero.into(),
                    transferred: offset,
                })
            }
            Ok(n) => offset += n,
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(source) => {
                return Err(KvnlError::Io {
                    source,
                    transferred: offset,
                })
            }
        }
    }
    Ok(offset)
}

pub fn write_newline<W: Write + ?Sized>(
    stream: &mut W,
    checksum: Option<&mut dyn Checksum>,
) -> Result<usize> {
    write_some(stream, EMPTY_LINE, checksum)
}

/// Write `spec` followed by `=`, or the empty-line record if `spec` is a
/// lone newline.
///
/// Any other specification containing `=` or a newline is rejected before
/// anything is written.
pub fn write_specification<W: Write + ?Sized>(
    stream: &mut W,
    spec: &[u8],
    mut checksum: Option<&mut dyn Checksum>,
) -> Result<usize> {
    if spec == EMPTY_LINE {
        return write_some(stream, spec, checksum);
    }
    if spec.contains(&SEPARATOR) || spec.contains(&NEWLINE) {
        return Err(KvnlError::MalformedSpecification { raw: spec.to_vec() });
    }
    let m = write_some(stream, spec, reborrow(&mut checksum))?;
    let n = write_some(stream, &[SEPARATOR], checksum).map_err(|err| err.after(m))?;
    Ok(m + n)
}

/// Write `value` followed by a newline.
pub fn write_value<W: Write + ?Sized>(
    stream: &mut W,
    value: &[u8],
    mut checksum: Option<&mut dyn Checksum>,
) -> Result<usize> {
    let m = write_some(stream, value, reborrow(&mut checksum))?;
    let n = write_newline(stream, checksum).map_err(|err| err.after(m))?;
    Ok(m + n)
}

/// Render a specification into `dest`: the bare key, or `key:size`.
///
/// Returns the specification length.
pub fn encode_specification(key: &str, size: Option<usize>, dest: &mut Buf) -> Result<usize> {
    match size {
        None => {
            dest.resize(key.len())?;
            view::copy(dest.as_mut_slice(), key.as_bytes())?;
            Ok(key.len())
        }
        Some(size) => Ok(dest.format_into(format_args!("{key}:{size}"))?),
    }
}

/// Write one record.
///
/// With `sized` unset, the value is written sized if it is longer than
/// [`DEFAULT_SIZED_THRESHOLD`] or contains a newline. Stops at the first
/// failing step; bytes already written stay on the stream.
pub fn write_line<W: Write + ?Sized>(
    stream: &mut W,
    key: &str,
    value: &[u8],
    sized: Option<bool>,
    mut checksum: Option<&mut dyn Checksum>,
    mut scratch: Scratch<'_>,
) -> Result<usize> {
    if key.as_bytes() == EMPTY_LINE {
        if !value.is_empty() {
            return Err(KvnlError::MalformedSpecification {
                raw: key.as_bytes().to_vec(),
            });
        }
        return write_specification(stream, EMPTY_LINE, checksum);
    }

    let sized = sized.unwrap_or_else(|| wants_sized(value, DEFAULT_SIZED_THRESHOLD));
    let spec_buf = scratch.buf();
    encode_specification(key, sized.then_some(value.len()), spec_buf)?;
    let mut total = write_specification(stream, spec_buf.as_slice(), reborrow(&mut checksum))?;
    total += write_value(stream, value, checksum).map_err(|err| err.after(total))?;
    Ok(total)
}

/// Write a record whose value is `values` as space-separated decimals.
///
/// The list is assembled in `scratch`, which is reused for every entry.
pub fn write_sizes<W: Write + ?Sized, T: Display>(
    stream: &mut W,
    key: &str,
    values: &[T],
    mut checksum: Option<&mut dyn Checksum>,
    mut scratch: Scratch<'_>,
) -> Result<usize> {
    let list = scratch.buf();
    list.resize(0)?;
    for (i, value) in values.iter().enumerate() {
        if i > 0 {
            list.append(b" ")?;
        }
        write!(list, "{value}").map_err(|_| BufError::AllocationFailed {
            requested: list.len(),
        })?;
    }
    let m = write_specification(stream, key.as_bytes(), reborrow(&mut checksum))?;
    let n = write_value(stream, list.as_slice(), checksum).map_err(|err| err.after(m))?;
    Ok(m + n)
}

/// Write a strided array as four records: `dtype`, `shape`, `strides`, and a
/// sized `data` record holding its flat memory extent.
pub fn write_ndview<W: Write + ?Sized, V: Strided + ?Sized>(
    stream: &mut W,
    ndview: &V,
    dtype: &str,
    item_size: usize,
    mut checksum: Option<&mut dyn Checksum>,
    mut scratch: Scratch<'_>,
) -> Result<usize> {
    let memory = ndview.flat_memory(item_size)?;
    let buf = scratch.buf();

    let mut total = write_line(
        stream,
        "dtype",
        dtype.as_bytes(),
        None,
        reborrow(&mut checksum),
        Scratch::Borrowed(&mut *buf),
    )?;
    total += write_sizes(
        stream,
        "shape",
        ndview.shape(),
        reborrow(&mut checksum),
        Scratch::Borrowed(&mut *buf),
    )
    .map_err(|err| err.after(total))?;
    total += write_sizes(
        stream,
        "strides",
        ndview.strides(),
        reborrow(&mut checksum),
        Scratch::Borrowed(&mut *buf),
    )
    .map_err(|err| err.after(total))?;
    total += write_line(stream, "data", memory, Some(true), checksum, Scratch::Borrowed(&mut *buf))
        .map_err(|err| err.after(total))?;
    Ok(total)
}

/// Read a fixed number of bytes, or up to and including a delimiter.
///
/// Exactly one of `size` and a non-empty `delimiters` must be given. The bytes
/// are appended to `scratch` and the returned view covers just them. The
/// checksum only sees reads that complete.
pub fn read_some<'b, R: Read + ?Sized>(
    stream: &mut R,
    size: Option<usize>,
    delimiters: &[u8],
    scratch: &'b mut Buf,
    checksum: Option<&mut dyn Checksum>,
) -> Result<&'b [u8]> {
    let range = read_range(stream, size, delimiters, scratch, usize::MAX, checksum)?;
    Ok(&scratch.as_slice()[range])
}

fn read_range<R: Read + ?Sized>(
    stream: &mut R,
    size: Option<usize>,
    delimiters: &[u8],
    scratch: &mut Buf,
    limit: usize,
    checksum: Option<&mut dyn Checksum>,
) -> Result<Range<usize>> {
    let start = scratch.len();
    let range = match (size, delimiters.is_empty()) {
        (Some(size), true) => read_exact_into(stream, size, scratch)?,
        (None, false) => read_delimited_into(stream, delimiters, scratch, limit)?,
        _ => return Err(KvnlError::MissingTermination),
    };
    debug_assert_eq!(range.start, start);
    if let Some(checksum) = checksum {
        checksum.update(&scratch.as_slice()[range.clone()]);
    }
    Ok(range)
}

fn read_exact_into<R: Read + ?Sized>(
    stream: &mut R,
    size: usize,
    scratch: &mut Buf,
) -> Result<Range<usize>> {
    let start = scratch.len();
    let end = start
        .checked_add(size)
        .ok_or(BufError::AllocationFailed { requested: usize::MAX })?;
    scratch.resize(end)?;

    let mut filled = 0usize;
    while filled < size {
        match stream.read(&mut scratch.as_mut_slice()[start + filled..]) {
            Ok(0) => {
                let partial = scratch.as_slice()[start..start + filled].to_vec();
                scratch.resize(start + filled)?;
                return Err(KvnlError::EndOfStream { partial });
            }
            Ok(n) => filled += n,
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(source) => {
                scratch.resize(start + filled)?;
                return Err(KvnlError::Io {
                    source,
                    transferred: filled,
                });
            }
        }
    }
    Ok(start..end)
}

fn read_delimited_into<R: Read + ?Sized>(
    stream: &mut R,
    delimiters: &[u8],
    scratch: &mut Buf,
    limit: usize,
) -> Result<Range<usize>> {
    let start = scratch.len();
    let mut byte = [0u8; 1];
    loop {
        match stream.read(&mut byte) {
            Ok(0) => {
                return Err(KvnlError::EndOfStream {
                    partial: scratch.as_slice()[start..].to_vec(),
                })
            }
            Ok(_) => {
                if scratch.len() - start >= limit {
                    return Err(KvnlError::ValueTooLarge {
                        size: scratch.len() - start + 1,
                        max: limit,
                    });
                }
                scratch.append(&byte)?;
                if delimiters.contains(&byte[0]) {
                    return Ok(start..scratch.len());
                }
            }
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(source) => {
                return Err(KvnlError::Io {
                    source,
                    transferred: scratch.len() - start,
                })
            }
        }
    }
}

/// Where a specification lies inside the scratch buffer.
#[derive(Debug, Clone)]
struct SpecRange {
    key: Range<usize>,
    size: Option<usize>,
    empty_line: bool,
}

/// Classify the raw specification text `raw`, located at `offset` in scratch.
fn parse_specification(raw: &[u8], offset: usize) -> Result<SpecRange> {
    let Some((&terminator, body)) = raw.split_last() else {
        return Err(KvnlError::MalformedSpecification { raw: Vec::new() });
    };
    if raw == EMPTY_LINE {
        return Ok(SpecRange {
            key: offset..offset + 1,
            size: None,
            empty_line: true,
        });
    }
    if terminator == NEWLINE {
        debug!(raw = ?String::from_utf8_lossy(raw), "specification ended without '='");
        return Err(KvnlError::MalformedSpecification { raw: raw.to_vec() });
    }

    match body.iter().rposition(|&b| b == SIZE_MARKER) {
        None => Ok(SpecRange {
            key: offset..offset + body.len(),
            size: None,
            empty_line: false,
        }),
        Some(colon) => {
            let size = parse_decimal(&body[colon + 1..]).ok_or_else(|| {
                debug!(raw = ?String::from_utf8_lossy(raw), "unparseable declared size");
                KvnlError::MalformedSize { raw: raw.to_vec() }
            })?;
            Ok(SpecRange {
                key: offset..offset + colon,
                size: Some(size),
                empty_line: false,
            })
        }
    }
}

/// Non-empty ASCII digits, no sign, no overflow.
fn parse_decimal(digits: &[u8]) -> Option<usize> {
    if digits.is_empty() {
        return None;
    }
    digits.iter().try_fold(0usize, |acc, &b| {
        if !b.is_ascii_digit() {
            return None;
        }
        acc.checked_mul(10)?.checked_add(usize::from(b - b'0'))
    })
}

fn read_specification_range<R: Read + ?Sized>(
    stream: &mut R,
    scratch: &mut Buf,
    checksum: Option<&mut dyn Checksum>,
) -> Result<SpecRange> {
    let range = read_range(
        stream,
        None,
        SPECIFICATION_DELIMITERS,
        scratch,
        usize::MAX,
        checksum,
    )?;
    parse_specification(&scratch.as_slice()[range.clone()], range.start)
}

/// Read a value of the declared `size`, or up to the next newline when
/// `size` is absent. The returned range excludes the terminating newline.
fn read_value_range<R: Read + ?Sized>(
    stream: &mut R,
    size: Option<usize>,
    scratch: &mut Buf,
    limit: usize,
    mut checksum: Option<&mut dyn Checksum>,
) -> Result<Range<usize>> {
    match size {
        None => {
            let range = read_range(
                stream,
                None,
                VALUE_DELIMITERS,
                scratch,
                limit.saturating_add(1),
                checksum,
            )?;
            Ok(range.start..range.end - 1)
        }
        Some(size) => {
            if size > limit {
                return Err(KvnlError::ValueTooLarge { size, max: limit });
            }
            let value = read_range(stream, Some(size), &[], scratch, limit, reborrow(&mut checksum))?;
            let trailer = match read_range(
                stream,
                None,
                VALUE_DELIMITERS,
                scratch,
                limit.saturating_add(1),
                checksum,
            ) {
                Ok(range) => range,
                Err(KvnlError::EndOfStream { partial }) => {
                    return Err(KvnlError::ExpectedNewline { got: partial })
                }
                Err(err) => return Err(err),
            };
            if trailer.len() != 1 {
                let got = scratch.as_slice()[trailer].to_vec();
                return Err(KvnlError::ExpectedNewline { got });
            }
            Ok(value)
        }
    }
}

/// Read a specification into `scratch`, replacing its contents.
///
/// A lone newline is the empty-line record. A specification that ends in a
/// newline instead of `=` is malformed, as is a declared size after the last
/// `:` that is not a non-negative decimal.
pub fn read_specification<'b, R: Read + ?Sized>(
    stream: &mut R,
    scratch: &'b mut Buf,
    checksum: Option<&mut dyn Checksum>,
) -> Result<Specification<'b>> {
    scratch.resize(0)?;
    let spec = read_specification_range(stream, scratch, checksum)?;
    Ok(Specification {
        key: &scratch.as_slice()[spec.key],
        size: spec.size,
    })
}

/// Read the value for a specification declaring `size`, appending to `scratch`.
pub fn read_value<'b, R: Read + ?Sized>(
    stream: &mut R,
    size: Option<usize>,
    scratch: &'b mut Buf,
    checksum: Option<&mut dyn Checksum>,
) -> Result<&'b [u8]> {
    let range = read_value_range(stream, size, scratch, usize::MAX, checksum)?;
    Ok(&scratch.as_slice()[range])
}

/// Read one record into `scratch`, replacing its contents.
pub fn read_line<'b, R: Read + ?Sized>(
    stream: &mut R,
    scratch: &'b mut Buf,
    checksum: Option<&mut dyn Checksum>,
) -> Result<Line<'b>> {
    read_line_limited(stream, scratch, usize::MAX, checksum)
}

pub(crate) fn read_line_limited<'b, R: Read + ?Sized>(
    stream: &mut R,
    scratch: &'b mut Buf,
    limit: usize,
    mut checksum: Option<&mut dyn Checksum>,
) -> Result<Line<'b>> {
    scratch.resize(0)?;
    let spec = read_specification_range(stream, scratch, reborrow(&mut checksum))?;
    let value = if spec.empty_line {
        spec.key.end..spec.key.end
    } else {
        read_value_range(stream, spec.size, scratch, limit, checksum)?
    };

    let contents = scratch.as_slice();
    Ok(Line {
        specification: Specification {
            key: &contents[spec.key],
            size: spec.size,
        },
        value: &contents[value],
    })
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;
    use crate::ndview::NdView;

    fn encode(key: &str, value: &[u8], sized: Option<bool>) -> Vec<u8> {
        let mut wire = Vec::new();
        write_line(&mut wire, key, value, sized, None, Scratch::scoped()).unwrap();
        wire
    }

    #[test]
    fn write_line_delimited_scenario() {
        let mut wire = Vec::new();
        let n = write_line(&mut wire, "k", b"some data", None, None, Scratch::scoped()).unwrap();
        assert_eq!(wire, b"k=some data\n");
        assert_eq!(n, wire.len());

        let mut scratch = Buf::new();
        let line = read_line(&mut Cursor::new(wire), &mut scratch, None).unwrap();
        assert_eq!(line.key(), b"k");
        assert_eq!(line.specification.size, None);
        assert_eq!(line.value, b"some data");
    }

    #[test]
    fn write_line_sized_scenario() {
        let wire = encode("k", b"some\ndata", None);
        assert_eq!(wire, b"k:9=some\ndata\n");

        let mut scratch = Buf::new();
        let line = read_line(&mut Cursor::new(wire), &mut scratch, None).unwrap();
        assert_eq!(line.key(), b"k");
        assert_eq!(line.specification.size, Some(9));
        assert_eq!(line.value, b"some\ndata");
    }

    #[test]
    fn long_values_are_sized_automatically() {
        let value = vec![b'x'; DEFAULT_SIZED_THRESHOLD + 1];
        let wire = encode("blob", &value, None);
        assert!(wire.starts_with(b"blob:1025="));

        let value = vec![b'x'; DEFAULT_SIZED_THRESHOLD];
        let wire = encode("blob", &value, None);
        assert!(wire.starts_with(b"blob=x"));
    }

    #[test]
    fn explicit_sizing_overrides_auto() {
        assert_eq!(encode("k", b"v", Some(true)), b"k:1=v\n");
        assert_eq!(encode("k", b"", Some(true)), b"k:0=\n");
        assert_eq!(encode("k", b"", Some(false)), b"k=\n");
    }

    #[test]
    fn delimited_roundtrip_preserves_bytes() {
        let value: Vec<u8> = (0u8..=255).filter(|&b| b != b'\n').collect();
        let wire = encode("bin", &value, Some(false));
        let mut scratch = Buf::new();
        let line = read_line(&mut Cursor::new(wire), &mut scratch, None).unwrap();
        assert_eq!(line.key(), b"bin");
        assert_eq!(line.value, value.as_slice());
    }

    #[test]
    fn sized_roundtrip_keeps_newlines() {
        let value = b"\nline one\nline two\n\n";
        let wire = encode("text", value, Some(true));
        let mut scratch = Buf::new();
        let line = read_line(&mut Cursor::new(wire), &mut scratch, None).unwrap();
        assert_eq!(line.value, value);
        assert_eq!(line.specification.size, Some(value.len()));
    }

    #[test]
    fn write_specification_rejects_separator_and_writes_nothing() {
        let mut wire = Vec::new();
        let err = write_specification(&mut wire, b"a=b", None).unwrap_err();
        assert!(matches!(err, KvnlError::MalformedSpecification { raw } if raw == b"a=b"));
        assert!(wire.is_empty());

        let err = write_specification(&mut wire, b"a\nb", None).unwrap_err();
        assert!(matches!(err, KvnlError::MalformedSpecification { .. }));
        assert!(wire.is_empty());
    }

    #[test]
    fn write_specification_passes_empty_line() {
        let mut wire = Vec::new();
        assert_eq!(write_specification(&mut wire, b"\n", None).unwrap(), 1);
        assert_eq!(wire, b"\n");
    }

    #[test]
    fn write_line_with_bad_key_writes_nothing() {
        let mut wire = Vec::new();
        let err = write_line(&mut wire, "a=b", b"v", None, None, Scratch::scoped()).unwrap_err();
        assert_eq!(err.code(), 0x1001);
        assert!(wire.is_empty());
    }

    #[test]
    fn write_line_empty_line_key() {
        assert_eq!(encode("\n", b"", None), b"\n");
        let mut wire = Vec::new();
        assert!(write_line(&mut wire, "\n", b"v", None, None, Scratch::scoped()).is_err());
        assert!(wire.is_empty());
    }

    #[test]
    fn encode_specification_forms() {
        let mut buf = Buf::new();
        assert_eq!(encode_specification("key", None, &mut buf).unwrap(), 3);
        assert_eq!(buf.as_slice(), b"key");
        assert_eq!(encode_specification("key", Some(1234), &mut buf).unwrap(), 8);
        assert_eq!(buf.as_slice(), b"key:1234");
        assert_eq!(encode_specification("", None, &mut buf).unwrap(), 0);
        assert_eq!(buf.as_slice(), b"");
    }

    #[test]
    fn borrowed_scratch_is_reused() {
        let mut scratch = Buf::grow_only(2.0);
        let mut wire = Vec::new();
        write_line(&mut wire, "first", b"1", None, None, Scratch::from(&mut scratch)).unwrap();
        write_line(&mut wire, "second", b"22", None, None, (&mut scratch).into()).unwrap();
        write_line(&mut wire, "third", b"333", None, None, Scratch::from(None)).unwrap();
        assert_eq!(wire, b"first=1\nsecond=22\nthird=333\n");
        assert_eq!(scratch.as_slice(), b"second");
    }

    #[test]
    fn checksum_sees_every_written_range() {
        let mut seen = Vec::new();
        let mut sink = |bytes: &[u8]| seen.extend_from_slice(bytes);
        let mut wire = Vec::new();
        write_line(&mut wire, "k", b"v\nw", None, Some(&mut sink), Scratch::scoped()).unwrap();
        assert_eq!(seen, wire);
    }

    #[test]
    fn read_checksum_matches_write_checksum() {
        let mut written = Vec::new();
        let mut wire = Vec::new();
        {
            let mut sink = |bytes: &[u8]| written.extend_from_slice(bytes);
            write_line(&mut wire, "a", b"1", None, Some(&mut sink), Scratch::scoped()).unwrap();
            write_line(&mut wire, "b", b"x\ny", None, Some(&mut sink), Scratch::scoped()).unwrap();
        }

        let mut read = Vec::new();
        let mut sink = |bytes: &[u8]| read.extend_from_slice(bytes);
        let mut cursor = Cursor::new(wire);
        let mut scratch = Buf::new();
        read_line(&mut cursor, &mut scratch, Some(&mut sink)).unwrap();
        read_line(&mut cursor, &mut scratch, Some(&mut sink)).unwrap();
        assert_eq!(read, written);
    }

    #[test]
    fn checksum_fires_even_when_write_fails() {
        struct Broken;
        impl Write for Broken {
            fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
                Err(std::io::Error::other("broken"))
            }
            fn flush(&mut self) -> std::io::Result<()> {
                Ok(())
            }
        }

        let mut calls = 0;
        let mut sink = |_: &[u8]| calls += 1;
        let err = write_line(&mut Broken, "k", b"v", None, Some(&mut sink), Scratch::scoped())
            .unwrap_err();
        assert!(matches!(err, KvnlError::Io { transferred: 0, .. }));
        assert_eq!(calls, 1);
    }

    #[test]
    fn failed_write_keeps_emitted_bytes() {
        /// Accepts `budget` bytes, then fails.
        struct Budget {
            data: Vec<u8>,
            budget: usize,
        }
        impl Write for Budget {
            fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
                if self.budget == 0 {
                    return Err(std::io::Error::other("full"));
                }
                let n = buf.len().min(self.budget);
                self.data.extend_from_slice(&buf[..n]);
                self.budget -= n;
                Ok(n)
            }
            fn flush(&mut self) -> std::io::Result<()> {
                Ok(())
            }
        }

        let mut sink = Budget {
            data: Vec::new(),
            budget: 4,
        };
        let err = write_line(&mut sink, "key", b"value", None, None, Scratch::scoped()).unwrap_err();
        assert!(matches!(err, KvnlError::Io { transferred: 4, .. }));
        assert_eq!(sink.data, b"key=");
    }

    #[test]
    fn write_zero_is_an_error() {
        struct Zero;
        impl Write for Zero {
            fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
                Ok(0)
            }
            fn flush(&mut self) -> std::io::Result<()> {
                Ok(())
            }
        }
        let err = write_some(&mut Zero, b"x", None).unwrap_err();
        assert!(matches!(err, KvnlError::Io { source, .. } if source.kind() == ErrorKind::WriteZero));
    }

    #[test]
    fn write_sizes_emits_space_separated_list() {
        let mut wire = Vec::new();
        let n = write_sizes(&mut wire, "shape", &[2usize, 3, 4], None, Scratch::scoped()).unwrap();
        assert_eq!(wire, b"shape=2 3 4\n");
        assert_eq!(n, wire.len());

        let mut wire = Vec::new();
        write_sizes(&mut wire, "strides", &[-8isize, 4], None, Scratch::scoped()).unwrap();
        assert_eq!(wire, b"strides=-8 4\n");

        let mut wire = Vec::new();
        write_sizes::<_, usize>(&mut wire, "shape", &[], None, Scratch::scoped()).unwrap();
        assert_eq!(wire, b"shape=\n");
    }

    #[test]
    fn write_ndview_emits_four_records() {
        let memory: Vec<u8> = (b'a'..b'a' + 6).collect();
        let view = NdView::row_major(&memory, vec![2, 3], 1).unwrap();
        let mut wire = Vec::new();
        let mut scratch = Buf::new();
        let n = write_ndview(&mut wire, &view, "u8", 1, None, (&mut scratch).into()).unwrap();
        assert_eq!(wire, b"dtype=u8\nshape=2 3\nstrides=3 1\ndata:6=abcdef\n");
        assert_eq!(n, wire.len());
    }

    #[test]
    fn write_ndview_uses_flat_extent_for_negative_strides() {
        let memory: Vec<u8> = b"0123".to_vec();
        let view = NdView::new(&memory, 3, vec![4], vec![-1]).unwrap();
        let mut wire = Vec::new();
        write_ndview(&mut wire, &view, "u8", 1, None, Scratch::scoped()).unwrap();
        assert_eq!(wire, b"dtype=u8\nshape=4\nstrides=-1\ndata:4=0123\n");
    }

    #[test]
    fn write_ndview_rejects_out_of_bounds_view() {
        let memory = [0u8; 2];
        let view = NdView::row_major(&memory, vec![4], 1).unwrap();
        let mut wire = Vec::new();
        let err = write_ndview(&mut wire, &view, "u8", 1, None, Scratch::scoped()).unwrap_err();
        assert!(matches!(err, KvnlError::InvalidView(_)));
        assert!(wire.is_empty());
    }

    #[test]
    fn read_some_requires_exactly_one_termination() {
        let mut scratch = Buf::new();
        let mut stream = Cursor::new(b"abc".to_vec());
        assert!(matches!(
            read_some(&mut stream, None, b"", &mut scratch, None),
            Err(KvnlError::MissingTermination)
        ));
        assert!(matches!(
            read_some(&mut stream, Some(1), b"\n", &mut scratch, None),
            Err(KvnlError::MissingTermination)
        ));
        assert_eq!(stream.position(), 0);
    }

    #[test]
    fn read_some_fixed_and_delimited() {
        let mut scratch = Buf::new();
        let mut stream = Cursor::new(b"abcdef;gh".to_vec());
        assert_eq!(read_some(&mut stream, Some(3), b"", &mut scratch, None).unwrap(), b"abc");
        assert_eq!(read_some(&mut stream, None, b";", &mut scratch, None).unwrap(), b"def;");
        assert_eq!(scratch.as_slice(), b"abcdef;");

        let err = read_some(&mut stream, None, b";", &mut scratch, None).unwrap_err();
        assert!(matches!(err, KvnlError::EndOfStream { partial } if partial == b"gh"));
    }

    #[test]
    fn read_some_fixed_reports_partial_bytes() {
        let mut scratch = Buf::new();
        let mut calls = 0;
        let mut sink = |_: &[u8]| calls += 1;
        let err = read_some(
            &mut Cursor::new(b"ab".to_vec()),
            Some(5),
            b"",
            &mut scratch,
            Some(&mut sink),
        )
        .unwrap_err();
        assert!(matches!(err, KvnlError::EndOfStream { partial } if partial == b"ab"));
        assert_eq!(calls, 0);
        assert_eq!(scratch.as_slice(), b"ab");
    }

    #[test]
    fn read_line_empty_line_record() {
        let mut scratch = Buf::new();
        let line = read_line(&mut Cursor::new(b"\n".to_vec()), &mut scratch, None).unwrap();
        assert!(line.is_empty_line());
        assert_eq!(line.specification.size, None);
        assert!(line.value.is_empty());
    }

    #[test]
    fn read_specification_cases() {
        let mut scratch = Buf::new();

        let spec = read_specification(&mut Cursor::new(b"key=".to_vec()), &mut scratch, None).unwrap();
        assert_eq!(spec, Specification { key: b"key", size: None });

        let spec =
            read_specification(&mut Cursor::new(b"key:12=".to_vec()), &mut scratch, None).unwrap();
        assert_eq!(spec, Specification { key: b"key", size: Some(12) });

        let spec =
            read_specification(&mut Cursor::new(b"a:b:3=".to_vec()), &mut scratch, None).unwrap();
        assert_eq!(spec, Specification { key: b"a:b", size: Some(3) });

        let spec = read_specification(&mut Cursor::new(b"=".to_vec()), &mut scratch, None).unwrap();
        assert_eq!(spec, Specification { key: b"", size: None });

        let spec = read_specification(&mut Cursor::new(b"\n".to_vec()), &mut scratch, None).unwrap();
        assert!(spec.is_empty_line());
    }

    #[test]
    fn read_specification_rejects_bare_newline_termination() {
        let mut scratch = Buf::new();
        let err = read_specification(&mut Cursor::new(b"key\n".to_vec()), &mut scratch, None)
            .unwrap_err();
        assert!(matches!(err, KvnlError::MalformedSpecification { raw } if raw == b"key\n"));
    }

    #[test]
    fn read_specification_rejects_bad_sizes() {
        for raw in [&b"k:=v\n"[..], b"k:x=v\n", b"k:-1=v\n", b"k:+1=v\n", b"k:99999999999999999999999=v\n"] {
            let mut scratch = Buf::new();
            let err = read_line(&mut Cursor::new(raw.to_vec()), &mut scratch, None).unwrap_err();
            let spec_len = raw.iter().position(|&b| b == b'=').unwrap() + 1;
            assert!(
                matches!(&err, KvnlError::MalformedSize { raw: got } if got == &raw[..spec_len]),
                "{err:?}"
            );
        }
    }

    #[test]
    fn read_specification_eof() {
        let mut scratch = Buf::new();
        let err = read_specification(&mut Cursor::new(Vec::new()), &mut scratch, None).unwrap_err();
        assert!(err.is_clean_end());

        let err = read_specification(&mut Cursor::new(b"ke".to_vec()), &mut scratch, None)
            .unwrap_err();
        assert!(matches!(err, KvnlError::EndOfStream { partial } if partial == b"ke"));
    }

    #[test]
    fn read_value_after_specification() {
        let mut scratch = Buf::new();
        let mut stream = Cursor::new(b"k:3=a\nb\n".to_vec());
        let size = read_specification(&mut stream, &mut scratch, None).unwrap().size;
        let value = read_value(&mut stream, size, &mut scratch, None).unwrap();
        assert_eq!(value, b"a\nb");
    }

    #[test]
    fn sized_value_needs_single_newline() {
        let mut scratch = Buf::new();
        let err = read_line(&mut Cursor::new(b"k:2=abcd\n".to_vec()), &mut scratch, None)
            .unwrap_err();
        assert!(matches!(err, KvnlError::ExpectedNewline { got } if got == b"cd\n"));

        let err = read_line(&mut Cursor::new(b"k:2=ab".to_vec()), &mut scratch, None).unwrap_err();
        assert!(matches!(err, KvnlError::ExpectedNewline { got } if got.is_empty()));

        let err = read_line(&mut Cursor::new(b"k:2=abc".to_vec()), &mut scratch, None).unwrap_err();
        assert!(matches!(err, KvnlError::ExpectedNewline { got } if got == b"c"));
    }

    #[test]
    fn stray_bytes_after_sized_value_are_consumed_through_newline() {
        let mut stream = Cursor::new(b"k:2=abcd\nnext=1\n".to_vec());
        let mut scratch = Buf::new();
        let err = read_line(&mut stream, &mut scratch, None).unwrap_err();
        assert!(matches!(err, KvnlError::ExpectedNewline { got } if got == b"cd\n"));

        let line = read_line(&mut stream, &mut scratch, None).unwrap();
        assert_eq!(line.key(), b"next");
        assert_eq!(line.value, b"1");
    }

    #[test]
    fn huge_declared_size_is_reported() {
        let mut scratch = Buf::new();
        let err = read_line(
            &mut Cursor::new(b"k:18446744073709551000=x\n".to_vec()),
            &mut scratch,
            None,
        )
        .unwrap_err();
        assert!(matches!(
            err,
            KvnlError::Buffer(BufError::AllocationFailed { .. })
        ));
    }

    #[test]
    fn failed_sized_read_keeps_only_received_bytes() {
        struct FailAfter {
            data: Cursor<Vec<u8>>,
        }

        impl Read for FailAfter {
            fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
                match self.data.read(buf)? {
                    0 => Err(std::io::Error::new(ErrorKind::ConnectionReset, "reset")),
                    n => Ok(n),
                }
            }
        }

        let mut stream = FailAfter {
            data: Cursor::new(b"k:10=abc".to_vec()),
        };
        let mut scratch = Buf::new();
        let spec = read_specification(&mut stream, &mut scratch, None).unwrap();
        let size = spec.size;
        let before = scratch.len();
        let err = read_value(&mut stream, size, &mut scratch, None).unwrap_err();

        assert!(matches!(
            err,
            KvnlError::Io { ref source, transferred: 3 } if source.kind() == ErrorKind::ConnectionReset
        ));
        assert_eq!(scratch.len(), before + 3);
        assert_eq!(&scratch.as_slice()[before..], b"abc");
    }

    #[test]
    fn truncated_sized_value_is_end_of_stream() {
        let mut scratch = Buf::new();
        let err = read_line(&mut Cursor::new(b"k:10=abc".to_vec()), &mut scratch, None)
            .unwrap_err();
        assert!(matches!(err, KvnlError::EndOfStream { partial } if partial == b"abc"));
    }

    #[test]
    fn truncated_delimited_value_is_end_of_stream() {
        let mut scratch = Buf::new();
        let err = read_line(&mut Cursor::new(b"k=abc".to_vec()), &mut scratch, None).unwrap_err();
        assert!(matches!(err, KvnlError::EndOfStream { partial } if partial == b"abc"));
    }

    #[test]
    fn sequential_records_share_scratch() {
        let mut wire = Vec::new();
        let mut scratch = Buf::new();
        write_line(&mut wire, "a", b"1", None, None, (&mut scratch).into()).unwrap();
        write_line(&mut wire, "\n", b"", None, None, (&mut scratch).into()).unwrap();
        write_line(&mut wire, "b", b"two\nlines", None, None, (&mut scratch).into()).unwrap();

        let mut stream = Cursor::new(wire);
        let first = read_line(&mut stream, &mut scratch, None).unwrap().to_record().unwrap();
        let empty = read_line(&mut stream, &mut scratch, None).unwrap().to_record().unwrap();
        let second = read_line(&mut stream, &mut scratch, None).unwrap().to_record().unwrap();

        assert_eq!(first, Record::new("a", &b"1"[..]));
        assert!(empty.is_empty_line());
        assert_eq!(second, Record::sized("b", &b"two\nlines"[..]));
        assert!(read_line(&mut stream, &mut scratch, None).unwrap_err().is_clean_end());
    }

    #[test]
    fn record_wire_size_matches_encoding() {
        for record in [
            Record::new("k", &b"some data"[..]),
            Record::sized("k", &b"some\ndata"[..]),
            Record::sized("blob", vec![0u8; 12_345]),
            Record::empty_line(),
        ] {
            let mut wire = Vec::new();
            if record.is_empty_line() {
                write_line(&mut wire, &record.key, b"", None, None, Scratch::scoped()).unwrap();
            } else {
                write_line(
                    &mut wire,
                    &record.key,
                    &record.value,
                    Some(record.size.is_some()),
                    None,
                    Scratch::scoped(),
                )
                .unwrap();
            }
            assert_eq!(record.wire_size(), wire.len(), "{record:?}");
        }
    }

    #[test]
    fn parse_decimal_bounds() {
        assert_eq!(parse_decimal(b"0"), Some(0));
        assert_eq!(parse_decimal(b"007"), Some(7));
        assert_eq!(parse_decimal(b""), None);
        assert_eq!(parse_decimal(b"1 "), None);
        assert_eq!(decimal_len(0), 1);
        assert_eq!(decimal_len(10), 2);
        assert_eq!(decimal_len(999), 3);
    }
}
