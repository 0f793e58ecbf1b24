//! Byte view helpers.
//!
//! A view is a borrowed `&[u8]`: it never owns memory and is only valid for as
//! long as the region it points into. Views taken from a [`Buf`](crate::Buf)
//! are invalidated by its next resize or release, which the borrow checker
//! enforces.

use crate::error::{BufError, Result};

/// Bytewise equality; views of different lengths are never equal.
pub fn equals(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x == y)
}

/// Returns true if `needle` occurs anywhere in `haystack`.
///
/// Naive linear scan without preprocessing. An empty needle is always found.
pub fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    find(haystack, needle).is_some()
}

/// Offset of the first occurrence of `needle` in `haystack`.
pub fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() {
        return Some(0);
    }
    if needle.len() > haystack.len() {
        return None;
    }
    (0..=haystack.len() - needle.len()).find(|&i| equals(&haystack[i..i + needle.len()], needle))
}

/// Sub-range `[lower, upper)` with both bounds clamped to the view.
///
/// Never out of bounds; an inverted range yields an empty view.
pub fn partial(view: &[u8], lower: usize, upper: usize) -> &[u8] {
    let offset = lower.min(view.len());
    let end = upper.min(view.len()).max(offset);
    &view[offset..end]
}

/// Mutable counterpart of [`partial`].
pub fn partial_mut(view: &mut [u8], lower: usize, upper: usize) -> &mut [u8] {
    let offset = lower.min(view.len());
    let end = upper.min(view.len()).max(offset);
    &mut view[offset..end]
}

/// Tile `src` across `dst`.
///
/// `dst.len()` must be a whole multiple of a non-empty `src`.
pub fn fill(dst: &mut [u8], src: &[u8]) -> Result<()> {
    if src.is_empty() || dst.len() % src.len() != 0 {
        return Err(BufError::InvalidArgument(
            "fill destination must be a multiple of a non-empty source",
        ));
    }
    for chunk in dst.chunks_exact_mut(src.len()) {
        chunk.copy_from_slice(src);
    }
    Ok(())
}

/// Copy `src` into `dst`; both must have the same length.
pub fn copy(dst: &mut [u8], src: &[u8]) -> Result<()> {
    if dst.len() != src.len() {
        return Err(BufError::InvalidArgument("copy requires views of equal length"));
    }
    dst.copy_from_slice(src);
    Ok(())
}

/// Remove the address range covered by `b` from `a`.
///
/// - disjoint ranges return `a` unchanged;
/// - overlap at the start of `a` returns what follows the overlap;
/// - overlap at the end of `a` returns what precedes it.
///
/// When `b` lies strictly inside `a` the result would be two pieces; only the
/// front piece is returned.
pub fn difference<'a>(a: &'a [u8], b: &[u8]) -> &'a [u8] {
    let a_start = a.as_ptr() as usize;
    let a_end = a_start + a.len();
    let b_start = b.as_ptr() as usize;
    let b_end = b_start + b.len();

    if b.is_empty() || b_end <= a_start || b_start >= a_end {
        return a;
    }
    if b_start <= a_start {
        return &a[b_end.min(a_end) - a_start..];
    }
    &a[..b_start - a_start]
}
