//! Strided multi-dimensional views, as far as the codec needs them.
//!
//! The codec only consumes a layout (shape and per-axis byte strides) and the
//! flat memory extent that covers every element. Indexing and printing are
//! left to whatever array type implements [`Strided`].

use crate::error::{KvnlError, Result};

/// Byte offsets relative to the first element.
///
/// `lower` is the lowest offset touched, `upper` one past the last byte of the
/// highest element.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Extent {
    pub lower: isize,
    pub upper: isize,
}

impl Extent {
    pub fn len(&self) -> usize {
        self.upper.abs_diff(self.lower)
    }

    pub fn is_empty(&self) -> bool {
        self.upper == self.lower
    }
}

/// Layout of a strided array.
pub trait Strided {
    /// Element count per axis.
    fn shape(&self) -> &[usize];

    /// Byte stride per axis; may be negative.
    fn strides(&self) -> &[isize];

    /// The contiguous bytes spanned by [`Strided::extent`].
    fn flat_memory(&self, item_size: usize) -> Result<&[u8]>;

    fn ndim(&self) -> usize {
        self.shape().len()
    }

    /// Negative strides extend the lower bound, positive ones the upper bound.
    /// An array with an empty axis has no elements and an empty extent.
    fn extent(&self, item_size: usize) -> Result<Extent> {
        if self.shape().contains(&0) {
            return Ok(Extent { lower: 0, upper: 0 });
        }
        let overflow = || KvnlError::InvalidView("extent overflows isize");
        let mut extent = Extent {
            lower: 0,
            upper: isize::try_from(item_size).map_err(|_| overflow())?,
        };
        for (&count, &stride) in self.shape().iter().zip(self.strides()) {
            let reach = isize::try_from(count - 1)
                .ok()
                .and_then(|steps| steps.checked_mul(stride))
                .ok_or_else(overflow)?;
            let bound = if stride < 0 {
                &mut extent.lower
            } else {
                &mut extent.upper
            };
            *bound = bound.checked_add(reach).ok_or_else(overflow)?;
        }
        Ok(extent)
    }
}

/// A strided view over borrowed memory.
///
/// `origin` is the byte offset of the first element inside `memory`.
#[derive(Debug, Clone)]
pub struct NdView<'a> {
    memory: &'a [u8],
    origin: usize,
    shape: Vec<usize>,
    strides: Vec<isize>,
}

impl<'a> NdView<'a> {
    pub fn new(
        memory: &'a [u8],
        origin: usize,
        shape: Vec<usize>,
        strides: Vec<isize>,
    ) -> Result<Self> {
        if shape.len() != strides.len() {
            return Err(KvnlError::InvalidView("shape and strides differ in length"));
        }
        if origin > memory.len() {
            return Err(KvnlError::InvalidView("origin lies outside memory"));
        }
        Ok(Self {
            memory,
            origin,
            shape,
            strides,
        })
    }

    /// Dense C-order view starting at the beginning of `memory`.
    pub fn row_major(memory: &'a [u8], shape: Vec<usize>, item_size: usize) -> Result<Self> {
        let strides = row_major_strides(&shape, item_size)?;
        Self::new(memory, 0, shape, strides)
    }

    /// True when every axis is packed directly inside the next outer one.
    pub fn is_dense_row_major(&self) -> bool {
        (1..self.shape.len()).all(|i| {
            isize::try_from(self.shape[i])
                .ok()
                .and_then(|count| count.checked_mul(self.strides[i]))
                == Some(self.strides[i - 1])
        })
    }
}

impl Strided for NdView<'_> {
    fn shape(&self) -> &[usize] {
        &self.shape
    }

    fn strides(&self) -> &[isize] {
        &self.strides
    }

    fn flat_memory(&self, item_size: usize) -> Result<&[u8]> {
        let extent = self.extent(item_size)?;
        let outside = || KvnlError::InvalidView("extent lies outside memory");
        let start = self
            .origin
            .checked_add_signed(extent.lower)
            .ok_or_else(outside)?;
        let end = self
            .origin
            .checked_add_signed(extent.upper)
            .ok_or_else(outside)?;
        self.memory.get(start..end).ok_or_else(outside)
    }
}

/// Byte strides of a dense C-order array.
pub fn row_major_strides(shape: &[usize], item_size: usize) -> Result<Vec<isize>> {
    let overflow = || KvnlError::InvalidView("strides overflow isize");
    let mut strides = vec![0isize; shape.len()];
    let mut stride = isize::try_from(item_size).map_err(|_| overflow())?;
    for (slot, &count) in strides.iter_mut().zip(shape).rev() {
        *slot = stride;
        stride = isize::try_from(count)
            .ok()
            .and_then(|count| stride.checked_mul(count))
            .ok_or_else(overflow)?;
    }
    Ok(strides)
}

/// Parse a comma-separated shape such as `"2,3,4"`.
pub fn parse_shape(spec: &str) -> Result<Vec<usize>> {
    spec.split(',')
        .map(|token| {
            token
                .trim()
                .parse::<usize>()
                .map_err(|_| KvnlError::InvalidView("shape must be comma-separated integers"))
        })
        .collect()
}
