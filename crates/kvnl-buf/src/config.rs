use std::fmt;

use crate::error::{BufError, Result};

/// Default fraction of capacity below which a buffer shrinks.
pub const DEFAULT_SHRINK_THRESHOLD: f32 = 1.0 / 3.0;

/// Default over-allocation factor applied when a buffer reallocates.
pub const DEFAULT_GROWTH_FACTOR: f32 = 1.5;

/// Granularity to which a new capacity is rounded up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AllocPolicy {
    /// Word rounding below one page, page rounding from one page upwards.
    #[default]
    Auto,
    /// Round up to the native word size.
    WordAligned,
    /// Round up to the native page size.
    PageAligned,
    /// No rounding.
    Exact,
}

impl AllocPolicy {
    /// Rounding unit in bytes for a request of `requested` bytes.
    pub fn rounding_unit(self, requested: usize) -> usize {
        match self {
            AllocPolicy::Auto => {
                let page = crate::alloc::page_size();
                if requested < page {
                    crate::alloc::word_size()
                } else {
                    page
                }
            }
            AllocPolicy::WordAligned => crate::alloc::word_size(),
            AllocPolicy::PageAligned => crate::alloc::page_size(),
            AllocPolicy::Exact => 1,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AllocPolicy::Auto => "AUTO",
            AllocPolicy::WordAligned => "WORD",
            AllocPolicy::PageAligned => "PAGE",
            AllocPolicy::Exact => "EXACT",
        }
    }
}

impl fmt::Display for AllocPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Allocation parameters of a [`Buf`](crate::Buf).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BufConfig {
    /// Shrink once the requested size is at or below this fraction of capacity.
    /// Must lie in `[0, 1]`; zero disables shrinking.
    pub shrink_threshold: f32,
    /// Capacity allocated per requested byte on reallocation. Finite, `>= 1`.
    pub growth_factor: f32,
    /// Capacity rounding policy.
    pub policy: AllocPolicy,
}

impl Default for BufConfig {
    fn default() -> Self {
        Self {
            shrink_threshold: DEFAULT_SHRINK_THRESHOLD,
            growth_factor: DEFAULT_GROWTH_FACTOR,
            policy: AllocPolicy::Auto,
        }
    }
}

impl BufConfig {
    /// Capacity always equals size.
    pub fn exact() -> Self {
        Self {
            shrink_threshold: 1.0,
            growth_factor: 1.0,
            policy: AllocPolicy::Exact,
        }
    }

    pub fn new(shrink_threshold: f32, growth_factor: f32, policy: AllocPolicy) -> Self {
        Self {
            shrink_threshold,
            growth_factor,
            policy,
        }
    }

    /// Custom thresholds with [`AllocPolicy::Auto`].
    pub fn dynamic(shrink_threshold: f32, growth_factor: f32) -> Self {
        Self::new(shrink_threshold, growth_factor, AllocPolicy::Auto)
    }

    /// A buffer that grows by `growth_factor` and never shrinks.
    pub fn grow_only(growth_factor: f32) -> Self {
        Self::dynamic(0.0, growth_factor)
    }

    /// Check the parameter ranges.
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.shrink_threshold) {
            return Err(BufError::InvalidArgument(
                "shrink threshold must lie in [0, 1]",
            ));
        }
        if !self.growth_factor.is_finite() || self.growth_factor < 1.0 {
            return Err(BufError::InvalidArgument(
                "growth factor must be finite and at least 1",
            ));
        }
        Ok(())
    }

    /// Capacity to allocate for `requested` bytes, or `None` if it does not
    /// fit in `usize`.
    ///
    /// At least one byte is always allocated.
    pub fn capacity_for(&self, requested: usize) -> Option<usize> {
        let unit = self.policy.rounding_unit(requested);
        let scaled = (f64::from(self.growth_factor) * requested as f64).ceil();
        if scaled >= usize::MAX as f64 {
            return None;
        }
        round_up((scaled as usize).max(requested).max(1), unit)
    }

    /// Sizes at or below this boundary trigger a shrinking reallocation.
    pub fn shrink_boundary(&self, capacity: usize) -> usize {
        (f64::from(self.shrink_threshold) * capacity as f64).floor() as usize
    }
}

/// Round `n` up to a multiple of `unit`.
pub(crate) fn round_up(n: usize, unit: usize) -> Option<usize> {
    n.checked_next_multiple_of(unit)
}
