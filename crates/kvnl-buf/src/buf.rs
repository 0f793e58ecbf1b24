use std::fmt;

use tracing::{debug, trace, warn};

use crate::alloc::{Reallocate, SystemAllocator};
use crate::config::BufConfig;
use crate::error::{BufError, Result};

/// A growable byte buffer with an explicit allocation policy.
///
/// The buffer owns one contiguous region. Its logical size changes only
/// through [`Buf::resize`], which reallocates when the request exceeds the
/// capacity or falls to the shrink boundary, and otherwise just moves the
/// size inside the current capacity window.
///
/// ```
/// use kvnl_buf::Buf;
///
/// let mut buf = Buf::new();
/// buf.append(b"data").unwrap();
/// assert_eq!(buf.as_slice(), b"data");
/// assert!(buf.capacity() >= 4);
/// buf.release().unwrap();
/// assert!(buf.is_empty_state());
/// ```
pub struct Buf {
    state: State,
    config: BufConfig,
}

enum State {
    /// No allocation. The default state, and a valid one.
    Empty,
    /// Owns `region`; `region.len()` is the capacity.
    Allocated { region: Box<[u8]>, size: usize },
    /// Left behind by a rejected construction. Never resized or released.
    Invalid,
}

impl Default for Buf {
    fn default() -> Self {
        Self::new()
    }
}

impl Buf {
    /// Empty buffer with the default configuration.
    pub fn new() -> Self {
        Self {
            state: State::Empty,
            config: BufConfig::default(),
        }
    }

    /// Empty buffer whose capacity always tracks its size exactly.
    pub fn exact() -> Self {
        Self {
            state: State::Empty,
            config: BufConfig::exact(),
        }
    }

    /// Empty buffer with a validated configuration.
    pub fn try_with_config(config: BufConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            state: State::Empty,
            config,
        })
    }

    /// Empty buffer with `config`, or the invalid sentinel if `config` is rejected.
    pub fn with_config(config: BufConfig) -> Self {
        match Self::try_with_config(config) {
            Ok(buf) => buf,
            Err(err) => {
                warn!(?config, error = %err, "rejected buffer configuration");
                Self::invalid(config)
            }
        }
    }

    pub fn dynamic(shrink_threshold: f32, growth_factor: f32) -> Self {
        Self::with_config(BufConfig::dynamic(shrink_threshold, growth_factor))
    }

    pub fn grow_only(growth_factor: f32) -> Self {
        Self::with_config(BufConfig::grow_only(growth_factor))
    }

    fn invalid(config: BufConfig) -> Self {
        Self {
            state: State::Invalid,
            config,
        }
    }

    /// Logical size in bytes.
    pub fn len(&self) -> usize {
        match &self.state {
            State::Allocated { size, .. } => *size,
            State::Empty | State::Invalid => 0,
        }
    }

    /// True when the logical size is zero (allocated or not).
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Allocated bytes; zero exactly when nothing is allocated.
    pub fn capacity(&self) -> usize {
        match &self.state {
            State::Allocated { region, .. } => region.len(),
            State::Empty | State::Invalid => 0,
        }
    }

    pub fn config(&self) -> &BufConfig {
        &self.config
    }

    /// True for the unallocated default state.
    pub fn is_empty_state(&self) -> bool {
        matches!(self.state, State::Empty)
    }

    pub fn is_invalid(&self) -> bool {
        matches!(self.state, State::Invalid)
    }

    /// True for buffers that may be resized.
    pub fn is_valid(&self) -> bool {
        !self.is_invalid()
    }

    /// The logical contents.
    pub fn as_slice(&self) -> &[u8] {
        match &self.state {
            State::Allocated { region, size } => &region[..*size],
            State::Empty | State::Invalid => &[],
        }
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        match &mut self.state {
            State::Allocated { region, size } => &mut region[..*size],
            State::Empty | State::Invalid => &mut [],
        }
    }

    /// View over the logical contents; alias of [`Buf::as_slice`].
    pub fn view(&self) -> &[u8] {
        self.as_slice()
    }

    /// Address of the region, null when nothing is allocated.
    pub fn as_ptr(&self) -> *const u8 {
        match &self.state {
            State::Allocated { region, .. } => region.as_ptr(),
            State::Empty | State::Invalid => std::ptr::null(),
        }
    }

    /// Resize using the global allocator.
    pub fn resize(&mut self, size: usize) -> Result<()> {
        self.resize_with(size, &mut SystemAllocator)
    }

    /// Set the logical size to `size`, reallocating through `allocator` if needed.
    ///
    /// Bytes up to the smaller of the old and new capacity are preserved. On
    /// failure the buffer is left untouched.
    pub fn resize_with<A: Reallocate + ?Sized>(
        &mut self,
        size: usize,
        allocator: &mut A,
    ) -> Result<()> {
        let capacity = match &mut self.state {
            State::Invalid => return Err(BufError::InvalidState),
            State::Empty => 0,
            State::Allocated {
                region,
                size: current,
            } => {
                let capacity = region.len();
                if size <= capacity && size > self.config.shrink_boundary(capacity) {
                    *current = size;
                    return Ok(());
                }
                capacity
            }
        };

        let new_capacity = self
            .config
            .capacity_for(size)
            .ok_or(BufError::AllocationFailed { requested: size })?;
        let old: &[u8] = match &self.state {
            State::Allocated { region, .. } => region,
            State::Empty | State::Invalid => &[],
        };
        let region = allocator.reallocate(old, new_capacity)?;
        debug_assert_eq!(region.len(), new_capacity);
        debug!(
            size,
            old_capacity = capacity,
            new_capacity,
            policy = %self.config.policy,
            "reallocated buffer"
        );
        self.state = State::Allocated { region, size };
        Ok(())
    }

    /// Free the region and return to the empty state.
    ///
    /// Releasing an empty or invalid buffer is a usage error.
    pub fn release(&mut self) -> Result<()> {
        match self.state {
            State::Empty => Err(BufError::AlreadyEmpty),
            State::Invalid => Err(BufError::InvalidState),
            State::Allocated { .. } => {
                trace!(capacity = self.capacity(), "releasing buffer");
                self.state = State::Empty;
                Ok(())
            }
        }
    }

    /// Grow by `bytes.len()` and copy `bytes` into the new tail.
    pub fn append(&mut self, bytes: &[u8]) -> Result<()> {
        let start = self.len();
        let size = start
            .checked_add(bytes.len())
            .ok_or(BufError::AllocationFailed { requested: usize::MAX })?;
        self.resize(size)?;
        crate::view::copy(&mut self.as_mut_slice()[start..], bytes)
    }

    /// Replace the contents with formatted text; returns its length.
    ///
    /// Formats into the current capacity first. If the text does not fit, the
    /// buffer is resized to exactly the required length and formatted again.
    pub fn format_into(&mut self, args: fmt::Arguments<'_>) -> Result<usize> {
        if self.is_invalid() {
            return Err(BufError::InvalidState);
        }
        let required = self.format_in_place(args);
        if required <= self.capacity() {
            self.resize(required)?;
        } else {
            self.resize(required)?;
            let written = self.format_in_place(args);
            debug_assert_eq!(written, required);
        }
        Ok(required)
    }

    fn format_in_place(&mut self, args: fmt::Arguments<'_>) -> usize {
        let region: &mut [u8] = match &mut self.state {
            State::Allocated { region, .. } => region,
            State::Empty | State::Invalid => &mut [],
        };
        let mut sink = RegionWriter {
            region,
            required: 0,
        };
        // RegionWriter never fails, so the only error source is a Display impl.
        let _ = fmt::write(&mut sink, args);
        sink.required
    }

    /// Compare region address, size and capacity.
    pub fn loosely_equals(&self, other: &Buf) -> bool {
        std::ptr::eq(self, other)
            || (self.as_ptr() == other.as_ptr()
                && self.len() == other.len()
                && self.capacity() == other.capacity()
                && self.is_invalid() == other.is_invalid())
    }

    /// Like [`Buf::loosely_equals`], also comparing the configuration.
    pub fn exactly_equals(&self, other: &Buf) -> bool {
        self.loosely_equals(other) && self.config == other.config
    }
}

/// Appends formatted text, so `write!(buf, ..)` grows the buffer.
impl fmt::Write for Buf {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.append(s.as_bytes()).map_err(|_| fmt::Error)
    }
}

/// Writes as much as fits into a region while counting the full length.
struct RegionWriter<'a> {
    region: &'a mut [u8],
    required: usize,
}

impl fmt::Write for RegionWriter<'_> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        let bytes = s.as_bytes();
        let start = self.required.min(self.region.len());
        let end = (self.required + bytes.len()).min(self.region.len());
        self.region[start..end].copy_from_slice(&bytes[..end - start]);
        self.required += bytes.len();
        Ok(())
    }
}

impl fmt::Display for Buf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let policy = if self.is_invalid() {
            "INVALID"
        } else {
            self.config.policy.as_str()
        };
        write!(
            f,
            "{{ {:p}: {}/{} ; {:.2}-{:.1}:{} }}",
            self.as_ptr(),
            self.len(),
            self.capacity(),
            self.config.shrink_threshold,
            self.config.growth_factor,
            policy
        )
    }
}

impl fmt::Debug for Buf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match self.state {
            State::Empty => "empty",
            State::Allocated { .. } => "allocated",
            State::Invalid => "invalid",
        };
        f.debug_struct("Buf")
            .field("state", &state)
            .field("size", &self.len())
            .field("capacity", &self.capacity())
            .field("config", &self.config)
            .finish()
    }
}
