//! Platform sizes and the reallocation seam used by [`Buf`](crate::Buf).

use std::sync::OnceLock;

use crate::error::{BufError, Result};

/// Page size assumed when the platform cannot report one.
const FALLBACK_PAGE_SIZE: usize = 4096;

/// Native word size in bytes.
pub fn word_size() -> usize {
    std::mem::size_of::<usize>()
}

/// Native page size in bytes, queried once per process.
pub fn page_size() -> usize {
    static PAGE_SIZE: OnceLock<usize> = OnceLock::new();
    *PAGE_SIZE.get_or_init(query_page_size)
}

#[cfg(unix)]
fn query_page_size() -> usize {
    // SAFETY: sysconf has no memory-safety preconditions.
    let size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    if size > 0 {
        size as usize
    } else {
        FALLBACK_PAGE_SIZE
    }
}

#[cfg(windows)]
fn query_page_size() -> usize {
    use windows_sys::Win32::System::SystemInformation::{GetSystemInfo, SYSTEM_INFO};

    // SAFETY: `info` is a valid, writable SYSTEM_INFO for GetSystemInfo to fill.
    let info = unsafe {
        let mut info: SYSTEM_INFO = std::mem::zeroed();
        GetSystemInfo(&mut info);
        info
    };
    match info.dwPageSize as usize {
        0 => FALLBACK_PAGE_SIZE,
        size => size,
    }
}

#[cfg(not(any(unix, windows)))]
fn query_page_size() -> usize {
    FALLBACK_PAGE_SIZE
}

/// Provides the memory behind a buffer.
///
/// `reallocate` returns a region of exactly `new_capacity` bytes whose prefix
/// holds `old[..min(old.len(), new_capacity)]`. On failure the old region must
/// be left as it was.
pub trait Reallocate {
    fn reallocate(&mut self, old: &[u8], new_capacity: usize) -> Result<Box<[u8]>>;
}

/// Allocates from the global allocator, reporting failure instead of aborting.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemAllocator;

impl Reallocate for SystemAllocator {
    fn reallocate(&mut self, old: &[u8], new_capacity: usize) -> Result<Box<[u8]>> {
        let mut region = Vec::new();
        region
            .try_reserve_exact(new_capacity)
            .map_err(|_| BufError::AllocationFailed {
                requested: new_capacity,
            })?;
        let kept = old.len().min(new_capacity);
        region.extend_from_slice(&old[..kept]);
        region.resize(new_capacity, 0);
        Ok(region.into_boxed_slice())
    }
}

impl<F> Reallocate for F
where
    F: FnMut(&[u8], usize) -> Result<Box<[u8]>>,
{
    fn reallocate(&mut self, old: &[u8], new_capacity: usize) -> Result<Box<[u8]>> {
        self(old, new_capacity)
    }
}
