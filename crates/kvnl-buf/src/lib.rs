//! Growable byte buffer with an explicit, hysteresis-controlled allocation policy.
//!
//! This is the lowest layer of kvnl. Every codec call borrows a [`Buf`] as
//! scratch storage, so its capacity management decides how often a stream of
//! records touches the allocator:
//! - growth reallocates to `growth_factor × size`, rounded to a word or page;
//! - shrinking waits until the size drops to `shrink_threshold × capacity`;
//! - anything in between only moves the logical size.
//!
//! Byte views are plain `&[u8]` slices; [`view`] holds the leaf helpers.

pub mod alloc;
pub mod buf;
pub mod config;
pub mod error;
pub mod view;

pub use alloc::{page_size, word_size, Reallocate, SystemAllocator};
pub use buf::Buf;
pub use config::{AllocPolicy, BufConfig, DEFAULT_GROWTH_FACTOR, DEFAULT_SHRINK_THRESHOLD};
pub use error::{BufError, Result};
