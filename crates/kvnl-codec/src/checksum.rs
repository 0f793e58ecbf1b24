//! Streaming checksum hook.
//!
//! Writers feed every byte range they hand to the stream, readers every range
//! they accept, so a digest computed on either side covers the same wire bytes.

use std::hash::Hasher;

/// Accepts consecutive byte ranges of a record stream.
pub trait Checksum {
    fn update(&mut self, bytes: &[u8]);
}

impl<F: FnMut(&[u8])> Checksum for F {
    fn update(&mut self, bytes: &[u8]) {
        self(bytes)
    }
}

/// Reborrow an optional checksum for one nested call.
pub(crate) fn reborrow<'a>(
    checksum: &'a mut Option<&mut dyn Checksum>,
) -> Option<&'a mut dyn Checksum> {
    match checksum {
        Some(checksum) => Some(&mut **checksum),
        None => None,
    }
}

/// Ignores all input.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoChecksum;

impl Checksum for NoChecksum {
    fn update(&mut self, _bytes: &[u8]) {}
}

/// Adapts any [`Hasher`] into a [`Checksum`].
#[derive(Debug, Default, Clone)]
pub struct HasherChecksum<H> {
    hasher: H,
    bytes: u64,
}

impl<H: Hasher> HasherChecksum<H> {
    pub fn new(hasher: H) -> Self {
        Self { hasher, bytes: 0 }
    }

    /// Current digest.
    pub fn finish(&self) -> u64 {
        self.hasher.finish()
    }

    /// Total bytes fed so far.
    pub fn bytes(&self) -> u64 {
        self.bytes
    }

    pub fn into_inner(self) -> H {
        self.hasher
    }
}

impl<H: Hasher> Checksum for HasherChecksum<H> {
    fn update(&mut self, bytes: &[u8]) {
        self.hasher.write(bytes);
        self.bytes += bytes.len() as u64;
    }
}
