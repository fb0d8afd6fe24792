#[cfg(feature = "mmap")]
use memmap2::Mmap;

mod detail {
    pub enum Bytes<'bytes> {
        Borrowed(&'bytes [u8]),
        #[cfg(feature = "mmap")]
        Mapped(super::Mmap),
    }
}

use detail::Bytes::*;

/// Storage for a bound image: either a caller-provided slice or a mapping
/// the binder owns. Dropping the container unmaps an owned mapping.
pub(crate) struct Bytes<'bytes> {
    container: detail::Bytes<'bytes>,
}

impl<'bytes> Bytes<'bytes> {
    pub(crate) fn as_bytes(&self) -> &[u8] {
        match &self.container {
            Borrowed(x) => x,
            #[cfg(feature = "mmap")]
            Mapped(x) => &x[..],
        }
    }

    pub(crate) fn from_borrowed(bytes: &'bytes [u8]) -> Self {
        Self {
            container: Borrowed(bytes),
        }
    }

    #[cfg(feature = "mmap")]
    pub(crate) fn from_mapped(mapping: Mmap) -> Self {
        Self {
            container: Mapped(mapping),
        }
    }
}
