//! Per-algorithm streaming state held by an open file handle. Drivers read
//! straight out of the image; the only memory they own is decoder state.

#[cfg(feature = "deflate")]
mod deflate;
#[cfg(feature = "heatshrink")]
mod heatshrink;
mod raw;

#[cfg(feature = "deflate")]
pub(crate) use deflate::Deflate;
#[cfg(feature = "heatshrink")]
pub(crate) use heatshrink::Heatshrink;
pub(crate) use raw::Raw;

use crate::Result;

pub(crate) enum Driver {
    Raw(Raw),
    #[cfg(feature = "deflate")]
    Deflate(Box<Deflate>),
    #[cfg(feature = "heatshrink")]
    Heatshrink(Box<Heatshrink>),
}

impl Driver {
    /// Decodes up to `buf.len()` bytes at the current logical position.
    /// Returns 0 at (or past) end of stream.
    pub(crate) fn read(&mut self, input: &[u8], logical_len: u64, buf: &mut [u8]) -> Result<usize> {
        match self {
            Self::Raw(driver) => driver.read(input, logical_len, buf),
            #[cfg(feature = "deflate")]
            Self::Deflate(driver) => driver.read(input, logical_len, buf),
            #[cfg(feature = "heatshrink")]
            Self::Heatshrink(driver) => driver.read(input, logical_len, buf),
        }
    }

    /// Moves the logical position to `target`, which the handle has already
    /// clamped to `[0, logical_len]`. Compression drivers reach backward
    /// targets by restarting the stream and re-decoding.
    pub(crate) fn seek(&mut self, input: &[u8], logical_len: u64, target: u64) -> Result<u64> {
        match self {
            Self::Raw(driver) => driver.seek(input, logical_len, target),
            #[cfg(feature = "deflate")]
            Self::Deflate(driver) => driver.seek(input, logical_len, target),
            #[cfg(feature = "heatshrink")]
            Self::Heatshrink(driver) => driver.seek(input, logical_len, target),
        }
    }

    pub(crate) fn tell(&self) -> u64 {
        match self {
            Self::Raw(driver) => driver.tell(),
            #[cfg(feature = "deflate")]
            Self::Deflate(driver) => driver.tell(),
            #[cfg(feature = "heatshrink")]
            Self::Heatshrink(driver) => driver.tell(),
        }
    }
}
