use crate::{
    drivers::{self, Driver},
    entry::Entry,
    format, Error, Result,
};
use core::cmp;
use std::io::{self, SeekFrom};

bitflags::bitflags! {
    /// Open-mode flags for [`Image::open`](crate::Image::open).
    #[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
    pub struct OpenFlags: u8 {
        /// Serve the stored bytes as-is, bypassing decompression even for
        /// compressed entries. Useful for shipping pre-compressed payloads
        /// (say, an http response body) without a decode/re-encode cycle.
        const RAW = 1 << 0;
    }
}

/// An open file: one entry bound to one decompression driver. The handle is
/// exclusively owned; share it across threads only behind external locking.
/// Dropping it releases the driver state and nothing else.
pub struct File<'image> {
    data: &'image [u8],
    logical_len: u64,
    driver: Driver,
}

impl<'image> File<'image> {
    // truncating casts unpack the codec parameter bytes
    #[allow(clippy::cast_possible_truncation)]
    pub(crate) fn open(entry: &Entry<'image>, flags: OpenFlags) -> Result<Self> {
        let Some(data) = entry.data() else {
            return Err(Error::NotAFile);
        };

        let tag = entry.compression_tag();
        let raw = flags.contains(OpenFlags::RAW) || tag == format::COMPRESSION_NONE;
        let (logical_len, driver) = if raw {
            (data.len() as u64, Driver::Raw(drivers::Raw::new()))
        } else {
            let fields = entry
                .decompressed_fields()
                .ok_or(Error::Malformed("compressed entry without stream fields"))?;
            let driver = match tag {
                #[cfg(feature = "deflate")]
                format::COMPRESSION_DEFLATE => Driver::Deflate(Box::new(drivers::Deflate::new())),
                #[cfg(feature = "heatshrink")]
                format::COMPRESSION_HEATSHRINK => {
                    let params = fields.1;
                    let window_bits = (params & 0xFF) as u8;
                    let lookahead_bits = (params >> 8) as u8;
                    Driver::Heatshrink(Box::new(drivers::Heatshrink::new(
                        window_bits,
                        lookahead_bits,
                    )?))
                }
                _ => return Err(Error::UnsupportedCompression(tag)),
            };
            (u64::from(fields.0), driver)
        };

        Ok(Self {
            data,
            logical_len,
            driver,
        })
    }

    /// Reads up to `buf.len()` bytes of the logical stream. Returns 0 at end
    /// of stream, never an error for a read past it.
    pub fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        self.driver.read(self.data, self.logical_len, buf)
    }

    /// Moves the logical position. Targets beyond the logical size clamp to
    /// it and targets before the start clamp to 0. Seeking backward on a
    /// compression driver restarts its stream, so it is correct but not
    /// cheap.
    pub fn seek(&mut self, pos: SeekFrom) -> Result<u64> {
        let target = match pos {
            SeekFrom::Start(offset) => offset,
            SeekFrom::Current(delta) => self.tell().saturating_add_signed(delta),
            SeekFrom::End(delta) => self.logical_len.saturating_add_signed(delta),
        };
        let target = cmp::min(target, self.logical_len);
        self.driver.seek(self.data, self.logical_len, target)
    }

    /// Current logical position.
    #[must_use]
    pub fn tell(&self) -> u64 {
        self.driver.tell()
    }

    /// Logical length of the stream this handle serves.
    #[must_use]
    pub fn len(&self) -> u64 {
        self.logical_len
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.logical_len == 0
    }

    /// The stored payload exactly as it sits in the image, valid for the
    /// image's lifetime. For compressed entries these are the compressed
    /// bytes regardless of the open mode.
    #[must_use]
    pub fn access(&self) -> &'image [u8] {
        self.data
    }
}

impl<'image> io::Read for File<'image> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        File::read(self, buf).map_err(|err| io::Error::new(io::ErrorKind::Other, err))
    }
}

impl<'image> io::Seek for File<'image> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        File::seek(self, pos).map_err(|err| io::Error::new(io::ErrorKind::Other, err))
    }
}
