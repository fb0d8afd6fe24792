use crate::Result;
use core::cmp;

/// Serves the stored bytes as-is: either an uncompressed payload or a
/// compressed one opened in raw mode. Fully random access.
pub(crate) struct Raw {
    pos: u64,
}

impl Raw {
    #[must_use]
    pub(crate) fn new() -> Self {
        Self { pos: 0 }
    }

    pub(crate) fn read(&mut self, input: &[u8], logical_len: u64, buf: &mut [u8]) -> Result<usize> {
        let len = cmp::min(input.len() as u64, logical_len);
        if self.pos >= len {
            return Ok(0);
        }
        let want = usize::try_from(cmp::min(buf.len() as u64, len - self.pos))?;
        let start = usize::try_from(self.pos)?;
        buf[..want].copy_from_slice(&input[start..start + want]);
        self.pos += want as u64;
        Ok(want)
    }

    #[allow(clippy::unnecessary_wraps)]
    pub(crate) fn seek(&mut self, _input: &[u8], _logical_len: u64, target: u64) -> Result<u64> {
        self.pos = target;
        Ok(self.pos)
    }

    #[must_use]
    pub(crate) fn tell(&self) -> u64 {
        self.pos
    }
}
