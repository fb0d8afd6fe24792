use crate::{Error, Result};
use core::cmp;
use flate2::{Decompress, FlushDecompress, Status};

/// Streaming inflate over a stored payload. The stream is forward-only, so
/// backward seeks restart the inflate state and re-decode from the start of
/// the payload; forward seeks discard decoded bytes through a scratch
/// buffer. The entry's decompressed length is the end-of-stream sentinel.
pub(crate) struct Deflate {
    state: Decompress,
    in_pos: usize,
    out_pos: u64,
    ended: bool,
}

impl Deflate {
    #[must_use]
    pub(crate) fn new() -> Self {
        Self {
            // payloads are raw deflate, no zlib wrapper
            state: Decompress::new(false),
            in_pos: 0,
            out_pos: 0,
            ended: false,
        }
    }

    pub(crate) fn read(&mut self, input: &[u8], logical_len: u64, buf: &mut [u8]) -> Result<usize> {
        let mut total = 0usize;
        while total < buf.len() && self.out_pos < logical_len && !self.ended {
            let want = usize::try_from(cmp::min(
                (buf.len() - total) as u64,
                logical_len - self.out_pos,
            ))?;

            let before_in = self.state.total_in();
            let before_out = self.state.total_out();
            let status = self
                .state
                .decompress(
                    &input[self.in_pos..],
                    &mut buf[total..total + want],
                    FlushDecompress::None,
                )
                .map_err(|_| Error::CorruptStream)?;
            let consumed = usize::try_from(self.state.total_in() - before_in)?;
            let produced = usize::try_from(self.state.total_out() - before_out)?;
            self.in_pos += consumed;
            self.out_pos += produced as u64;
            total += produced;

            match status {
                Status::StreamEnd => {
                    self.ended = true;
                    if self.out_pos < logical_len {
                        log::warn!(
                            "deflate stream ended {} bytes short of its logical size",
                            logical_len - self.out_pos
                        );
                    }
                }
                Status::Ok | Status::BufError => {
                    if produced == 0 && consumed == 0 {
                        // no forward progress possible: the stored stream ran
                        // dry before reaching the logical size
                        self.ended = true;
                        log::warn!(
                            "deflate input exhausted {} bytes short of its logical size",
                            logical_len - self.out_pos
                        );
                    }
                }
            }
        }
        Ok(total)
    }

    pub(crate) fn seek(&mut self, input: &[u8], logical_len: u64, target: u64) -> Result<u64> {
        if target < self.out_pos {
            self.reset();
        }
        self.skip_to(input, logical_len, target)?;
        Ok(self.out_pos)
    }

    #[must_use]
    pub(crate) fn tell(&self) -> u64 {
        self.out_pos
    }

    fn reset(&mut self) {
        self.state.reset(false);
        self.in_pos = 0;
        self.out_pos = 0;
        self.ended = false;
    }

    fn skip_to(&mut self, input: &[u8], logical_len: u64, target: u64) -> Result<()> {
        let mut scratch = [0u8; 0x200];
        while self.out_pos < target {
            let want = usize::try_from(cmp::min(scratch.len() as u64, target - self.out_pos))?;
            let read = self.read(input, logical_len, &mut scratch[..want])?;
            if read == 0 {
                break;
            }
        }
        Ok(())
    }
}
