use crate::{Error, Result};
use core::cmp;

/// Streaming LZSS decoder for heatshrink-packed payloads.
///
/// The bit stream is MSB-first. Each token is a tag bit: `1` is followed by
/// an 8-bit literal; `0` by a backreference of `window_bits` bits of
/// distance minus one and `lookahead_bits` bits of count minus one. The
/// decoder owns a `2^window_bits` byte window; everything else is read in
/// place from the image. Like the other compression drivers it is
/// forward-only, so backward seeks restart from the beginning of the
/// payload.
pub(crate) struct Heatshrink {
    window: Vec<u8>,
    window_bits: u8,
    lookahead_bits: u8,
    head: usize,
    in_pos: usize,
    current: u8,
    bit_mask: u8,
    out_pos: u64,
    pending: Option<Backref>,
    ended: bool,
}

struct Backref {
    distance: usize,
    remaining: u16,
}

const MIN_WINDOW_BITS: u8 = 4;
const MAX_WINDOW_BITS: u8 = 15;
const MIN_LOOKAHEAD_BITS: u8 = 3;

impl Heatshrink {
    pub(crate) fn new(window_bits: u8, lookahead_bits: u8) -> Result<Self> {
        if !(MIN_WINDOW_BITS..=MAX_WINDOW_BITS).contains(&window_bits) {
            return Err(Error::DriverOpen("heatshrink window bits out of range"));
        }
        if lookahead_bits < MIN_LOOKAHEAD_BITS || lookahead_bits >= window_bits {
            return Err(Error::DriverOpen("heatshrink lookahead bits out of range"));
        }

        Ok(Self {
            window: vec![0; 1usize << window_bits],
            window_bits,
            lookahead_bits,
            head: 0,
            in_pos: 0,
            current: 0,
            bit_mask: 0,
            out_pos: 0,
            pending: None,
            ended: false,
        })
    }

    // a literal token is always eight bits, the cast cannot lose any
    #[allow(clippy::cast_possible_truncation)]
    pub(crate) fn read(&mut self, input: &[u8], logical_len: u64, buf: &mut [u8]) -> Result<usize> {
        let mut total = 0usize;
        while total < buf.len() && self.out_pos < logical_len && !self.ended {
            // drain a backreference that outlived the previous buffer
            if let Some(mut backref) = self.pending.take() {
                while backref.remaining > 0 && total < buf.len() && self.out_pos < logical_len {
                    let mask = self.window.len() - 1;
                    let byte = self.window[self.head.wrapping_sub(backref.distance) & mask];
                    self.emit(byte, buf, &mut total);
                    backref.remaining -= 1;
                }
                if backref.remaining > 0 {
                    self.pending = Some(backref);
                }
                continue;
            }

            let Some(tag) = self.take_bits(input, 1) else {
                self.finish_short(logical_len);
                break;
            };
            if tag == 1 {
                let Some(literal) = self.take_bits(input, 8) else {
                    self.finish_short(logical_len);
                    break;
                };
                self.emit(literal as u8, buf, &mut total);
            } else {
                let Some(distance) = self.take_bits(input, self.window_bits) else {
                    self.finish_short(logical_len);
                    break;
                };
                let Some(count) = self.take_bits(input, self.lookahead_bits) else {
                    self.finish_short(logical_len);
                    break;
                };
                self.pending = Some(Backref {
                    distance: distance as usize + 1,
                    remaining: count + 1,
                });
            }
        }
        Ok(total)
    }

    pub(crate) fn seek(&mut self, input: &[u8], logical_len: u64, target: u64) -> Result<u64> {
        if target < self.out_pos {
            self.reset();
        }
        let mut scratch = [0u8; 0x200];
        while self.out_pos < target {
            let want = usize::try_from(cmp::min(scratch.len() as u64, target - self.out_pos))?;
            let read = self.read(input, logical_len, &mut scratch[..want])?;
            if read == 0 {
                break;
            }
        }
        Ok(self.out_pos)
    }

    #[must_use]
    pub(crate) fn tell(&self) -> u64 {
        self.out_pos
    }

    fn emit(&mut self, byte: u8, buf: &mut [u8], total: &mut usize) {
        buf[*total] = byte;
        *total += 1;
        let mask = self.window.len() - 1;
        self.window[self.head & mask] = byte;
        self.head = self.head.wrapping_add(1);
        self.out_pos += 1;
    }

    /// Pulls `count` bits MSB-first, or `None` once the stored payload has
    /// no more whole bits to give.
    fn take_bits(&mut self, input: &[u8], count: u8) -> Option<u16> {
        let mut acc = 0u16;
        for _ in 0..count {
            if self.bit_mask == 0 {
                self.current = *input.get(self.in_pos)?;
                self.in_pos += 1;
                self.bit_mask = 0x80;
            }
            acc <<= 1;
            if self.current & self.bit_mask != 0 {
                acc |= 1;
            }
            self.bit_mask >>= 1;
        }
        Some(acc)
    }

    fn finish_short(&mut self, logical_len: u64) {
        self.ended = true;
        if self.out_pos < logical_len {
            log::warn!(
                "heatshrink input exhausted {} bytes short of its logical size",
                logical_len - self.out_pos
            );
        }
    }

    fn reset(&mut self) {
        self.window.fill(0);
        self.head = 0;
        self.in_pos = 0;
        self.current = 0;
        self.bit_mask = 0;
        self.out_pos = 0;
        self.pending = None;
        self.ended = false;
    }
}
