//! Bit reader for consuming bits from a byte stream.
//!
//! Counterpart of [`BitWriter`](super::bit_writer::BitWriter): bits are read
//! MSB-first. Running past the end of the input is an error rather than a
//! stream of implicit zeros.

use crate::{CompressionError, Result};

pub struct BitReader<'a> {
    input: &'a [u8],
    /// Next byte to load
    pos: usize,
    /// Buffered bits, packed at the MSB side
    bits: u64,
    /// Number of valid bits in `bits`
    count: u32,
}

impl<'a> BitReader<'a> {
    pub fn new(input: &'a [u8]) -> Self {
        Self {
            input,
            pos: 0,
            bits: 0,
            count: 0,
        }
    }

    /// Top up the container with whole bytes while they fit.
    #[inline]
    fn refill(&mut self) {
        while self.count <= 56 && self.pos < self.input.len() {
            self.bits |= u64::from(self.input[self.pos]) << (56 - self.count);
            self.pos += 1;
            self.count += 8;
        }
    }

    fn exhausted() -> CompressionError {
        CompressionError::InvalidData("bit stream ended early".to_string())
    }

    /// Read `num_bits` bits as a right-justified value.
    #[inline]
    pub fn read_bits(&mut self, num_bits: u32) -> Result<u32> {
        debug_assert!(num_bits <= 32);
        if num_bits == 0 {
            return Ok(0);
        }
        if self.count < num_bits {
            self.refill();
            if self.count < num_bits {
                return Err(Self::exhausted());
            }
        }
        let value = (self.bits >> (64 - num_bits)) as u32;
        self.bits <<= num_bits;
        self.count -= num_bits;
        Ok(value)
    }

    /// Count zero bits up to and including the next one bit, returning the
    /// number of zeros.
    #[inline]
    pub fn read_unary(&mut self) -> Result<u32> {
        let mut zeros = 0;
        loop {
            if self.count == 0 {
                self.refill();
                if self.count == 0 {
                    return Err(Self::exhausted());
                }
            }
            let leading = self.bits.leading_zeros().min(self.count);
            if leading < self.count {
                zeros += leading;
                // drop the zeros and the terminating one
                self.bits = self.bits.checked_shl(leading + 1).unwrap_or(0);
                self.count -= leading + 1;
                return Ok(zeros);
            }
            zeros += self.count;
            self.bits = 0;
            self.count = 0;
        }
    }

    /// Whole bytes not yet touched by the reader.
    pub fn remaining_bytes(&self) -> usize {
        self.input.len() - self.pos
    }
}
