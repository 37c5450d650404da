//! Bit writer for producing a byte stream from bits.
//!
//! Bits are packed MSB-first into a 64-bit container and flushed to the
//! output one byte at a time, so the stream reads in plain big-endian order.

pub struct BitWriter {
    output: Vec<u8>,
    /// Pending bits, packed at the MSB side
    bits: u64,
    /// Number of valid bits in `bits`
    count: u32,
}

impl BitWriter {
    pub fn new() -> Self {
        Self::with_capacity(1024)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            output: Vec::with_capacity(capacity),
            bits: 0,
            count: 0,
        }
    }

    /// Write the low `num_bits` bits of `value`.
    ///
    /// For example, write_bits(0b101, 3) writes binary 101. Bits of
    /// `value` above `num_bits` are ignored.
    #[inline]
    pub fn write_bits(&mut self, value: u32, num_bits: u32) {
        debug_assert!(num_bits <= 32);
        if num_bits == 0 {
            return;
        }
        let masked = u64::from(value) & ((1u64 << num_bits) - 1);
        self.bits |= masked << (64 - self.count - num_bits);
        self.count += num_bits;
        self.flush_bytes();
    }

    /// Write `n` zero bits.
    #[inline]
    pub fn write_zeros(&mut self, mut n: u32) {
        while n > 0 {
            let chunk = n.min(32);
            self.write_bits(0, chunk);
            n -= chunk;
        }
    }

    /// Unary code: `n` zeros followed by a one.
    #[inline]
    pub fn write_unary(&mut self, n: u32) {
        self.write_zeros(n);
        self.write_bits(1, 1);
    }

    #[inline]
    fn flush_bytes(&mut self) {
        while self.count >= 8 {
            self.output.push((self.bits >> 56) as u8);
            self.bits <<= 8;
            self.count -= 8;
        }
    }

    /// Finalize the stream, padding the last byte with zeros.
    pub fn finish(mut self) -> Vec<u8> {
        if self.count > 0 {
            self.output.push((self.bits >> 56) as u8);
        }
        self.output
    }

    /// Bytes written so far, including a partially filled last byte.
    pub fn len(&self) -> usize {
        self.output.len() + usize::from(self.count > 0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for BitWriter {
    fn default() -> Self {
        Self::new()
    }
}
