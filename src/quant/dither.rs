//! Subtractive dithering.
//!
//! The random offsets come from a fixed table of 10000 single-precision
//! values generated by the Park-Miller minimal standard generator. Both the
//! table and the way an index walks through it are part of the file
//! format: a reader has to regenerate exactly the offsets the writer used.

use std::sync::OnceLock;

/// Number of entries in the random table.
pub const N_RANDOM: usize = 10_000;

static RANDOM_TABLE: OnceLock<Vec<f32>> = OnceLock::new();

/// The shared table of uniform random values in [0, 1).
pub fn random_table() -> &'static [f32] {
    RANDOM_TABLE.get_or_init(|| {
        let a = 16807.0_f64;
        let m = 2147483647.0_f64;
        let mut seed = 1.0_f64;
        let mut table = Vec::with_capacity(N_RANDOM);
        for _ in 0..N_RANDOM {
            let temp = a * seed;
            seed = temp - m * f64::from((temp / m) as i32);
            table.push((seed / m) as f32);
        }
        debug_assert_eq!(seed as i32, 1_043_618_065);
        table
    })
}

/// Dithering variants of the ZQUANTIZ keyword.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DitherMethod {
    /// Plain rounding.
    None,
    /// Random offsets on every sample.
    Subtractive1,
    /// Random offsets, except exact zeros which keep a reserved integer.
    Subtractive2,
}

/// A dithering strategy plus its position in the random sequence.
///
/// The position moves by one for every quantized sample. Cloning copies the
/// position, so a clone continues exactly where the original stood.
#[derive(Debug, Clone, PartialEq)]
pub struct Dither {
    method: DitherMethod,
    seed: i64,
    iseed: usize,
    next: usize,
}

impl Dither {
    /// No dithering: samples are rounded to the nearest integer.
    pub fn none() -> Self {
        Self::new(DitherMethod::None, 0)
    }

    pub fn subtractive_1(seed: i64) -> Self {
        Self::new(DitherMethod::Subtractive1, seed)
    }

    /// Dither variant 2. A seed of 0 keeps the variant's zero point but
    /// disables the random offsets.
    pub fn subtractive_2(seed: i64) -> Self {
        Self::new(DitherMethod::Subtractive2, seed)
    }

    pub fn new(method: DitherMethod, seed: i64) -> Self {
        let mut dither = Self {
            method,
            seed,
            iseed: 0,
            next: 0,
        };
        dither.reset();
        dither
    }

    pub fn method(&self) -> DitherMethod {
        self.method
    }

    pub fn seed(&self) -> i64 {
        self.seed
    }

    /// Same strategy, restarted at another seed.
    pub fn with_seed(&self, seed: i64) -> Self {
        Self::new(self.method, seed)
    }

    /// Rewinds the sequence to the start position of the current seed.
    pub fn reset(&mut self) {
        if self.is_active() {
            self.iseed = ((self.seed - 1) % N_RANDOM as i64) as usize;
            self.next = start_index(self.iseed);
        } else {
            self.iseed = 0;
            self.next = 0;
        }
    }

    /// Whether random offsets are applied.
    pub fn is_active(&self) -> bool {
        self.method != DitherMethod::None && self.seed > 0
    }

    /// Whether the zero point is placed next to the reserved integers
    /// rather than at the data minimum.
    pub fn center_on_zero(&self) -> bool {
        self.method == DitherMethod::Subtractive2
    }

    /// Whether `sample` is kept as the reserved zero integer.
    #[inline]
    pub fn is_zero_value(&self, sample: f64) -> bool {
        self.method == DitherMethod::Subtractive2 && sample == 0.0
    }

    #[inline]
    pub fn is_zero_int(&self, value: i32) -> bool {
        self.method == DitherMethod::Subtractive2 && value == super::ZERO_VALUE
    }

    #[inline]
    pub fn next_random(&self) -> f32 {
        if self.is_active() {
            random_table()[self.next]
        } else {
            0.0
        }
    }

    #[inline]
    pub fn increment_random(&mut self) {
        if !self.is_active() {
            return;
        }
        self.next += 1;
        if self.next == N_RANDOM {
            self.iseed += 1;
            if self.iseed == N_RANDOM {
                self.iseed = 0;
            }
            self.next = start_index(self.iseed);
        }
    }
}

impl Default for Dither {
    fn default() -> Self {
        Self::none()
    }
}

#[inline]
fn start_index(iseed: usize) -> usize {
    // single precision product
    (random_table()[iseed] * 500.0_f32) as usize
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_random_table() {
        let table = random_table();
        assert_eq!(table.len(), N_RANDOM);
        assert_eq!(table[0], (16807.0_f64 / 2147483647.0) as f32);
        assert!(table.iter().all(|&r| (0.0..1.0).contains(&r)));
    }

    #[test]
    fn test_no_dither() {
        let mut dither = Dither::none();
        assert!(!dither.center_on_zero());
        assert!(!dither.is_active());
        assert!(!dither.is_zero_value(0.0));
        assert!(!dither.is_zero_int(0));
        assert_eq!(dither.next_random(), 0.0);
        dither.increment_random();
        assert_eq!(dither.next_random(), 0.0);
    }

    #[test]
    fn test_seed_start_position() {
        let dither = Dither::subtractive_1(3942);
        let table = random_table();
        let start = (table[3941] * 500.0_f32) as usize;
        assert_eq!(dither.next_random(), table[start]);
    }

    #[test]
    fn test_clone_keeps_position() {
        let mut dither = Dither::subtractive_1(17);
        for _ in 0..25 {
            dither.increment_random();
        }
        let mut copy = dither.clone();
        for _ in 0..100 {
            assert_eq!(dither.next_random(), copy.next_random());
            dither.increment_random();
            copy.increment_random();
        }
    }

    #[test]
    fn test_reset_restarts_sequence() {
        let mut dither = Dither::subtractive_2(5);
        let first = dither.next_random();
        dither.increment_random();
        dither.increment_random();
        dither.reset();
        assert_eq!(dither.next_random(), first);
    }

    #[test]
    fn test_wraps_to_next_seed() {
        let mut dither = Dither::subtractive_1(1);
        let start = dither.next;
        for _ in start..N_RANDOM {
            dither.increment_random();
        }
        assert_eq!(dither.iseed, 1);
        assert_eq!(dither.next, start_index(1));
    }

    #[test]
    fn test_variant_2_without_seed_centres_only() {
        let dither = Dither::subtractive_2(0);
        assert!(dither.center_on_zero());
        assert!(!dither.is_active());
        assert_eq!(dither.next_random(), 0.0);
    }
}
