//! Quantization of floating-point samples into scaled 32-bit integers.
//!
//! The step size comes from an estimate of the background noise so that the
//! quantization error stays well below it. Noise estimates, zero points and
//! dither sequences follow CFITSIO bit for bit, so tiles written here
//! dequantize identically in other FITS readers.

use std::fmt;
use std::str::FromStr;

use crate::{CompressionError, Result};

pub mod dither;
pub mod noise;
pub mod null_check;

pub use dither::{Dither, DitherMethod};
pub use null_check::NullCheck;

/// Integer written for null samples.
pub const NULL_VALUE: i32 = -2_147_483_647;
/// Integer written for exact zeros under subtractive dither variant 2.
pub const ZERO_VALUE: i32 = -2_147_483_646;
/// Integers starting at [`NULL_VALUE`] that never hold a real sample.
pub const N_RESERVED_VALUES: i32 = 10;

const MAX_INT: f64 = 2_147_483_647.0;

/// Quantization methods as named by the ZQUANTIZ keyword.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum QuantizeAlgorithm {
    NoDither,
    #[default]
    SubtractiveDither1,
    SubtractiveDither2,
}

impl QuantizeAlgorithm {
    pub fn name(self) -> &'static str {
        match self {
            Self::NoDither => "NO_DITHER",
            Self::SubtractiveDither1 => "SUBTRACTIVE_DITHER_1",
            Self::SubtractiveDither2 => "SUBTRACTIVE_DITHER_2",
        }
    }

    /// Dither strategy for this method, starting at `seed`.
    pub fn dither(self, seed: i64) -> Dither {
        match self {
            Self::NoDither => Dither::none(),
            Self::SubtractiveDither1 => Dither::subtractive_1(seed),
            Self::SubtractiveDither2 => Dither::subtractive_2(seed),
        }
    }
}

impl fmt::Display for QuantizeAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for QuantizeAlgorithm {
    type Err = CompressionError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "NO_DITHER" | "NONE" => Ok(Self::NoDither),
            "SUBTRACTIVE_DITHER_1" => Ok(Self::SubtractiveDither1),
            "SUBTRACTIVE_DITHER_2" => Ok(Self::SubtractiveDither2),
            other => Err(CompressionError::InvalidKeyword {
                key: "ZQUANTIZ".to_string(),
                value: other.to_string(),
            }),
        }
    }
}

/// Scaling and statistics of one quantized tile.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QuantizationState {
    /// Step between adjacent integers in sample units (BSCALE).
    pub scale: f64,
    /// Sample value of integer zero (BZERO).
    pub zero: f64,
    pub int_min: i32,
    pub int_max: i32,
    pub noise2: f64,
    pub noise3: f64,
    pub noise5: f64,
}

/// Integers produced by [`Quantizer::quantize`].
#[derive(Debug, Clone, PartialEq)]
pub struct Quantized {
    pub int_data: Vec<i32>,
    pub state: QuantizationState,
}

/// Round half away from zero, truncating into an `i32`.
#[inline]
pub fn nint(x: f64) -> i32 {
    if x >= 0.0 {
        (x + 0.5) as i32
    } else {
        (x - 0.5) as i32
    }
}

/// A null policy and a dithering strategy.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Quantizer {
    pub null_check: NullCheck,
    pub dither: Dither,
}

impl Quantizer {
    pub fn new(null_check: NullCheck, dither: Dither) -> Self {
        Self { null_check, dither }
    }

    /// Quantizes an `nx` x `ny` block of samples.
    ///
    /// A positive `q_level` sets the step to the noise estimate divided by
    /// `q_level` (zero means 4); a negative one is the step itself. Returns
    /// `None` when the data cannot be represented: a single pixel, zero
    /// noise, or a range too wide for 32-bit integers.
    pub fn quantize(
        &mut self,
        samples: &[f64],
        nx: usize,
        ny: usize,
        q_level: f32,
    ) -> Option<Quantized> {
        let n = nx * ny;
        if n <= 1 || samples.len() < n {
            return None;
        }
        let samples = &samples[..n];
        let q_level = f64::from(q_level);

        let (delta, ngood, min, max, noise2, noise3, noise5);
        if q_level >= 0.0 {
            let estimate = noise::noise5(samples, nx, ny, self.null_check);
            ngood = estimate.ngood;
            noise2 = estimate.noise2;
            noise3 = estimate.noise3;
            noise5 = estimate.noise5;

            let stdev;
            if self.null_check.is_active() && ngood == 0 {
                // all null: any scaling will do
                min = 0.0;
                max = 1.0;
                stdev = 1.0;
            } else {
                min = estimate.min;
                max = estimate.max;
                let mut s = noise3;
                if noise2 != 0.0 && noise2 < s {
                    s = noise2;
                }
                if noise5 != 0.0 && noise5 < s {
                    s = noise5;
                }
                stdev = s;
            }

            delta = if q_level == 0.0 { stdev / 4.0 } else { stdev / q_level };
            if delta == 0.0 {
                return None;
            }
        } else {
            delta = -q_level;
            let range = noise::range3(samples, nx, ny, self.null_check);
            ngood = range.ngood;
            min = range.min;
            max = range.max;
            noise2 = 0.0;
            noise3 = 0.0;
            noise5 = 0.0;
        }

        if (max - min) / delta > 2.0 * MAX_INT - f64::from(N_RESERVED_VALUES) {
            return None;
        }

        let reserved_zero = min - delta * f64::from(NULL_VALUE + N_RESERVED_VALUES);
        let zero = if ngood == n {
            if self.dither.center_on_zero() {
                reserved_zero
            } else if (max - min) / delta < MAX_INT - f64::from(N_RESERVED_VALUES) {
                ((min / delta + 0.5) as i64) as f64 * delta
            } else {
                (min + max) / 2.0
            }
        } else {
            reserved_zero
        };

        self.dither.reset();
        let mut int_data = Vec::with_capacity(n);
        for &sample in samples {
            let value = if self.null_check.is_null(sample) {
                NULL_VALUE
            } else if self.dither.is_active() {
                if self.dither.is_zero_value(sample) {
                    ZERO_VALUE
                } else {
                    let r = f64::from(self.dither.next_random());
                    nint((sample - zero) / delta + r - 0.5)
                }
            } else {
                nint((sample - zero) / delta)
            };
            int_data.push(value);
            self.dither.increment_random();
        }

        Some(Quantized {
            int_data,
            state: QuantizationState {
                scale: delta,
                zero,
                int_min: nint((min - zero) / delta),
                int_max: nint((max - zero) / delta),
                noise2,
                noise3,
                noise5,
            },
        })
    }

    /// Maps integers back to samples. The dither sequence restarts from its
    /// seed, so the same offsets are subtracted that were added.
    pub fn unquantize(&self, ints: &[i32], scale: f64, zero: f64) -> Vec<f64> {
        let null_value = self.null_check.null_value();
        let mut dither = self.dither.clone();
        dither.reset();

        let mut out = Vec::with_capacity(ints.len());
        for &value in ints {
            let sample = if self.null_check.is_null_int(value) {
                null_value
            } else if dither.is_active() {
                if dither.is_zero_int(value) {
                    0.0
                } else {
                    let r = f64::from(dither.next_random());
                    (f64::from(value) - r + 0.5) * scale + zero
                }
            } else {
                f64::from(value) * scale + zero
            };
            out.push(sample);
            dither.increment_random();
        }
        out
    }
}
