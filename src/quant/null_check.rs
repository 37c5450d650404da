//! Policies deciding which samples carry no data.

use super::NULL_VALUE;

/// How null ("no data") samples are recognized.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum NullCheck {
    /// Every sample is valid.
    #[default]
    Off,
    /// Samples exactly equal to the given value are null.
    Value(f64),
    /// NaN samples are null.
    NaN,
}

impl NullCheck {
    pub fn is_active(&self) -> bool {
        !matches!(self, Self::Off)
    }

    #[inline]
    pub fn is_null(&self, sample: f64) -> bool {
        match *self {
            Self::Off => false,
            Self::Value(null) => sample == null,
            Self::NaN => sample.is_nan(),
        }
    }

    /// Whether a quantized integer is the null sentinel.
    #[inline]
    pub fn is_null_int(&self, value: i32) -> bool {
        self.is_active() && value == NULL_VALUE
    }

    /// The real value written for null samples on the way back.
    pub fn null_value(&self) -> f64 {
        match *self {
            Self::Off => 0.0,
            Self::Value(null) => null,
            Self::NaN => f64::NAN,
        }
    }
}
