//! Per-algorithm tuning parameters.
//!
//! Options are plain values. Every tile works on its own clone, which is
//! where the tile's dither seed, extent and resulting scaling end up.
//! Header parameters (ZNAMEn/ZVALn) are derived from the options on demand
//! and applied back to them when reading.

use crate::quant::{Dither, DitherMethod, NullCheck, QuantizeAlgorithm, Quantizer};

/// Value of a ZVALn keyword.
#[derive(Debug, Clone, PartialEq)]
pub enum ParameterValue {
    Int(i64),
    Real(f64),
    Str(String),
}

impl ParameterValue {
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            Self::Real(v) if v.fract() == 0.0 => Some(*v as i64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }
}

/// A named compression parameter as stored in ZNAMEn/ZVALn.
#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    pub name: String,
    pub value: ParameterValue,
}

impl Parameter {
    pub fn new(name: impl Into<String>, value: ParameterValue) -> Self {
        Self {
            name: name.into(),
            value,
        }
    }
}

pub const BLOCKSIZE: &str = "BLOCKSIZE";
pub const BYTEPIX: &str = "BYTEPIX";
pub const ZQUANTIZ: &str = "ZQUANTIZ";

#[derive(Debug, Clone, PartialEq)]
pub struct RiceOption {
    /// Pixels per coding block
    pub block_size: usize,
    /// Bytes per coded pixel; filled in from the tile when compressing
    pub bytepix: Option<usize>,
}

impl Default for RiceOption {
    fn default() -> Self {
        Self {
            block_size: super::rice::DEFAULT_BLOCK_SIZE,
            bytepix: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct QuantizeOption {
    /// Noise fraction per quantization step; negative values give the step
    /// directly
    pub q_level: f32,
    pub quantizer: Quantizer,
    /// First dither seed (ZDITHER0); tile `i` uses `zdither0 + i`
    pub zdither0: i64,
    pub tile_width: usize,
    pub tile_height: usize,
    pub bzero: Option<f64>,
    pub bscale: Option<f64>,
}

impl Default for QuantizeOption {
    fn default() -> Self {
        Self {
            q_level: 4.0,
            quantizer: Quantizer::new(NullCheck::Off, QuantizeAlgorithm::default().dither(1)),
            zdither0: 1,
            tile_width: 0,
            tile_height: 0,
            bzero: None,
            bscale: None,
        }
    }
}

impl QuantizeOption {
    pub fn new(
        algorithm: QuantizeAlgorithm,
        q_level: f32,
        zdither0: i64,
        null_check: NullCheck,
    ) -> Self {
        Self {
            q_level,
            quantizer: Quantizer::new(null_check, algorithm.dither(zdither0)),
            zdither0,
            ..Self::default()
        }
    }

    pub fn algorithm(&self) -> QuantizeAlgorithm {
        match self.quantizer.dither.method() {
            DitherMethod::None => QuantizeAlgorithm::NoDither,
            DitherMethod::Subtractive1 => QuantizeAlgorithm::SubtractiveDither1,
            DitherMethod::Subtractive2 => QuantizeAlgorithm::SubtractiveDither2,
        }
    }

    pub fn set_algorithm(&mut self, algorithm: QuantizeAlgorithm) {
        self.quantizer.dither = algorithm.dither(self.quantizer.dither.seed());
    }
}

/// Tuning parameters of one algorithm in a codec chain.
#[derive(Debug, Clone, PartialEq)]
pub enum CompressOption {
    Quantize(QuantizeOption),
    Rice(RiceOption),
}

impl CompressOption {
    /// Points the option at tile `index` of the given extent. Dithering
    /// restarts at the tile's own seed.
    pub fn prepare_tile(&mut self, index: usize, width: usize, height: usize) {
        if let Self::Quantize(q) = self {
            q.tile_width = width;
            q.tile_height = height;
            let seed = q.zdither0 + index as i64;
            q.quantizer.dither = q.quantizer.dither.with_seed(seed);
        }
    }

    /// Scaling needed to read back a quantized tile.
    pub fn set_scaling(&mut self, zero: Option<f64>, scale: Option<f64>) {
        if let Self::Quantize(q) = self {
            q.bzero = zero;
            q.bscale = scale;
        }
    }

    pub fn zero(&self) -> Option<f64> {
        match self {
            Self::Quantize(q) => q.bzero,
            Self::Rice(_) => None,
        }
    }

    pub fn scale(&self) -> Option<f64> {
        match self {
            Self::Quantize(q) => q.bscale,
            Self::Rice(_) => None,
        }
    }

    /// Parameters written as ZNAMEn/ZVALn.
    pub fn parameters(&self) -> Vec<Parameter> {
        match self {
            Self::Rice(rice) => {
                let mut params = vec![Parameter::new(
                    BLOCKSIZE,
                    ParameterValue::Int(rice.block_size as i64),
                )];
                if let Some(bytepix) = rice.bytepix {
                    params.push(Parameter::new(BYTEPIX, ParameterValue::Int(bytepix as i64)));
                }
                params
            }
            // ZQUANTIZ and ZDITHER0 have keywords of their own
            Self::Quantize(_) => Vec::new(),
        }
    }

    /// Applies the parameters this option understands and ignores the rest.
    /// Returns whether anything was applied.
    pub fn apply_parameters(&mut self, parameters: &[Parameter]) -> bool {
        let mut applied = false;
        for parameter in parameters {
            match self {
                Self::Rice(rice) => match parameter.name.as_str() {
                    BLOCKSIZE => {
                        if let Some(v) = parameter.value.as_int().filter(|&v| v > 0) {
                            rice.block_size = v as usize;
                            applied = true;
                        }
                    }
                    BYTEPIX => {
                        if let Some(v) = parameter.value.as_int().filter(|&v| v > 0) {
                            rice.bytepix = Some(v as usize);
                            applied = true;
                        }
                    }
                    _ => {}
                },
                Self::Quantize(q) => {
                    if parameter.name == ZQUANTIZ {
                        let parsed = parameter.value.as_str().and_then(|s| s.parse().ok());
                        if let Some(algorithm) = parsed {
                            q.set_algorithm(algorithm);
                            applied = true;
                        }
                    }
                }
            }
        }
        applied
    }
}

/// The first zero point and scale any option reports.
pub fn reported_scaling(options: &[CompressOption]) -> (Option<f64>, Option<f64>) {
    let zero = options.iter().find_map(CompressOption::zero);
    let scale = options.iter().find_map(CompressOption::scale);
    (zero, scale)
}

/// Dither of the quantize option, if the chain has one.
pub fn dither_of(options: &[CompressOption]) -> Option<&Dither> {
    options.iter().find_map(|option| match option {
        CompressOption::Quantize(q) => Some(&q.quantizer.dither),
        CompressOption::Rice(_) => None,
    })
}
