//! Tile codecs and the registry that picks one by algorithm name.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::image::{ImageData, PrimitiveType};
use crate::quant::QuantizeAlgorithm;
use crate::{CompressionError, Result};

pub mod bit_reader;
pub mod bit_writer;
pub mod gzip;
pub mod options;
pub mod quantize;
pub mod rice;

pub use gzip::GzipCodec;
pub use options::{CompressOption, Parameter, ParameterValue, QuantizeOption, RiceOption};
pub use quantize::QuantizeCodec;
pub use rice::RiceCodec;

/// Compresses and decompresses single tiles.
///
/// `compress` returns `None` when the codec declines the tile; the caller
/// then falls back to another tier. Options are the tile's own copy and
/// may be updated with what the codec needs to read the tile back (the
/// quantization scaling, the Rice pixel width).
pub trait TileCodec: Send + Sync {
    fn supports(&self, kind: PrimitiveType) -> bool;

    fn compress(&self, tile: &ImageData, options: &mut [CompressOption]) -> Option<Vec<u8>>;

    /// Decodes into `out`, which already has the tile's pixel kind and
    /// length.
    fn decompress(
        &self,
        bytes: &[u8],
        options: &[CompressOption],
        out: &mut ImageData,
    ) -> Result<()>;
}

/// Values of the ZCMPTYPE keyword.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Algorithm {
    Rice1,
    Gzip1,
    Gzip2,
    Hcompress1,
    Plio1,
    NoCompress,
}

impl Algorithm {
    pub fn name(self) -> &'static str {
        match self {
            Self::Rice1 => "RICE_1",
            Self::Gzip1 => "GZIP_1",
            Self::Gzip2 => "GZIP_2",
            Self::Hcompress1 => "HCOMPRESS_1",
            Self::Plio1 => "PLIO_1",
            Self::NoCompress => "NOCOMPRESS",
        }
    }

    /// Options a codec chain for this algorithm reads.
    pub fn default_options(self) -> Vec<CompressOption> {
        match self {
            Self::Rice1 => vec![CompressOption::Rice(RiceOption::default())],
            _ => Vec::new(),
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Algorithm {
    type Err = CompressionError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "RICE_1" | "RICE_ONE" => Ok(Self::Rice1),
            "GZIP_1" => Ok(Self::Gzip1),
            "GZIP_2" => Ok(Self::Gzip2),
            "HCOMPRESS_1" => Ok(Self::Hcompress1),
            "PLIO_1" => Ok(Self::Plio1),
            "NOCOMPRESS" => Ok(Self::NoCompress),
            other => Err(CompressionError::UnsupportedAlgorithm(other.to_string())),
        }
    }
}

/// The codec for `algorithm` on tiles of `base_type`.
///
/// Floating-point images with a quantize algorithm get the integer codec
/// wrapped in a [`QuantizeCodec`].
pub fn find_codec(
    algorithm: Algorithm,
    quantize: Option<QuantizeAlgorithm>,
    base_type: PrimitiveType,
) -> Result<Arc<dyn TileCodec>> {
    let codec: Arc<dyn TileCodec> = match algorithm {
        Algorithm::Rice1 => Arc::new(RiceCodec),
        Algorithm::Gzip1 => Arc::new(GzipCodec::new()),
        Algorithm::Gzip2 => Arc::new(GzipCodec::shuffled()),
        Algorithm::Hcompress1 | Algorithm::Plio1 | Algorithm::NoCompress => {
            return Err(CompressionError::UnsupportedAlgorithm(algorithm.name().to_string()))
        }
    };

    if base_type.is_floating_point() && quantize.is_some() {
        Ok(Arc::new(QuantizeCodec::new(codec)))
    } else {
        Ok(codec)
    }
}
