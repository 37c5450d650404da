//! Lossy front end for floating-point tiles.
//!
//! Samples are quantized to 32-bit integers and handed to an integer codec;
//! reading reverses both steps. Integer tiles pass straight through.

use std::sync::Arc;

use super::{CompressOption, QuantizeOption, TileCodec};
use crate::image::{ImageData, PrimitiveType};
use crate::{CompressionError, Result};

pub struct QuantizeCodec {
    inner: Arc<dyn TileCodec>,
}

impl QuantizeCodec {
    pub fn new(inner: Arc<dyn TileCodec>) -> Self {
        Self { inner }
    }
}

fn quantize_option(options: &mut [CompressOption]) -> Option<&mut QuantizeOption> {
    options.iter_mut().find_map(|option| match option {
        CompressOption::Quantize(q) => Some(q),
        CompressOption::Rice(_) => None,
    })
}

impl TileCodec for QuantizeCodec {
    fn supports(&self, kind: PrimitiveType) -> bool {
        kind.is_floating_point() || self.inner.supports(kind)
    }

    fn compress(&self, tile: &ImageData, options: &mut [CompressOption]) -> Option<Vec<u8>> {
        if !tile.primitive_type().is_floating_point() {
            return self.inner.compress(tile, options);
        }

        let ints = {
            let q = quantize_option(options)?;
            let (nx, ny) = if q.tile_width * q.tile_height == tile.len() {
                (q.tile_width, q.tile_height)
            } else {
                (tile.len(), 1)
            };
            let quantized = q.quantizer.quantize(&tile.to_f64_vec(), nx, ny, q.q_level)?;
            q.bzero = Some(quantized.state.zero);
            q.bscale = Some(quantized.state.scale);
            quantized.int_data
        };

        self.inner.compress(&ImageData::I32(ints), options)
    }

    fn decompress(
        &self,
        bytes: &[u8],
        options: &[CompressOption],
        out: &mut ImageData,
    ) -> Result<()> {
        if !out.primitive_type().is_floating_point() {
            return self.inner.decompress(bytes, options, out);
        }

        let mut ints = ImageData::zeroed(PrimitiveType::I32, out.len());
        self.inner.decompress(bytes, options, &mut ints)?;
        let ImageData::I32(ints) = ints else {
            return Err(CompressionError::InvalidData(
                "quantized tile did not decode to integers".to_string(),
            ));
        };

        let q = options
            .iter()
            .find_map(|option| match option {
                CompressOption::Quantize(q) => Some(q),
                CompressOption::Rice(_) => None,
            })
            .ok_or_else(|| {
                CompressionError::InvalidArgument(
                    "quantized tile without quantize option".to_string(),
                )
            })?;
        let (Some(zero), Some(scale)) = (q.bzero, q.bscale) else {
            return Err(CompressionError::InvalidData(
                "quantized tile without ZZERO/ZSCALE".to_string(),
            ));
        };

        let samples = q.quantizer.unquantize(&ints, scale, zero);
        match out {
            ImageData::F32(v) => v.iter_mut().zip(&samples).for_each(|(d, &s)| *d = s as f32),
            ImageData::F64(v) => *v = samples,
            _ => {}
        }
        Ok(())
    }
}
