//! Rice coding of pixel differences (RICE_1).
//!
//! The stream starts with the first pixel in full width. The differences
//! between neighbouring pixels are mapped to unsigned values (zigzag) and
//! coded in blocks. Each block starts with a code selecting the number of
//! low bits `fs` sent verbatim; the high part goes out in unary. Two escape
//! codes cover blocks of identical pixels and blocks too noisy to code.
//!
//! Differences wrap at the pixel width, so every block stays lossless
//! whatever the data.

use super::bit_reader::BitReader;
use super::bit_writer::BitWriter;
use super::{CompressOption, RiceOption, TileCodec};
use crate::image::{ImageData, PrimitiveType};
use crate::{CompressionError, Result};

pub const DEFAULT_BLOCK_SIZE: usize = 32;

/// Coded pixel width assumed when a stream declares no BYTEPIX.
pub const DEFAULT_READ_BYTEPIX: usize = 4;

/// Code widths for one pixel size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RiceParams {
    /// Bits of the per-block code
    pub fs_bits: u32,
    /// Largest `fs` coded normally; `fs_max + 1` flags a raw block
    pub fs_max: u32,
    /// Bits per pixel
    pub bits_per_pixel: u32,
}

impl RiceParams {
    pub fn for_bytepix(bytepix: usize) -> Option<Self> {
        match bytepix {
            1 => Some(Self {
                fs_bits: 3,
                fs_max: 6,
                bits_per_pixel: 8,
            }),
            2 => Some(Self {
                fs_bits: 4,
                fs_max: 14,
                bits_per_pixel: 16,
            }),
            4 => Some(Self {
                fs_bits: 5,
                fs_max: 25,
                bits_per_pixel: 32,
            }),
            _ => None,
        }
    }

    #[inline]
    fn mask(&self) -> u32 {
        if self.bits_per_pixel == 32 {
            u32::MAX
        } else {
            (1 << self.bits_per_pixel) - 1
        }
    }
}

#[inline]
fn zigzag(diff: u32, params: &RiceParams) -> u32 {
    // sign-extend from the pixel width
    let shift = 32 - params.bits_per_pixel;
    let signed = ((diff << shift) as i32) >> shift;
    let mapped = if signed < 0 { !(signed << 1) } else { signed << 1 };
    mapped as u32 & params.mask()
}

#[inline]
fn unzigzag(value: u32) -> u32 {
    if value & 1 == 0 {
        value >> 1
    } else {
        !(value >> 1)
    }
}

/// Encodes pixels given as raw bit patterns of `params.bits_per_pixel` bits.
///
/// Gives up with `None` as soon as the stream would grow beyond `max_len`
/// bytes.
pub fn encode(
    pixels: &[u32],
    block_size: usize,
    params: RiceParams,
    max_len: usize,
) -> Option<Vec<u8>> {
    let capacity = pixels.len() * params.bits_per_pixel as usize / 8 + 16;
    let mut writer = BitWriter::with_capacity(capacity);
    let Some(&first) = pixels.first() else {
        return Some(writer.finish());
    };
    let max_bits = (max_len as u64).saturating_mul(8);

    let mask = params.mask();
    writer.write_bits(first, params.bits_per_pixel);
    let mut last = first;

    let mut diffs = Vec::with_capacity(block_size);
    for block in pixels.chunks(block_size) {
        diffs.clear();
        let mut pixel_sum = 0.0_f64;
        for &next in block {
            let diff = zigzag(next.wrapping_sub(last) & mask, &params);
            diffs.push(diff);
            pixel_sum += f64::from(diff);
            last = next;
        }

        let n = block.len();
        let mut dp_sum = (pixel_sum - (n / 2) as f64 - 1.0) / n as f64;
        if dp_sum < 0.0 {
            dp_sum = 0.0;
        }
        let p_sum = (dp_sum as u32) >> 1;
        let fs = 32 - p_sum.leading_zeros();

        if fs >= params.fs_max {
            // high entropy: raw differences
            writer.write_bits(params.fs_max + 1, params.fs_bits);
            for &diff in &diffs {
                writer.write_bits(diff, params.bits_per_pixel);
            }
        } else if fs == 0 && pixel_sum == 0.0 {
            // all pixels equal
            writer.write_bits(0, params.fs_bits);
        } else {
            let block_bits: u64 = diffs
                .iter()
                .map(|&diff| u64::from(diff >> fs) + 1 + u64::from(fs))
                .sum();
            if writer.len() as u64 * 8 + u64::from(params.fs_bits) + block_bits > max_bits {
                return None;
            }
            writer.write_bits(fs + 1, params.fs_bits);
            for &diff in &diffs {
                writer.write_unary(diff >> fs);
                writer.write_bits(diff, fs);
            }
        }
        if writer.len() > max_len {
            return None;
        }
    }

    let bytes = writer.finish();
    (bytes.len() <= max_len).then_some(bytes)
}

/// Decodes `count` pixels, returned as raw bit patterns.
pub fn decode(
    input: &[u8],
    count: usize,
    block_size: usize,
    params: RiceParams,
) -> Result<Vec<u32>> {
    let mut out = Vec::with_capacity(count);
    if count == 0 {
        return Ok(out);
    }
    if block_size == 0 {
        return Err(CompressionError::InvalidArgument(
            "Rice block size must be positive".to_string(),
        ));
    }

    let mask = params.mask();
    let mut reader = BitReader::new(input);
    let mut last = reader.read_bits(params.bits_per_pixel)?;

    while out.len() < count {
        let block = block_size.min(count - out.len());
        let code = reader.read_bits(params.fs_bits)?;

        if code == 0 {
            out.extend(std::iter::repeat(last).take(block));
            continue;
        }

        let fs = code - 1;
        if fs == params.fs_max {
            for _ in 0..block {
                let diff = reader.read_bits(params.bits_per_pixel)?;
                last = last.wrapping_add(unzigzag(diff)) & mask;
                out.push(last);
            }
        } else if fs < params.fs_max {
            for _ in 0..block {
                let top = reader.read_unary()?;
                if fs > 0 && top >> (32 - fs) != 0 {
                    return Err(CompressionError::InvalidData(format!(
                        "Rice difference of {} high bits does not fit",
                        top
                    )));
                }
                let low = reader.read_bits(fs)?;
                let diff = (top << fs) | low;
                last = last.wrapping_add(unzigzag(diff)) & mask;
                out.push(last);
            }
        } else {
            return Err(CompressionError::InvalidData(format!("invalid Rice block code {}", code)));
        }
    }

    Ok(out)
}

/// RICE_1 for 8, 16 and 32-bit integer tiles.
#[derive(Debug, Default, Clone, Copy)]
pub struct RiceCodec;

fn rice_option(options: &[CompressOption]) -> RiceOption {
    options
        .iter()
        .find_map(|option| match option {
            CompressOption::Rice(rice) => Some(rice.clone()),
            _ => None,
        })
        .unwrap_or_default()
}

impl TileCodec for RiceCodec {
    fn supports(&self, kind: PrimitiveType) -> bool {
        matches!(kind, PrimitiveType::U8 | PrimitiveType::I16 | PrimitiveType::I32)
    }

    fn compress(&self, tile: &ImageData, options: &mut [CompressOption]) -> Option<Vec<u8>> {
        let (pixels, bytepix): (Vec<u32>, usize) = match tile {
            ImageData::U8(v) => (v.iter().map(|&p| u32::from(p)).collect(), 1),
            ImageData::I16(v) => (v.iter().map(|&p| u32::from(p as u16)).collect(), 2),
            ImageData::I32(v) => (v.iter().map(|&p| p as u32).collect(), 4),
            _ => return None,
        };
        let params = RiceParams::for_bytepix(bytepix)?;
        let raw_len = tile.byte_len();

        let mut block_size = DEFAULT_BLOCK_SIZE;
        for option in options.iter_mut() {
            if let CompressOption::Rice(rice) = option {
                rice.bytepix = Some(bytepix);
                block_size = rice.block_size;
            }
        }
        if block_size == 0 {
            return None;
        }

        encode(&pixels, block_size, params, raw_len)
    }

    fn decompress(
        &self,
        bytes: &[u8],
        options: &[CompressOption],
        out: &mut ImageData,
    ) -> Result<()> {
        if !self.supports(out.primitive_type()) {
            return Err(CompressionError::UnsupportedAlgorithm(format!(
                "RICE_1 for {:?} pixels",
                out.primitive_type()
            )));
        }
        let rice = rice_option(options);
        // the coded width comes from BYTEPIX alone, not from the pixel kind
        let bytepix = rice.bytepix.unwrap_or(DEFAULT_READ_BYTEPIX);
        let params = RiceParams::for_bytepix(bytepix).ok_or_else(|| {
            CompressionError::InvalidData(format!("BYTEPIX {} is not 1, 2 or 4", bytepix))
        })?;

        let pixels = decode(bytes, out.len(), rice.block_size, params)?;
        let value = |raw: u32| -> i64 {
            match bytepix {
                1 => i64::from(raw as u8),
                2 => i64::from(raw as u16 as i16),
                _ => i64::from(raw as i32),
            }
        };
        match out {
            ImageData::U8(v) => v
                .iter_mut()
                .zip(&pixels)
                .for_each(|(d, &p)| *d = value(p) as u8),
            ImageData::I16(v) => v
                .iter_mut()
                .zip(&pixels)
                .for_each(|(d, &p)| *d = value(p) as i16),
            ImageData::I32(v) => v
                .iter_mut()
                .zip(&pixels)
                .for_each(|(d, &p)| *d = value(p) as i32),
            other => {
                return Err(CompressionError::UnsupportedAlgorithm(format!(
                    "RICE_1 for {:?} pixels",
                    other.primitive_type()
                )))
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(bytepix: usize) -> RiceParams {
        RiceParams::for_bytepix(bytepix).unwrap()
    }

    #[test]
    fn test_constant_block() {
        let bytes = encode(&[5, 5, 5, 5], 32, params(4), usize::MAX).unwrap();
        assert_eq!(bytes, vec![0, 0, 0, 5, 0]);
    }

    #[test]
    fn test_small_ramp_i16() {
        let bytes = encode(&[1, 2, 3, 4], 32, params(2), usize::MAX).unwrap();
        assert_eq!(bytes, vec![0x00, 0x01, 0x19, 0x24]);
    }

    #[test]
    fn test_decode_known_streams() {
        assert_eq!(decode(&[0, 0, 0, 5, 0], 4, 32, params(4)).unwrap(), vec![5, 5, 5, 5]);
        assert_eq!(decode(&[0x00, 0x01, 0x19, 0x24], 4, 32, params(2)).unwrap(), vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_zigzag_wraps_at_width() {
        let p = params(1);
        // 0 -> 255 is a step of -1 in 8 bits
        assert_eq!(zigzag(255u32.wrapping_sub(0) & 0xFF, &p), 1);
        assert_eq!(zigzag(1, &p), 2);
        assert_eq!((0u32.wrapping_add(unzigzag(1))) & 0xFF, 255);
    }

    #[test]
    fn test_noisy_block_round_trip() {
        // alternating extremes force the raw escape
        let pixels: Vec<u32> = (0..100).map(|i| if i % 2 == 0 { 0 } else { 0x8000_0000 }).collect();
        let bytes = encode(&pixels, 32, params(4), usize::MAX).unwrap();
        assert_eq!(decode(&bytes, pixels.len(), 32, params(4)).unwrap(), pixels);
    }

    #[test]
    fn test_codec_round_trip_u8() {
        let tile = ImageData::U8((0..200).map(|i| ((i * 7) % 256) as u8).collect());
        let mut options = vec![CompressOption::Rice(RiceOption::default())];
        let bytes = RiceCodec.compress(&tile, &mut options).unwrap();
        assert_eq!(
            options[0],
            CompressOption::Rice(RiceOption {
                block_size: 32,
                bytepix: Some(1)
            })
        );

        let mut out = ImageData::zeroed(PrimitiveType::U8, 200);
        RiceCodec.decompress(&bytes, &options, &mut out).unwrap();
        assert_eq!(out, tile);
    }

    #[test]
    fn test_codec_round_trip_i16_small_blocks() {
        let tile = ImageData::I16((0..77).map(|i| (i * i - 3000) as i16).collect());
        let mut options = vec![CompressOption::Rice(RiceOption { block_size: 16, bytepix: None })];
        let bytes = RiceCodec.compress(&tile, &mut options).unwrap();
        let mut out = ImageData::zeroed(PrimitiveType::I16, 77);
        RiceCodec.decompress(&bytes, &options, &mut out).unwrap();
        assert_eq!(out, tile);
    }

    #[test]
    fn test_declines_unsupported_types() {
        let mut options = Vec::new();
        assert!(RiceCodec.compress(&ImageData::I64(vec![1, 2]), &mut options).is_none());
        assert!(RiceCodec.compress(&ImageData::F32(vec![1.0, 2.0]), &mut options).is_none());
        assert!(!RiceCodec.supports(PrimitiveType::F64));
    }

    #[test]
    fn test_gives_up_beyond_limit() {
        let pixels: Vec<u32> = (0..64).collect();
        assert!(encode(&pixels, 32, params(4), 4).is_none());
        assert!(encode(&pixels, 32, params(4), 64 * 4).is_some());
    }

    #[test]
    fn test_truncated_stream() {
        let bytes = encode(&(0..64).collect::<Vec<u32>>(), 32, params(4), usize::MAX).unwrap();
        assert!(decode(&bytes[..bytes.len() - 3], 64, 32, params(4)).is_err());
    }

    #[test]
    fn test_reads_declared_width_into_narrower_pixels() {
        let values: [i16; 6] = [-300, -2, 0, 5, 1200, i16::MIN];
        let raw: Vec<u32> = values.iter().map(|&v| i32::from(v) as u32).collect();
        let bytes = encode(&raw, 32, params(4), usize::MAX).unwrap();
        let expected = ImageData::I16(values.to_vec());

        let declared = vec![CompressOption::Rice(RiceOption {
            block_size: 32,
            bytepix: Some(4),
        })];
        let mut out = ImageData::zeroed(PrimitiveType::I16, values.len());
        RiceCodec.decompress(&bytes, &declared, &mut out).unwrap();
        assert_eq!(out, expected);

        // no BYTEPIX at all reads 4-byte codes
        let mut out = ImageData::zeroed(PrimitiveType::I16, values.len());
        RiceCodec.decompress(&bytes, &[], &mut out).unwrap();
        assert_eq!(out, expected);
    }

    #[test]
    fn test_invalid_bytepix() {
        let options = vec![CompressOption::Rice(RiceOption {
            block_size: 32,
            bytepix: Some(3),
        })];
        let mut out = ImageData::zeroed(PrimitiveType::I16, 4);
        assert!(matches!(
            RiceCodec.decompress(&[0, 0, 0, 0], &options, &mut out),
            Err(CompressionError::InvalidData(_))
        ));
    }
}
