//! Pixel types and in-memory images.
//!
//! Pixels are kept in native order. Whenever bytes are needed (gzip,
//! stored tiles, the Rice first pixel) they are big-endian, which is the
//! byte order of the file format.

use crate::{CompressionError, Result};

/// Pixel kinds, identified in headers by their BITPIX value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrimitiveType {
    U8,
    I16,
    I32,
    I64,
    F32,
    F64,
}

impl PrimitiveType {
    pub fn from_bitpix(bitpix: i64) -> Result<Self> {
        match bitpix {
            8 => Ok(Self::U8),
            16 => Ok(Self::I16),
            32 => Ok(Self::I32),
            64 => Ok(Self::I64),
            -32 => Ok(Self::F32),
            -64 => Ok(Self::F64),
            other => Err(CompressionError::InvalidKeyword {
                key: "ZBITPIX".to_string(),
                value: other.to_string(),
            }),
        }
    }

    pub fn bitpix(self) -> i64 {
        match self {
            Self::U8 => 8,
            Self::I16 => 16,
            Self::I32 => 32,
            Self::I64 => 64,
            Self::F32 => -32,
            Self::F64 => -64,
        }
    }

    /// Size of one pixel in bytes.
    pub fn size(self) -> usize {
        match self {
            Self::U8 => 1,
            Self::I16 => 2,
            Self::I32 | Self::F32 => 4,
            Self::I64 | Self::F64 => 8,
        }
    }

    pub fn is_floating_point(self) -> bool {
        matches!(self, Self::F32 | Self::F64)
    }
}

/// Row-major pixel storage, one variant per pixel kind.
#[derive(Debug, Clone, PartialEq)]
pub enum ImageData {
    U8(Vec<u8>),
    I16(Vec<i16>),
    I32(Vec<i32>),
    I64(Vec<i64>),
    F32(Vec<f32>),
    F64(Vec<f64>),
}

/// Runs `$body` with `$v` bound to the inner vector of whichever variant
/// `$data` holds.
macro_rules! with_pixels {
    ($data:expr, $v:ident => $body:expr) => {
        match $data {
            ImageData::U8($v) => $body,
            ImageData::I16($v) => $body,
            ImageData::I32($v) => $body,
            ImageData::I64($v) => $body,
            ImageData::F32($v) => $body,
            ImageData::F64($v) => $body,
        }
    };
}

/// Builds a vector of `$ty` from big-endian chunks of `$bytes`.
macro_rules! decode_be {
    ($bytes:expr, $ty:ty) => {
        $bytes
            .chunks_exact(std::mem::size_of::<$ty>())
            .map(|chunk| {
                let mut raw = [0u8; std::mem::size_of::<$ty>()];
                raw.copy_from_slice(chunk);
                <$ty>::from_be_bytes(raw)
            })
            .collect()
    };
}

impl ImageData {
    /// A zero-filled buffer of `len` pixels.
    pub fn zeroed(kind: PrimitiveType, len: usize) -> Self {
        match kind {
            PrimitiveType::U8 => Self::U8(vec![0; len]),
            PrimitiveType::I16 => Self::I16(vec![0; len]),
            PrimitiveType::I32 => Self::I32(vec![0; len]),
            PrimitiveType::I64 => Self::I64(vec![0; len]),
            PrimitiveType::F32 => Self::F32(vec![0.0; len]),
            PrimitiveType::F64 => Self::F64(vec![0.0; len]),
        }
    }

    pub fn primitive_type(&self) -> PrimitiveType {
        match self {
            Self::U8(_) => PrimitiveType::U8,
            Self::I16(_) => PrimitiveType::I16,
            Self::I32(_) => PrimitiveType::I32,
            Self::I64(_) => PrimitiveType::I64,
            Self::F32(_) => PrimitiveType::F32,
            Self::F64(_) => PrimitiveType::F64,
        }
    }

    pub fn len(&self) -> usize {
        with_pixels!(self, v => v.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Size of the pixels in bytes once serialized.
    pub fn byte_len(&self) -> usize {
        self.len() * self.primitive_type().size()
    }

    /// Serializes every pixel in big-endian order.
    pub fn to_be_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.byte_len());
        with_pixels!(self, v => {
            for pixel in v {
                out.extend_from_slice(&pixel.to_be_bytes());
            }
        });
        out
    }

    /// Parses big-endian pixels. `bytes` must hold a whole number of pixels.
    pub fn from_be_bytes(kind: PrimitiveType, bytes: &[u8]) -> Result<Self> {
        if bytes.len() % kind.size() != 0 {
            return Err(CompressionError::InvalidData(format!(
                "{} bytes is not a whole number of {:?} pixels",
                bytes.len(),
                kind
            )));
        }
        Ok(match kind {
            PrimitiveType::U8 => Self::U8(bytes.to_vec()),
            PrimitiveType::I16 => Self::I16(decode_be!(bytes, i16)),
            PrimitiveType::I32 => Self::I32(decode_be!(bytes, i32)),
            PrimitiveType::I64 => Self::I64(decode_be!(bytes, i64)),
            PrimitiveType::F32 => Self::F32(decode_be!(bytes, f32)),
            PrimitiveType::F64 => Self::F64(decode_be!(bytes, f64)),
        })
    }

    /// Widens every pixel to `f64`.
    pub fn to_f64_vec(&self) -> Vec<f64> {
        match self {
            Self::U8(v) => v.iter().map(|&p| f64::from(p)).collect(),
            Self::I16(v) => v.iter().map(|&p| f64::from(p)).collect(),
            Self::I32(v) => v.iter().map(|&p| f64::from(p)).collect(),
            Self::I64(v) => v.iter().map(|&p| p as f64).collect(),
            Self::F32(v) => v.iter().map(|&p| f64::from(p)).collect(),
            Self::F64(v) => v.clone(),
        }
    }

    /// Copies the `width` x `height` rectangle whose first pixel sits at
    /// `offset` out of an image that is `stride` pixels wide.
    pub fn gather(&self, stride: usize, offset: usize, width: usize, height: usize) -> Self {
        fn rect<T: Copy>(src: &[T], stride: usize, offset: usize, w: usize, h: usize) -> Vec<T> {
            let mut out = Vec::with_capacity(w * h);
            for row in 0..h {
                let start = offset + row * stride;
                out.extend_from_slice(&src[start..start + w]);
            }
            out
        }

        match self {
            Self::U8(v) => Self::U8(rect(v, stride, offset, width, height)),
            Self::I16(v) => Self::I16(rect(v, stride, offset, width, height)),
            Self::I32(v) => Self::I32(rect(v, stride, offset, width, height)),
            Self::I64(v) => Self::I64(rect(v, stride, offset, width, height)),
            Self::F32(v) => Self::F32(rect(v, stride, offset, width, height)),
            Self::F64(v) => Self::F64(rect(v, stride, offset, width, height)),
        }
    }

    /// Writes a rectangle produced by [`ImageData::gather`] back into place.
    pub fn scatter(
        &mut self,
        stride: usize,
        offset: usize,
        width: usize,
        tile: &Self,
    ) -> Result<()> {
        fn rect<T: Copy>(dst: &mut [T], stride: usize, offset: usize, w: usize, src: &[T]) {
            for (row, line) in src.chunks_exact(w).enumerate() {
                let start = offset + row * stride;
                dst[start..start + w].copy_from_slice(line);
            }
        }

        match (self, tile) {
            (Self::U8(d), Self::U8(s)) => rect(d, stride, offset, width, s),
            (Self::I16(d), Self::I16(s)) => rect(d, stride, offset, width, s),
            (Self::I32(d), Self::I32(s)) => rect(d, stride, offset, width, s),
            (Self::I64(d), Self::I64(s)) => rect(d, stride, offset, width, s),
            (Self::F32(d), Self::F32(s)) => rect(d, stride, offset, width, s),
            (Self::F64(d), Self::F64(s)) => rect(d, stride, offset, width, s),
            (dst, src) => {
                return Err(CompressionError::InvalidArgument(format!(
                    "cannot place {:?} pixels into a {:?} image",
                    src.primitive_type(),
                    dst.primitive_type()
                )))
            }
        }
        Ok(())
    }
}

/// A two-dimensional image.
#[derive(Debug, Clone, PartialEq)]
pub struct Image {
    width: usize,
    height: usize,
    data: ImageData,
}

impl Image {
    pub fn new(width: usize, height: usize, data: ImageData) -> Result<Self> {
        if width == 0 || height == 0 || data.len() != width * height {
            return Err(CompressionError::ImageDimensions { width, height });
        }
        Ok(Self { width, height, data })
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn primitive_type(&self) -> PrimitiveType {
        self.data.primitive_type()
    }

    pub fn data(&self) -> &ImageData {
        &self.data
    }

    pub fn into_data(self) -> ImageData {
        self.data
    }
}
