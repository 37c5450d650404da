//! GZIP_1 and GZIP_2.
//!
//! Both compress the big-endian pixel bytes of a tile. GZIP_2 first groups
//! the bytes by significance (all most significant bytes, then the next,
//! and so on), which helps when neighbouring pixels share their high bytes.

use std::io::{Read, Write};

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;

use super::{CompressOption, TileCodec};
use crate::image::{ImageData, PrimitiveType};
use crate::{CompressionError, Result};

pub fn gzip(data: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(
        Vec::with_capacity(data.len() / 2 + 32),
        Compression::default(),
    );
    encoder.write_all(data)?;
    Ok(encoder.finish()?)
}

/// Inflates `data`, which must expand to exactly `expected_len` bytes.
pub fn gunzip(data: &[u8], expected_len: usize) -> Result<Vec<u8>> {
    let mut decoder = GzDecoder::new(data);
    let mut out = Vec::with_capacity(expected_len);
    decoder
        .read_to_end(&mut out)
        .map_err(|e| CompressionError::InvalidData(format!("gzip stream: {}", e)))?;
    if out.len() != expected_len {
        return Err(CompressionError::InvalidData(format!(
            "gzip stream holds {} bytes, expected {}",
            out.len(),
            expected_len
        )));
    }
    Ok(out)
}

/// Regroups `size`-byte elements by byte significance.
pub fn shuffle(bytes: &[u8], size: usize) -> Vec<u8> {
    if size <= 1 {
        return bytes.to_vec();
    }
    let n = bytes.len() / size;
    let mut out = vec![0u8; bytes.len()];
    for (i, element) in bytes.chunks_exact(size).enumerate() {
        for (b, &byte) in element.iter().enumerate() {
            out[b * n + i] = byte;
        }
    }
    out
}

pub fn unshuffle(bytes: &[u8], size: usize) -> Vec<u8> {
    if size <= 1 {
        return bytes.to_vec();
    }
    let n = bytes.len() / size;
    let mut out = vec![0u8; bytes.len()];
    for (i, element) in out.chunks_exact_mut(size).enumerate() {
        for (b, byte) in element.iter_mut().enumerate() {
            *byte = bytes[b * n + i];
        }
    }
    out
}

#[derive(Debug, Default, Clone, Copy)]
pub struct GzipCodec {
    shuffle: bool,
}

impl GzipCodec {
    /// GZIP_1
    pub fn new() -> Self {
        Self { shuffle: false }
    }

    /// GZIP_2
    pub fn shuffled() -> Self {
        Self { shuffle: true }
    }
}

impl TileCodec for GzipCodec {
    fn supports(&self, _kind: PrimitiveType) -> bool {
        true
    }

    fn compress(&self, tile: &ImageData, _options: &mut [CompressOption]) -> Option<Vec<u8>> {
        let mut bytes = tile.to_be_bytes();
        if self.shuffle {
            bytes = shuffle(&bytes, tile.primitive_type().size());
        }
        match gzip(&bytes) {
            Ok(out) => Some(out),
            Err(e) => {
                tracing::debug!("gzip declined tile: {}", e);
                None
            }
        }
    }

    fn decompress(
        &self,
        bytes: &[u8],
        _options: &[CompressOption],
        out: &mut ImageData,
    ) -> Result<()> {
        let kind = out.primitive_type();
        let mut raw = gunzip(bytes, out.byte_len())?;
        if self.shuffle {
            raw = unshuffle(&raw, kind.size());
        }
        *out = ImageData::from_be_bytes(kind, &raw)?;
        Ok(())
    }
}
