//! A single tile: its place in the image, how it was stored, and the
//! completion handle its worker reports through.

use parking_lot::{Condvar, Mutex, MutexGuard};

use crate::codec::options::reported_scaling;
use crate::codec::{gzip, CompressOption, TileCodec};
use crate::image::{ImageData, PrimitiveType};
use crate::{CompressionError, Result};

/// Tier a tile ended up in, which is also the table column holding it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TileCompressionType {
    /// Primary codec (COMPRESSED_DATA)
    Compressed,
    /// Gzip of the raw pixels (GZIP_COMPRESSED_DATA)
    GzipCompressed,
    /// Raw big-endian pixels (UNCOMPRESSED_DATA)
    Uncompressed,
}

/// One rectangular region of the image.
#[derive(Debug, Clone, PartialEq)]
pub struct Tile {
    /// Row-major position among all tiles
    pub index: usize,
    pub x: usize,
    pub y: usize,
    /// Offset of the first pixel in the flattened image
    pub data_offset: usize,
    pub width: usize,
    pub height: usize,
    pub compression_type: Option<TileCompressionType>,
    pub zero: Option<f64>,
    pub scale: Option<f64>,
    /// Byte range inside the compressed stream
    pub byte_offset: usize,
    pub byte_len: usize,
}

impl Tile {
    pub fn new(
        index: usize,
        x: usize,
        y: usize,
        width: usize,
        height: usize,
        image_width: usize,
    ) -> Self {
        Self {
            index,
            x,
            y,
            data_offset: y * image_width + x,
            width,
            height,
            compression_type: None,
            zero: None,
            scale: None,
            byte_offset: 0,
            byte_len: 0,
        }
    }

    pub fn pixel_count(&self) -> usize {
        self.width * self.height
    }

    pub fn uncompressed_size(&self, kind: PrimitiveType) -> usize {
        self.pixel_count() * kind.size()
    }

    /// Options for this tile: seeded with its index, sized to its extent.
    fn tile_options(&self, options: &[CompressOption]) -> Vec<CompressOption> {
        let mut options = options.to_vec();
        for option in &mut options {
            option.prepare_tile(self.index, self.width, self.height);
        }
        options
    }

    /// Compresses the tile's pixels, falling back from the primary codec to
    /// gzip and then to raw storage. Sets the tier and, for the primary
    /// tier, the scaling the codec reported.
    pub fn compress(
        &mut self,
        data: &ImageData,
        codec: &dyn TileCodec,
        options: &[CompressOption],
    ) -> Vec<u8> {
        let raw_len = data.byte_len();

        let mut options = self.tile_options(options);
        if let Some(bytes) = codec.compress(data, &mut options).filter(|b| b.len() <= raw_len) {
            let (zero, scale) = reported_scaling(&options);
            self.zero = zero;
            self.scale = scale;
            self.compression_type = Some(TileCompressionType::Compressed);
            return bytes;
        }
        tracing::debug!(tile = self.index, "primary codec declined, trying gzip");

        let raw = data.to_be_bytes();
        match gzip::gzip(&raw) {
            Ok(bytes) if bytes.len() <= raw_len => {
                self.compression_type = Some(TileCompressionType::GzipCompressed);
                return bytes;
            }
            Ok(_) => {}
            Err(e) => tracing::debug!(tile = self.index, "gzip failed: {}", e),
        }
        tracing::debug!(tile = self.index, "storing uncompressed");

        self.compression_type = Some(TileCompressionType::Uncompressed);
        raw
    }

    /// Decodes the tile from its bytes according to its tier.
    pub fn decompress(
        &self,
        bytes: &[u8],
        kind: PrimitiveType,
        codec: &dyn TileCodec,
        options: &[CompressOption],
    ) -> Result<ImageData> {
        let mut out = ImageData::zeroed(kind, self.pixel_count());
        match self.compression_type {
            Some(TileCompressionType::Compressed) => {
                let mut options = self.tile_options(options);
                for option in &mut options {
                    option.set_scaling(self.zero, self.scale);
                }
                codec.decompress(bytes, &options, &mut out)?;
            }
            Some(TileCompressionType::GzipCompressed) => {
                let raw = gzip::gunzip(bytes, self.uncompressed_size(kind))?;
                out = ImageData::from_be_bytes(kind, &raw)?;
            }
            Some(TileCompressionType::Uncompressed) => {
                if bytes.len() != self.uncompressed_size(kind) {
                    return Err(CompressionError::CorruptTile {
                        index: self.index,
                        reason: format!(
                            "{} stored bytes for {} pixels of {:?}",
                            bytes.len(),
                            self.pixel_count(),
                            kind
                        ),
                    });
                }
                out = ImageData::from_be_bytes(kind, bytes)?;
            }
            None => {
                tracing::error!(tile = self.index, "tile has no compressed data");
                return Err(CompressionError::CorruptTile {
                    index: self.index,
                    reason: "no compression type".to_string(),
                });
            }
        }
        Ok(out)
    }
}

enum Slot<T> {
    Pending,
    Ready(T),
    Failed(Option<CompressionError>),
}

/// One-shot completion cell a tile worker reports through.
pub struct TileHandle<T> {
    index: usize,
    slot: Mutex<Slot<T>>,
    ready: Condvar,
}

impl<T> TileHandle<T> {
    pub fn new(index: usize) -> Self {
        Self {
            index,
            slot: Mutex::new(Slot::Pending),
            ready: Condvar::new(),
        }
    }

    pub fn complete(&self, result: Result<T>) {
        let mut slot = self.slot.lock();
        *slot = match result {
            Ok(value) => Slot::Ready(value),
            Err(e) => Slot::Failed(Some(e)),
        };
        self.ready.notify_all();
    }

    #[cfg(test)]
    fn is_done(&self) -> bool {
        !matches!(*self.slot.lock(), Slot::Pending)
    }

    fn wait(&self) -> MutexGuard<'_, Slot<T>> {
        let mut slot = self.slot.lock();
        while matches!(*slot, Slot::Pending) {
            self.ready.wait(&mut slot);
        }
        slot
    }

    /// Blocks until the worker is done and runs `f` on its value. `None`
    /// if the worker failed.
    pub fn with_value<R>(&self, f: impl FnOnce(&mut T) -> R) -> Option<R> {
        match &mut *self.wait() {
            Slot::Ready(value) => Some(f(value)),
            _ => None,
        }
    }

    /// Blocks until the worker is done. A failure is reported once, wrapped
    /// in [`CompressionError::TileFailed`] unless the tile itself is corrupt.
    pub fn wait_for_result<R>(&self, f: impl FnOnce(&mut T) -> R) -> Result<R> {
        let index = self.index;
        match &mut *self.wait() {
            Slot::Ready(value) => Ok(f(value)),
            Slot::Failed(error) => match error.take() {
                Some(e @ CompressionError::CorruptTile { .. }) => Err(e),
                Some(e) => Err(CompressionError::TileFailed {
                    index,
                    source: Box::new(e),
                }),
                None => Err(CompressionError::TileFailed {
                    index,
                    source: Box::new(CompressionError::InvalidArgument(
                        "failure already collected".to_string(),
                    )),
                }),
            },
            Slot::Pending => Err(CompressionError::TileFailed {
                index,
                source: Box::new(CompressionError::InvalidArgument(
                    "tile never completed".to_string(),
                )),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    use super::*;
    use crate::codec::{GzipCodec, RiceCodec};

    /// Declines every tile.
    struct Refuse;

    impl TileCodec for Refuse {
        fn supports(&self, _kind: PrimitiveType) -> bool {
            true
        }

        fn compress(&self, _tile: &ImageData, _options: &mut [CompressOption]) -> Option<Vec<u8>> {
            None
        }

        fn decompress(
            &self,
            _bytes: &[u8],
            _options: &[CompressOption],
            _out: &mut ImageData,
        ) -> Result<()> {
            Err(CompressionError::InvalidData("refused".to_string()))
        }
    }

    fn tile(width: usize, height: usize) -> Tile {
        Tile::new(0, 0, 0, width, height, width)
    }

    #[test]
    fn test_data_offset() {
        let tile = Tile::new(5, 20, 3, 10, 1, 100);
        assert_eq!(tile.data_offset, 320);
        assert_eq!(tile.pixel_count(), 10);
        assert_eq!(tile.uncompressed_size(PrimitiveType::F64), 80);
    }

    #[test]
    fn test_primary_tier() {
        let data = ImageData::I32(vec![7; 64]);
        let mut t = tile(8, 8);
        let bytes = t.compress(&data, &RiceCodec, &[]);
        assert_eq!(t.compression_type, Some(TileCompressionType::Compressed));
        assert_eq!(t.decompress(&bytes, PrimitiveType::I32, &RiceCodec, &[]).unwrap(), data);
    }

    #[test]
    fn test_gzip_tier() {
        let data = ImageData::I16((0..256).map(|i| (i % 4) as i16).collect());
        let mut t = tile(16, 16);
        let bytes = t.compress(&data, &Refuse, &[]);
        assert_eq!(t.compression_type, Some(TileCompressionType::GzipCompressed));
        assert_eq!(t.decompress(&bytes, PrimitiveType::I16, &Refuse, &[]).unwrap(), data);
    }

    #[test]
    fn test_stored_tier() {
        // too short for gzip to pay off
        let data = ImageData::U8(vec![1, 2]);
        let mut t = tile(2, 1);
        let bytes = t.compress(&data, &GzipCodec::new(), &[]);
        assert_eq!(t.compression_type, Some(TileCompressionType::Uncompressed));
        assert_eq!(bytes, vec![1, 2]);
        assert_eq!(t.decompress(&bytes, PrimitiveType::U8, &Refuse, &[]).unwrap(), data);
        assert!(t.decompress(&bytes[..1], PrimitiveType::U8, &Refuse, &[]).is_err());
    }

    #[test]
    fn test_no_tier_is_corrupt() {
        let t = tile(2, 1);
        assert!(matches!(
            t.decompress(&[1, 2], PrimitiveType::U8, &Refuse, &[]),
            Err(CompressionError::CorruptTile { index: 0, .. })
        ));
    }

    #[test]
    fn test_handle_waits_for_completion() {
        let handle = Arc::new(TileHandle::<u32>::new(3));
        assert!(!handle.is_done());
        let worker = {
            let handle = Arc::clone(&handle);
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(20));
                handle.complete(Ok(42));
            })
        };
        assert_eq!(handle.wait_for_result(|v| *v).unwrap(), 42);
        assert_eq!(handle.with_value(|v| *v + 1), Some(43));
        worker.join().unwrap();
    }

    #[test]
    fn test_handle_wraps_failures() {
        let handle = TileHandle::<u32>::new(2);
        handle.complete(Err(CompressionError::InvalidData("bad".to_string())));
        assert_eq!(handle.with_value(|v| *v), None);
        assert!(matches!(
            handle.wait_for_result(|v| *v),
            Err(CompressionError::TileFailed { index: 2, .. })
        ));

        let corrupt = TileHandle::<u32>::new(4);
        corrupt.complete(Err(CompressionError::CorruptTile {
            index: 4,
            reason: "no data".to_string(),
        }));
        assert!(matches!(
            corrupt.wait_for_result(|v| *v),
            Err(CompressionError::CorruptTile { index: 4, .. })
        ));
    }
}
