//! Splitting an image into tiles and running them through the worker pool.
//!
//! Compression is parallel per tile, but the output is a single buffer with
//! the tiles in index order. The first tile's output becomes the anchor
//! buffer; every later tile waits for its predecessor, takes the anchor
//! over, appends its own bytes and hands the anchor on through its
//! completion handle. The anchor is therefore owned by exactly one tile at
//! a time.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use crate::codec::{CompressOption, TileCodec};
use crate::image::{Image, ImageData, PrimitiveType};
use crate::pool;
use crate::tile::{Tile, TileHandle};
use crate::{CompressionError, Result};

/// Row-major tiles covering a `width` x `height` image exactly.
///
/// The last tile of a row or column holds whatever is left over.
pub fn plan_tiles(image_axes: (usize, usize), tile_axes: (usize, usize)) -> Result<Vec<Tile>> {
    let (width, height) = image_axes;
    let (tile_width, tile_height) = tile_axes;
    if width == 0 || height == 0 {
        return Err(CompressionError::ImageDimensions { width, height });
    }
    if tile_width == 0 || tile_height == 0 {
        return Err(CompressionError::InvalidArgument(format!(
            "tile size {}x{} must be positive",
            tile_width, tile_height
        )));
    }

    let columns = width.div_ceil(tile_width);
    let rows = height.div_ceil(tile_height);
    let last_extent = |extent: usize, tile: usize, count: usize| {
        let rest = extent - (count - 1) * tile;
        if rest == 0 {
            tile
        } else {
            rest
        }
    };

    let mut tiles = Vec::with_capacity(columns * rows);
    for row in 0..rows {
        let h = if row == rows - 1 {
            last_extent(height, tile_height, rows)
        } else {
            tile_height
        };
        for column in 0..columns {
            let w = if column == columns - 1 {
                last_extent(width, tile_width, columns)
            } else {
                tile_width
            };
            let index = tiles.len();
            tiles.push(Tile::new(index, column * tile_width, row * tile_height, w, h, width));
        }
    }
    Ok(tiles)
}

/// All tiles' bytes back to back, in tile index order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompressedStream {
    data: Vec<u8>,
}

impl CompressedStream {
    pub fn new(data: Vec<u8>) -> Self {
        Self { data }
    }

    /// Concatenates per-tile byte strings, recording each tile's range.
    pub fn from_tile_bytes<'a>(
        tiles: &mut [Tile],
        bytes: impl IntoIterator<Item = &'a [u8]>,
    ) -> Self {
        let mut data = Vec::new();
        for (tile, chunk) in tiles.iter_mut().zip(bytes) {
            tile.byte_offset = data.len();
            tile.byte_len = chunk.len();
            data.extend_from_slice(chunk);
        }
        Self { data }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }

    /// The bytes of one tile.
    pub fn tile_bytes(&self, tile: &Tile) -> Result<&[u8]> {
        tile.byte_offset
            .checked_add(tile.byte_len)
            .and_then(|end| self.data.get(tile.byte_offset..end))
            .ok_or_else(|| CompressionError::CorruptTile {
                index: tile.index,
                reason: format!(
                    "byte range {}+{} outside a stream of {} bytes",
                    tile.byte_offset,
                    tile.byte_len,
                    self.data.len()
                ),
            })
    }
}

/// What a compression worker leaves in its handle.
struct CompressedTile {
    tile: Tile,
    /// The stream so far, until the next tile takes it over
    anchor: Option<Vec<u8>>,
}

/// An image's tiles together with the codec chain that handles them.
pub struct TileArray {
    width: usize,
    height: usize,
    kind: PrimitiveType,
    tiles: Vec<Tile>,
    codec: Arc<dyn TileCodec>,
    options: Vec<CompressOption>,
}

impl TileArray {
    /// Plans the tiles of a `width` x `height` image.
    pub fn new(
        width: usize,
        height: usize,
        kind: PrimitiveType,
        tile_axes: (usize, usize),
        codec: Arc<dyn TileCodec>,
        options: Vec<CompressOption>,
    ) -> Result<Self> {
        let tiles = plan_tiles((width, height), tile_axes)?;
        Ok(Self {
            width,
            height,
            kind,
            tiles,
            codec,
            options,
        })
    }

    /// Tiles with their tiers, scalings and byte ranges already known, as
    /// read back from a tile table.
    pub fn from_tiles(
        width: usize,
        height: usize,
        kind: PrimitiveType,
        tiles: Vec<Tile>,
        codec: Arc<dyn TileCodec>,
        options: Vec<CompressOption>,
    ) -> Result<Self> {
        let covered: usize = tiles.iter().map(Tile::pixel_count).sum();
        let fits = tiles
            .iter()
            .all(|t| t.x + t.width <= width && t.y + t.height <= height);
        if covered != width * height || !fits {
            return Err(CompressionError::InvalidArgument(format!(
                "tiles do not cover a {}x{} image",
                width, height
            )));
        }
        Ok(Self {
            width,
            height,
            kind,
            tiles,
            codec,
            options,
        })
    }

    pub fn tiles(&self) -> &[Tile] {
        &self.tiles
    }

    pub fn tiles_mut(&mut self) -> &mut [Tile] {
        &mut self.tiles
    }

    pub fn primitive_type(&self) -> PrimitiveType {
        self.kind
    }

    pub fn options(&self) -> &[CompressOption] {
        &self.options
    }

    /// Compresses every tile and packs the results into one stream.
    ///
    /// On success every tile carries its tier, scaling and byte range. The
    /// first failing tile in index order decides the error.
    pub fn compress_all(&mut self, image: &Image) -> Result<CompressedStream> {
        if image.width() != self.width
            || image.height() != self.height
            || image.primitive_type() != self.kind
        {
            return Err(CompressionError::InvalidArgument(format!(
                "expected a {}x{} {:?} image",
                self.width, self.height, self.kind
            )));
        }

        let pool = pool::get()?;
        let handles: Vec<Arc<TileHandle<CompressedTile>>> =
            (0..self.tiles.len()).map(|i| Arc::new(TileHandle::new(i))).collect();

        for (i, tile) in self.tiles.iter().enumerate() {
            let data = image.data().gather(self.width, tile.data_offset, tile.width, tile.height);
            let mut tile = tile.clone();
            let codec = Arc::clone(&self.codec);
            let options = self.options.clone();
            let handle = Arc::clone(&handles[i]);
            let previous = i.checked_sub(1).map(|p| Arc::clone(&handles[p]));

            pool.spawn_fifo(move || {
                let compressed = catch_unwind(AssertUnwindSafe(|| {
                    tile.compress(&data, codec.as_ref(), &options)
                }));
                let bytes = match compressed {
                    Ok(bytes) => bytes,
                    Err(_) => {
                        let index = tile.index;
                        handle.complete(Err(CompressionError::WorkerPanicked { index }));
                        return;
                    }
                };

                let anchor = match previous {
                    None => Some(Vec::with_capacity(bytes.len() * 2)),
                    Some(previous) => previous.with_value(|done| done.anchor.take()).flatten(),
                };
                let anchor = match anchor {
                    Some(mut anchor) => {
                        tile.byte_offset = anchor.len();
                        tile.byte_len = bytes.len();
                        anchor.extend_from_slice(&bytes);
                        Some(anchor)
                    }
                    None => {
                        tracing::trace!(tile = tile.index, "predecessor failed, nothing to append");
                        None
                    }
                };
                handle.complete(Ok(CompressedTile { tile, anchor }));
            });
        }

        let mut first_error = None;
        let mut finished = Vec::with_capacity(handles.len());
        for handle in &handles {
            match handle.wait_for_result(|done| done.tile.clone()) {
                Ok(tile) => finished.push(tile),
                Err(e) => {
                    first_error.get_or_insert(e);
                }
            }
        }
        if let Some(e) = first_error {
            return Err(e);
        }

        let data = handles
            .last()
            .and_then(|last| last.with_value(|done| done.anchor.take()))
            .flatten()
            .ok_or_else(|| {
                CompressionError::InvalidData("compaction produced no stream".to_string())
            })?;

        self.tiles = finished;
        tracing::debug!(
            tiles = self.tiles.len(),
            bytes = data.len(),
            "compressed tile array"
        );
        Ok(CompressedStream::new(data))
    }

    /// Decodes every tile and assembles the image.
    ///
    /// `target` is reused when given; it must have the image's pixel kind
    /// and length.
    pub fn decompress_all(
        &self,
        stream: &CompressedStream,
        target: Option<ImageData>,
    ) -> Result<Image> {
        let pixels = self.width * self.height;
        let mut output = match target {
            Some(buffer) => {
                if buffer.primitive_type() != self.kind || buffer.len() != pixels {
                    return Err(CompressionError::InvalidArgument(format!(
                        "buffer of {} {:?} pixels cannot hold a {}x{} {:?} image",
                        buffer.len(),
                        buffer.primitive_type(),
                        self.width,
                        self.height,
                        self.kind
                    )));
                }
                buffer
            }
            None => ImageData::zeroed(self.kind, pixels),
        };

        // Check the ranges before any work is queued.
        for tile in &self.tiles {
            stream.tile_bytes(tile)?;
        }

        let pool = pool::get()?;
        let shared: Arc<[u8]> = Arc::from(stream.as_bytes());
        let handles: Vec<Arc<TileHandle<Option<ImageData>>>> =
            (0..self.tiles.len()).map(|i| Arc::new(TileHandle::new(i))).collect();

        for (tile, handle) in self.tiles.iter().zip(&handles) {
            let tile = tile.clone();
            let kind = self.kind;
            let shared = Arc::clone(&shared);
            let codec = Arc::clone(&self.codec);
            let options = self.options.clone();
            let handle = Arc::clone(handle);

            pool.spawn_fifo(move || {
                let bytes = &shared[tile.byte_offset..tile.byte_offset + tile.byte_len];
                let result = catch_unwind(AssertUnwindSafe(|| {
                    tile.decompress(bytes, kind, codec.as_ref(), &options)
                }))
                .unwrap_or(Err(CompressionError::WorkerPanicked { index: tile.index }));
                handle.complete(result.map(Some));
            });
        }

        let mut first_error = None;
        for (tile, handle) in self.tiles.iter().zip(&handles) {
            match handle.wait_for_result(Option::take) {
                Ok(Some(data)) => {
                    if first_error.is_none() {
                        output.scatter(self.width, tile.data_offset, tile.width, &data)?;
                    }
                }
                Ok(None) => {}
                Err(e) => {
                    first_error.get_or_insert(e);
                }
            }
        }
        if let Some(e) = first_error {
            return Err(e);
        }

        Image::new(self.width, self.height, output)
    }
}
