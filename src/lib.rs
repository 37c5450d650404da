//! Tile compression for the FITS tiled image convention.
//!
//! An image is cut into rectangular tiles. Every tile is compressed on its
//! own by a worker pool, falls back to gzip or raw storage when the primary
//! algorithm declines it, and ends up as one row of the compressed tile
//! table. Floating-point tiles are first quantized to scaled integers with
//! the same noise estimate and dithering sequence CFITSIO uses, so the
//! integers produced here match it bit for bit.

use thiserror::Error;

pub mod codec;
pub mod compressed_image;
pub mod header;
pub mod image;
pub mod pool;
pub mod quant;
pub mod table;
pub mod tile;
pub mod tile_array;

pub use codec::{find_codec, Algorithm, CompressOption, Parameter, ParameterValue, TileCodec};
pub use compressed_image::{CompressSettings, CompressedImageData};
pub use header::{Header, HeaderValue, MemoryHeader};
pub use image::{Image, ImageData, PrimitiveType};
pub use quant::{Dither, NullCheck, QuantizationState, Quantized, Quantizer, QuantizeAlgorithm};
pub use table::{Column, TileTable};
pub use tile::{Tile, TileCompressionType};
pub use tile_array::{plan_tiles, CompressedStream, TileArray};

#[derive(Error, Debug)]
pub enum CompressionError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
    #[error("Invalid image dimensions {width}x{height}")]
    ImageDimensions { width: usize, height: usize },
    #[error("Required keyword {0} not found")]
    MissingKeyword(String),
    #[error("Keyword {key} has an invalid value: {value}")]
    InvalidKeyword { key: String, value: String },
    #[error("Required column {0} not found")]
    MissingColumn(String),
    #[error("Unsupported compression algorithm: {0}")]
    UnsupportedAlgorithm(String),
    #[error("Invalid compressed data: {0}")]
    InvalidData(String),
    #[error("Tile {index} is corrupt: {reason}")]
    CorruptTile { index: usize, reason: String },
    #[error("Could not (de)compress tile {index}")]
    TileFailed {
        index: usize,
        #[source]
        source: Box<CompressionError>,
    },
    #[error("Worker for tile {index} panicked")]
    WorkerPanicked { index: usize },
    #[error("Worker pool: {0}")]
    Pool(#[from] rayon::ThreadPoolBuildError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, CompressionError>;
