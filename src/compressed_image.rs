//! The compressed image unit: header keywords plus the tile table.
//!
//! This is where images enter and leave the tile machinery. It translates
//! between keywords and columns on one side and tiles, codecs and options
//! on the other, and leaves all actual compression to [`TileArray`].

use crate::codec::options::{Parameter, ParameterValue, ZQUANTIZ};
use crate::codec::{find_codec, Algorithm, CompressOption, QuantizeOption};
use crate::header::{required_int, required_string, Header, HeaderValue};
use crate::image::{Image, ImageData, PrimitiveType};
use crate::quant::{NullCheck, QuantizeAlgorithm, NULL_VALUE};
use crate::table::{
    Column, TileTable, COMPRESSED_DATA, GZIP_COMPRESSED_DATA, UNCOMPRESSED_DATA, ZSCALE, ZZERO,
};
use crate::tile::TileCompressionType;
use crate::tile_array::{plan_tiles, CompressedStream, TileArray};
use crate::{CompressionError, Result};

const ZBITPIX: &str = "ZBITPIX";
const ZCMPTYPE: &str = "ZCMPTYPE";
const ZNAXIS: &str = "ZNAXIS";
const ZDITHER0: &str = "ZDITHER0";
const ZBLANK: &str = "ZBLANK";

/// How to compress an image.
#[derive(Debug, Clone, PartialEq)]
pub struct CompressSettings {
    pub algorithm: Algorithm,
    /// Quantization for floating-point images; `None` keeps them lossless
    pub quantize: Option<QuantizeAlgorithm>,
    /// Tile width and height; whole rows by default
    pub tile_size: Option<(usize, usize)>,
    pub q_level: f32,
    /// First dither seed (ZDITHER0), 1 to 10000
    pub dither_seed: i64,
    pub null_check: NullCheck,
    pub block_size: usize,
}

impl Default for CompressSettings {
    fn default() -> Self {
        Self {
            algorithm: Algorithm::Rice1,
            quantize: Some(QuantizeAlgorithm::SubtractiveDither1),
            tile_size: None,
            q_level: 4.0,
            dither_seed: 1,
            null_check: NullCheck::Off,
            block_size: crate::codec::rice::DEFAULT_BLOCK_SIZE,
        }
    }
}

impl CompressSettings {
    pub fn new(algorithm: Algorithm) -> Self {
        Self {
            algorithm,
            ..Self::default()
        }
    }

    pub fn with_tile_size(mut self, width: usize, height: usize) -> Self {
        self.tile_size = Some((width, height));
        self
    }

    pub fn with_quantize(mut self, quantize: Option<QuantizeAlgorithm>) -> Self {
        self.quantize = quantize;
        self
    }

    pub fn with_q_level(mut self, q_level: f32) -> Self {
        self.q_level = q_level;
        self
    }

    pub fn with_dither_seed(mut self, seed: i64) -> Self {
        self.dither_seed = seed;
        self
    }

    pub fn with_null_check(mut self, null_check: NullCheck) -> Self {
        self.null_check = null_check;
        self
    }

    pub fn with_block_size(mut self, block_size: usize) -> Self {
        self.block_size = block_size;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if let Some((w, h)) = self.tile_size {
            if w == 0 || h == 0 {
                return Err(CompressionError::InvalidArgument(format!(
                    "tile size {}x{} must be positive",
                    w, h
                )));
            }
        }
        if !(1..=10_000).contains(&self.dither_seed) {
            return Err(CompressionError::InvalidArgument(format!(
                "dither seed {} outside 1..=10000",
                self.dither_seed
            )));
        }
        if self.block_size == 0 {
            return Err(CompressionError::InvalidArgument(
                "block size must be positive".to_string(),
            ));
        }
        if !self.q_level.is_finite() {
            return Err(CompressionError::InvalidArgument(format!("q level {}", self.q_level)));
        }
        Ok(())
    }

    /// Option chain for images of `kind`.
    fn options(&self, kind: PrimitiveType) -> Vec<CompressOption> {
        let quantized = self.quantize.filter(|_| kind.is_floating_point());
        let coded_kind = if quantized.is_some() { PrimitiveType::I32 } else { kind };

        let mut options = self.algorithm.default_options();
        for option in &mut options {
            if let CompressOption::Rice(rice) = option {
                rice.block_size = self.block_size;
                rice.bytepix = matches!(
                    coded_kind,
                    PrimitiveType::U8 | PrimitiveType::I16 | PrimitiveType::I32
                )
                .then(|| coded_kind.size());
            }
        }
        if let Some(algorithm) = quantized {
            let quantize =
                QuantizeOption::new(algorithm, self.q_level, self.dither_seed, self.null_check);
            options.insert(0, CompressOption::Quantize(quantize));
        }
        options
    }
}

/// The tile table of a compressed image.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompressedImageData {
    table: TileTable,
}

impl CompressedImageData {
    pub fn from_table(table: TileTable) -> Self {
        Self { table }
    }

    pub fn table(&self) -> &TileTable {
        &self.table
    }

    pub fn into_table(self) -> TileTable {
        self.table
    }

    /// Compresses `image`, filling the tile table and writing the
    /// compression keywords to `header`.
    pub fn compress(
        image: &Image,
        settings: &CompressSettings,
        header: &mut dyn Header,
    ) -> Result<Self> {
        settings.validate()?;
        let kind = image.primitive_type();
        let quantize = settings.quantize.filter(|_| kind.is_floating_point());
        let codec = find_codec(settings.algorithm, quantize, kind)?;
        let options = settings.options(kind);
        let tile_size = settings.tile_size.unwrap_or((image.width(), 1));

        let mut array =
            TileArray::new(image.width(), image.height(), kind, tile_size, codec, options)?;
        let stream = array.compress_all(image)?;

        let rows = array.tiles().len();
        let mut compressed = vec![Vec::new(); rows];
        let mut gzipped = vec![Vec::new(); rows];
        let mut uncompressed = vec![Vec::new(); rows];
        let mut zeros = vec![f64::NAN; rows];
        let mut scales = vec![f64::NAN; rows];
        let mut any_scaled = false;

        for tile in array.tiles() {
            let bytes = stream.tile_bytes(tile)?.to_vec();
            let column = match tile.compression_type {
                Some(TileCompressionType::Compressed) => &mut compressed,
                Some(TileCompressionType::GzipCompressed) => &mut gzipped,
                Some(TileCompressionType::Uncompressed) => &mut uncompressed,
                None => {
                    return Err(CompressionError::CorruptTile {
                        index: tile.index,
                        reason: "compressed without a compression type".to_string(),
                    })
                }
            };
            column[tile.index] = bytes;
            if let (Some(zero), Some(scale)) = (tile.zero, tile.scale) {
                zeros[tile.index] = zero;
                scales[tile.index] = scale;
                any_scaled = true;
            }
        }

        let mut table = TileTable::new();
        table.set_column(COMPRESSED_DATA, Column::Bytes(compressed));
        if gzipped.iter().any(|row| !row.is_empty()) {
            table.set_column(GZIP_COMPRESSED_DATA, Column::Bytes(gzipped));
        }
        if uncompressed.iter().any(|row| !row.is_empty()) {
            table.set_column(UNCOMPRESSED_DATA, Column::Bytes(uncompressed));
        }
        if any_scaled {
            table.set_column(ZZERO, Column::Real(zeros));
            table.set_column(ZSCALE, Column::Real(scales));
        }

        header.set(ZBITPIX, HeaderValue::Int(kind.bitpix()));
        header.set(ZCMPTYPE, HeaderValue::Str(settings.algorithm.name().to_string()));
        header.set(ZNAXIS, HeaderValue::Int(2));
        header.set("ZNAXIS1", HeaderValue::Int(image.width() as i64));
        header.set("ZNAXIS2", HeaderValue::Int(image.height() as i64));
        header.set("ZTILE1", HeaderValue::Int(tile_size.0 as i64));
        header.set("ZTILE2", HeaderValue::Int(tile_size.1 as i64));
        if let Some(algorithm) = quantize {
            header.set(ZQUANTIZ, HeaderValue::Str(algorithm.name().to_string()));
            header.set(ZDITHER0, HeaderValue::Int(settings.dither_seed));
            if settings.null_check.is_active() {
                header.set(ZBLANK, HeaderValue::Int(i64::from(NULL_VALUE)));
            }
        }
        let parameters: Vec<Parameter> =
            array.options().iter().flat_map(CompressOption::parameters).collect();
        for (n, parameter) in parameters.iter().enumerate() {
            header.set(&format!("ZNAME{}", n + 1), HeaderValue::Str(parameter.name.clone()));
            header.set(&format!("ZVAL{}", n + 1), header_value(&parameter.value));
        }

        tracing::debug!(
            width = image.width(),
            height = image.height(),
            tiles = rows,
            bytes = stream.len(),
            algorithm = %settings.algorithm,
            "compressed image"
        );
        Ok(Self { table })
    }

    /// Decompresses into a newly allocated image.
    pub fn uncompressed_data(&self, header: &dyn Header) -> Result<Image> {
        self.decompress(header, None)
    }

    /// Decompresses into `buffer`, which must match the image's pixel kind
    /// and size.
    pub fn uncompressed_data_into(&self, header: &dyn Header, buffer: ImageData) -> Result<Image> {
        self.decompress(header, Some(buffer))
    }

    fn decompress(&self, header: &dyn Header, buffer: Option<ImageData>) -> Result<Image> {
        let kind = PrimitiveType::from_bitpix(required_int(header, ZBITPIX)?)?;
        let algorithm: Algorithm = required_string(header, ZCMPTYPE)?.parse()?;
        let naxis = required_int(header, ZNAXIS)?;
        if !(1..=2).contains(&naxis) {
            return Err(CompressionError::InvalidKeyword {
                key: ZNAXIS.to_string(),
                value: naxis.to_string(),
            });
        }
        let width = axis(required_int(header, "ZNAXIS1")?, "ZNAXIS1")?;
        let height = if naxis == 2 {
            axis(required_int(header, "ZNAXIS2")?, "ZNAXIS2")?
        } else {
            1
        };
        let tile_width = match header.int_value("ZTILE1") {
            Some(v) => axis(v, "ZTILE1")?,
            None => width,
        };
        let tile_height = match header.int_value("ZTILE2") {
            Some(v) => axis(v, "ZTILE2")?,
            None => 1,
        };

        let mut parameters = Vec::new();
        for n in 1.. {
            let Some(name) = header.string_value(&format!("ZNAME{}", n)) else {
                break;
            };
            if let Some(value) = header.value(&format!("ZVAL{}", n)) {
                parameters.push(Parameter::new(name, parameter_value(value)));
            }
        }

        let mut quantize = match header.string_value(ZQUANTIZ) {
            Some(name) => Some(name.parse::<QuantizeAlgorithm>()?),
            None => None,
        };
        if let Some(algorithm) = quantize {
            parameters.push(Parameter::new(
                ZQUANTIZ,
                ParameterValue::Str(algorithm.name().to_string()),
            ));
        }
        if kind.is_floating_point() && quantize.is_none() && self.table.column(ZSCALE).is_some() {
            quantize = Some(QuantizeAlgorithm::NoDither);
        }
        let quantize = quantize.filter(|_| kind.is_floating_point());

        let codec = find_codec(algorithm, quantize, kind)?;
        let mut options = algorithm.default_options();
        if let Some(q) = quantize {
            let null_check = if header.contains(ZBLANK) {
                NullCheck::NaN
            } else {
                NullCheck::Off
            };
            let zdither0 = header.int_value(ZDITHER0).unwrap_or(1);
            let quantize = QuantizeOption::new(q, 0.0, zdither0, null_check);
            options.insert(0, CompressOption::Quantize(quantize));
        }
        for option in &mut options {
            option.apply_parameters(&parameters);
        }

        let compressed = self
            .bytes_column(COMPRESSED_DATA)?
            .ok_or_else(|| CompressionError::MissingColumn(COMPRESSED_DATA.to_string()))?;
        let uncompressed = self.bytes_column(UNCOMPRESSED_DATA)?;
        let gzipped = self.bytes_column(GZIP_COMPRESSED_DATA)?;
        let zeros = self.real_column(ZZERO)?;
        let scales = self.real_column(ZSCALE)?;

        let mut tiles = plan_tiles((width, height), (tile_width, tile_height))?;
        if compressed.len() != tiles.len() {
            return Err(CompressionError::InvalidData(format!(
                "{} rows for {} tiles",
                compressed.len(),
                tiles.len()
            )));
        }

        let mut chunks: Vec<&[u8]> = Vec::with_capacity(tiles.len());
        for tile in &mut tiles {
            let mut chunk: &[u8] = &[];
            // the last non-empty column wins
            if let Some(bytes) = row(Some(compressed), tile.index) {
                tile.compression_type = Some(TileCompressionType::Compressed);
                chunk = bytes;
            }
            if let Some(bytes) = row(uncompressed, tile.index) {
                tile.compression_type = Some(TileCompressionType::Uncompressed);
                chunk = bytes;
            }
            if let Some(bytes) = row(gzipped, tile.index) {
                tile.compression_type = Some(TileCompressionType::GzipCompressed);
                chunk = bytes;
            }
            if tile.compression_type == Some(TileCompressionType::Compressed) {
                tile.zero = real_at(zeros, tile.index);
                tile.scale = real_at(scales, tile.index);
            }
            chunks.push(chunk);
        }

        let stream = CompressedStream::from_tile_bytes(&mut tiles, chunks);
        let array = TileArray::from_tiles(width, height, kind, tiles, codec, options)?;
        array.decompress_all(&stream, buffer)
    }

    fn bytes_column(&self, name: &str) -> Result<Option<&[Vec<u8>]>> {
        match self.table.column(name) {
            None => Ok(None),
            Some(column) => column
                .as_bytes()
                .map(Some)
                .ok_or_else(|| {
                    CompressionError::InvalidData(format!("column {} does not hold bytes", name))
                }),
        }
    }

    fn real_column(&self, name: &str) -> Result<Option<&[f64]>> {
        match self.table.column(name) {
            None => Ok(None),
            Some(column) => column
                .as_real()
                .map(Some)
                .ok_or_else(|| {
                    CompressionError::InvalidData(format!("column {} does not hold reals", name))
                }),
        }
    }
}

/// Row `index` of a byte column, if present and non-empty.
fn row(column: Option<&[Vec<u8>]>, index: usize) -> Option<&[u8]> {
    column
        .and_then(|rows| rows.get(index))
        .map(Vec::as_slice)
        .filter(|bytes| !bytes.is_empty())
}

/// NaN marks a tile that carries no scaling.
fn real_at(column: Option<&[f64]>, index: usize) -> Option<f64> {
    column
        .and_then(|values| values.get(index))
        .copied()
        .filter(|v| !v.is_nan())
}

fn axis(value: i64, key: &str) -> Result<usize> {
    usize::try_from(value)
        .ok()
        .filter(|&v| v > 0)
        .ok_or_else(|| CompressionError::InvalidKeyword {
            key: key.to_string(),
            value: value.to_string(),
        })
}

fn header_value(value: &ParameterValue) -> HeaderValue {
    match value {
        ParameterValue::Int(v) => HeaderValue::Int(*v),
        ParameterValue::Real(v) => HeaderValue::Real(*v),
        ParameterValue::Str(s) => HeaderValue::Str(s.clone()),
    }
}

fn parameter_value(value: &HeaderValue) -> ParameterValue {
    match value {
        HeaderValue::Int(v) => ParameterValue::Int(*v),
        HeaderValue::Real(v) => ParameterValue::Real(*v),
        HeaderValue::Str(s) => ParameterValue::Str(s.trim().to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::header::MemoryHeader;

    fn ramp_image(width: usize, height: usize) -> Image {
        let data = ImageData::I16((0..width * height).map(|i| (i % 300) as i16 - 150).collect());
        Image::new(width, height, data).unwrap()
    }

    #[test]
    fn test_keywords_written() {
        let image = ramp_image(20, 6);
        let settings = CompressSettings::new(Algorithm::Rice1).with_tile_size(10, 3);
        let mut header = MemoryHeader::new();
        CompressedImageData::compress(&image, &settings, &mut header).unwrap();

        assert_eq!(header.int_value("ZBITPIX"), Some(16));
        assert_eq!(header.string_value("ZCMPTYPE"), Some("RICE_1"));
        assert_eq!(header.int_value("ZNAXIS"), Some(2));
        assert_eq!(header.int_value("ZNAXIS1"), Some(20));
        assert_eq!(header.int_value("ZNAXIS2"), Some(6));
        assert_eq!(header.int_value("ZTILE1"), Some(10));
        assert_eq!(header.int_value("ZTILE2"), Some(3));
        assert_eq!(header.string_value("ZNAME1"), Some("BLOCKSIZE"));
        assert_eq!(header.int_value("ZVAL1"), Some(32));
        assert_eq!(header.string_value("ZNAME2"), Some("BYTEPIX"));
        assert_eq!(header.int_value("ZVAL2"), Some(2));
        // integer images are never quantized
        assert!(!header.contains("ZQUANTIZ"));
    }

    #[test]
    fn test_round_trip_default_tiles() {
        let image = ramp_image(33, 7);
        let mut header = MemoryHeader::new();
        let settings = CompressSettings::new(Algorithm::Gzip2);
        let compressed = CompressedImageData::compress(&image, &settings, &mut header).unwrap();
        assert_eq!(compressed.table().rows(), 7);
        assert_eq!(compressed.uncompressed_data(&header).unwrap(), image);
    }

    #[test]
    fn test_missing_keyword_before_tile_work() {
        let compressed = CompressedImageData::default();
        let mut header = MemoryHeader::new();
        header.set("ZBITPIX", HeaderValue::Int(16));
        header.set("ZCMPTYPE", HeaderValue::Str("RICE_1".to_string()));
        assert!(matches!(
            compressed.uncompressed_data(&header),
            Err(CompressionError::MissingKeyword(key)) if key == "ZNAXIS"
        ));
    }

    #[test]
    fn test_missing_compressed_column() {
        let image = ramp_image(8, 2);
        let mut header = MemoryHeader::new();
        CompressedImageData::compress(&image, &CompressSettings::default(), &mut header).unwrap();
        let empty = CompressedImageData::from_table(TileTable::new());
        assert!(matches!(
            empty.uncompressed_data(&header),
            Err(CompressionError::MissingColumn(_))
        ));
    }

    #[test]
    fn test_three_axes_rejected() {
        let mut header = MemoryHeader::new();
        header.set("ZBITPIX", HeaderValue::Int(16));
        header.set("ZCMPTYPE", HeaderValue::Str("RICE_1".to_string()));
        header.set("ZNAXIS", HeaderValue::Int(3));
        assert!(matches!(
            CompressedImageData::default().uncompressed_data(&header),
            Err(CompressionError::InvalidKeyword { .. })
        ));
    }

    #[test]
    fn test_settings_validation() {
        assert!(CompressSettings::default().validate().is_ok());
        assert!(CompressSettings::default().with_tile_size(0, 1).validate().is_err());
        assert!(CompressSettings::default().with_dither_seed(0).validate().is_err());
        assert!(CompressSettings::default().with_block_size(0).validate().is_err());
    }

    #[test]
    fn test_unsupported_algorithm() {
        let image = ramp_image(8, 2);
        let mut header = MemoryHeader::new();
        let settings = CompressSettings::new(Algorithm::Hcompress1);
        let result = CompressedImageData::compress(&image, &settings, &mut header);
        assert!(matches!(result, Err(CompressionError::UnsupportedAlgorithm(_))));
    }
}
