//! The binary table holding one row per tile.

pub const COMPRESSED_DATA: &str = "COMPRESSED_DATA";
pub const UNCOMPRESSED_DATA: &str = "UNCOMPRESSED_DATA";
pub const GZIP_COMPRESSED_DATA: &str = "GZIP_COMPRESSED_DATA";
pub const ZZERO: &str = "ZZERO";
pub const ZSCALE: &str = "ZSCALE";

#[derive(Debug, Clone, PartialEq)]
pub enum Column {
    /// Variable-length byte arrays
    Bytes(Vec<Vec<u8>>),
    Real(Vec<f64>),
}

impl Column {
    pub fn len(&self) -> usize {
        match self {
            Self::Bytes(rows) => rows.len(),
            Self::Real(rows) => rows.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn as_bytes(&self) -> Option<&[Vec<u8>]> {
        match self {
            Self::Bytes(rows) => Some(rows),
            Self::Real(_) => None,
        }
    }

    pub fn as_real(&self) -> Option<&[f64]> {
        match self {
            Self::Real(rows) => Some(rows),
            Self::Bytes(_) => None,
        }
    }
}

/// Named columns, kept in the order they were added.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TileTable {
    columns: Vec<(String, Column)>,
}

impl TileTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_column(&mut self, name: &str, column: Column) {
        match self.columns.iter_mut().find(|(n, _)| n == name) {
            Some((_, existing)) => *existing = column,
            None => self.columns.push((name.to_string(), column)),
        }
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|(n, _)| n == name).map(|(_, c)| c)
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|(n, _)| n.as_str())
    }

    /// Rows in the longest column.
    pub fn rows(&self) -> usize {
        self.columns.iter().map(|(_, c)| c.len()).max().unwrap_or(0)
    }
}
