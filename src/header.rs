//! Header keywords of the compressed image unit.
//!
//! Parsing and writing header cards belongs to the file layer; this crate
//! only needs keyword lookup and assignment. [`MemoryHeader`] keeps the
//! cards in memory, in insertion order.

use crate::{CompressionError, Result};

#[derive(Debug, Clone, PartialEq)]
pub enum HeaderValue {
    Int(i64),
    Real(f64),
    Str(String),
}

pub trait Header {
    fn value(&self, key: &str) -> Option<&HeaderValue>;

    /// Replaces an existing card or appends a new one.
    fn set(&mut self, key: &str, value: HeaderValue);

    fn contains(&self, key: &str) -> bool {
        self.value(key).is_some()
    }

    /// Integer value; whole reals are accepted too.
    fn int_value(&self, key: &str) -> Option<i64> {
        match self.value(key)? {
            HeaderValue::Int(v) => Some(*v),
            HeaderValue::Real(v) if v.fract() == 0.0 => Some(*v as i64),
            _ => None,
        }
    }

    fn real_value(&self, key: &str) -> Option<f64> {
        match self.value(key)? {
            HeaderValue::Int(v) => Some(*v as f64),
            HeaderValue::Real(v) => Some(*v),
            HeaderValue::Str(_) => None,
        }
    }

    fn string_value(&self, key: &str) -> Option<&str> {
        match self.value(key)? {
            HeaderValue::Str(s) => Some(s.trim()),
            _ => None,
        }
    }
}

/// A required integer keyword.
pub(crate) fn required_int(header: &dyn Header, key: &str) -> Result<i64> {
    match header.value(key) {
        None => Err(CompressionError::MissingKeyword(key.to_string())),
        Some(value) => header.int_value(key).ok_or_else(|| CompressionError::InvalidKeyword {
            key: key.to_string(),
            value: format!("{:?}", value),
        }),
    }
}

/// A required string keyword.
pub(crate) fn required_string<'a>(header: &'a dyn Header, key: &str) -> Result<&'a str> {
    match header.value(key) {
        None => Err(CompressionError::MissingKeyword(key.to_string())),
        Some(value) => header.string_value(key).ok_or_else(|| CompressionError::InvalidKeyword {
            key: key.to_string(),
            value: format!("{:?}", value),
        }),
    }
}

/// Ordered list of header cards.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MemoryHeader {
    cards: Vec<(String, HeaderValue)>,
}

impl MemoryHeader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.cards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cards.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.cards.iter().map(|(key, _)| key.as_str())
    }

    pub fn remove(&mut self, key: &str) -> Option<HeaderValue> {
        let key = normalize(key);
        let pos = self.cards.iter().position(|(k, _)| *k == key)?;
        Some(self.cards.remove(pos).1)
    }
}

fn normalize(key: &str) -> String {
    key.trim().to_ascii_uppercase()
}

impl Header for MemoryHeader {
    fn value(&self, key: &str) -> Option<&HeaderValue> {
        let key = normalize(key);
        self.cards.iter().find(|(k, _)| *k == key).map(|(_, v)| v)
    }

    fn set(&mut self, key: &str, value: HeaderValue) {
        let key = normalize(key);
        match self.cards.iter_mut().find(|(k, _)| *k == key) {
            Some((_, existing)) => *existing = value,
            None => self.cards.push((key, value)),
        }
    }
}
