//! Row Schema
//!
//! Immutable description of a fixed-width record.

use crate::error::{display_key, Result, StoreError};
use crate::order::ByteOrder;

/// How the bytes of a column are interpreted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    /// Opaque bytes (keys, text), zero-padded on the right
    Binary,
    /// Big-endian base-256 unsigned integer
    Numeric,
}

/// A single fixed-width column
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    pub name: String,
    pub width: usize,
    pub encoding: Encoding,
}

impl Column {
    pub fn binary(name: impl Into<String>, width: usize) -> Self {
        Self {
            name: name.into(),
            width,
            encoding: Encoding::Binary,
        }
    }

    pub fn numeric(name: impl Into<String>, width: usize) -> Self {
        Self {
            name: name.into(),
            width,
            encoding: Encoding::Numeric,
        }
    }
}

/// Ordered list of columns with a primary key and a byte order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowSchema {
    columns: Vec<Column>,
    colstart: Vec<usize>,
    objectsize: usize,
    primary_key: usize,
    order: ByteOrder,
}

impl RowSchema {
    /// Build a schema; the primary key column is normally 0
    pub fn new(columns: Vec<Column>, order: ByteOrder, primary_key: usize) -> Result<Self> {
        if columns.is_empty() {
            return Err(StoreError::SchemaMismatch(
                "a row needs at least one column".to_string(),
            ));
        }
        if primary_key >= columns.len() {
            return Err(StoreError::SchemaMismatch(format!(
                "primary key column {} out of range ({} columns)",
                primary_key,
                columns.len()
            )));
        }

        let mut colstart = Vec::with_capacity(columns.len());
        let mut offset = 0;
        for column in &columns {
            if column.width == 0 {
                return Err(StoreError::SchemaMismatch(format!(
                    "column '{}' has zero width",
                    column.name
                )));
            }
            if column.encoding == Encoding::Numeric && column.width > 8 {
                return Err(StoreError::SchemaMismatch(format!(
                    "numeric column '{}' is {} bytes wide, at most 8 supported",
                    column.name, column.width
                )));
            }
            colstart.push(offset);
            offset += column.width;
        }

        Ok(Self {
            columns,
            colstart,
            objectsize: offset,
            primary_key,
            order,
        })
    }

    /// Two-column key/value schema, the shape most tables use
    pub fn key_value(key_width: usize, value_width: usize) -> Result<Self> {
        Self::new(
            vec![
                Column::binary("key", key_width),
                Column::binary("value", value_width),
            ],
            ByteOrder::default(),
            0,
        )
    }

    /// Total record width in bytes
    pub fn objectsize(&self) -> usize {
        self.objectsize
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn column(&self, i: usize) -> &Column {
        &self.columns[i]
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn colstart(&self, i: usize) -> usize {
        self.colstart[i]
    }

    pub fn width(&self, i: usize) -> usize {
        self.columns[i].width
    }

    /// Byte range of column `i` inside a record
    pub fn range(&self, i: usize) -> std::ops::Range<usize> {
        let start = self.colstart[i];
        start..start + self.columns[i].width
    }

    pub fn primary_key(&self) -> usize {
        self.primary_key
    }

    pub fn key_width(&self) -> usize {
        self.columns[self.primary_key].width
    }

    pub fn key_range(&self) -> std::ops::Range<usize> {
        self.range(self.primary_key)
    }

    pub fn order(&self) -> &ByteOrder {
        &self.order
    }

    /// Pad a key with zeros to the primary key width
    pub fn normalize_key(&self, key: &[u8]) -> Result<Vec<u8>> {
        let width = self.key_width();
        if key.len() > width {
            return Err(StoreError::SchemaMismatch(format!(
                "key '{}' is {} bytes, key column is {} bytes",
                display_key(key),
                key.len(),
                width
            )));
        }
        let mut padded = vec![0u8; width];
        padded[..key.len()].copy_from_slice(key);
        Ok(padded)
    }

    /// True if both schemas describe records with the same column widths
    pub fn same_layout(&self, other: &RowSchema) -> bool {
        self.columns.len() == other.columns.len()
            && self
                .columns
                .iter()
                .zip(other.columns.iter())
                .all(|(a, b)| a.width == b.width)
    }
}
