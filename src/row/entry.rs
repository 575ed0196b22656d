//! Row Entry
//!
//! A single record bound to a schema.

use std::fmt;
use std::sync::Arc;

use crate::error::{Result, StoreError};
use crate::order::{decode_long, encode_long_into};

use super::{Encoding, RowSchema};

/// One record: exactly `objectsize` bytes interpreted through a schema.
///
/// `from_bytes` always copies the input, so an entry never aliases the
/// buffer it was read from (a RowSet chunk, a slot buffer, ...).
#[derive(Clone)]
pub struct RowEntry {
    schema: Arc<RowSchema>,
    bytes: Vec<u8>,
}

impl RowEntry {
    /// Zero-filled record
    pub fn new(schema: Arc<RowSchema>) -> Self {
        let bytes = vec![0u8; schema.objectsize()];
        Self { schema, bytes }
    }

    /// Copy an existing record buffer
    pub fn from_bytes(schema: Arc<RowSchema>, bytes: &[u8]) -> Result<Self> {
        if bytes.len() != schema.objectsize() {
            return Err(StoreError::length("row", schema.objectsize(), bytes.len()));
        }
        Ok(Self {
            schema,
            bytes: bytes.to_vec(),
        })
    }

    /// Take ownership of a record buffer
    pub fn from_vec(schema: Arc<RowSchema>, bytes: Vec<u8>) -> Result<Self> {
        if bytes.len() != schema.objectsize() {
            return Err(StoreError::length("row", schema.objectsize(), bytes.len()));
        }
        Ok(Self { schema, bytes })
    }

    /// Build a record column by column; missing trailing columns stay zero
    pub fn from_columns(schema: Arc<RowSchema>, columns: &[&[u8]]) -> Result<Self> {
        if columns.len() > schema.column_count() {
            return Err(StoreError::SchemaMismatch(format!(
                "{} column values for a {}-column row",
                columns.len(),
                schema.column_count()
            )));
        }
        let mut entry = Self::new(schema);
        for (i, value) in columns.iter().enumerate() {
            entry.set_col(i, value)?;
        }
        Ok(entry)
    }

    pub fn schema(&self) -> &Arc<RowSchema> {
        &self.schema
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    /// Primary key column
    pub fn key(&self) -> &[u8] {
        &self.bytes[self.schema.key_range()]
    }

    /// Raw bytes of column `i`
    pub fn col(&self, i: usize) -> &[u8] {
        &self.bytes[self.schema.range(i)]
    }

    /// Overwrite column `i`; shorter values are zero-padded
    pub fn set_col(&mut self, i: usize, value: &[u8]) -> Result<()> {
        let range = self.schema.range(i);
        if value.len() > range.len() {
            return Err(StoreError::SchemaMismatch(format!(
                "value of {} bytes does not fit column '{}' ({} bytes)",
                value.len(),
                self.schema.column(i).name,
                range.len()
            )));
        }
        let target = &mut self.bytes[range];
        target[..value.len()].copy_from_slice(value);
        target[value.len()..].fill(0);
        Ok(())
    }

    /// Column `i` decoded as a big-endian integer
    pub fn col_long(&self, i: usize) -> u64 {
        let bytes = self.col(i);
        // Binary columns wider than 8 bytes use their trailing 8 bytes
        let start = bytes.len().saturating_sub(8);
        decode_long(&bytes[start..])
    }

    /// Store `value` big-endian in column `i`
    pub fn set_col_long(&mut self, i: usize, value: u64) -> Result<()> {
        let range = self.schema.range(i);
        if range.len() < 8 && value >> (range.len() * 8) != 0 {
            return Err(StoreError::SchemaMismatch(format!(
                "{} does not fit numeric column '{}' ({} bytes)",
                value,
                self.schema.column(i).name,
                range.len()
            )));
        }
        let target = &mut self.bytes[range];
        let start = target.len().saturating_sub(8);
        target[..start].fill(0);
        encode_long_into(&mut target[start..], value);
        Ok(())
    }

    /// Column `i` as text, with trailing zero padding removed
    pub fn col_string(&self, i: usize) -> String {
        let bytes = self.col(i);
        if self.schema.column(i).encoding == Encoding::Numeric {
            return self.col_long(i).to_string();
        }
        let end = bytes.iter().rposition(|&b| b != 0).map_or(0, |p| p + 1);
        String::from_utf8_lossy(&bytes[..end]).into_owned()
    }

    /// True if the leading byte(s) of column `i` carry the empty sentinel:
    /// `0x00`, or the two-byte `0x80 0x00` used by fixed arrays
    pub fn is_empty_col(&self, i: usize) -> bool {
        let bytes = self.col(i);
        bytes[0] == 0 || (bytes.len() > 1 && bytes[0] == 0x80 && bytes[1] == 0)
    }
}

impl PartialEq for RowEntry {
    fn eq(&self, other: &Self) -> bool {
        self.bytes == other.bytes && self.schema.same_layout(&other.schema)
    }
}

impl Eq for RowEntry {}

impl fmt::Debug for RowEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut list = f.debug_list();
        for i in 0..self.schema.column_count() {
            list.entry(&format_args!(
                "{}={}",
                self.schema.column(i).name,
                self.col_string(i)
            ));
        }
        list.finish()
    }
}
