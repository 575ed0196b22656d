//! Slotted file header codec

use crate::config::Liveness;
use crate::error::{Result, StoreError};
use crate::order::{decode_long, encode_long_into};

use super::Handle;

const MAGIC: &[u8; 4] = b"RSLT";
const VERSION: u16 = 1;

/// Bytes before the column width table
const FIXED_SIZE: usize = 28;
const CRC_SIZE: usize = 4;

/// Allocator state and layout descriptor stored at offset 0
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Header {
    pub liveness: Liveness,
    pub overhead_bytes: u16,
    pub overhead_handles: u16,
    pub widths: Vec<u32>,
    pub free_head: Handle,
    pub used: u32,
    pub free: u32,
}

impl Header {
    pub fn size(&self) -> usize {
        Self::size_for(self.widths.len())
    }

    pub fn size_for(columns: usize) -> usize {
        FIXED_SIZE + 4 * columns + CRC_SIZE
    }

    /// Number of slots ever allocated
    pub fn all_count(&self) -> u32 {
        self.used + self.free
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut buf = vec![0u8; self.size()];
        buf[0..4].copy_from_slice(MAGIC);
        encode_long_into(&mut buf[4..6], VERSION as u64);
        buf[6] = self.liveness.to_byte();
        encode_long_into(&mut buf[8..10], self.overhead_bytes as u64);
        encode_long_into(&mut buf[10..12], self.overhead_handles as u64);
        encode_long_into(&mut buf[12..14], self.widths.len() as u64);
        self.free_head.encode_into(&mut buf[16..20]);
        encode_long_into(&mut buf[20..24], self.used as u64);
        encode_long_into(&mut buf[24..28], self.free as u64);
        for (i, width) in self.widths.iter().enumerate() {
            let at = FIXED_SIZE + 4 * i;
            encode_long_into(&mut buf[at..at + 4], *width as u64);
        }
        let crc_at = buf.len() - CRC_SIZE;
        let crc = crc32fast::hash(&buf[..crc_at]);
        encode_long_into(&mut buf[crc_at..], crc as u64);
        buf
    }

    /// Column count from the fixed part, to size the full header read
    pub fn column_count(fixed: &[u8]) -> Result<usize> {
        if fixed.len() < FIXED_SIZE || &fixed[0..4] != MAGIC {
            return Err(StoreError::CorruptRecord(format!(
                "invalid slotted file magic: {:?}",
                &fixed[..fixed.len().min(4)]
            )));
        }
        Ok(decode_long(&fixed[12..14]) as usize)
    }

    pub fn fixed_size() -> usize {
        FIXED_SIZE
    }

    pub fn decode(buf: &[u8]) -> Result<Self> {
        let columns = Self::column_count(buf)?;
        if buf.len() != Self::size_for(columns) {
            return Err(StoreError::CorruptRecord(format!(
                "header is {} bytes, expected {}",
                buf.len(),
                Self::size_for(columns)
            )));
        }

        let crc_at = buf.len() - CRC_SIZE;
        let stored = decode_long(&buf[crc_at..]) as u32;
        let actual = crc32fast::hash(&buf[..crc_at]);
        if stored != actual {
            return Err(StoreError::CorruptRecord(format!(
                "header checksum mismatch: stored {:08x}, computed {:08x}",
                stored, actual
            )));
        }

        let version = decode_long(&buf[4..6]) as u16;
        if version != VERSION {
            return Err(StoreError::CorruptRecord(format!(
                "unsupported slotted file version {}",
                version
            )));
        }
        let liveness = Liveness::from_byte(buf[6]).ok_or_else(|| {
            StoreError::CorruptRecord(format!("unknown liveness encoding {}", buf[6]))
        })?;

        let widths = (0..columns)
            .map(|i| {
                let at = FIXED_SIZE + 4 * i;
                decode_long(&buf[at..at + 4]) as u32
            })
            .collect();

        Ok(Self {
            liveness,
            overhead_bytes: decode_long(&buf[8..10]) as u16,
            overhead_handles: decode_long(&buf[10..12]) as u16,
            widths,
            free_head: Handle::decode(&buf[16..20]),
            used: decode_long(&buf[20..24]) as u32,
            free: decode_long(&buf[24..28]) as u32,
        })
    }
}
