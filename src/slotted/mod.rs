//! Slotted File Module
//!
//! On-disk manager for fixed-size record slots with a free list.
//!
//! ## Responsibilities
//! - Map handles to fixed-size slots
//! - Allocate from the free list before growing the file
//! - Mark deleted slots and chain them onto the free list
//! - Keep allocator state (free head, used and free counts) in the header
//!
//! ## File Format
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │ Header (28 + 4 * columns + 4 bytes, big-endian)              │
//! │   Magic "RSLT" (4) | Version (2) | Liveness (1) | Rsvd (1)   │
//! │   OverheadBytes (2) | OverheadHandles (2) | Columns (2) |    │
//! │   Rsvd (2) | FreeHead (4) | Used (4) | Free (4)              │
//! │   ColumnWidth (4) ... repeated per column                    │
//! │   CRC32 of all preceding header bytes (4)                    │
//! ├──────────────────────────────────────────────────────────────┤
//! │ Slot 0                                                       │
//! │   [overhead bytes][overhead handles, 4 each][payload]        │
//! ├──────────────────────────────────────────────────────────────┤
//! │ Slot 1 ...                                                   │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! A deleted slot stores the previous free-list head in its first overhead
//! handle. The state of a slot is encoded per [`crate::config::Liveness`].

mod file;
mod header;
mod node;

use std::fmt;

pub use file::SlottedFile;
pub use node::Node;

pub(crate) use header::Header;

use crate::config::Liveness;
use crate::order::{decode_long, encode_long_into};

/// Bytes used to store one handle
pub const HANDLE_SIZE: usize = 4;

/// Bit in overhead byte 0 marking a deleted slot (tombstone liveness)
pub(crate) const DELETED_FLAG: u8 = 0x01;

/// Logical record number of a slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Handle(u32);

impl Handle {
    /// "No record"
    pub const NUL: Handle = Handle(u32::MAX);

    /// Largest index a slotted file hands out
    pub const MAX_INDEX: u32 = u32::MAX - 1;

    pub fn new(index: u32) -> Self {
        Handle(index)
    }

    pub fn index(self) -> u32 {
        self.0
    }

    pub fn is_nul(self) -> bool {
        self == Handle::NUL
    }

    pub(crate) fn encode_into(self, buf: &mut [u8]) {
        encode_long_into(&mut buf[..HANDLE_SIZE], self.0 as u64);
    }

    pub(crate) fn decode(buf: &[u8]) -> Self {
        Handle(decode_long(&buf[..HANDLE_SIZE]) as u32)
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_nul() {
            write!(f, "NUL")
        } else {
            write!(f, "#{}", self.0)
        }
    }
}

/// Byte geometry of slots in a file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotLayout {
    pub overhead_bytes: usize,
    pub overhead_handles: usize,
    pub objectsize: usize,
    pub header_size: usize,
}

impl SlotLayout {
    pub fn overhead_size(&self) -> usize {
        self.overhead_bytes + self.overhead_handles * HANDLE_SIZE
    }

    pub fn slot_size(&self) -> usize {
        self.overhead_size() + self.objectsize
    }

    pub fn slot_offset(&self, handle: Handle) -> u64 {
        self.header_size as u64 + handle.index() as u64 * self.slot_size() as u64
    }

    pub fn payload_offset(&self, handle: Handle) -> u64 {
        self.slot_offset(handle) + self.overhead_size() as u64
    }

    /// Offset of overhead handle `i` inside a slot
    pub fn handle_position(&self, i: usize) -> usize {
        self.overhead_bytes + i * HANDLE_SIZE
    }

    /// Whether a raw slot holds a live record
    pub fn is_live(&self, liveness: Liveness, slot: &[u8]) -> bool {
        match liveness {
            Liveness::Tombstone => slot[0] & DELETED_FLAG == 0,
            Liveness::Legacy => legacy_live(&slot[self.overhead_size()..]),
        }
    }
}

/// Payload-pattern liveness: first byte non-zero and not the `0x80 0x00`
/// deleted marker
pub(crate) fn legacy_live(payload: &[u8]) -> bool {
    match payload {
        [] | [0, ..] => false,
        [0x80, 0, ..] => false,
        _ => true,
    }
}
