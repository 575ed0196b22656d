//! Node: in-memory copy of one slot

use crate::error::{Result, StoreError};

use super::{Handle, SlotLayout, HANDLE_SIZE};

/// A slot read from a [`super::SlottedFile`].
///
/// Overhead (flag bytes + handles) and payload are tracked dirty separately;
/// `SlottedFile::write_node` writes back only the regions that changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    handle: Handle,
    overhead: Vec<u8>,
    handles: Vec<Handle>,
    payload: Vec<u8>,
    overhead_dirty: bool,
    payload_dirty: bool,
}

impl Node {
    pub(crate) fn from_slot(handle: Handle, layout: &SlotLayout, slot: &[u8]) -> Self {
        let overhead = slot[..layout.overhead_bytes].to_vec();
        let handles = (0..layout.overhead_handles)
            .map(|i| Handle::decode(&slot[layout.handle_position(i)..]))
            .collect();
        let payload = slot[layout.overhead_size()..].to_vec();
        Self {
            handle,
            overhead,
            handles,
            payload,
            overhead_dirty: false,
            payload_dirty: false,
        }
    }

    /// Overhead region as stored on disk
    pub(crate) fn encode_overhead(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.overhead.len() + self.handles.len() * HANDLE_SIZE);
        buf.extend_from_slice(&self.overhead);
        for handle in &self.handles {
            let at = buf.len();
            buf.resize(at + HANDLE_SIZE, 0);
            handle.encode_into(&mut buf[at..]);
        }
        buf
    }

    pub fn handle(&self) -> Handle {
        self.handle
    }

    pub fn overhead_byte(&self, i: usize) -> u8 {
        self.overhead[i]
    }

    pub fn set_overhead_byte(&mut self, i: usize, value: u8) {
        self.overhead[i] = value;
        self.overhead_dirty = true;
    }

    /// Overhead handle `i`
    pub fn ohhandle(&self, i: usize) -> Handle {
        self.handles[i]
    }

    pub fn set_ohhandle(&mut self, i: usize, handle: Handle) {
        self.handles[i] = handle;
        self.overhead_dirty = true;
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn into_payload(self) -> Vec<u8> {
        self.payload
    }

    /// Replace the whole payload; the length must equal the row width
    pub fn set_payload(&mut self, payload: &[u8]) -> Result<()> {
        if payload.len() != self.payload.len() {
            return Err(StoreError::length(
                "node payload",
                self.payload.len(),
                payload.len(),
            ));
        }
        self.payload.copy_from_slice(payload);
        self.payload_dirty = true;
        Ok(())
    }

    pub fn is_overhead_dirty(&self) -> bool {
        self.overhead_dirty
    }

    pub fn is_payload_dirty(&self) -> bool {
        self.payload_dirty
    }

    pub(crate) fn mark_clean(&mut self) {
        self.overhead_dirty = false;
        self.payload_dirty = false;
    }
}
