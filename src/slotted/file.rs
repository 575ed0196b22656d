//! Slotted File
//!
//! Record allocator over a random-access store.

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::config::{Config, Liveness};
use crate::error::{Result, StoreError};
use crate::io::{BufferedAccess, FileAccess, RandomAccess};
use crate::row::{RowEntry, RowSchema};

use super::{Handle, Header, Node, SlotLayout, DELETED_FLAG};

/// Fixed-size record slots with free-list reuse.
///
/// ## Record lifecycle
/// `FREE → ALLOCATED → (written any number of times) → DELETED → FREE`.
/// Deleted slots are pushed onto the free list and handed out again by
/// `new_record`; the file never shrinks.
///
/// ## Concurrency
/// The free-list head, the used/free counters and the file length form one
/// unit of allocator state. All of it, together with the write buffer, sits
/// behind a single `Mutex`, and allocate/delete hold it for their whole
/// read-modify-write sequence.
///
/// ## Durability
/// Writes go through a [`BufferedAccess`]; they are visible to subsequent
/// reads at once and durable after `commit()`.
pub struct SlottedFile<A: RandomAccess> {
    schema: Arc<RowSchema>,
    layout: SlotLayout,
    liveness: Liveness,
    state: Mutex<FileState<A>>,
}

struct FileState<A: RandomAccess> {
    io: BufferedAccess<A>,
    header: Header,
}

impl SlottedFile<FileAccess> {
    /// Create (or truncate) a slotted file at `path`
    pub fn create_file(path: &Path, schema: Arc<RowSchema>, config: &Config) -> Result<Self> {
        Self::create(FileAccess::open(path)?, schema, config)
    }

    /// Open an existing slotted file at `path`
    pub fn open_file(path: &Path, schema: Arc<RowSchema>, config: &Config) -> Result<Self> {
        Self::open(FileAccess::open_existing(path)?, schema, config)
    }

    /// Open `path`, creating it when missing or empty
    pub fn open_or_create_file(
        path: &Path,
        schema: Arc<RowSchema>,
        config: &Config,
    ) -> Result<Self> {
        Self::open_or_create(FileAccess::open(path)?, schema, config)
    }

    /// Column widths recorded in the header of the file at `path`
    pub fn column_widths(path: &Path) -> Result<Vec<usize>> {
        let mut access = FileAccess::open_existing(path)?;
        let header = Self::read_header(&mut access)?;
        Ok(header.widths.iter().map(|&w| w as usize).collect())
    }
}

impl<A: RandomAccess> SlottedFile<A> {
    /// Initialize an empty slotted file in `access`, discarding old contents
    pub fn create(mut access: A, schema: Arc<RowSchema>, config: &Config) -> Result<Self> {
        config.validate()?;
        access.set_length(0)?;

        let header = Header {
            liveness: config.liveness,
            // Both counts are range-checked by `validate`
            overhead_bytes: config.overhead_bytes as u16,
            overhead_handles: config.overhead_handles as u16,
            widths: schema.columns().iter().map(|c| c.width as u32).collect(),
            free_head: Handle::NUL,
            used: 0,
            free: 0,
        };
        let mut io = BufferedAccess::with_config(access, config);
        io.write(0, &header.encode())?;
        io.commit()?;

        tracing::debug!(
            columns = schema.column_count(),
            objectsize = schema.objectsize(),
            "created slotted file"
        );
        Ok(Self::assemble(schema, header, io))
    }

    /// Open an initialized slotted file; its widths must match `schema`
    pub fn open(mut access: A, schema: Arc<RowSchema>, config: &Config) -> Result<Self> {
        let length = access.length()?;
        let header = Self::read_header(&mut access)?;

        let widths: Vec<u32> = schema.columns().iter().map(|c| c.width as u32).collect();
        if widths != header.widths {
            return Err(StoreError::SchemaMismatch(format!(
                "file column widths {:?} do not match schema widths {:?}",
                header.widths, widths
            )));
        }

        let io = BufferedAccess::with_config(access, config);
        let file = Self::assemble(schema, header, io);

        let expected = file.layout.header_size as u64
            + file.all_count() as u64 * file.layout.slot_size() as u64;
        if length < expected {
            tracing::warn!(length, expected, "slotted file shorter than its header claims");
            return Err(StoreError::CorruptRecord(format!(
                "file holds {} bytes but {} slots need {}",
                length,
                file.all_count(),
                expected
            )));
        }

        tracing::debug!(
            used = file.size(),
            free = file.free(),
            "opened slotted file"
        );
        Ok(file)
    }

    pub fn open_or_create(access: A, schema: Arc<RowSchema>, config: &Config) -> Result<Self> {
        if access.length()? == 0 {
            Self::create(access, schema, config)
        } else {
            Self::open(access, schema, config)
        }
    }

    fn read_header(access: &mut A) -> Result<Header> {
        let length = access.length()?;
        if length < Header::fixed_size() as u64 {
            return Err(StoreError::CorruptRecord(format!(
                "store of {} bytes is too short for a slotted file header",
                length
            )));
        }
        let mut fixed = vec![0u8; Header::fixed_size()];
        access.read_at(0, &mut fixed)?;
        let columns = Header::column_count(&fixed)?;
        let mut raw = vec![0u8; Header::size_for(columns)];
        access.read_at(0, &mut raw)?;
        Header::decode(&raw)
    }

    fn assemble(schema: Arc<RowSchema>, header: Header, io: BufferedAccess<A>) -> Self {
        let layout = SlotLayout {
            overhead_bytes: header.overhead_bytes as usize,
            overhead_handles: header.overhead_handles as usize,
            objectsize: schema.objectsize(),
            header_size: header.size(),
        };
        Self {
            schema,
            layout,
            liveness: header.liveness,
            state: Mutex::new(FileState { io, header }),
        }
    }

    // =========================================================================
    // Allocation
    // =========================================================================

    /// Allocate a record, reusing the free-list head when there is one.
    /// The payload is `initial` or zero-filled.
    pub fn new_record(&self, initial: Option<&[u8]>) -> Result<Handle> {
        if let Some(bytes) = initial {
            self.check_payload(bytes)?;
        }

        let mut state = self.state.lock();
        let mut header = state.header.clone();

        let handle = if header.free > 0 {
            let head = header.free_head;
            let all_count = header.all_count();
            if head.is_nul() || head.index() >= all_count {
                return Err(self.corrupt(format!(
                    "free count is {} but free-list head is {}",
                    header.free, head
                )));
            }
            let slot = Self::read_slot(&mut state.io, &self.layout, head)?;
            if self.layout.is_live(self.liveness, &slot) {
                return Err(self.corrupt(format!("free-list head {} is a live record", head)));
            }
            let next = Handle::decode(&slot[self.layout.handle_position(0)..]);
            if next == head || (!next.is_nul() && next.index() >= all_count) {
                return Err(self.corrupt(format!(
                    "free-list entry {} points to invalid successor {}",
                    head, next
                )));
            }
            header.free_head = next;
            header.free -= 1;
            head
        } else {
            let index = header.all_count();
            if index > Handle::MAX_INDEX {
                return Err(StoreError::Config(
                    "slotted file has no handles left".to_string(),
                ));
            }
            Handle::new(index)
        };
        header.used += 1;

        let mut slot = vec![0u8; self.layout.slot_size()];
        for i in 0..self.layout.overhead_handles {
            Handle::NUL.encode_into(&mut slot[self.layout.handle_position(i)..]);
        }
        if let Some(bytes) = initial {
            slot[self.layout.overhead_size()..].copy_from_slice(bytes);
        }

        let encoded = header.encode();
        state.io.write_group(&[
            (self.layout.slot_offset(handle), slot.as_slice()),
            (0, encoded.as_slice()),
        ])?;
        state.header = header;
        Ok(handle)
    }

    /// Mark `handle` deleted and push it onto the free list
    pub fn delete_node(&self, handle: Handle) -> Result<()> {
        let mut state = self.state.lock();
        let mut header = state.header.clone();
        Self::check_range(&header, handle)?;

        let mut slot = Self::read_slot(&mut state.io, &self.layout, handle)?;
        if !self.layout.is_live(self.liveness, &slot) {
            return Err(StoreError::InvalidHandle {
                handle: handle.index(),
                all_count: header.all_count(),
            });
        }

        let payload_at = self.layout.overhead_size();
        match self.liveness {
            Liveness::Tombstone => slot[0] |= DELETED_FLAG,
            Liveness::Legacy => {
                if self.layout.objectsize > 1 {
                    slot[payload_at] = 0x80;
                    slot[payload_at + 1] = 0;
                } else {
                    slot[payload_at] = 0;
                }
            }
        }
        header
            .free_head
            .encode_into(&mut slot[self.layout.handle_position(0)..]);

        header.free_head = handle;
        header.free += 1;
        header.used -= 1;

        // Overhead region plus the first two payload bytes
        let touched = (payload_at + 2).min(slot.len());
        let encoded = header.encode();
        state.io.write_group(&[
            (self.layout.slot_offset(handle), &slot[..touched]),
            (0, encoded.as_slice()),
        ])?;
        state.header = header;
        Ok(())
    }

    // =========================================================================
    // Record Access
    // =========================================================================

    /// Read the raw slot behind `handle`
    pub fn read_node(&self, handle: Handle) -> Result<Node> {
        let mut state = self.state.lock();
        Self::check_range(&state.header, handle)?;
        let slot = Self::read_slot(&mut state.io, &self.layout, handle)?;
        Ok(Node::from_slot(handle, &self.layout, &slot))
    }

    /// Write back the dirty regions of `node`.
    ///
    /// With tombstone liveness the target must be live and the node must not
    /// carry the deleted flag; deletion goes through `delete_node` only.
    /// With legacy liveness a dirty payload must read as live and the target
    /// must not carry the deleted marker of a freed slot.
    pub fn write_node(&self, node: &mut Node) -> Result<()> {
        if !node.is_overhead_dirty() && !node.is_payload_dirty() {
            return Ok(());
        }
        let handle = node.handle();
        if self.liveness == Liveness::Legacy && node.is_payload_dirty() {
            self.check_legacy_payload(node.payload())?;
        }
        let mut state = self.state.lock();
        Self::check_range(&state.header, handle)?;

        if self.liveness == Liveness::Legacy && self.layout.objectsize > 1 {
            let mut marker = [0u8; 2];
            state.io.read(self.layout.payload_offset(handle), &mut marker)?;
            if marker == [0x80, 0x00] {
                return Err(StoreError::InvalidHandle {
                    handle: handle.index(),
                    all_count: state.header.all_count(),
                });
            }
        }

        if self.liveness == Liveness::Tombstone {
            let mut flag = [0u8; 1];
            state.io.read(self.layout.slot_offset(handle), &mut flag)?;
            if flag[0] & DELETED_FLAG != 0 {
                return Err(StoreError::InvalidHandle {
                    handle: handle.index(),
                    all_count: state.header.all_count(),
                });
            }
            if self.layout.overhead_bytes > 0 && node.overhead_byte(0) & DELETED_FLAG != 0 {
                return Err(self.corrupt(format!(
                    "node {} would set the deleted flag outside delete_node",
                    handle
                )));
            }
        }

        let overhead = node.encode_overhead();
        let mut writes: Vec<(u64, &[u8])> = Vec::with_capacity(2);
        if node.is_overhead_dirty() {
            writes.push((self.layout.slot_offset(handle), overhead.as_slice()));
        }
        if node.is_payload_dirty() {
            writes.push((self.layout.payload_offset(handle), node.payload()));
        }
        state.io.write_group(&writes)?;
        node.mark_clean();
        Ok(())
    }

    /// Payload of a live record as a row
    pub fn read_row(&self, handle: Handle) -> Result<RowEntry> {
        let node = self.read_node(handle)?;
        let slot_live = match self.liveness {
            Liveness::Tombstone => node.overhead_byte(0) & DELETED_FLAG == 0,
            Liveness::Legacy => super::legacy_live(node.payload()),
        };
        if !slot_live {
            return Err(StoreError::InvalidHandle {
                handle: handle.index(),
                all_count: self.all_count(),
            });
        }
        RowEntry::from_vec(Arc::clone(&self.schema), node.into_payload())
    }

    /// Overwrite the payload of `handle` with `row`
    pub fn write_row(&self, handle: Handle, row: &RowEntry) -> Result<()> {
        self.check_payload(row.bytes())?;
        let mut node = self.read_node(handle)?;
        node.set_payload(row.bytes())?;
        self.write_node(&mut node)
    }

    pub fn is_live(&self, handle: Handle) -> Result<bool> {
        let mut state = self.state.lock();
        Self::check_range(&state.header, handle)?;
        let slot = Self::read_slot(&mut state.io, &self.layout, handle)?;
        Ok(self.layout.is_live(self.liveness, &slot))
    }

    /// Handles of all live records, in handle order
    pub fn live_handles(&self) -> Result<Vec<Handle>> {
        let mut state = self.state.lock();
        let all_count = state.header.all_count();
        let mut live = Vec::with_capacity(state.header.used as usize);
        for index in 0..all_count {
            let handle = Handle::new(index);
            let slot = Self::read_slot(&mut state.io, &self.layout, handle)?;
            if self.layout.is_live(self.liveness, &slot) {
                live.push(handle);
            }
        }
        Ok(live)
    }

    /// Walk the free list and check it against the header counters, then
    /// check the number of live slots against the used counter.
    ///
    /// Under legacy liveness a slot allocated blank is in use but not yet
    /// live, so only `live <= used` is required there.
    pub fn verify_free_list(&self) -> Result<()> {
        let mut state = self.state.lock();
        let header = state.header.clone();
        let mut seen = HashSet::new();
        let mut current = header.free_head;

        while !current.is_nul() {
            Self::check_range(&header, current).map_err(|_| {
                self.corrupt(format!("free list leads to out-of-range handle {}", current))
            })?;
            if !seen.insert(current) {
                return Err(self.corrupt(format!("free list cycles at {}", current)));
            }
            let slot = Self::read_slot(&mut state.io, &self.layout, current)?;
            if self.layout.is_live(self.liveness, &slot) {
                return Err(self.corrupt(format!("free list contains live record {}", current)));
            }
            current = Handle::decode(&slot[self.layout.handle_position(0)..]);
        }

        if seen.len() != header.free as usize {
            return Err(self.corrupt(format!(
                "free list holds {} slots but the header counts {}",
                seen.len(),
                header.free
            )));
        }

        let mut live = 0u32;
        for index in 0..header.all_count() {
            let slot = Self::read_slot(&mut state.io, &self.layout, Handle::new(index))?;
            if self.layout.is_live(self.liveness, &slot) {
                live += 1;
            }
        }
        let consistent = match self.liveness {
            Liveness::Tombstone => live == header.used,
            Liveness::Legacy => live <= header.used,
        };
        if !consistent {
            return Err(self.corrupt(format!(
                "{} live slots but the header counts {} in use",
                live, header.used
            )));
        }
        Ok(())
    }

    // =========================================================================
    // Durability
    // =========================================================================

    /// Push buffered writes to the store and sync it
    pub fn commit(&self) -> Result<()> {
        self.state.lock().io.commit()
    }

    pub fn close(&self) -> Result<()> {
        self.commit()
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// Slots ever allocated (live + free)
    pub fn all_count(&self) -> u32 {
        self.state.lock().header.all_count()
    }

    /// Live records
    pub fn size(&self) -> u32 {
        self.state.lock().header.used
    }

    /// Slots on the free list
    pub fn free(&self) -> u32 {
        self.state.lock().header.free
    }

    pub fn schema(&self) -> &Arc<RowSchema> {
        &self.schema
    }

    pub fn layout(&self) -> SlotLayout {
        self.layout
    }

    pub fn liveness(&self) -> Liveness {
        self.liveness
    }

    pub fn pending_bytes(&self) -> usize {
        self.state.lock().io.pending_bytes()
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    fn read_slot(io: &mut BufferedAccess<A>, layout: &SlotLayout, handle: Handle) -> Result<Vec<u8>> {
        let mut slot = vec![0u8; layout.slot_size()];
        io.read(layout.slot_offset(handle), &mut slot)?;
        Ok(slot)
    }

    fn check_range(header: &Header, handle: Handle) -> Result<()> {
        if handle.is_nul() || handle.index() >= header.all_count() {
            return Err(StoreError::InvalidHandle {
                handle: handle.index(),
                all_count: header.all_count(),
            });
        }
        Ok(())
    }

    fn check_payload(&self, bytes: &[u8]) -> Result<()> {
        if bytes.len() != self.layout.objectsize {
            return Err(StoreError::length(
                "record payload",
                self.layout.objectsize,
                bytes.len(),
            ));
        }
        if self.liveness == Liveness::Legacy {
            self.check_legacy_payload(bytes)?;
        }
        Ok(())
    }

    /// Legacy liveness reads a payload starting `0x00` or `0x80 0x00` as
    /// deleted, so such rows cannot be stored
    fn check_legacy_payload(&self, bytes: &[u8]) -> Result<()> {
        if !super::legacy_live(bytes) {
            return Err(StoreError::SchemaMismatch(format!(
                "payload starting {:02x?} reads as deleted under legacy liveness",
                &bytes[..bytes.len().min(2)]
            )));
        }
        Ok(())
    }

    fn corrupt(&self, message: String) -> StoreError {
        tracing::warn!(%message, "slotted file corruption detected");
        StoreError::CorruptRecord(message)
    }
}

impl<A: RandomAccess> Drop for SlottedFile<A> {
    fn drop(&mut self) {
        let state = self.state.get_mut();
        if state.io.pending_chunks() == 0 {
            return;
        }
        if let Err(e) = state.io.flush() {
            tracing::warn!(error = %e, "dropping slotted file with unflushed writes");
        }
    }
}
