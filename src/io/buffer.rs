//! Write buffer
//!
//! Coalesces writes in memory and pushes them to the underlying store in
//! offset order.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use bytes::BytesMut;

use crate::config::Config;
use crate::error::Result;

use super::{eof, RandomAccess};

/// Write-coalescing layer over a [`RandomAccess`] store.
///
/// ## Pending map
/// `offset → bytes`, sorted by offset. A new write is merged with every
/// pending chunk it overlaps or touches, so chunks in the map never touch
/// each other and each one becomes a single write call at flush time.
///
/// ## Flush triggers
/// Checked cooperatively on every read and write: pending bytes above
/// `max_bytes`, or pending data older than `timeout` since the last flush.
/// A failed flush keeps the pending map intact so it can be retried.
pub struct BufferedAccess<A> {
    inner: A,
    pending: BTreeMap<u64, BytesMut>,
    pending_bytes: usize,
    max_bytes: usize,
    timeout: Duration,
    last_flush: Instant,
}

impl<A: RandomAccess> BufferedAccess<A> {
    pub fn new(inner: A, max_bytes: usize, timeout: Duration) -> Self {
        Self {
            inner,
            pending: BTreeMap::new(),
            pending_bytes: 0,
            max_bytes,
            timeout,
            last_flush: Instant::now(),
        }
    }

    pub fn with_config(inner: A, config: &Config) -> Self {
        Self::new(
            inner,
            config.write_buffer_bytes,
            Duration::from_millis(config.flush_timeout_ms),
        )
    }

    /// Stage a write; visible to reads immediately, durable after `commit`
    pub fn write(&mut self, offset: u64, data: &[u8]) -> Result<()> {
        if !data.is_empty() {
            self.stage(offset, data);
        }
        self.maybe_flush()
    }

    /// Stage several writes as one unit. When the flush they trigger fails,
    /// every region is put back to its previous contents before the error is
    /// returned, so the caller sees either all of the writes or none.
    pub fn write_group(&mut self, writes: &[(u64, &[u8])]) -> Result<()> {
        let mut previous = Vec::with_capacity(writes.len());
        for &(offset, data) in writes {
            previous.push((offset, self.snapshot(offset, data.len())?));
        }
        for &(offset, data) in writes {
            if !data.is_empty() {
                self.stage(offset, data);
            }
        }
        if let Err(e) = self.maybe_flush() {
            for (offset, data) in previous.iter().rev() {
                if !data.is_empty() {
                    self.stage(*offset, data);
                }
            }
            return Err(e);
        }
        Ok(())
    }

    /// Read through pending writes
    pub fn read(&mut self, offset: u64, buf: &mut [u8]) -> Result<()> {
        self.maybe_flush()?;

        let end = offset + buf.len() as u64;
        let length = self.length()?;
        if end > length {
            return Err(eof(offset, buf.len(), length));
        }
        self.overlay(offset, buf)
    }

    /// Current contents of `len` bytes at `offset`, zero past the end
    fn snapshot(&mut self, offset: u64, len: usize) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; len];
        let length = self.length()?;
        if offset < length {
            let available = ((length - offset) as usize).min(len);
            self.overlay(offset, &mut buf[..available])?;
        }
        Ok(buf)
    }

    /// Fill `buf` from the store, then lay pending chunks over it
    fn overlay(&mut self, offset: u64, buf: &mut [u8]) -> Result<()> {
        let end = offset + buf.len() as u64;
        let inner_len = self.inner.length()?;
        let from_inner = if offset < inner_len {
            (inner_len.min(end) - offset) as usize
        } else {
            0
        };
        if from_inner > 0 {
            self.inner.read_at(offset, &mut buf[..from_inner])?;
        }
        buf[from_inner..].fill(0);

        for (&start, chunk) in self.pending.range(..end).rev() {
            let chunk_end = start + chunk.len() as u64;
            if chunk_end <= offset {
                break;
            }
            let lo = start.max(offset);
            let hi = chunk_end.min(end);
            buf[(lo - offset) as usize..(hi - offset) as usize]
                .copy_from_slice(&chunk[(lo - start) as usize..(hi - start) as usize]);
        }
        Ok(())
    }

    /// Write all pending chunks in offset order and sync the store
    pub fn commit(&mut self) -> Result<()> {
        self.flush()?;
        self.inner.sync()
    }

    /// Write all pending chunks in offset order. The map is cleared only once
    /// every chunk has been written.
    pub fn flush(&mut self) -> Result<()> {
        if self.pending.is_empty() {
            self.last_flush = Instant::now();
            return Ok(());
        }
        for (&offset, chunk) in &self.pending {
            self.inner.write_at(offset, chunk)?;
        }
        tracing::trace!(
            chunks = self.pending.len(),
            bytes = self.pending_bytes,
            "write buffer flushed"
        );
        self.pending.clear();
        self.pending_bytes = 0;
        self.last_flush = Instant::now();
        Ok(())
    }

    /// Length including pending writes past the end of the store
    pub fn length(&self) -> Result<u64> {
        let inner = self.inner.length()?;
        let pending_end = self
            .pending
            .iter()
            .next_back()
            .map(|(&start, chunk)| start + chunk.len() as u64)
            .unwrap_or(0);
        Ok(inner.max(pending_end))
    }

    pub fn pending_bytes(&self) -> usize {
        self.pending_bytes
    }

    pub fn pending_chunks(&self) -> usize {
        self.pending.len()
    }

    pub fn inner(&self) -> &A {
        &self.inner
    }

    /// Flush and hand back the store
    pub fn into_inner(mut self) -> Result<A> {
        self.flush()?;
        Ok(self.inner)
    }

    fn maybe_flush(&mut self) -> Result<()> {
        if self.pending.is_empty() {
            return Ok(());
        }
        if self.pending_bytes > self.max_bytes || self.last_flush.elapsed() >= self.timeout {
            self.flush()?;
        }
        Ok(())
    }

    /// Merge `data` at `offset` into the pending map
    fn stage(&mut self, offset: u64, data: &[u8]) {
        let end = offset + data.len() as u64;

        let touching: Vec<u64> = self
            .pending
            .range(..=end)
            .rev()
            .take_while(|(start, chunk)| **start + chunk.len() as u64 >= offset)
            .map(|(&start, _)| start)
            .collect();

        // Sequential append to the chunk that ends exactly here
        if let [start] = touching.as_slice() {
            let start = *start;
            if let Some(chunk) = self.pending.get_mut(&start) {
                if start + chunk.len() as u64 == offset {
                    chunk.extend_from_slice(data);
                    self.pending_bytes += data.len();
                    return;
                }
            }
        }

        let mut lo = offset;
        let mut hi = end;
        for start in &touching {
            if let Some(chunk) = self.pending.get(start) {
                lo = lo.min(*start);
                hi = hi.max(start + chunk.len() as u64);
            }
        }

        let mut merged = BytesMut::zeroed((hi - lo) as usize);
        for start in touching {
            if let Some(chunk) = self.pending.remove(&start) {
                self.pending_bytes -= chunk.len();
                let at = (start - lo) as usize;
                merged[at..at + chunk.len()].copy_from_slice(&chunk);
            }
        }
        let at = (offset - lo) as usize;
        merged[at..at + data.len()].copy_from_slice(data);
        self.pending_bytes += merged.len();
        self.pending.insert(lo, merged);
    }
}

impl<A: RandomAccess> RandomAccess for BufferedAccess<A> {
    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<()> {
        self.read(offset, buf)
    }

    fn write_at(&mut self, offset: u64, buf: &[u8]) -> Result<()> {
        self.write(offset, buf)
    }

    fn length(&self) -> Result<u64> {
        BufferedAccess::length(self)
    }

    fn set_length(&mut self, len: u64) -> Result<()> {
        self.flush()?;
        self.inner.set_length(len)
    }

    fn sync(&mut self) -> Result<()> {
        self.commit()
    }
}
