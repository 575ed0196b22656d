//! Memory-backed random access

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::Result;

use super::{eof, RandomAccess};

/// Random access over a shared in-memory buffer.
///
/// Clones share the same bytes, so a test can keep one handle to inspect what
/// reached the store while another is owned by a structure under test.
#[derive(Debug, Clone, Default)]
pub struct MemoryAccess {
    data: Arc<Mutex<Vec<u8>>>,
    fail_writes: Arc<AtomicBool>,
}

impl MemoryAccess {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self {
            data: Arc::new(Mutex::new(bytes)),
            fail_writes: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Copy of the current contents
    pub fn contents(&self) -> Vec<u8> {
        self.data.lock().clone()
    }

    /// Make every following write (and sync) fail with an I/O error
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    fn check_writable(&self) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(std::io::Error::new(
                std::io::ErrorKind::Other,
                "memory store is set to fail writes",
            )
            .into());
        }
        Ok(())
    }
}

impl RandomAccess for MemoryAccess {
    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<()> {
        let data = self.data.lock();
        let end = offset as usize + buf.len();
        if end > data.len() {
            return Err(eof(offset, buf.len(), data.len() as u64));
        }
        buf.copy_from_slice(&data[offset as usize..end]);
        Ok(())
    }

    fn write_at(&mut self, offset: u64, buf: &[u8]) -> Result<()> {
        self.check_writable()?;
        let mut data = self.data.lock();
        let end = offset as usize + buf.len();
        if end > data.len() {
            data.resize(end, 0);
        }
        data[offset as usize..end].copy_from_slice(buf);
        Ok(())
    }

    fn length(&self) -> Result<u64> {
        Ok(self.data.lock().len() as u64)
    }

    fn set_length(&mut self, len: u64) -> Result<()> {
        self.check_writable()?;
        self.data.lock().resize(len as usize, 0);
        Ok(())
    }

    fn sync(&mut self) -> Result<()> {
        self.check_writable()
    }
}
