//! I/O Module
//!
//! Random-access byte stores and the write buffer layered over them.
//!
//! ## Responsibilities
//! - Abstract positional read/write over files and memory
//! - Batch small writes, merging adjacent ranges, until a size or age
//!   threshold is crossed or `commit()` is called
//! - Serve reads through pending writes (read-your-writes)

mod buffer;
mod file;
mod memory;

pub use buffer::BufferedAccess;
pub use file::FileAccess;
pub use memory::MemoryAccess;

use crate::error::Result;

/// Positional byte store. Implementations are used by one owner at a time;
/// callers wrap them in a lock when sharing.
pub trait RandomAccess: Send {
    /// Fill `buf` from `offset`; reading past the end is an error
    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<()>;

    /// Write all of `buf` at `offset`, extending the store if needed
    fn write_at(&mut self, offset: u64, buf: &[u8]) -> Result<()>;

    /// Current length in bytes
    fn length(&self) -> Result<u64>;

    /// Grow (zero-filled) or truncate to `len` bytes
    fn set_length(&mut self, len: u64) -> Result<()>;

    /// Make previous writes durable
    fn sync(&mut self) -> Result<()>;
}

impl<A: RandomAccess + ?Sized> RandomAccess for Box<A> {
    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<()> {
        (**self).read_at(offset, buf)
    }

    fn write_at(&mut self, offset: u64, buf: &[u8]) -> Result<()> {
        (**self).write_at(offset, buf)
    }

    fn length(&self) -> Result<u64> {
        (**self).length()
    }

    fn set_length(&mut self, len: u64) -> Result<()> {
        (**self).set_length(len)
    }

    fn sync(&mut self) -> Result<()> {
        (**self).sync()
    }
}

/// Error for a read that runs past the end of a store
pub(crate) fn eof(offset: u64, len: usize, length: u64) -> crate::error::StoreError {
    std::io::Error::new(
        std::io::ErrorKind::UnexpectedEof,
        format!(
            "read of {} bytes at offset {} past end of store ({} bytes)",
            len, offset, length
        ),
    )
    .into()
}
