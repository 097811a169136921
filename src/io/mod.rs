mod local;
mod memory;

pub use local::LocalFile;
pub use memory::{MemoryHandle, MemoryStore};

use std::io::{self, Read, Seek, SeekFrom, Write};
use std::sync::{Arc, Mutex};

/// A positioned handle onto the bytes of an archive.
pub trait RandomAccess: Read + Write + Seek + Send {
    /// Truncate or extend the underlying data to exactly `len` bytes.
    fn set_len(&mut self, len: u64) -> io::Result<()>;

    /// Total length of the underlying data.
    fn len(&mut self) -> io::Result<u64> {
        let pos = self.stream_position()?;
        let end = self.seek(SeekFrom::End(0))?;
        if pos != end {
            self.seek(SeekFrom::Start(pos))?;
        }
        Ok(end)
    }
}

/// What a backing store is able to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    pub random_read: bool,
    pub random_write: bool,
}

impl Capabilities {
    pub const READ_WRITE: Self = Self {
        random_read: true,
        random_write: true,
    };

    pub const READ_ONLY: Self = Self {
        random_read: true,
        random_write: false,
    };
}

impl Default for Capabilities {
    fn default() -> Self {
        Capabilities::READ_WRITE
    }
}

/// Source of handles onto an archive's bytes.
///
/// The engine asks for a fresh handle at the start of every top-level call
/// and drops it before returning, so implementations must not rely on a
/// handle staying open between calls.
pub trait Storage: Send + Sync {
    type Handle: RandomAccess;

    fn capabilities(&self) -> Capabilities;

    /// Open a handle for reading.
    fn open_read(&self) -> io::Result<Self::Handle>;

    /// Open a handle for reading and writing, creating the data if missing.
    fn open_write(&self) -> io::Result<Self::Handle>;
}

/// A handle shared between several readers.
///
/// Every seek+read pair runs under the lock, so readers positioned at
/// different offsets never observe each other's seeks.
pub struct SharedHandle<H> {
    inner: Arc<Mutex<H>>,
}

impl<H> Clone for SharedHandle<H> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<H: Read + Seek> SharedHandle<H> {
    pub fn new(handle: H) -> Self {
        Self {
            inner: Arc::new(Mutex::new(handle)),
        }
    }

    /// Read into `buf` starting at `offset`. Returns the number of bytes read.
    pub fn read_at(&self, offset: u64, buf: &mut [u8]) -> io::Result<usize> {
        let mut handle = self
            .inner
            .lock()
            .map_err(|_| io::Error::other("archive handle lock poisoned"))?;
        handle.seek(SeekFrom::Start(offset))?;
        handle.read(buf)
    }

    /// Fill `buf` from `offset`, failing with `UnexpectedEof` if the data
    /// ends first.
    pub fn read_exact_at(&self, mut offset: u64, mut buf: &mut [u8]) -> io::Result<()> {
        while !buf.is_empty() {
            let n = self.read_at(offset, buf)?;
            if n == 0 {
                return Err(io::ErrorKind::UnexpectedEof.into());
            }
            offset += n as u64;
            buf = &mut buf[n..];
        }
        Ok(())
    }
}
