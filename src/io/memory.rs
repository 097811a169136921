use super::{Capabilities, RandomAccess, Storage};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::sync::{Arc, Mutex, MutexGuard};

/// Archive held in a shared in-memory buffer.
///
/// Clones share the same bytes, so a caller can keep one clone to inspect
/// what the engine wrote through another.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    data: Arc<Mutex<Vec<u8>>>,
    capabilities: Capabilities,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            data: Arc::new(Mutex::new(bytes.into())),
            capabilities: Capabilities::READ_WRITE,
        }
    }

    /// Restrict what this store reports it can do.
    pub fn with_capabilities(mut self, capabilities: Capabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    /// Snapshot of the current bytes.
    pub fn to_vec(&self) -> Vec<u8> {
        lock(&self.data).map(|d| d.clone()).unwrap_or_default()
    }

    pub fn len(&self) -> u64 {
        lock(&self.data).map(|d| d.len() as u64).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn lock(data: &Mutex<Vec<u8>>) -> io::Result<MutexGuard<'_, Vec<u8>>> {
    data.lock()
        .map_err(|_| io::Error::other("memory store lock poisoned"))
}

/// Cursor over a [`MemoryStore`]'s shared buffer.
#[derive(Debug)]
pub struct MemoryHandle {
    data: Arc<Mutex<Vec<u8>>>,
    pos: u64,
    writable: bool,
}

impl Read for MemoryHandle {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let data = lock(&self.data)?;
        let start = (self.pos as usize).min(data.len());
        let n = buf.len().min(data.len() - start);
        buf[..n].copy_from_slice(&data[start..start + n]);
        self.pos += n as u64;
        Ok(n)
    }
}

impl Write for MemoryHandle {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if !self.writable {
            return Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                "memory handle opened for reading",
            ));
        }
        let mut data = lock(&self.data)?;
        let start = self.pos as usize;
        let end = start + buf.len();
        if data.len() < end {
            data.resize(end, 0);
        }
        data[start..end].copy_from_slice(buf);
        self.pos = end as u64;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Seek for MemoryHandle {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let len = lock(&self.data)?.len() as i64;
        let target = match pos {
            SeekFrom::Start(n) => n as i64,
            SeekFrom::End(n) => len + n,
            SeekFrom::Current(n) => self.pos as i64 + n,
        };
        if target < 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "seek before start of buffer",
            ));
        }
        self.pos = target as u64;
        Ok(self.pos)
    }
}

impl RandomAccess for MemoryHandle {
    fn set_len(&mut self, len: u64) -> io::Result<()> {
        if !self.writable {
            return Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                "memory handle opened for reading",
            ));
        }
        lock(&self.data)?.resize(len as usize, 0);
        Ok(())
    }

    fn len(&mut self) -> io::Result<u64> {
        Ok(lock(&self.data)?.len() as u64)
    }
}

impl Storage for MemoryStore {
    type Handle = MemoryHandle;

    fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    fn open_read(&self) -> io::Result<MemoryHandle> {
        Ok(MemoryHandle {
            data: Arc::clone(&self.data),
            pos: 0,
            writable: false,
        })
    }

    fn open_write(&self) -> io::Result<MemoryHandle> {
        Ok(MemoryHandle {
            data: Arc::clone(&self.data),
            pos: 0,
            writable: true,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_store_is_read_write() {
        assert_eq!(Capabilities::default(), Capabilities::READ_WRITE);
        assert_eq!(MemoryStore::new().capabilities(), Capabilities::READ_WRITE);
    }

    #[test]
    fn writes_past_end_extend_the_buffer() {
        let store = MemoryStore::new();
        let mut handle = store.open_write().unwrap();
        handle.seek(SeekFrom::Start(3)).unwrap();
        handle.write_all(b"ab").unwrap();
        assert_eq!(store.to_vec(), vec![0, 0, 0, b'a', b'b']);
    }

    #[test]
    fn read_handle_refuses_writes() {
        let store = MemoryStore::from_bytes(b"abc".to_vec());
        let mut handle = store.open_read().unwrap();
        assert!(handle.write_all(b"x").is_err());
        assert!(handle.set_len(0).is_err());
    }

    #[test]
    fn set_len_truncates() {
        let store = MemoryStore::from_bytes(b"abcdef".to_vec());
        let mut handle = store.open_write().unwrap();
        handle.set_len(2).unwrap();
        assert_eq!(store.to_vec(), b"ab");

        let mut buf = Vec::new();
        store.open_read().unwrap().read_to_end(&mut buf).unwrap();
        assert_eq!(buf, b"ab");
    }
}
