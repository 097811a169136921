//! The archive engine.
//!
//! A [`ZipArchive`] keeps the parsed central directory in memory and edits
//! the backing file in place. Every call opens its own handle from the
//! [`Storage`] and drops it before returning; nothing is held between calls
//! except the entry model itself.
//!
//! Mutating operations live next to this file: [`append`](super::append),
//! [`delete`](super::delete) and [`maintenance`](super::maintenance).

use encoding_rs::Encoding;
use flate2::Compression;
use std::collections::HashMap;
use std::io::{Seek, SeekFrom, Write};
use tracing::{debug, trace};

use crate::error::{ZipError, ZipResult};
use crate::io::{RandomAccess, SharedHandle, Storage};

use super::entry::{EntryInfo, ZipEntry};
use super::parser::{self, ParsedArchive};
use super::stream::{BoundedReader, Deflater, EntryReader};
use super::structures::LFH_SIZE;
use super::writer::{write_central_header, write_end_of_central_directory};

const COPY_CHUNK: usize = 64 * 1024;

/// Options applied when opening or creating an archive.
#[derive(Debug, Clone, Copy)]
pub struct OpenOptions {
    default_encoding: Option<&'static Encoding>,
    compression_level: u32,
}

impl Default for OpenOptions {
    fn default() -> Self {
        Self {
            default_encoding: None,
            compression_level: 6,
        }
    }
}

impl OpenOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode names without the UTF-8 flag with this encoding instead of
    /// guessing.
    pub fn default_encoding(mut self, encoding: Option<&'static Encoding>) -> Self {
        self.default_encoding = encoding;
        self
    }

    /// Deflate level for new entries, 0 to 9.
    pub fn compression_level(mut self, level: u32) -> Self {
        self.compression_level = level.min(9);
        self
    }

    pub fn open<S: Storage>(self, store: S) -> ZipResult<ZipArchive<S>> {
        ZipArchive::open_with(store, self)
    }

    pub fn create<S: Storage>(self, store: S) -> ZipResult<ZipArchive<S>> {
        ZipArchive::create_with(store, self)
    }
}

/// A ZIP archive backed by random-access storage.
#[derive(Debug)]
pub struct ZipArchive<S: Storage> {
    pub(crate) store: S,
    pub(crate) entries: Vec<ZipEntry>,
    pub(crate) index: HashMap<String, usize>,
    pub(crate) comment: String,
    pub(crate) raw_comment: Vec<u8>,
    pub(crate) cd_offset: u64,
    pub(crate) cd_size: u64,
    pub(crate) options: OpenOptions,
    pub(crate) deflater: Option<Deflater>,
}

impl<S: Storage> ZipArchive<S> {
    /// Open an existing archive with default options.
    pub fn open(store: S) -> ZipResult<Self> {
        Self::open_with(store, OpenOptions::default())
    }

    /// Write an empty archive to `store`, replacing whatever it held, and
    /// open it.
    pub fn create(store: S) -> ZipResult<Self> {
        Self::create_with(store, OpenOptions::default())
    }

    fn open_with(store: S, options: OpenOptions) -> ZipResult<Self> {
        if !store.capabilities().random_read {
            return Err(ZipError::MissingCapability("random read"));
        }

        let mut handle = store.open_read()?;
        let size = handle.len()?;
        let ParsedArchive {
            entries,
            comment,
            raw_comment,
            cd_offset,
            cd_size,
        } = parser::read_archive(&mut handle, size, options.default_encoding)?;
        drop(handle);

        let mut archive = Self {
            store,
            entries,
            index: HashMap::new(),
            comment,
            raw_comment,
            cd_offset,
            cd_size,
            options,
            deflater: None,
        };
        archive.rebuild_index();
        Ok(archive)
    }

    fn create_with(store: S, options: OpenOptions) -> ZipResult<Self> {
        let capabilities = store.capabilities();
        if !capabilities.random_write {
            return Err(ZipError::MissingCapability("random write"));
        }
        if !capabilities.random_read {
            return Err(ZipError::MissingCapability("random read"));
        }

        let mut handle = store.open_write()?;
        let mut eocd = Vec::new();
        write_end_of_central_directory(&mut eocd, 0, 0, 0, &[])?;
        handle.seek(SeekFrom::Start(0))?;
        handle.write_all(&eocd)?;
        handle.set_len(eocd.len() as u64)?;
        handle.flush()?;
        drop(handle);

        debug!("created empty archive");
        Self::open_with(store, options)
    }

    /// Entries in central directory order.
    pub fn entries(&self) -> &[ZipEntry] {
        &self.entries
    }

    /// Look up an entry by name. With duplicate names the last one wins.
    pub fn entry(&self, name: &str) -> Option<&ZipEntry> {
        self.index.get(name).map(|&i| &self.entries[i])
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The archive comment.
    pub fn comment(&self) -> &str {
        &self.comment
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Offset of the first central directory record.
    pub fn central_directory_offset(&self) -> u64 {
        self.cd_offset
    }

    pub fn central_directory_size(&self) -> u64 {
        self.cd_size
    }

    /// Open a reader over an entry's uncompressed content.
    ///
    /// The reader owns a fresh read handle. To read several entries through
    /// one handle, open a [`SharedHandle`] and use
    /// [`entry_reader_on`](Self::entry_reader_on).
    pub fn entry_reader(&self, name: &str) -> ZipResult<EntryReader<S::Handle>> {
        let handle = SharedHandle::new(self.store.open_read()?);
        self.entry_reader_on(&handle, name)
    }

    /// Like [`entry_reader`](Self::entry_reader), reading through a handle
    /// shared with other readers.
    pub fn entry_reader_on<H: std::io::Read + Seek>(
        &self,
        handle: &SharedHandle<H>,
        name: &str,
    ) -> ZipResult<EntryReader<H>> {
        let entry = self
            .entry(name)
            .ok_or_else(|| ZipError::EntryNotFound(name.to_string()))?;
        let info = entry_info(entry)?;
        let data_offset = resolve_data_offset(handle, info)?;

        trace!(name, data_offset, compressed_size = entry.compressed_size, "opening entry reader");
        let raw = BoundedReader::new(handle.clone(), data_offset, entry.compressed_size);
        Ok(EntryReader::new(entry.method, raw, entry.crc32, entry.size))
    }

    pub(crate) fn require_write(&self) -> ZipResult<()> {
        let capabilities = self.store.capabilities();
        if !capabilities.random_read {
            return Err(ZipError::MissingCapability("random read"));
        }
        if !capabilities.random_write {
            return Err(ZipError::MissingCapability("random write"));
        }
        Ok(())
    }

    pub(crate) fn compression(&self) -> Compression {
        Compression::new(self.options.compression_level)
    }

    pub(crate) fn rebuild_index(&mut self) {
        self.index.clear();
        for (i, entry) in self.entries.iter().enumerate() {
            self.index.insert(entry.name.clone(), i);
        }
    }

    /// Write the whole central directory at `at`, followed by a fresh EOCD,
    /// and cut the file right after it.
    pub(crate) fn write_central_directory(
        &mut self,
        handle: &mut S::Handle,
        at: u64,
    ) -> ZipResult<()> {
        let mut buf = Vec::new();
        for entry in self.entries.iter_mut() {
            let offset = at + buf.len() as u64;
            if let Some(info) = entry.info.as_mut() {
                info.central_header_offset = offset;
            }
            let len = write_central_header(&mut buf, entry)?;
            if let Some(info) = entry.info.as_mut() {
                info.central_header_len = len;
            }
        }
        let cd_size = buf.len() as u64;
        write_end_of_central_directory(&mut buf, self.entries.len(), at, cd_size, &self.raw_comment)?;

        handle.seek(SeekFrom::Start(at))?;
        handle.write_all(&buf)?;
        handle.set_len(at + buf.len() as u64)?;
        handle.flush()?;

        self.cd_offset = at;
        self.cd_size = cd_size;
        debug!(entries = self.entries.len(), cd_offset = at, cd_size, "wrote central directory");
        Ok(())
    }

    /// Write a fresh EOCD right after the current central directory and cut
    /// the file there.
    pub(crate) fn write_end_record(&self, handle: &mut S::Handle) -> ZipResult<()> {
        let at = self.cd_offset + self.cd_size;
        let mut buf = Vec::new();
        write_end_of_central_directory(
            &mut buf,
            self.entries.len(),
            self.cd_offset,
            self.cd_size,
            &self.raw_comment,
        )?;
        handle.seek(SeekFrom::Start(at))?;
        handle.write_all(&buf)?;
        handle.set_len(at + buf.len() as u64)?;
        handle.flush()?;
        Ok(())
    }
}

pub(crate) fn entry_info(entry: &ZipEntry) -> ZipResult<&EntryInfo> {
    entry
        .info
        .as_ref()
        .ok_or_else(|| ZipError::EntryNotFound(entry.name.clone()))
}

/// Data offset of an entry, reading its local header on first use.
pub(crate) fn resolve_data_offset<H: std::io::Read + Seek>(
    handle: &SharedHandle<H>,
    info: &EntryInfo,
) -> ZipResult<u64> {
    if let Some(offset) = info.data_offset() {
        return Ok(offset);
    }
    let mut lfh = [0u8; LFH_SIZE];
    handle.read_exact_at(info.header_offset, &mut lfh)?;
    let offset = parser::local_data_offset(info.header_offset, &lfh)?;
    let _ = info.data_offset.set(offset);
    Ok(offset)
}

/// Same as [`resolve_data_offset`] for a handle owned by the caller.
pub(crate) fn resolve_data_offset_with<H: RandomAccess>(
    handle: &mut H,
    info: &EntryInfo,
) -> ZipResult<u64> {
    if let Some(offset) = info.data_offset() {
        return Ok(offset);
    }
    let offset = parser::read_data_offset(handle, info.header_offset)?;
    let _ = info.data_offset.set(offset);
    Ok(offset)
}

/// Move `len` bytes from `src` down to `dst`. Regions may overlap as long
/// as `dst <= src`.
pub(crate) fn copy_within<H: RandomAccess>(
    handle: &mut H,
    src: u64,
    dst: u64,
    len: u64,
) -> ZipResult<()> {
    debug_assert!(dst <= src);
    if src == dst || len == 0 {
        return Ok(());
    }
    let mut buf = vec![0u8; COPY_CHUNK.min(len as usize)];
    let mut done = 0u64;
    while done < len {
        let n = buf.len().min((len - done) as usize);
        handle.seek(SeekFrom::Start(src + done))?;
        handle.read_exact(&mut buf[..n])?;
        handle.seek(SeekFrom::Start(dst + done))?;
        handle.write_all(&buf[..n])?;
        done += n as u64;
    }
    Ok(())
}

/// Overwrite `len` bytes at `start` with zeros.
pub(crate) fn zero_fill<H: RandomAccess>(handle: &mut H, start: u64, len: u64) -> ZipResult<()> {
    let zeros = vec![0u8; COPY_CHUNK.min(len as usize)];
    let mut done = 0u64;
    handle.seek(SeekFrom::Start(start))?;
    while done < len {
        let n = zeros.len().min((len - done) as usize);
        handle.write_all(&zeros[..n])?;
        done += n as u64;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::{Capabilities, MemoryStore};
    use std::io::Read;

    #[test]
    fn create_writes_lone_eocd() {
        let store = MemoryStore::new();
        let archive = ZipArchive::create(store.clone()).unwrap();
        assert!(archive.is_empty());
        assert_eq!(archive.central_directory_offset(), 0);
        assert_eq!(store.len(), 22);
        assert_eq!(&store.to_vec()[0..4], b"PK\x05\x06");
    }

    #[test]
    fn open_requires_random_read() {
        let store = MemoryStore::new().with_capabilities(Capabilities {
            random_read: false,
            random_write: true,
        });
        assert!(matches!(
            ZipArchive::open(store),
            Err(ZipError::MissingCapability("random read"))
        ));
    }

    #[test]
    fn create_requires_random_write() {
        let store = MemoryStore::new().with_capabilities(Capabilities::READ_ONLY);
        assert!(matches!(
            ZipArchive::create(store),
            Err(ZipError::MissingCapability("random write"))
        ));
    }

    #[test]
    fn missing_entry_reader_is_not_found() {
        let archive = ZipArchive::create(MemoryStore::new()).unwrap();
        assert!(matches!(
            archive.entry_reader("nope"),
            Err(ZipError::EntryNotFound(_))
        ));
    }

    #[test]
    fn copy_within_handles_overlap() {
        let store = MemoryStore::from_bytes(b"0123456789".to_vec());
        let mut handle = store.open_write().unwrap();
        copy_within(&mut handle, 3, 1, 7).unwrap();
        drop(handle);
        assert_eq!(store.to_vec(), b"0345678989");
    }

    #[test]
    fn zero_fill_range() {
        let store = MemoryStore::from_bytes(b"abcdef".to_vec());
        let mut handle = store.open_write().unwrap();
        zero_fill(&mut handle, 1, 3).unwrap();
        drop(handle);
        assert_eq!(store.to_vec(), b"a\0\0\0ef");
    }

    #[test]
    fn shared_handle_serves_several_readers() {
        let store = MemoryStore::new();
        let mut archive = ZipArchive::create(store.clone()).unwrap();
        for (name, body) in [("one", "first"), ("two", "second")] {
            let mut w = archive.add_entry(ZipEntry::new(name)).unwrap().unwrap();
            w.write_all(body.as_bytes()).unwrap();
            w.finish().unwrap();
        }

        let shared = SharedHandle::new(store.open_read().unwrap());
        let mut one = archive.entry_reader_on(&shared, "one").unwrap();
        let mut two = archive.entry_reader_on(&shared, "two").unwrap();
        let mut a = [0u8; 2];
        one.read_exact(&mut a).unwrap();
        let mut rest_two = String::new();
        two.read_to_string(&mut rest_two).unwrap();
        let mut rest_one = String::new();
        one.read_to_string(&mut rest_one).unwrap();
        assert_eq!(&a, b"fi");
        assert_eq!(rest_one, "rst");
        assert_eq!(rest_two, "second");
    }
}
