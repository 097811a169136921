//! Appending entries.
//!
//! A new entry's local header goes where the central directory used to
//! start. Content is streamed straight after it; once the writer finishes,
//! the sizes and CRC are patched into the local header and the whole central
//! directory is written again behind the new data.

use std::io::{self, Seek, SeekFrom, Write};
use tracing::{debug, warn};

use crate::error::{ZipError, ZipResult};
use crate::io::Storage;

use super::archive::ZipArchive;
use super::codec::write_u32;
use super::entry::{EntryInfo, ZipEntry};
use super::stream::{Deflater, EntryOutput};
use super::structures::{MAX_ZIP32_ENTRIES, MAX_ZIP32_SIZE};
use super::writer::{LFH_CRC_OFFSET, local_header_len, write_local_header};

impl<S: Storage> ZipArchive<S> {
    /// Append `entry` to the archive.
    ///
    /// For files, returns a writer that takes the entry's content; the
    /// archive is consistent again once [`EntryWriter::finish`] returns.
    /// Directories have no content: they are committed right away and
    /// `None` is returned.
    ///
    /// The entry is registered before any content is written. If writing
    /// fails part way, the archive must be treated as corrupted.
    pub fn add_entry(&mut self, mut entry: ZipEntry) -> ZipResult<Option<EntryWriter<'_, S>>> {
        self.require_write()?;
        if self.entries.len() >= MAX_ZIP32_ENTRIES {
            return Err(ZipError::Zip32Limit("more than 65535 entries"));
        }
        let header_offset = self.cd_offset;
        if header_offset + local_header_len(&entry) > MAX_ZIP32_SIZE {
            return Err(ZipError::Zip32Limit("local header offset"));
        }

        entry.crc32 = 0;
        entry.size = 0;
        entry.compressed_size = 0;
        let info = EntryInfo::for_new_entry(&entry, header_offset);
        let data_offset = info.data_offset().unwrap_or(header_offset);
        entry.info = Some(info);

        let mut handle = self.store.open_write()?;
        handle.seek(SeekFrom::Start(header_offset))?;
        write_local_header(&mut handle, &entry)?;

        debug!(name = %entry.name, header_offset, "adding entry");
        let is_dir = entry.is_dir();
        let method = entry.method;
        self.index.insert(entry.name.clone(), self.entries.len());
        self.entries.push(entry);
        let index = self.entries.len() - 1;

        if is_dir {
            self.write_central_directory(&mut handle, data_offset)?;
            return Ok(None);
        }

        let deflater = self
            .deflater
            .take()
            .unwrap_or_else(|| Deflater::new(self.compression()));
        let (output, spare) = EntryOutput::new(method, handle, deflater);
        self.deflater = spare;

        Ok(Some(EntryWriter {
            archive: self,
            output: Some(output),
            index,
        }))
    }
}

/// Sink for a new entry's content.
///
/// Call [`finish`](Self::finish) when done. A writer dropped without it is
/// finished on a best-effort basis and any error is only logged.
pub struct EntryWriter<'a, S: Storage> {
    archive: &'a mut ZipArchive<S>,
    output: Option<EntryOutput<S::Handle>>,
    index: usize,
}

impl<S: Storage> EntryWriter<'_, S> {
    /// Uncompressed bytes written so far.
    pub fn total_in(&self) -> u64 {
        self.output.as_ref().map_or(0, |o| o.total_in())
    }

    /// Compressed bytes written so far.
    pub fn total_out(&self) -> u64 {
        self.output.as_ref().map_or(0, |o| o.total_out())
    }

    /// Complete the entry: patch its local header, rewrite the central
    /// directory and the EOCD, and cut the file after them.
    pub fn finish(mut self) -> ZipResult<()> {
        self.commit()
    }

    fn commit(&mut self) -> ZipResult<()> {
        let Some(output) = self.output.take() else {
            return Ok(());
        };
        let closed = output.close()?;
        if closed.deflater.is_some() {
            self.archive.deflater = closed.deflater;
        }
        let mut handle = closed.sink;

        if closed.total_in > MAX_ZIP32_SIZE {
            return Err(ZipError::Zip32Limit("uncompressed size"));
        }
        if closed.total_out > MAX_ZIP32_SIZE {
            return Err(ZipError::Zip32Limit("compressed size"));
        }

        let entry = &mut self.archive.entries[self.index];
        entry.crc32 = closed.crc32;
        entry.size = closed.total_in;
        entry.compressed_size = closed.total_out;
        let (header_offset, data_offset) = match entry.info.as_ref() {
            Some(info) => (info.header_offset, info.data_offset().unwrap_or(0)),
            None => return Err(ZipError::EntryNotFound(entry.name.clone())),
        };

        let mut patch = [0u8; 12];
        write_u32(&mut patch, 0, closed.crc32);
        write_u32(&mut patch, 4, closed.total_out as u32);
        write_u32(&mut patch, 8, closed.total_in as u32);
        handle.seek(SeekFrom::Start(header_offset + LFH_CRC_OFFSET))?;
        handle.write_all(&patch)?;

        debug!(
            name = %entry.name,
            size = closed.total_in,
            compressed_size = closed.total_out,
            crc32 = format_args!("{:08x}", closed.crc32),
            "finished entry"
        );
        let data_end = data_offset + closed.total_out;
        self.archive.write_central_directory(&mut handle, data_end)
    }
}

impl<S: Storage> Write for EntryWriter<'_, S> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self.output.as_mut() {
            Some(output) => output.write(buf),
            None => Err(io::Error::other("entry writer already finished")),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self.output.as_mut() {
            Some(output) => output.flush(),
            None => Ok(()),
        }
    }
}

impl<S: Storage> Drop for EntryWriter<'_, S> {
    fn drop(&mut self) {
        if self.output.is_none() {
            return;
        }
        warn!("entry writer dropped without finish()");
        if let Err(e) = self.commit() {
            warn!(error = %e, "failed to finish entry on drop");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::{Capabilities, MemoryStore};
    use crate::zip::structures::CompressionMethod;
    use std::io::Read;

    fn read_all<S: Storage>(archive: &ZipArchive<S>, name: &str) -> Vec<u8> {
        let mut out = Vec::new();
        archive.entry_reader(name).unwrap().read_to_end(&mut out).unwrap();
        out
    }

    #[test]
    fn stored_hello() {
        let store = MemoryStore::new();
        let mut archive = ZipArchive::create(store.clone()).unwrap();
        let mut w = archive
            .add_entry(ZipEntry::new("a.txt").with_method(CompressionMethod::Stored))
            .unwrap()
            .unwrap();
        w.write_all(b"hello").unwrap();
        w.finish().unwrap();

        let entry = archive.entry("a.txt").unwrap();
        assert_eq!(entry.size(), 5);
        assert_eq!(entry.compressed_size(), 5);
        assert_eq!(entry.crc32(), 0x3610a686);
        // 30 + 5 name + 5 data
        assert_eq!(archive.central_directory_offset(), 40);
        assert_eq!(store.len(), 40 + 46 + 5 + 22);
        assert_eq!(read_all(&archive, "a.txt"), b"hello");
    }

    #[test]
    fn directory_needs_no_writer() {
        let store = MemoryStore::new();
        let mut archive = ZipArchive::create(store.clone()).unwrap();
        assert!(archive.add_entry(ZipEntry::directory("docs")).unwrap().is_none());

        let reopened = ZipArchive::open(store).unwrap();
        let dir = reopened.entry("docs/").unwrap();
        assert!(dir.is_dir());
        assert_eq!(dir.size(), 0);
    }

    #[test]
    fn dropped_writer_still_commits() {
        let store = MemoryStore::new();
        let mut archive = ZipArchive::create(store.clone()).unwrap();
        {
            let mut w = archive.add_entry(ZipEntry::new("late")).unwrap().unwrap();
            w.write_all(b"written before drop").unwrap();
        }
        let reopened = ZipArchive::open(store).unwrap();
        assert_eq!(read_all(&reopened, "late"), b"written before drop");
    }

    #[test]
    fn compressor_is_reused_across_entries() {
        let store = MemoryStore::new();
        let mut archive = ZipArchive::create(store.clone()).unwrap();
        for name in ["x", "y", "z"] {
            let mut w = archive.add_entry(ZipEntry::new(name)).unwrap().unwrap();
            w.write_all(&[name.as_bytes()[0]; 4096]).unwrap();
            w.finish().unwrap();
        }
        assert!(archive.deflater.is_some());

        let reopened = ZipArchive::open(store).unwrap();
        for name in ["x", "y", "z"] {
            let entry = reopened.entry(name).unwrap();
            assert!(entry.compressed_size() < entry.size());
            assert_eq!(read_all(&reopened, name), vec![name.as_bytes()[0]; 4096]);
        }
    }

    #[test]
    fn read_only_store_rejects_add() {
        let store = MemoryStore::new();
        ZipArchive::create(store.clone()).unwrap();
        let mut archive = ZipArchive::open(store.with_capabilities(Capabilities::READ_ONLY)).unwrap();
        assert!(matches!(
            archive.add_entry(ZipEntry::new("a")),
            Err(ZipError::MissingCapability("random write"))
        ));
    }
}
