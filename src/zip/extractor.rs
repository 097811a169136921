use std::fs;
use std::io::{self, Write};
use std::path::Path;

use crate::error::ZipResult;
use crate::io::Storage;

use super::archive::ZipArchive;

/// Entry extraction on top of [`ZipArchive::entry_reader`].
pub struct ZipExtractor<'a, S: Storage> {
    archive: &'a ZipArchive<S>,
}

impl<'a, S: Storage> ZipExtractor<'a, S> {
    pub fn new(archive: &'a ZipArchive<S>) -> Self {
        Self { archive }
    }

    /// Extract file data to memory
    pub fn extract_to_memory(&self, name: &str) -> ZipResult<Vec<u8>> {
        let size = self.archive.entry(name).map_or(0, |e| e.size());
        let mut buf = Vec::with_capacity(size.min(64 * 1024 * 1024) as usize);
        self.extract_to_writer(name, &mut buf)?;
        Ok(buf)
    }

    /// Stream an entry's content into `writer`. Returns the bytes written.
    pub fn extract_to_writer<W: Write>(&self, name: &str, writer: &mut W) -> ZipResult<u64> {
        let mut reader = self.archive.entry_reader(name)?;
        let written = io::copy(&mut reader, writer)?;
        Ok(written)
    }

    /// Extract file to disk
    pub fn extract_to_file(&self, name: &str, output_path: &Path) -> ZipResult<u64> {
        // Create parent directories if needed
        if let Some(parent) = output_path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let mut reader = self.archive.entry_reader(name)?;
        let mut file = fs::File::create(output_path)?;
        let written = io::copy(&mut reader, &mut file)?;
        file.flush()?;

        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::MemoryStore;
    use crate::zip::entry::ZipEntry;
    use crate::error::ZipError;

    fn sample() -> ZipArchive<MemoryStore> {
        let mut archive = ZipArchive::create(MemoryStore::new()).unwrap();
        let mut w = archive.add_entry(ZipEntry::new("docs/readme.md")).unwrap().unwrap();
        w.write_all(b"# inzip\n").unwrap();
        w.finish().unwrap();
        archive
    }

    #[test]
    fn extract_to_memory_and_writer() {
        let archive = sample();
        let extractor = ZipExtractor::new(&archive);
        assert_eq!(extractor.extract_to_memory("docs/readme.md").unwrap(), b"# inzip\n");

        let mut out = Vec::new();
        assert_eq!(extractor.extract_to_writer("docs/readme.md", &mut out).unwrap(), 8);
        assert_eq!(out, b"# inzip\n");
    }

    #[test]
    fn extract_to_file_creates_parents() {
        let archive = sample();
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("out/docs/readme.md");
        ZipExtractor::new(&archive)
            .extract_to_file("docs/readme.md", &target)
            .unwrap();
        assert_eq!(fs::read(target).unwrap(), b"# inzip\n");
    }

    #[test]
    fn missing_entry() {
        let archive = sample();
        assert!(matches!(
            ZipExtractor::new(&archive).extract_to_memory("nope"),
            Err(ZipError::EntryNotFound(_))
        ));
    }
}
