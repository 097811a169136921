use super::{Capabilities, RandomAccess, Storage};
use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

/// Archive stored in a file on the local filesystem.
///
/// Only the path is kept; every call opens its own [`File`].
#[derive(Debug, Clone)]
pub struct LocalFile {
    path: PathBuf,
    writable: bool,
}

impl LocalFile {
    /// Use the file at `path`. Write access follows the file's read-only flag;
    /// a path that does not exist yet is writable so it can be created.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let writable = match std::fs::metadata(&path) {
            Ok(meta) => !meta.permissions().readonly(),
            Err(_) => true,
        };
        Self { path, writable }
    }

    /// Use the file at `path` and never write to it.
    pub fn read_only(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            writable: false,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl RandomAccess for File {
    fn set_len(&mut self, len: u64) -> io::Result<()> {
        File::set_len(self, len)
    }

    fn len(&mut self) -> io::Result<u64> {
        Ok(self.metadata()?.len())
    }
}

impl Storage for LocalFile {
    type Handle = File;

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            random_read: true,
            random_write: self.writable,
        }
    }

    fn open_read(&self) -> io::Result<File> {
        File::open(&self.path)
    }

    fn open_write(&self) -> io::Result<File> {
        OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&self.path)
    }
}
