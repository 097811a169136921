//! # inzip
//!
//! A random-access ZIP archive engine that edits archives in place.
//!
//! An archive is opened by reading its End of Central Directory record and
//! central directory; entry content is only touched when it is read. New
//! entries are appended behind existing data, deletions either shrink the
//! file or leave a zeroed hole, and [`ZipArchive::defragment`] packs the
//! holes away.
//!
//! ## Features
//!
//! - STORED and DEFLATE entries, with CRC32 checked on read
//! - Legacy (non UTF-8) names decoded with a configured or detected encoding
//!   and written back byte for byte
//! - Any backing store implementing [`Storage`]: local files or memory
//!
//! ## Example
//!
//! ```no_run
//! use std::io::{Read, Write};
//! use inzip::{LocalFile, ZipArchive, ZipEntry};
//!
//! fn main() -> inzip::ZipResult<()> {
//!     let mut archive = ZipArchive::create(LocalFile::new("notes.zip"))?;
//!
//!     if let Some(mut writer) = archive.add_entry(ZipEntry::new("hello.txt"))? {
//!         writer.write_all(b"hello")?;
//!         writer.finish()?;
//!     }
//!
//!     let mut content = String::new();
//!     archive.entry_reader("hello.txt")?.read_to_string(&mut content)?;
//!     assert_eq!(content, "hello");
//!     Ok(())
//! }
//! ```

pub mod cli;
pub mod error;
pub mod io;
pub mod logging;
pub mod zip;

pub use cli::Cli;
pub use error::{ZipError, ZipResult};
pub use io::{Capabilities, LocalFile, MemoryStore, RandomAccess, SharedHandle, Storage};
pub use zip::{
    CompressionMethod, DosDateTime, EntryWriter, OpenOptions, Platform, ZipArchive, ZipEntry,
    ZipExtractor,
};
