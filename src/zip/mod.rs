//! ZIP archive reading and in-place editing.
//!
//! ## Architecture
//!
//! - [`structures`]: constants and fixed-size records (EOCD, DOS time, platform tags)
//! - [`codec`]: little-endian integers at an offset
//! - [`extra_field`]: opaque extra-field blocks kept for round trips
//! - [`entry`]: the entry model and its position bookkeeping
//! - [`parser`]: EOCD scan and central directory walk
//! - [`encoding`]: name decoding for archives without the UTF-8 flag
//! - [`writer`]: serialization of headers and the EOCD
//! - [`stream`]: compressing writers and bounded, CRC-checked readers
//! - [`archive`], `append`, `delete`, `maintenance`: the [`ZipArchive`] engine
//! - [`extractor`]: convenience extraction to memory, files and writers
//!
//! ## ZIP Format Overview
//!
//! A ZIP file consists of:
//! 1. Local file headers and compressed data for each file
//! 2. Central Directory with metadata for all files
//! 3. End of Central Directory (EOCD) record at the end
//!
//! The archive is opened from the end: the EOCD locates the central
//! directory, which holds everything needed to list entries. Edits rewrite
//! the central directory and EOCD behind the last entry's data.
//!
//! ## Limitations
//!
//! - STORED and DEFLATE only
//! - No ZIP64, so sizes, offsets and counts must fit the 32-bit format
//! - No encryption or multi-disk archives

mod append;
pub mod archive;
pub mod codec;
mod delete;
pub mod encoding;
pub mod entry;
pub mod extra_field;
mod extractor;
mod maintenance;
pub mod parser;
pub mod stream;
pub mod structures;
pub mod writer;

pub use append::EntryWriter;
pub use archive::{OpenOptions, ZipArchive};
pub use entry::{EntryInfo, ZipEntry};
pub use extra_field::{ExtraField, ExtraFields};
pub use extractor::ZipExtractor;
pub use stream::EntryReader;
pub use structures::{CompressionMethod, DosDateTime, Platform};
