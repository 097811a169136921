use encoding_rs::{Encoding, UTF_8};
use std::sync::OnceLock;

use super::extra_field::ExtraFields;
use super::structures::{
    CompressionMethod, DEFAULT_DIR_ATTRS, DEFAULT_FILE_ATTRS, DosDateTime, FLAG_DATA_DESCRIPTOR,
    FLAG_UTF8, LFH_SIZE, Platform, SPEC_VERSION_MADE_BY, VERSION_NEEDED_TO_EXTRACT,
};

/// One member of a ZIP archive.
///
/// Entries built with [`ZipEntry::new`] or [`ZipEntry::directory`] carry no
/// position until they are handed to
/// [`ZipArchive::add_entry`](super::ZipArchive::add_entry). Entries read from
/// an archive carry an [`EntryInfo`] describing where their headers and data
/// sit in the file.
#[derive(Debug, Clone)]
pub struct ZipEntry {
    pub(crate) name: String,
    pub(crate) method: CompressionMethod,
    pub(crate) crc32: u32,
    pub(crate) compressed_size: u64,
    pub(crate) size: u64,
    pub(crate) modified: DosDateTime,
    pub(crate) internal_attributes: u16,
    pub(crate) external_attributes: u32,
    pub(crate) platform: Platform,
    pub(crate) spec_version: u8,
    pub(crate) comment: String,
    pub(crate) extra_fields: ExtraFields,
    pub(crate) directory: bool,
    pub(crate) info: Option<EntryInfo>,
}

impl ZipEntry {
    /// A file entry, Deflated by default.
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        let directory = name.ends_with('/');
        Self {
            name,
            method: if directory {
                CompressionMethod::Stored
            } else {
                CompressionMethod::Deflated
            },
            crc32: 0,
            compressed_size: 0,
            size: 0,
            modified: DosDateTime::EPOCH,
            internal_attributes: 0,
            external_attributes: if directory {
                DEFAULT_DIR_ATTRS
            } else {
                DEFAULT_FILE_ATTRS
            },
            platform: Platform::Unix,
            spec_version: SPEC_VERSION_MADE_BY,
            comment: String::new(),
            extra_fields: ExtraFields::default(),
            directory,
            info: None,
        }
    }

    /// A directory entry. A trailing `/` is added when missing.
    #[inline]
    pub fn directory(name: impl Into<String>) -> Self {
        let mut name = name.into();
        if !(name.ends_with('/') || name.ends_with('\\')) {
            name += "/"
        };
        Self::new(name)
    }

    pub fn with_method(mut self, method: CompressionMethod) -> Self {
        if !self.directory {
            self.method = method;
        }
        self
    }

    pub fn with_modified(mut self, modified: DosDateTime) -> Self {
        self.modified = modified;
        self
    }

    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = comment.into();
        self
    }

    pub fn with_extra_fields(mut self, extra_fields: ExtraFields) -> Self {
        self.extra_fields = extra_fields;
        self
    }

    /// Unix permission bits, stored in the high half of the external
    /// attributes.
    pub fn with_unix_mode(mut self, mode: u32) -> Self {
        self.platform = Platform::Unix;
        self.external_attributes = (mode & 0xFFFF) << 16 | (self.external_attributes & 0xFFFF);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn method(&self) -> CompressionMethod {
        self.method
    }

    pub fn crc32(&self) -> u32 {
        self.crc32
    }

    pub fn compressed_size(&self) -> u64 {
        self.compressed_size
    }

    /// Uncompressed size.
    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn modified(&self) -> DosDateTime {
        self.modified
    }

    pub fn set_modified(&mut self, modified: DosDateTime) {
        self.modified = modified;
    }

    pub fn internal_attributes(&self) -> u16 {
        self.internal_attributes
    }

    pub fn external_attributes(&self) -> u32 {
        self.external_attributes
    }

    pub fn set_external_attributes(&mut self, attributes: u32) {
        self.external_attributes = attributes;
    }

    /// Unix mode bits when the entry was made on a Unix host.
    pub fn unix_mode(&self) -> Option<u32> {
        match self.platform {
            Platform::Unix => Some(self.external_attributes >> 16),
            _ => None,
        }
    }

    pub fn platform(&self) -> Platform {
        self.platform
    }

    pub fn set_platform(&mut self, platform: Platform) {
        self.platform = platform;
    }

    /// Raw "version made by": platform tag in the high byte.
    pub fn version_made_by(&self) -> u16 {
        (self.platform.as_u8() as u16) << 8 | self.spec_version as u16
    }

    pub fn comment(&self) -> &str {
        &self.comment
    }

    pub fn extra_fields(&self) -> &ExtraFields {
        &self.extra_fields
    }

    pub fn is_dir(&self) -> bool {
        self.directory
    }

    /// Position bookkeeping, present once the entry belongs to an archive.
    pub fn info(&self) -> Option<&EntryInfo> {
        self.info.as_ref()
    }

    /// Assign the decoded name, normalizing FAT path separators.
    pub(crate) fn set_decoded_name(&mut self, name: String) {
        self.name = if self.platform == Platform::Fat {
            name.replace('\\', "/")
        } else {
            name
        };
        self.directory = self.directory || self.name.ends_with('/');
    }
}

/// Where an entry's records live in the backing file.
#[derive(Debug, Clone)]
pub struct EntryInfo {
    pub(crate) header_offset: u64,
    pub(crate) data_offset: OnceLock<u64>,
    pub(crate) central_header_offset: u64,
    pub(crate) central_header_len: u64,
    pub(crate) flags: u16,
    pub(crate) version_needed: u16,
    /// `None` while the batched encoding guess is still pending.
    pub(crate) encoding: Option<&'static Encoding>,
    /// Name and comment exactly as stored on disk.
    pub(crate) raw_name: Vec<u8>,
    pub(crate) raw_comment: Vec<u8>,
}

impl EntryInfo {
    /// Bookkeeping for a freshly appended entry: UTF-8 flagged, data right
    /// after the local header.
    pub(crate) fn for_new_entry(entry: &ZipEntry, header_offset: u64) -> Self {
        let raw_name = entry.name.as_bytes().to_vec();
        let data_offset = header_offset
            + LFH_SIZE as u64
            + raw_name.len() as u64
            + entry.extra_fields.data_length(false) as u64;
        Self {
            header_offset,
            data_offset: OnceLock::from(data_offset),
            central_header_offset: 0,
            central_header_len: 0,
            flags: FLAG_UTF8,
            version_needed: VERSION_NEEDED_TO_EXTRACT,
            encoding: Some(UTF_8),
            raw_name,
            raw_comment: entry.comment.as_bytes().to_vec(),
        }
    }

    /// Absolute offset of the local file header.
    pub fn header_offset(&self) -> u64 {
        self.header_offset
    }

    /// Absolute offset of the first content byte, once known.
    pub fn data_offset(&self) -> Option<u64> {
        self.data_offset.get().copied()
    }

    pub fn central_header_offset(&self) -> u64 {
        self.central_header_offset
    }

    pub fn central_header_len(&self) -> u64 {
        self.central_header_len
    }

    pub fn flags(&self) -> u16 {
        self.flags
    }

    pub fn has_data_descriptor(&self) -> bool {
        self.flags & FLAG_DATA_DESCRIPTOR != 0
    }

    pub fn is_utf8(&self) -> bool {
        self.flags & FLAG_UTF8 != 0
    }

    /// Character encoding used for the name and comment.
    pub fn encoding(&self) -> &'static Encoding {
        self.encoding.unwrap_or(UTF_8)
    }

    pub fn raw_name(&self) -> &[u8] {
        &self.raw_name
    }

    /// Move the header and any known data offset left by `delta` bytes.
    pub(crate) fn shift_left(&mut self, delta: u64) {
        self.header_offset -= delta;
        if let Some(data) = self.data_offset.take() {
            self.data_offset = OnceLock::from(data - delta);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn directory_gets_trailing_slash() {
        let dir = ZipEntry::directory("docs");
        assert_eq!(dir.name(), "docs/");
        assert!(dir.is_dir());
        assert_eq!(dir.method(), CompressionMethod::Stored);
        assert_eq!(dir.unix_mode(), Some(0o040755));

        let dir = dir.with_method(CompressionMethod::Deflated);
        assert_eq!(dir.method(), CompressionMethod::Stored);
    }

    #[test]
    fn new_file_defaults() {
        let entry = ZipEntry::new("a.txt");
        assert!(!entry.is_dir());
        assert_eq!(entry.method(), CompressionMethod::Deflated);
        assert_eq!(entry.unix_mode(), Some(0o100644));
        assert_eq!(entry.version_made_by(), 0x0314);
        assert!(entry.info().is_none());
    }

    #[test]
    fn fat_names_are_normalized() {
        let mut entry = ZipEntry::new("");
        entry.platform = Platform::Fat;
        entry.set_decoded_name("dir\\sub\\".to_string());
        assert_eq!(entry.name(), "dir/sub/");
        assert!(entry.is_dir());

        let mut entry = ZipEntry::new("");
        entry.set_decoded_name("odd\\name".to_string());
        assert_eq!(entry.name(), "odd\\name");
    }

    #[test]
    fn unix_mode_keeps_low_attribute_bits() {
        let mut entry = ZipEntry::new("run.sh");
        entry.set_external_attributes(0x20);
        let entry = entry.with_unix_mode(0o100755);
        assert_eq!(entry.external_attributes(), (0o100755 << 16) | 0x20);
    }

    #[test]
    fn new_entry_info_points_past_header() {
        let entry = ZipEntry::new("abc");
        let info = EntryInfo::for_new_entry(&entry, 100);
        assert_eq!(info.data_offset(), Some(100 + 30 + 3));
        assert!(info.is_utf8());
        assert!(!info.has_data_descriptor());
    }

    #[test]
    fn shift_left_moves_both_offsets() {
        let entry = ZipEntry::new("abc");
        let mut info = EntryInfo::for_new_entry(&entry, 100);
        info.shift_left(40);
        assert_eq!(info.header_offset(), 60);
        assert_eq!(info.data_offset(), Some(93));
    }
}
