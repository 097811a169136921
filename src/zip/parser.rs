//! Low-level ZIP archive parser.
//!
//! This module handles the binary parsing of ZIP file structures,
//! reading from any handle that implements [`Read`] and [`Seek`].
//!
//! ## Parsing Strategy
//!
//! ZIP files are designed to be read from the end:
//! 1. Find the End of Central Directory (EOCD) at the file's end
//! 2. Read the Central Directory to get metadata for all files
//! 3. Decode names, guessing one encoding for every entry that is neither
//!    UTF-8 flagged nor covered by a configured default
//! 4. For extraction, read each file's Local File Header lazily to find
//!    where its data begins

use byteorder::{LittleEndian, ReadBytesExt};
use encoding_rs::{Encoding, UTF_8};
use std::io::{Cursor, Read, Seek, SeekFrom};
use std::sync::OnceLock;
use tracing::{debug, trace, warn};

use crate::error::{ZipError, ZipResult};

use super::encoding::{self, DetectionSample};
use super::entry::{EntryInfo, ZipEntry};
use super::extra_field::ExtraFields;
use super::structures::*;
use super::writer::LFH_NAME_LEN_OFFSET;

/// Everything recovered from an archive's trailing records.
#[derive(Debug)]
pub struct ParsedArchive {
    pub entries: Vec<ZipEntry>,
    pub comment: String,
    pub raw_comment: Vec<u8>,
    pub cd_offset: u64,
    pub cd_size: u64,
}

/// Find and parse the End of Central Directory record.
///
/// The EOCD is the only record whose position depends on a trailing
/// variable-length field (the archive comment), so the tail of the file is
/// read once and scanned backwards for the signature. A candidate is taken
/// when its comment fits in the bytes that follow it.
///
/// Returns the record, its offset and the raw comment bytes.
pub fn find_eocd<H: Read + Seek>(
    handle: &mut H,
    size: u64,
) -> ZipResult<(EndOfCentralDirectory, u64, Vec<u8>)> {
    if size < EndOfCentralDirectory::SIZE as u64 {
        return Err(ZipError::invalid(
            "not a valid zip file: too small for an end of central directory record",
        ));
    }

    let search_size = EndOfCentralDirectory::MAX_SEARCH.min(size);
    let search_start = size - search_size;

    let mut buf = vec![0u8; search_size as usize];
    handle.seek(SeekFrom::Start(search_start))?;
    handle.read_exact(&mut buf)?;

    // Search backwards for EOCD signature (PK\x05\x06)
    for i in (0..=buf.len() - EndOfCentralDirectory::SIZE).rev() {
        if &buf[i..i + 4] != EndOfCentralDirectory::SIGNATURE {
            continue;
        }
        let eocd = EndOfCentralDirectory::from_bytes(&buf[i..i + EndOfCentralDirectory::SIZE])?;
        let comment_start = i + EndOfCentralDirectory::SIZE;
        let comment_end = comment_start + eocd.comment_len as usize;
        if comment_end > buf.len() {
            trace!(offset = search_start + i as u64, "skipping EOCD candidate with overlong comment");
            continue;
        }
        let comment = buf[comment_start..comment_end].to_vec();
        return Ok((eocd, search_start + i as u64, comment));
    }

    Err(ZipError::invalid(
        "not a valid zip file: end of central directory not found",
    ))
}

/// Parse the whole archive structure: EOCD, central directory and names.
pub fn read_archive<H: Read + Seek>(
    handle: &mut H,
    size: u64,
    default_encoding: Option<&'static Encoding>,
) -> ZipResult<ParsedArchive> {
    let (eocd, eocd_offset, raw_comment) = find_eocd(handle, size)?;
    if eocd.is_multi_disk() {
        return Err(ZipError::invalid("multi-disk archives are not supported"));
    }

    let comment = match default_encoding {
        Some(enc) => encoding::decode(enc, &raw_comment),
        None if raw_comment.is_empty() => String::new(),
        None => encoding::decode(encoding::guess(&raw_comment), &raw_comment),
    };

    let cd_offset = eocd.cd_offset as u64;
    if cd_offset > eocd_offset {
        return Err(ZipError::invalid(
            "central directory starts after the end of central directory record",
        ));
    }

    // Read the entire Central Directory in one go
    let mut cd_data = vec![0u8; (eocd_offset - cd_offset) as usize];
    handle.seek(SeekFrom::Start(cd_offset))?;
    handle.read_exact(&mut cd_data)?;

    let mut entries = Vec::with_capacity(eocd.total_entries as usize);
    let mut sample = DetectionSample::default();
    let mut pending = 0usize;
    let mut cursor = Cursor::new(cd_data.as_slice());

    while remaining(&cursor) >= 4 && cd_data[cursor.position() as usize..].starts_with(CDFH_SIGNATURE) {
        let record_offset = cd_offset + cursor.position();
        let mut entry = parse_cdfh(&mut cursor, record_offset)?;

        let info = entry.info.as_mut().ok_or_else(|| ZipError::invalid("entry without position"))?;
        if info.header_offset + LFH_SIZE as u64 > cd_offset {
            return Err(ZipError::InvalidArchive(format!(
                "local header offset {} of central record at {record_offset} runs into the central directory at {cd_offset}",
                info.header_offset
            )));
        }
        if info.is_utf8() {
            info.encoding = Some(UTF_8);
        } else if let Some(enc) = default_encoding {
            info.encoding = Some(enc);
        } else {
            sample.push(&info.raw_name);
            sample.push(&info.raw_comment);
            pending += 1;
        }
        if let Some(enc) = info.encoding {
            let name = encoding::decode(enc, &info.raw_name);
            entry.comment = encoding::decode(enc, &info.raw_comment);
            entry.set_decoded_name(name);
        }

        trace!(name = %entry.name, offset = record_offset, "parsed central directory record");
        entries.push(entry);
    }

    if pending > 0 {
        let guessed = encoding::guess(sample.as_bytes());
        for entry in entries.iter_mut() {
            let Some(info) = entry.info.as_mut() else {
                continue;
            };
            if info.encoding.is_some() {
                continue;
            }
            info.encoding = Some(guessed);
            let name = encoding::decode(guessed, &info.raw_name);
            entry.comment = encoding::decode(guessed, &info.raw_comment);
            entry.set_decoded_name(name);
        }
        debug!(entries = pending, encoding = guessed.name(), "decoded legacy names");
    }

    if entries.len() != eocd.total_entries as usize {
        warn!(
            expected = eocd.total_entries,
            found = entries.len(),
            "central directory entry count does not match end of central directory"
        );
    }

    let cd_size = cursor.position();
    debug!(entries = entries.len(), cd_offset, cd_size, "opened archive");

    Ok(ParsedArchive {
        entries,
        comment,
        raw_comment,
        cd_offset,
        cd_size,
    })
}

fn remaining(cursor: &Cursor<&[u8]>) -> u64 {
    cursor.get_ref().len() as u64 - cursor.position()
}

/// Parse one Central Directory File Header starting at the cursor.
///
/// Names and comments are kept as raw bytes; decoding happens once the
/// whole directory has been read.
fn parse_cdfh(cursor: &mut Cursor<&[u8]>, record_offset: u64) -> ZipResult<ZipEntry> {
    if remaining(cursor) < CDFH_MIN_SIZE as u64 {
        return Err(ZipError::invalid("truncated central directory file header"));
    }

    // Read and verify the signature (PK\x01\x02)
    let mut sig = [0u8; 4];
    cursor.read_exact(&mut sig)?;
    if sig != CDFH_SIGNATURE {
        return Err(ZipError::invalid("invalid central directory file header"));
    }

    // Read fixed-size header fields
    let version_made_by = cursor.read_u16::<LittleEndian>()?;
    let version_needed = cursor.read_u16::<LittleEndian>()?;
    let flags = cursor.read_u16::<LittleEndian>()?;
    let method = CompressionMethod::from_u16(cursor.read_u16::<LittleEndian>()?)?;
    let modified = DosDateTime::from_raw(cursor.read_u32::<LittleEndian>()?);
    let crc32 = cursor.read_u32::<LittleEndian>()?;
    let compressed_size = cursor.read_u32::<LittleEndian>()? as u64;
    let size = cursor.read_u32::<LittleEndian>()? as u64;
    let file_name_length = cursor.read_u16::<LittleEndian>()? as usize;
    let extra_field_length = cursor.read_u16::<LittleEndian>()? as usize;
    let file_comment_length = cursor.read_u16::<LittleEndian>()? as usize;
    let _disk_number_start = cursor.read_u16::<LittleEndian>()?;
    let internal_attributes = cursor.read_u16::<LittleEndian>()?;
    let external_attributes = cursor.read_u32::<LittleEndian>()?;
    let header_offset = cursor.read_u32::<LittleEndian>()? as u64;

    let variable_len = file_name_length + extra_field_length + file_comment_length;
    if remaining(cursor) < variable_len as u64 {
        return Err(ZipError::invalid("truncated central directory file header"));
    }

    // Read the variable-length fields
    let mut raw_name = vec![0u8; file_name_length];
    cursor.read_exact(&mut raw_name)?;
    let mut extra = vec![0u8; extra_field_length];
    cursor.read_exact(&mut extra)?;
    let mut raw_comment = vec![0u8; file_comment_length];
    cursor.read_exact(&mut raw_comment)?;

    let platform = Platform::from_u8((version_made_by >> 8) as u8);
    let mut entry = ZipEntry::new(String::new());
    entry.method = method;
    entry.crc32 = crc32;
    entry.compressed_size = compressed_size;
    entry.size = size;
    entry.modified = modified;
    entry.internal_attributes = internal_attributes;
    entry.external_attributes = external_attributes;
    entry.platform = platform;
    entry.spec_version = version_made_by as u8;
    entry.extra_fields = ExtraFields::parse(&extra);
    // Directory entries end with '/'; the name check happens once decoded.
    entry.directory = false;
    entry.info = Some(EntryInfo {
        header_offset,
        data_offset: OnceLock::new(),
        central_header_offset: record_offset,
        central_header_len: (CDFH_MIN_SIZE + variable_len) as u64,
        flags,
        version_needed,
        encoding: None,
        raw_name,
        raw_comment,
    });
    Ok(entry)
}

/// Get the actual data offset for an entry.
///
/// The Local File Header has variable-length fields (file name, extra field)
/// that may differ from the Central Directory entry, so the header is read
/// to find where the data begins.
pub fn read_data_offset<H: Read + Seek>(handle: &mut H, header_offset: u64) -> ZipResult<u64> {
    let mut lfh_buf = [0u8; LFH_SIZE];
    handle.seek(SeekFrom::Start(header_offset))?;
    handle.read_exact(&mut lfh_buf)?;
    local_data_offset(header_offset, &lfh_buf)
}

/// Compute the data offset from a local file header read at `header_offset`.
pub fn local_data_offset(header_offset: u64, lfh_buf: &[u8; LFH_SIZE]) -> ZipResult<u64> {
    // Verify LFH signature (PK\x03\x04)
    if &lfh_buf[0..4] != LFH_SIGNATURE {
        return Err(ZipError::invalid(format!(
            "invalid local file header at offset {header_offset}"
        )));
    }

    // Read the variable field lengths from fixed positions in LFH
    let mut cursor = Cursor::new(&lfh_buf[LFH_NAME_LEN_OFFSET as usize..]);
    let file_name_length = cursor.read_u16::<LittleEndian>()? as u64;
    let extra_field_length = cursor.read_u16::<LittleEndian>()? as u64;

    // Data starts after: LFH (30 bytes) + filename + extra field
    Ok(header_offset + LFH_SIZE as u64 + file_name_length + extra_field_length)
}

/// Length of the data descriptor that follows an entry's data, if any.
///
/// The descriptor may or may not begin with its own signature.
pub fn data_descriptor_len<H: Read + Seek>(
    handle: &mut H,
    info: &EntryInfo,
    data_end: u64,
) -> ZipResult<u64> {
    if !info.has_data_descriptor() {
        return Ok(0);
    }
    let mut sig = [0u8; 4];
    handle.seek(SeekFrom::Start(data_end))?;
    handle.read_exact(&mut sig)?;
    Ok(if sig == DATA_DESCRIPTOR_SIGNATURE { 16 } else { 12 })
}
