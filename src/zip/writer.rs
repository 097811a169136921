//! Serialization of ZIP records.
//!
//! Each function writes one complete record. Entries written here must
//! already carry their [`EntryInfo`]; names and comments are written from
//! the stored raw bytes so legacy encodings survive a rewrite untouched.

use byteorder::{LittleEndian, WriteBytesExt};
use std::io::Write;

use super::entry::{EntryInfo, ZipEntry};
use super::structures::{
    CDFH_MIN_SIZE, CDFH_SIGNATURE, EndOfCentralDirectory, LFH_SIGNATURE, LFH_SIZE, MAX_ZIP32_SIZE,
};
use crate::error::{ZipError, ZipResult};

/// Offset of the DOS time field in a local file header.
pub const LFH_TIME_OFFSET: u64 = 10;
/// Offset of the CRC field in a local file header; sizes follow.
pub const LFH_CRC_OFFSET: u64 = 14;
/// Offset of the name length field in a local file header.
pub const LFH_NAME_LEN_OFFSET: u64 = 26;

pub const CDFH_VERSION_MADE_BY_OFFSET: u64 = 4;
pub const CDFH_TIME_OFFSET: u64 = 12;
pub const CDFH_EXTERNAL_ATTRS_OFFSET: u64 = 38;

fn info(entry: &ZipEntry) -> ZipResult<&EntryInfo> {
    entry
        .info
        .as_ref()
        .ok_or_else(|| ZipError::EntryNotFound(entry.name.clone()))
}

fn zip32(value: u64, what: &'static str) -> ZipResult<u32> {
    if value > MAX_ZIP32_SIZE {
        return Err(ZipError::Zip32Limit(what));
    }
    Ok(value as u32)
}

fn len16(len: usize, what: &'static str) -> ZipResult<u16> {
    u16::try_from(len).map_err(|_| ZipError::Zip32Limit(what))
}

/// Length of the local file header this crate writes for `entry`.
pub fn local_header_len(entry: &ZipEntry) -> u64 {
    let raw_name_len = entry
        .info
        .as_ref()
        .map(|i| i.raw_name.len())
        .unwrap_or(entry.name.len());
    (LFH_SIZE + raw_name_len + entry.extra_fields.data_length(false)) as u64
}

pub fn write_local_header<W: Write>(buf: &mut W, entry: &ZipEntry) -> ZipResult<()> {
    let info = info(entry)?;
    let name_len = len16(info.raw_name.len(), "file name longer than 65535 bytes")?;
    let extra_len = len16(
        entry.extra_fields.data_length(false),
        "extra field longer than 65535 bytes",
    )?;

    let mut header = Vec::with_capacity(LFH_SIZE + info.raw_name.len());
    // signature
    header.write_all(LFH_SIGNATURE)?;
    // version needed to extract
    header.write_u16::<LittleEndian>(info.version_needed)?;
    // general purpose bit flag
    header.write_u16::<LittleEndian>(info.flags)?;
    // compression method
    header.write_u16::<LittleEndian>(entry.method.as_u16())?;
    // last modification time and date
    header.write_u32::<LittleEndian>(entry.modified.raw())?;
    // crc
    header.write_u32::<LittleEndian>(entry.crc32)?;
    // compressed size
    header.write_u32::<LittleEndian>(zip32(entry.compressed_size, "compressed size")?)?;
    // uncompressed size
    header.write_u32::<LittleEndian>(zip32(entry.size, "uncompressed size")?)?;
    // file name length
    header.write_u16::<LittleEndian>(name_len)?;
    // extra field length
    header.write_u16::<LittleEndian>(extra_len)?;

    header.write_all(&info.raw_name)?;
    entry.extra_fields.write(&mut header, false)?;

    buf.write_all(&header)?;
    Ok(())
}

/// Write the central directory record and return its length.
pub fn write_central_header<W: Write>(buf: &mut W, entry: &ZipEntry) -> ZipResult<u64> {
    let info = info(entry)?;
    let name_len = len16(info.raw_name.len(), "file name longer than 65535 bytes")?;
    let extra_len = len16(
        entry.extra_fields.data_length(true),
        "extra field longer than 65535 bytes",
    )?;
    let comment_len = len16(info.raw_comment.len(), "entry comment longer than 65535 bytes")?;

    let mut header = Vec::with_capacity(CDFH_MIN_SIZE + info.raw_name.len());
    // signature
    header.write_all(CDFH_SIGNATURE)?;
    // version made by
    header.write_u16::<LittleEndian>(entry.version_made_by())?;
    // version needed to extract
    header.write_u16::<LittleEndian>(info.version_needed)?;
    // general purpose bit flag
    header.write_u16::<LittleEndian>(info.flags)?;
    // compression method
    header.write_u16::<LittleEndian>(entry.method.as_u16())?;
    // last modification time and date
    header.write_u32::<LittleEndian>(entry.modified.raw())?;
    // crc
    header.write_u32::<LittleEndian>(entry.crc32)?;
    // compressed size
    header.write_u32::<LittleEndian>(zip32(entry.compressed_size, "compressed size")?)?;
    // uncompressed size
    header.write_u32::<LittleEndian>(zip32(entry.size, "uncompressed size")?)?;
    // file name length
    header.write_u16::<LittleEndian>(name_len)?;
    // extra field length
    header.write_u16::<LittleEndian>(extra_len)?;
    // file comment length
    header.write_u16::<LittleEndian>(comment_len)?;
    // disk number start
    header.write_u16::<LittleEndian>(0)?;
    // internal file attributes
    header.write_u16::<LittleEndian>(entry.internal_attributes)?;
    // external file attributes
    header.write_u32::<LittleEndian>(entry.external_attributes)?;
    // relative offset of local header
    header.write_u32::<LittleEndian>(zip32(info.header_offset, "local header offset")?)?;

    header.write_all(&info.raw_name)?;
    entry.extra_fields.write(&mut header, true)?;
    header.write_all(&info.raw_comment)?;

    buf.write_all(&header)?;
    Ok(header.len() as u64)
}

/// Write an EOCD record followed by the archive comment. Returns the number
/// of bytes written.
pub fn write_end_of_central_directory<W: Write>(
    buf: &mut W,
    entries: usize,
    cd_offset: u64,
    cd_size: u64,
    comment: &[u8],
) -> ZipResult<u64> {
    let entries = u16::try_from(entries).map_err(|_| ZipError::Zip32Limit("more than 65535 entries"))?;
    let eocd = EndOfCentralDirectory::new(
        entries,
        zip32(cd_offset, "central directory offset")?,
        zip32(cd_size, "central directory size")?,
        len16(comment.len(), "archive comment longer than 65535 bytes")?,
    );

    // Temporary in-memory statically sized array
    let mut footer = [0; EndOfCentralDirectory::SIZE];
    {
        let mut footer_buf: &mut [u8] = &mut footer;

        // Signature
        footer_buf.write_all(EndOfCentralDirectory::SIGNATURE)?;
        // number of this disk
        footer_buf.write_u16::<LittleEndian>(eocd.disk_number)?;
        // number of the disk with start
        footer_buf.write_u16::<LittleEndian>(eocd.disk_with_cd)?;
        // Number of entries on this disk
        footer_buf.write_u16::<LittleEndian>(eocd.disk_entries)?;
        // Number of entries
        footer_buf.write_u16::<LittleEndian>(eocd.total_entries)?;
        // Central dir size
        footer_buf.write_u32::<LittleEndian>(eocd.cd_size)?;
        // Central dir offset
        footer_buf.write_u32::<LittleEndian>(eocd.cd_offset)?;
        // Comment length
        footer_buf.write_u16::<LittleEndian>(eocd.comment_len)?;
    }

    buf.write_all(&footer)?;
    buf.write_all(comment)?;
    Ok((EndOfCentralDirectory::SIZE + comment.len()) as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::zip::codec::{read_u16, read_u32};
    use crate::zip::structures::FLAG_UTF8;

    fn placed_entry(name: &str, offset: u64) -> ZipEntry {
        let mut entry = ZipEntry::new(name);
        entry.crc32 = 0x3610a686;
        entry.size = 5;
        entry.compressed_size = 7;
        entry.info = Some(EntryInfo::for_new_entry(&entry, offset));
        entry
    }

    #[test]
    fn local_header_layout() {
        let entry = placed_entry("a.txt", 0);
        let mut buf = Vec::new();
        write_local_header(&mut buf, &entry).unwrap();

        assert_eq!(buf.len() as u64, local_header_len(&entry));
        assert_eq!(&buf[0..4], LFH_SIGNATURE);
        assert_eq!(read_u16(&buf, 6), FLAG_UTF8);
        assert_eq!(read_u16(&buf, 8), 8);
        assert_eq!(read_u32(&buf, 14), 0x3610a686);
        assert_eq!(read_u32(&buf, 18), 7);
        assert_eq!(read_u32(&buf, 22), 5);
        assert_eq!(read_u16(&buf, 26), 5);
        assert_eq!(&buf[30..], b"a.txt");
    }

    #[test]
    fn central_header_layout() {
        let mut entry = placed_entry("dir/b.bin", 1234);
        if let Some(info) = entry.info.as_mut() {
            info.raw_comment = b"note".to_vec();
        }
        let mut buf = Vec::new();
        let len = write_central_header(&mut buf, &entry).unwrap();

        assert_eq!(len as usize, buf.len());
        assert_eq!(len as usize, CDFH_MIN_SIZE + 9 + 4);
        assert_eq!(read_u16(&buf, 4), entry.version_made_by());
        assert_eq!(read_u16(&buf, 32), 4);
        assert_eq!(read_u32(&buf, 38), entry.external_attributes());
        assert_eq!(read_u32(&buf, 42), 1234);
        assert!(buf.ends_with(b"dir/b.binnote"));
    }

    #[test]
    fn eocd_layout() {
        let mut buf = Vec::new();
        let n = write_end_of_central_directory(&mut buf, 3, 500, 150, b"hi").unwrap();
        assert_eq!(n, 24);
        let eocd = EndOfCentralDirectory::from_bytes(&buf).unwrap();
        assert_eq!(eocd, EndOfCentralDirectory::new(3, 500, 150, 2));
        assert_eq!(&buf[22..], b"hi");
    }

    #[test]
    fn refuses_unplaced_entries() {
        let entry = ZipEntry::new("loose");
        let mut buf = Vec::new();
        assert!(matches!(
            write_local_header(&mut buf, &entry),
            Err(ZipError::EntryNotFound(_))
        ));
    }

    #[test]
    fn refuses_offsets_past_4gib() {
        let mut buf = Vec::new();
        assert!(matches!(
            write_end_of_central_directory(&mut buf, 1, MAX_ZIP32_SIZE + 1, 46, &[]),
            Err(ZipError::Zip32Limit(_))
        ));
    }
}
