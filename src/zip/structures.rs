use byteorder::{LittleEndian, ReadBytesExt};
use chrono::{Datelike, NaiveDate, NaiveDateTime, Timelike};
use std::io::Cursor;

use crate::error::{ZipError, ZipResult};

/// Largest size or offset the classic (non-Zip64) format can record.
pub const MAX_ZIP32_SIZE: u64 = u32::MAX as u64;

/// Largest entry count an EOCD record can hold.
pub const MAX_ZIP32_ENTRIES: usize = u16::MAX as usize;

/// Central Directory File Header (CDFH) - 46 bytes minimum
pub const CDFH_SIGNATURE: &[u8] = b"PK\x01\x02";
pub const CDFH_MIN_SIZE: usize = 46;

/// Local File Header (LFH) - 30 bytes
pub const LFH_SIGNATURE: &[u8] = b"PK\x03\x04";
pub const LFH_SIZE: usize = 30;

/// Optional signature in front of a data descriptor.
pub const DATA_DESCRIPTOR_SIGNATURE: &[u8] = b"PK\x07\x08";

/// General purpose flag: CRC and sizes follow the data in a descriptor.
pub const FLAG_DATA_DESCRIPTOR: u16 = 1 << 3;
/// General purpose flag: name and comment are UTF-8.
pub const FLAG_UTF8: u16 = 1 << 11;

/// Version needed to extract for everything this crate writes (deflate, 2.0).
pub const VERSION_NEEDED_TO_EXTRACT: u16 = 20;
/// Specification version stored in the low byte of "version made by".
pub const SPEC_VERSION_MADE_BY: u8 = 20;

pub const DEFAULT_FILE_ATTRS: u32 = 0o100644 << 16;
pub const DEFAULT_DIR_ATTRS: u32 = 0o040755 << 16;

/// ZIP compression methods
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompressionMethod {
    Stored,
    Deflated,
}

impl CompressionMethod {
    /// Any method other than Stored (0) and Deflated (8) is rejected.
    pub fn from_u16(value: u16) -> ZipResult<Self> {
        match value {
            0 => Ok(CompressionMethod::Stored),
            8 => Ok(CompressionMethod::Deflated),
            other => Err(ZipError::UnsupportedCompression(other)),
        }
    }

    pub fn as_u16(&self) -> u16 {
        match self {
            CompressionMethod::Stored => 0,
            CompressionMethod::Deflated => 8,
        }
    }
}

/// Host system tag from the high byte of "version made by".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Platform {
    Fat,
    Unix,
    Ntfs,
    Other(u8),
}

impl Platform {
    pub fn from_u8(value: u8) -> Self {
        match value {
            0 => Platform::Fat,
            3 => Platform::Unix,
            10 => Platform::Ntfs,
            other => Platform::Other(other),
        }
    }

    pub fn as_u8(&self) -> u8 {
        match self {
            Platform::Fat => 0,
            Platform::Unix => 3,
            Platform::Ntfs => 10,
            Platform::Other(v) => *v,
        }
    }
}

/// Packed MS-DOS timestamp: time in the low 16 bits, date in the high 16.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DosDateTime(u32);

impl Default for DosDateTime {
    fn default() -> Self {
        Self::EPOCH
    }
}

impl DosDateTime {
    /// 1980-01-01 00:00:00, the earliest representable instant.
    pub const EPOCH: Self = Self(0x0021_0000);

    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    pub const fn raw(&self) -> u32 {
        self.0
    }

    /// Build from calendar parts. Years clamp to 1980..=2107 and seconds are
    /// stored at two-second resolution.
    pub fn from_parts(year: u16, month: u8, day: u8, hour: u8, minute: u8, second: u8) -> Self {
        let year = year.clamp(1980, 2107) - 1980;
        let date = (year << 9) | ((month as u16 & 0x0F) << 5) | (day as u16 & 0x1F);
        let time =
            ((hour as u16 & 0x1F) << 11) | ((minute as u16 & 0x3F) << 5) | (second as u16 / 2);
        Self(((date as u32) << 16) | time as u32)
    }

    /// Parse modification date to (year, month, day)
    pub fn date(&self) -> (u16, u8, u8) {
        let date = (self.0 >> 16) as u16;
        let day = (date & 0x1F) as u8;
        let month = ((date >> 5) & 0x0F) as u8;
        let year = ((date >> 9) & 0x7F) + 1980;
        (year, month, day)
    }

    /// Parse modification time to (hour, minute, second)
    pub fn time(&self) -> (u8, u8, u8) {
        let time = self.0 as u16;
        let second = ((time & 0x1F) * 2) as u8;
        let minute = ((time >> 5) & 0x3F) as u8;
        let hour = ((time >> 11) & 0x1F) as u8;
        (hour, minute, second)
    }

    pub fn from_datetime(dt: &NaiveDateTime) -> Self {
        let year = dt.year().clamp(1980, 2107) as u16;
        Self::from_parts(
            year,
            dt.month() as u8,
            dt.day() as u8,
            dt.hour() as u8,
            dt.minute() as u8,
            dt.second() as u8,
        )
    }

    /// `None` when the packed fields do not form a real calendar date.
    pub fn to_datetime(&self) -> Option<NaiveDateTime> {
        let (year, month, day) = self.date();
        let (hour, minute, second) = self.time();
        NaiveDate::from_ymd_opt(year as i32, month as u32, day as u32)?.and_hms_opt(
            hour as u32,
            minute as u32,
            second as u32,
        )
    }
}

/// End of Central Directory (EOCD) - 22 bytes minimum
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndOfCentralDirectory {
    pub disk_number: u16,
    pub disk_with_cd: u16,
    pub disk_entries: u16,
    pub total_entries: u16,
    pub cd_size: u32,
    pub cd_offset: u32,
    pub comment_len: u16,
}

impl EndOfCentralDirectory {
    pub const SIGNATURE: &'static [u8] = b"PK\x05\x06";
    pub const SIZE: usize = 22;

    /// Largest span from the end of a file that can hold the record.
    pub const MAX_SEARCH: u64 = Self::SIZE as u64 + u16::MAX as u64;

    pub fn new(entries: u16, cd_offset: u32, cd_size: u32, comment_len: u16) -> Self {
        Self {
            disk_number: 0,
            disk_with_cd: 0,
            disk_entries: entries,
            total_entries: entries,
            cd_size,
            cd_offset,
            comment_len,
        }
    }

    pub fn from_bytes(data: &[u8]) -> ZipResult<Self> {
        if data.len() < Self::SIZE {
            return Err(ZipError::invalid("truncated end of central directory"));
        }

        // Verify signature
        if &data[0..4] != Self::SIGNATURE {
            return Err(ZipError::invalid("bad end of central directory signature"));
        }

        let mut cursor = Cursor::new(&data[4..]);

        Ok(Self {
            disk_number: cursor.read_u16::<LittleEndian>()?,
            disk_with_cd: cursor.read_u16::<LittleEndian>()?,
            disk_entries: cursor.read_u16::<LittleEndian>()?,
            total_entries: cursor.read_u16::<LittleEndian>()?,
            cd_size: cursor.read_u32::<LittleEndian>()?,
            cd_offset: cursor.read_u32::<LittleEndian>()?,
            comment_len: cursor.read_u16::<LittleEndian>()?,
        })
    }

    pub fn is_multi_disk(&self) -> bool {
        self.disk_number != 0 || self.disk_with_cd != 0 || self.disk_entries != self.total_entries
    }
}
