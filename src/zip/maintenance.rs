//! In-place metadata edits and defragmentation.

use std::io::{Seek, SeekFrom, Write};
use tracing::{debug, trace};

use crate::error::{ZipError, ZipResult};
use crate::io::Storage;

use super::archive::{ZipArchive, copy_within, entry_info, resolve_data_offset_with};
use super::codec::{write_u16, write_u32};
use super::entry::ZipEntry;
use super::parser::data_descriptor_len;
use super::writer::{
    CDFH_EXTERNAL_ATTRS_OFFSET, CDFH_TIME_OFFSET, CDFH_VERSION_MADE_BY_OFFSET, LFH_TIME_OFFSET,
};

impl<S: Storage> ZipArchive<S> {
    /// Write `entry`'s timestamp, platform and external attributes over the
    /// stored entry of the same name.
    ///
    /// Only fixed-size fields are touched, so nothing moves: the local
    /// header and the central record are patched where they are.
    pub fn update_entry(&mut self, entry: &ZipEntry) -> ZipResult<()> {
        let position = *self
            .index
            .get(&entry.name)
            .ok_or_else(|| ZipError::EntryNotFound(entry.name.clone()))?;
        self.require_write()?;

        let stored = &mut self.entries[position];
        stored.modified = entry.modified;
        stored.platform = entry.platform;
        stored.spec_version = entry.spec_version;
        stored.external_attributes = entry.external_attributes;
        let info = entry_info(stored)?;

        let mut time = [0u8; 4];
        write_u32(&mut time, 0, stored.modified.raw());
        let mut version = [0u8; 2];
        write_u16(&mut version, 0, stored.version_made_by());
        let mut attrs = [0u8; 4];
        write_u32(&mut attrs, 0, stored.external_attributes);

        let mut handle = self.store.open_write()?;
        handle.seek(SeekFrom::Start(info.header_offset + LFH_TIME_OFFSET))?;
        handle.write_all(&time)?;

        let central = info.central_header_offset;
        handle.seek(SeekFrom::Start(central + CDFH_VERSION_MADE_BY_OFFSET))?;
        handle.write_all(&version)?;
        handle.seek(SeekFrom::Start(central + CDFH_TIME_OFFSET))?;
        handle.write_all(&time)?;
        handle.seek(SeekFrom::Start(central + CDFH_EXTERNAL_ATTRS_OFFSET))?;
        handle.write_all(&attrs)?;
        handle.flush()?;

        debug!(name = %entry.name, "updated entry metadata");
        Ok(())
    }

    /// Close every gap between entries by moving them towards the start of
    /// the file, then rewrite the central directory behind the last one.
    ///
    /// Does nothing when the entries are already packed.
    pub fn defragment(&mut self) -> ZipResult<()> {
        self.require_write()?;
        let mut handle = self.store.open_write()?;

        let mut order: Vec<usize> = (0..self.entries.len()).collect();
        order.sort_by_key(|&i| self.entries[i].info.as_ref().map_or(0, |info| info.header_offset));

        let mut expected = 0u64;
        let mut moved = 0usize;
        for i in order {
            let entry = &self.entries[i];
            let info = entry_info(entry)?;
            let header_offset = info.header_offset;
            let data_offset = resolve_data_offset_with(&mut handle, info)?;
            let data_end = data_offset + entry.compressed_size;
            let block_end = data_end + data_descriptor_len(&mut handle, info, data_end)?;

            if header_offset < expected {
                return Err(ZipError::invalid(format!(
                    "entry {} overlaps the previous entry",
                    entry.name
                )));
            }
            if header_offset > expected {
                let delta = header_offset - expected;
                trace!(name = %entry.name, from = header_offset, to = expected, "moving entry");
                copy_within(&mut handle, header_offset, expected, block_end - header_offset)?;
                if let Some(info) = self.entries[i].info.as_mut() {
                    info.shift_left(delta);
                }
                moved += 1;
            }
            expected += block_end - header_offset;
        }

        if expected > self.cd_offset {
            return Err(ZipError::invalid(
                "entry data overlaps the central directory",
            ));
        }
        if moved == 0 && expected == self.cd_offset {
            debug!("archive already packed");
            return Ok(());
        }

        self.write_central_directory(&mut handle, expected)?;
        debug!(moved, cd_offset = expected, "defragmented archive");
        Ok(())
    }
}
