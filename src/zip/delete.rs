//! Removing entries.
//!
//! Which bytes move depends on where the entry sits:
//!
//! - the only entry: the archive collapses to a lone EOCD;
//! - the entry whose data sits last in the file: the central directory slides
//!   down over its local header and data, and the file shrinks;
//! - anywhere else: its local header and data are zeroed in place, leaving a
//!   hole for [`defragment`](ZipArchive::defragment), and only its central
//!   record is squeezed out.

use tracing::debug;

use crate::error::{ZipError, ZipResult};
use crate::io::Storage;

use super::archive::{ZipArchive, copy_within, entry_info, resolve_data_offset_with, zero_fill};

impl<S: Storage> ZipArchive<S> {
    /// Delete the entry called `name`.
    ///
    /// Deleting a directory name that has no entry of its own is a no-op.
    pub fn delete_entry(&mut self, name: &str) -> ZipResult<()> {
        let Some(&position) = self.index.get(name) else {
            if name.ends_with('/') {
                debug!(name, "no entry for directory, nothing to delete");
                return Ok(());
            }
            return Err(ZipError::EntryNotFound(name.to_string()));
        };
        self.require_write()?;

        let mut handle = self.store.open_write()?;
        if self.entries.len() == 1 {
            self.cd_offset = 0;
            self.cd_size = 0;
        } else if self.is_last_in_file(position) {
            self.delete_last(&mut handle, position)?;
        } else {
            self.delete_inner(&mut handle, position)?;
        }

        self.entries.remove(position);
        self.rebuild_index();
        self.write_end_record(&mut handle)?;
        debug!(name, remaining = self.entries.len(), "deleted entry");
        Ok(())
    }

    fn is_last_in_file(&self, position: usize) -> bool {
        let Some(offset) = self.entries[position].info.as_ref().map(|i| i.header_offset) else {
            return false;
        };
        self.entries
            .iter()
            .filter_map(|e| e.info.as_ref())
            .all(|i| i.header_offset <= offset)
    }

    /// Slide every other central record down to where the entry's local
    /// header began.
    fn delete_last(&mut self, handle: &mut S::Handle, position: usize) -> ZipResult<()> {
        let info = entry_info(&self.entries[position])?;
        let target = info.header_offset;
        let removed_start = info.central_header_offset;
        let removed_len = info.central_header_len;
        let removed_end = removed_start + removed_len;
        let cd_end = self.cd_offset + self.cd_size;
        if target > self.cd_offset || removed_start < self.cd_offset || removed_end > cd_end {
            return Err(ZipError::InvalidArchive(format!(
                "entry at {target} does not sit below the central directory at {}",
                self.cd_offset
            )));
        }

        let head_len = removed_start - self.cd_offset;
        copy_within(handle, self.cd_offset, target, head_len)?;
        copy_within(handle, removed_end, target + head_len, cd_end - removed_end)?;

        let before_delta = self.cd_offset - target;
        for (i, entry) in self.entries.iter_mut().enumerate() {
            if i == position {
                continue;
            }
            let Some(info) = entry.info.as_mut() else {
                continue;
            };
            if info.central_header_offset < removed_start {
                info.central_header_offset -= before_delta;
            } else {
                info.central_header_offset -= before_delta + removed_len;
            }
        }
        self.cd_offset = target;
        self.cd_size -= removed_len;
        Ok(())
    }

    /// Zero the entry's local header and data, then close the gap its
    /// central record leaves.
    fn delete_inner(&mut self, handle: &mut S::Handle, position: usize) -> ZipResult<()> {
        let entry = &self.entries[position];
        let info = entry_info(entry)?;
        let data_offset = resolve_data_offset_with(handle, info)?;
        let header_offset = info.header_offset;
        let data_end = data_offset + entry.compressed_size;
        if data_end > self.cd_offset {
            return Err(ZipError::InvalidArchive(format!(
                "data of entry at {header_offset} runs into the central directory"
            )));
        }
        // A trailing data descriptor is left as is.
        zero_fill(handle, header_offset, data_end - header_offset)?;

        let removed_start = info.central_header_offset;
        let removed_len = info.central_header_len;
        let removed_end = removed_start + removed_len;
        let cd_end = self.cd_offset + self.cd_size;
        copy_within(handle, removed_end, removed_start, cd_end - removed_end)?;

        for (i, entry) in self.entries.iter_mut().enumerate() {
            if i == position {
                continue;
            }
            if let Some(info) = entry.info.as_mut() {
                if info.central_header_offset > removed_start {
                    info.central_header_offset -= removed_len;
                }
            }
        }
        self.cd_size -= removed_len;
        Ok(())
    }
}
