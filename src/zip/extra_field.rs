//! ZIP file extra field
//!
//! Extra data blocks are never interpreted. Each block is kept byte for byte
//! so an archive can be rewritten without losing anything another tool put
//! there.

use std::io::Write;

use super::codec::read_u16;

/// The extra data blocks attached to one entry.
///
/// Bytes that do not form a complete `(id, size, data)` block are kept in
/// `trailing` and written back after the blocks unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtraFields {
    pub values: Vec<ExtraField>,
    pub trailing: Vec<u8>,
}

impl ExtraFields {
    /// Split an extra field area into its blocks.
    pub fn parse(bytes: &[u8]) -> Self {
        let mut values = Vec::new();
        let mut pos = 0;
        while pos + 4 <= bytes.len() {
            let header_id = read_u16(bytes, pos);
            let size = read_u16(bytes, pos + 2) as usize;
            if pos + 4 + size > bytes.len() {
                break;
            }
            values.push(ExtraField::new(header_id, &bytes[pos + 4..pos + 4 + size]));
            pos += 4 + size;
        }
        Self {
            values,
            trailing: bytes[pos..].to_vec(),
        }
    }

    pub fn data_length(&self, central_header: bool) -> usize {
        self.values
            .iter()
            .map(|f| 4 + f.data(central_header).len())
            .sum::<usize>()
            + self.trailing.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty() && self.trailing.is_empty()
    }

    pub fn get(&self, header_id: u16) -> Option<&ExtraField> {
        self.values.iter().find(|f| f.header_id == header_id)
    }

    pub fn write<W: Write>(&self, writer: &mut W, central_header: bool) -> std::io::Result<()> {
        for field in &self.values {
            field.write(writer, central_header)?;
        }
        writer.write_all(&self.trailing)
    }

    pub fn to_bytes(&self, central_header: bool) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.data_length(central_header));
        // Writing into a Vec cannot fail.
        let _ = self.write(&mut out, central_header);
        out
    }
}

/// One opaque extra data block.
///
/// The central directory copy of a block may differ from the local header
/// copy; `central_data` is `None` when both are the same.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtraField {
    pub header_id: u16,
    local_data: Vec<u8>,
    central_data: Option<Vec<u8>>,
}

impl ExtraField {
    pub fn new(header_id: u16, data: &[u8]) -> Self {
        Self {
            header_id,
            local_data: data.to_vec(),
            central_data: None,
        }
    }

    pub fn local_data(&self) -> &[u8] {
        &self.local_data
    }

    /// Central directory data, falling back to the local data.
    pub fn central_data(&self) -> &[u8] {
        self.central_data.as_deref().unwrap_or(&self.local_data)
    }

    pub fn set_central_data(&mut self, data: Vec<u8>) {
        self.central_data = if data == self.local_data {
            None
        } else {
            Some(data)
        };
    }

    #[inline]
    fn data(&self, central_header: bool) -> &[u8] {
        if central_header {
            self.central_data()
        } else {
            self.local_data()
        }
    }

    pub fn write<W: Write>(&self, writer: &mut W, central_header: bool) -> std::io::Result<()> {
        let data = self.data(central_header);
        // Header ID
        writer.write_all(&self.header_id.to_le_bytes())?;
        // Field data size
        debug_assert!(data.len() <= u16::MAX as usize);
        writer.write_all(&(data.len() as u16).to_le_bytes())?;
        writer.write_all(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_keeps_blocks_verbatim() {
        let raw = [
            0x55, 0x54, 0x05, 0x00, 0x03, 0x10, 0x20, 0x30, 0x40, // 0x5455, 5 bytes
            0x75, 0x78, 0x00, 0x00, // 0x7875, empty
        ];
        let fields = ExtraFields::parse(&raw);
        assert_eq!(fields.values.len(), 2);
        assert_eq!(fields.values[0].header_id, 0x5455);
        assert_eq!(fields.values[0].local_data(), &raw[4..9]);
        assert!(fields.trailing.is_empty());
        assert_eq!(fields.to_bytes(false), raw);
        assert_eq!(fields.to_bytes(true), raw);
    }

    #[test]
    fn malformed_tail_is_preserved() {
        let raw = [0x0a, 0x00, 0x10, 0x00, 0x01, 0x02, 0x03];
        let fields = ExtraFields::parse(&raw);
        assert!(fields.values.is_empty());
        assert_eq!(fields.trailing, raw);
        assert_eq!(fields.data_length(false), raw.len());
        assert_eq!(fields.to_bytes(true), raw);
    }

    #[test]
    fn central_data_defaults_to_local() {
        let mut field = ExtraField::new(0x5455, &[1, 2, 3]);
        assert_eq!(field.central_data(), &[1, 2, 3]);
        field.set_central_data(vec![1]);
        assert_eq!(field.central_data(), &[1]);
        assert_eq!(field.local_data(), &[1, 2, 3]);
    }
}
