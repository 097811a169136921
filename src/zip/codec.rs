//! Little-endian integer helpers for fixed header offsets.
//!
//! Callers guarantee the buffer is long enough; header buffers are always
//! read with their full fixed size before any field is decoded.

use byteorder::{ByteOrder, LittleEndian};

#[inline]
pub fn read_u16(buf: &[u8], offset: usize) -> u16 {
    LittleEndian::read_u16(&buf[offset..offset + 2])
}

#[inline]
pub fn read_u32(buf: &[u8], offset: usize) -> u32 {
    LittleEndian::read_u32(&buf[offset..offset + 4])
}

#[inline]
pub fn write_u16(buf: &mut [u8], offset: usize, value: u16) {
    LittleEndian::write_u16(&mut buf[offset..offset + 2], value);
}

#[inline]
pub fn write_u32(buf: &mut [u8], offset: usize, value: u32) {
    LittleEndian::write_u32(&mut buf[offset..offset + 4], value);
}
