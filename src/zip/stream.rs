//! Per-entry data streams.
//!
//! The output side feeds entry content into the archive file, either
//! verbatim or through a raw Deflate compressor, while keeping a running
//! CRC32. The input side hands back exactly one entry's bytes.

use crc32fast::Hasher;
use flate2::read::DeflateDecoder;
use flate2::{Compress, Compression, FlushCompress, Status};
use std::io::{self, Read, Seek, Write};

use crate::io::SharedHandle;

use super::structures::CompressionMethod;

const SCRATCH_LEN: usize = 32 * 1024;

/// A raw Deflate compressor and its output scratch buffer, reused across
/// entries.
#[derive(Debug)]
pub struct Deflater {
    compress: Compress,
    buffer: Vec<u8>,
}

impl Deflater {
    pub fn new(level: Compression) -> Self {
        Self {
            compress: Compress::new(level, false),
            buffer: vec![0; SCRATCH_LEN],
        }
    }

    fn reset(&mut self) {
        self.compress.reset();
    }
}

/// What an output stream leaves behind once closed.
pub struct ClosedOutput<W> {
    /// The sink, still open.
    pub sink: W,
    pub crc32: u32,
    pub total_in: u64,
    pub total_out: u64,
    /// The compressor, ready for the next entry.
    pub deflater: Option<Deflater>,
}

/// Stored entry output: bytes pass through unchanged.
pub struct StoredOutput<W> {
    sink: W,
    crc: Hasher,
    total: u64,
}

impl<W: Write> StoredOutput<W> {
    pub fn new(sink: W) -> Self {
        Self {
            sink,
            crc: Hasher::new(),
            total: 0,
        }
    }
}

impl<W: Write> Write for StoredOutput<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.sink.write(buf)?;
        self.crc.update(&buf[..n]);
        self.total += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.sink.flush()
    }
}

/// Deflated entry output: bytes are compressed before reaching the sink.
pub struct DeflatedOutput<W> {
    sink: W,
    deflater: Deflater,
    crc: Hasher,
}

impl<W: Write> DeflatedOutput<W> {
    pub fn new(sink: W, deflater: Deflater) -> Self {
        Self {
            sink,
            deflater,
            crc: Hasher::new(),
        }
    }

    /// Run the compressor once and forward whatever it produced.
    /// Returns (bytes consumed, status).
    fn step(&mut self, input: &[u8], flush: FlushCompress) -> io::Result<(usize, Status)> {
        let Deflater { compress, buffer } = &mut self.deflater;
        let before_in = compress.total_in();
        let before_out = compress.total_out();
        let status = compress
            .compress(input, buffer, flush)
            .map_err(io::Error::other)?;
        let consumed = (compress.total_in() - before_in) as usize;
        let produced = (compress.total_out() - before_out) as usize;
        self.sink.write_all(&buffer[..produced])?;
        Ok((consumed, status))
    }
}

impl<W: Write> Write for DeflatedOutput<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut input = buf;
        while !input.is_empty() {
            let (consumed, _) = self.step(input, FlushCompress::None)?;
            input = &input[consumed..];
        }
        self.crc.update(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.sink.flush()
    }
}

/// Output adapter for one entry's content.
pub enum EntryOutput<W> {
    Stored(StoredOutput<W>),
    Deflated(DeflatedOutput<W>),
}

impl<W: Write> EntryOutput<W> {
    pub fn new(method: CompressionMethod, sink: W, deflater: Deflater) -> (Self, Option<Deflater>) {
        match method {
            CompressionMethod::Stored => (EntryOutput::Stored(StoredOutput::new(sink)), Some(deflater)),
            CompressionMethod::Deflated => {
                (EntryOutput::Deflated(DeflatedOutput::new(sink, deflater)), None)
            }
        }
    }

    /// Uncompressed bytes accepted so far.
    pub fn total_in(&self) -> u64 {
        match self {
            EntryOutput::Stored(s) => s.total,
            EntryOutput::Deflated(d) => d.deflater.compress.total_in(),
        }
    }

    /// Bytes handed to the sink so far.
    pub fn total_out(&self) -> u64 {
        match self {
            EntryOutput::Stored(s) => s.total,
            EntryOutput::Deflated(d) => d.deflater.compress.total_out(),
        }
    }

    /// CRC32 of the uncompressed bytes accepted so far.
    pub fn crc(&self) -> u32 {
        match self {
            EntryOutput::Stored(s) => s.crc.clone().finalize(),
            EntryOutput::Deflated(d) => d.crc.clone().finalize(),
        }
    }

    /// Drain the compressor. The sink is handed back open: the caller still
    /// has headers to patch and a central directory to write.
    pub fn close(self) -> io::Result<ClosedOutput<W>> {
        match self {
            EntryOutput::Stored(s) => Ok(ClosedOutput {
                sink: s.sink,
                crc32: s.crc.finalize(),
                total_in: s.total,
                total_out: s.total,
                deflater: None,
            }),
            EntryOutput::Deflated(mut d) => {
                loop {
                    let (_, status) = d.step(&[], FlushCompress::Finish)?;
                    if status == Status::StreamEnd {
                        break;
                    }
                }
                let total_in = d.deflater.compress.total_in();
                let total_out = d.deflater.compress.total_out();
                d.deflater.reset();
                Ok(ClosedOutput {
                    sink: d.sink,
                    crc32: d.crc.finalize(),
                    total_in,
                    total_out,
                    deflater: Some(d.deflater),
                })
            }
        }
    }
}

impl<W: Write> Write for EntryOutput<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            EntryOutput::Stored(s) => s.write(buf),
            EntryOutput::Deflated(d) => d.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            EntryOutput::Stored(s) => s.flush(),
            EntryOutput::Deflated(d) => d.flush(),
        }
    }
}

/// Reads `[start, end)` of the archive through a shared handle.
pub struct BoundedReader<H> {
    handle: SharedHandle<H>,
    pos: u64,
    end: u64,
}

impl<H: Read + Seek> BoundedReader<H> {
    pub fn new(handle: SharedHandle<H>, start: u64, len: u64) -> Self {
        Self {
            handle,
            pos: start,
            end: start + len,
        }
    }
}

impl<H: Read + Seek> Read for BoundedReader<H> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.pos >= self.end || buf.is_empty() {
            return Ok(0);
        }
        let max = buf.len().min((self.end - self.pos) as usize);
        let n = self.handle.read_at(self.pos, &mut buf[..max])?;
        if n == 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "entry data runs past end of archive",
            ));
        }
        self.pos += n as u64;
        Ok(n)
    }
}

enum Decoder<H: Read + Seek> {
    Stored(BoundedReader<H>),
    Deflated(DeflateDecoder<BoundedReader<H>>),
}

/// Reader over one entry's uncompressed content.
///
/// At end of stream the byte count and CRC32 are checked against the
/// central directory; a mismatch surfaces as [`io::ErrorKind::InvalidData`].
pub struct EntryReader<H: Read + Seek> {
    decoder: Decoder<H>,
    crc: Hasher,
    read: u64,
    expected_crc: u32,
    expected_size: u64,
    checked: bool,
}

impl<H: Read + Seek> EntryReader<H> {
    pub fn new(
        method: CompressionMethod,
        raw: BoundedReader<H>,
        expected_crc: u32,
        expected_size: u64,
    ) -> Self {
        let decoder = match method {
            CompressionMethod::Stored => Decoder::Stored(raw),
            CompressionMethod::Deflated => Decoder::Deflated(DeflateDecoder::new(raw)),
        };
        Self {
            decoder,
            crc: Hasher::new(),
            read: 0,
            expected_crc,
            expected_size,
            checked: false,
        }
    }

    fn check(&mut self) -> io::Result<()> {
        self.checked = true;
        if self.read != self.expected_size {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!(
                    "entry size mismatch: expected {} bytes, got {}",
                    self.expected_size, self.read
                ),
            ));
        }
        let crc = self.crc.clone().finalize();
        if crc != self.expected_crc {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!(
                    "CRC32 mismatch: expected {:08x}, got {:08x}",
                    self.expected_crc, crc
                ),
            ));
        }
        Ok(())
    }
}

impl<H: Read + Seek> Read for EntryReader<H> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = match &mut self.decoder {
            Decoder::Stored(r) => r.read(buf)?,
            Decoder::Deflated(r) => r.read(buf)?,
        };
        if n == 0 {
            if !buf.is_empty() && !self.checked {
                self.check()?;
            }
            return Ok(0);
        }
        self.crc.update(&buf[..n]);
        self.read += n as u64;
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn closed<W: Write>(output: EntryOutput<W>) -> ClosedOutput<W> {
        output.close().unwrap()
    }

    #[test]
    fn stored_output_counts_and_hashes() {
        let (mut out, spare) =
            EntryOutput::new(CompressionMethod::Stored, Vec::new(), Deflater::new(Compression::default()));
        assert!(spare.is_some());
        out.write_all(b"hel").unwrap();
        out.write_all(b"lo").unwrap();
        assert_eq!(out.total_in(), 5);
        assert_eq!(out.total_out(), 5);
        assert_eq!(out.crc(), 0x3610a686);

        let done = closed(out);
        assert_eq!(done.sink, b"hello");
        assert_eq!(done.crc32, 0x3610a686);
    }

    #[test]
    fn deflated_output_is_raw_deflate() {
        let data = vec![b'z'; 10_000];
        let (mut out, spare) =
            EntryOutput::new(CompressionMethod::Deflated, Vec::new(), Deflater::new(Compression::default()));
        assert!(spare.is_none());
        for chunk in data.chunks(333) {
            out.write_all(chunk).unwrap();
        }
        let done = closed(out);
        assert_eq!(done.total_in, 10_000);
        assert_eq!(done.total_out, done.sink.len() as u64);
        assert!(done.total_out < 200);
        assert_eq!(done.crc32, crc32fast::hash(&data));

        let mut inflated = Vec::new();
        DeflateDecoder::new(&done.sink[..])
            .read_to_end(&mut inflated)
            .unwrap();
        assert_eq!(inflated, data);
    }

    #[test]
    fn deflater_is_reusable_after_close() {
        let deflater = Deflater::new(Compression::fast());
        let (mut out, _) = EntryOutput::new(CompressionMethod::Deflated, Vec::new(), deflater);
        out.write_all(b"first entry").unwrap();
        let first = closed(out);

        let deflater = first.deflater.unwrap();
        let (mut out, _) = EntryOutput::new(CompressionMethod::Deflated, Vec::new(), deflater);
        out.write_all(b"second").unwrap();
        let second = closed(out);
        assert_eq!(second.total_in, 6);

        let mut inflated = String::new();
        DeflateDecoder::new(&second.sink[..])
            .read_to_string(&mut inflated)
            .unwrap();
        assert_eq!(inflated, "second");
    }

    #[test]
    fn empty_deflated_entry_still_terminates() {
        let (out, _) =
            EntryOutput::new(CompressionMethod::Deflated, Vec::new(), Deflater::new(Compression::default()));
        let done = closed(out);
        assert_eq!(done.total_in, 0);
        assert!(done.total_out > 0);
        assert_eq!(done.crc32, 0);
    }

    #[test]
    fn bounded_reader_stops_at_end() {
        let handle = SharedHandle::new(Cursor::new(b"xxhelloyy".to_vec()));
        let mut reader = BoundedReader::new(handle, 2, 5);
        let mut out = String::new();
        reader.read_to_string(&mut out).unwrap();
        assert_eq!(out, "hello");
    }

    #[test]
    fn bounded_reader_reports_truncation() {
        let handle = SharedHandle::new(Cursor::new(b"abc".to_vec()));
        let mut reader = BoundedReader::new(handle, 1, 10);
        let mut out = Vec::new();
        let err = reader.read_to_end(&mut out).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }

    #[test]
    fn entry_reader_verifies_crc() {
        let handle = SharedHandle::new(Cursor::new(b"hello".to_vec()));
        let mut good = EntryReader::new(
            CompressionMethod::Stored,
            BoundedReader::new(handle.clone(), 0, 5),
            0x3610a686,
            5,
        );
        let mut out = Vec::new();
        good.read_to_end(&mut out).unwrap();
        assert_eq!(out, b"hello");

        let mut bad = EntryReader::new(
            CompressionMethod::Stored,
            BoundedReader::new(handle, 0, 5),
            0xDEADBEEF,
            5,
        );
        let err = bad.read_to_end(&mut Vec::new()).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn readers_share_one_handle() {
        let handle = SharedHandle::new(Cursor::new(b"aaaabbbb".to_vec()));
        let mut a = BoundedReader::new(handle.clone(), 0, 4);
        let mut b = BoundedReader::new(handle, 4, 4);

        let mut buf = [0u8; 2];
        a.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"aa");
        b.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"bb");
        a.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"aa");
    }
}
