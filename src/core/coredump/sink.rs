//! Coredump sinks: serial hex, persistent RAM buffer, optional filesystem
//!
//! All three speak the same `CoredumpSink` contract so the ELF emitter in
//! [`super::elf`] never needs to know which one it's writing to.

use core::fmt::Write as _;

use crate::config::CFG_COREDUMP_FILE_PREFIX;
use crate::error::{OsError, OsResult};

use super::crc32::Crc32;

/// Uniform sink contract every coredump destination implements.
///
/// `write` is called repeatedly, in order, as the emitter produces bytes.
/// `finish` is a hook fired once at the end of a dump; only the persistent
/// RAM sink uses it (to stamp the final length/CRC32 header).
pub trait CoredumpSink {
    fn write(&mut self, bytes: &[u8]) -> OsResult<()>;

    fn finish(&mut self) -> OsResult<()> {
        Ok(())
    }
}

/// A byte-stream writer, modelling whatever UART/logging backend the
/// board-support crate supplies. The serial coredump sink is generic over
/// this rather than naming a concrete driver.
pub trait ByteSink {
    fn write_bytes(&mut self, bytes: &[u8]) -> OsResult<()>;
}

/// The optional filesystem sink's only dependency, so the core never
/// names a concrete filesystem crate.
pub trait CoredumpFs {
    fn create_and_write(&mut self, name: &str, bytes: &[u8]) -> OsResult<()>;
}

/// Emits each byte as two ASCII hex digits, bracketed by the
/// `coredump start : {` / `} coredump end` markers and a trailing CRC32
/// line, matching the original serial dump format byte for byte.
pub struct SerialSink<W> {
    writer: W,
    crc: Crc32,
    started: bool,
}

const HEX_DIGITS: &[u8; 16] = b"0123456789abcdef";

impl<W: ByteSink> SerialSink<W> {
    pub fn new(writer: W) -> Self {
        SerialSink { writer, crc: Crc32::new(), started: false }
    }

    fn ensure_started(&mut self) -> OsResult<()> {
        if !self.started {
            self.writer.write_bytes(b"coredump start : {\n")?;
            self.started = true;
        }
        Ok(())
    }
}

impl<W: ByteSink> CoredumpSink for SerialSink<W> {
    fn write(&mut self, bytes: &[u8]) -> OsResult<()> {
        self.ensure_started()?;
        self.crc.update(bytes);

        let mut hex = [0u8; 2];
        for &byte in bytes {
            hex[0] = HEX_DIGITS[(byte >> 4) as usize];
            hex[1] = HEX_DIGITS[(byte & 0x0F) as usize];
            self.writer.write_bytes(&hex)?;
        }
        Ok(())
    }

    fn finish(&mut self) -> OsResult<()> {
        self.ensure_started()?;
        self.writer.write_bytes(b"\n} coredump end\n")?;

        let crc = self.crc.finalize();
        let mut line = FixedStr::<32>::new();
        let _ = write!(line, "crc32 : {:08x}\n", crc);
        self.writer.write_bytes(line.as_bytes())
    }
}

/// `[u32 magic][u32 length][u32 crc32][u8 payload[length]]` in a fixed-
/// size no-init-section buffer. Appends payload bytes as they stream in;
/// `finish` stamps the header once the final length/CRC32 are known.
pub const PERSISTENT_MAGIC: u32 = 0x434D_4450; // "CMDP"
const HEADER_LEN: usize = 12;

pub struct RamSink<'a> {
    buf: &'a mut [u8],
    written: usize,
    crc: Crc32,
    overflowed: bool,
}

impl<'a> RamSink<'a> {
    /// `buf` must be at least [`HEADER_LEN`] bytes; the payload occupies
    /// whatever remains after the 12-byte magic/length/crc header.
    pub fn new(buf: &'a mut [u8]) -> Self {
        RamSink { buf, written: 0, crc: Crc32::new(), overflowed: false }
    }

    fn capacity(&self) -> usize {
        self.buf.len().saturating_sub(HEADER_LEN)
    }
}

impl<'a> CoredumpSink for RamSink<'a> {
    fn write(&mut self, bytes: &[u8]) -> OsResult<()> {
        if self.written + bytes.len() > self.capacity() {
            self.overflowed = true;
            return Err(OsError::CoredumpOverflow);
        }
        let start = HEADER_LEN + self.written;
        self.buf[start..start + bytes.len()].copy_from_slice(bytes);
        self.crc.update(bytes);
        self.written += bytes.len();
        Ok(())
    }

    fn finish(&mut self) -> OsResult<()> {
        if self.overflowed {
            return Err(OsError::CoredumpOverflow);
        }
        let length = self.written as u32;
        let crc = self.crc.finalize();
        self.buf[0..4].copy_from_slice(&PERSISTENT_MAGIC.to_le_bytes());
        self.buf[4..8].copy_from_slice(&length.to_le_bytes());
        self.buf[8..12].copy_from_slice(&crc.to_le_bytes());
        Ok(())
    }
}

/// Validate a persistent RAM frame (magic + CRC32 over its payload) and
/// return the payload slice, so a later boot can promote it to another
/// sink without re-running the dump.
pub fn read_persistent_frame(buf: &[u8]) -> OsResult<&[u8]> {
    if buf.len() < HEADER_LEN {
        return Err(OsError::CoredumpOverflow);
    }
    let magic = u32::from_le_bytes(buf[0..4].try_into().unwrap());
    if magic != PERSISTENT_MAGIC {
        return Err(OsError::CoredumpCrcMismatch);
    }
    let length = u32::from_le_bytes(buf[4..8].try_into().unwrap()) as usize;
    let stored_crc = u32::from_le_bytes(buf[8..12].try_into().unwrap());

    let payload = buf.get(HEADER_LEN..HEADER_LEN + length).ok_or(OsError::CoredumpOverflow)?;
    let mut crc = Crc32::new();
    crc.update(payload);
    if crc.finalize() != stored_crc {
        return Err(OsError::CoredumpCrcMismatch);
    }
    Ok(payload)
}

/// Calendar time as supplied by the clock-source collaborator (`§6`);
/// the coredump core only ever needs it to name a file.
#[derive(Debug, Clone, Copy)]
pub struct Timestamp {
    pub year: u16,
    pub month: u8,
    pub day: u8,
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
}

/// `core::fmt::Write`-backed byte buffer, sized for one filename, so the
/// filesystem sink never needs a heap allocator to format a name.
struct FixedStr<const N: usize> {
    buf: [u8; N],
    len: usize,
}

impl<const N: usize> FixedStr<N> {
    fn new() -> Self {
        FixedStr { buf: [0; N], len: 0 }
    }

    fn as_bytes(&self) -> &[u8] {
        &self.buf[..self.len]
    }

    fn as_str(&self) -> &str {
        core::str::from_utf8(self.as_bytes()).unwrap_or("")
    }
}

impl<const N: usize> core::fmt::Write for FixedStr<N> {
    fn write_str(&mut self, s: &str) -> core::fmt::Result {
        let bytes = s.as_bytes();
        if self.len + bytes.len() > N {
            return Err(core::fmt::Error);
        }
        self.buf[self.len..self.len + bytes.len()].copy_from_slice(bytes);
        self.len += bytes.len();
        Ok(())
    }
}

/// Builds `<prefix>YYYYMMDD_hhmmss.elf`, writing into `out` and returning
/// the formatted `&str` slice of it.
pub fn create_coredump_filename<'a>(ts: Timestamp, out: &'a mut [u8; 40]) -> &'a str {
    let mut name = FixedStr::<40>::new();
    let _ = write!(
        name,
        "{}{:04}{:02}{:02}_{:02}{:02}{:02}.elf",
        CFG_COREDUMP_FILE_PREFIX,
        ts.year,
        ts.month,
        ts.day,
        ts.hour,
        ts.minute,
        ts.second,
    );
    let len = name.len;
    out[..len].copy_from_slice(&name.buf[..len]);
    core::str::from_utf8(&out[..len]).unwrap_or("")
}

/// Buffers a whole ELF coredump and hands it to a [`CoredumpFs`]
/// collaborator in one shot at `finish`, under a timestamped name. `N`
/// bounds the largest coredump this sink can hold.
pub struct FsSink<'a, F, const N: usize> {
    fs: F,
    timestamp: Timestamp,
    buf: [u8; N],
    len: usize,
    _marker: core::marker::PhantomData<&'a ()>,
}

impl<'a, F: CoredumpFs, const N: usize> FsSink<'a, F, N> {
    pub fn new(fs: F, timestamp: Timestamp) -> Self {
        FsSink { fs, timestamp, buf: [0; N], len: 0, _marker: core::marker::PhantomData }
    }
}

impl<'a, F: CoredumpFs, const N: usize> CoredumpSink for FsSink<'a, F, N> {
    fn write(&mut self, bytes: &[u8]) -> OsResult<()> {
        if self.len + bytes.len() > N {
            return Err(OsError::CoredumpOverflow);
        }
        self.buf[self.len..self.len + bytes.len()].copy_from_slice(bytes);
        self.len += bytes.len();
        Ok(())
    }

    fn finish(&mut self) -> OsResult<()> {
        let mut name_buf = [0u8; 40];
        let name = create_coredump_filename(self.timestamp, &mut name_buf);
        self.fs.create_and_write(name, &self.buf[..self.len])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct VecByteSink {
        out: [u8; 512],
        len: usize,
    }

    impl VecByteSink {
        fn new() -> Self {
            VecByteSink { out: [0; 512], len: 0 }
        }
        fn as_str(&self) -> &str {
            core::str::from_utf8(&self.out[..self.len]).unwrap()
        }
    }

    impl ByteSink for VecByteSink {
        fn write_bytes(&mut self, bytes: &[u8]) -> OsResult<()> {
            self.out[self.len..self.len + bytes.len()].copy_from_slice(bytes);
            self.len += bytes.len();
            Ok(())
        }
    }

    #[test]
    fn serial_sink_brackets_and_hex_encodes() {
        let mut sink = SerialSink::new(VecByteSink::new());
        sink.write(&[0xDE, 0xAD]).unwrap();
        sink.finish().unwrap();

        let out = sink.writer.as_str();
        assert!(out.starts_with("coredump start : {\n"));
        assert!(out.contains("dead"));
        assert!(out.contains("} coredump end\n"));
        assert!(out.contains("crc32 : "));
    }

    #[test]
    fn serial_sink_idempotent_crc_footer() {
        let mut first = SerialSink::new(VecByteSink::new());
        first.write(b"payload").unwrap();
        first.finish().unwrap();

        let mut second = SerialSink::new(VecByteSink::new());
        second.write(b"payload").unwrap();
        second.finish().unwrap();

        assert_eq!(first.writer.as_str(), second.writer.as_str());
    }

    #[test]
    fn ram_sink_round_trips_through_persistent_frame() {
        let mut buf = [0u8; 64];
        {
            let mut sink = RamSink::new(&mut buf);
            sink.write(b"hello").unwrap();
            sink.write(b"world").unwrap();
            sink.finish().unwrap();
        }

        let payload = read_persistent_frame(&buf).unwrap();
        assert_eq!(payload, b"helloworld");
    }

    #[test]
    fn ram_sink_overflow_is_reported() {
        let mut buf = [0u8; HEADER_LEN + 4];
        let mut sink = RamSink::new(&mut buf);
        assert_eq!(sink.write(&[0u8; 8]), Err(OsError::CoredumpOverflow));
    }

    #[test]
    fn read_persistent_frame_detects_crc_mismatch() {
        let mut buf = [0u8; 32];
        {
            let mut sink = RamSink::new(&mut buf);
            sink.write(b"abc").unwrap();
            sink.finish().unwrap();
        }
        buf[HEADER_LEN] ^= 0xFF; // corrupt one payload byte
        assert_eq!(read_persistent_frame(&buf), Err(OsError::CoredumpCrcMismatch));
    }

    #[test]
    fn filename_matches_timestamp_format() {
        let ts = Timestamp { year: 2026, month: 7, day: 28, hour: 9, minute: 5, second: 3 };
        let mut out = [0u8; 40];
        let name = create_coredump_filename(ts, &mut out);
        assert_eq!(name, "core_20260728_090503.elf");
    }

    struct FakeFs {
        last_name: [u8; 40],
        last_len: usize,
        last_bytes_len: usize,
    }

    impl CoredumpFs for FakeFs {
        fn create_and_write(&mut self, name: &str, bytes: &[u8]) -> OsResult<()> {
            self.last_len = name.len();
            self.last_name[..name.len()].copy_from_slice(name.as_bytes());
            self.last_bytes_len = bytes.len();
            Ok(())
        }
    }

    #[test]
    fn fs_sink_writes_once_on_finish() {
        let fs = FakeFs { last_name: [0; 40], last_len: 0, last_bytes_len: 0 };
        let ts = Timestamp { year: 2026, month: 1, day: 1, hour: 0, minute: 0, second: 0 };
        let mut sink: FsSink<'_, FakeFs, 128> = FsSink::new(fs, ts);
        sink.write(b"elf-bytes").unwrap();
        sink.finish().unwrap();
        assert_eq!(sink.fs.last_bytes_len, 9);
        assert_eq!(&sink.fs.last_name[..sink.fs.last_len], b"core_20260101_000000.elf");
    }
}
