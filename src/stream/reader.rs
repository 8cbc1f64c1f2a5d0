//! Random access stream contract
//!
//! Every byte source in romdex (plain files, archive members, and the
//! address-translating decorators) implements [`RandomAccessStream`].
//! Format parsers only ever talk to this trait, so they never know whether
//! they are reading a file on disk or a decoded view of one.

use std::fs::File;
use std::io::{self, BufReader, Read, Seek, SeekFrom};
use std::path::Path;

use byteorder::{BigEndian, LittleEndian};
use thiserror::Error;

/// Errors raised by the stream layer
#[derive(Error, Debug)]
pub enum StreamError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Bad magic: expected {expected:#010x}, found {found:#010x}")]
    BadMagic { expected: u32, found: u32 },

    #[error("Corrupt container: {0}")]
    CorruptContainer(String),

    #[error("Block {block} hash mismatch: expected {expected:08x}, found {actual:08x}")]
    HashMismatch { block: u32, expected: u32, actual: u32 },
}

impl StreamError {
    /// Recover a typed stream error that travelled through `Read::read`
    ///
    /// Decorators can only return `io::Error` from the std traits, so
    /// structural faults are boxed inside one. This undoes that boxing.
    pub fn from_io(err: io::Error) -> Self {
        if err.get_ref().is_some_and(|inner| inner.is::<StreamError>()) {
            let kind = err.kind();
            return match err.into_inner().map(|inner| inner.downcast::<StreamError>()) {
                Some(Ok(inner)) => *inner,
                _ => StreamError::Io(io::Error::from(kind)),
            };
        }
        StreamError::Io(err)
    }

    /// True for faults that mean the dump itself is bad rather than the disk
    pub fn is_corrupt(&self) -> bool {
        matches!(self, Self::CorruptContainer(_) | Self::HashMismatch { .. } | Self::BadMagic { .. })
    }
}

impl From<StreamError> for io::Error {
    fn from(err: StreamError) -> Self {
        match err {
            StreamError::Io(e) => e,
            other => io::Error::new(io::ErrorKind::InvalidData, other),
        }
    }
}

/// A seekable, read-only byte stream with a fixed logical length
pub trait RandomAccessStream: Read + Seek {
    /// Logical length in bytes, fixed for the lifetime of the stream
    fn length(&self) -> u64;

    /// Blocks read so far whose stored bytes failed their integrity hash
    fn block_hash_mismatches(&self) -> &[u32] {
        &[]
    }
}

impl<S: RandomAccessStream + ?Sized> RandomAccessStream for Box<S> {
    fn length(&self) -> u64 {
        (**self).length()
    }

    fn block_hash_mismatches(&self) -> &[u32] {
        (**self).block_hash_mismatches()
    }
}

impl<S: RandomAccessStream + ?Sized> RandomAccessStream for &mut S {
    fn length(&self) -> u64 {
        (**self).length()
    }

    fn block_hash_mismatches(&self) -> &[u32] {
        (**self).block_hash_mismatches()
    }
}

/// Resolve a seek request against a stream of `length` bytes
///
/// Positions outside `[0, length]` are rejected so every stream type
/// agrees on what a legal position is.
pub(crate) fn resolve_seek(current: u64, length: u64, pos: SeekFrom) -> io::Result<u64> {
    let target = match pos {
        SeekFrom::Start(offset) => Some(offset),
        SeekFrom::Current(delta) => current.checked_add_signed(delta),
        SeekFrom::End(delta) => length.checked_add_signed(delta),
    };

    match target {
        Some(target) if target <= length => Ok(target),
        _ => Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("seek {:?} from {} outside stream of {} bytes", pos, current, length),
        )),
    }
}

/// Text encodings understood by [`StreamExt::read_string`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextEncoding {
    Ascii,
    Latin1,
    Utf8,
    Utf16Le,
    Utf16Be,
}

impl TextEncoding {
    /// Decode `bytes`, replacing invalid sequences and dropping NUL padding
    pub fn decode(&self, bytes: &[u8]) -> String {
        let text: String = match self {
            Self::Ascii => bytes
                .iter()
                .map(|&b| if b.is_ascii() { b as char } else { char::REPLACEMENT_CHARACTER })
                .collect(),
            Self::Latin1 => bytes.iter().map(|&b| b as char).collect(),
            Self::Utf8 => String::from_utf8_lossy(bytes).into_owned(),
            Self::Utf16Le | Self::Utf16Be => {
                let units = bytes.chunks_exact(2).map(|pair| match self {
                    Self::Utf16Le => u16::from_le_bytes([pair[0], pair[1]]),
                    _ => u16::from_be_bytes([pair[0], pair[1]]),
                });
                char::decode_utf16(units)
                    .map(|c| c.unwrap_or(char::REPLACEMENT_CHARACTER))
                    .collect()
            }
        };
        text.trim_end_matches('\0').to_string()
    }
}

/// Convenience readers shared by every [`RandomAccessStream`]
pub trait StreamExt: RandomAccessStream {
    /// Current logical position
    fn tell(&mut self) -> io::Result<u64> {
        self.stream_position()
    }

    /// Move to an absolute logical position
    fn seek_to(&mut self, position: u64) -> io::Result<u64> {
        self.seek(SeekFrom::Start(position))
    }

    /// Bytes left between the current position and the end
    fn remaining(&mut self) -> io::Result<u64> {
        let position = self.tell()?;
        Ok(self.length().saturating_sub(position))
    }

    /// Fill `buf` as far as the stream allows
    ///
    /// Only returns fewer than `buf.len()` bytes at end of stream, and 0
    /// once nothing is left.
    fn read_fully(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut filled = 0;
        while filled < buf.len() {
            match self.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(filled)
    }

    /// Read exactly `count` bytes
    fn read_bytes(&mut self, count: usize) -> io::Result<Vec<u8>> {
        let mut buffer = vec![0u8; count];
        self.read_exact(&mut buffer)?;
        Ok(buffer)
    }

    fn read_u8(&mut self) -> io::Result<u8> {
        byteorder::ReadBytesExt::read_u8(self)
    }

    fn read_u16_le(&mut self) -> io::Result<u16> {
        byteorder::ReadBytesExt::read_u16::<LittleEndian>(self)
    }

    fn read_u16_be(&mut self) -> io::Result<u16> {
        byteorder::ReadBytesExt::read_u16::<BigEndian>(self)
    }

    fn read_u32_le(&mut self) -> io::Result<u32> {
        byteorder::ReadBytesExt::read_u32::<LittleEndian>(self)
    }

    fn read_u32_be(&mut self) -> io::Result<u32> {
        byteorder::ReadBytesExt::read_u32::<BigEndian>(self)
    }

    /// Read `count` bytes and decode them as text
    fn read_string(&mut self, count: usize, encoding: TextEncoding) -> io::Result<String> {
        let bytes = self.read_bytes(count)?;
        Ok(encoding.decode(&bytes))
    }
}

impl<S: RandomAccessStream + ?Sized> StreamExt for S {}

/// Stream over a plain file on disk
pub struct FileStream {
    file: BufReader<File>,
    length: u64,
    position: u64,
}

impl FileStream {
    /// Open a file for reading; its length is captured once, here
    pub fn open(path: &Path) -> io::Result<Self> {
        let file = File::open(path)?;
        let length = file.metadata()?.len();
        Ok(Self {
            file: BufReader::new(file),
            length,
            position: 0,
        })
    }
}

impl Read for FileStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let available = self.length.saturating_sub(self.position);
        let wanted = (buf.len() as u64).min(available) as usize;
        if wanted == 0 {
            return Ok(0);
        }
        let n = self.file.read(&mut buf[..wanted])?;
        self.position += n as u64;
        Ok(n)
    }
}

impl Seek for FileStream {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let target = resolve_seek(self.position, self.length, pos)?;
        if target != self.position {
            // Relative seeks keep the BufReader's buffer when the target is inside it
            let delta = target as i64 - self.position as i64;
            self.file.seek_relative(delta)?;
            self.position = target;
        }
        Ok(target)
    }
}

impl RandomAccessStream for FileStream {
    fn length(&self) -> u64 {
        self.length
    }
}

/// In-memory stream, used for archive members
#[derive(Debug, Clone, Default)]
pub struct MemoryStream {
    data: Vec<u8>,
    position: u64,
}

impl MemoryStream {
    pub fn new(data: Vec<u8>) -> Self {
        Self { data, position: 0 }
    }

    pub fn get_ref(&self) -> &[u8] {
        &self.data
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.data
    }
}

impl From<Vec<u8>> for MemoryStream {
    fn from(data: Vec<u8>) -> Self {
        Self::new(data)
    }
}

impl Read for MemoryStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let start = self.position as usize;
        let n = buf.len().min(self.data.len() - start);
        buf[..n].copy_from_slice(&self.data[start..start + n]);
        self.position += n as u64;
        Ok(n)
    }
}

impl Seek for MemoryStream {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.position = resolve_seek(self.position, self.data.len() as u64, pos)?;
        Ok(self.position)
    }
}

impl RandomAccessStream for MemoryStream {
    fn length(&self) -> u64 {
        self.data.len() as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_typed_readers() {
        let mut stream = MemoryStream::new(vec![0x12, 0x34, 0x56, 0x78, 0x9A, 0xBC, 0xDE, 0xF0, 0x01]);

        assert_eq!(stream.read_u16_be().unwrap(), 0x1234);
        assert_eq!(stream.read_u16_le().unwrap(), 0x7856);
        assert_eq!(stream.read_u32_be().unwrap(), 0x9ABCDEF0);
        assert_eq!(StreamExt::read_u8(&mut stream).unwrap(), 0x01);
        assert!(stream.read_u32_le().is_err());
    }

    #[test]
    fn test_read_string_encodings() {
        let mut stream = MemoryStream::new(b"SUPER MARIO\0\0\0\0\0".to_vec());
        assert_eq!(stream.read_string(16, TextEncoding::Ascii).unwrap(), "SUPER MARIO");

        assert_eq!(TextEncoding::Latin1.decode(&[0x43, 0xE9]), "C\u{e9}");
        assert_eq!(TextEncoding::Utf16Le.decode(&[0x41, 0x00, 0x42, 0x00]), "AB");
        assert_eq!(TextEncoding::Utf16Be.decode(&[0x00, 0x41, 0x00, 0x00]), "A");
        assert_eq!(TextEncoding::Ascii.decode(&[0x41, 0xFF]), "A\u{fffd}");
    }

    #[test]
    fn test_read_fully_short_only_at_end() {
        let mut stream = MemoryStream::new(vec![7u8; 10]);
        let mut buf = [0u8; 6];
        assert_eq!(stream.read_fully(&mut buf).unwrap(), 6);
        assert_eq!(stream.read_fully(&mut buf).unwrap(), 4);
        assert_eq!(stream.read_fully(&mut buf).unwrap(), 0);
    }

    #[test]
    fn test_memory_stream_rejects_seek_past_end() {
        let mut stream = MemoryStream::new(vec![1, 2, 3, 4]);
        assert_eq!(stream.seek(SeekFrom::Start(4)).unwrap(), 4);

        let err = stream.seek(SeekFrom::Start(5)).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
        assert!(stream.seek(SeekFrom::Current(-5)).is_err());

        // A failed seek leaves the position alone
        assert_eq!(stream.tell().unwrap(), 4);
        assert_eq!(stream.read_bytes(0).unwrap(), Vec::<u8>::new());
        stream.seek_to(1).unwrap();
        assert_eq!(stream.read_bytes(3).unwrap(), vec![2, 3, 4]);
    }

    #[test]
    fn test_resolve_seek_bounds() {
        assert_eq!(resolve_seek(5, 10, SeekFrom::Current(-5)).unwrap(), 0);
        assert_eq!(resolve_seek(5, 10, SeekFrom::End(0)).unwrap(), 10);
        assert!(resolve_seek(5, 10, SeekFrom::Current(-6)).is_err());
        assert!(resolve_seek(0, 10, SeekFrom::Start(11)).is_err());
    }

    #[test]
    fn test_file_stream() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(&(0u8..=255).collect::<Vec<_>>()).unwrap();
        file.flush().unwrap();

        let mut stream = FileStream::open(file.path()).unwrap();
        assert_eq!(stream.length(), 256);

        stream.seek_to(200).unwrap();
        assert_eq!(StreamExt::read_u8(&mut stream).unwrap(), 200);
        stream.seek(SeekFrom::Current(-101)).unwrap();
        assert_eq!(StreamExt::read_u8(&mut stream).unwrap(), 100);
        assert_eq!(stream.tell().unwrap(), 101);

        stream.seek(SeekFrom::End(-1)).unwrap();
        assert_eq!(stream.read_bytes(1).unwrap(), vec![255]);
        assert_eq!(stream.remaining().unwrap(), 0);
        assert!(stream.seek(SeekFrom::End(1)).is_err());
    }

    #[test]
    fn test_stream_error_round_trips_through_io() {
        let io_err: io::Error = StreamError::CorruptContainer("bad table".into()).into();
        assert_eq!(io_err.kind(), io::ErrorKind::InvalidData);

        let back = StreamError::from_io(io_err);
        assert!(matches!(back, StreamError::CorruptContainer(ref s) if s == "bad table"));
        assert!(back.is_corrupt());

        let plain = StreamError::from_io(io::Error::from(io::ErrorKind::UnexpectedEof));
        assert!(matches!(plain, StreamError::Io(_)));
        assert!(!plain.is_corrupt());
    }
}
