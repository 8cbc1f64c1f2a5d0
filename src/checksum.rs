//! Content fingerprinting
//!
//! Calculates CRC32, MD5 and SHA1 for a stream in a single pass so large
//! disc images are only read once.

use std::fmt;
use std::io::{self, SeekFrom};

use md5::{Digest, Md5};
use sha1::Sha1;

use crate::stream::{RandomAccessStream, StreamExt};

/// Read chunk size used when hashing
pub const DEFAULT_CHUNK_SIZE: usize = 1024;

/// The (CRC32, MD5, SHA1) triple identifying some content
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint {
    /// Number of bytes that were hashed
    pub size: u64,
    pub crc32: u32,
    pub md5: Option<[u8; 16]>,
    pub sha1: Option<[u8; 20]>,
}

impl Fingerprint {
    /// Fingerprint known only by CRC32, e.g. from a zip central directory
    pub fn from_crc32(size: u64, crc32: u32) -> Self {
        Self { size, crc32, md5: None, sha1: None }
    }

    pub fn crc32_hex(&self) -> String {
        format!("{:08x}", self.crc32)
    }

    pub fn md5_hex(&self) -> Option<String> {
        self.md5.map(hex::encode)
    }

    pub fn sha1_hex(&self) -> Option<String> {
        self.sha1.map(hex::encode)
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "crc32={}", self.crc32_hex())?;
        if let Some(md5) = self.md5_hex() {
            write!(f, " md5={}", md5)?;
        }
        if let Some(sha1) = self.sha1_hex() {
            write!(f, " sha1={}", sha1)?;
        }
        Ok(())
    }
}

/// Single-pass CRC32 + MD5 + SHA1 hasher over a [`RandomAccessStream`]
#[derive(Debug, Clone)]
pub struct ChecksumEngine {
    chunk_size: usize,
}

impl Default for ChecksumEngine {
    fn default() -> Self {
        Self { chunk_size: DEFAULT_CHUNK_SIZE }
    }
}

impl ChecksumEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a different read size; zero falls back to the default
    pub fn with_chunk_size(chunk_size: usize) -> Self {
        Self {
            chunk_size: if chunk_size == 0 { DEFAULT_CHUNK_SIZE } else { chunk_size },
        }
    }

    /// Hash everything after the first `header_skip` bytes of `stream`
    ///
    /// The stream's position is restored before returning, also when an
    /// I/O error aborts the pass.
    pub fn compute<S: RandomAccessStream + ?Sized>(
        &self,
        stream: &mut S,
        header_skip: u64,
    ) -> io::Result<Fingerprint> {
        let original = stream.tell()?;
        let start = header_skip.min(stream.length());
        let result = self.hash_from(stream, start);

        match result {
            Ok(fingerprint) => {
                stream.seek(SeekFrom::Start(original))?;
                Ok(fingerprint)
            }
            Err(e) => {
                let _ = stream.seek(SeekFrom::Start(original));
                Err(e)
            }
        }
    }

    fn hash_from<S: RandomAccessStream + ?Sized>(&self, stream: &mut S, start: u64) -> io::Result<Fingerprint> {
        stream.seek(SeekFrom::Start(start))?;

        let mut buffer = vec![0u8; self.chunk_size];
        let mut crc32 = crc32fast::Hasher::new();
        let mut md5 = Md5::new();
        let mut sha1 = Sha1::new();
        let mut size = 0u64;

        loop {
            let bytes_read = stream.read_fully(&mut buffer)?;
            if bytes_read == 0 {
                break;
            }

            let chunk = &buffer[..bytes_read];
            crc32.update(chunk);
            md5.update(chunk);
            sha1.update(chunk);
            size += bytes_read as u64;
        }

        Ok(Fingerprint {
            size,
            crc32: crc32.finalize(),
            md5: Some(md5.finalize().into()),
            sha1: Some(sha1.finalize().into()),
        })
    }
}
