//! Raw CD sector remapping
//!
//! A raw CD image stores every 2048-byte user data payload between a sync +
//! address header and an EDC/ECC footer. [`SectorRemapStream`] hides that
//! framing and exposes only the payload bytes as one contiguous stream.

use std::io::{self, Read, Seek, SeekFrom};

use super::reader::{RandomAccessStream, StreamError};
use super::resolve_seek;

/// CD sector size for raw data (2352 bytes)
const CD_SECTOR_SIZE_RAW: u64 = 2352;

/// CD sector size for cooked data (2048 bytes)
const CD_SECTOR_SIZE_COOKED: u64 = 2048;

/// Offset to user data in a raw Mode 1 sector (12 sync + 4 header)
const MODE1_DATA_OFFSET: u64 = 16;

/// Offset to user data in a raw Mode 2 Form 1 sector (12 sync + 4 header + 8 subheader)
const MODE2_FORM1_DATA_OFFSET: u64 = 24;

/// Geometry of one physical sector
///
/// Only constructible through [`SectorLayout::new`] or the constants, so the
/// payload is always non-empty and fits inside the raw sector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SectorLayout {
    raw_size: u64,
    header_size: u64,
    payload_size: u64,
}

impl SectorLayout {
    /// Raw Mode 1: 16-byte header, 2048 data, 288-byte EDC/ECC footer
    pub const MODE1_RAW: Self = Self {
        raw_size: CD_SECTOR_SIZE_RAW,
        header_size: MODE1_DATA_OFFSET,
        payload_size: CD_SECTOR_SIZE_COOKED,
    };

    /// Raw Mode 2 Form 1: 24-byte header, 2048 data, 280-byte EDC/ECC footer
    pub const MODE2_FORM1_RAW: Self = Self {
        raw_size: CD_SECTOR_SIZE_RAW,
        header_size: MODE2_FORM1_DATA_OFFSET,
        payload_size: CD_SECTOR_SIZE_COOKED,
    };

    /// Already-cooked 2048-byte sectors (identity mapping)
    pub const COOKED: Self = Self {
        raw_size: CD_SECTOR_SIZE_COOKED,
        header_size: 0,
        payload_size: CD_SECTOR_SIZE_COOKED,
    };

    /// Build a custom layout
    pub fn new(raw_size: u64, header_size: u64, payload_size: u64) -> Result<Self, StreamError> {
        let fits = header_size
            .checked_add(payload_size)
            .is_some_and(|used| used <= raw_size);
        if payload_size == 0 || !fits {
            return Err(StreamError::CorruptContainer(format!(
                "invalid sector layout: raw={}, header={}, payload={}",
                raw_size, header_size, payload_size
            )));
        }
        Ok(Self { raw_size, header_size, payload_size })
    }

    /// Physical sector size including header and footer
    pub const fn raw_size(&self) -> u64 {
        self.raw_size
    }

    /// Bytes before the payload
    pub const fn header_size(&self) -> u64 {
        self.header_size
    }

    /// Payload bytes per sector
    pub const fn payload_size(&self) -> u64 {
        self.payload_size
    }

    /// Bytes after the payload
    pub fn footer_size(&self) -> u64 {
        self.raw_size - self.header_size - self.payload_size
    }
}

/// Cooked view over a raw sector image
pub struct SectorRemapStream<S> {
    inner: S,
    layout: SectorLayout,
    length: u64,
    position: u64,
}

impl<S: RandomAccessStream> SectorRemapStream<S> {
    /// Wrap `inner`; a trailing partial sector is unreachable
    pub fn new(inner: S, layout: SectorLayout) -> Self {
        let physical = inner.length();
        let sectors = physical / layout.raw_size;
        let leftover = physical % layout.raw_size;
        if leftover != 0 {
            log::debug!(
                "Raw image has {} trailing bytes past sector {}, ignoring them",
                leftover, sectors
            );
        }

        Self {
            inner,
            layout,
            length: sectors * layout.payload_size,
            position: 0,
        }
    }

    pub fn layout(&self) -> SectorLayout {
        self.layout
    }

    /// Number of whole sectors visible through this stream
    pub fn sector_count(&self) -> u64 {
        self.length / self.layout.payload_size
    }

    /// Physical byte offset holding logical byte `logical`
    pub fn raw_offset(&self, logical: u64) -> u64 {
        let sector = logical / self.layout.payload_size;
        sector * self.layout.raw_size + self.layout.header_size + logical % self.layout.payload_size
    }

    /// Logical offset of physical byte `raw`, or `None` for header/footer bytes
    pub fn cooked_offset(&self, raw: u64) -> Option<u64> {
        let sector = raw / self.layout.raw_size;
        let within = raw % self.layout.raw_size;
        if within < self.layout.header_size || within >= self.layout.header_size + self.layout.payload_size {
            return None;
        }
        Some(sector * self.layout.payload_size + within - self.layout.header_size)
    }

    pub fn into_inner(self) -> S {
        self.inner
    }

    /// Read `dst.len()` bytes starting at `logical`, which must not cross a sector
    fn read_physical(&mut self, logical: u64, dst: &mut [u8]) -> io::Result<()> {
        let offset = self.raw_offset(logical);
        self.inner.seek(SeekFrom::Start(offset))?;
        self.inner.read_exact(dst)
    }
}

impl<S: RandomAccessStream> Read for SectorRemapStream<S> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let available = self.length.saturating_sub(self.position);
        let count = (buf.len() as u64).min(available) as usize;
        if count == 0 {
            return Ok(0);
        }

        let payload = self.layout.payload_size;
        let start = self.position;
        let start_sector = start / payload;
        let end_sector = (start + count as u64 - 1) / payload;

        if start_sector == end_sector {
            self.read_physical(start, &mut buf[..count])?;
        } else {
            // Tail of the first sector
            let head = ((start_sector + 1) * payload - start) as usize;
            self.read_physical(start, &mut buf[..head])?;
            let mut written = head;

            for sector in start_sector + 1..end_sector {
                let next = written + payload as usize;
                self.read_physical(sector * payload, &mut buf[written..next])?;
                written = next;
            }

            // Head of the last sector
            self.read_physical(end_sector * payload, &mut buf[written..count])?;
        }

        self.position += count as u64;
        Ok(count)
    }
}

impl<S: RandomAccessStream> Seek for SectorRemapStream<S> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.position = resolve_seek(self.position, self.length, pos)?;
        Ok(self.position)
    }
}

impl<S: RandomAccessStream> RandomAccessStream for SectorRemapStream<S> {
    fn length(&self) -> u64 {
        self.length
    }
}
