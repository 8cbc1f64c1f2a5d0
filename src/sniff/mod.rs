//! Format sniffing
//!
//! Decides which stream decorator, if any, sits between a file and the
//! checksum engine, and how many leading header bytes to leave out of the
//! hash.

mod bincue;

use std::io::{self, SeekFrom};
use std::path::Path;

pub use bincue::{read_cue, BinCueError, CueEntry};

use crate::stream::{
    BlockCompressedStream, PairSwapStream, RandomAccessStream, SectorLayout, SectorRemapStream,
    StreamError, StreamExt, GCZ_MAGIC,
};

/// CD sync pattern at the start of every raw (2352-byte) sector
const CD_SYNC_PATTERN: [u8; 12] = [
    0x00, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0x00,
];

/// Offset of the mode byte in a raw sector header
const CD_MODE_BYTE: usize = 15;

/// N64 ROM magic as it appears in a byte-swapped (.v64) dump
const N64_BYTE_SWAPPED_MAGIC: [u8; 4] = [0x37, 0x80, 0x40, 0x12];

/// Copier header prepended to some SNES dumps
const SNES_COPIER_HEADER: u64 = 512;

/// What a manifest (CUE sheet) says about a BIN file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackMode {
    Audio,
    Data(SectorLayout),
    Unsupported,
}

/// Which view to hash a file through
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    Plain,
    RawSectors(SectorLayout),
    BlockCompressed,
    PairSwapped,
}

impl StreamKind {
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Plain => "plain",
            Self::RawSectors(layout) if layout.header_size() == 24 => "raw CD (mode 2)",
            Self::RawSectors(layout) if layout.raw_size() == layout.payload_size() => "cooked CD",
            Self::RawSectors(_) => "raw CD",
            Self::BlockCompressed => "GCZ",
            Self::PairSwapped => "byte-swapped",
        }
    }
}

/// Result of sniffing one stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Detection {
    pub kind: StreamKind,
    /// Leading bytes of the (unwrapped) stream that are not content
    pub header_skip: u64,
}

/// Inspect the start of `stream` and decide how to read it
///
/// `name` supplies the file extension; `manifest` is the CUE sheet's
/// verdict for this file when one exists. Without a manifest a raw CD image
/// is only recognised by its sync pattern; there is no blind 2352-byte guess.
/// The stream is left at position 0.
pub fn sniff<S: RandomAccessStream + ?Sized>(
    stream: &mut S,
    name: &Path,
    manifest: Option<TrackMode>,
) -> io::Result<Detection> {
    stream.seek(SeekFrom::Start(0))?;
    let mut magic = [0u8; 16];
    let got = stream.read_fully(&mut magic)?;
    stream.seek(SeekFrom::Start(0))?;
    let magic = &magic[..got];
    let length = stream.length();

    let kind = if magic.len() >= 4 && u32::from_le_bytes([magic[0], magic[1], magic[2], magic[3]]) == GCZ_MAGIC {
        StreamKind::BlockCompressed
    } else if let Some(mode) = manifest {
        match mode {
            TrackMode::Data(layout) if layout != SectorLayout::COOKED => StreamKind::RawSectors(layout),
            _ => StreamKind::Plain,
        }
    } else if let Some(layout) = raw_sector_layout(magic, length) {
        StreamKind::RawSectors(layout)
    } else if magic.starts_with(&N64_BYTE_SWAPPED_MAGIC) {
        StreamKind::PairSwapped
    } else {
        StreamKind::Plain
    };

    let header_skip = match kind {
        StreamKind::Plain => header_size(magic, name, length),
        _ => 0,
    };

    log::debug!("{}: {:?}, header skip {}", name.display(), kind, header_skip);
    Ok(Detection { kind, header_skip })
}

/// Recognise a raw CD image from its first sector header
fn raw_sector_layout(magic: &[u8], length: u64) -> Option<SectorLayout> {
    if magic.len() < 16 || magic[..12] != CD_SYNC_PATTERN || length % SectorLayout::MODE1_RAW.raw_size() != 0 {
        return None;
    }
    match magic[CD_MODE_BYTE] {
        1 => Some(SectorLayout::MODE1_RAW),
        2 => Some(SectorLayout::MODE2_FORM1_RAW),
        _ => None,
    }
}

/// Size of a known dumper/emulator header in front of the ROM data
fn header_size(magic: &[u8], name: &Path, length: u64) -> u64 {
    if magic.starts_with(b"NES\x1A") || magic.starts_with(b"FDS\x1A") {
        return 16;
    }
    if magic.starts_with(b"LYNX") {
        return 64;
    }
    if magic.len() >= 10 && &magic[1..10] == b"ATARI7800" {
        return 128;
    }

    let ext = name
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());
    if matches!(ext.as_deref(), Some("sfc" | "smc" | "swc" | "fig")) && length % 1024 == SNES_COPIER_HEADER {
        return SNES_COPIER_HEADER;
    }

    0
}

/// Wrap `stream` in the decorator `kind` calls for
pub fn interpose<S: RandomAccessStream + 'static>(
    stream: S,
    kind: StreamKind,
    verify_hashes: bool,
) -> Result<Box<dyn RandomAccessStream>, StreamError> {
    Ok(match kind {
        StreamKind::Plain => Box::new(stream),
        StreamKind::RawSectors(layout) => Box::new(SectorRemapStream::new(stream, layout)),
        StreamKind::BlockCompressed => {
            Box::new(BlockCompressedStream::open(stream)?.with_hash_verification(verify_hashes))
        }
        StreamKind::PairSwapped => Box::new(PairSwapStream::new(stream)),
    })
}
