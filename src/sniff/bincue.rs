//! BIN/CUE manifests
//!
//! Parses CUE sheets to learn the sector mode of each BIN file they
//! reference, so raw images can be cooked without guessing.

use std::path::{Path, PathBuf};

use cue_sheet::parser::{parse_cue, Command, TrackType};

use super::TrackMode;
use crate::stream::SectorLayout;

/// Sector size of a raw Mode 2 track without sync/header (2336 bytes)
const CD_SECTOR_SIZE_MODE2: u64 = 2336;

/// Offset to user data in a 2336-byte Mode 2 Form 1 sector (subheader only)
const MODE2_SUBHEADER_SIZE: u64 = 8;

/// Result type for BIN/CUE operations
pub type BinCueResult<T> = Result<T, BinCueError>;

/// Errors specific to BIN/CUE reading
#[derive(Debug)]
pub enum BinCueError {
    /// IO error
    Io(std::io::Error),
    /// CUE parsing error
    CueParse(String),
}

impl std::fmt::Display for BinCueError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "IO error: {}", e),
            Self::CueParse(s) => write!(f, "CUE parse error: {}", s),
        }
    }
}

impl std::error::Error for BinCueError {}

impl From<std::io::Error> for BinCueError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

/// A BIN file named by a CUE sheet, with the mode of its first track
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CueEntry {
    pub bin_path: PathBuf,
    pub mode: TrackMode,
}

/// Read a CUE sheet and list the BIN files it references
///
/// Each FILE takes the mode of the first TRACK that follows it. BIN files
/// that cannot be found next to the sheet are skipped.
pub fn read_cue(cue_path: &Path) -> BinCueResult<Vec<CueEntry>> {
    let cue_content = std::fs::read_to_string(cue_path)?;
    let commands = parse_cue(&cue_content)
        .map_err(|e| BinCueError::CueParse(format!("{:?}", e)))?;

    let cue_dir = cue_path.parent().unwrap_or(Path::new("."));
    let mut entries = Vec::new();
    let mut pending: Option<String> = None;

    for cmd in &commands {
        match cmd {
            Command::File(filename, _format) => {
                pending = Some(filename.clone());
            }
            Command::Track(track_no, track_type) => {
                let Some(filename) = pending.take() else { continue };
                let mode = track_mode(track_type);
                log::debug!("{}: track {} {:?} -> {:?}", filename, track_no, track_type, mode);

                match resolve_bin_path(cue_dir, &filename) {
                    Some(bin_path) => entries.push(CueEntry { bin_path, mode }),
                    None => log::debug!("BIN file not found: {}", cue_dir.join(&filename).display()),
                }
            }
            _ => {}
        }
    }

    Ok(entries)
}

/// Map a CUE track type to how its sectors should be read
fn track_mode(track_type: &TrackType) -> TrackMode {
    match track_type {
        TrackType::Audio | TrackType::Cdg => TrackMode::Audio,
        TrackType::Mode(mode, size) => match (*mode, *size) {
            (1, 2352) => TrackMode::Data(SectorLayout::MODE1_RAW),
            (2, 2352) => TrackMode::Data(SectorLayout::MODE2_FORM1_RAW),
            (2, 2336) => mode2_headerless(),
            (_, 2048) => TrackMode::Data(SectorLayout::COOKED),
            _ => TrackMode::Unsupported,
        },
        TrackType::Cdi(size) => match *size {
            2352 => TrackMode::Data(SectorLayout::MODE2_FORM1_RAW),
            2336 => mode2_headerless(),
            _ => TrackMode::Unsupported,
        },
    }
}

fn mode2_headerless() -> TrackMode {
    SectorLayout::new(CD_SECTOR_SIZE_MODE2, MODE2_SUBHEADER_SIZE, 2048)
        .map(TrackMode::Data)
        .unwrap_or(TrackMode::Unsupported)
}

/// Resolve BIN file path, trying different locations
fn resolve_bin_path(cue_dir: &Path, bin_filename: &str) -> Option<PathBuf> {
    // Try the path as-is (relative to CUE dir)
    let bin_path = cue_dir.join(bin_filename);
    if bin_path.exists() {
        return Some(bin_path);
    }

    // Try just the filename (in case the CUE has an absolute path)
    if let Some(filename) = Path::new(bin_filename).file_name() {
        let bin_path = cue_dir.join(filename);
        if bin_path.exists() {
            return Some(bin_path);
        }
    }

    // Try common variations
    let base = Path::new(bin_filename).file_stem().unwrap_or_default();
    for ext in &["bin", "BIN", "img", "IMG"] {
        let try_path = cue_dir.join(format!("{}.{}", base.to_string_lossy(), ext));
        if try_path.exists() {
            return Some(try_path);
        }
    }

    None
}
