//! Zip archive members as streams
//!
//! Zip decompressors only read forward, so each member is inflated into
//! memory once and handed out as a seekable [`MemoryStream`].

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::stream::MemoryStream;

/// Most memory reserved up front for a member; larger ones grow while reading
const MAX_RESERVE: u64 = 64 << 20;

/// Errors that can occur when reading an archive
#[derive(Error, Debug)]
pub enum ArchiveError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("ZIP error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("No member {index} in {path}")]
    NoSuchMember { path: PathBuf, index: usize },
}

/// A file entry inside a zip archive
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ZipMember {
    /// Position in the central directory
    pub index: usize,
    pub name: String,
    /// Uncompressed size
    pub size: u64,
    /// CRC32 recorded in the central directory
    pub crc32: u32,
}

/// An opened zip archive
pub struct ZipContainer {
    path: PathBuf,
    archive: zip::ZipArchive<BufReader<File>>,
    members: Vec<ZipMember>,
}

impl ZipContainer {
    /// Open `path` and list its file members
    pub fn open(path: &Path) -> Result<Self, ArchiveError> {
        let file = File::open(path)?;
        let mut archive = zip::ZipArchive::new(BufReader::new(file))?;

        let mut members = Vec::new();
        for index in 0..archive.len() {
            let entry = archive.by_index_raw(index)?;
            if entry.is_dir() {
                continue;
            }
            members.push(ZipMember {
                index,
                name: entry.name().to_string(),
                size: entry.size(),
                crc32: entry.crc32(),
            });
        }

        log::debug!("{}: {} members", path.display(), members.len());

        Ok(Self {
            path: path.to_path_buf(),
            archive,
            members,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn members(&self) -> &[ZipMember] {
        &self.members
    }

    /// Inflate the member at central-directory `index` into memory
    pub fn open_member(&mut self, index: usize) -> Result<MemoryStream, ArchiveError> {
        let size = self
            .members
            .iter()
            .find(|m| m.index == index)
            .map(|m| m.size)
            .ok_or_else(|| ArchiveError::NoSuchMember {
                path: self.path.clone(),
                index,
            })?;

        let mut entry = self.archive.by_index(index)?;
        let mut data = Vec::with_capacity(size.min(MAX_RESERVE) as usize);
        entry.read_to_end(&mut data)?;
        Ok(MemoryStream::new(data))
    }
}
