//! Datfile parsing
//!
//! Parses Logiqx-style XML datfiles (No-Intro, Redump, TOSEC, MAME) into a
//! [`ReferenceCorpus`].

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use quick_xml::de::from_reader;
use serde::Deserialize;
use thiserror::Error;

use super::record::{ReferenceRecord, RomStatus};
use crate::checksum::Fingerprint;

/// Errors that can occur when loading a datfile
#[derive(Error, Debug)]
pub enum DatError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("ZIP error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("Failed to parse DAT XML: {0}")]
    Xml(#[from] quick_xml::DeError),

    #[error("No .dat file found in ZIP archive {0}")]
    NoDatInArchive(PathBuf),
}

/// A ROM entry in the DAT file
#[derive(Debug, Clone, Deserialize)]
struct Rom {
    #[serde(rename = "@name")]
    name: String,
    #[serde(rename = "@size")]
    size: Option<String>,
    #[serde(rename = "@crc")]
    crc: Option<String>,
    #[serde(rename = "@md5")]
    md5: Option<String>,
    #[serde(rename = "@sha1")]
    sha1: Option<String>,
    #[serde(rename = "@status")]
    status: Option<String>,
}

/// A game (or MAME machine) entry in the DAT file
#[derive(Debug, Clone, Deserialize)]
struct Game {
    #[serde(rename = "@name")]
    name: String,
    #[serde(rename = "rom", default)]
    roms: Vec<Rom>,
}

/// DAT file header
#[derive(Debug, Clone, Deserialize)]
struct Header {
    name: Option<String>,
    description: Option<String>,
    version: Option<String>,
}

/// Root datafile structure
#[derive(Debug, Clone, Deserialize)]
struct Datafile {
    header: Option<Header>,
    #[serde(rename = "game", default)]
    games: Vec<Game>,
    #[serde(rename = "machine", default)]
    machines: Vec<Game>,
}

/// Parse a fixed-length hex digest, treating malformed values as absent
fn parse_digest<const N: usize>(value: Option<&str>) -> Option<[u8; N]> {
    let value = value?.trim();
    if value.is_empty() {
        return None;
    }
    let parsed = hex::decode(value).ok().and_then(|bytes| bytes.try_into().ok());
    if parsed.is_none() {
        log::debug!("Ignoring malformed {}-byte digest {:?}", N, value);
    }
    parsed
}

fn parse_crc32(value: Option<&str>) -> Option<u32> {
    parse_digest::<4>(value).map(u32::from_be_bytes)
}

impl Rom {
    fn into_record(self, game: &str) -> ReferenceRecord {
        ReferenceRecord {
            game: game.to_string(),
            size: self.size.as_deref().and_then(|s| s.trim().parse().ok()),
            crc32: parse_crc32(self.crc.as_deref()),
            md5: parse_digest(self.md5.as_deref()),
            sha1: parse_digest(self.sha1.as_deref()),
            status: RomStatus::from_attr(self.status.as_deref()),
            name: self.name,
        }
    }
}

/// An immutable set of reference records loaded from one datfile
#[derive(Debug, Clone, Default)]
pub struct ReferenceCorpus {
    /// System name from the datfile header (e.g., "Nintendo - Game Boy")
    pub name: String,
    pub description: Option<String>,
    pub version: Option<String>,
    records: Vec<ReferenceRecord>,
}

impl ReferenceCorpus {
    /// Build a corpus from records already in memory
    pub fn new(name: impl Into<String>, records: Vec<ReferenceRecord>) -> Self {
        Self {
            name: name.into(),
            description: None,
            version: None,
            records,
        }
    }

    /// Load a DAT file (supports .dat XML files and .zip containing a .dat)
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, DatError> {
        let path = path.as_ref();

        let is_zip = path
            .extension()
            .map(|e| e.eq_ignore_ascii_case("zip"))
            .unwrap_or(false);

        let mut corpus = if is_zip {
            Self::load_zip(path)?
        } else {
            let file = File::open(path)?;
            Self::from_xml_reader(BufReader::new(file))?
        };

        if corpus.name.is_empty() {
            corpus.name = path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default();
        }

        log::info!("Loaded {} records for {} from {}", corpus.len(), corpus.name, path.display());
        Ok(corpus)
    }

    /// Load the first .dat member of a .zip file
    fn load_zip(path: &Path) -> Result<Self, DatError> {
        let file = File::open(path)?;
        let mut archive = zip::ZipArchive::new(file)?;

        for i in 0..archive.len() {
            let file = archive.by_index(i)?;

            if file.name().to_ascii_lowercase().ends_with(".dat") {
                log::debug!("Found DAT file in ZIP: {}", file.name());
                return Self::from_xml_reader(BufReader::new(file));
            }
        }

        Err(DatError::NoDatInArchive(path.to_path_buf()))
    }

    /// Parse datfile XML from a reader
    pub fn from_xml_reader<R: BufRead>(reader: R) -> Result<Self, DatError> {
        let datafile: Datafile = from_reader(reader)?;

        let (name, description, version) = match datafile.header {
            Some(header) => (header.name.unwrap_or_default(), header.description, header.version),
            None => (String::new(), None, None),
        };

        let records = datafile
            .games
            .into_iter()
            .chain(datafile.machines)
            .flat_map(|game| {
                let Game { name, roms } = game;
                roms.into_iter()
                    .map(move |rom| rom.into_record(&name))
                    .collect::<Vec<_>>()
            })
            .collect();

        Ok(Self {
            name,
            description,
            version,
            records,
        })
    }

    pub fn records(&self) -> &[ReferenceRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// First record matching `fingerprint`, in datfile order
    pub fn find(&self, fingerprint: &Fingerprint) -> Option<&ReferenceRecord> {
        self.records.iter().find(|record| record.matches(fingerprint))
    }
}
