//! Folder scanning
//!
//! Walks the configured folders, one worker thread per folder, and
//! identifies every file (and every zip member) it finds. A file that fails
//! is recorded as failed and the scan moves on.

use std::collections::HashMap;
use std::any::Any;
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::thread;

use thiserror::Error;
use walkdir::WalkDir;

use crate::archive::{ArchiveError, ZipContainer};
use crate::checksum::{ChecksumEngine, Fingerprint};
use crate::config::ScanConfig;
use crate::dat::{IdentificationIndex, ReferenceRecord};
use crate::sniff::{interpose, read_cue, sniff, Detection, StreamKind, TrackMode};
use crate::stream::{FileStream, RandomAccessStream, StreamError};

/// Errors that can occur while identifying a single file
#[derive(Error, Debug)]
pub enum ScanError {
    #[error(transparent)]
    Stream(#[from] StreamError),

    #[error(transparent)]
    Archive(#[from] ArchiveError),

    #[error("Panicked while scanning: {0}")]
    Panicked(String),
}

impl From<io::Error> for ScanError {
    fn from(e: io::Error) -> Self {
        Self::Stream(StreamError::from_io(e))
    }
}

/// Everything learned about one identified file
#[derive(Debug, Clone)]
pub struct Identification {
    pub detection: Detection,
    pub fingerprint: Fingerprint,
    /// One slot per loaded corpus
    pub matches: Vec<Option<ReferenceRecord>>,
    /// GCZ blocks whose stored bytes failed their hash (only with verification on)
    pub block_hash_mismatches: Vec<u32>,
}

impl Identification {
    pub fn is_known(&self) -> bool {
        self.matches.iter().any(Option::is_some)
    }
}

#[derive(Debug, Clone)]
pub enum ScanOutcome {
    Identified(Identification),
    Failed(String),
}

/// Result for one file or archive member
#[derive(Debug, Clone)]
pub struct ScanResult {
    pub path: PathBuf,
    /// Member name when the content came from inside an archive
    pub entry: Option<String>,
    pub outcome: ScanOutcome,
}

impl ScanResult {
    /// Path, plus `#member` for archive members
    pub fn display_name(&self) -> String {
        match &self.entry {
            Some(entry) => format!("{}#{}", self.path.display(), entry),
            None => self.path.display().to_string(),
        }
    }
}

/// Scanner shared by the per-folder workers
pub struct Scanner<'a> {
    index: &'a IdentificationIndex,
    config: ScanConfig,
    engine: ChecksumEngine,
}

impl<'a> Scanner<'a> {
    pub fn new(index: &'a IdentificationIndex, config: &ScanConfig) -> Self {
        Self {
            index,
            config: config.clone(),
            engine: ChecksumEngine::with_chunk_size(config.hash_chunk_size),
        }
    }

    /// Scan every folder on its own worker and merge the results, sorted by path
    pub fn scan_folders(&self, folders: &[PathBuf]) -> Vec<ScanResult> {
        let mut results: Vec<ScanResult> = thread::scope(|scope| {
            let workers: Vec<_> = folders
                .iter()
                .map(|folder| (folder, scope.spawn(move || self.scan_folder(folder))))
                .collect();

            workers
                .into_iter()
                .flat_map(|(folder, worker)| {
                    worker.join().unwrap_or_else(|_| {
                        log::error!("Worker for {} panicked", folder.display());
                        Vec::new()
                    })
                })
                .collect()
        });

        results.sort_by(|a, b| (&a.path, &a.entry).cmp(&(&b.path, &b.entry)));
        log::info!("Scanned {} entries in {} folders", results.len(), folders.len());
        results
    }

    /// Scan one folder sequentially
    pub fn scan_folder(&self, folder: &Path) -> Vec<ScanResult> {
        let max_depth = if self.config.recursive { usize::MAX } else { 1 };
        let files: Vec<PathBuf> = WalkDir::new(folder)
            .max_depth(max_depth)
            .into_iter()
            .filter_map(|entry| match entry {
                Ok(entry) => Some(entry),
                Err(e) => {
                    log::warn!("Skipping unreadable entry under {}: {}", folder.display(), e);
                    None
                }
            })
            .filter(|entry| entry.file_type().is_file())
            .map(|entry| entry.into_path())
            .collect();

        let manifests = collect_manifests(&files);
        log::info!("{}: {} files, {} cue-described", folder.display(), files.len(), manifests.len());

        let mut results = Vec::new();
        for path in &files {
            if has_extension(path, "cue") {
                continue;
            }

            if self.config.scan_archives && has_extension(path, "zip") {
                results.extend(self.scan_zip(path));
            } else if self.config.wants(path) {
                let manifest = manifests.get(path).copied();
                let result = isolate(|| self.identify_file(path, manifest));
                let outcome = self.record(path, None, result);
                results.push(ScanResult { path: path.clone(), entry: None, outcome });
            }
        }
        results
    }

    /// Identify a file on disk
    pub fn identify_file(&self, path: &Path, manifest: Option<TrackMode>) -> Result<Identification, ScanError> {
        let stream = FileStream::open(path)?;
        self.identify(stream, path, manifest)
    }

    /// Sniff, wrap, hash and match one stream
    pub fn identify<S: RandomAccessStream + 'static>(
        &self,
        mut stream: S,
        name: &Path,
        manifest: Option<TrackMode>,
    ) -> Result<Identification, ScanError> {
        let mut detection = sniff(&mut stream, name, manifest)?;
        if !self.config.skip_headers {
            detection.header_skip = 0;
        }

        let (fingerprint, block_hash_mismatches) =
            if self.config.hash_logical_view || detection.kind == StreamKind::Plain {
                let mut view = interpose(stream, detection.kind, self.config.verify_block_hashes)?;
                let fingerprint = self.engine.compute(&mut view, detection.header_skip)?;
                (fingerprint, view.block_hash_mismatches().to_vec())
            } else {
                (self.engine.compute(&mut stream, 0)?, Vec::new())
            };

        let matches = self
            .index
            .identify(&fingerprint)
            .into_iter()
            .map(|found| found.cloned())
            .collect();

        Ok(Identification {
            detection,
            fingerprint,
            matches,
            block_hash_mismatches,
        })
    }

    /// Identify every member of a zip archive
    fn scan_zip(&self, path: &Path) -> Vec<ScanResult> {
        let mut container = match ZipContainer::open(path) {
            Ok(container) => container,
            Err(e) => {
                let outcome = self.record(path, None, Err(e.into()));
                return vec![ScanResult { path: path.to_path_buf(), entry: None, outcome }];
            }
        };

        let members: Vec<_> = container
            .members()
            .iter()
            .filter(|member| self.config.wants(Path::new(&member.name)))
            .cloned()
            .collect();
        members
            .into_iter()
            .map(|member| {
                let result = isolate(|| {
                    let stream = container.open_member(member.index)?;
                    self.identify(stream, Path::new(&member.name), None)
                });
                let outcome = self.record(path, Some(&member.name), result);
                ScanResult {
                    path: path.to_path_buf(),
                    entry: Some(member.name),
                    outcome,
                }
            })
            .collect()
    }

    /// Log the result for one entry and turn it into an outcome
    fn record(&self, path: &Path, entry: Option<&str>, result: Result<Identification, ScanError>) -> ScanOutcome {
        let name = match entry {
            Some(entry) => format!("{}#{}", path.display(), entry),
            None => path.display().to_string(),
        };

        match result {
            Ok(identification) => {
                log::debug!("{}: {}", name, identification.fingerprint);
                ScanOutcome::Identified(identification)
            }
            Err(e) => {
                log::warn!("Failed to scan {}: {}", name, e);
                ScanOutcome::Failed(e.to_string())
            }
        }
    }
}

/// Run one identification, turning a panic into an error for that entry alone
fn isolate<F>(identify: F) -> Result<Identification, ScanError>
where
    F: FnOnce() -> Result<Identification, ScanError>,
{
    panic::catch_unwind(AssertUnwindSafe(identify))
        .unwrap_or_else(|payload| Err(ScanError::Panicked(panic_message(payload.as_ref()))))
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

fn has_extension(path: &Path, wanted: &str) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case(wanted))
        .unwrap_or(false)
}

/// Map every BIN file named by a CUE sheet among `files` to its track mode
fn collect_manifests(files: &[PathBuf]) -> HashMap<PathBuf, TrackMode> {
    let mut manifests = HashMap::new();
    for cue in files.iter().filter(|p| has_extension(p, "cue")) {
        match read_cue(cue) {
            Ok(entries) => {
                for entry in entries {
                    manifests.entry(entry.bin_path).or_insert(entry.mode);
                }
            }
            Err(e) => log::warn!("Ignoring CUE sheet {}: {}", cue.display(), e),
        }
    }
    manifests
}
