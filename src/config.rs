//! Scan configuration
//!
//! Handles loading configuration from romdex.json

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use crate::checksum::DEFAULT_CHUNK_SIZE;

/// Name of the configuration file looked up at startup
pub const CONFIG_FILE_NAME: &str = "romdex.json";

/// Global scan config
static SCAN_CONFIG: OnceLock<ScanConfig> = OnceLock::new();

/// Get the global scan config
pub fn get_config() -> &'static ScanConfig {
    SCAN_CONFIG.get_or_init(ScanConfig::load)
}

/// Root scan configuration
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct ScanConfig {
    /// Folders to scan, one worker each
    #[serde(default)]
    pub folders: Vec<PathBuf>,
    /// Datfiles (.dat or .zip) to identify against, in priority order
    #[serde(default)]
    pub dat_files: Vec<PathBuf>,
    /// Descend into subfolders
    #[serde(default = "default_true")]
    pub recursive: bool,
    /// Only scan files with these extensions (empty = everything)
    #[serde(default)]
    pub extensions: Vec<String>,
    /// Read size used while hashing
    #[serde(default = "default_hash_chunk_size")]
    pub hash_chunk_size: usize,
    /// Check GCZ block hashes while reading
    #[serde(default)]
    pub verify_block_hashes: bool,
    /// Hash the decoded view (cooked sectors, inflated GCZ) rather than the file bytes
    #[serde(default = "default_true")]
    pub hash_logical_view: bool,
    /// Leave known dumper headers (iNES, Lynx, ...) out of the hash
    #[serde(default = "default_true")]
    pub skip_headers: bool,
    /// Identify the members of .zip files
    #[serde(default = "default_true")]
    pub scan_archives: bool,
}

fn default_true() -> bool {
    true
}

fn default_hash_chunk_size() -> usize {
    DEFAULT_CHUNK_SIZE
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            folders: Vec::new(),
            dat_files: Vec::new(),
            recursive: default_true(),
            extensions: Vec::new(),
            hash_chunk_size: default_hash_chunk_size(),
            verify_block_hashes: false,
            hash_logical_view: default_true(),
            skip_headers: default_true(),
            scan_archives: default_true(),
        }
    }
}

impl ScanConfig {
    /// Load configuration from romdex.json
    pub fn load() -> Self {
        // Try to load from current directory first
        if let Ok(config) = Self::load_from_path(CONFIG_FILE_NAME) {
            log::info!("Loaded config from ./{}", CONFIG_FILE_NAME);
            return config;
        }

        // Try to load from executable directory
        if let Ok(exe_path) = std::env::current_exe() {
            if let Some(exe_dir) = exe_path.parent() {
                let config_path = exe_dir.join(CONFIG_FILE_NAME);
                if let Ok(config) = Self::load_from_path(&config_path) {
                    log::info!("Loaded config from {}", config_path.display());
                    return config;
                }
            }
        }

        log::info!("No {} found, using defaults", CONFIG_FILE_NAME);
        Self::default()
    }

    pub fn load_from_path(path: impl Into<PathBuf>) -> Result<Self, Box<dyn std::error::Error>> {
        let path = path.into();
        let content = fs::read_to_string(&path)?;
        let config: ScanConfig = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Whether `path` passes the extension filter
    pub fn wants(&self, path: &Path) -> bool {
        if self.extensions.is_empty() {
            return true;
        }
        path.extension()
            .and_then(|e| e.to_str())
            .map(|ext| self.extensions.iter().any(|want| want.trim_start_matches('.').eq_ignore_ascii_case(ext)))
            .unwrap_or(false)
    }
}
