//! romdex
//!
//! Scans folders of ROM and disc images and prints which datfile entries
//! they match.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

use romdex::config::{get_config, ScanConfig};
use romdex::dat::{IdentificationIndex, ReferenceCorpus};
use romdex::report::render_table;
use romdex::scan::{ScanOutcome, Scanner};

#[derive(Parser, Debug)]
#[command(name = "romdex", version, about = "Identify ROM and disc images against datfiles")]
struct Cli {
    /// Read settings from this file instead of romdex.json
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Datfile (.dat or .zip) to match against; may be repeated
    #[arg(long = "dat", value_name = "FILE")]
    dat_files: Vec<PathBuf>,

    /// Check GCZ block hashes while reading
    #[arg(long)]
    verify_blocks: bool,

    /// Folders to scan
    folders: Vec<PathBuf>,
}

fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => match ScanConfig::load_from_path(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Failed to load {}: {}", path.display(), e);
                return ExitCode::FAILURE;
            }
        },
        None => get_config().clone(),
    };
    config.folders.extend(cli.folders);
    config.dat_files.extend(cli.dat_files);
    config.verify_block_hashes |= cli.verify_blocks;

    if config.folders.is_empty() {
        eprintln!("No folders to scan");
        return ExitCode::FAILURE;
    }

    let mut index = IdentificationIndex::new();
    for path in &config.dat_files {
        match ReferenceCorpus::load(path) {
            Ok(corpus) => index.add(corpus),
            Err(e) => log::error!("Failed to load datfile {}: {}", path.display(), e),
        }
    }
    if index.is_empty() {
        log::warn!("No datfiles loaded, printing hashes only");
    }

    let results = Scanner::new(&index, &config).scan_folders(&config.folders);
    print!("{}", render_table(&results, &index));

    let failed = results
        .iter()
        .filter(|r| matches!(r.outcome, ScanOutcome::Failed(_)))
        .count();
    log::info!("{} scanned, {} failed", results.len(), failed);

    ExitCode::SUCCESS
}
