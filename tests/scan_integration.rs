//! End-to-end scan of a folder holding one image of every supported kind

use std::fs::{self, File};
use std::io::Write;
use std::path::Path;

use byteorder::{LittleEndian, WriteBytesExt};
use flate2::write::ZlibEncoder;
use flate2::Compression;
use sha1::{Digest, Sha1};

use romdex::config::ScanConfig;
use romdex::dat::{IdentificationIndex, ReferenceCorpus};
use romdex::report::render_table;
use romdex::scan::{ScanOutcome, ScanResult, Scanner};
use romdex::sniff::StreamKind;

const SYNC: [u8; 12] = [0x00, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0x00];

/// GCZ image with every block deflated and block hashes left zero
fn gcz(plain: &[u8], block_size: usize) -> Vec<u8> {
    let mut pointers = Vec::new();
    let mut data = Vec::new();
    for block in plain.chunks(block_size) {
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(block).unwrap();
        pointers.push(data.len() as u64);
        data.extend(encoder.finish().unwrap());
    }

    let mut out = Vec::new();
    out.write_u32::<LittleEndian>(0xB10B_C001).unwrap();
    out.write_u32::<LittleEndian>(0).unwrap();
    out.write_u64::<LittleEndian>(data.len() as u64).unwrap();
    out.write_u64::<LittleEndian>(plain.len() as u64).unwrap();
    out.write_u32::<LittleEndian>(block_size as u32).unwrap();
    out.write_u32::<LittleEndian>(pointers.len() as u32).unwrap();
    for pointer in &pointers {
        out.write_u64::<LittleEndian>(*pointer).unwrap();
    }
    out.extend(vec![0u8; 4 * pointers.len()]);
    out.extend(data);
    out
}

/// Mode 2 Form 1 raw track wrapping 2048-byte payload sectors
fn raw_mode2(payload: &[u8]) -> Vec<u8> {
    let mut raw = Vec::new();
    for sector in payload.chunks(2048) {
        raw.extend_from_slice(&SYNC);
        raw.extend_from_slice(&[0x00, 0x02, 0x00, 0x02]);
        raw.extend_from_slice(&[0u8; 8]);
        raw.extend_from_slice(sector);
        raw.extend(vec![0xEEu8; 280]);
    }
    raw
}

fn swap_pairs(data: &[u8]) -> Vec<u8> {
    data.chunks(2).flat_map(|pair| pair.iter().rev().copied()).collect()
}

fn sha1_hex(data: &[u8]) -> String {
    hex::encode(Sha1::digest(data))
}

fn write_zip(path: &Path, name: &str, data: &[u8]) {
    let mut writer = zip::ZipWriter::new(File::create(path).unwrap());
    writer.start_file(name, zip::write::SimpleFileOptions::default()).unwrap();
    writer.write_all(data).unwrap();
    writer.finish().unwrap();
}

fn identified<'a>(results: &'a [ScanResult], suffix: &str) -> &'a romdex::scan::Identification {
    let result = results
        .iter()
        .find(|r| r.display_name().ends_with(suffix))
        .unwrap_or_else(|| panic!("no result for {}", suffix));
    match &result.outcome {
        ScanOutcome::Identified(id) => id,
        ScanOutcome::Failed(msg) => panic!("{} failed: {}", suffix, msg),
    }
}

#[test]
fn scan_mixed_folder() {
    let roms = tempfile::tempdir().unwrap();
    let dats = tempfile::tempdir().unwrap();

    let disc_image: Vec<u8> = (0..4096u32 * 4).map(|i| (i * 7 % 251) as u8).collect();
    let disc_track: Vec<u8> = (0..2048u32 * 3).map(|i| (i % 239) as u8).collect();
    let n64: Vec<u8> = [0x80, 0x37, 0x12, 0x40].iter().copied().chain((0..1020u32).map(|i| i as u8)).collect();
    let zipped = b"zipped game boy rom".repeat(50);

    fs::write(roms.path().join("game.gcz"), gcz(&disc_image, 4096)).unwrap();
    fs::write(roms.path().join("track.bin"), raw_mode2(&disc_track)).unwrap();
    fs::write(
        roms.path().join("track.cue"),
        "FILE \"track.bin\" BINARY\n  TRACK 01 MODE2/2352\n    INDEX 01 00:00:00\n",
    )
    .unwrap();
    fs::write(roms.path().join("mario.v64"), swap_pairs(&n64)).unwrap();
    write_zip(&roms.path().join("pack.zip"), "tetris.gb", &zipped);

    let dat = format!(
        r#"<?xml version="1.0"?>
<datafile>
  <header><name>Test Systems</name></header>
  <game name="Disc Game"><rom name="game.iso" size="{}" sha1="{}"/></game>
  <game name="Track Game"><rom name="track.iso" size="{}" crc="{:08x}"/></game>
  <game name="Mario"><rom name="mario.z64" size="{}" sha1="{}" status="verified"/></game>
  <game name="Tetris"><rom name="tetris.gb" size="{}" crc="{:08x}"/></game>
</datafile>"#,
        disc_image.len(),
        sha1_hex(&disc_image),
        disc_track.len(),
        crc32fast::hash(&disc_track),
        n64.len(),
        sha1_hex(&n64),
        zipped.len(),
        crc32fast::hash(&zipped),
    );
    let dat_path = dats.path().join("test.dat");
    fs::write(&dat_path, dat).unwrap();

    let index: IdentificationIndex = std::iter::once(ReferenceCorpus::load(&dat_path).unwrap()).collect();
    let results = Scanner::new(&index, &ScanConfig::default()).scan_folders(&[roms.path().to_path_buf()]);
    assert_eq!(results.len(), 4);

    let disc = identified(&results, "game.gcz");
    assert_eq!(disc.detection.kind, StreamKind::BlockCompressed);
    assert_eq!(disc.fingerprint.size, disc_image.len() as u64);
    assert_eq!(disc.matches[0].as_ref().unwrap().game, "Disc Game");

    let track = identified(&results, "track.bin");
    assert!(matches!(track.detection.kind, StreamKind::RawSectors(_)));
    assert_eq!(track.matches[0].as_ref().unwrap().game, "Track Game");

    let mario = identified(&results, "mario.v64");
    assert_eq!(mario.detection.kind, StreamKind::PairSwapped);
    assert_eq!(mario.matches[0].as_ref().unwrap().game, "Mario");

    let tetris = identified(&results, "pack.zip#tetris.gb");
    assert_eq!(tetris.matches[0].as_ref().unwrap().game, "Tetris");

    let table = render_table(&results, &index);
    assert!(table.lines().next().unwrap().ends_with("Test Systems"));
    assert!(table.contains("Mario (verified)"));
}

#[test]
fn corrupt_image_does_not_stop_scan() {
    let roms = tempfile::tempdir().unwrap();

    let mut broken = gcz(&[0x11u8; 8192], 4096);
    // Block count no longer covers the data size
    broken[28] = 1;
    fs::write(roms.path().join("a_broken.gcz"), broken).unwrap();
    fs::write(roms.path().join("b_good.gb"), b"fine").unwrap();

    let index = IdentificationIndex::new();
    let results = Scanner::new(&index, &ScanConfig::default()).scan_folders(&[roms.path().to_path_buf()]);

    assert_eq!(results.len(), 2);
    assert!(matches!(&results[0].outcome, ScanOutcome::Failed(msg) if msg.contains("Corrupt container")));
    let good = identified(&results, "b_good.gb");
    assert_eq!(good.fingerprint.crc32, crc32fast::hash(b"fine"));
    assert!(good.matches.is_empty());
}
