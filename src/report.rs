//! Text table of scan results

use crate::dat::IdentificationIndex;
use crate::scan::{ScanOutcome, ScanResult};

/// Column separator
const GAP: &str = "  ";

/// Placeholder for an empty cell
const NONE: &str = "-";

/// Render one row per result with a match column for every corpus
pub fn render_table(results: &[ScanResult], index: &IdentificationIndex) -> String {
    let mut header = vec![
        "File".to_string(),
        "Size".to_string(),
        "CRC32".to_string(),
        "MD5".to_string(),
        "SHA1".to_string(),
    ];
    header.extend(index.corpora().iter().map(|c| c.name.clone()));

    let rows: Vec<Vec<String>> = results.iter().map(|r| row(r, index.corpora().len())).collect();

    let mut widths: Vec<usize> = header.iter().map(|h| h.chars().count()).collect();
    for row in &rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.chars().count());
        }
    }

    let mut out = String::new();
    push_line(&mut out, &header, &widths);
    let rule: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
    push_line(&mut out, &rule, &widths);
    for row in &rows {
        push_line(&mut out, row, &widths);
    }
    out
}

fn row(result: &ScanResult, corpus_count: usize) -> Vec<String> {
    let mut cells = vec![result.display_name()];
    match &result.outcome {
        ScanOutcome::Identified(id) => {
            if !id.block_hash_mismatches.is_empty() {
                let blocks: Vec<String> = id.block_hash_mismatches.iter().map(u32::to_string).collect();
                cells[0] = format!("{} [hash mismatch in blocks {}]", cells[0], blocks.join(","));
            }
            let fp = &id.fingerprint;
            cells.push(fp.size.to_string());
            cells.push(fp.crc32_hex());
            cells.push(fp.md5_hex().unwrap_or_else(|| NONE.to_string()));
            cells.push(fp.sha1_hex().unwrap_or_else(|| NONE.to_string()));
            cells.extend(id.matches.iter().map(|found| match found {
                Some(record) => format!("{} ({})", record.game, record.status.display_name()),
                None => NONE.to_string(),
            }));
        }
        ScanOutcome::Failed(message) => {
            cells.push(format!("Exception: {}", message));
        }
    }
    cells.resize(5 + corpus_count, String::new());
    cells
}

fn push_line(out: &mut String, cells: &[String], widths: &[usize]) {
    let line: Vec<String> = cells
        .iter()
        .zip(widths)
        .map(|(cell, width)| format!("{:<width$}", cell, width = *width))
        .collect();
    out.push_str(line.join(GAP).trim_end());
    out.push('\n');
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checksum::Fingerprint;
    use crate::dat::{ReferenceCorpus, ReferenceRecord, RomStatus};
    use crate::scan::Identification;
    use crate::sniff::{Detection, StreamKind};
    use std::path::PathBuf;

    fn index() -> IdentificationIndex {
        vec![ReferenceCorpus::new("No-Intro", Vec::new()), ReferenceCorpus::new("Redump", Vec::new())]
            .into_iter()
            .collect()
    }

    #[test]
    fn test_identified_and_failed_rows() {
        let record = ReferenceRecord::new("Tetris (World)", "Tetris (World).gb").with_status(RomStatus::Verified);
        let results = vec![
            ScanResult {
                path: PathBuf::from("roms/tetris.gb"),
                entry: None,
                outcome: ScanOutcome::Identified(Identification {
                    detection: Detection { kind: StreamKind::Plain, header_skip: 0 },
                    fingerprint: Fingerprint::from_crc32(32768, 0x46df91ad),
                    matches: vec![Some(record), None],
                    block_hash_mismatches: Vec::new(),
                }),
            },
            ScanResult {
                path: PathBuf::from("roms/broken.gcz"),
                entry: None,
                outcome: ScanOutcome::Failed("Corrupt container: block size is 0".into()),
            },
        ];

        let table = render_table(&results, &index());
        let lines: Vec<&str> = table.lines().collect();
        assert_eq!(lines.len(), 4);
        assert!(lines[0].starts_with("File"));
        assert!(lines[0].contains("No-Intro"));
        assert!(lines[0].ends_with("Redump"));
        assert!(lines[1].starts_with("---"));
        assert!(lines[2].contains("32768"));
        assert!(lines[2].contains("46df91ad"));
        assert!(lines[2].contains("Tetris (World) (verified)"));
        assert!(lines[3].contains("Exception: Corrupt container: block size is 0"));

        // Columns line up
        let crc_col = lines[0].find("CRC32").unwrap();
        assert_eq!(&lines[2][crc_col..crc_col + 8], "46df91ad");
    }

    #[test]
    fn test_hash_mismatches_flagged_on_row() {
        let results = vec![ScanResult {
            path: PathBuf::from("disc.gcz"),
            entry: None,
            outcome: ScanOutcome::Identified(Identification {
                detection: Detection { kind: StreamKind::BlockCompressed, header_skip: 0 },
                fingerprint: Fingerprint::from_crc32(4096, 1),
                matches: vec![None, None],
                block_hash_mismatches: vec![3, 15],
            }),
        }];

        let table = render_table(&results, &index());
        let row = table.lines().nth(2).unwrap();
        assert!(row.starts_with("disc.gcz [hash mismatch in blocks 3,15]"));
    }

    #[test]
    fn test_empty_results() {
        let table = render_table(&[], &IdentificationIndex::new());
        assert_eq!(table.lines().count(), 2);
    }
}
