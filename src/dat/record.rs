//! Reference records and the match policy

use crate::checksum::Fingerprint;

/// Dump status attached to a datfile entry
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum RomStatus {
    #[default]
    Good,
    BadDump,
    NoDump,
    Verified,
    Other(String),
}

impl RomStatus {
    /// Parse the `status` attribute; a missing attribute means good
    pub fn from_attr(attr: Option<&str>) -> Self {
        match attr.map(|s| s.trim().to_ascii_lowercase()).as_deref() {
            None | Some("") | Some("good") => Self::Good,
            Some("baddump") | Some("bad dump") => Self::BadDump,
            Some("nodump") => Self::NoDump,
            Some("verified") => Self::Verified,
            Some(other) => Self::Other(other.to_string()),
        }
    }

    pub fn display_name(&self) -> &str {
        match self {
            Self::Good => "good",
            Self::BadDump => "bad dump",
            Self::NoDump => "no dump",
            Self::Verified => "verified",
            Self::Other(s) => s,
        }
    }
}

/// One known file from a reference corpus
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceRecord {
    /// Container (game/machine) name, e.g. "Batman Forever (Europe)"
    pub game: String,
    /// Entry (rom) file name
    pub name: String,
    pub size: Option<u64>,
    pub crc32: Option<u32>,
    pub md5: Option<[u8; 16]>,
    pub sha1: Option<[u8; 20]>,
    pub status: RomStatus,
}

impl ReferenceRecord {
    pub fn new(game: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            game: game.into(),
            name: name.into(),
            size: None,
            crc32: None,
            md5: None,
            sha1: None,
            status: RomStatus::Good,
        }
    }

    pub fn with_size(mut self, size: u64) -> Self {
        self.size = Some(size);
        self
    }

    pub fn with_crc32(mut self, crc32: u32) -> Self {
        self.crc32 = Some(crc32);
        self
    }

    pub fn with_md5(mut self, md5: [u8; 16]) -> Self {
        self.md5 = Some(md5);
        self
    }

    pub fn with_sha1(mut self, sha1: [u8; 20]) -> Self {
        self.sha1 = Some(sha1);
        self
    }

    pub fn with_status(mut self, status: RomStatus) -> Self {
        self.status = status;
        self
    }

    /// Compare against `fingerprint` using the strongest hash both sides have
    ///
    /// SHA1 decides when both have it, else MD5, else CRC32. A weaker hash
    /// is never consulted once a stronger one has been compared.
    pub fn matches(&self, fingerprint: &Fingerprint) -> bool {
        if let (Some(expected), Some(actual)) = (&self.sha1, &fingerprint.sha1) {
            return expected == actual;
        }
        if let (Some(expected), Some(actual)) = (&self.md5, &fingerprint.md5) {
            return expected == actual;
        }
        self.crc32 == Some(fingerprint.crc32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fingerprint(crc32: u32, md5: Option<[u8; 16]>, sha1: Option<[u8; 20]>) -> Fingerprint {
        Fingerprint { size: 4, crc32, md5, sha1 }
    }

    #[test]
    fn test_status_parsing() {
        assert_eq!(RomStatus::from_attr(None), RomStatus::Good);
        assert_eq!(RomStatus::from_attr(Some("baddump")), RomStatus::BadDump);
        assert_eq!(RomStatus::from_attr(Some("NoDump")), RomStatus::NoDump);
        assert_eq!(RomStatus::from_attr(Some("verified")), RomStatus::Verified);
        assert_eq!(RomStatus::from_attr(Some("odd")), RomStatus::Other("odd".into()));
    }

    #[test]
    fn test_sha1_decides_over_crc() {
        let record = ReferenceRecord::new("g", "r").with_crc32(1).with_sha1([9; 20]);
        assert!(!record.matches(&fingerprint(1, None, Some([8; 20]))));
        assert!(record.matches(&fingerprint(2, None, Some([9; 20]))));
    }

    #[test]
    fn test_md5_used_when_sha1_missing_on_either_side() {
        let record = ReferenceRecord::new("g", "r").with_crc32(1).with_md5([3; 16]);
        assert!(record.matches(&fingerprint(7, Some([3; 16]), Some([1; 20]))));
        assert!(!record.matches(&fingerprint(1, Some([4; 16]), Some([1; 20]))));
    }

    #[test]
    fn test_crc_fallback_and_empty_record() {
        let record = ReferenceRecord::new("g", "r").with_crc32(0xDEADBEEF);
        assert!(record.matches(&fingerprint(0xDEADBEEF, Some([0; 16]), Some([0; 20]))));

        let empty = ReferenceRecord::new("g", "r");
        assert!(!empty.matches(&fingerprint(0, None, None)));
    }
}
