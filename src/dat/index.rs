//! Identification against loaded corpora

use super::datfile::ReferenceCorpus;
use super::record::ReferenceRecord;
use crate::checksum::Fingerprint;

/// Every corpus loaded for a scan session, in load order
///
/// Read-only once built; workers share it by reference.
#[derive(Debug, Default)]
pub struct IdentificationIndex {
    corpora: Vec<ReferenceCorpus>,
}

impl IdentificationIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, corpus: ReferenceCorpus) {
        self.corpora.push(corpus);
    }

    pub fn corpora(&self) -> &[ReferenceCorpus] {
        &self.corpora
    }

    pub fn is_empty(&self) -> bool {
        self.corpora.is_empty()
    }

    /// Total records across every corpus
    pub fn record_count(&self) -> usize {
        self.corpora.iter().map(ReferenceCorpus::len).sum()
    }

    /// Query each corpus independently; one slot per corpus, `None` when it has no match
    pub fn identify(&self, fingerprint: &Fingerprint) -> Vec<Option<&ReferenceRecord>> {
        self.corpora
            .iter()
            .map(|corpus| corpus.find(fingerprint))
            .collect()
    }

    /// First match in corpus order, with the corpus it came from
    pub fn best_match(&self, fingerprint: &Fingerprint) -> Option<(&ReferenceCorpus, &ReferenceRecord)> {
        self.corpora
            .iter()
            .find_map(|corpus| corpus.find(fingerprint).map(|record| (corpus, record)))
    }
}

impl FromIterator<ReferenceCorpus> for IdentificationIndex {
    fn from_iter<I: IntoIterator<Item = ReferenceCorpus>>(iter: I) -> Self {
        Self {
            corpora: iter.into_iter().collect(),
        }
    }
}
