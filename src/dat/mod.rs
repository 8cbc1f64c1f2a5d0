//! Reference datfiles and identification
//!
//! Loads checksum databases and matches fingerprints against them.

mod datfile;
mod index;
mod record;

pub use datfile::{DatError, ReferenceCorpus};
pub use index::IdentificationIndex;
pub use record::{ReferenceRecord, RomStatus};
