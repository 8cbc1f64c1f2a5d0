//! romdex Library
//!
//! Identifies ROM and disc images by hashing them through format-aware
//! virtual streams and matching the result against datfiles.

pub mod archive;
pub mod checksum;
pub mod config;
pub mod dat;
pub mod report;
pub mod scan;
pub mod sniff;
pub mod stream;
