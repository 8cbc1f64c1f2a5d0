//! Virtual stream layer
//!
//! Makes raw CD images, block-compressed images and byte-swapped dumps look
//! like one uniform seekable byte stream. Decorators own their inner stream
//! and implement the same [`RandomAccessStream`] trait, so they compose.

mod gcz;
mod reader;
mod sector;
mod swap;

pub use gcz::{BlockCompressedStream, BlockDescriptor, GczHeader, GCZ_MAGIC};
pub use reader::{FileStream, MemoryStream, RandomAccessStream, StreamError, StreamExt, TextEncoding};
pub use sector::{SectorLayout, SectorRemapStream};
pub use swap::PairSwapStream;

pub(crate) use reader::resolve_seek;
