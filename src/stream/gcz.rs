//! GCZ block-compressed images
//!
//! A GCZ image splits the uncompressed data into fixed-size blocks and
//! compresses each one on its own with zlib, so any block can be decoded
//! without touching its neighbours.
//!
//! Layout (little-endian):
//!
//! | Offset | Size          | Field                               |
//! |--------|---------------|-------------------------------------|
//! | 0      | 4             | magic `0xB10BC001`                  |
//! | 4      | 4             | sub-type                            |
//! | 8      | 8             | compressed data size                |
//! | 16     | 8             | uncompressed data size              |
//! | 24     | 4             | block size                          |
//! | 28     | 4             | block count                         |
//! | 32     | 8 * count     | block pointers (bit 63 = stored)    |
//! | ...    | 4 * count     | Adler-32 of each block's stored bytes |
//! | ...    | compressed    | block data                          |

use std::io::{self, Read, Seek, SeekFrom};

use byteorder::{LittleEndian, ReadBytesExt};
use flate2::read::ZlibDecoder;

use super::reader::{RandomAccessStream, StreamError};
use super::resolve_seek;

/// Magic cookie at the start of every GCZ image
pub const GCZ_MAGIC: u32 = 0xB10B_C001;

/// Fixed header size before the block tables
const HEADER_SIZE: u64 = 32;

/// Pointer bit marking a block stored without compression
const UNCOMPRESSED_FLAG: u64 = 1 << 63;

/// Bytes of table data per block: one u64 pointer and one u32 hash
const TABLE_ENTRY_SIZE: u64 = 12;

/// Most output reserved up front while inflating a block
const MAX_INFLATE_RESERVE: usize = 16 << 20;

/// Parsed GCZ header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GczHeader {
    pub sub_type: u32,
    pub compressed_size: u64,
    pub data_size: u64,
    pub block_size: u32,
    pub block_count: u32,
}

impl GczHeader {
    /// Read and check the fixed header from the start of `reader`
    pub fn read_from<R: Read + Seek + ?Sized>(reader: &mut R) -> Result<Self, StreamError> {
        reader.seek(SeekFrom::Start(0))?;

        let magic = reader.read_u32::<LittleEndian>()?;
        if magic != GCZ_MAGIC {
            return Err(StreamError::BadMagic { expected: GCZ_MAGIC, found: magic });
        }

        Ok(Self {
            sub_type: reader.read_u32::<LittleEndian>()?,
            compressed_size: reader.read_u64::<LittleEndian>()?,
            data_size: reader.read_u64::<LittleEndian>()?,
            block_size: reader.read_u32::<LittleEndian>()?,
            block_count: reader.read_u32::<LittleEndian>()?,
        })
    }
}

/// One entry of the block table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockDescriptor {
    pub index: u32,
    /// Offset of the stored bytes relative to the data region
    pub offset: u64,
    pub compressed_size: u64,
    /// Stored as raw payload, no inflate needed
    pub stored: bool,
    /// Adler-32 of the stored bytes
    pub hash: u32,
}

/// Lazily-decoded view of a GCZ image
pub struct BlockCompressedStream<S> {
    inner: S,
    header: GczHeader,
    blocks: Vec<BlockDescriptor>,
    data_start: u64,
    position: u64,
    /// Most recently decoded block
    cached: Option<(u32, Vec<u8>)>,
    stored: Vec<u8>,
    verify_hashes: bool,
    hash_mismatches: Vec<u32>,
}

impl<S: RandomAccessStream> BlockCompressedStream<S> {
    /// Parse the header and block table of `inner`
    pub fn open(mut inner: S) -> Result<Self, StreamError> {
        let header = GczHeader::read_from(&mut inner)?;
        let blocks = read_block_table(&mut inner, &header)?;
        let data_start = HEADER_SIZE + header.block_count as u64 * TABLE_ENTRY_SIZE;

        log::debug!(
            "GCZ image: {} blocks of {} bytes, {} -> {} bytes",
            header.block_count, header.block_size, header.compressed_size, header.data_size
        );

        Ok(Self {
            inner,
            header,
            blocks,
            data_start,
            position: 0,
            cached: None,
            stored: Vec::new(),
            verify_hashes: false,
            hash_mismatches: Vec::new(),
        })
    }

    /// Check each decoded block against its Adler-32
    pub fn with_hash_verification(mut self, enabled: bool) -> Self {
        self.verify_hashes = enabled;
        self
    }

    pub fn header(&self) -> &GczHeader {
        &self.header
    }

    pub fn blocks(&self) -> &[BlockDescriptor] {
        &self.blocks
    }

    /// Blocks whose hash failed while reading with verification enabled, each listed once
    pub fn hash_mismatches(&self) -> &[u32] {
        &self.hash_mismatches
    }

    /// Check every block's stored bytes against the hash table
    pub fn verify_all(&mut self) -> Result<(), StreamError> {
        for index in 0..self.header.block_count {
            self.load_stored(index)?;
            let expected = self.blocks[index as usize].hash;
            let actual = adler2::adler32_slice(&self.stored);
            if actual != expected {
                return Err(StreamError::HashMismatch { block: index, expected, actual });
            }
        }
        Ok(())
    }

    pub fn into_inner(self) -> S {
        self.inner
    }

    /// Uncompressed length of block `index`; only the last block may be short
    fn block_len(&self, index: u32) -> usize {
        let block_size = self.header.block_size as u64;
        let start = index as u64 * block_size;
        block_size.min(self.header.data_size - start) as usize
    }

    /// Read block `index`'s stored bytes into `self.stored`
    fn load_stored(&mut self, index: u32) -> io::Result<()> {
        let block = self.blocks[index as usize];
        let start = self.data_start + block.offset;
        let available = self.inner.length().saturating_sub(start);
        if block.compressed_size > available {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!(
                    "block {} needs {} bytes at {} but only {} remain",
                    index, block.compressed_size, start, available
                ),
            ));
        }

        self.stored.resize(block.compressed_size as usize, 0);
        self.inner.seek(SeekFrom::Start(start))?;
        self.inner.read_exact(&mut self.stored)
    }

    /// Make block `index` the cached block
    fn materialize(&mut self, index: u32) -> io::Result<()> {
        if matches!(self.cached, Some((cached, _)) if cached == index) {
            return Ok(());
        }

        self.load_stored(index)?;
        let block = self.blocks[index as usize];

        if self.verify_hashes && !self.hash_mismatches.contains(&index) {
            let actual = adler2::adler32_slice(&self.stored);
            if actual != block.hash {
                log::warn!(
                    "GCZ block {} hash mismatch: expected {:08x}, found {:08x}",
                    index, block.hash, actual
                );
                self.hash_mismatches.push(index);
            }
        }

        let expected = self.block_len(index);
        let mut data = self.cached.take().map(|(_, data)| data).unwrap_or_default();
        data.clear();

        if block.stored {
            if self.stored.len() < expected {
                return Err(StreamError::CorruptContainer(format!(
                    "stored block {} holds {} bytes, expected {}",
                    index,
                    self.stored.len(),
                    expected
                ))
                .into());
            }
            data.extend_from_slice(&self.stored[..expected]);
        } else {
            inflate_block(index, &self.stored, expected, &mut data)?;
        }

        self.cached = Some((index, data));
        Ok(())
    }
}

/// Parse and validate the pointer and hash tables
fn read_block_table<S: RandomAccessStream>(
    inner: &mut S,
    header: &GczHeader,
) -> Result<Vec<BlockDescriptor>, StreamError> {
    if header.block_size == 0 {
        return Err(StreamError::CorruptContainer("block size is zero".into()));
    }

    let expected_blocks = header.data_size.div_ceil(header.block_size as u64);
    if header.block_count as u64 != expected_blocks {
        return Err(StreamError::CorruptContainer(format!(
            "{} blocks declared, {} bytes of {}-byte blocks needs {}",
            header.block_count, header.data_size, header.block_size, expected_blocks
        )));
    }

    let table_end = HEADER_SIZE + header.block_count as u64 * TABLE_ENTRY_SIZE;
    if table_end > inner.length() {
        return Err(StreamError::CorruptContainer(format!(
            "block table ends at {} but file is {} bytes",
            table_end,
            inner.length()
        )));
    }

    let data_end = table_end.checked_add(header.compressed_size);
    if header.compressed_size > inner.length() || data_end.is_none() {
        return Err(StreamError::CorruptContainer(format!(
            "compressed size {} does not fit in a {}-byte file",
            header.compressed_size,
            inner.length()
        )));
    }

    let count = header.block_count as usize;
    let mut pointers = Vec::with_capacity(count);
    for _ in 0..count {
        pointers.push(inner.read_u64::<LittleEndian>()?);
    }
    let mut hashes = Vec::with_capacity(count);
    for _ in 0..count {
        hashes.push(inner.read_u32::<LittleEndian>()?);
    }

    let mut blocks = Vec::with_capacity(count);
    for (i, (&pointer, &hash)) in pointers.iter().zip(&hashes).enumerate() {
        let offset = pointer & !UNCOMPRESSED_FLAG;
        let next = match pointers.get(i + 1) {
            Some(next) => next & !UNCOMPRESSED_FLAG,
            None => header.compressed_size,
        };
        if next < offset {
            return Err(StreamError::CorruptContainer(format!(
                "block {} starts at {} but its end is {}",
                i, offset, next
            )));
        }

        blocks.push(BlockDescriptor {
            index: i as u32,
            offset,
            compressed_size: next - offset,
            stored: pointer & UNCOMPRESSED_FLAG != 0,
            hash,
        });
    }

    Ok(blocks)
}

/// Inflate one zlib block to exactly `expected` bytes
fn inflate_block(index: u32, compressed: &[u8], expected: usize, out: &mut Vec<u8>) -> io::Result<()> {
    out.reserve(expected.min(MAX_INFLATE_RESERVE));
    let mut decoder = ZlibDecoder::new(compressed).take(expected as u64 + 1);
    decoder.read_to_end(out).map_err(|e| {
        StreamError::CorruptContainer(format!("block {} failed to inflate: {}", index, e))
    })?;

    if out.len() != expected {
        return Err(StreamError::CorruptContainer(format!(
            "block {} inflated to {} bytes, expected {}",
            index,
            out.len(),
            expected
        ))
        .into());
    }
    Ok(())
}

impl<S: RandomAccessStream> Read for BlockCompressedStream<S> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let length = self.header.data_size;
        if buf.is_empty() || self.position >= length {
            return Ok(0);
        }

        let end = (self.position + buf.len() as u64).min(length);
        let block_size = self.header.block_size as u64;
        let mut index = self.position / block_size;
        let mut written = 0;

        while index * block_size < end {
            self.materialize(index as u32)?;
            let Some((_, data)) = &self.cached else { break };

            let block_start = index * block_size;
            let from = self.position.max(block_start);
            let to = end.min(block_start + data.len() as u64);
            if to <= from {
                break;
            }

            let src = &data[(from - block_start) as usize..(to - block_start) as usize];
            buf[written..written + src.len()].copy_from_slice(src);
            written += src.len();
            self.position = to;
            index += 1;
        }

        Ok(written)
    }
}

impl<S: RandomAccessStream> Seek for BlockCompressedStream<S> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.position = resolve_seek(self.position, self.header.data_size, pos)?;
        Ok(self.position)
    }
}

impl<S: RandomAccessStream> RandomAccessStream for BlockCompressedStream<S> {
    fn length(&self) -> u64 {
        self.header.data_size
    }

    fn block_hash_mismatches(&self) -> &[u32] {
        &self.hash_mismatches
    }
}
