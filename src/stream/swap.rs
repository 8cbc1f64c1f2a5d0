//! Byte-pair swapping for interleaved dumps
//!
//! Some ROM dumps (N64 `.v64`, a few copier formats) store every 16-bit word
//! with its bytes swapped. [`PairSwapStream`] undoes that on the fly for
//! reads of any alignment and length.

use std::io::{self, Read, Seek, SeekFrom};

use super::reader::RandomAccessStream;
use super::resolve_seek;

/// Stream whose logical byte `p` is inner byte `p ^ 1`
pub struct PairSwapStream<S> {
    inner: S,
    length: u64,
    position: u64,
    /// Already-swapped byte at `position`, left over when the last read ended mid-pair
    carry: Option<u8>,
    scratch: Vec<u8>,
}

impl<S: RandomAccessStream> PairSwapStream<S> {
    pub fn new(inner: S) -> Self {
        let length = inner.length();
        Self {
            inner,
            length,
            position: 0,
            carry: None,
            scratch: Vec::new(),
        }
    }

    /// Byte held over from the previous read, if any
    pub fn carry(&self) -> Option<u8> {
        self.carry
    }

    pub fn into_inner(self) -> S {
        self.inner
    }
}

/// Swap each complete pair in place; an odd trailing byte stays put
fn swap_pairs(bytes: &mut [u8]) {
    for pair in bytes.chunks_exact_mut(2) {
        pair.swap(0, 1);
    }
}

impl<S: RandomAccessStream> Read for PairSwapStream<S> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let available = self.length.saturating_sub(self.position);
        let count = (buf.len() as u64).min(available) as usize;
        if count == 0 {
            return Ok(0);
        }

        let mut written = 0;
        if let Some(byte) = self.carry.take() {
            buf[0] = byte;
            written = 1;
            self.position += 1;
        }

        if written < count {
            let aligned = self.position & !1;
            let skip = (self.position - aligned) as usize;
            let wanted = count - written;
            let window = ((skip + wanted + 1) & !1).min((self.length - aligned) as usize);

            self.scratch.resize(window, 0);
            self.inner.seek(SeekFrom::Start(aligned))?;
            self.inner.read_exact(&mut self.scratch)?;
            swap_pairs(&mut self.scratch);

            let end = skip + wanted;
            buf[written..count].copy_from_slice(&self.scratch[skip..end]);
            if end < window {
                self.carry = Some(self.scratch[end]);
            }
            written = count;
            self.position += wanted as u64;
        }

        Ok(written)
    }
}

impl<S: RandomAccessStream> Seek for PairSwapStream<S> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let target = resolve_seek(self.position, self.length, pos)?;
        if target != self.position {
            self.carry = None;
            self.position = target;
        }
        Ok(target)
    }
}

impl<S: RandomAccessStream> RandomAccessStream for PairSwapStream<S> {
    fn length(&self) -> u64 {
        self.length
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::StreamExt;
    use proptest::prelude::*;
    use crate::stream::MemoryStream;

    fn sample(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i * 37 + 11) as u8).collect()
    }

    fn swapped(data: &[u8]) -> Vec<u8> {
        let mut out = data.to_vec();
        swap_pairs(&mut out);
        out
    }

    #[test]
    fn test_n64_magic_unswaps() {
        let mut stream = PairSwapStream::new(MemoryStream::new(vec![0x37, 0x80, 0x40, 0x12]));
        assert_eq!(stream.read_u32_be().unwrap(), 0x80371240);
    }

    #[test]
    fn test_double_swap_is_identity() {
        let data = sample(1001);
        let mut twice = PairSwapStream::new(PairSwapStream::new(MemoryStream::new(data.clone())));
        let mut out = Vec::new();
        twice.read_to_end(&mut out).unwrap();
        assert_eq!(out, data);
    }

    #[test]
    fn test_bulk_matches_bytewise_at_even_and_odd_offsets() {
        let data = sample(64);
        let expected = swapped(&data);
        let mut stream = PairSwapStream::new(MemoryStream::new(data));

        for start in [0u64, 1, 2, 7, 30, 63] {
            for len in [1usize, 2, 3, 10, 33] {
                let len = len.min(64 - start as usize);

                stream.seek_to(start).unwrap();
                let bulk = stream.read_bytes(len).unwrap();

                stream.seek_to(start).unwrap();
                let bytewise: Vec<u8> = (0..len)
                    .map(|_| StreamExt::read_u8(&mut stream).unwrap())
                    .collect();

                assert_eq!(bulk, bytewise, "start={} len={}", start, len);
                assert_eq!(&bulk[..], &expected[start as usize..start as usize + len]);
            }
        }
    }

    #[test]
    fn test_carry_is_held_between_reads() {
        let mut stream = PairSwapStream::new(MemoryStream::new(vec![1, 2, 3, 4]));
        let mut one = [0u8; 1];

        stream.read_exact(&mut one).unwrap();
        assert_eq!(one, [2]);
        assert_eq!(stream.carry(), Some(1));

        stream.read_exact(&mut one).unwrap();
        assert_eq!(one, [1]);
        assert_eq!(stream.carry(), None);

        // Telling the position must not drop the carry
        stream.read_exact(&mut one).unwrap();
        assert_eq!(stream.tell().unwrap(), 3);
        assert_eq!(stream.carry(), Some(3));

        stream.seek_to(0).unwrap();
        assert_eq!(stream.carry(), None);
        assert_eq!(stream.read_bytes(4).unwrap(), vec![2, 1, 4, 3]);
    }

    #[test]
    fn test_odd_length_keeps_last_byte() {
        let mut stream = PairSwapStream::new(MemoryStream::new(vec![1, 2, 3, 4, 5]));
        let mut out = Vec::new();
        stream.read_to_end(&mut out).unwrap();
        assert_eq!(out, vec![2, 1, 4, 3, 5]);

        stream.seek_to(3).unwrap();
        assert_eq!(stream.read_bytes(2).unwrap(), vec![3, 5]);
    }

    proptest! {
        #[test]
        fn prop_any_chunking_matches_reference(
            len in 0usize..300,
            chunks in proptest::collection::vec(1usize..9, 1..80),
        ) {
            let data = sample(len);
            let expected = swapped(&data);
            let mut stream = PairSwapStream::new(MemoryStream::new(data));

            let mut out = Vec::new();
            for size in chunks.iter().cycle() {
                let mut buf = vec![0u8; *size];
                let n = stream.read(&mut buf).unwrap();
                if n == 0 {
                    break;
                }
                out.extend_from_slice(&buf[..n]);
            }
            prop_assert_eq!(out, expected);
        }
    }
}
