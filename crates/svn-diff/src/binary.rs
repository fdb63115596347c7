//! Git binary patch streams.
//!
//! A binary section is read through a three-stage pipeline: a base85
//! line decoder over the recorded byte range of the patch file, a zlib
//! decompressor, and a verifier that the expanded byte count matches
//! the size declared by the `literal` header.

use std::io::{self, Read, Seek};

use flate2::read::ZlibDecoder;

use crate::patch_file::PatchFile;
use crate::{BinaryPatch, DiffError};

/// The git base85 alphabet.
const BASE85_ALPHABET: &[u8; 85] =
    b"0123456789abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ!#$%&()*+-;<=>?@^_`{|}~";

const fn decode_table() -> [i16; 256] {
    let mut table = [-1i16; 256];
    let mut i = 0;
    while i < BASE85_ALPHABET.len() {
        table[BASE85_ALPHABET[i] as usize] = i as i16;
        i += 1;
    }
    table
}

static DECODE_TABLE: [i16; 256] = decode_table();

fn unexpected(msg: &str) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, msg.to_string())
}

/// Decode one base85-encoded line body into `count` bytes.
///
/// Every 5 input characters decode to a big-endian `u32`, i.e. 4
/// output bytes; the final group is zero padded by the encoder, so the
/// input length must be exactly `ceil(count / 4) * 5`.
fn decode_line(count: usize, encoded: &[u8]) -> io::Result<Vec<u8>> {
    let expected = count.div_ceil(4) * 5;
    if encoded.len() != expected {
        return Err(unexpected("base85 line length mismatch"));
    }

    let mut out = Vec::with_capacity(expected / 5 * 4);
    for chunk in encoded.chunks(5) {
        let mut acc: u32 = 0;
        for &c in chunk {
            let value = DECODE_TABLE[c as usize];
            if value < 0 {
                return Err(unexpected("invalid base85 character"));
            }
            acc = acc
                .checked_mul(85)
                .and_then(|a| a.checked_add(value as u32))
                .ok_or_else(|| unexpected("base85 value out of range"))?;
        }
        out.extend_from_slice(&acc.to_be_bytes());
    }

    out.truncate(count);
    Ok(out)
}

/// Reads decoded base85 data from a byte range of the patch file.
///
/// Each encoded line starts with a length byte: `A`..`Z` encode 1..26
/// payload bytes, `a`..`z` encode 27..52. A line carrying fewer than
/// 52 bytes is the last one of its section.
struct Base85Reader<'a, R> {
    file: &'a mut PatchFile<R>,
    next_pos: u64,
    end_pos: u64,
    buffer: Vec<u8>,
    buf_pos: usize,
    done: bool,
}

impl<'a, R: Read + Seek> Base85Reader<'a, R> {
    fn new(file: &'a mut PatchFile<R>, start: u64, end: u64) -> Self {
        Base85Reader {
            file,
            next_pos: start,
            end_pos: end,
            buffer: Vec::new(),
            buf_pos: 0,
            done: false,
        }
    }
}

impl<R: Read + Seek> Read for Base85Reader<'_, R> {
    fn read(&mut self, out: &mut [u8]) -> io::Result<usize> {
        if self.done {
            return Ok(0);
        }

        let mut written = 0;
        while written < out.len()
            && (self.buf_pos < self.buffer.len() || self.next_pos < self.end_pos)
        {
            let available = self.buffer.len() - self.buf_pos;
            if available > 0 {
                let n = (out.len() - written).min(available);
                out[written..written + n]
                    .copy_from_slice(&self.buffer[self.buf_pos..self.buf_pos + n]);
                written += n;
                self.buf_pos += n;
                if written == out.len() {
                    return Ok(written);
                }
            }

            if self.next_pos >= self.end_pos {
                break;
            }
            self.file.seek_to(self.next_pos)?;
            let raw = self.file.readline()?;
            if raw.at_eof {
                self.next_pos = self.end_pos;
            } else {
                self.next_pos = self.file.position()?;
            }

            let count = match raw.text.first() {
                Some(&c @ b'A'..=b'Z') => (c - b'A') as usize + 1,
                Some(&c @ b'a'..=b'z') => (c - b'a') as usize + 27,
                _ => return Err(unexpected("unexpected data in base85 section")),
            };
            if count < 52 {
                // Short line; handle the rest of the range as EOF.
                self.next_pos = self.end_pos;
            }

            self.buffer = decode_line(count, &raw.text[1..])?;
            self.buf_pos = 0;
        }

        self.done = true;
        Ok(written)
    }
}

/// Enforces that the expanded stream is exactly the declared size.
struct LengthVerify<T> {
    inner: T,
    remaining: u64,
}

impl<T: Read> Read for LengthVerify<T> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        let n = self.inner.read(buf)?;
        if n as u64 > self.remaining {
            return Err(unexpected(
                "base85 data expands to longer than declared filesize",
            ));
        }
        if n == 0 && self.remaining > 0 {
            return Err(unexpected(
                "base85 data expands to smaller than declared filesize",
            ));
        }
        self.remaining -= n as u64;
        Ok(n)
    }
}

/// An on-demand reader over one side of a git binary patch.
pub struct BinaryStream<'a, R: Read + Seek> {
    inner: Option<LengthVerify<ZlibDecoder<Base85Reader<'a, R>>>>,
}

impl<'a, R: Read + Seek> BinaryStream<'a, R> {
    fn new(file: &'a mut PatchFile<R>, start: u64, end: u64, expanded_size: u64) -> Self {
        // An absent section with a declared size of zero is simply
        // empty; everything else goes through the full pipeline.
        let inner = if start >= end && expanded_size == 0 {
            None
        } else {
            Some(LengthVerify {
                inner: ZlibDecoder::new(Base85Reader::new(file, start, end)),
                remaining: expanded_size,
            })
        };
        BinaryStream { inner }
    }

    /// Drain the stream, verifying the declared size on the way.
    pub fn read_all(mut self) -> Result<Vec<u8>, DiffError> {
        let mut out = Vec::new();
        match self.read_to_end(&mut out) {
            Ok(_) => Ok(out),
            Err(e) if e.kind() == io::ErrorKind::InvalidData => {
                Err(DiffError::UnexpectedData(e.to_string()))
            }
            Err(e) => Err(DiffError::Io(e)),
        }
    }
}

impl<R: Read + Seek> Read for BinaryStream<'_, R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match &mut self.inner {
            Some(inner) => inner.read(buf),
            None => Ok(0),
        }
    }
}

impl BinaryPatch {
    /// Stream the original (pre-patch) side.
    pub fn original_stream<'a, R: Read + Seek>(
        &self,
        patch_file: &'a mut PatchFile<R>,
    ) -> BinaryStream<'a, R> {
        BinaryStream::new(patch_file, self.src_start, self.src_end, self.src_filesize)
    }

    /// Stream the result (post-patch) side.
    pub fn result_stream<'a, R: Read + Seek>(
        &self,
        patch_file: &'a mut PatchFile<R>,
    ) -> BinaryStream<'a, R> {
        BinaryStream::new(patch_file, self.dst_start, self.dst_end, self.dst_filesize)
    }
}

/// Encode bytes as base85 blob lines, 52 payload bytes per line.
///
/// The inverse of the decoder, used by tests and by diff output code
/// that needs to emit binary sections.
pub fn encode_base85(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    for chunk in data.chunks(52) {
        let len_byte = if chunk.len() <= 26 {
            b'A' + (chunk.len() - 1) as u8
        } else {
            b'a' + (chunk.len() - 27) as u8
        };
        out.push(len_byte);

        for group in chunk.chunks(4) {
            let mut word = [0u8; 4];
            word[..group.len()].copy_from_slice(group);
            let mut acc = u32::from_be_bytes(word);
            let mut encoded = [0u8; 5];
            for slot in encoded.iter_mut().rev() {
                *slot = BASE85_ALPHABET[(acc % 85) as usize];
                acc /= 85;
            }
            out.extend_from_slice(&encoded);
        }
        out.push(b'\n');
    }
    out
}
