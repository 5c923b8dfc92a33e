//! svndiff0/svndiff1 encoding of full texts.
//!
//! Commits always send file contents as self-contained insertion windows
//! (no source view), so no delta computation is needed.

use std::io::Write;

use flate2::Compression;
use flate2::write::ZlibEncoder;
use md5::{Digest, Md5};

use crate::SvnError;

const ZLIB_MIN_COMPRESS_SIZE: usize = 512;

/// Target window size (`SVN_DELTA_WINDOW_SIZE`).
pub(crate) const DEFAULT_WINDOW_SIZE: usize = 100 * 1024;

/// Default zlib level for svndiff1 (`SVN_DELTA_COMPRESSION_LEVEL_DEFAULT`).
pub(crate) const DEFAULT_ZLIB_LEVEL: u32 = 5;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum SvndiffVersion {
    V0,
    V1,
}

impl SvndiffVersion {
    pub(crate) fn header(self) -> [u8; 4] {
        match self {
            Self::V0 => *b"SVN\0",
            Self::V1 => *b"SVN\x01",
        }
    }
}

/// Encodes `contents` as a sequence of insertion windows, header first.
pub(crate) fn encode_fulltext(
    version: SvndiffVersion,
    contents: &[u8],
    zlib_level: u32,
    window_size: usize,
) -> Result<Vec<u8>, SvnError> {
    let mut out = Vec::with_capacity(contents.len() + 16);
    out.extend_from_slice(&version.header());

    for chunk in contents.chunks(window_size.max(1)) {
        encode_insertion_window(version, chunk, zlib_level, &mut out)?;
    }
    if contents.is_empty() {
        // an empty file still gets one window
        encode_insertion_window(version, &[], zlib_level, &mut out)?;
    }
    Ok(out)
}

fn encode_insertion_window(
    version: SvndiffVersion,
    new_data: &[u8],
    zlib_level: u32,
    out: &mut Vec<u8>,
) -> Result<(), SvnError> {
    let tview_len = new_data.len() as u64;
    let mut instructions = Vec::new();
    encode_new_instruction(new_data.len(), &mut instructions);

    let (instructions, new_data) = match version {
        SvndiffVersion::V0 => (instructions, new_data.to_vec()),
        SvndiffVersion::V1 => (
            compress_zlib(&instructions, zlib_level)?,
            compress_zlib(new_data, zlib_level)?,
        ),
    };

    encode_uint(0, out); // source view offset
    encode_uint(0, out); // source view length
    encode_uint(tview_len, out);
    encode_uint(instructions.len() as u64, out);
    encode_uint(new_data.len() as u64, out);
    out.extend_from_slice(&instructions);
    out.extend_from_slice(&new_data);
    Ok(())
}

fn encode_new_instruction(len: usize, out: &mut Vec<u8>) {
    let len = len as u64;
    if len >> 6 == 0 {
        out.push((0x2 << 6) | len as u8);
    } else {
        out.push(0x2 << 6);
        encode_uint(len, out);
    }
}

/// Big-endian base-128 with a continuation bit.
fn encode_uint(val: u64, out: &mut Vec<u8>) {
    let mut groups = 1u32;
    let mut rest = val >> 7;
    while rest > 0 {
        rest >>= 7;
        groups += 1;
    }
    while groups > 1 {
        groups -= 1;
        out.push(((val >> (groups * 7)) as u8 & 0x7f) | 0x80);
    }
    out.push(val as u8 & 0x7f);
}

/// Original length followed by zlib data, or the raw bytes when
/// compression does not pay off.
fn compress_zlib(data: &[u8], zlib_level: u32) -> Result<Vec<u8>, SvnError> {
    let mut out = Vec::new();
    encode_uint(data.len() as u64, &mut out);

    if data.len() < ZLIB_MIN_COMPRESS_SIZE || zlib_level == 0 {
        out.extend_from_slice(data);
        return Ok(out);
    }

    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::new(zlib_level.min(9)));
    encoder.write_all(data)?;
    let compressed = encoder.finish()?;
    if compressed.len() >= data.len() {
        out.extend_from_slice(data);
    } else {
        out.extend_from_slice(&compressed);
    }
    Ok(out)
}

/// Hex MD5 of `data`, the form `close-file` and `apply-textdelta` expect.
pub(crate) fn md5_hex(data: &[u8]) -> String {
    hex::encode(Md5::digest(data))
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use std::io::Read;

    use super::*;

    fn decode_uint(mut input: &[u8]) -> Option<(u64, &[u8])> {
        let mut val = 0u64;
        loop {
            let (&b, rest) = input.split_first()?;
            input = rest;
            val = val.checked_mul(128)?.checked_add(u64::from(b & 0x7f))?;
            if b & 0x80 == 0 {
                return Some((val, input));
            }
        }
    }

    fn decode_section(input: &[u8]) -> Vec<u8> {
        let (orig_len, rest) = decode_uint(input).unwrap();
        if rest.len() == orig_len as usize {
            return rest.to_vec();
        }
        let mut out = Vec::new();
        flate2::read::ZlibDecoder::new(rest)
            .read_to_end(&mut out)
            .unwrap();
        out
    }

    /// `(tview_len, instructions, new_data, remaining)`
    fn split_window(input: &[u8]) -> (u64, &[u8], &[u8], &[u8]) {
        let (sview_offset, input) = decode_uint(input).unwrap();
        let (sview_len, input) = decode_uint(input).unwrap();
        assert_eq!((sview_offset, sview_len), (0, 0));
        let (tview_len, input) = decode_uint(input).unwrap();
        let (ins_len, input) = decode_uint(input).unwrap();
        let (new_len, input) = decode_uint(input).unwrap();
        let (ins, input) = input.split_at(ins_len as usize);
        let (new, rest) = input.split_at(new_len as usize);
        (tview_len, ins, new, rest)
    }

    #[test]
    fn svndiff0_small_text_matches_known_bytes() {
        let bytes = encode_fulltext(SvndiffVersion::V0, b"abc", 0, 64).unwrap();
        assert_eq!(bytes, [b'S', b'V', b'N', 0, 0, 0, 3, 1, 3, 0x80 | 3, b'a', b'b', b'c']);
    }

    #[test]
    fn empty_text_still_emits_a_window() {
        let bytes = encode_fulltext(SvndiffVersion::V0, b"", 0, 64).unwrap();
        assert_eq!(bytes, [b'S', b'V', b'N', 0, 0, 0, 0, 1, 0, 0x80]);
    }

    #[test]
    fn long_texts_are_split_into_windows() {
        let contents: Vec<u8> = (0..200u8).collect();
        let bytes = encode_fulltext(SvndiffVersion::V0, &contents, 0, 128).unwrap();
        let (first_len, ins, first, rest) = split_window(&bytes[4..]);
        assert_eq!(first_len, 128);
        assert_eq!(ins, [0x80, 0x81, 0x00]);
        let (second_len, _, second, rest) = split_window(rest);
        assert_eq!(second_len, 72);
        assert!(rest.is_empty());
        assert_eq!([first, second].concat(), contents);
    }

    #[test]
    fn svndiff1_compresses_large_new_data() {
        let contents = vec![b'x'; 4096];
        let bytes = encode_fulltext(SvndiffVersion::V1, &contents, 5, DEFAULT_WINDOW_SIZE).unwrap();
        assert_eq!(&bytes[..4], b"SVN\x01");
        let (tview_len, ins, new, rest) = split_window(&bytes[4..]);
        assert_eq!(tview_len, 4096);
        assert!(rest.is_empty());
        assert!(new.len() < contents.len());
        assert_eq!(decode_section(new), contents);
        assert_eq!(decode_section(ins), [0x80, 0xa0, 0x00]);
    }

    #[test]
    fn svndiff1_keeps_small_sections_raw() {
        let bytes = encode_fulltext(SvndiffVersion::V1, b"abc", 5, 64).unwrap();
        let (tview_len, ins, new, _) = split_window(&bytes[4..]);
        assert_eq!(tview_len, 3);
        assert_eq!(ins, [1, 0x80 | 3]);
        assert_eq!(new, [3, b'a', b'b', b'c']);
    }

    #[test]
    fn md5_hex_matches_known_digest() {
        assert_eq!(md5_hex(b""), "d41d8cd98f00b204e9800998ecf8427e");
        assert_eq!(md5_hex(b"abc"), "900150983cd24fb0d6963f7d28e17f72");
    }
}
