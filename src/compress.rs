//! Deflate encode/decode over byte buffers.
//!
//! Grounded on `other_examples/.../lf--rgit/src-objects.rs` which wraps
//! `flate2`'s `Zlib{Encoder,Decoder}` around object bytes on write/read.
//! Pakacage Guardian's on-disk framing is raw Deflate rather than
//! zlib-framed, so the `flate2::{write,read}::Deflate{Encoder,Decoder}`
//! variants are used instead — same crate, same shape.

use std::io::{Read, Write};

use flate2::read::DeflateDecoder;
use flate2::write::DeflateEncoder;
use flate2::Compression;

use crate::error::CompressError;

/// Compresses `data` using the "best compression" preset, per spec.
pub fn compress(data: &[u8]) -> Result<Vec<u8>, CompressError> {
    let mut encoder = DeflateEncoder::new(Vec::new(), Compression::best());
    encoder.write_all(data)?;
    Ok(encoder.finish()?)
}

/// Decompresses a Deflate stream previously produced by [`compress`].
///
/// Returns [`CompressError::CorruptCompression`] if the stream is
/// truncated or otherwise invalid.
pub fn decompress(data: &[u8]) -> Result<Vec<u8>, CompressError> {
    let mut decoder = DeflateDecoder::new(data);
    let mut out = Vec::new();
    decoder
        .read_to_end(&mut out)
        .map_err(|e| CompressError::CorruptCompression(e.to_string()))?;
    Ok(out)
}
