//! zlib (DEFLATE) compression applied before encryption.
//!
//! Inflation is always bounded: a payload that expands past `max_output`
//! is rejected instead of being buffered.

use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use std::io::{Read, Write};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CompressionError {
    #[error("Compression failed: {0}")]
    CompressionFailed(String),
    #[error("Decompression failed")]
    DecompressionFailed,
    #[error("Decompressed size exceeds limit of {limit} bytes")]
    OutputTooLarge { limit: usize },
}

pub type Result<T> = std::result::Result<T, CompressionError>;

/// Compress `data` at `level` (0..=9).
pub fn compress(data: &[u8], level: u32) -> Result<Vec<u8>> {
    let mut encoder = ZlibEncoder::new(Vec::with_capacity(data.len() / 2 + 16), Compression::new(level));
    encoder
        .write_all(data)
        .map_err(|e| CompressionError::CompressionFailed(e.to_string()))?;
    encoder
        .finish()
        .map_err(|e| CompressionError::CompressionFailed(e.to_string()))
}

/// Inflate `data`, producing at most `max_output` bytes.
pub fn decompress(data: &[u8], max_output: usize) -> Result<Vec<u8>> {
    let decoder = ZlibDecoder::new(data);
    let mut out = Vec::new();
    decoder
        .take(max_output as u64 + 1)
        .read_to_end(&mut out)
        .map_err(|_| CompressionError::DecompressionFailed)?;
    if out.len() > max_output {
        return Err(CompressionError::OutputTooLarge { limit: max_output });
    }
    Ok(out)
}
