//! Deflate (and, behind a feature flag, bzip2) compression for chunk
//! payloads and `xheader` sections, plus pattern-fill expansion (§4.3 step 2).

use crate::error::EwfError;
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use std::io::{Read, Write};

type Result<T> = std::result::Result<T, EwfError>;

pub fn deflate_decompress(data: &[u8], expected_len: usize) -> Result<Vec<u8>> {
    let mut decoder = ZlibDecoder::new(data);
    let mut out = Vec::with_capacity(expected_len);
    decoder
        .read_to_end(&mut out)
        .map_err(|e| EwfError::corrupt("chunk", format!("deflate decompress failed: {e}")))?;
    Ok(out)
}

pub fn deflate_compress(data: &[u8], level: flate2::Compression) -> Result<Vec<u8>> {
    let mut encoder = ZlibEncoder::new(Vec::new(), level);
    encoder
        .write_all(data)
        .map_err(|e| EwfError::io("deflate compress", e))?;
    encoder.finish().map_err(|e| EwfError::io("deflate finish", e))
}

#[cfg(feature = "bzip2-chunks")]
pub fn bzip2_decompress(data: &[u8], expected_len: usize) -> Result<Vec<u8>> {
    use bzip2::read::BzDecoder;
    let mut decoder = BzDecoder::new(data);
    let mut out = Vec::with_capacity(expected_len);
    decoder
        .read_to_end(&mut out)
        .map_err(|e| EwfError::corrupt("chunk", format!("bzip2 decompress failed: {e}")))?;
    Ok(out)
}

#[cfg(feature = "bzip2-chunks")]
pub fn bzip2_compress(data: &[u8], level: ::bzip2::Compression) -> Result<Vec<u8>> {
    use bzip2::write::BzEncoder;
    let mut encoder = BzEncoder::new(Vec::new(), level);
    encoder.write_all(data).map_err(|e| EwfError::io("bzip2 compress", e))?;
    encoder.finish().map_err(|e| EwfError::io("bzip2 finish", e))
}

/// Expand a `{pattern[8], repeat_count: u64}` payload (§4.3 step 2) into
/// `repeat_count * 8` bytes, truncated or zero-extended to `chunk_size`.
pub fn expand_pattern_fill(pattern: [u8; 8], repeat_count: u64, chunk_size: usize) -> Vec<u8> {
    let mut out = Vec::with_capacity(chunk_size);
    while out.len() + 8 <= chunk_size {
        out.extend_from_slice(&pattern);
        if out.len() / 8 >= repeat_count as usize {
            break;
        }
    }
    out.truncate(chunk_size);
    if out.len() < chunk_size {
        out.resize(chunk_size, 0);
    }
    out
}

/// Build a pattern-fill payload for the writer: `{pattern[8], repeat:u64LE}`.
pub fn pack_pattern_fill(pattern: [u8; 8], repeat_count: u64) -> Vec<u8> {
    let mut out = Vec::with_capacity(16);
    out.extend_from_slice(&pattern);
    out.extend_from_slice(&repeat_count.to_le_bytes());
    out
}
