//! Little/big-endian integer and string packing over a `Read + Seek` file,
//! plus write-side helpers for the segment-file writer (C10).

use crate::error::EwfError;
use std::io::{Read, Seek, SeekFrom, Write};

type Result<T> = std::result::Result<T, EwfError>;

fn io_err(context: &str, e: std::io::Error) -> EwfError {
    EwfError::io(context.to_string(), e)
}

pub fn read_u8<R: Read>(r: &mut R) -> Result<u8> {
    let mut buf = [0u8; 1];
    r.read_exact(&mut buf).map_err(|e| io_err("read u8", e))?;
    Ok(buf[0])
}

pub fn read_u16_le<R: Read>(r: &mut R) -> Result<u16> {
    let mut buf = [0u8; 2];
    r.read_exact(&mut buf).map_err(|e| io_err("read u16", e))?;
    Ok(u16::from_le_bytes(buf))
}

pub fn read_u32_le<R: Read>(r: &mut R) -> Result<u32> {
    let mut buf = [0u8; 4];
    r.read_exact(&mut buf).map_err(|e| io_err("read u32", e))?;
    Ok(u32::from_le_bytes(buf))
}

pub fn read_u64_le<R: Read>(r: &mut R) -> Result<u64> {
    let mut buf = [0u8; 8];
    r.read_exact(&mut buf).map_err(|e| io_err("read u64", e))?;
    Ok(u64::from_le_bytes(buf))
}

pub fn read_i64_le<R: Read>(r: &mut R) -> Result<i64> {
    let mut buf = [0u8; 8];
    r.read_exact(&mut buf).map_err(|e| io_err("read i64", e))?;
    Ok(i64::from_le_bytes(buf))
}

pub fn read_bytes<R: Read>(r: &mut R, len: usize) -> Result<Vec<u8>> {
    let mut buf = vec![0u8; len];
    r.read_exact(&mut buf).map_err(|e| io_err("read bytes", e))?;
    Ok(buf)
}

pub fn read_bytes_at<R: Read + Seek>(r: &mut R, offset: u64, len: usize) -> Result<Vec<u8>> {
    r.seek(SeekFrom::Start(offset)).map_err(|e| io_err("seek", e))?;
    read_bytes(r, len)
}

/// Null-terminated (or full-width) byte slice to a lossy UTF-8 string.
pub fn bytes_to_string(bytes: &[u8]) -> String {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..end]).to_string()
}

/// Pack a string's bytes into a fixed-size, zero-padded array for writing.
pub fn string_to_array<const N: usize>(value: &str) -> [u8; N] {
    let mut buf = [0u8; N];
    let bytes = value.as_bytes();
    let len = bytes.len().min(N);
    buf[..len].copy_from_slice(&bytes[..len]);
    buf
}

pub fn write_u32_le<W: Write>(w: &mut W, value: u32) -> Result<()> {
    w.write_all(&value.to_le_bytes()).map_err(|e| io_err("write u32", e))
}

pub fn write_u64_le<W: Write>(w: &mut W, value: u64) -> Result<()> {
    w.write_all(&value.to_le_bytes()).map_err(|e| io_err("write u64", e))
}

/// Decode a v1 `table` entry: bit 31 is the compressed flag, bits 30..0 are
/// a 31-bit offset delta relative to the section's `base_offset`.
pub fn decode_table_entry_v1(raw: u32) -> (bool, u32) {
    let compressed = raw & 0x8000_0000 != 0;
    let delta = raw & 0x7FFF_FFFF;
    (compressed, delta)
}

pub fn encode_table_entry_v1(compressed: bool, delta: u32) -> u32 {
    let delta = delta & 0x7FFF_FFFF;
    if compressed {
        delta | 0x8000_0000
    } else {
        delta
    }
}
