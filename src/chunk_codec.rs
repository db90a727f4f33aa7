//! Chunk codec (C7): the per-chunk read-verify-decompress pipeline (§4.3).

use crate::chunk_table::ChunkDescriptor;
use crate::codec::checksum::{adler32, crc32};
use crate::codec::compression::{deflate_decompress, expand_pattern_fill};
use crate::config::EwfConfig;
use crate::error::EwfError;
use tracing::warn;

type Result<T> = std::result::Result<T, EwfError>;

/// Outcome of decoding one chunk: the bytes plus whether a recoverable
/// checksum/decompression problem was absorbed rather than propagated.
pub struct DecodedChunk {
    pub data: Vec<u8>,
    pub corrupt: bool,
}

/// Decode `raw` (the `data_size` bytes read from `segment[data_offset]`)
/// into exactly `chunk_size` bytes (the last chunk may be short), per the
/// §4.3 algorithm and its tie-breaks.
pub fn decode_chunk(
    descriptor: &ChunkDescriptor,
    raw: &[u8],
    chunk_size: usize,
    is_last_chunk: bool,
    config: &EwfConfig,
) -> Result<DecodedChunk> {
    // A chunk synthesized by the reader when both `table` and `table2`
    // failed to yield a usable range for it (§4.1): no real bytes were ever
    // located, so there is nothing to decompress or checksum-verify.
    if descriptor.is_corrupt() && raw.is_empty() {
        return absorb_or_propagate(vec![0u8; chunk_size], descriptor, config);
    }

    if descriptor.uses_pattern_fill() {
        if descriptor.is_compressed() {
            return Err(EwfError::corrupt(
                format!("chunk@{}", descriptor.data_offset),
                "pattern-fill chunk with is_compressed set is malformed",
            ));
        }
        if raw.len() < 16 {
            return Err(EwfError::corrupt(
                format!("chunk@{}", descriptor.data_offset),
                "pattern-fill payload shorter than {pattern[8], repeat:u64}",
            ));
        }
        let mut pattern = [0u8; 8];
        pattern.copy_from_slice(&raw[0..8]);
        let repeat_count = u64::from_le_bytes(raw[8..16].try_into().unwrap());
        let data = expand_pattern_fill(pattern, repeat_count, chunk_size);
        return Ok(DecodedChunk { data, corrupt: false });
    }

    if descriptor.is_encrypted() {
        return decrypt_chunk(descriptor, raw, chunk_size, config);
    }

    if descriptor.is_compressed() {
        let payload = if descriptor.has_checksum() {
            if raw.len() < 4 {
                return Err(EwfError::corrupt(
                    format!("chunk@{}", descriptor.data_offset),
                    "compressed payload shorter than trailing checksum",
                ));
            }
            &raw[..raw.len() - 4]
        } else {
            raw
        };

        let decompressed = deflate_decompress(payload, chunk_size)?;
        if decompressed.len() != chunk_size && !(is_last_chunk && decompressed.len() < chunk_size) {
            return Err(EwfError::corrupt(
                format!("chunk@{}", descriptor.data_offset),
                format!("decompressed {} bytes, expected {chunk_size}", decompressed.len()),
            ));
        }

        if descriptor.has_checksum() {
            let stored = u32::from_le_bytes(raw[raw.len() - 4..].try_into().unwrap());
            let computed = adler32(payload);
            if computed != stored {
                warn!(stored, computed, "compressed chunk checksum mismatch");
                return absorb_or_propagate(decompressed, descriptor, config);
            }
        }

        return Ok(DecodedChunk { data: decompressed, corrupt: false });
    }

    // Uncompressed: payload minus trailing checksum, verified per format.
    let payload = if descriptor.has_checksum() {
        if raw.len() < 4 {
            return Err(EwfError::corrupt(
                format!("chunk@{}", descriptor.data_offset),
                "uncompressed payload shorter than trailing checksum",
            ));
        }
        &raw[..raw.len() - 4]
    } else {
        raw
    };

    if descriptor.has_checksum() {
        let stored = u32::from_le_bytes(raw[raw.len() - 4..].try_into().unwrap());
        let computed = if config.format.is_v2() { crc32(payload) } else { adler32(payload) };
        if computed != stored {
            warn!(stored, computed, "uncompressed chunk checksum mismatch");
            return absorb_or_propagate(payload.to_vec(), descriptor, config);
        }
    }

    Ok(DecodedChunk { data: payload.to_vec(), corrupt: false })
}

fn absorb_or_propagate(data: Vec<u8>, descriptor: &ChunkDescriptor, config: &EwfConfig) -> Result<DecodedChunk> {
    if config.strict {
        return Err(EwfError::corrupt(format!("chunk@{}", descriptor.data_offset), "checksum mismatch (strict mode)"));
    }
    Ok(DecodedChunk { data, corrupt: true })
}

#[cfg(feature = "ewf2-encryption")]
fn decrypt_chunk(
    descriptor: &ChunkDescriptor,
    raw: &[u8],
    chunk_size: usize,
    config: &EwfConfig,
) -> Result<DecodedChunk> {
    use aes::Aes256;
    use cbc::cipher::{block_padding::NoPadding, BlockDecryptMut, KeyIvInit};

    type Aes256CbcDec = cbc::Decryptor<Aes256>;

    let key = config
        .encryption_key
        .as_ref()
        .ok_or_else(|| EwfError::Unsupported("encrypted chunk but no password configured".into()))?;

    let mut iv = [0u8; 16];
    iv[..8].copy_from_slice(&(descriptor.data_offset as u64).to_le_bytes());

    let mut buf = raw.to_vec();
    let decryptor = Aes256CbcDec::new(key.into(), &iv.into());
    let decrypted = decryptor
        .decrypt_padded_mut::<NoPadding>(&mut buf)
        .map_err(|_| EwfError::corrupt(format!("chunk@{}", descriptor.data_offset), "AES-CBC decrypt failed"))?;

    let mut data = decrypted.to_vec();
    data.truncate(chunk_size);
    Ok(DecodedChunk { data, corrupt: false })
}

#[cfg(not(feature = "ewf2-encryption"))]
fn decrypt_chunk(
    descriptor: &ChunkDescriptor,
    _raw: &[u8],
    _chunk_size: usize,
    _config: &EwfConfig,
) -> Result<DecodedChunk> {
    Err(EwfError::Unsupported(format!(
        "chunk@{} is encrypted but this build lacks the `ewf2-encryption` feature",
        descriptor.data_offset
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk_table::RangeFlags;
    use crate::codec::compression::deflate_compress;

    fn descriptor(flags: RangeFlags) -> ChunkDescriptor {
        ChunkDescriptor { segment_id: 0, data_offset: 0, data_size: 0, range_flags: flags, recovered_from_redundant: false }
    }

    #[test]
    fn pattern_fill_scenario_4() {
        let mut raw = Vec::new();
        raw.extend_from_slice(b"DEADBEEF");
        raw.extend_from_slice(&8192u64.to_le_bytes());
        let d = descriptor(RangeFlags::USES_PATTERN_FILL);
        let decoded = decode_chunk(&d, &raw, 32 * 1024, false, &EwfConfig::default()).unwrap();
        assert_eq!(decoded.data.len(), 32 * 1024);
        assert_eq!(&decoded.data[0..8], b"DEADBEEF");
        assert!(!decoded.corrupt);
    }

    #[test]
    fn pattern_fill_with_compressed_flag_is_malformed() {
        let d = descriptor(RangeFlags::USES_PATTERN_FILL | RangeFlags::IS_COMPRESSED);
        let raw = vec![0u8; 16];
        assert!(decode_chunk(&d, &raw, 1024, false, &EwfConfig::default()).is_err());
    }

    #[test]
    fn compressed_chunk_with_good_checksum_scenario_2() {
        let payload = vec![0x42u8; 32 * 1024];
        let compressed = deflate_compress(&payload, flate2::Compression::best()).unwrap();
        let mut raw = compressed.clone();
        raw.extend_from_slice(&adler32(&compressed).to_le_bytes());

        let d = descriptor(RangeFlags::IS_COMPRESSED | RangeFlags::HAS_CHECKSUM);
        let decoded = decode_chunk(&d, &raw, 32 * 1024, false, &EwfConfig::default()).unwrap();
        assert_eq!(decoded.data, payload);
        assert!(!decoded.corrupt);
    }

    #[test]
    fn compressed_chunk_with_bad_checksum_is_absorbed_unless_strict() {
        let payload = vec![0x42u8; 32 * 1024];
        let compressed = deflate_compress(&payload, flate2::Compression::best()).unwrap();
        let mut raw = compressed.clone();
        raw.extend_from_slice(&0xDEAD_BEEFu32.to_le_bytes());

        let d = descriptor(RangeFlags::IS_COMPRESSED | RangeFlags::HAS_CHECKSUM);
        let decoded = decode_chunk(&d, &raw, 32 * 1024, false, &EwfConfig::default()).unwrap();
        assert!(decoded.corrupt);
        assert_eq!(decoded.data, payload);

        let strict_config = EwfConfig::default().with_strict(true);
        assert!(decode_chunk(&d, &raw, 32 * 1024, false, &strict_config).is_err());
    }

    #[test]
    fn uncompressed_chunk_with_crc32_for_v2() {
        use crate::config::EwfFormat;
        let payload = vec![0x11u8; 100];
        let mut raw = payload.clone();
        raw.extend_from_slice(&crc32(&payload).to_le_bytes());

        let d = descriptor(RangeFlags::HAS_CHECKSUM);
        let config = EwfConfig::default().with_format(EwfFormat::EnCase7);
        let decoded = decode_chunk(&d, &raw, 100, true, &config).unwrap();
        assert_eq!(decoded.data, payload);
        assert!(!decoded.corrupt);
    }

    #[test]
    fn locationless_corrupt_placeholder_zero_fills_unless_strict() {
        let d = descriptor(RangeFlags::IS_CORRUPT);
        let decoded = decode_chunk(&d, &[], 4096, false, &EwfConfig::default()).unwrap();
        assert!(decoded.corrupt);
        assert_eq!(decoded.data, vec![0u8; 4096]);

        let strict_config = EwfConfig::default().with_strict(true);
        assert!(decode_chunk(&d, &[], 4096, false, &strict_config).is_err());
    }

    #[test]
    fn encrypted_chunk_without_feature_is_unsupported() {
        let d = descriptor(RangeFlags::IS_ENCRYPTED);
        let raw = vec![0u8; 32];
        let result = decode_chunk(&d, &raw, 32, false, &EwfConfig::default());
        #[cfg(not(feature = "ewf2-encryption"))]
        assert!(matches!(result, Err(EwfError::Unsupported(_))));
        #[cfg(feature = "ewf2-encryption")]
        let _ = result;
    }
}
