//! Media-values block (C5): immutable per-image parameters seeded from the
//! `volume`/`disk` section (§3, §4.2).

use crate::config::{CompressionLevel, EwfFormat, MediaFlags, MediaType};
use serde::{Deserialize, Serialize};

const MIN_CHUNK_SIZE: u32 = 16 * 1024;

/// Immutable after `open()` (§3 invariant list, §9 thread-safety note).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MediaValues {
    pub bytes_per_sector: u32,
    pub sectors_per_chunk: u32,
    pub number_of_sectors: u64,
    pub media_type: MediaType,
    pub media_flags: MediaFlags,
    pub format: EwfFormat,
    /// Raw 16 GUID bytes in the format's native byte order.
    pub guid: [u8; 16],
    pub error_granularity: u32,
    pub compression_level: CompressionLevel,
}

impl MediaValues {
    /// `chunk_size = bytes_per_sector * sectors_per_chunk`, clamped to
    /// `MIN_CHUNK_SIZE` when the product is implausibly small (§3).
    pub fn chunk_size(&self) -> u32 {
        self.bytes_per_sector
            .saturating_mul(self.sectors_per_chunk)
            .max(MIN_CHUNK_SIZE)
    }

    pub fn media_size(&self) -> u64 {
        self.number_of_sectors * self.bytes_per_sector as u64
    }

    pub fn number_of_chunks(&self) -> u64 {
        let per_chunk = self.sectors_per_chunk as u64;
        (self.number_of_sectors + per_chunk - 1) / per_chunk
    }

    /// Canonical hyphenated hex GUID string (§B "GUID formatting").
    ///
    /// EWF2 stores a GUID's first three fields (the 32-bit and two 16-bit
    /// time fields) little-endian on disk, Microsoft-style; EWF1 has no
    /// native GUID field and anything stashed in `guid` there is treated as
    /// a plain big-endian byte run. `original_source/ewftools/guid.c` is
    /// the only place in the pack that constructs one on disk, and it does
    /// so with `byte_stream_copy_from_uint32/16_little_endian` for exactly
    /// those first three fields.
    pub fn guid_string(&self) -> String {
        let g = &self.guid;
        if self.format.is_v2() {
            format!(
                "{:02x}{:02x}{:02x}{:02x}-{:02x}{:02x}-{:02x}{:02x}-{:02x}{:02x}-{:02x}{:02x}{:02x}{:02x}{:02x}{:02x}",
                g[3], g[2], g[1], g[0], g[5], g[4], g[7], g[6], g[8], g[9], g[10], g[11], g[12], g[13], g[14], g[15]
            )
        } else {
            format!(
                "{:02x}{:02x}{:02x}{:02x}-{:02x}{:02x}-{:02x}{:02x}-{:02x}{:02x}-{:02x}{:02x}{:02x}{:02x}{:02x}{:02x}",
                g[0], g[1], g[2], g[3], g[4], g[5], g[6], g[7], g[8], g[9], g[10], g[11], g[12], g[13], g[14], g[15]
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> MediaValues {
        MediaValues {
            bytes_per_sector: 512,
            sectors_per_chunk: 64,
            number_of_sectors: 262_144,
            media_type: MediaType::Fixed,
            media_flags: MediaFlags::PHYSICAL,
            format: EwfFormat::EnCase5,
            guid: [0; 16],
            error_granularity: 64,
            compression_level: CompressionLevel::None,
        }
    }

    #[test]
    fn scenario_1_minimal_encase5_image() {
        let mv = sample();
        assert_eq!(mv.chunk_size(), 32 * 1024);
        assert_eq!(mv.media_size(), 134_217_728);
        assert_eq!(mv.number_of_chunks(), 4096);
    }

    #[test]
    fn chunk_size_is_clamped_to_minimum() {
        let mut mv = sample();
        mv.bytes_per_sector = 1;
        mv.sectors_per_chunk = 1;
        assert_eq!(mv.chunk_size(), MIN_CHUNK_SIZE);
    }

    #[test]
    fn number_of_chunks_rounds_up() {
        let mut mv = sample();
        mv.number_of_sectors = 65; // one more sector than a single chunk
        assert_eq!(mv.number_of_chunks(), 2);
    }

    #[test]
    fn guid_string_is_hyphenated_hex() {
        let mut mv = sample();
        mv.guid = [0x01, 0x23, 0x45, 0x67, 0x89, 0xab, 0xcd, 0xef, 0x01, 0x23, 0x45, 0x67, 0x89, 0xab, 0xcd, 0xef];
        assert_eq!(mv.guid_string(), "01234567-89ab-cdef-0123-456789abcdef");
    }

    #[test]
    fn guid_string_corrects_byte_order_for_ewf2_formats() {
        let mut mv = sample();
        mv.format = EwfFormat::EnCase7;
        mv.guid = [0x67, 0x45, 0x23, 0x01, 0xab, 0x89, 0xef, 0xcd, 0x01, 0x23, 0x45, 0x67, 0x89, 0xab, 0xcd, 0xef];
        assert_eq!(mv.guid_string(), "01234567-89ab-cdef-0123-456789abcdef");
    }
}
