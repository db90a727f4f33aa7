//! Chunk-table index (C6): a dense array mapping every logical chunk index
//! to `{segment, offset, on-disk size, flags}` (§3, §4.4).
//!
//! Grounded on libewf's `LIBEWF_RANGE_FLAG_*` constants
//! (`libewf_chunk_descriptor.c`) for the flag vocabulary.

use crate::bitflags_lite;
use crate::error::EwfError;

crate::bitflags_lite! {
    /// Mirrors `libewf_chunk_descriptor.c`'s `LIBEWF_RANGE_FLAG_*` set (§B).
    pub struct RangeFlags: u8 {
        const IS_COMPRESSED = 0x01;
        const HAS_CHECKSUM = 0x02;
        const USES_PATTERN_FILL = 0x04;
        const IS_TAINTED = 0x08;
        const IS_CORRUPT = 0x10;
        const IS_ENCRYPTED = 0x20;
    }
}

/// One logical chunk's location and on-disk shape (§3).
#[derive(Clone, Copy, Debug)]
pub struct ChunkDescriptor {
    pub segment_id: usize,
    pub data_offset: i64,
    pub data_size: u64,
    pub range_flags: RangeFlags,
    /// True if this range was recovered from `table2` rather than `table`
    /// (§3 invariant on table/table2 consistency).
    pub recovered_from_redundant: bool,
}

impl ChunkDescriptor {
    pub fn is_compressed(&self) -> bool {
        self.range_flags.contains(RangeFlags::IS_COMPRESSED)
    }

    pub fn has_checksum(&self) -> bool {
        self.range_flags.contains(RangeFlags::HAS_CHECKSUM)
    }

    pub fn uses_pattern_fill(&self) -> bool {
        self.range_flags.contains(RangeFlags::USES_PATTERN_FILL)
    }

    pub fn is_encrypted(&self) -> bool {
        self.range_flags.contains(RangeFlags::IS_ENCRYPTED)
    }

    pub fn is_corrupt(&self) -> bool {
        self.range_flags.contains(RangeFlags::IS_CORRUPT)
    }

    pub fn mark_corrupt(&mut self) {
        self.range_flags.insert(RangeFlags::IS_CORRUPT);
    }

    pub fn mark_tainted(&mut self) {
        self.range_flags.insert(RangeFlags::IS_TAINTED);
    }
}

/// Ordered dense array `[0 .. number_of_chunks)` (§4.4). Read-only after
/// `open()` (§5 "chunk-table: read-only after open; no lock required").
#[derive(Clone, Debug, Default)]
pub struct ChunkTable {
    entries: Vec<ChunkDescriptor>,
}

impl ChunkTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, index: usize) -> Result<&ChunkDescriptor, EwfError> {
        self.entries
            .get(index)
            .ok_or_else(|| EwfError::InvalidArgument(format!("chunk index {index} out of range")))
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut ChunkDescriptor> {
        self.entries.get_mut(index)
    }

    pub fn push(&mut self, descriptor: ChunkDescriptor) {
        self.entries.push(descriptor);
    }

    /// Append one `table`/`sector_table` range's worth of v1 entries: each
    /// raw offset decodes to `(compressed, delta)`; the chunk's size is the
    /// *next* entry's absolute offset minus its own (§4.2), with the final
    /// entry's size supplied by the caller from the enclosing `sectors`
    /// extent.
    pub fn append_range_v1(
        &mut self,
        segment_id: usize,
        base_offset: u64,
        raw_entries: &[u32],
        sectors_extent_end: u64,
        from_table2: bool,
    ) {
        for (i, &raw) in raw_entries.iter().enumerate() {
            let (compressed, delta) = crate::codec::binary::decode_table_entry_v1(raw);
            let this_offset = base_offset + delta as u64;
            let next_offset = if i + 1 < raw_entries.len() {
                let (_, next_delta) = crate::codec::binary::decode_table_entry_v1(raw_entries[i + 1]);
                base_offset + next_delta as u64
            } else {
                sectors_extent_end
            };
            let data_size = next_offset.saturating_sub(this_offset);

            let mut flags = RangeFlags::empty();
            if compressed {
                flags.insert(RangeFlags::IS_COMPRESSED);
            }
            flags.insert(RangeFlags::HAS_CHECKSUM);

            self.push(ChunkDescriptor {
                segment_id,
                data_offset: this_offset as i64,
                data_size,
                range_flags: flags,
                recovered_from_redundant: from_table2,
            });
        }
    }

    /// Append `count` placeholder chunks for a range whose index could not
    /// be recovered from either `table` or `table2` (§4.1): each is flagged
    /// `IS_CORRUPT` with no real location, so readers zero-fill rather than
    /// mistake offset `0` for a legitimate chunk.
    pub fn append_corrupt_placeholders(&mut self, segment_id: usize, count: usize) {
        for _ in 0..count {
            self.push(ChunkDescriptor {
                segment_id,
                data_offset: 0,
                data_size: 0,
                range_flags: RangeFlags::IS_CORRUPT,
                recovered_from_redundant: false,
            });
        }
    }

    /// Append one `sector_table` (v2) range: explicit `{data_offset, data_size,
    /// flags}` entries, no `base_offset` indirection (§4.2).
    pub fn append_range_v2(&mut self, segment_id: usize, entries: &[(i64, u32, u32)]) {
        for &(data_offset, data_size, raw_flags) in entries {
            self.push(ChunkDescriptor {
                segment_id,
                data_offset,
                data_size: data_size as u64,
                range_flags: RangeFlags(raw_flags as u8),
                recovered_from_redundant: false,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::binary::encode_table_entry_v1;

    #[test]
    fn v1_chunk_size_derived_from_next_offset() {
        let mut table = ChunkTable::new();
        let raw = [
            encode_table_entry_v1(false, 0),
            encode_table_entry_v1(true, 1000),
            encode_table_entry_v1(false, 1500),
        ];
        table.append_range_v1(0, 10_000, &raw, 10_000 + 2000, false);

        assert_eq!(table.len(), 3);
        assert_eq!(table.get(0).unwrap().data_offset, 10_000);
        assert_eq!(table.get(0).unwrap().data_size, 1000);
        assert!(!table.get(0).unwrap().is_compressed());

        assert_eq!(table.get(1).unwrap().data_offset, 11_000);
        assert_eq!(table.get(1).unwrap().data_size, 500);
        assert!(table.get(1).unwrap().is_compressed());

        assert_eq!(table.get(2).unwrap().data_offset, 11_500);
        assert_eq!(table.get(2).unwrap().data_size, 500);
    }

    #[test]
    fn mark_corrupt_is_idempotent_and_visible() {
        let mut table = ChunkTable::new();
        table.append_range_v1(0, 0, &[encode_table_entry_v1(false, 0)], 100, false);
        let d = table.get_mut(0).unwrap();
        assert!(!d.is_corrupt());
        d.mark_corrupt();
        assert!(d.is_corrupt());
    }

    #[test]
    fn out_of_range_index_is_invalid_argument() {
        let table = ChunkTable::new();
        assert!(table.get(0).is_err());
    }

    #[test]
    fn corrupt_placeholders_are_flagged_and_locationless() {
        let mut table = ChunkTable::new();
        table.append_corrupt_placeholders(0, 3);
        assert_eq!(table.len(), 3);
        for i in 0..3 {
            let d = table.get(i).unwrap();
            assert!(d.is_corrupt());
            assert_eq!(d.data_size, 0);
        }
    }
}
