//! Section descriptor layout and the tagged-variant dispatch table (§4.1,
//! §4.2, §6.1, and the design note in §9 on replacing string-tag dispatch
//! with an exhaustively-checked enum).

use crate::codec::binary::{bytes_to_string, read_bytes, read_u32_le, read_u64_le, string_to_array};
use crate::codec::checksum::{adler32, crc32};
use crate::error::EwfError;
use std::io::{Read, Seek, SeekFrom, Write};
use tracing::warn;

type Result<T> = std::result::Result<T, EwfError>;

/// A recognised section tag, replacing the source's raw 16-byte string
/// compare with a closed set plus an escape hatch for the unrecognised case.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SectionTag {
    Header,
    Header2,
    Xheader,
    Volume,
    Disk,
    Sectors,
    Data,
    Table,
    Table2,
    SectorTable,
    Digest,
    Hash,
    Xhash,
    Error2,
    Session,
    Ltree,
    Done,
    Next,
    Unknown(String),
}

impl SectionTag {
    fn from_raw(raw: &str) -> Self {
        match raw {
            "header" => SectionTag::Header,
            "header2" => SectionTag::Header2,
            "xheader" => SectionTag::Xheader,
            "volume" => SectionTag::Volume,
            "disk" => SectionTag::Disk,
            "sectors" => SectionTag::Sectors,
            "data" => SectionTag::Data,
            "table" => SectionTag::Table,
            "table2" => SectionTag::Table2,
            "sector_table" => SectionTag::SectorTable,
            "digest" => SectionTag::Digest,
            "hash" => SectionTag::Hash,
            "xhash" => SectionTag::Xhash,
            "error2" => SectionTag::Error2,
            "session" => SectionTag::Session,
            "ltree" => SectionTag::Ltree,
            "done" => SectionTag::Done,
            "next" => SectionTag::Next,
            other => SectionTag::Unknown(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            SectionTag::Header => "header",
            SectionTag::Header2 => "header2",
            SectionTag::Xheader => "xheader",
            SectionTag::Volume => "volume",
            SectionTag::Disk => "disk",
            SectionTag::Sectors => "sectors",
            SectionTag::Data => "data",
            SectionTag::Table => "table",
            SectionTag::Table2 => "table2",
            SectionTag::SectorTable => "sector_table",
            SectionTag::Digest => "digest",
            SectionTag::Hash => "hash",
            SectionTag::Xhash => "xhash",
            SectionTag::Error2 => "error2",
            SectionTag::Session => "session",
            SectionTag::Ltree => "ltree",
            SectionTag::Done => "done",
            SectionTag::Next => "next",
            SectionTag::Unknown(s) => s,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, SectionTag::Done | SectionTag::Next)
    }
}

/// Fixed 76-byte descriptor preceding every section's payload, in either the
/// v1 or v2 on-disk layout (§6.1). `next_offset` is `previous_offset` under
/// v2's naming but plays the analogous "where do I go from here" role.
#[derive(Clone, Debug)]
pub struct SectionDescriptor {
    pub tag: SectionTag,
    /// Absolute offset of this descriptor within its segment file.
    pub file_offset: u64,
    /// Absolute offset of the next section descriptor.
    pub next_offset: u64,
    /// Size of the whole section (descriptor + payload) in v1; payload-only
    /// `data_size` in v2 (callers add the 76-byte descriptor back on).
    pub size: u64,
    pub checksum: u32,
}

impl SectionDescriptor {
    pub const ON_DISK_SIZE: u64 = 76;

    pub fn payload_offset(&self) -> u64 {
        self.file_offset + Self::ON_DISK_SIZE
    }

    /// Read one descriptor at `offset` (v1 layout: `type[16] next:u64 size:u64
    /// padding[40] checksum:u32`).
    pub fn read_v1<R: Read + Seek>(r: &mut R, offset: u64) -> Result<Self> {
        r.seek(SeekFrom::Start(offset)).map_err(|e| EwfError::io("seek to section", e))?;
        let raw = read_bytes(r, Self::ON_DISK_SIZE as usize)?;
        let tag_bytes = &raw[0..16];
        let next_offset = u64::from_le_bytes(raw[16..24].try_into().unwrap());
        let size = u64::from_le_bytes(raw[24..32].try_into().unwrap());
        let checksum = u32::from_le_bytes(raw[72..76].try_into().unwrap());

        let computed = adler32(&raw[0..72]);
        if computed != checksum {
            warn!(offset, computed, stored = checksum, "section descriptor checksum mismatch");
            return Err(EwfError::corrupt(
                format!("section@{offset}"),
                "adler32 checksum mismatch on section descriptor",
            ));
        }

        Ok(SectionDescriptor {
            tag: SectionTag::from_raw(&bytes_to_string(tag_bytes)),
            file_offset: offset,
            next_offset,
            size,
            checksum,
        })
    }

    /// Read one descriptor at `offset` (v2 layout: `type[16] data_flags:u32
    /// previous_offset:u64 data_size:u64 descriptor_size:u32 padding_size:u32
    /// data_integrity_hash[16] padding[12] checksum:u32`).
    pub fn read_v2<R: Read + Seek>(r: &mut R, offset: u64) -> Result<Self> {
        r.seek(SeekFrom::Start(offset)).map_err(|e| EwfError::io("seek to section", e))?;
        let raw = read_bytes(r, Self::ON_DISK_SIZE as usize)?;
        let tag_bytes = &raw[0..16];
        let previous_offset = u64::from_le_bytes(raw[20..28].try_into().unwrap());
        let data_size = u64::from_le_bytes(raw[28..36].try_into().unwrap());
        let checksum = u32::from_le_bytes(raw[72..76].try_into().unwrap());

        let computed = crc32(&raw[0..72]);
        if computed != checksum {
            warn!(offset, computed, stored = checksum, "section descriptor checksum mismatch");
            return Err(EwfError::corrupt(
                format!("section@{offset}"),
                "crc32 checksum mismatch on section descriptor",
            ));
        }

        Ok(SectionDescriptor {
            tag: SectionTag::from_raw(&bytes_to_string(tag_bytes)),
            file_offset: offset,
            next_offset: previous_offset,
            size: data_size + Self::ON_DISK_SIZE,
            checksum,
        })
    }

    /// Write a v1 descriptor at the writer's current position: `type[16]
    /// next:u64 size:u64 padding[40] checksum:u32` (§6.1).
    pub fn write_v1<W: Write>(w: &mut W, tag: &str, next_offset: u64, size: u64) -> Result<()> {
        let mut raw = [0u8; Self::ON_DISK_SIZE as usize];
        raw[0..16].copy_from_slice(&string_to_array::<16>(tag));
        raw[16..24].copy_from_slice(&next_offset.to_le_bytes());
        raw[24..32].copy_from_slice(&size.to_le_bytes());
        let checksum = adler32(&raw[0..72]);
        raw[72..76].copy_from_slice(&checksum.to_le_bytes());
        w.write_all(&raw).map_err(|e| EwfError::io("write section descriptor", e))
    }

    /// Write a v2 descriptor: `type[16] data_flags:u32 previous:u64
    /// data_size:u64 descriptor_size:u32 padding_size:u32 hash[16] pad[12]
    /// checksum:u32` (§6.1). `data_size` excludes the descriptor itself.
    pub fn write_v2<W: Write>(w: &mut W, tag: &str, previous_offset: u64, data_size: u64) -> Result<()> {
        let mut raw = [0u8; Self::ON_DISK_SIZE as usize];
        raw[0..16].copy_from_slice(&string_to_array::<16>(tag));
        raw[20..28].copy_from_slice(&previous_offset.to_le_bytes());
        raw[28..36].copy_from_slice(&data_size.to_le_bytes());
        let checksum = crc32(&raw[0..72]);
        raw[72..76].copy_from_slice(&checksum.to_le_bytes());
        w.write_all(&raw).map_err(|e| EwfError::io("write section descriptor", e))
    }
}

/// Parsed `table`/`table2`/`sector_table` header fields before the entry
/// array (§4.2).
pub struct TableSectionHeader {
    pub base_offset: u64,
    pub entry_count: u32,
}

/// Layout (§4.2): `base_offset:u64 entry_count:u32 padding[4] checksum:u32`,
/// checksum an Adler-32 over the preceding 16 bytes (§4.1/§8 scenario 3: a
/// bad checksum here is the trigger for `table2` fallback).
pub fn read_table_header_v1<R: Read>(r: &mut R) -> Result<TableSectionHeader> {
    let base_offset = read_u64_le(r)?;
    let entry_count = read_u32_le(r)?;
    let padding = read_bytes(r, 4)?;
    let checksum = read_u32_le(r)?;

    let mut raw = [0u8; 16];
    raw[0..8].copy_from_slice(&base_offset.to_le_bytes());
    raw[8..12].copy_from_slice(&entry_count.to_le_bytes());
    raw[12..16].copy_from_slice(&padding);
    let computed = adler32(&raw);
    if computed != checksum {
        warn!(computed, stored = checksum, "table header checksum mismatch");
        return Err(EwfError::corrupt("table header", "adler32 checksum mismatch on table header"));
    }

    Ok(TableSectionHeader { base_offset, entry_count })
}

/// Write a `table`/`table2` header: `base_offset:u64 entry_count:u32
/// padding[4] checksum:u32` (§4.2), checksum over the preceding 16 bytes.
pub fn write_table_header_v1<W: Write>(w: &mut W, base_offset: u64, entry_count: u32) -> Result<()> {
    let mut raw = [0u8; 16];
    raw[0..8].copy_from_slice(&base_offset.to_le_bytes());
    raw[8..12].copy_from_slice(&entry_count.to_le_bytes());
    let checksum = adler32(&raw);
    w.write_all(&raw).map_err(|e| EwfError::io("write table header", e))?;
    w.write_all(&checksum.to_le_bytes()).map_err(|e| EwfError::io("write table header checksum", e))
}
