//! Segment-file reader (C2): opens a segment set, walks each file's section
//! chain, and routes each section to the appropriate handler (§4.1, §4.2).

use crate::chunk_table::ChunkTable;
use crate::codec::binary::{read_bytes, read_bytes_at, read_u16_le, read_u32_le, read_u64_le};
use crate::codec::compression::deflate_decompress;
use crate::config::{EwfConfig, MediaFlags, MediaType};
use crate::error::EwfError;
use crate::hash_values::HashValueMap;
use crate::header_values::{merge_header_and_header2, parse_header_text, HeaderValueMap};
use crate::lef::{parse_ltree_body, utf16le_to_string, LefParseResult};
use crate::media_values::MediaValues;
use crate::ranges::{SectorRange, SectorRangeList};
use crate::segment::naming::discover_segment_set;
use crate::segment::section::{read_table_header_v1, SectionDescriptor, SectionTag};
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use tracing::{debug, instrument, warn};

type Result<T> = std::result::Result<T, EwfError>;

const EWF1_MAGIC: [u8; 8] = [0x45, 0x56, 0x46, 0x09, 0x0D, 0x0A, 0xFF, 0x00];
const EWF2_MAGIC: [u8; 8] = [0x45, 0x56, 0x46, 0x32, 0x0D, 0x0A, 0x81, 0x00];

/// Everything a successful open-set scan reconstructs (§4.1 "Open path").
#[derive(Default)]
pub struct OpenedImage {
    pub media_values: Option<MediaValues>,
    pub chunk_table: ChunkTable,
    pub header_values: HeaderValueMap,
    pub hash_values: HashValueMap,
    pub acquisition_errors: SectorRangeList,
    pub sessions: SectorRangeList,
    pub lef: Option<LefParseResult>,
    pub segment_paths: Vec<PathBuf>,
    pub warnings: Vec<String>,
}

struct SegmentMeta {
    is_v2: bool,
    #[allow(dead_code)]
    segment_number: u16,
}

/// Open the full segment set starting from `first_path`, per §4.1's filename
/// discovery, then parse every segment in ascending order.
#[instrument(skip(config))]
pub fn open_set(first_path: &Path, config: &EwfConfig) -> Result<OpenedImage> {
    let paths = discover_segment_set(first_path)?;
    open_explicit_set(paths, config)
}

/// Open a caller-supplied, already-ordered list of segment filenames
/// (§4.1 "If the user supplies multiple filenames explicitly, skip
/// discovery").
pub fn open_explicit_set(paths: Vec<PathBuf>, config: &EwfConfig) -> Result<OpenedImage> {
    let mut image = OpenedImage { segment_paths: paths.clone(), ..Default::default() };

    let mut header_parts: Vec<HeaderValueMap> = Vec::new();
    let mut header2_parts: Vec<HeaderValueMap> = Vec::new();

    for (segment_id, path) in paths.iter().enumerate() {
        let mut file = File::open(path).map_err(|e| EwfError::io(format!("open segment {}", path.display()), e))?;
        let meta = read_segment_magic(&mut file, path)?;
        walk_sections(&mut file, segment_id, &meta, config, &mut image, &mut header_parts, &mut header2_parts)?;
    }

    let header = header_parts.into_iter().fold(None, |acc: Option<HeaderValueMap>, part| match acc {
        None => Some(part),
        Some(mut existing) => {
            for (k, v) in part.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect::<Vec<_>>() {
                existing.set(k, v);
            }
            Some(existing)
        }
    });
    let header2 = header2_parts.into_iter().next();
    image.header_values = merge_header_and_header2(header, header2);

    if let Some(mv) = &image.media_values {
        let expected_chunks = mv.number_of_chunks();
        if expected_chunks != image.chunk_table.len() as u64 {
            return Err(EwfError::FormatMismatch(format!(
                "expected {expected_chunks} chunks from media values, chunk table has {}",
                image.chunk_table.len()
            )));
        }
    }

    Ok(image)
}

fn read_segment_magic(file: &mut File, path: &Path) -> Result<SegmentMeta> {
    let magic = read_bytes(file, 8)?;
    if magic == EWF1_MAGIC {
        let segment_number = read_u16_le(file)?;
        let _fields_end = read_u16_le(file)?;
        Ok(SegmentMeta { is_v2: false, segment_number })
    } else if magic == EWF2_MAGIC {
        let _major = crate::codec::binary::read_u8(file)?;
        let _minor = crate::codec::binary::read_u8(file)?;
        let _compression_method = read_u16_le(file)?;
        let segment_number = read_u16_le(file)?;
        let _set_identifier = read_bytes(file, 16)?;
        Ok(SegmentMeta { is_v2: true, segment_number })
    } else {
        Err(EwfError::FormatMismatch(format!("{} has no recognised EWF magic", path.display())))
    }
}

#[allow(clippy::too_many_arguments)]
fn walk_sections(
    file: &mut File,
    segment_id: usize,
    meta: &SegmentMeta,
    config: &EwfConfig,
    image: &mut OpenedImage,
    header_parts: &mut Vec<HeaderValueMap>,
    header2_parts: &mut Vec<HeaderValueMap>,
) -> Result<()> {
    let mut offset = file.stream_position().map_err(|e| EwfError::io("tell", e))?;
    let mut last_sectors_extent_end: Option<u64> = None;
    // Set in the `Table` arm's `Err` branch, consulted (and reset) by the
    // `Table2` arm right after: per-range state, not a whole-image one
    // (§4.1 redundancy recovery must apply independently to every range).
    let mut table_failed = false;
    let mut pending_entry_count: Option<u32> = None;

    loop {
        let descriptor = match read_descriptor(file, offset, meta.is_v2) {
            Ok(d) => d,
            Err(EwfError::Corrupt { object, message }) => {
                warn!(object = %object, message = %message, "section descriptor corrupt");
                if config.strict {
                    return Err(EwfError::corrupt(object, message));
                }
                image.warnings.push(format!("{object}: {message}"));
                break;
            }
            Err(e) => return Err(e),
        };

        match &descriptor.tag {
            SectionTag::Header => {
                let text = decode_header_payload(file, &descriptor, false)?;
                header_parts.push(parse_header_text(&text));
            }
            SectionTag::Header2 => {
                let text = decode_header_payload(file, &descriptor, true)?;
                header2_parts.push(parse_header_text(&text));
            }
            SectionTag::Xheader => {
                let compressed = read_bytes_at(
                    file,
                    descriptor.payload_offset(),
                    (descriptor.size - SectionDescriptor::ON_DISK_SIZE) as usize,
                )?;
                match deflate_decompress(&compressed, compressed.len() * 4) {
                    Ok(decompressed) => header2_parts.push(parse_header_text(&String::from_utf8_lossy(&decompressed))),
                    Err(e) => warn!(error = %e, "xheader decompress failed, skipping"),
                }
            }
            SectionTag::Volume | SectionTag::Disk => {
                image.media_values = Some(read_volume_section(file, &descriptor)?);
            }
            SectionTag::Sectors | SectionTag::Data => {
                let payload_len = descriptor.size.saturating_sub(SectionDescriptor::ON_DISK_SIZE);
                last_sectors_extent_end = Some(descriptor.payload_offset() + payload_len);
            }
            SectionTag::Table => {
                let sectors_end = last_sectors_extent_end.unwrap_or(descriptor.next_offset);
                match read_table_entries_v1(file, &descriptor) {
                    Ok((base_offset, entries)) => {
                        image.chunk_table.append_range_v1(segment_id, base_offset, &entries, sectors_end, false);
                        table_failed = false;
                    }
                    Err(e) => {
                        warn!(error = %e, "table section corrupt, will retry with table2");
                        image.warnings.push("table section corrupt, falling back to table2".into());
                        table_failed = true;
                        pending_entry_count = peek_table_entry_count_v1(file, &descriptor);
                    }
                }
            }
            SectionTag::Table2 => {
                // Only consulted when this range's own `table` section
                // failed to parse, not whenever the image-wide chunk table
                // happens to be non-empty (§4.1 redundancy recovery).
                if table_failed {
                    let sectors_end = last_sectors_extent_end.unwrap_or(descriptor.next_offset);
                    match read_table_entries_v1(file, &descriptor) {
                        Ok((base_offset, entries)) => {
                            image.chunk_table.append_range_v1(segment_id, base_offset, &entries, sectors_end, true);
                        }
                        Err(e) => {
                            let count = peek_table_entry_count_v1(file, &descriptor).or(pending_entry_count).unwrap_or(0);
                            warn!(error = %e, count, "table2 section also corrupt, synthesizing corrupt placeholder chunks");
                            image.warnings.push(format!(
                                "table2 section also corrupt: {e}; synthesized {count} corrupt placeholder chunk(s)"
                            ));
                            image.chunk_table.append_corrupt_placeholders(segment_id, count as usize);
                        }
                    }
                    table_failed = false;
                    pending_entry_count = None;
                }
            }
            SectionTag::SectorTable => {
                let entries = read_sector_table_v2(file, &descriptor)?;
                image.chunk_table.append_range_v2(segment_id, &entries);
            }
            SectionTag::Digest | SectionTag::Hash => {
                read_digest_section(file, &descriptor, &mut image.hash_values)?;
            }
            SectionTag::Xhash => {
                debug!("xhash section present, superseded by digest/hash");
            }
            SectionTag::Error2 => {
                read_range_list_section(file, &descriptor, &mut image.acquisition_errors)?;
            }
            SectionTag::Session => {
                read_range_list_section(file, &descriptor, &mut image.sessions)?;
            }
            SectionTag::Ltree => {
                let payload_len = (descriptor.size - SectionDescriptor::ON_DISK_SIZE) as usize;
                let raw = read_bytes_at(file, descriptor.payload_offset(), payload_len)?;
                let text = utf16le_to_string(&raw);
                image.lef = Some(parse_ltree_body(&text));
            }
            SectionTag::Done | SectionTag::Next => {
                break;
            }
            SectionTag::Unknown(tag) => {
                warn!(tag = %tag, "unknown section tag, skipping");
            }
        }

        if descriptor.tag.is_terminal() {
            break;
        }
        if descriptor.next_offset <= offset {
            break;
        }
        offset = descriptor.next_offset;
    }

    Ok(())
}

fn read_descriptor(file: &mut File, offset: u64, is_v2: bool) -> Result<SectionDescriptor> {
    if is_v2 {
        SectionDescriptor::read_v2(file, offset)
    } else {
        SectionDescriptor::read_v1(file, offset)
    }
}

fn decode_header_payload(file: &mut File, descriptor: &SectionDescriptor, is_utf16: bool) -> Result<String> {
    let payload_len = descriptor.size.saturating_sub(SectionDescriptor::ON_DISK_SIZE) as usize;
    let raw = read_bytes_at(file, descriptor.payload_offset(), payload_len)?;

    // header/header2 payloads are themselves deflate-compressed in every
    // real-world writer; a raw zlib stream starts with 0x78.
    let bytes = if raw.first() == Some(&0x78) {
        deflate_decompress(&raw, raw.len() * 4).unwrap_or(raw)
    } else {
        raw
    };

    Ok(if is_utf16 { utf16le_to_string(&bytes) } else { String::from_utf8_lossy(&bytes).to_string() })
}

fn read_volume_section(file: &mut File, descriptor: &SectionDescriptor) -> Result<MediaValues> {
    let available = (descriptor.size - SectionDescriptor::ON_DISK_SIZE) as usize;
    let data = read_bytes_at(file, descriptor.payload_offset(), available.min(80).max(76))?;

    let sectors_per_chunk = u32::from_le_bytes(data[8..12].try_into().unwrap());
    let bytes_per_sector = u32::from_le_bytes(data[12..16].try_into().unwrap());
    let number_of_sectors = u64::from_le_bytes(data[16..24].try_into().unwrap());
    let media_type_raw = u32::from_le_bytes(data[36..40].try_into().unwrap());
    let compression_level_raw = data.get(56).copied().unwrap_or(0);

    let mut guid = [0u8; 16];
    if data.len() >= 76 {
        guid.copy_from_slice(&data[60..76]);
    }

    let media_type = match media_type_raw {
        0 => MediaType::Removable,
        1 => MediaType::Fixed,
        3 => MediaType::Optical,
        _ => MediaType::Fixed,
    };

    let compression_level = match compression_level_raw {
        1 => crate::config::CompressionLevel::Fast,
        2 => crate::config::CompressionLevel::Best,
        _ => crate::config::CompressionLevel::None,
    };

    Ok(MediaValues {
        bytes_per_sector: bytes_per_sector.max(1),
        sectors_per_chunk: sectors_per_chunk.max(1),
        number_of_sectors,
        media_type,
        media_flags: MediaFlags::PHYSICAL,
        format: crate::config::EwfFormat::EnCase6,
        guid,
        error_granularity: 64,
        compression_level,
    })
}

fn read_table_entries_v1(file: &mut File, descriptor: &SectionDescriptor) -> Result<(u64, Vec<u32>)> {
    file.seek(SeekFrom::Start(descriptor.payload_offset())).map_err(|e| EwfError::io("seek table", e))?;
    let header = read_table_header_v1(file)?;
    let mut entries = Vec::with_capacity(header.entry_count as usize);
    for _ in 0..header.entry_count {
        entries.push(read_u32_le(file)?);
    }
    Ok((header.base_offset, entries))
}

/// Best-effort recovery of a corrupt table/table2 section's declared entry
/// count, used to size the corrupt placeholder range when neither section's
/// entry array can be read in full (§4.1). Returns `None` only if the
/// header itself (its own checksum) is also unreadable.
fn peek_table_entry_count_v1(file: &mut File, descriptor: &SectionDescriptor) -> Option<u32> {
    file.seek(SeekFrom::Start(descriptor.payload_offset())).ok()?;
    read_table_header_v1(file).ok().map(|h| h.entry_count)
}

fn read_sector_table_v2(file: &mut File, descriptor: &SectionDescriptor) -> Result<Vec<(i64, u32, u32)>> {
    let payload_len = (descriptor.size - SectionDescriptor::ON_DISK_SIZE) as usize;
    let count = payload_len / 16;
    file.seek(SeekFrom::Start(descriptor.payload_offset())).map_err(|e| EwfError::io("seek sector_table", e))?;
    let mut entries = Vec::with_capacity(count);
    for _ in 0..count {
        let data_offset = read_u64_le(file)? as i64;
        let data_size = read_u32_le(file)?;
        let flags = read_u32_le(file)?;
        entries.push((data_offset, data_size, flags));
    }
    Ok(entries)
}

fn read_digest_section(file: &mut File, descriptor: &SectionDescriptor, hashes: &mut HashValueMap) -> Result<()> {
    let available = (descriptor.size - SectionDescriptor::ON_DISK_SIZE) as usize;
    let raw = read_bytes_at(file, descriptor.payload_offset(), available.min(36))?;
    if raw.len() >= 16 {
        hashes.set("MD5", hex::encode(&raw[0..16]));
    }
    if raw.len() >= 36 {
        hashes.set("SHA1", hex::encode(&raw[16..36]));
    }
    Ok(())
}

fn read_range_list_section(file: &mut File, descriptor: &SectionDescriptor, list: &mut SectorRangeList) -> Result<()> {
    file.seek(SeekFrom::Start(descriptor.payload_offset())).map_err(|e| EwfError::io("seek ranges", e))?;
    let number_of_entries = read_u32_le(file)?;
    let _padding = read_bytes(file, 28)?;
    let _checksum = read_u32_le(file)?;

    for _ in 0..number_of_entries {
        let start_sector = read_u32_le(file)? as u64;
        let number_of_sectors = read_u32_le(file)? as u64;
        let _padding = read_bytes(file, 8)?;
        list.insert(SectorRange { start_sector, number_of_sectors });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unrecognised_magic_is_format_mismatch() {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(tmp.path(), vec![0u8; 16]).unwrap();
        let mut file = File::open(tmp.path()).unwrap();
        let result = read_segment_magic(&mut file, tmp.path());
        assert!(result.is_err());
    }

    #[test]
    fn ewf1_magic_parses_segment_number() {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        let mut bytes = EWF1_MAGIC.to_vec();
        bytes.extend_from_slice(&1u16.to_le_bytes());
        bytes.extend_from_slice(&0u16.to_le_bytes());
        std::fs::write(tmp.path(), &bytes).unwrap();
        let mut file = File::open(tmp.path()).unwrap();
        let meta = read_segment_magic(&mut file, tmp.path()).unwrap();
        assert!(!meta.is_v2);
        assert_eq!(meta.segment_number, 1);
    }
}
