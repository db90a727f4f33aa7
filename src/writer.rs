//! Segment-file writer (C10): builds a new EWF segment set one media chunk
//! at a time, rolling over to the next segment file once `max_segment_size`
//! is reached (§4.8).
//!
//! State machine (§4.8): `Init -> Header -> Volume -> Sectors(i) -> Table(i)
//! -> [Next -> Sectors(i+1) -> Table(i+1) -> ...] -> Done`, with the
//! table/sectors patch-after-the-fact bookkeeping from
//! `original_source/libewf/libewf_write_io_handle.c`.

use crate::codec::binary::encode_table_entry_v1;
use crate::codec::checksum::{adler32, crc32};
use crate::codec::compression::deflate_compress;
use crate::config::{CompressionLevel, EwfConfig};
use crate::error::EwfError;
use crate::hash_values::HashValueMap;
use crate::header_values::{render_header_text, HeaderValueMap};
use crate::media_values::MediaValues;
use crate::segment::naming::{extension_for_ordinal, SegmentFamily};
use crate::segment::section::{write_table_header_v1, SectionDescriptor};
use std::fs::File;
use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, instrument};

type Result<T> = std::result::Result<T, EwfError>;

const EWF1_MAGIC: [u8; 8] = [0x45, 0x56, 0x46, 0x09, 0x0D, 0x0A, 0xFF, 0x00];
const EWF2_MAGIC: [u8; 8] = [0x45, 0x56, 0x46, 0x32, 0x0D, 0x0A, 0x81, 0x00];

/// One chunk already flushed to the current segment's `sectors` extent,
/// recorded so the closing `table` section can be emitted.
struct PendingEntry {
    offset_delta: u32,
    compressed: bool,
}

/// Builds one EWF segment set. Not shared across threads: a writer owns
/// exclusive access to the segment file it is appending to (§5, §9 "writer
/// half is single-writer by construction").
pub struct SegmentWriter {
    base_stem: PathBuf,
    family: SegmentFamily,
    config: EwfConfig,
    media_values: MediaValues,
    header_values: HeaderValueMap,
    segment_number: u32,
    file: File,
    sectors_descriptor_offset: u64,
    sectors_payload_offset: u64,
    pending: Vec<PendingEntry>,
    bytes_in_segment: u64,
    chunks_written: u64,
    segment_paths: Vec<PathBuf>,
}

impl SegmentWriter {
    /// `base_path` is the target without its segment extension, e.g.
    /// `/evidence/case001` produces `case001.E01`, `case001.E02`, ...
    #[instrument(skip(media_values, header_values, config))]
    pub fn begin(
        base_path: &Path,
        media_values: MediaValues,
        header_values: HeaderValueMap,
        config: EwfConfig,
    ) -> Result<Self> {
        let family = SegmentFamily::for_format(config.format, config.format.is_logical());
        let is_v2 = config.format.is_v2();

        let path = base_path.with_extension(extension_for_ordinal(family, 1));
        debug!(?path, "opening first segment file");
        let mut file = File::create(&path).map_err(|e| EwfError::io(format!("create {}", path.display()), e))?;

        write_segment_header(is_v2, 1, &mut file)?;
        write_header_section(is_v2, config.compression_level, &header_values, &mut file)?;
        write_volume_section(is_v2, &media_values, &mut file)?;
        let (sectors_descriptor_offset, sectors_payload_offset) = begin_sectors_extent(is_v2, &mut file)?;

        Ok(SegmentWriter {
            base_stem: base_path.to_path_buf(),
            family,
            config,
            media_values,
            header_values,
            segment_number: 1,
            file,
            sectors_descriptor_offset,
            sectors_payload_offset,
            pending: Vec::new(),
            bytes_in_segment: 0,
            chunks_written: 0,
            segment_paths: vec![path],
        })
    }

    fn is_v2(&self) -> bool {
        self.config.format.is_v2()
    }

    /// Append one media chunk's worth of bytes. `raw_chunk` is exactly one
    /// `chunk_size`-sized (or shorter, for the final chunk) slice of plain
    /// media data; compression/checksumming per §4.3 happens here.
    #[instrument(skip(self, raw_chunk), fields(len = raw_chunk.len()))]
    pub fn write_chunk(&mut self, raw_chunk: &[u8]) -> Result<()> {
        if self.bytes_in_segment > 0 && self.bytes_in_segment >= self.config.max_segment_size {
            self.roll_segment()?;
        }

        let level = self.config.compression_level;
        let (payload, compressed) = if level == CompressionLevel::None {
            (raw_chunk.to_vec(), false)
        } else {
            let candidate = deflate_compress(raw_chunk, level.to_flate2_level())?;
            if candidate.len() < raw_chunk.len() {
                (candidate, true)
            } else {
                (raw_chunk.to_vec(), false)
            }
        };

        let is_v2 = self.is_v2();
        let checksum = if is_v2 { crc32(&payload) } else { adler32(&payload) };

        let offset_delta =
            (self.file.stream_position().map_err(|e| EwfError::io("tell", e))? - self.sectors_payload_offset) as u32;
        self.file.write_all(&payload).map_err(|e| EwfError::io("write chunk", e))?;
        self.file.write_all(&checksum.to_le_bytes()).map_err(|e| EwfError::io("write chunk checksum", e))?;

        self.bytes_in_segment += (payload.len() + 4) as u64;
        self.chunks_written += 1;
        self.pending.push(PendingEntry { offset_delta, compressed });
        Ok(())
    }

    fn roll_segment(&mut self) -> Result<()> {
        let is_v2 = self.is_v2();
        self.close_extent()?;
        write_section(is_v2, &mut self.file, "next", &[])?;

        self.segment_number += 1;
        let ext = extension_for_ordinal(self.family, self.segment_number);
        let path = self.base_stem.with_extension(ext);
        debug!(?path, segment_number = self.segment_number, "rolling to new segment file");

        let mut file = File::create(&path).map_err(|e| EwfError::io(format!("create {}", path.display()), e))?;
        write_segment_header(is_v2, self.segment_number, &mut file)?;
        let (sectors_descriptor_offset, sectors_payload_offset) = begin_sectors_extent(is_v2, &mut file)?;

        self.file = file;
        self.sectors_descriptor_offset = sectors_descriptor_offset;
        self.sectors_payload_offset = sectors_payload_offset;
        self.pending.clear();
        self.bytes_in_segment = 0;
        self.segment_paths.push(path);
        Ok(())
    }

    /// Close the in-progress `sectors` extent: patch its descriptor now that
    /// the final size is known, then append the `table` section.
    fn close_extent(&mut self) -> Result<()> {
        let is_v2 = self.is_v2();
        let table_offset = self.file.stream_position().map_err(|e| EwfError::io("tell", e))?;
        let sectors_size = table_offset - self.sectors_descriptor_offset;

        self.file
            .seek(SeekFrom::Start(self.sectors_descriptor_offset))
            .map_err(|e| EwfError::io("seek back to sectors descriptor", e))?;
        if is_v2 {
            SectionDescriptor::write_v2(
                &mut self.file,
                "sectors",
                table_offset,
                sectors_size - SectionDescriptor::ON_DISK_SIZE,
            )?;
        } else {
            SectionDescriptor::write_v1(&mut self.file, "sectors", table_offset, sectors_size)?;
        }
        self.file.seek(SeekFrom::Start(table_offset)).map_err(|e| EwfError::io("seek to table", e))?;

        let base_offset = self.sectors_payload_offset;
        let mut body = Vec::new();
        write_table_header_v1(&mut body, base_offset, self.pending.len() as u32)?;
        for entry in &self.pending {
            let raw = encode_table_entry_v1(entry.compressed, entry.offset_delta);
            body.extend_from_slice(&raw.to_le_bytes());
        }
        write_section(is_v2, &mut self.file, "table", &body)
    }

    /// Close the final extent, append `digest`/`done` sections, and return
    /// the ordered list of segment-file paths written (§4.8 "Done").
    #[instrument(skip(self, hash_values))]
    pub fn finalize(mut self, hash_values: &HashValueMap) -> Result<Vec<PathBuf>> {
        let is_v2 = self.is_v2();
        self.close_extent()?;

        if let (Some(md5), Some(sha1)) = (hash_values.get("MD5"), hash_values.get("SHA1")) {
            let mut raw = Vec::with_capacity(36);
            raw.extend_from_slice(&hex::decode(md5).unwrap_or_else(|_| vec![0u8; 16]));
            raw.extend_from_slice(&hex::decode(sha1).unwrap_or_else(|_| vec![0u8; 20]));
            write_section(is_v2, &mut self.file, "digest", &raw)?;
        }

        write_section(is_v2, &mut self.file, "done", &[])?;
        Ok(self.segment_paths)
    }

    pub fn chunks_written(&self) -> u64 {
        self.chunks_written
    }

    pub fn segment_paths(&self) -> &[PathBuf] {
        &self.segment_paths
    }

    pub fn media_values(&self) -> &MediaValues {
        &self.media_values
    }
}

fn write_segment_header(is_v2: bool, segment_number: u32, w: &mut File) -> Result<()> {
    if is_v2 {
        w.write_all(&EWF2_MAGIC).map_err(|e| EwfError::io("write magic", e))?;
        w.write_all(&[1u8, 0u8]).map_err(|e| EwfError::io("write version", e))?;
        w.write_all(&0u16.to_le_bytes()).map_err(|e| EwfError::io("write compression method", e))?;
        w.write_all(&(segment_number as u16).to_le_bytes()).map_err(|e| EwfError::io("write segment number", e))?;
        w.write_all(&[0u8; 16]).map_err(|e| EwfError::io("write set identifier", e))
    } else {
        w.write_all(&EWF1_MAGIC).map_err(|e| EwfError::io("write magic", e))?;
        w.write_all(&(segment_number as u16).to_le_bytes()).map_err(|e| EwfError::io("write segment number", e))?;
        w.write_all(&0u16.to_le_bytes()).map_err(|e| EwfError::io("write fields end", e))
    }
}

fn write_header_section(
    is_v2: bool,
    level: CompressionLevel,
    header_values: &HeaderValueMap,
    w: &mut File,
) -> Result<()> {
    let text = render_header_text(header_values);
    let compressed = deflate_compress(text.as_bytes(), level.to_flate2_level())?;
    write_section(is_v2, w, "header", &compressed)
}

fn write_volume_section(is_v2: bool, media_values: &MediaValues, w: &mut File) -> Result<()> {
    let mut payload = [0u8; 76];
    payload[8..12].copy_from_slice(&media_values.sectors_per_chunk.to_le_bytes());
    payload[12..16].copy_from_slice(&media_values.bytes_per_sector.to_le_bytes());
    payload[16..24].copy_from_slice(&media_values.number_of_sectors.to_le_bytes());
    payload[36..40].copy_from_slice(&(media_values.media_type as u32).to_le_bytes());
    payload[56] = match media_values.compression_level {
        CompressionLevel::None => 0,
        CompressionLevel::Fast => 1,
        CompressionLevel::Best => 2,
    };
    payload[60..76].copy_from_slice(&media_values.guid);
    write_section(is_v2, w, if is_v2 { "disk" } else { "volume" }, &payload)
}

fn begin_sectors_extent(is_v2: bool, w: &mut File) -> Result<(u64, u64)> {
    let descriptor_offset = w.stream_position().map_err(|e| EwfError::io("tell", e))?;
    if is_v2 {
        SectionDescriptor::write_v2(w, "sectors", 0, 0)?;
    } else {
        SectionDescriptor::write_v1(w, "sectors", 0, 0)?;
    }
    let payload_offset = w.stream_position().map_err(|e| EwfError::io("tell", e))?;
    Ok((descriptor_offset, payload_offset))
}

fn write_section(is_v2: bool, w: &mut File, tag: &str, payload: &[u8]) -> Result<()> {
    let descriptor_offset = w.stream_position().map_err(|e| EwfError::io("tell", e))?;
    let total_size = SectionDescriptor::ON_DISK_SIZE + payload.len() as u64;
    if is_v2 {
        SectionDescriptor::write_v2(w, tag, descriptor_offset + total_size, payload.len() as u64)?;
    } else {
        SectionDescriptor::write_v1(w, tag, descriptor_offset + total_size, total_size)?;
    }
    w.write_all(payload).map_err(|e| EwfError::io("write section payload", e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{EwfFormat, MediaFlags, MediaType};
    use crate::media_stream::MediaStream;
    use crate::segment::io_pool::FileIoPool;
    use tempfile::TempDir;

    fn sample_media_values(number_of_sectors: u64) -> MediaValues {
        MediaValues {
            bytes_per_sector: 512,
            sectors_per_chunk: 64,
            number_of_sectors,
            media_type: MediaType::Fixed,
            media_flags: MediaFlags::PHYSICAL,
            format: EwfFormat::EnCase5,
            guid: [0xAB; 16],
            error_granularity: 64,
            compression_level: CompressionLevel::None,
        }
    }

    #[test]
    fn writes_and_reads_back_single_segment_image() {
        let dir = TempDir::new().unwrap();
        let base = dir.path().join("case001");

        let chunk_size = 64 * 512usize;
        let total_chunks = 3u64;
        let media_values = sample_media_values(total_chunks * 64);

        let mut header_values = HeaderValueMap::new();
        header_values.set("case_number", "C1");

        let config = EwfConfig::default().with_format(EwfFormat::EnCase5);
        let mut writer = SegmentWriter::begin(&base, media_values, header_values, config.clone()).unwrap();

        let mut expected = Vec::new();
        for i in 0..total_chunks {
            let chunk: Vec<u8> = (0..chunk_size).map(|b| ((b + i as usize) % 251) as u8).collect();
            writer.write_chunk(&chunk).unwrap();
            expected.extend_from_slice(&chunk);
        }

        let mut hashes = HashValueMap::new();
        hashes.set("MD5", "d41d8cd98f00b204e9800998ecf8427e");
        hashes.set("SHA1", "da39a3ee5e6b4b0d3255bfef95601890afd80709");
        let paths = writer.finalize(&hashes).unwrap();
        assert_eq!(paths.len(), 1);
        assert_eq!(paths[0].extension().unwrap(), "E01");

        let image = crate::segment::reader::open_explicit_set(paths, &config).unwrap();
        assert_eq!(image.chunk_table.len(), total_chunks as usize);
        assert_eq!(image.header_values.get("case_number"), Some("C1"));
        assert_eq!(image.hash_values.get("MD5"), Some("d41d8cd98f00b204e9800998ecf8427e"));

        let io_pool = FileIoPool::new(image.segment_paths.clone(), 4);
        let stream = MediaStream::new(image.media_values.unwrap(), image.chunk_table, io_pool, config);
        let mut buf = vec![0u8; expected.len()];
        let n = stream.read_at_offset(0, &mut buf).unwrap();
        assert_eq!(n, expected.len());
        assert_eq!(buf, expected);
    }

    #[test]
    fn rolls_over_to_a_second_segment_past_max_size() {
        let dir = TempDir::new().unwrap();
        let base = dir.path().join("case002");

        let chunk_size = 64 * 512usize;
        let total_chunks = 4u64;
        let media_values = sample_media_values(total_chunks * 64);

        let config =
            EwfConfig::default().with_max_segment_size(chunk_size as u64 * 2).with_format(EwfFormat::EnCase5);
        let mut writer = SegmentWriter::begin(&base, media_values, HeaderValueMap::new(), config).unwrap();

        for i in 0..total_chunks {
            let chunk = vec![(i % 256) as u8; chunk_size];
            writer.write_chunk(&chunk).unwrap();
        }

        let paths = writer.finalize(&HashValueMap::new()).unwrap();
        assert!(paths.len() >= 2, "expected segment rollover, got {} segment(s)", paths.len());
        assert_eq!(paths[0].extension().unwrap(), "E01");
        assert_eq!(paths[1].extension().unwrap(), "E02");
    }
}
