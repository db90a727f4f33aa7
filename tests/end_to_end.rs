//! End-to-end scenarios exercised through the public `EwfHandle` surface
//! only, covering the cross-module paths a single unit test file can't
//! reach on its own: explicit segment-set discovery, multi-segment
//! rollover, and `table`/`table2` redundancy recovery.

use ewf_archive::config::{CompressionLevel, EwfFormat, MediaFlags, MediaType};
use ewf_archive::{EwfConfig, EwfHandle, HeaderValueMap, MediaValues};
use tempfile::TempDir;

fn sample_media_values(number_of_sectors: u64) -> MediaValues {
    MediaValues {
        bytes_per_sector: 512,
        sectors_per_chunk: 64,
        number_of_sectors,
        media_type: MediaType::Fixed,
        media_flags: MediaFlags::PHYSICAL,
        format: EwfFormat::EnCase5,
        guid: [0x42; 16],
        error_granularity: 64,
        compression_level: CompressionLevel::None,
    }
}

/// Scenario 1: a minimal EnCase 5 image. Case/evidence/examiner header
/// values round-trip and the first bytes read back exactly as acquired.
#[test]
fn scenario_1_minimal_encase5_image_round_trips() {
    let dir = TempDir::new().unwrap();
    let base = dir.path().join("case001");

    let chunk_size = 64 * 512usize;
    let media_values = sample_media_values(4 * 64);
    let config = EwfConfig::default().with_format(EwfFormat::EnCase5);

    let mut header_values = HeaderValueMap::new();
    header_values.set("case_number", "C1");
    header_values.set("evidence_number", "E1");
    header_values.set("examiner_name", "A. Examiner");

    let mut writer = EwfHandle::begin_write(&base, media_values, header_values, config.clone()).unwrap();
    let media: Vec<u8> = (0..4 * chunk_size).map(|i| (i % 256) as u8).collect();
    writer.write_buffer(&media).unwrap();
    let paths = writer.finalise().unwrap();

    let handle = EwfHandle::open(&paths, config).unwrap();
    assert_eq!(handle.media_size().unwrap(), media.len() as u64);
    assert_eq!(handle.get_header_value("case_number").unwrap(), Some("C1"));
    assert_eq!(handle.get_header_value("evidence_number").unwrap(), Some("E1"));
    assert_eq!(handle.get_header_value("examiner_name").unwrap(), Some("A. Examiner"));

    let mut first_4k = vec![0u8; 4096];
    let n = handle.read_buffer_at_offset(&mut first_4k, 0).unwrap();
    assert_eq!(n, 4096);
    assert_eq!(first_4k, media[..4096]);

    assert!(handle.verify().unwrap());
}

/// Scenario 6: writing past `max_segment_size` rolls over into a fresh
/// segment file each time; reopening from just the first member's path
/// (triggering discovery rather than an explicit list) reproduces the
/// full media exactly, including reads that straddle a segment boundary.
#[test]
fn scenario_6_multi_segment_rollover_and_discovery_round_trip() {
    let dir = TempDir::new().unwrap();
    let base = dir.path().join("out");

    let chunk_size = 64 * 512u64; // 32 KiB
    let total_chunks = 8u64;
    let media_values = sample_media_values(total_chunks * 64);
    // Two chunks' worth of payload per segment forces a rollover every
    // other chunk, producing four segments for eight total chunks.
    let config = EwfConfig::default()
        .with_format(EwfFormat::EnCase5)
        .with_max_segment_size(chunk_size * 2);

    let mut writer = EwfHandle::begin_write(&base, media_values, HeaderValueMap::new(), config.clone()).unwrap();
    let media: Vec<u8> = (0..total_chunks * chunk_size).map(|i| (i % 241) as u8).collect();
    writer.write_buffer(&media).unwrap();
    let paths = writer.finalise().unwrap();

    assert_eq!(paths.len(), 4, "expected four segments, got {}", paths.len());
    let extensions: Vec<String> =
        paths.iter().map(|p| p.extension().unwrap().to_string_lossy().to_string()).collect();
    assert_eq!(extensions, vec!["E01", "E02", "E03", "E04"]);

    // Open from the first segment's path alone: the handle must discover
    // the rest of the set on its own.
    let handle = EwfHandle::open(&[paths[0].clone()], config).unwrap();
    assert_eq!(handle.media_size().unwrap(), media.len() as u64);

    let mut whole = vec![0u8; media.len() as usize];
    let n = handle.read_buffer_at_offset(&mut whole, 0).unwrap();
    assert_eq!(n, whole.len());
    assert_eq!(whole, media);

    // A read straddling the boundary between segment 2 and segment 3.
    let boundary = chunk_size * 4; // start of the third segment's data
    let mut spanning = vec![0u8; 64];
    let n = handle.read_buffer_at_offset(&mut spanning, boundary - 32).unwrap();
    assert_eq!(n, 64);
    assert_eq!(spanning, media[(boundary - 32) as usize..(boundary + 32) as usize]);

    assert!(handle.verify().unwrap());
}

/// Opening the same segment set twice produces independently consistent
/// views (§ universal invariant: idempotent open).
#[test]
fn idempotent_open_yields_consistent_views() {
    let dir = TempDir::new().unwrap();
    let base = dir.path().join("case003");

    let chunk_size = 64 * 512usize;
    let media_values = sample_media_values(2 * 64);
    let config = EwfConfig::default().with_format(EwfFormat::EnCase5);

    let mut header_values = HeaderValueMap::new();
    header_values.set("case_number", "C3");
    let mut writer = EwfHandle::begin_write(&base, media_values, header_values, config.clone()).unwrap();
    let media = vec![0x5Au8; 2 * chunk_size];
    writer.write_buffer(&media).unwrap();
    let paths = writer.finalise().unwrap();

    let first = EwfHandle::open(&paths, config.clone()).unwrap();
    let second = EwfHandle::open(&paths, config).unwrap();

    assert_eq!(first.media_size().unwrap(), second.media_size().unwrap());
    assert_eq!(first.get_header_value("case_number").unwrap(), second.get_header_value("case_number").unwrap());

    let mut buf_a = vec![0u8; media.len()];
    let mut buf_b = vec![0u8; media.len()];
    first.read_buffer_at_offset(&mut buf_a, 0).unwrap();
    second.read_buffer_at_offset(&mut buf_b, 0).unwrap();
    assert_eq!(buf_a, buf_b);
}

/// A stored digest that disagrees with the acquired media fails `verify()`
/// without touching the byte-for-byte read path at all.
#[test]
fn mismatched_stored_hash_fails_verification() {
    let dir = TempDir::new().unwrap();
    let base = dir.path().join("case004");

    let chunk_size = 64 * 512usize;
    let media_values = sample_media_values(64);
    let config = EwfConfig::default().with_format(EwfFormat::EnCase5);

    let mut writer = EwfHandle::begin_write(&base, media_values, HeaderValueMap::new(), config.clone()).unwrap();
    writer.set_hash_value("MD5", "00000000000000000000000000000000").unwrap();
    writer.write_buffer(&vec![0x11u8; chunk_size]).unwrap();
    let paths = writer.finalise().unwrap();

    let handle = EwfHandle::open(&paths, config).unwrap();
    assert_eq!(handle.get_hash_value("MD5").unwrap(), Some("00000000000000000000000000000000"));
    assert!(!handle.verify().unwrap());
}

// ---- Scenario 3: table/table2 redundancy recovery ------------------------
//
// The writer never produces a corrupt `table` section, so this scenario is
// exercised by hand-assembling one EWF1 segment file below the `EwfHandle`
// layer: a `table` section whose header is otherwise well-formed but whose
// trailing Adler-32 checksum has been flipped, followed by a well-formed
// `table2` carrying the same real entries. The open path must detect the
// `table` checksum mismatch, fall back to `table2`, and reconstruct the
// chunk exactly.
mod table2_recovery {
    use ewf_archive::codec::binary::{encode_table_entry_v1, write_table_header_v1};
    use ewf_archive::codec::checksum::adler32;
    use ewf_archive::segment::section::SectionDescriptor;
    use ewf_archive::{EwfConfig, EwfHandle};
    use std::fs::File;
    use std::io::{Seek, SeekFrom, Write};
    use tempfile::TempDir;

    const EWF1_MAGIC: [u8; 8] = [0x45, 0x56, 0x46, 0x09, 0x0D, 0x0A, 0xFF, 0x00];

    fn write_section(file: &mut File, tag: &str, payload: &[u8]) -> u64 {
        let descriptor_offset = file.stream_position().unwrap();
        let total_size = SectionDescriptor::ON_DISK_SIZE + payload.len() as u64;
        SectionDescriptor::write_v1(file, tag, descriptor_offset + total_size, total_size).unwrap();
        file.write_all(payload).unwrap();
        descriptor_offset + total_size
    }

    #[test]
    fn scenario_3_table2_recovers_after_table_section_is_corrupt() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("case005.E01");
        let chunk: Vec<u8> = (0..32 * 1024u32).map(|i| (i % 253) as u8).collect();

        let mut file = File::create(&path).unwrap();

        // Segment header.
        file.write_all(&EWF1_MAGIC).unwrap();
        file.write_all(&1u16.to_le_bytes()).unwrap();
        file.write_all(&0u16.to_le_bytes()).unwrap();

        // Volume section: 512 bytes/sector, 64 sectors/chunk, 64 sectors total.
        let mut volume = [0u8; 76];
        volume[8..12].copy_from_slice(&64u32.to_le_bytes());
        volume[12..16].copy_from_slice(&512u32.to_le_bytes());
        volume[16..24].copy_from_slice(&64u64.to_le_bytes());
        volume[36..40].copy_from_slice(&1u32.to_le_bytes()); // MediaType::Fixed
        write_section(&mut file, "volume", &volume);

        // Sectors extent: one uncompressed chunk + its Adler-32 checksum.
        let sectors_descriptor_offset = file.stream_position().unwrap();
        SectionDescriptor::write_v1(&mut file, "sectors", 0, 0).unwrap(); // patched below
        let sectors_payload_offset = file.stream_position().unwrap();
        file.write_all(&chunk).unwrap();
        let checksum = adler32(&chunk);
        file.write_all(&checksum.to_le_bytes()).unwrap();
        let after_sectors = file.stream_position().unwrap();

        file.seek(SeekFrom::Start(sectors_descriptor_offset)).unwrap();
        SectionDescriptor::write_v1(&mut file, "sectors", after_sectors, after_sectors - sectors_descriptor_offset)
            .unwrap();
        file.seek(SeekFrom::Start(after_sectors)).unwrap();

        // A structurally valid single-entry table body: 20-byte header
        // (base_offset:u64 entry_count:u32 padding[4] checksum:u32) plus one
        // table entry.
        let mut good_body = Vec::new();
        write_table_header_v1(&mut good_body, sectors_payload_offset, 1).unwrap();
        let raw = encode_table_entry_v1(false, 0);
        good_body.extend_from_slice(&raw.to_le_bytes());

        // Corrupt `table`: same body, but with the header's stored Adler-32
        // checksum (bytes 16..20) flipped so it no longer matches bytes 0..16.
        let mut corrupt_body = good_body.clone();
        corrupt_body[16] ^= 0xFF;
        write_section(&mut file, "table", &corrupt_body);

        // Well-formed `table2`: the real single-entry index.
        write_section(&mut file, "table2", &good_body);

        write_section(&mut file, "done", &[]);
        drop(file);

        let config = EwfConfig::default();
        let handle = EwfHandle::open(&[path], config).unwrap();
        assert_eq!(handle.media_size().unwrap(), chunk.len() as u64);

        let mut buf = vec![0u8; chunk.len()];
        let n = handle.read_buffer_at_offset(&mut buf, 0).unwrap();
        assert_eq!(n, chunk.len());
        assert_eq!(buf, chunk);
    }
}
