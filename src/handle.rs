//! Public handle (C11): owns C2–C10, exposes open/read/seek/close and
//! accessors, and the mirror write-side surface (§4.9).
//!
//! The handle is immutable after `open()` apart from the chunk cache (its
//! own lock, inside [`crate::media_stream::MediaStream`]) and the
//! cooperative [`CancellationFlag`] (§9 "no process-wide mutable state" —
//! each handle carries its own flag rather than a global one).

use crate::config::EwfConfig;
use crate::error::EwfError;
use crate::hash_values::{hashes_match, HashValueMap, StreamingDigest};
use crate::header_values::HeaderValueMap;
use crate::lef::FileEntryRef;
use crate::media_stream::MediaStream;
use crate::ranges::SectorRange;
use crate::segment::io_pool::FileIoPool;
use crate::segment::naming::SegmentFamily;
use crate::segment::reader::{self, OpenedImage};
use crate::writer::SegmentWriter;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::instrument;

type Result<T> = std::result::Result<T, EwfError>;

/// Cooperative, clone-shareable cancellation flag (§4.9, §5). Any clone can
/// call [`cancel`](Self::cancel); every in-flight loop polling
/// [`is_cancelled`](Self::is_cancelled) — at chunk granularity — observes it.
#[derive(Clone, Default)]
pub struct CancellationFlag(Arc<AtomicBool>);

impl CancellationFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(EwfError::Cancelled)
        } else {
            Ok(())
        }
    }
}

enum HandleState {
    Read { stream: MediaStream, image: OpenedImage, config: EwfConfig },
    Write { writer: SegmentWriter, header_values: HeaderValueMap, hash_values: HashValueMap, digest: StreamingDigest },
    Closed,
}

/// The crate's single entry point: one handle is either open for read or
/// open for write, never both (§4.9, §5 "writers are single-threaded by
/// contract").
pub struct EwfHandle {
    state: HandleState,
    cancel: CancellationFlag,
}

impl EwfHandle {
    /// Open an existing segment set for reading. `filenames` is the
    /// caller-supplied path list (§4.1): a single path triggers discovery of
    /// the rest of the set, multiple paths are taken as an explicit,
    /// already-ordered set.
    #[instrument(skip(config))]
    pub fn open(filenames: &[PathBuf], config: EwfConfig) -> Result<Self> {
        let image = match filenames {
            [] => return Err(EwfError::InvalidArgument("open() requires at least one filename".into())),
            [single] => reader::open_set(single, &config)?,
            many => reader::open_explicit_set(many.to_vec(), &config)?,
        };
        Self::from_opened_image(image, config)
    }

    /// As [`open`](Self::open), but bound to an externally supplied
    /// cancellation flag instead of a fresh private one.
    pub fn open_cancellable(filenames: &[PathBuf], config: EwfConfig, cancel: CancellationFlag) -> Result<Self> {
        let mut handle = Self::open(filenames, config)?;
        handle.cancel = cancel;
        Ok(handle)
    }

    fn from_opened_image(image: OpenedImage, config: EwfConfig) -> Result<Self> {
        let media_values = image
            .media_values
            .clone()
            .ok_or_else(|| EwfError::FormatMismatch("segment set has no volume/disk section".into()))?;
        let io_pool = FileIoPool::new(image.segment_paths.clone(), config.open_file_limit);
        let stream = MediaStream::new(media_values, image.chunk_table.clone(), io_pool, config.clone());
        Ok(EwfHandle { state: HandleState::Read { stream, image, config }, cancel: CancellationFlag::new() })
    }

    /// Begin writing a fresh segment set (§4.8, §4.9 write-side ops).
    #[instrument(skip(media_values, header_values, config))]
    pub fn begin_write(
        base_path: &Path,
        media_values: crate::media_values::MediaValues,
        header_values: HeaderValueMap,
        config: EwfConfig,
    ) -> Result<Self> {
        let writer = SegmentWriter::begin(base_path, media_values, header_values.clone(), config)?;
        Ok(EwfHandle {
            state: HandleState::Write {
                writer,
                header_values,
                hash_values: HashValueMap::new(),
                digest: StreamingDigest::new(),
            },
            cancel: CancellationFlag::new(),
        })
    }

    pub fn cancellation_flag(&self) -> CancellationFlag {
        self.cancel.clone()
    }

    fn read_state(&self) -> Result<(&MediaStream, &OpenedImage, &EwfConfig)> {
        match &self.state {
            HandleState::Read { stream, image, config } => Ok((stream, image, config)),
            _ => Err(EwfError::InvalidArgument("handle is not open for reading".into())),
        }
    }

    // ---- read side (§4.9) ----------------------------------------------

    pub fn media_size(&self) -> Result<u64> {
        Ok(self.read_state()?.0.size())
    }

    pub fn chunk_size(&self) -> Result<u32> {
        Ok(self.read_state()?.0.chunk_size())
    }

    /// Stateful read through the stream's own seek cursor.
    pub fn read_buffer(&self, buf: &mut [u8]) -> Result<usize> {
        let (stream, _, _) = self.read_state()?;
        self.cancel.check()?;
        self.chunked_read(stream, None, buf)
    }

    /// Stateless read at an explicit offset; does not disturb the implicit
    /// cursor used by [`read_buffer`](Self::read_buffer) (§5).
    pub fn read_buffer_at_offset(&self, buf: &mut [u8], offset: u64) -> Result<usize> {
        let (stream, _, _) = self.read_state()?;
        self.chunked_read(stream, Some(offset), buf)
    }

    /// Services `buf` in `chunk_size`-sized strides so the cancellation flag
    /// (§4.9) is polled at chunk granularity even for a single large request.
    fn chunked_read(&self, stream: &MediaStream, explicit_offset: Option<u64>, buf: &mut [u8]) -> Result<usize> {
        let stride = stream.chunk_size().max(1) as usize;
        let mut written = 0usize;
        while written < buf.len() {
            self.cancel.check()?;
            let end = (written + stride).min(buf.len());
            let n = match explicit_offset {
                Some(offset) => stream.read_at_offset(offset + written as u64, &mut buf[written..end])?,
                None => stream.read_buffer(&mut buf[written..end])?,
            };
            written += n;
            if n == 0 {
                break;
            }
        }
        Ok(written)
    }

    pub fn seek(&self, offset: u64) -> Result<u64> {
        let (stream, _, _) = self.read_state()?;
        stream.seek(offset);
        Ok(offset)
    }

    pub fn number_of_header_values(&self) -> Result<usize> {
        Ok(self.read_state()?.1.header_values.count())
    }

    pub fn get_header_value(&self, id: &str) -> Result<Option<&str>> {
        Ok(self.read_state()?.1.header_values.get(id))
    }

    pub fn get_hash_value(&self, id: &str) -> Result<Option<&str>> {
        Ok(self.read_state()?.1.hash_values.get(id))
    }

    pub fn number_of_acquiry_errors(&self) -> Result<usize> {
        Ok(self.read_state()?.1.acquisition_errors.len())
    }

    pub fn get_acquiry_error(&self, index: usize) -> Result<Option<SectorRange>> {
        Ok(self.read_state()?.1.acquisition_errors.get(index).copied())
    }

    pub fn number_of_sessions(&self) -> Result<usize> {
        Ok(self.read_state()?.1.sessions.len())
    }

    pub fn get_session(&self, index: usize) -> Result<Option<SectorRange>> {
        Ok(self.read_state()?.1.sessions.get(index).copied())
    }

    pub fn root_file_entry(&self) -> Result<Option<FileEntryRef<'_>>> {
        Ok(self.read_state()?.1.lef.as_ref().and_then(|lef| lef.tree.root()))
    }

    /// Stream the whole media through MD5+SHA-1 and compare against the
    /// stored `digest`/`hash` section values (§8 "hash verification").
    /// `Ok(true)` only if both algorithms agree (or the image carries
    /// neither, which is vacuously verified).
    #[instrument(skip(self))]
    pub fn verify(&self) -> Result<bool> {
        let (stream, image, _) = self.read_state()?;
        let media_size = stream.size();
        let chunk_size = stream.chunk_size().max(1) as u64;

        let mut digest = StreamingDigest::new();
        let mut buf = vec![0u8; chunk_size as usize];
        let mut offset = 0u64;
        while offset < media_size {
            self.cancel.check()?;
            let n = stream.read_at_offset(offset, &mut buf)?;
            if n == 0 {
                break;
            }
            digest.update(&buf[..n]);
            offset += n as u64;
        }
        let (computed_md5, computed_sha1) = digest.finalize();

        let md5_ok = image.hash_values.get("MD5").map(|stored| hashes_match(stored, &computed_md5)).unwrap_or(true);
        let sha1_ok =
            image.hash_values.get("SHA1").map(|stored| hashes_match(stored, &computed_sha1)).unwrap_or(true);
        Ok(md5_ok && sha1_ok)
    }

    /// Validate every chunk's on-disk checksum independently and in
    /// parallel, returning the indices of any that fail (§4.10 "bad chunk
    /// checksum -> mark chunk corrupt"). Each chunk is independently
    /// locatable, so unlike [`verify`](Self::verify) (a single ordered
    /// streaming digest) this fans out across `rayon`'s global pool rather
    /// than going through the shared file-pool/cache (§5).
    #[instrument(skip(self))]
    pub fn verify_chunk_checksums(&self) -> Result<Vec<usize>> {
        use crate::chunk_codec::decode_chunk;
        use crate::codec::binary::read_bytes_at;
        use rayon::prelude::*;

        let (stream, image, config) = self.read_state()?;
        let chunk_size = stream.chunk_size() as usize;
        let total = image.chunk_table.len();
        let paths = &image.segment_paths;

        let corrupt: Vec<usize> = (0..total)
            .into_par_iter()
            .filter(|&index| {
                if self.cancel.is_cancelled() {
                    return false;
                }
                let Ok(descriptor) = image.chunk_table.get(index) else { return false };
                let Some(path) = paths.get(descriptor.segment_id) else { return true };
                let Ok(mut file) = std::fs::File::open(path) else { return true };
                let Ok(raw) = read_bytes_at(&mut file, descriptor.data_offset as u64, descriptor.data_size as usize)
                else {
                    return true;
                };
                let is_last = index + 1 == total;
                match decode_chunk(descriptor, &raw, chunk_size, is_last, config) {
                    Ok(decoded) => decoded.corrupt,
                    Err(_) => true,
                }
            })
            .collect();

        if self.cancel.is_cancelled() {
            return Err(EwfError::Cancelled);
        }
        Ok(corrupt)
    }

    pub fn close(mut self) {
        self.state = HandleState::Closed;
    }

    // ---- write side (§4.9) ----------------------------------------------

    fn write_state_mut(
        &mut self,
    ) -> Result<(&mut SegmentWriter, &mut HeaderValueMap, &mut HashValueMap, &mut StreamingDigest)> {
        match &mut self.state {
            HandleState::Write { writer, header_values, hash_values, digest } => {
                Ok((writer, header_values, hash_values, digest))
            }
            _ => Err(EwfError::InvalidArgument("handle is not open for writing".into())),
        }
    }

    pub fn set_header_value(&mut self, id: impl Into<String>, value: impl Into<String>) -> Result<()> {
        self.write_state_mut()?.1.set(id, value);
        Ok(())
    }

    pub fn set_hash_value(&mut self, id: impl Into<String>, value: impl Into<String>) -> Result<()> {
        self.write_state_mut()?.2.set(id, value);
        Ok(())
    }

    /// Append media bytes, chunked to the writer's configured chunk size
    /// (§4.8), feeding the streaming digest as it goes (§4.9 "write-media"
    /// is a long-running loop checked at chunk granularity).
    #[instrument(skip(self, buf), fields(len = buf.len()))]
    pub fn write_buffer(&mut self, buf: &[u8]) -> Result<usize> {
        let chunk_size = self.write_state_mut()?.0.media_values().chunk_size() as usize;
        let mut written = 0usize;
        while written < buf.len() {
            self.cancel.check()?;
            let end = (written + chunk_size).min(buf.len());
            let slice = &buf[written..end];
            let (writer, _, _, digest) = self.write_state_mut()?;
            writer.write_chunk(slice)?;
            digest.update(slice);
            written += slice.len();
        }
        Ok(written)
    }

    /// Finish the write session: merge the streaming digest into the hash
    /// values (unless the caller already set them explicitly via
    /// [`set_hash_value`](Self::set_hash_value)) and close out the segment set.
    #[instrument(skip(self))]
    pub fn finalise(mut self) -> Result<Vec<PathBuf>> {
        let (writer, _header_values, mut hash_values, digest) = match std::mem::replace(&mut self.state, HandleState::Closed) {
            HandleState::Write { writer, header_values, hash_values, digest } => (writer, header_values, hash_values, digest),
            _ => return Err(EwfError::InvalidArgument("handle is not open for writing".into())),
        };

        let (computed_md5, computed_sha1) = digest.finalize();
        if hash_values.get("MD5").is_none() {
            hash_values.set("MD5", computed_md5);
        }
        if hash_values.get("SHA1").is_none() {
            hash_values.set("SHA1", computed_sha1);
        }

        writer.finalize(&hash_values)
    }
}

/// Derive the segment-naming family for a target format/mode combination,
/// exposed for tools that want to predict filenames before writing (§4.8).
pub fn segment_family_for(config: &EwfConfig) -> SegmentFamily {
    SegmentFamily::for_format(config.format, config.format.is_logical())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CompressionLevel, EwfFormat, MediaFlags, MediaType};
    use crate::media_values::MediaValues;
    use tempfile::TempDir;

    fn sample_media_values(number_of_sectors: u64) -> MediaValues {
        MediaValues {
            bytes_per_sector: 512,
            sectors_per_chunk: 64,
            number_of_sectors,
            media_type: MediaType::Fixed,
            media_flags: MediaFlags::PHYSICAL,
            format: EwfFormat::EnCase5,
            guid: [0x11; 16],
            error_granularity: 64,
            compression_level: CompressionLevel::None,
        }
    }

    #[test]
    fn write_then_read_round_trip_through_the_handle() {
        let dir = TempDir::new().unwrap();
        let base = dir.path().join("case");

        let chunk_size = 64 * 512usize;
        let media_values = sample_media_values(2 * 64);
        let config = EwfConfig::default().with_format(EwfFormat::EnCase5);

        let mut writer_handle = EwfHandle::begin_write(&base, media_values, HeaderValueMap::new(), config.clone()).unwrap();
        writer_handle.set_header_value("case_number", "C9").unwrap();

        let payload: Vec<u8> = (0..2 * chunk_size).map(|i| (i % 253) as u8).collect();
        writer_handle.write_buffer(&payload).unwrap();
        let paths = writer_handle.finalise().unwrap();

        let read_handle = EwfHandle::open(&paths, config).unwrap();
        assert_eq!(read_handle.media_size().unwrap(), payload.len() as u64);
        assert_eq!(read_handle.get_header_value("case_number").unwrap(), Some("C9"));

        let mut buf = vec![0u8; payload.len()];
        let n = read_handle.read_buffer_at_offset(&mut buf, 0).unwrap();
        assert_eq!(n, payload.len());
        assert_eq!(buf, payload);

        assert!(read_handle.verify().unwrap());
    }

    #[test]
    fn cancellation_flag_stops_a_write_loop() {
        let dir = TempDir::new().unwrap();
        let base = dir.path().join("cancelled");
        let media_values = sample_media_values(64);
        let config = EwfConfig::default().with_format(EwfFormat::EnCase5);

        let mut handle = EwfHandle::begin_write(&base, media_values, HeaderValueMap::new(), config).unwrap();
        handle.cancellation_flag().cancel();

        let err = handle.write_buffer(&[0u8; 64 * 512]).unwrap_err();
        assert!(matches!(err, EwfError::Cancelled));
    }

    #[test]
    fn read_operations_reject_a_write_only_handle() {
        let dir = TempDir::new().unwrap();
        let base = dir.path().join("writeonly");
        let media_values = sample_media_values(64);
        let config = EwfConfig::default().with_format(EwfFormat::EnCase5);
        let handle = EwfHandle::begin_write(&base, media_values, HeaderValueMap::new(), config).unwrap();

        assert!(handle.media_size().is_err());
    }
}
