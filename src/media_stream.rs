//! Media data stream (C8): a cached, seekable byte stream over the chunk
//! table + chunk codec (§4.5).

use crate::cache::ChunkCache;
use crate::chunk_codec::decode_chunk;
use crate::chunk_table::ChunkTable;
use crate::codec::binary::read_bytes_at;
use crate::config::EwfConfig;
use crate::error::EwfError;
use crate::media_values::MediaValues;
use crate::segment::io_pool::FileIoPool;
use std::sync::{Arc, Mutex};
use tracing::instrument;

type Result<T> = std::result::Result<T, EwfError>;

/// Services arbitrary `(offset, length)` reads against the reconstructed
/// media by locating, fetching, decoding, verifying, and caching chunks.
/// `read`/`seek` may be called concurrently across threads (§4.5, §5); the
/// chunk cache and file pool each carry their own lock.
pub struct MediaStream {
    media_values: MediaValues,
    chunk_table: ChunkTable,
    cache: ChunkCache,
    io_pool: Mutex<FileIoPool>,
    config: EwfConfig,
    cursor: Mutex<u64>,
}

impl MediaStream {
    pub fn new(media_values: MediaValues, chunk_table: ChunkTable, io_pool: FileIoPool, config: EwfConfig) -> Self {
        let cache = ChunkCache::new(config.chunk_cache_entries);
        MediaStream { media_values, chunk_table, cache, io_pool: Mutex::new(io_pool), config, cursor: Mutex::new(0) }
    }

    pub fn size(&self) -> u64 {
        self.media_values.media_size()
    }

    pub fn chunk_size(&self) -> u32 {
        self.media_values.chunk_size()
    }

    pub fn number_of_chunks(&self) -> u64 {
        self.chunk_table.len() as u64
    }

    /// Stateful read from the implicit seek cursor (§5 "successive
    /// `read_buffer` calls are ordered by the thread's implicit seek cursor").
    pub fn read_buffer(&self, buf: &mut [u8]) -> Result<usize> {
        let mut cursor = self.cursor.lock().unwrap();
        let n = self.read_at_offset(*cursor, buf)?;
        *cursor += n as u64;
        Ok(n)
    }

    pub fn seek(&self, offset: u64) {
        *self.cursor.lock().unwrap() = offset;
    }

    /// Stateless read: may be freely interleaved across threads (§5).
    #[instrument(skip(self, buf), fields(offset, len = buf.len()))]
    pub fn read_at_offset(&self, offset: u64, buf: &mut [u8]) -> Result<usize> {
        let media_size = self.size();
        if offset >= media_size {
            return Ok(0);
        }
        let remaining = (media_size - offset) as usize;
        let want = buf.len().min(remaining);
        if want == 0 {
            return Ok(0);
        }

        let chunk_size = self.chunk_size() as u64;
        let first = offset / chunk_size;
        let last = (offset + want as u64 - 1) / chunk_size;

        let mut written = 0usize;
        for chunk_index in first..=last {
            let chunk = self.fetch_chunk(chunk_index as usize)?;

            let chunk_start = chunk_index * chunk_size;
            let copy_start = if chunk_index == first { (offset - chunk_start) as usize } else { 0 };
            let available = chunk.len().saturating_sub(copy_start);
            let remaining_want = want - written;
            let copy_len = available.min(remaining_want);

            buf[written..written + copy_len].copy_from_slice(&chunk[copy_start..copy_start + copy_len]);
            written += copy_len;

            if written >= want {
                break;
            }
        }

        Ok(written)
    }

    /// Fetch chunk `index`, decoded and checksum-verified, from cache or
    /// by locating + reading + decoding it fresh (§4.5 data-flow).
    fn fetch_chunk(&self, index: usize) -> Result<Arc<Vec<u8>>> {
        if let Some(cached) = self.cache.get(index) {
            return Ok(cached);
        }

        let descriptor = *self.chunk_table.get(index)?;
        let chunk_size = self.chunk_size() as usize;
        let is_last = index + 1 == self.chunk_table.len();

        let raw = {
            let mut pool = self.io_pool.lock().unwrap();
            let file = pool.get_file(descriptor.segment_id)?;
            read_bytes_at(file, descriptor.data_offset as u64, descriptor.data_size as usize)?
        };

        let decoded = decode_chunk(&descriptor, &raw, chunk_size, is_last, &self.config)?;
        let data = Arc::new(decoded.data);
        self.cache.insert(index, (*data).clone());
        Ok(data)
    }
}
