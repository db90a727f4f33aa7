//! Chunk cache (§4.5, §5): a bounded LRU of decoded chunk bytes shared by
//! concurrent readers. The `Arc<Vec<u8>>` value type avoids cloning chunk
//! bytes on a cache hit, and the whole map sits behind a single `RwLock`
//! per §5's locking discipline (shared read-hits, brief exclusive upgrade
//! on miss, never held across decompression).

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, RwLock};

struct Inner {
    entries: HashMap<usize, Arc<Vec<u8>>>,
    lru_queue: VecDeque<usize>,
    max_entries: usize,
}

impl Inner {
    fn touch(&mut self, chunk_index: usize) {
        self.lru_queue.retain(|&x| x != chunk_index);
        self.lru_queue.push_front(chunk_index);
    }
}

/// Thread-safe LRU chunk cache. `get` takes the lock only long enough to
/// clone an `Arc`; `insert` is called with the already-decoded bytes so the
/// lock is never held across a decompression step (§5).
pub struct ChunkCache {
    inner: RwLock<Inner>,
}

impl ChunkCache {
    pub fn new(max_entries: usize) -> Self {
        ChunkCache {
            inner: RwLock::new(Inner {
                entries: HashMap::new(),
                lru_queue: VecDeque::new(),
                max_entries: max_entries.max(1),
            }),
        }
    }

    pub fn get(&self, chunk_index: usize) -> Option<Arc<Vec<u8>>> {
        {
            let guard = self.inner.read().unwrap();
            if let Some(data) = guard.entries.get(&chunk_index) {
                let data = Arc::clone(data);
                drop(guard);
                self.inner.write().unwrap().touch(chunk_index);
                return Some(data);
            }
        }
        None
    }

    pub fn insert(&self, chunk_index: usize, data: Vec<u8>) {
        let mut guard = self.inner.write().unwrap();
        if guard.entries.len() >= guard.max_entries && !guard.entries.contains_key(&chunk_index) {
            if let Some(old_index) = guard.lru_queue.pop_back() {
                guard.entries.remove(&old_index);
            }
        }
        guard.entries.insert(chunk_index, Arc::new(data));
        guard.touch(chunk_index);
    }

    pub fn len(&self) -> usize {
        self.inner.read().unwrap().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
