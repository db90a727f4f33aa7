//! Bounded pool of open segment-file descriptors with LRU eviction (§5
//! "File-IO pool").

use crate::error::EwfError;
use std::collections::{HashMap, VecDeque};
use std::fs::File;
use std::path::PathBuf;
use tracing::{debug, trace};

type Result<T> = std::result::Result<T, EwfError>;

pub struct FileIoPool {
    file_paths: Vec<PathBuf>,
    open_handles: HashMap<usize, File>,
    lru_queue: VecDeque<usize>,
    max_open: usize,
}

impl FileIoPool {
    pub fn new(file_paths: Vec<PathBuf>, max_open: usize) -> Self {
        Self { file_paths, open_handles: HashMap::new(), lru_queue: VecDeque::new(), max_open }
    }

    /// Acquire the file handle for `segment_index`, opening and evicting the
    /// least-recently-used handle if the pool is at capacity.
    pub fn get_file(&mut self, segment_index: usize) -> Result<&mut File> {
        if segment_index >= self.file_paths.len() {
            return Err(EwfError::InvalidArgument(format!(
                "segment index {segment_index} out of range ({} segments)",
                self.file_paths.len()
            )));
        }

        if self.open_handles.contains_key(&segment_index) {
            self.lru_queue.retain(|&x| x != segment_index);
            self.lru_queue.push_front(segment_index);
            trace!(segment_index, "segment handle cache hit");
            return Ok(self.open_handles.get_mut(&segment_index).unwrap());
        }

        if self.open_handles.len() >= self.max_open {
            if let Some(lru_index) = self.lru_queue.pop_back() {
                trace!(lru_index, "evicting LRU segment handle");
                self.open_handles.remove(&lru_index);
            }
        }

        let path = &self.file_paths[segment_index];
        debug!(segment_index, ?path, "opening segment handle");
        let file = File::open(path).map_err(|e| EwfError::io(format!("open segment {segment_index}"), e))?;

        self.open_handles.insert(segment_index, file);
        self.lru_queue.push_front(segment_index);
        Ok(self.open_handles.get_mut(&segment_index).unwrap())
    }

    pub fn segment_count(&self) -> usize {
        self.file_paths.len()
    }

    pub fn path(&self, segment_index: usize) -> Option<&PathBuf> {
        self.file_paths.get(segment_index)
    }

    pub fn paths(&self) -> &[PathBuf] {
        &self.file_paths
    }

    pub fn open_count(&self) -> usize {
        self.open_handles.len()
    }

    pub fn close_all(&mut self) {
        self.open_handles.clear();
        self.lru_queue.clear();
    }
}
