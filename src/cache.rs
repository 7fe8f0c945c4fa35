//! Chunk cache.
//!
//! A fixed-capacity, multi-slot LRU keyed by global chunk index, so re-reads
//! of the same region of the media stream don't re-inflate the same chunk
//! over and over. Unlike a read-only cache, entries can also be
//! write-through updated when a chunk is rewritten in place.

use std::collections::HashMap;

struct Entry {
    data: Vec<u8>,
    last_used: u64,
}

/// Bounded associative cache mapping global chunk index to decompressed
/// bytes. Default capacity 16.
pub struct ChunkCache {
    capacity: usize,
    entries: HashMap<usize, Entry>,
    clock: u64,
}

impl ChunkCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            entries: HashMap::new(),
            clock: 0,
        }
    }

    pub fn get(&mut self, index: usize) -> Option<&[u8]> {
        self.clock += 1;
        let clock = self.clock;
        if let Some(entry) = self.entries.get_mut(&index) {
            entry.last_used = clock;
            Some(&entry.data)
        } else {
            None
        }
    }

    /// Inserts or overwrites `index`'s cached bytes, evicting the least
    /// recently used entry first if the cache is at capacity.
    pub fn insert(&mut self, index: usize, data: Vec<u8>) {
        if !self.entries.contains_key(&index) && self.entries.len() >= self.capacity {
            if let Some((&victim, _)) = self.entries.iter().min_by_key(|(_, e)| e.last_used) {
                self.entries.remove(&victim);
            }
        }
        self.clock += 1;
        let clock = self.clock;
        self.entries.insert(index, Entry { data, last_used: clock });
    }

    /// Write-through update: re-encoded bytes for an in-place chunk
    /// rewrite. Identical to `insert` — whether a rewrite lands here or
    /// goes through `invalidate` instead is decided by the caller.
    pub fn update(&mut self, index: usize, data: Vec<u8>) {
        self.insert(index, data);
    }

    pub fn invalidate(&mut self, index: usize) {
        self.entries.remove(&index);
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hit_after_insert() {
        let mut cache = ChunkCache::new(2);
        cache.insert(0, vec![1, 2, 3]);
        assert_eq!(cache.get(0), Some(&[1, 2, 3][..]));
    }

    #[test]
    fn evicts_least_recently_used() {
        let mut cache = ChunkCache::new(2);
        cache.insert(0, vec![0]);
        cache.insert(1, vec![1]);
        // touch 0 so 1 becomes the LRU victim
        let _ = cache.get(0);
        cache.insert(2, vec![2]);
        assert!(cache.get(1).is_none());
        assert!(cache.get(0).is_some());
        assert!(cache.get(2).is_some());
    }

    #[test]
    fn invalidate_removes_entry() {
        let mut cache = ChunkCache::new(2);
        cache.insert(0, vec![9]);
        cache.invalidate(0);
        assert!(cache.get(0).is_none());
    }
}
