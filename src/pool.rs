//! Byte I/O pool.
//!
//! Opens a set of segment files, maps a file index + offset to a read/write,
//! and lazily closes idle files once the configured cap is hit — a write
//! session spanning thousands of segments can't afford to keep every file
//! descriptor open at once.

use crate::error::EwfError;
use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    Read,
    Write,
}

struct Slot {
    path: PathBuf,
    mode: OpenMode,
    file: Option<File>,
    /// Logical offset preserved across close/reopen cycles.
    offset: u64,
    /// Cached file size so `size()` doesn't need a live descriptor.
    size: u64,
    /// Monotonically increasing touch counter for LRU eviction.
    last_used: u64,
}

/// Bounded pool of segment file descriptors.
///
/// `open_order` tracks recency only for slots that currently hold a live
/// `File`; closed slots are skipped. This keeps eviction O(n) in open
/// descriptors, which is bounded by `max_open_files`.
pub struct FilePool {
    slots: Vec<Slot>,
    by_path: HashMap<PathBuf, usize>,
    max_open_files: usize,
    clock: u64,
}

impl FilePool {
    pub fn new(max_open_files: usize) -> Self {
        Self {
            slots: Vec::new(),
            by_path: HashMap::new(),
            max_open_files: max_open_files.max(1),
            clock: 0,
        }
    }

    /// Registers `path` under `index` (allocating the index if new) and
    /// opens it immediately (subject to the LRU cap). Returns the index.
    pub fn open(&mut self, index: usize, path: PathBuf, mode: OpenMode) -> Result<usize, EwfError> {
        while self.slots.len() <= index {
            let filler = PathBuf::new();
            self.slots.push(Slot {
                path: filler,
                mode,
                file: None,
                offset: 0,
                size: 0,
                last_used: 0,
            });
        }
        let size = if mode == OpenMode::Read {
            std::fs::metadata(&path)
                .map_err(|e| EwfError::io("open", Some(index), e))?
                .len()
        } else {
            0
        };
        self.slots[index] = Slot {
            path: path.clone(),
            mode,
            file: None,
            offset: 0,
            size,
            last_used: 0,
        };
        self.by_path.insert(path, index);
        self.ensure_open(index)?;
        Ok(index)
    }

    fn evict_one_if_needed(&mut self) -> Result<(), EwfError> {
        let open_count = self.slots.iter().filter(|s| s.file.is_some()).count();
        if open_count < self.max_open_files {
            return Ok(());
        }
        let victim = self
            .slots
            .iter()
            .enumerate()
            .filter(|(_, s)| s.file.is_some())
            .min_by_key(|(_, s)| s.last_used)
            .map(|(i, _)| i);
        if let Some(i) = victim {
            self.close(i)?;
        }
        Ok(())
    }

    fn ensure_open(&mut self, index: usize) -> Result<(), EwfError> {
        if self.slots[index].file.is_some() {
            return Ok(());
        }
        self.evict_one_if_needed()?;
        let slot = &self.slots[index];
        if slot.path.as_os_str().is_empty() {
            return Err(EwfError::InvalidArgument(format!(
                "file pool index {index} was never opened"
            )));
        }
        let mut opts = OpenOptions::new();
        match slot.mode {
            OpenMode::Read => {
                opts.read(true);
            }
            OpenMode::Write => {
                opts.read(true).write(true).create(true);
            }
        }
        let mut file = opts
            .open(&slot.path)
            .map_err(|e| EwfError::io("reopen", Some(index), e))?;
        file.seek(SeekFrom::Start(slot.offset))
            .map_err(|e| EwfError::io("seek", Some(index), e))?;
        self.clock += 1;
        let clock = self.clock;
        let slot = &mut self.slots[index];
        slot.file = Some(file);
        slot.last_used = clock;
        Ok(())
    }

    pub fn read_at(&mut self, index: usize, off: u64, buf: &mut [u8]) -> Result<usize, EwfError> {
        self.ensure_open(index)?;
        self.clock += 1;
        let clock = self.clock;
        let slot = &mut self.slots[index];
        let file = slot.file.as_mut().expect("ensure_open just populated this");
        file.seek(SeekFrom::Start(off))
            .map_err(|e| EwfError::io("seek", Some(index), e))?;
        let n = file
            .read(buf)
            .map_err(|e| EwfError::io("read", Some(index), e))?;
        slot.offset = off + n as u64;
        slot.last_used = clock;
        Ok(n)
    }

    pub fn read_exact_at(&mut self, index: usize, off: u64, buf: &mut [u8]) -> Result<(), EwfError> {
        self.ensure_open(index)?;
        self.clock += 1;
        let clock = self.clock;
        let slot = &mut self.slots[index];
        let file = slot.file.as_mut().expect("ensure_open just populated this");
        file.seek(SeekFrom::Start(off))
            .map_err(|e| EwfError::io("seek", Some(index), e))?;
        file.read_exact(buf)
            .map_err(|e| EwfError::io("read", Some(index), e))?;
        slot.offset = off + buf.len() as u64;
        slot.last_used = clock;
        Ok(())
    }

    pub fn write_at(&mut self, index: usize, off: u64, buf: &[u8]) -> Result<usize, EwfError> {
        self.ensure_open(index)?;
        self.clock += 1;
        let clock = self.clock;
        let slot = &mut self.slots[index];
        let file = slot.file.as_mut().expect("ensure_open just populated this");
        file.seek(SeekFrom::Start(off))
            .map_err(|e| EwfError::io("seek", Some(index), e))?;
        file.write_all(buf)
            .map_err(|e| EwfError::io("write", Some(index), e))?;
        slot.offset = off + buf.len() as u64;
        slot.size = slot.size.max(slot.offset);
        slot.last_used = clock;
        Ok(buf.len())
    }

    pub fn size(&self, index: usize) -> Result<u64, EwfError> {
        self.slots
            .get(index)
            .map(|s| s.size)
            .ok_or_else(|| EwfError::InvalidArgument(format!("file pool index {index} unknown")))
    }

    pub fn close(&mut self, index: usize) -> Result<(), EwfError> {
        if let Some(slot) = self.slots.get_mut(index) {
            if let Some(mut file) = slot.file.take() {
                if slot.mode == OpenMode::Write {
                    file.flush().map_err(|e| EwfError::io("close", Some(index), e))?;
                }
            }
        }
        Ok(())
    }

    pub fn close_all(&mut self) -> Result<(), EwfError> {
        for i in 0..self.slots.len() {
            self.close(i)?;
        }
        Ok(())
    }

    pub fn path_of(&self, index: usize) -> Option<&PathBuf> {
        self.slots.get(index).map(|s| &s.path)
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn index_of(&self, path: &PathBuf) -> Option<usize> {
        self.by_path.get(path).copied()
    }
}

impl Drop for FilePool {
    fn drop(&mut self) {
        let _ = self.close_all();
    }
}
