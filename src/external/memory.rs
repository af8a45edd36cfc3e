use std::collections::HashMap;
use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};

use crate::core::{InfoError, Result};

use super::provider::{FileInfo, StorageProvider, normalize_path};

/// In-process file store; counts writes so callers can observe skipped ones.
#[derive(Debug, Default)]
pub struct MemoryFileStorage {
    files: RwLock<HashMap<String, Arc<Vec<u8>>>>,
    writes: AtomicUsize,
}

impl MemoryFileStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn paths(&self) -> Result<Vec<String>> {
        let mut paths: Vec<String> = self.files.read()?.keys().cloned().collect();
        paths.sort();
        Ok(paths)
    }
}

impl StorageProvider for MemoryFileStorage {
    fn exists(&self, path: &str) -> Result<bool> {
        Ok(self.files.read()?.contains_key(&normalize_path(path)))
    }

    fn read(&self, path: &str) -> Result<Vec<u8>> {
        self.files
            .read()?
            .get(&normalize_path(path))
            .map(|data| data.as_ref().clone())
            .ok_or_else(|| InfoError::ExternalStorage(format!("File '{}' does not exist", path)))
    }

    fn write(&self, path: &str, data: &[u8]) -> Result<()> {
        self.files
            .write()?
            .insert(normalize_path(path), Arc::new(data.to_vec()));
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn delete(&self, path: &str) -> Result<()> {
        self.files.write()?.remove(&normalize_path(path));
        Ok(())
    }

    fn file_info(&self, path: &str) -> Result<FileInfo> {
        let Some(data) = self.files.read()?.get(&normalize_path(path)).cloned() else {
            return Ok(FileInfo::missing(path));
        };
        let length = data.len() as u64;
        Ok(FileInfo::found(path, length, move || {
            Ok(Box::new(Cursor::new(data.as_ref().clone())))
        }))
    }
}
