use std::fs::{self, File};
use std::io::Write;
use std::path::{Component, Path, PathBuf};

use tempfile::NamedTempFile;

use crate::core::{InfoError, Result};

use super::provider::{FileInfo, StorageProvider, normalize_path};

/// File store rooted at a local directory.
///
/// Writes go to a temporary file in the target directory which is then
/// renamed over the destination.
#[derive(Debug, Clone)]
pub struct LocalFileStorage {
    root: PathBuf,
}

impl LocalFileStorage {
    pub fn new<P: AsRef<Path>>(root: P) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root).map_err(|e| {
            InfoError::ExternalStorage(format!(
                "Failed to create storage root {}: {}",
                root.display(),
                e
            ))
        })?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, path: &str) -> Result<PathBuf> {
        let relative = PathBuf::from(normalize_path(path));
        if relative.as_os_str().is_empty()
            || relative
                .components()
                .any(|c| !matches!(c, Component::Normal(_)))
        {
            return Err(InfoError::ExternalStorage(format!(
                "Invalid storage path '{}'",
                path
            )));
        }
        Ok(self.root.join(relative))
    }
}

impl StorageProvider for LocalFileStorage {
    fn exists(&self, path: &str) -> Result<bool> {
        Ok(self.resolve(path)?.is_file())
    }

    fn read(&self, path: &str) -> Result<Vec<u8>> {
        Ok(fs::read(self.resolve(path)?)?)
    }

    fn write(&self, path: &str, data: &[u8]) -> Result<()> {
        let target = self.resolve(path)?;
        let dir = target.parent().unwrap_or(&self.root);
        fs::create_dir_all(dir)?;

        let mut temp = NamedTempFile::new_in(dir)?;
        temp.write_all(data)?;
        temp.as_file().sync_all()?;
        temp.persist(&target).map_err(|e| {
            InfoError::ExternalStorage(format!(
                "Failed to move file into place at {}: {}",
                target.display(),
                e
            ))
        })?;
        Ok(())
    }

    fn delete(&self, path: &str) -> Result<()> {
        let target = self.resolve(path)?;
        if target.is_file() {
            fs::remove_file(target)?;
        }
        Ok(())
    }

    fn file_info(&self, path: &str) -> Result<FileInfo> {
        let target = self.resolve(path)?;
        match fs::metadata(&target) {
            Ok(meta) if meta.is_file() => Ok(FileInfo::found(path, meta.len(), move || {
                Ok(Box::new(File::open(&target)?))
            })),
            _ => Ok(FileInfo::missing(path)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_local_round_trip() {
        let dir = tempdir().unwrap();
        let storage = LocalFileStorage::new(dir.path()).unwrap();

        storage.write("templates/home.html", b"<p>").unwrap();
        assert!(storage.exists("/templates/home.html").unwrap());
        assert_eq!(storage.read("templates/home.html").unwrap(), b"<p>");
        assert_eq!(storage.file_info("templates/home.html").unwrap().length, 3);

        storage.delete("templates/home.html").unwrap();
        storage.delete("templates/home.html").unwrap();
        assert!(!storage.file_info("templates/home.html").unwrap().exists);
    }

    #[test]
    fn test_parent_segments_rejected() {
        let dir = tempdir().unwrap();
        let storage = LocalFileStorage::new(dir.path()).unwrap();
        assert!(storage.write("../escape.txt", b"x").is_err());
    }
}
