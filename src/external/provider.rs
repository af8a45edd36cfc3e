use std::fmt;
use std::io::Read;

use crate::core::Result;

type Opener = Box<dyn Fn() -> Result<Box<dyn Read + Send>> + Send + Sync>;

/// Metadata of a stored file plus a way to stream its content.
pub struct FileInfo {
    pub path: String,
    pub exists: bool,
    pub length: u64,
    opener: Option<Opener>,
}

impl FileInfo {
    pub fn missing(path: &str) -> Self {
        Self {
            path: path.to_string(),
            exists: false,
            length: 0,
            opener: None,
        }
    }

    pub fn found<F>(path: &str, length: u64, opener: F) -> Self
    where
        F: Fn() -> Result<Box<dyn Read + Send>> + Send + Sync + 'static,
    {
        Self {
            path: path.to_string(),
            exists: true,
            length,
            opener: Some(Box::new(opener)),
        }
    }

    pub fn open_read(&self) -> Result<Box<dyn Read + Send>> {
        match &self.opener {
            Some(open) => open(),
            None => Err(crate::core::InfoError::ExternalStorage(format!(
                "File '{}' does not exist",
                self.path
            ))),
        }
    }

    /// Reads the whole file.
    pub fn read_all(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::with_capacity(self.length as usize);
        self.open_read()?.read_to_end(&mut buf)?;
        Ok(buf)
    }
}

impl fmt::Debug for FileInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileInfo")
            .field("path", &self.path)
            .field("exists", &self.exists)
            .field("length", &self.length)
            .finish()
    }
}

/// File store behind externally stored columns.
///
/// Paths are '/'-separated and relative to the provider's root.
pub trait StorageProvider: Send + Sync {
    fn exists(&self, path: &str) -> Result<bool>;

    fn read(&self, path: &str) -> Result<Vec<u8>>;

    fn write(&self, path: &str, data: &[u8]) -> Result<()>;

    /// Removes the file; a missing file is not an error.
    fn delete(&self, path: &str) -> Result<()>;

    fn file_info(&self, path: &str) -> Result<FileInfo>;
}

/// Canonical relative form: forward slashes, no leading slash, no empty segments.
pub fn normalize_path(path: &str) -> String {
    path.replace('\\', "/")
        .split('/')
        .filter(|segment| !segment.is_empty() && *segment != ".")
        .collect::<Vec<_>>()
        .join("/")
}
