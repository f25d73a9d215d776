//! Settings-file adapter.
//!
//! Implements [`SettingsFile`] over a JSON document on the flash
//! filesystem (SPIFFS on target). The store layer owns the JSON shape
//! and the diff-aware save; this adapter only moves whole documents in
//! and out.

use std::io::Write as _;
use std::path::{Path, PathBuf};

use crate::error::StorageError;

/// Whole-document settings persistence. The trait seam exists so tests
/// can count writes and inject failures.
pub trait SettingsFile: Send {
    fn read(&self) -> Result<String, StorageError>;
    fn write(&mut self, contents: &str) -> Result<(), StorageError>;
    fn exists(&self) -> bool;
}

/// Settings document location on the SPIFFS data partition.
pub const SETTINGS_PATH: &str = "/spiffs/config.json";

pub struct FsSettingsFile {
    path: PathBuf,
}

impl FsSettingsFile {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }
}

impl SettingsFile for FsSettingsFile {
    fn read(&self) -> Result<String, StorageError> {
        std::fs::read_to_string(&self.path)
            .map_err(|e| StorageError::OpenFailed(format!("{}: {e}", self.path.display())))
    }

    fn write(&mut self, contents: &str) -> Result<(), StorageError> {
        let map_err = |e: std::io::Error| {
            StorageError::WriteFailed(format!("{}: {e}", self.path.display()))
        };
        let mut file = std::fs::File::create(&self.path).map_err(map_err)?;
        file.write_all(contents.as_bytes()).map_err(map_err)?;
        file.flush().map_err(map_err)
    }

    fn exists(&self) -> bool {
        self.path.exists()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(tag: &str) -> PathBuf {
        std::env::temp_dir().join(format!("enginefan-fs-{tag}-{}.json", std::process::id()))
    }

    #[test]
    fn write_then_read_round_trips() {
        let path = temp_path("roundtrip");
        let mut file = FsSettingsFile::new(&path);
        assert!(!file.exists());

        file.write(r#"{"hostname":"fan"}"#).unwrap();
        assert!(file.exists());
        assert_eq!(file.read().unwrap(), r#"{"hostname":"fan"}"#);

        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn missing_file_is_open_failed() {
        let file = FsSettingsFile::new(temp_path("missing"));
        assert!(matches!(file.read(), Err(StorageError::OpenFailed(_))));
    }
}
