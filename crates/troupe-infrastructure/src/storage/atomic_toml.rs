//! Atomic TOML file operations.
//!
//! Checkpoint durability rests on this layer: writes go to a temporary
//! file in the same directory, are fsynced, and land via atomic
//! rename. A checkpoint write additionally refuses to replace an
//! existing file, making written checkpoints immutable.

use serde::{Serialize, de::DeserializeOwned};
use std::fs::{self, File, OpenOptions};
use std::io::Write as IoWrite;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use troupe_core::{Result, TroupeError};

/// A handle to a TOML file with atomic write semantics.
///
/// - **Atomicity**: updates are all-or-nothing via tmp file + rename
/// - **Isolation**: an advisory file lock serializes writers
/// - **Durability**: explicit fsync before rename
pub struct AtomicTomlFile<T> {
    path: PathBuf,
    _phantom: PhantomData<T>,
}

impl<T> AtomicTomlFile<T>
where
    T: Serialize + DeserializeOwned,
{
    /// Creates a new handle for the given path.
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            _phantom: PhantomData,
        }
    }

    /// The path this handle points at.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads and deserializes the file.
    ///
    /// # Returns
    ///
    /// - `Ok(Some(T))`: successfully loaded
    /// - `Ok(None)`: file doesn't exist or is empty
    /// - `Err`: failed to read or parse
    pub fn load(&self) -> Result<Option<T>> {
        if !self.path.exists() {
            return Ok(None);
        }

        let content = fs::read_to_string(&self.path)?;
        if content.trim().is_empty() {
            return Ok(None);
        }

        let data: T = toml::from_str(&content)?;
        Ok(Some(data))
    }

    /// Saves data atomically, replacing any existing file.
    pub fn save(&self, data: &T) -> Result<()> {
        let _lock = FileLock::acquire(&self.path)?;
        let tmp_path = self.write_tmp(data)?;
        fs::rename(&tmp_path, &self.path)?;
        Ok(())
    }

    /// Saves data atomically, failing if the file already exists.
    ///
    /// # Errors
    ///
    /// Returns `PersistenceFailure` if the destination exists.
    pub fn save_new(&self, data: &T) -> Result<()> {
        let _lock = FileLock::acquire(&self.path)?;
        if self.path.exists() {
            return Err(TroupeError::persistence(format!(
                "Refusing to overwrite existing file: {:?}",
                self.path
            )));
        }
        let tmp_path = self.write_tmp(data)?;
        fs::rename(&tmp_path, &self.path)?;
        Ok(())
    }

    /// Serializes `data` into a temporary sibling file and fsyncs it.
    fn write_tmp(&self, data: &T) -> Result<PathBuf> {
        let parent = self.path.parent().ok_or_else(|| {
            TroupeError::io(format!("Path has no parent directory: {:?}", self.path))
        })?;
        if !parent.exists() {
            fs::create_dir_all(parent)?;
        }

        let toml_string = toml::to_string_pretty(data)?;

        let file_name = self
            .path
            .file_name()
            .ok_or_else(|| TroupeError::io(format!("Path has no file name: {:?}", self.path)))?;
        let tmp_path = parent.join(format!(".{}.tmp", file_name.to_string_lossy()));

        let mut tmp_file = File::create(&tmp_path)?;
        tmp_file.write_all(toml_string.as_bytes())?;
        tmp_file.sync_all()?;
        drop(tmp_file);

        Ok(tmp_path)
    }
}

/// An advisory lock guard released on drop.
struct FileLock {
    #[allow(dead_code)]
    file: File,
    lock_path: PathBuf,
}

impl FileLock {
    fn acquire(path: &Path) -> Result<Self> {
        let lock_path = path.with_extension("lock");

        if let Some(parent) = lock_path.parent()
            && !parent.exists()
        {
            fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(&lock_path)?;

        #[cfg(unix)]
        {
            use fs2::FileExt;
            file.lock_exclusive()
                .map_err(|e| TroupeError::io(format!("Failed to acquire lock: {e}")))?;
        }

        Ok(FileLock { file, lock_path })
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        // Unlock is automatic when the handle drops; removing the lock
        // file is best effort.
        let _ = fs::remove_file(&self.lock_path);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use tempfile::TempDir;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct TestRecord {
        name: String,
        count: u32,
    }

    #[test]
    fn test_save_and_load() {
        let temp_dir = TempDir::new().unwrap();
        let file = AtomicTomlFile::<TestRecord>::new(temp_dir.path().join("test.toml"));

        let record = TestRecord {
            name: "test".to_string(),
            count: 42,
        };
        file.save(&record).unwrap();

        let loaded = file.load().unwrap().unwrap();
        assert_eq!(loaded, record);
    }

    #[test]
    fn test_load_nonexistent_file() {
        let temp_dir = TempDir::new().unwrap();
        let file = AtomicTomlFile::<TestRecord>::new(temp_dir.path().join("missing.toml"));
        assert!(file.load().unwrap().is_none());
    }

    #[test]
    fn test_save_new_refuses_overwrite() {
        let temp_dir = TempDir::new().unwrap();
        let file = AtomicTomlFile::<TestRecord>::new(temp_dir.path().join("once.toml"));

        let record = TestRecord {
            name: "first".to_string(),
            count: 1,
        };
        file.save_new(&record).unwrap();

        let err = file
            .save_new(&TestRecord {
                name: "second".to_string(),
                count: 2,
            })
            .unwrap_err();
        assert_eq!(err.kind(), "persistence_failure");

        // The original content survived.
        assert_eq!(file.load().unwrap().unwrap().name, "first");
    }

    #[test]
    fn test_no_temp_file_left_behind() {
        let temp_dir = TempDir::new().unwrap();
        let file = AtomicTomlFile::<TestRecord>::new(temp_dir.path().join("test.toml"));
        file.save(&TestRecord {
            name: "x".to_string(),
            count: 0,
        })
        .unwrap();

        assert!(!temp_dir.path().join(".test.toml.tmp").exists());
        assert!(temp_dir.path().join("test.toml").exists());
    }
}
