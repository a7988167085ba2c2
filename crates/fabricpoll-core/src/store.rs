//! Key-value store backends for crawled device state
//!
//! The poller only needs get/save/delete of a byte value by string key, plus
//! enumeration of keys under a prefix so that a device's whole namespace can
//! be reclaimed. Two backends are provided:
//! - [`MemoryStore`] keeps everything in a `HashMap` (tests, one-shot runs)
//! - [`DirStore`] keeps one file per key in a directory. File names are the
//!   SHA-256 of the key, so arbitrarily long resource paths fit the file
//!   system's name limit; the key itself is kept in the file's header line.

use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::io::BufRead;
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use thiserror::Error;
use tracing::trace;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("IO error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("store backend error: {0}")]
    Backend(String),
}

fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> StoreError {
    StoreError::Io {
        path: path.into(),
        source,
    }
}

/// Byte-valued key-value store
///
/// `get` distinguishes an absent key (`Ok(None)`) from a failed read
/// (`Err`). Implementations must be safe to share between pollers.
pub trait KvStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError>;

    /// Write `value` under `key`, replacing any previous value
    fn save(&self, key: &str, value: &[u8]) -> Result<(), StoreError>;

    /// Remove `key`; removing an absent key is not an error
    fn delete(&self, key: &str) -> Result<(), StoreError>;

    /// All keys starting with `prefix`, in ascending order
    fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>, StoreError>;
}

/// In-memory store
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, HashMap<String, Vec<u8>>> {
        // A poisoned map still holds consistent entries: every mutation is a
        // single insert or remove.
        self.entries.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<String, Vec<u8>>> {
        self.entries.write().unwrap_or_else(|e| e.into_inner())
    }
}

impl KvStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.read().get(key).cloned())
    }

    fn save(&self, key: &str, value: &[u8]) -> Result<(), StoreError> {
        self.write().insert(key.to_string(), value.to_vec());
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.write().remove(key);
        Ok(())
    }

    fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        let mut keys: Vec<String> = self
            .read()
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect();
        keys.sort();
        Ok(keys)
    }
}

/// Directory-backed store, one file per key
#[derive(Debug, Clone)]
pub struct DirStore {
    /// Directory holding the record files
    pub base_dir: PathBuf,
}

impl DirStore {
    /// Open (creating if needed) a store rooted at `base_dir`
    pub fn open(base_dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let base_dir = base_dir.into();
        std::fs::create_dir_all(&base_dir).map_err(|e| io_err(&base_dir, e))?;
        Ok(Self { base_dir })
    }

    /// File that holds the value of `key`
    pub fn record_path(&self, key: &str) -> PathBuf {
        let digest = Sha256::digest(key.as_bytes());
        self.base_dir.join(format!("{}.rec", hex::encode(digest)))
    }

    /// Key stored in the header of the record at `path`; `None` for files
    /// that are not records or vanished while listing
    fn read_key(path: &Path) -> Result<Option<String>, StoreError> {
        if path.extension().and_then(|ext| ext.to_str()) != Some("rec") {
            return Ok(None);
        }
        let file = match std::fs::File::open(path) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(io_err(path, e)),
        };
        let mut header = Vec::new();
        std::io::BufReader::new(file)
            .read_until(b'\n', &mut header)
            .map_err(|e| io_err(path, e))?;
        Ok(decode_header(&header))
    }
}

/// Record file layout: hex-encoded key, newline, value bytes
fn encode_record(key: &str, value: &[u8]) -> Vec<u8> {
    let mut record = hex::encode(key.as_bytes()).into_bytes();
    record.push(b'\n');
    record.extend_from_slice(value);
    record
}

fn decode_header(header: &[u8]) -> Option<String> {
    let line = header.strip_suffix(b"\n")?;
    String::from_utf8(hex::decode(line).ok()?).ok()
}

/// Split a record file into its key and value
fn decode_record(record: &[u8]) -> Option<(String, &[u8])> {
    let split = record.iter().position(|b| *b == b'\n')?;
    let key = decode_header(&record[..=split])?;
    Some((key, &record[split + 1..]))
}

impl KvStore for DirStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let path = self.record_path(key);
        let record = match std::fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(io_err(path, e)),
        };
        match decode_record(&record) {
            Some((stored, value)) if stored == key => Ok(Some(value.to_vec())),
            Some(_) => Ok(None),
            None => Err(StoreError::Backend(format!(
                "malformed record {}",
                path.display()
            ))),
        }
    }

    fn save(&self, key: &str, value: &[u8]) -> Result<(), StoreError> {
        let path = self.record_path(key);
        let tmp = path.with_extension("rec.tmp");
        std::fs::write(&tmp, encode_record(key, value)).map_err(|e| io_err(&tmp, e))?;
        std::fs::rename(&tmp, &path).map_err(|e| io_err(&path, e))?;
        trace!(key = %key, bytes = value.len(), "Saved record");
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<(), StoreError> {
        let path = self.record_path(key);
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(io_err(path, e)),
        }
    }

    fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        let entries = std::fs::read_dir(&self.base_dir).map_err(|e| io_err(&self.base_dir, e))?;
        let mut keys = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| io_err(&self.base_dir, e))?;
            if let Some(key) = Self::read_key(&entry.path())? {
                if key.starts_with(prefix) {
                    keys.push(key);
                }
            }
        }
        keys.sort();
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn exercise(store: &dyn KvStore) {
        assert_eq!(store.get("/essd/a").unwrap(), None);

        store.save("/essd/a", b"one").unwrap();
        store.save("/essd/a/redfish/v1", b"two").unwrap();
        store.save("/essd/ab/redfish/v1", b"three").unwrap();
        assert_eq!(store.get("/essd/a").unwrap(), Some(b"one".to_vec()));

        store.save("/essd/a", b"uno").unwrap();
        assert_eq!(store.get("/essd/a").unwrap(), Some(b"uno".to_vec()));

        assert_eq!(
            store.keys_with_prefix("/essd/a/").unwrap(),
            vec!["/essd/a/redfish/v1".to_string()]
        );
        assert_eq!(store.keys_with_prefix("/essd/").unwrap().len(), 3);

        store.delete("/essd/a").unwrap();
        store.delete("/essd/a").unwrap();
        assert_eq!(store.get("/essd/a").unwrap(), None);
    }

    #[test]
    fn test_memory_store() {
        let store = MemoryStore::new();
        exercise(&store);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_dir_store() {
        let temp_dir = TempDir::new().unwrap();
        let store = DirStore::open(temp_dir.path().join("records")).unwrap();
        exercise(&store);
    }

    #[test]
    fn test_dir_store_leaves_no_tmp_files() {
        let temp_dir = TempDir::new().unwrap();
        let store = DirStore::open(temp_dir.path()).unwrap();
        store.save("/essd/x", b"value").unwrap();

        let names: Vec<_> = std::fs::read_dir(temp_dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        assert_eq!(names.len(), 1);
        assert!(names[0].ends_with(".rec"));
    }

    #[test]
    fn test_dir_store_survives_reopen() {
        let temp_dir = TempDir::new().unwrap();
        DirStore::open(temp_dir.path())
            .unwrap()
            .save("/essd/uptimes", b"{}")
            .unwrap();

        let reopened = DirStore::open(temp_dir.path()).unwrap();
        assert_eq!(reopened.get("/essd/uptimes").unwrap(), Some(b"{}".to_vec()));
    }

    #[test]
    fn test_dir_store_accepts_keys_longer_than_a_file_name() {
        let temp_dir = TempDir::new().unwrap();
        let store = DirStore::open(temp_dir.path()).unwrap();
        let drive = format!(
            "/essd/92384634-2938-2342-8820-489239905423/redfish/v1/Systems/System.Embedded.1\
             /Storage/RAID.Integrated.1-1/Drives/{}",
            "Disk.Bay.0".repeat(20)
        );
        assert!(drive.len() > 255);

        store.save(&drive, b"{}").unwrap();
        assert_eq!(store.get(&drive).unwrap(), Some(b"{}".to_vec()));
        assert_eq!(
            store
                .keys_with_prefix("/essd/92384634-2938-2342-8820-489239905423/")
                .unwrap(),
            vec![drive.clone()]
        );

        store.delete(&drive).unwrap();
        assert_eq!(store.get(&drive).unwrap(), None);
    }
}
