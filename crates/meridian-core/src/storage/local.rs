//! Local durable slots
//!
//! The dataset, a size-capped fallback copy, and the sync credentials each live
//! in their own JSON file under the data directory. Writes are atomic (write to
//! temp file, then rename) so a slot is never left half-written.
//!
//! Files:
//! - `meridian-todo-data.json` - the dataset, limited to `local_capacity_bytes`
//! - `meridian-todo-fallback.json` - degraded copy used when the main write fails
//! - `sync-settings.json` - `{ token, documentId }`

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use super::error::{StorageError, StorageResult};
use crate::config::Config;
use crate::models::{Dataset, SyncCredentials};

/// Size limit of the fallback slot
pub const FALLBACK_CAPACITY: usize = 4_000;

/// Durable key-value persistence on this device
///
/// `load` reports unreadable data as an error; the coordinator treats any
/// load error as "absent" so a bad file never stops startup.
pub trait LocalStore {
    /// Read the dataset, `None` when nothing has been saved
    fn load(&self) -> StorageResult<Option<Dataset>>;

    /// Write the dataset to the primary slot
    fn save(&self, dataset: &Dataset) -> StorageResult<()>;

    /// Write the dataset to the size-capped fallback slot
    fn save_fallback(&self, dataset: &Dataset) -> StorageResult<()>;

    fn load_credentials(&self) -> StorageResult<Option<SyncCredentials>>;

    fn save_credentials(&self, credentials: &SyncCredentials) -> StorageResult<()>;

    fn clear_credentials(&self) -> StorageResult<()>;
}

/// File-backed [`LocalStore`]
#[derive(Debug, Clone)]
pub struct FileStore {
    dataset_path: PathBuf,
    fallback_path: PathBuf,
    credentials_path: PathBuf,
    capacity: usize,
}

impl FileStore {
    /// Create a store using the paths and capacity from the configuration
    pub fn new(config: &Config) -> Self {
        Self {
            dataset_path: config.dataset_path(),
            fallback_path: config.fallback_path(),
            credentials_path: config.credentials_path(),
            capacity: config.local_capacity_bytes,
        }
    }

    /// Override the primary slot's size limit
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    pub fn dataset_path(&self) -> &Path {
        &self.dataset_path
    }

    pub fn fallback_path(&self) -> &Path {
        &self.fallback_path
    }

    /// Check if a dataset has been saved
    pub fn exists(&self) -> bool {
        self.dataset_path.exists()
    }

    /// Size of the saved dataset in bytes
    pub fn dataset_size(&self) -> u64 {
        fs::metadata(&self.dataset_path).map_or(0, |m| m.len())
    }

    fn read_dataset(path: &Path) -> StorageResult<Option<Dataset>> {
        let Some(content) = read_slot(path)? else {
            return Ok(None);
        };

        Dataset::from_json(&content)
            .map(Some)
            .map_err(|e| StorageError::StorageCorrupt {
                path: path.to_path_buf(),
                details: e.to_string(),
            })
    }
}

impl LocalStore for FileStore {
    fn load(&self) -> StorageResult<Option<Dataset>> {
        match Self::read_dataset(&self.dataset_path) {
            Ok(Some(dataset)) => Ok(Some(dataset)),
            Ok(None) => Self::read_dataset(&self.fallback_path),
            Err(e) => match Self::read_dataset(&self.fallback_path) {
                Ok(Some(dataset)) => {
                    warn!("Primary slot unreadable, using fallback copy: {}", e);
                    Ok(Some(dataset))
                }
                _ => Err(e),
            },
        }
    }

    fn save(&self, dataset: &Dataset) -> StorageResult<()> {
        let json = dataset.to_json()?;
        if json.len() > self.capacity {
            return Err(StorageError::StorageFull {
                path: self.dataset_path.clone(),
                size: json.len(),
                capacity: self.capacity,
            });
        }

        atomic_write(&self.dataset_path, json.as_bytes())?;
        debug!("Saved {} bytes to {:?}", json.len(), self.dataset_path);

        // A successful primary write makes any fallback copy stale
        if self.fallback_path.exists() {
            if let Err(e) = fs::remove_file(&self.fallback_path) {
                warn!("Could not remove stale fallback {:?}: {}", self.fallback_path, e);
            }
        }
        Ok(())
    }

    fn save_fallback(&self, dataset: &Dataset) -> StorageResult<()> {
        let json = dataset.to_json()?;
        if json.len() >= FALLBACK_CAPACITY {
            return Err(StorageError::StorageFull {
                path: self.fallback_path.clone(),
                size: json.len(),
                capacity: FALLBACK_CAPACITY,
            });
        }
        atomic_write(&self.fallback_path, json.as_bytes())
    }

    fn load_credentials(&self) -> StorageResult<Option<SyncCredentials>> {
        let Some(content) = read_slot(&self.credentials_path)? else {
            return Ok(None);
        };

        let mut credentials: SyncCredentials =
            serde_json::from_str(&content).map_err(|e| StorageError::StorageCorrupt {
                path: self.credentials_path.clone(),
                details: e.to_string(),
            })?;
        credentials.normalize();
        Ok(Some(credentials))
    }

    fn save_credentials(&self, credentials: &SyncCredentials) -> StorageResult<()> {
        let json = serde_json::to_string(credentials)?;
        atomic_write(&self.credentials_path, json.as_bytes())
    }

    fn clear_credentials(&self) -> StorageResult<()> {
        match fs::remove_file(&self.credentials_path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::from_io(e, self.credentials_path.clone())),
        }
    }
}

/// Read a slot, `None` if the file does not exist
fn read_slot(path: &Path) -> StorageResult<Option<String>> {
    match fs::read_to_string(path) {
        Ok(content) => Ok(Some(content)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) if e.kind() == io::ErrorKind::InvalidData => Err(StorageError::StorageCorrupt {
            path: path.to_path_buf(),
            details: e.to_string(),
        }),
        Err(e) => Err(StorageError::ReadError {
            path: path.to_path_buf(),
            source: e,
        }),
    }
}

/// Write data to a file atomically
///
/// 1. Write to a temporary file in the same directory
/// 2. Sync the file to disk
/// 3. Rename the temp file to the target path
fn atomic_write(path: &Path, data: &[u8]) -> StorageResult<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| StorageError::from_io(e, parent.to_path_buf()))?;
    }

    let temp_path = path.with_extension("tmp");

    let mut file =
        File::create(&temp_path).map_err(|e| StorageError::from_io(e, temp_path.clone()))?;
    file.write_all(data)
        .map_err(|e| StorageError::from_io(e, temp_path.clone()))?;
    file.sync_all()
        .map_err(|e| StorageError::from_io(e, temp_path.clone()))?;

    fs::rename(&temp_path, path).map_err(|source| StorageError::AtomicWriteFailed {
        from: temp_path.clone(),
        to: path.to_path_buf(),
        source,
    })?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::parse_date_key;
    use tempfile::TempDir;

    fn test_store(temp_dir: &TempDir) -> FileStore {
        FileStore::new(&Config::with_data_dir(temp_dir.path()))
    }

    fn sample_dataset() -> Dataset {
        let mut dataset = Dataset::new();
        let d = parse_date_key("2024-05-01").unwrap();
        dataset.add_task(d, "buy milk");
        dataset.add_task(d, "call mom");
        dataset.set_memo(d, "busy day");
        dataset
    }

    #[test]
    fn test_save_and_load() {
        let temp_dir = TempDir::new().unwrap();
        let store = test_store(&temp_dir);

        assert!(!store.exists());
        assert!(store.load().unwrap().is_none());

        let dataset = sample_dataset();
        store.save(&dataset).unwrap();
        assert!(store.exists());
        assert!(store.dataset_size() > 0);

        assert_eq!(store.load().unwrap(), Some(dataset));
    }

    #[test]
    fn test_corrupt_slot_is_reported() {
        let temp_dir = TempDir::new().unwrap();
        let store = test_store(&temp_dir);

        fs::write(store.dataset_path(), "{ not json").unwrap();

        let err = store.load().unwrap_err();
        assert!(matches!(err, StorageError::StorageCorrupt { .. }));
    }

    #[test]
    fn test_out_of_range_task_id_is_corrupt() {
        let temp_dir = TempDir::new().unwrap();
        let store = test_store(&temp_dir);

        fs::write(
            store.dataset_path(),
            r#"{"tasks":{"2024-05-01":[{"id":18446744073709551615,"text":"a","completed":false}]},"taskIdCounter":1}"#,
        )
        .unwrap();

        let err = store.load().unwrap_err();
        assert!(matches!(err, StorageError::StorageCorrupt { .. }));
    }

    #[test]
    fn test_over_capacity_write_is_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let store = test_store(&temp_dir).with_capacity(16);

        let err = store.save(&sample_dataset()).unwrap_err();
        assert!(matches!(err, StorageError::StorageFull { capacity: 16, .. }));
        assert!(!store.exists());
    }

    #[test]
    fn test_fallback_used_when_primary_missing() {
        let temp_dir = TempDir::new().unwrap();
        let store = test_store(&temp_dir);
        let dataset = sample_dataset();

        store.save_fallback(&dataset).unwrap();
        assert!(!store.exists());
        assert_eq!(store.load().unwrap(), Some(dataset));
    }

    #[test]
    fn test_fallback_used_when_primary_corrupt() {
        let temp_dir = TempDir::new().unwrap();
        let store = test_store(&temp_dir);
        let dataset = sample_dataset();

        store.save_fallback(&dataset).unwrap();
        fs::write(store.dataset_path(), "garbage").unwrap();
        assert_eq!(store.load().unwrap(), Some(dataset));
    }

    #[test]
    fn test_fallback_is_size_capped() {
        let temp_dir = TempDir::new().unwrap();
        let store = test_store(&temp_dir);

        let mut dataset = Dataset::new();
        let d = parse_date_key("2024-05-01").unwrap();
        dataset.set_memo(d, &"x".repeat(FALLBACK_CAPACITY));

        let err = store.save_fallback(&dataset).unwrap_err();
        assert!(matches!(err, StorageError::StorageFull { .. }));
        assert!(!store.fallback_path().exists());
    }

    #[test]
    fn test_primary_save_removes_stale_fallback() {
        let temp_dir = TempDir::new().unwrap();
        let store = test_store(&temp_dir);

        store.save_fallback(&Dataset::new()).unwrap();
        store.save(&sample_dataset()).unwrap();
        assert!(!store.fallback_path().exists());
    }

    #[test]
    fn test_credentials_roundtrip_and_clear() {
        let temp_dir = TempDir::new().unwrap();
        let store = test_store(&temp_dir);

        assert!(store.load_credentials().unwrap().is_none());

        let credentials = SyncCredentials::new("ghp_token", Some("abc123".to_string()));
        store.save_credentials(&credentials).unwrap();
        assert_eq!(store.load_credentials().unwrap(), Some(credentials));

        // Credentials are independent of the dataset slot
        assert!(!store.exists());

        store.clear_credentials().unwrap();
        assert!(store.load_credentials().unwrap().is_none());
        store.clear_credentials().unwrap();
    }

    #[test]
    fn test_empty_document_id_reads_as_unknown() {
        let temp_dir = TempDir::new().unwrap();
        let store = test_store(&temp_dir);

        fs::write(
            temp_dir.path().join("sync-settings.json"),
            r#"{"token":"t","documentId":""}"#,
        )
        .unwrap();

        let credentials = store.load_credentials().unwrap().unwrap();
        assert_eq!(credentials.token, "t");
        assert!(credentials.document_id.is_none());
    }

    #[test]
    fn test_atomic_write_creates_parent_dirs() {
        let temp_dir = TempDir::new().unwrap();
        let nested_path = temp_dir.path().join("a").join("b").join("file.json");

        atomic_write(&nested_path, b"{}").unwrap();

        assert_eq!(fs::read_to_string(&nested_path).unwrap(), "{}");
    }
}
