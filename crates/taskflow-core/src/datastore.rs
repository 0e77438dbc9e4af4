use std::collections::BTreeMap;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, anyhow};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

pub const TASKS_KEY: &str = "tasks";
pub const CATEGORIES_KEY: &str = "categories";

/// Durable byte storage addressed by a fixed set of keys.
pub trait KeyValueStore {
    fn get(&self, key: &str) -> anyhow::Result<Option<Vec<u8>>>;

    fn set(&mut self, key: &str, value: &[u8]) -> anyhow::Result<()>;

    /// Removing an absent key is not an error.
    fn remove(&mut self, key: &str) -> anyhow::Result<()>;
}

/// One `<key>.json` file per key inside a data directory.
#[derive(Debug)]
pub struct FileStore {
    pub data_dir: PathBuf,
}

impl FileStore {
    #[tracing::instrument(skip(data_dir))]
    pub fn open(data_dir: &Path) -> anyhow::Result<Self> {
        let data_dir = data_dir.to_path_buf();
        fs::create_dir_all(&data_dir)
            .with_context(|| format!("failed to create {}", data_dir.display()))?;

        info!(data_dir = %data_dir.display(), "opened file store");
        Ok(Self { data_dir })
    }

    pub fn path_for(&self, key: &str) -> PathBuf {
        self.data_dir.join(format!("{key}.json"))
    }
}

impl KeyValueStore for FileStore {
    #[tracing::instrument(skip(self))]
    fn get(&self, key: &str) -> anyhow::Result<Option<Vec<u8>>> {
        let path = self.path_for(key);
        match fs::read(&path) {
            Ok(bytes) => {
                debug!(file = %path.display(), len = bytes.len(), "read key");
                Ok(Some(bytes))
            }
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err).with_context(|| format!("failed reading {}", path.display())),
        }
    }

    #[tracing::instrument(skip(self, value), fields(len = value.len()))]
    fn set(&mut self, key: &str, value: &[u8]) -> anyhow::Result<()> {
        let path = self.path_for(key);
        write_atomic(&path, value)
    }

    #[tracing::instrument(skip(self))]
    fn remove(&mut self, key: &str) -> anyhow::Result<()> {
        let path = self.path_for(key);
        match fs::remove_file(&path) {
            Ok(()) => {
                debug!(file = %path.display(), "removed key");
                Ok(())
            }
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err).with_context(|| format!("failed removing {}", path.display())),
        }
    }
}

/// In-process storage for tests and embedding.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    entries: BTreeMap<String, Vec<u8>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> anyhow::Result<Option<Vec<u8>>> {
        Ok(self.entries.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &[u8]) -> anyhow::Result<()> {
        self.entries.insert(key.to_string(), value.to_vec());
        Ok(())
    }

    fn remove(&mut self, key: &str) -> anyhow::Result<()> {
        self.entries.remove(key);
        Ok(())
    }
}

/// Loads a JSON array stored under `key`. Missing, unreadable or corrupt
/// data all come back as an empty collection.
#[tracing::instrument(skip(store))]
pub fn load_collection<T, S>(store: &S, key: &str) -> Vec<T>
where
    T: DeserializeOwned,
    S: KeyValueStore + ?Sized,
{
    let bytes = match store.get(key) {
        Ok(Some(bytes)) => bytes,
        Ok(None) => {
            debug!(key, "no stored data; starting empty");
            return Vec::new();
        }
        Err(err) => {
            warn!(key, error = %format!("{err:#}"), "failed reading stored data; starting empty");
            return Vec::new();
        }
    };

    match serde_json::from_slice::<Option<Vec<T>>>(&bytes) {
        Ok(items) => {
            let items = items.unwrap_or_default();
            debug!(key, count = items.len(), "loaded collection");
            items
        }
        Err(err) => {
            warn!(key, error = %err, "stored data is corrupt; starting empty");
            Vec::new()
        }
    }
}

#[tracing::instrument(skip(store, items), fields(count = items.len()))]
pub fn save_collection<T, S>(store: &mut S, key: &str, items: &[T]) -> anyhow::Result<()>
where
    T: Serialize,
    S: KeyValueStore + ?Sized,
{
    let bytes = serde_json::to_vec(items).with_context(|| format!("failed encoding {key}"))?;
    store
        .set(key, &bytes)
        .with_context(|| format!("failed to save {key}"))
}

#[tracing::instrument(skip(path, bytes))]
pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> anyhow::Result<()> {
    debug!(file = %path.display(), len = bytes.len(), "writing atomically");

    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut temp = NamedTempFile::new_in(dir)?;
    temp.write_all(bytes)?;
    temp.flush()?;

    temp.persist(path)
        .map_err(|err| anyhow!("failed to persist {}: {}", path.display(), err))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;

    #[test]
    fn file_store_roundtrips_and_removes_keys() {
        let temp = tempdir().expect("tempdir");
        let mut store = FileStore::open(temp.path()).expect("open store");

        assert_eq!(store.get(TASKS_KEY).expect("get"), None);

        store.set(TASKS_KEY, b"[1,2,3]").expect("set");
        assert!(store.path_for(TASKS_KEY).exists());
        assert_eq!(
            store.get(TASKS_KEY).expect("get"),
            Some(b"[1,2,3]".to_vec())
        );

        store.remove(TASKS_KEY).expect("remove");
        store.remove(TASKS_KEY).expect("remove twice");
        assert_eq!(store.get(TASKS_KEY).expect("get"), None);
    }

    #[test]
    fn corrupt_or_null_collections_load_empty() {
        let mut store = MemoryStore::new();

        store.set(TASKS_KEY, b"{not json").expect("set");
        assert!(load_collection::<u32, _>(&store, TASKS_KEY).is_empty());

        store.set(TASKS_KEY, b"null").expect("set");
        assert!(load_collection::<u32, _>(&store, TASKS_KEY).is_empty());

        store.set(TASKS_KEY, b"[4,5]").expect("set");
        assert_eq!(load_collection::<u32, _>(&store, TASKS_KEY), vec![4, 5]);
    }

    #[test]
    fn save_collection_writes_a_json_array() {
        let mut store = MemoryStore::new();
        save_collection(&mut store, CATEGORIES_KEY, &["a", "b"]).expect("save");
        assert_eq!(
            store.get(CATEGORIES_KEY).expect("get"),
            Some(br#"["a","b"]"#.to_vec())
        );
    }
}
