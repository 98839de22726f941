use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use super::KeyValueStore;
use crate::error::{SealError, SealResult};
use crate::utils::write_atomic;

type Entries = BTreeMap<String, String>;

/// [`KeyValueStore`] keeping one JSON document per namespace under a root
/// directory (`<root>/<namespace>.json`).
///
/// Writes replace the whole document atomically. A process-local mutex
/// serializes read-modify-write cycles; the store is not meant to be shared
/// between processes.
#[derive(Debug)]
pub struct FileKeyValueStore {
    root: PathBuf,
    write_lock: Mutex<()>,
}

impl FileKeyValueStore {
    /// Opens a store rooted at `root`, creating the directory if needed.
    ///
    /// # Errors
    ///
    /// Returns [`SealError::Persistence`] if the directory cannot be created.
    pub fn new(root: impl Into<PathBuf>) -> SealResult<Self> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|err| {
            SealError::persistence(format_args!("failed to create {}: {err}", root.display()))
        })?;
        Ok(Self {
            root,
            write_lock: Mutex::new(()),
        })
    }

    /// The root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn namespace_path(&self, namespace: &str) -> SealResult<PathBuf> {
        let valid = !namespace.is_empty()
            && namespace
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
            && !namespace.starts_with('.');
        if !valid {
            return Err(SealError::persistence(format_args!(
                "invalid namespace `{namespace}`"
            )));
        }
        Ok(self.root.join(format!("{namespace}.json")))
    }

    fn read(&self, namespace: &str) -> SealResult<Entries> {
        let path = self.namespace_path(namespace)?;
        match fs::read(&path) {
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(|err| {
                SealError::persistence(format_args!("failed to parse {}: {err}", path.display()))
            }),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(Entries::new()),
            Err(err) => Err(SealError::persistence(format_args!(
                "failed to read {}: {err}",
                path.display()
            ))),
        }
    }

    fn write(&self, namespace: &str, entries: &Entries) -> SealResult<()> {
        let path = self.namespace_path(namespace)?;
        let bytes = serde_json::to_vec_pretty(entries)?;
        write_atomic(&path, &bytes).map_err(|err| {
            SealError::persistence(format_args!("failed to write {}: {err}", path.display()))
        })
    }

    fn update(&self, namespace: &str, apply: impl FnOnce(&mut Entries)) -> SealResult<()> {
        let _guard = self
            .write_lock
            .lock()
            .map_err(|_| SealError::Persistence("file store lock poisoned".to_string()))?;
        let mut entries = self.read(namespace)?;
        apply(&mut entries);
        self.write(namespace, &entries)
    }
}

impl KeyValueStore for FileKeyValueStore {
    fn get(&self, namespace: &str, key: &str) -> SealResult<Option<String>> {
        Ok(self.read(namespace)?.remove(key))
    }

    fn set(&self, namespace: &str, key: &str, value: &str) -> SealResult<()> {
        self.update(namespace, |entries| {
            entries.insert(key.to_string(), value.to_string());
        })
    }

    fn remove(&self, namespace: &str, key: &str) -> SealResult<()> {
        self.update(namespace, |entries| {
            entries.remove(key);
        })
    }

    fn clear_all(&self, namespace: &str) -> SealResult<()> {
        let path = self.namespace_path(namespace)?;
        let _guard = self
            .write_lock
            .lock()
            .map_err(|_| SealError::Persistence("file store lock poisoned".to_string()))?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(SealError::persistence(format_args!(
                "failed to remove {}: {err}",
                path.display()
            ))),
        }
    }
}
