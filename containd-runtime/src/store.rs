//! Identifier-keyed persistence for container configurations
//!
//! The store is a collaborator of the orchestrator, not part of it: a
//! [`Container`](crate::Container) never touches a store itself, callers
//! look configurations up and save them around runs.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing::debug;

use containd_core::{ContainerConfig, ContainerId, Error, Result};

/// Keyed configuration storage.
///
/// Implementations are free to choose their medium; all of them map a
/// container identifier to the last configuration saved under it.
pub trait ConfigStore: Send + Sync {
    /// Look up the configuration saved under `id`, if any
    fn get(&self, id: &ContainerId) -> Result<Option<ContainerConfig>>;

    /// Save `config` under `id`, replacing any previous entry
    fn put(&self, id: &ContainerId, config: &ContainerConfig) -> Result<()>;

    /// Remove the entry for `id`; removing an absent entry is not an error
    fn remove(&self, id: &ContainerId) -> Result<()>;

    /// Identifiers with a saved configuration, in unspecified order
    fn ids(&self) -> Result<Vec<ContainerId>>;
}

/// Disk-backed store keeping every configuration in one JSON document.
///
/// The whole document is rewritten on each mutation. That is deliberate:
/// the store holds a handful of entries and a full rewrite keeps the file
/// consistent without partial-update bookkeeping.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    /// Store backed by the given file; the file may not exist yet
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Store at the conventional per-user location,
    /// `$HOME/.containd/configs.json`.
    ///
    /// # Errors
    /// Returns [`Error::InvalidConfig`] when `HOME` is unset.
    pub fn default_path() -> Result<Self> {
        let home = std::env::var_os("HOME").ok_or_else(|| Error::InvalidConfig {
            message: "HOME is not set, cannot locate the configuration store".to_string(),
        })?;
        Ok(Self::new(Path::new(&home).join(".containd").join("configs.json")))
    }

    /// Path of the backing file
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<BTreeMap<String, ContainerConfig>> {
        let json = match std::fs::read_to_string(&self.path) {
            Ok(json) => json,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(BTreeMap::new());
            }
            Err(e) => return Err(e.into()),
        };
        serde_json::from_str(&json).map_err(|e| Error::InvalidConfig {
            message: format!(
                "Corrupt configuration store at {}: {e}",
                self.path.display()
            ),
        })
    }

    fn save(&self, entries: &BTreeMap<String, ContainerConfig>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(entries).map_err(|e| Error::InvalidConfig {
            message: format!("Failed to serialize configuration store: {e}"),
        })?;

        // Write the new document beside the old one and rename over it, so
        // a crash mid-write never leaves a half-written store behind
        let staging = self.path.with_extension("json.tmp");
        std::fs::write(&staging, json)?;
        std::fs::rename(&staging, &self.path)?;

        debug!(path = %self.path.display(), entries = entries.len(), "Configuration store saved");
        Ok(())
    }
}

impl ConfigStore for JsonFileStore {
    fn get(&self, id: &ContainerId) -> Result<Option<ContainerConfig>> {
        Ok(self.load()?.remove(id.as_str()))
    }

    fn put(&self, id: &ContainerId, config: &ContainerConfig) -> Result<()> {
        let mut entries = self.load()?;
        entries.insert(id.as_str().to_string(), config.clone());
        self.save(&entries)
    }

    fn remove(&self, id: &ContainerId) -> Result<()> {
        let mut entries = self.load()?;
        if entries.remove(id.as_str()).is_some() {
            self.save(&entries)?;
        }
        Ok(())
    }

    fn ids(&self) -> Result<Vec<ContainerId>> {
        self.load()?
            .into_keys()
            .map(ContainerId::new)
            .collect()
    }
}

/// In-memory store for tests and embedding
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<ContainerId, ContainerConfig>>,
}

impl MemoryStore {
    /// Empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl ConfigStore for MemoryStore {
    fn get(&self, id: &ContainerId) -> Result<Option<ContainerConfig>> {
        Ok(self.entries.lock().unwrap().get(id).cloned())
    }

    fn put(&self, id: &ContainerId, config: &ContainerConfig) -> Result<()> {
        self.entries
            .lock()
            .unwrap()
            .insert(id.clone(), config.clone());
        Ok(())
    }

    fn remove(&self, id: &ContainerId) -> Result<()> {
        self.entries.lock().unwrap().remove(id);
        Ok(())
    }

    fn ids(&self) -> Result<Vec<ContainerId>> {
        Ok(self.entries.lock().unwrap().keys().cloned().collect())
    }
}
