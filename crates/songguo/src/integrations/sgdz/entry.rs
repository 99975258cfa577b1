//! Configured entries and their persistence.
//!
//! An entry is created once by the setup flow and never edited afterward. All
//! entries live in a single JSON file; the store is rewritten atomically on
//! every save.

use std::collections::HashSet;
use std::fmt;
use std::io::Write;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;

use serde::Deserialize;
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::info;

use super::switch::ComputerSwitch;
use super::vendor::Credentials;
use super::vendor::VendorApi;
use super::DOMAIN;
use crate::engine::Entity;

const STORE_VERSION: u32 = 1;

/// Durable data of an entry, keyed the way the vendor names its fields.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryData {
    #[serde(rename = "sgdz_account")]
    pub account: String,

    #[serde(rename = "sgdz_password")]
    pub password: String,

    pub device_name: String,
}

impl EntryData {
    pub fn credentials(&self) -> Credentials {
        Credentials::new(&self.account, &self.password)
    }

    /// Identifier shared by the entry and its switch
    pub fn unique_id(&self) -> String {
        unique_id(&self.account, &self.device_name)
    }
}

impl fmt::Debug for EntryData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntryData")
            .field("account", &self.account)
            .field("password", &"<redacted>")
            .field("device_name", &self.device_name)
            .finish()
    }
}

pub fn unique_id(account: &str, device_name: &str) -> String {
    format!("{}_{}_{}", DOMAIN, account, device_name)
}

/// Lowercase `s` and replace every non-alphanumeric character with `_`.
pub fn slugify(s: &str) -> String {
    s.chars()
        .flat_map(char::to_lowercase)
        .map(|c| if c.is_alphanumeric() { c } else { '_' })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigEntry {
    pub entry_id: String,
    pub domain: String,
    pub version: u32,
    pub title: String,
    pub data: EntryData,
}

impl ConfigEntry {
    pub fn new(title: String, data: EntryData) -> Self {
        Self {
            entry_id: slugify(&format!("{}_{}", data.account, data.device_name)),
            domain: DOMAIN.to_string(),
            version: 1,
            title,
            data,
        }
    }

    pub fn unique_id(&self) -> String {
        self.data.unique_id()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Failed to read entry store {0}: {1}")]
    Read(PathBuf, #[source] std::io::Error),

    #[error("Failed to write entry store {0}: {1}")]
    Write(PathBuf, #[source] std::io::Error),

    #[error("Entry store {0} is corrupt: {1}")]
    Corrupt(PathBuf, #[source] serde_json::Error),

    #[error("Unsupported entry store version {0}")]
    UnsupportedVersion(u32),

    #[error("An entry for {0} is already configured")]
    AlreadyConfigured(String),

    #[error("Entry store {0} lists entry id {1} more than once")]
    DuplicateEntryId(PathBuf, String),
}

#[derive(Serialize, Deserialize)]
struct StoreFile {
    version: u32,
    entries: Vec<ConfigEntry>,
}

/// Entries persisted in a JSON file
#[derive(Debug)]
pub struct EntryStore {
    path: PathBuf,
    entries: Vec<ConfigEntry>,
}

impl EntryStore {
    /// An empty store that will be written to `path`
    pub fn empty(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            entries: Vec::new(),
        }
    }

    /// Load the store, treating a missing file as an empty store
    pub fn load(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        let contents = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(Self::empty(path));
            }
            Err(e) => return Err(StoreError::Read(path.to_path_buf(), e)),
        };

        let file: StoreFile = serde_json::from_str(&contents)
            .map_err(|e| StoreError::Corrupt(path.to_path_buf(), e))?;
        if file.version != STORE_VERSION {
            return Err(StoreError::UnsupportedVersion(file.version));
        }

        let mut seen = HashSet::new();
        for entry in &file.entries {
            if !seen.insert(entry.entry_id.as_str()) {
                return Err(StoreError::DuplicateEntryId(
                    path.to_path_buf(),
                    entry.entry_id.clone(),
                ));
            }
        }

        Ok(Self {
            path: path.to_path_buf(),
            entries: file.entries,
        })
    }

    /// Write the store next to its final location, then rename it into place
    pub fn save(&self) -> Result<(), StoreError> {
        let write_err = |e| StoreError::Write(self.path.clone(), e);

        let file = StoreFile {
            version: STORE_VERSION,
            entries: self.entries.clone(),
        };
        let json = serde_json::to_string_pretty(&file)
            .map_err(|e| StoreError::Corrupt(self.path.clone(), e))?;

        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        let mut f = std::fs::File::create(&tmp).map_err(write_err)?;
        f.write_all(json.as_bytes()).map_err(write_err)?;
        f.sync_all().map_err(write_err)?;
        std::fs::rename(&tmp, &self.path).map_err(write_err)?;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Add an entry, rejecting a second entry for the same account and device.
    ///
    /// Distinct devices can slug to the same entry id; later ones get a
    /// numeric suffix. Returns the entry id actually stored.
    pub fn add(&mut self, mut entry: ConfigEntry) -> Result<String, StoreError> {
        let unique_id = entry.unique_id();
        if self.entries.iter().any(|e| e.unique_id() == unique_id) {
            return Err(StoreError::AlreadyConfigured(unique_id));
        }

        let base = entry.entry_id.clone();
        let mut n = 2;
        while self.entries.iter().any(|e| e.entry_id == entry.entry_id) {
            entry.entry_id = format!("{}_{}", base, n);
            n += 1;
        }

        let entry_id = entry.entry_id.clone();
        self.entries.push(entry);
        Ok(entry_id)
    }

    pub fn remove(&mut self, entry_id: &str) -> Option<ConfigEntry> {
        let idx = self.entries.iter().position(|e| e.entry_id == entry_id)?;
        Some(self.entries.remove(idx))
    }

    pub fn entries(&self) -> &[ConfigEntry] {
        &self.entries
    }

    pub fn unique_ids(&self) -> impl Iterator<Item = String> + '_ {
        self.entries.iter().map(ConfigEntry::unique_id)
    }
}

/// Runtime context owned by one set-up entry
pub struct EntryContext {
    pub entry_id: String,
    pub switch: Arc<Mutex<ComputerSwitch>>,
}

/// Create the switch for an entry
pub fn setup_entry(entry: &ConfigEntry, api: Arc<dyn VendorApi>) -> EntryContext {
    let switch = ComputerSwitch::new(api, entry);
    info!(
        "[{}] Set up {} for device {}",
        entry.entry_id,
        switch.entity_id(),
        entry.data.device_name
    );

    EntryContext {
        entry_id: entry.entry_id.clone(),
        switch: Arc::new(Mutex::new(switch)),
    }
}

/// Tear down an entry's runtime context
pub fn unload_entry(ctx: EntryContext) -> bool {
    info!("[{}] Unloaded", ctx.entry_id);
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::integrations::sgdz::vendor::MockVendorApi;

    fn data(account: &str, device_name: &str) -> EntryData {
        EntryData {
            account: account.to_string(),
            password: "secret".to_string(),
            device_name: device_name.to_string(),
        }
    }

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("Office PC"), "office_pc");
        assert_eq!(slugify("pc-1"), "pc_1");
        assert_eq!(slugify("书房电脑"), "书房电脑");
    }

    #[test]
    fn test_entry_identifiers() {
        let entry = ConfigEntry::new("Office PC".to_string(), data("alice", "Office PC"));
        assert_eq!(entry.entry_id, "alice_office_pc");
        assert_eq!(entry.domain, "sgdz_computer");
        assert_eq!(entry.unique_id(), "sgdz_computer_alice_Office PC");
    }

    #[test]
    fn test_entry_data_serialization_uses_vendor_keys() {
        let json = serde_json::to_value(data("alice", "PC1")).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "sgdz_account": "alice",
                "sgdz_password": "secret",
                "device_name": "PC1",
            })
        );
    }

    #[test]
    fn test_entry_data_debug_hides_password() {
        let debug = format!("{:?}", data("alice", "PC1"));
        assert!(!debug.contains("secret"));
    }

    #[test]
    fn test_load_missing_store_is_empty() {
        let dir = tempfile::TempDir::new().unwrap();
        let store = EntryStore::load(dir.path().join("entries.json")).unwrap();
        assert!(store.entries().is_empty());
    }

    #[test]
    fn test_store_round_trip() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("entries.json");

        let mut store = EntryStore::load(&path).unwrap();
        store
            .add(ConfigEntry::new("PC1".to_string(), data("alice", "PC1")))
            .unwrap();
        store
            .add(ConfigEntry::new("PC2".to_string(), data("alice", "PC2")))
            .unwrap();
        store.save().unwrap();

        let reloaded = EntryStore::load(&path).unwrap();
        assert_eq!(reloaded.entries(), store.entries());
        assert_eq!(reloaded.entries()[1].entry_id, "alice_pc2");
        assert_eq!(reloaded.entries()[1].title, "PC2");
        assert!(!dir.path().join("entries.json.tmp").exists());
    }

    #[test]
    fn test_duplicate_entry_rejected() {
        let mut store = EntryStore::empty("unused.json");
        store
            .add(ConfigEntry::new("PC1".to_string(), data("alice", "PC1")))
            .unwrap();
        let err = store
            .add(ConfigEntry::new("PC1".to_string(), data("alice", "PC1")))
            .unwrap_err();
        assert!(matches!(err, StoreError::AlreadyConfigured(_)));

        store
            .add(ConfigEntry::new("PC1".to_string(), data("bob", "PC1")))
            .unwrap();
        assert_eq!(store.entries().len(), 2);
    }

    #[test]
    fn test_colliding_entry_ids_get_suffix() {
        let mut store = EntryStore::empty("unused.json");
        let first = store
            .add(ConfigEntry::new("PC 1".to_string(), data("alice", "PC 1")))
            .unwrap();
        let second = store
            .add(ConfigEntry::new("PC_1".to_string(), data("alice", "PC_1")))
            .unwrap();
        let third = store
            .add(ConfigEntry::new("PC-1".to_string(), data("alice", "PC-1")))
            .unwrap();
        assert_eq!(first, "alice_pc_1");
        assert_eq!(second, "alice_pc_1_2");
        assert_eq!(third, "alice_pc_1_3");

        let removed = store.remove("alice_pc_1_2").unwrap();
        assert_eq!(removed.data.device_name, "PC_1");
        assert_eq!(store.entries().len(), 2);
    }

    #[test]
    fn test_load_rejects_duplicate_entry_ids() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("entries.json");
        let entry = serde_json::to_value(ConfigEntry::new(
            "PC1".to_string(),
            data("alice", "PC1"),
        ))
        .unwrap();
        let file = serde_json::json!({"version": 1, "entries": [entry, entry]});
        std::fs::write(&path, file.to_string()).unwrap();

        assert!(matches!(
            EntryStore::load(&path),
            Err(StoreError::DuplicateEntryId(_, id)) if id == "alice_pc1"
        ));
    }

    #[test]
    fn test_remove_entry() {
        let mut store = EntryStore::empty("unused.json");
        store
            .add(ConfigEntry::new("PC1".to_string(), data("alice", "PC1")))
            .unwrap();

        assert!(store.remove("missing").is_none());
        let removed = store.remove("alice_pc1").unwrap();
        assert_eq!(removed.data.device_name, "PC1");
        assert!(store.entries().is_empty());
    }

    #[test]
    fn test_corrupt_store() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("entries.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(matches!(
            EntryStore::load(&path),
            Err(StoreError::Corrupt(_, _))
        ));

        std::fs::write(&path, r#"{"version": 7, "entries": []}"#).unwrap();
        assert!(matches!(
            EntryStore::load(&path),
            Err(StoreError::UnsupportedVersion(7))
        ));
    }

    #[tokio::test]
    async fn test_setup_and_unload_entry() {
        let entry = ConfigEntry::new("PC1".to_string(), data("alice", "PC1"));
        let ctx = setup_entry(&entry, Arc::new(MockVendorApi::new()));

        assert_eq!(ctx.entry_id, "alice_pc1");
        {
            let switch = ctx.switch.lock().await;
            assert_eq!(switch.entity_id(), "switch.alice_pc1");
            assert!(!switch.is_on());
            assert!(switch.available());
        }
        assert!(unload_entry(ctx));
    }
}
