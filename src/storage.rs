//! Flat-file JSON persistence for the member and clan stores.
//!
//! Every save rewrites the whole file through a temporary sibling and a
//! rename, so a failed write leaves the previous file untouched.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{ClanError, Result};
use crate::stats::{normalize_key, ClanBook, MemberStore, StatMember};

/// Shapes a member file may have on disk.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum StoredMembers {
    /// Current format: object keyed by lowercase member name.
    Keyed(MemberStore),
    /// Early format: a bare array of member objects.
    Legacy(Vec<StatMember>),
}

impl StoredMembers {
    pub fn is_legacy(&self) -> bool {
        matches!(self, Self::Legacy(_))
    }

    pub fn into_store(self) -> MemberStore {
        match self {
            Self::Keyed(store) => store,
            Self::Legacy(entries) => migrate_legacy(entries),
        }
    }
}

/// Keys legacy entries by normalized name. Entries without a name are
/// dropped; a later entry with the same name wins.
pub fn migrate_legacy(entries: Vec<StatMember>) -> MemberStore {
    let mut keyed = std::collections::BTreeMap::new();
    for entry in entries {
        let key = normalize_key(&entry.name);
        if key.is_empty() {
            continue;
        }
        keyed.insert(key, entry);
    }
    MemberStore::from_map(keyed)
}

/// Loads the member store, migrating and re-saving a legacy array file.
/// A missing file is an empty store.
pub fn load_members(path: &Path) -> Result<MemberStore> {
    let Some(stored) = read_json::<StoredMembers>(path)? else {
        return Ok(MemberStore::new());
    };
    if !stored.is_legacy() {
        return Ok(stored.into_store());
    }

    let store = stored.into_store();
    info!(
        path = %path.display(),
        members = store.len(),
        "migrating legacy member array to keyed format"
    );
    save_members(path, &store)?;
    Ok(store)
}

pub fn save_members(path: &Path, store: &MemberStore) -> Result<()> {
    write_json_atomic(path, store)
}

pub fn load_clans(path: &Path) -> Result<ClanBook> {
    Ok(read_json::<ClanBook>(path)?.unwrap_or_default())
}

pub fn save_clans(path: &Path, book: &ClanBook) -> Result<()> {
    write_json_atomic(path, book)
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "store file missing, starting empty");
            return Ok(None);
        }
        Err(err) => return Err(ClanError::storage(path, err)),
    };
    if raw.trim().is_empty() {
        return Ok(None);
    }
    Ok(Some(serde_json::from_str(&raw)?))
}

/// Serializes `value` as pretty JSON and swaps it into place.
pub fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let serialized = serde_json::to_string_pretty(value)?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|err| ClanError::storage(parent, err))?;
    }

    let tmp_path = temp_sibling(path);
    let written = (|| -> std::io::Result<()> {
        let mut file = fs::File::create(&tmp_path)?;
        file.write_all(serialized.as_bytes())?;
        file.sync_all()?;
        fs::rename(&tmp_path, path)
    })();

    if let Err(err) = written {
        if let Err(cleanup) = fs::remove_file(&tmp_path) {
            if cleanup.kind() != std::io::ErrorKind::NotFound {
                warn!(path = %tmp_path.display(), error = %cleanup, "failed to remove temp file");
            }
        }
        return Err(ClanError::storage(path, err));
    }
    Ok(())
}

fn temp_sibling(path: &Path) -> PathBuf {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "store.json".to_string());
    path.with_file_name(format!(".{file_name}.{}.tmp", uuid::Uuid::new_v4()))
}

/// Export body: the same JSON shape as the store file.
pub fn export_json(store: &MemberStore) -> Result<String> {
    Ok(serde_json::to_string_pretty(store)?)
}

pub fn export_file_name(at: DateTime<Utc>) -> String {
    format!("clan_data_{}.json", at.format("%Y%m%d_%H%M%S"))
}
