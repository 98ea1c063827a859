//! Read-modify-write operations on the persisted stores.
//!
//! Each call loads a full snapshot, applies one change, and writes the whole
//! file back. A failed check (secret, PIN, validation) returns before anything
//! is written. Calls are serialized through a single lock; there is one writer.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::Utc;
use serde::Serialize;
use serde_json::Value;
use tracing::info;

use crate::auth::SecretKey;
use crate::config::AppConfig;
use crate::error::{ClanError, Result};
use crate::stats::{
    parse_import_payload, ClanBook, ClanSummary, ImportMode, MemberStore, StatMember,
    UpsertOutcome,
};
use crate::storage;

/// Which member store an operation targets.
#[derive(Debug, Clone, Copy)]
pub enum Scope<'a> {
    /// The single-clan store file.
    Default,
    /// One clan inside the multi-clan file, opened with its PIN.
    Clan { name: &'a str, pin: &'a str },
}

#[derive(Debug, Clone, Serialize)]
pub struct ImportReport {
    pub mode: ImportMode,
    pub imported: usize,
    pub total: usize,
}

#[derive(Debug, Clone)]
pub struct Export {
    pub file_name: String,
    pub body: String,
}

#[derive(Debug)]
pub struct Ledger {
    members_file: PathBuf,
    clans_file: PathBuf,
    secret: SecretKey,
    write_lock: Mutex<()>,
}

impl Ledger {
    pub fn new(members_file: PathBuf, clans_file: PathBuf, secret: SecretKey) -> Self {
        Self {
            members_file,
            clans_file,
            secret,
            write_lock: Mutex::new(()),
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(
            config.members_file.clone(),
            config.clans_file.clone(),
            config.secret.clone(),
        )
    }

    pub fn members_file(&self) -> &Path {
        &self.members_file
    }

    fn lock(&self) -> MutexGuard<'_, ()> {
        self.write_lock.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn modify_members<T>(
        &self,
        scope: Scope<'_>,
        change: impl FnOnce(&mut MemberStore) -> Result<T>,
    ) -> Result<T> {
        let _guard = self.lock();
        match scope {
            Scope::Default => {
                let mut store = storage::load_members(&self.members_file)?;
                let out = change(&mut store)?;
                storage::save_members(&self.members_file, &store)?;
                Ok(out)
            }
            Scope::Clan { name, pin } => {
                let mut book = storage::load_clans(&self.clans_file)?;
                let out = change(book.unlock_mut(name, pin)?)?;
                storage::save_clans(&self.clans_file, &book)?;
                Ok(out)
            }
        }
    }

    fn modify_clans<T>(&self, change: impl FnOnce(&mut ClanBook) -> Result<T>) -> Result<T> {
        let _guard = self.lock();
        let mut book = storage::load_clans(&self.clans_file)?;
        let out = change(&mut book)?;
        storage::save_clans(&self.clans_file, &book)?;
        Ok(out)
    }

    pub fn members(&self, scope: Scope<'_>) -> Result<MemberStore> {
        let _guard = self.lock();
        match scope {
            Scope::Default => storage::load_members(&self.members_file),
            Scope::Clan { name, pin } => {
                let book = storage::load_clans(&self.clans_file)?;
                Ok(book.unlock(name, pin)?.clone())
            }
        }
    }

    pub fn upsert(
        &self,
        scope: Scope<'_>,
        name: &str,
        atk: u64,
        def: u64,
    ) -> Result<UpsertOutcome> {
        let outcome = self.modify_members(scope, |store| store.upsert(name, atk, def))?;
        info!(
            key = %outcome.key,
            atk = outcome.member.atk,
            def = outcome.member.def,
            updated = outcome.was_update,
            "member saved"
        );
        Ok(outcome)
    }

    pub fn delete(&self, scope: Scope<'_>, name: &str, secret: Option<&str>) -> Result<StatMember> {
        self.secret.verify(secret)?;
        let removed = self.modify_members(scope, |store| {
            store
                .remove(name)
                .ok_or_else(|| ClanError::NotFound(format!("member '{}'", name.trim())))
        })?;
        info!(name = %removed.name, "member deleted");
        Ok(removed)
    }

    /// Removes every member; returns how many were dropped.
    pub fn clear(&self, scope: Scope<'_>, secret: Option<&str>) -> Result<usize> {
        self.secret.verify(secret)?;
        let cleared = self.modify_members(scope, |store| {
            let count = store.len();
            store.clear();
            Ok(count)
        })?;
        info!(cleared, "member store cleared");
        Ok(cleared)
    }

    /// Merge needs no secret; Replace does.
    pub fn import(
        &self,
        scope: Scope<'_>,
        payload: Value,
        mode: ImportMode,
        secret: Option<&str>,
    ) -> Result<ImportReport> {
        if mode == ImportMode::Replace {
            self.secret.verify(secret)?;
        }
        let incoming = parse_import_payload(payload)?;
        let imported = incoming.len();
        let total = self.modify_members(scope, |store| {
            store.import_members(incoming, mode);
            Ok(store.len())
        })?;
        info!(?mode, imported, total, "members imported");
        Ok(ImportReport {
            mode,
            imported,
            total,
        })
    }

    pub fn export(&self, scope: Scope<'_>) -> Result<Export> {
        let store = self.members(scope)?;
        Ok(Export {
            file_name: storage::export_file_name(Utc::now()),
            body: storage::export_json(&store)?,
        })
    }

    pub fn list_clans(&self) -> Result<Vec<ClanSummary>> {
        let _guard = self.lock();
        Ok(storage::load_clans(&self.clans_file)?.summaries())
    }

    pub fn create_clan(&self, name: &str, pin: &str) -> Result<ClanSummary> {
        let summary = self.modify_clans(|book| book.create(name, pin))?;
        info!(key = %summary.key, "clan created");
        Ok(summary)
    }

    pub fn unlock_clan(&self, name: &str, pin: &str) -> Result<MemberStore> {
        self.members(Scope::Clan { name, pin })
    }

    pub fn delete_clan(&self, name: &str, secret: Option<&str>) -> Result<String> {
        self.secret.verify(secret)?;
        let removed = self.modify_clans(|book| book.remove(name))?;
        info!(name = %removed.name, "clan deleted");
        Ok(removed.name)
    }
}
