use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{ClanError, Result};
use crate::stats::magnitude::{deserialize_lenient, format_stat};
use crate::stats::utc_timestamp;

/// One member's combat stats. Unknown fields from imported files are kept
/// so a load/save cycle does not drop them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatMember {
    #[serde(default)]
    pub name: String,
    #[serde(default, deserialize_with = "deserialize_lenient")]
    pub atk: u64,
    #[serde(default, deserialize_with = "deserialize_lenient")]
    pub def: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl StatMember {
    pub fn new(name: impl Into<String>, atk: u64, def: u64) -> Self {
        Self {
            name: name.into(),
            atk,
            def,
            updated_at: Some(utc_timestamp()),
            extra: Map::new(),
        }
    }
}

/// Trimmed, lowercased name; the identity of a member or clan.
pub fn normalize_key(name: &str) -> String {
    name.trim().to_lowercase()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImportMode {
    Merge,
    Replace,
}

impl ImportMode {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "merge" => Some(Self::Merge),
            "replace" => Some(Self::Replace),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UpsertOutcome {
    pub key: String,
    pub member: StatMember,
    pub was_update: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StoreTotals {
    pub total_atk: u64,
    pub total_def: u64,
    pub member_count: usize,
}

impl StoreTotals {
    pub fn formatted_atk(&self) -> String {
        format_stat(self.total_atk)
    }

    pub fn formatted_def(&self) -> String {
        format_stat(self.total_def)
    }
}

/// Members keyed by normalized name, iterated in key order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MemberStore {
    members: BTreeMap<String, StatMember>,
}

impl MemberStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_map(members: BTreeMap<String, StatMember>) -> Self {
        Self { members }
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&StatMember> {
        self.members.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.members.contains_key(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &StatMember)> {
        self.members.iter()
    }

    /// Inserts or fully replaces the entry for `name`'s normalized key.
    pub fn upsert(&mut self, name: &str, atk: u64, def: u64) -> Result<UpsertOutcome> {
        let display = name.trim();
        if display.is_empty() {
            return Err(ClanError::validation("member name must not be empty"));
        }
        let key = normalize_key(display);
        let member = StatMember::new(display, atk, def);
        let was_update = self.members.insert(key.clone(), member.clone()).is_some();
        Ok(UpsertOutcome {
            key,
            member,
            was_update,
        })
    }

    /// Removes by name or key; lookups are case-insensitive.
    pub fn remove(&mut self, name: &str) -> Option<StatMember> {
        self.members.remove(&normalize_key(name))
    }

    pub fn clear(&mut self) {
        self.members.clear();
    }

    pub fn totals(&self) -> StoreTotals {
        self.members.values().fold(
            StoreTotals {
                member_count: self.members.len(),
                ..StoreTotals::default()
            },
            |mut acc, m| {
                acc.total_atk = acc.total_atk.saturating_add(m.atk);
                acc.total_def = acc.total_def.saturating_add(m.def);
                acc
            },
        )
    }

    /// Merge keeps keys only present here and overwrites shared keys whole;
    /// Replace discards everything here.
    pub fn import_members(&mut self, incoming: MemberStore, mode: ImportMode) {
        match mode {
            ImportMode::Replace => *self = incoming,
            ImportMode::Merge => self.members.extend(incoming.members),
        }
    }

    pub fn into_map(self) -> BTreeMap<String, StatMember> {
        self.members
    }
}

/// Validates an import payload: it must be a JSON object of member objects.
///
/// Entries are decoded as [`StatMember`]s, so a stored import is always
/// loadable: magnitude strings become integers, missing stats become 0 and
/// unknown fields are carried through unchanged.
pub fn parse_import_payload(payload: Value) -> Result<MemberStore> {
    if !payload.is_object() {
        return Err(ClanError::validation(
            "import payload must be a JSON object keyed by member name",
        ));
    }
    serde_json::from_value(payload)
        .map_err(|err| ClanError::validation(format!("invalid member entry in import: {err}")))
}
