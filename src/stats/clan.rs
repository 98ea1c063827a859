use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::auth::verify_pin;
use crate::error::{ClanError, Result};
use crate::stats::member::{normalize_key, MemberStore, StoreTotals};
use crate::stats::utc_timestamp;

pub const PIN_LENGTH: std::ops::RangeInclusive<usize> = 4..=8;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Clan {
    pub name: String,
    pub pin: String,
    #[serde(default)]
    pub members: MemberStore,
    #[serde(default)]
    pub created_at: String,
}

/// Public view of a clan; never carries the PIN.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClanSummary {
    pub key: String,
    pub name: String,
    pub created_at: String,
    pub totals: StoreTotals,
}

pub fn validate_pin(pin: &str) -> Result<()> {
    if !PIN_LENGTH.contains(&pin.len()) || !pin.chars().all(|c| c.is_ascii_digit()) {
        return Err(ClanError::validation(format!(
            "PIN must be {} to {} digits",
            PIN_LENGTH.start(),
            PIN_LENGTH.end()
        )));
    }
    Ok(())
}

/// All clans of the multi-clan store, keyed by normalized clan name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClanBook {
    clans: BTreeMap<String, Clan>,
}

impl ClanBook {
    pub fn len(&self) -> usize {
        self.clans.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clans.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&Clan> {
        self.clans.get(&normalize_key(name))
    }

    pub fn create(&mut self, name: &str, pin: &str) -> Result<ClanSummary> {
        let display = name.trim();
        if display.is_empty() {
            return Err(ClanError::validation("clan name must not be empty"));
        }
        validate_pin(pin)?;
        let key = normalize_key(display);
        if self.clans.contains_key(&key) {
            return Err(ClanError::validation(format!(
                "a clan named '{display}' already exists"
            )));
        }
        let clan = Clan {
            name: display.to_string(),
            pin: pin.to_string(),
            members: MemberStore::new(),
            created_at: utc_timestamp(),
        };
        let summary = summarize(&key, &clan);
        self.clans.insert(key, clan);
        Ok(summary)
    }

    fn find(&self, name: &str) -> Result<(String, &Clan)> {
        let key = normalize_key(name);
        match self.clans.get(&key) {
            Some(clan) => Ok((key, clan)),
            None => Err(ClanError::NotFound(format!("clan '{}'", name.trim()))),
        }
    }

    /// Checks the PIN verbatim and hands back the clan's members.
    pub fn unlock(&self, name: &str, pin: &str) -> Result<&MemberStore> {
        let (_, clan) = self.find(name)?;
        verify_pin(&clan.pin, pin)?;
        Ok(&clan.members)
    }

    pub fn unlock_mut(&mut self, name: &str, pin: &str) -> Result<&mut MemberStore> {
        let (key, clan) = self.find(name)?;
        verify_pin(&clan.pin, pin)?;
        match self.clans.get_mut(&key) {
            Some(clan) => Ok(&mut clan.members),
            None => Err(ClanError::NotFound(format!("clan '{}'", name.trim()))),
        }
    }

    pub fn remove(&mut self, name: &str) -> Result<Clan> {
        let key = normalize_key(name);
        self.clans
            .remove(&key)
            .ok_or_else(|| ClanError::NotFound(format!("clan '{}'", name.trim())))
    }

    pub fn summaries(&self) -> Vec<ClanSummary> {
        self.clans
            .iter()
            .map(|(key, clan)| summarize(key, clan))
            .collect()
    }
}

fn summarize(key: &str, clan: &Clan) -> ClanSummary {
    ClanSummary {
        key: key.to_string(),
        name: clan.name.clone(),
        created_at: clan.created_at.clone(),
        totals: clan.members.totals(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pin_must_be_four_to_eight_digits() {
        assert!(validate_pin("1234").is_ok());
        assert!(validate_pin("12345678").is_ok());
        assert!(validate_pin("123").is_err());
        assert!(validate_pin("123456789").is_err());
        assert!(validate_pin("12a4").is_err());
        assert!(validate_pin("").is_err());
    }

    #[test]
    fn clan_names_are_unique_case_insensitively() {
        let mut book = ClanBook::default();
        let summary = book.create(" Night Owls ", "1234").unwrap();
        assert_eq!(summary.key, "night owls");
        assert_eq!(summary.name, "Night Owls");

        let err = book.create("NIGHT OWLS", "9999").unwrap_err();
        assert!(matches!(err, ClanError::Validation(_)));
        assert_eq!(book.len(), 1);
    }

    #[test]
    fn unlock_checks_pin_verbatim() {
        let mut book = ClanBook::default();
        book.create("Wolves", "0042").unwrap();
        assert!(book.unlock("wolves", "0042").is_ok());
        assert!(matches!(book.unlock("wolves", "42"), Err(ClanError::Auth(_))));
        assert!(matches!(book.unlock("bears", "0042"), Err(ClanError::NotFound(_))));

        book.unlock_mut("WOLVES", "0042")
            .unwrap()
            .upsert("Rin", 5, 6)
            .unwrap();
        assert_eq!(book.get("wolves").unwrap().members.len(), 1);
    }

    #[test]
    fn summaries_hide_pins() {
        let mut book = ClanBook::default();
        book.create("Wolves", "4321").unwrap();
        let json = serde_json::to_string(&book.summaries()).unwrap();
        assert!(!json.contains("4321"));
    }
}
