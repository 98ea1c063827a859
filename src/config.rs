use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::auth::SecretKey;
use crate::error::{ClanError, Result};
use crate::power::MultiplierTable;

pub const DEFAULT_BIND: &str = "127.0.0.1:3000";
pub const DEFAULT_MEMBERS_FILE: &str = "data/members_data.json";
pub const DEFAULT_CLANS_FILE: &str = "data/clans_data.json";
pub const DEFAULT_GEMINI_MODEL: &str = "gemini-2.0-flash-exp";
pub const DEFAULT_EXTRACT_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone)]
pub struct ExtractConfig {
    pub api_key: Option<String>,
    pub model: String,
    pub timeout: Duration,
}

impl Default for ExtractConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: DEFAULT_GEMINI_MODEL.to_string(),
            timeout: Duration::from_secs(DEFAULT_EXTRACT_TIMEOUT_SECS),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_addr: String,
    pub members_file: PathBuf,
    pub clans_file: PathBuf,
    pub secret: SecretKey,
    pub multipliers: MultiplierTable,
    pub extract: ExtractConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bind_addr: DEFAULT_BIND.to_string(),
            members_file: PathBuf::from(DEFAULT_MEMBERS_FILE),
            clans_file: PathBuf::from(DEFAULT_CLANS_FILE),
            secret: SecretKey::default(),
            multipliers: MultiplierTable::standard(),
            extract: ExtractConfig::default(),
        }
    }
}

impl AppConfig {
    /// Reads `.env` (if present) and then the process environment.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds a config from any key lookup; `from_env` passes the process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let multipliers = match (get("CLANSTATS_MULTIPLIERS"), get("CLANSTATS_MULTIPLIER_PRESET")) {
            (Some(path), _) => load_multiplier_table(Path::new(&path))?,
            (None, Some(preset)) => MultiplierTable::preset(&preset).ok_or_else(|| {
                ClanError::Config(format!(
                    "unknown multiplier preset '{preset}' (expected standard or revised)"
                ))
            })?,
            (None, None) => defaults.multipliers,
        };

        let timeout_secs = match get("CLANSTATS_EXTRACT_TIMEOUT_SECS") {
            Some(raw) => raw.parse::<u64>().ok().filter(|s| *s > 0).ok_or_else(|| {
                ClanError::Config(format!(
                    "CLANSTATS_EXTRACT_TIMEOUT_SECS must be a positive integer, got '{raw}'"
                ))
            })?,
            None => DEFAULT_EXTRACT_TIMEOUT_SECS,
        };

        Ok(Self {
            bind_addr: get("CLANSTATS_BIND").unwrap_or(defaults.bind_addr),
            members_file: get("CLANSTATS_MEMBERS_FILE")
                .map(PathBuf::from)
                .unwrap_or(defaults.members_file),
            clans_file: get("CLANSTATS_CLANS_FILE")
                .map(PathBuf::from)
                .unwrap_or(defaults.clans_file),
            secret: SecretKey::new(get("CLANSTATS_SECRET_KEY")),
            multipliers,
            extract: ExtractConfig {
                api_key: get("GEMINI_API_KEY"),
                model: get("CLANSTATS_GEMINI_MODEL").unwrap_or(defaults.extract.model),
                timeout: Duration::from_secs(timeout_secs),
            },
        })
    }
}

/// Loads a YAML multiplier table (`frog`/`cat`/`dog` rows with `atk`/`def`).
pub fn load_multiplier_table(path: &Path) -> Result<MultiplierTable> {
    let raw = fs::read_to_string(path).map_err(|err| {
        ClanError::Config(format!("cannot read multiplier table {}: {err}", path.display()))
    })?;
    let table: MultiplierTable = serde_yaml::from_str(&raw).map_err(|err| {
        ClanError::Config(format!("invalid multiplier table {}: {err}", path.display()))
    })?;
    let rows = [table.frog, table.cat, table.dog];
    if rows
        .iter()
        .any(|r| !(r.atk.is_finite() && r.def.is_finite() && r.atk > 0.0 && r.def > 0.0))
    {
        return Err(ClanError::Config(format!(
            "multipliers in {} must be positive numbers",
            path.display()
        )));
    }
    Ok(table)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_apply_when_environment_is_empty() {
        let config = AppConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.bind_addr, DEFAULT_BIND);
        assert_eq!(config.members_file, PathBuf::from(DEFAULT_MEMBERS_FILE));
        assert_eq!(config.multipliers, MultiplierTable::standard());
        assert!(!config.secret.is_configured());
        assert_eq!(config.extract.model, DEFAULT_GEMINI_MODEL);
    }

    #[test]
    fn preset_and_overrides_are_read() {
        let config = AppConfig::from_lookup(lookup(&[
            ("CLANSTATS_MULTIPLIER_PRESET", "revised"),
            ("CLANSTATS_SECRET_KEY", "s3cret"),
            ("CLANSTATS_EXTRACT_TIMEOUT_SECS", "5"),
        ]))
        .unwrap();
        assert_eq!(config.multipliers, MultiplierTable::revised());
        assert!(config.secret.verify(Some("s3cret")).is_ok());
        assert_eq!(config.extract.timeout, Duration::from_secs(5));
    }

    #[test]
    fn bad_values_are_config_errors() {
        let err = AppConfig::from_lookup(lookup(&[("CLANSTATS_MULTIPLIER_PRESET", "ancient")]))
            .unwrap_err();
        assert!(matches!(err, ClanError::Config(_)));
        let err = AppConfig::from_lookup(lookup(&[("CLANSTATS_EXTRACT_TIMEOUT_SECS", "soon")]))
            .unwrap_err();
        assert!(matches!(err, ClanError::Config(_)));
    }

    #[test]
    fn multiplier_table_loads_from_yaml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("multipliers.yaml");
        fs::write(
            &path,
            "frog: { atk: 2.5, def: 2.5 }\n\
             cat: { atk: 5.0, def: 2.5 }\n\
             dog: { atk: 2.5, def: 5.0 }\n",
        )
        .unwrap();
        assert_eq!(load_multiplier_table(&path).unwrap(), MultiplierTable::revised());

        fs::write(
            &path,
            "frog: { atk: 0, def: 1 }\ncat: { atk: 1, def: 1 }\ndog: { atk: 1, def: 1 }\n",
        )
        .unwrap();
        assert!(matches!(load_multiplier_table(&path), Err(ClanError::Config(_))));
    }

    #[test]
    fn missing_multiplier_file_is_a_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("absent.yaml");
        let err = AppConfig::from_lookup(lookup(&[(
            "CLANSTATS_MULTIPLIERS",
            missing.to_str().unwrap(),
        )]))
        .unwrap_err();
        assert!(matches!(err, ClanError::Config(_)));
    }
}
