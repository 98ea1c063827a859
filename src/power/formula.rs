use std::fmt;

use serde::{Deserialize, Serialize};

/// Discount applied to every clan total.
pub const BIAS: f64 = 0.84;

/// Flat multiplier standing in for all non-major-race members in Lite mode.
pub const LITE_REMAINDER_MULTIPLIER: f64 = 1.8;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Race {
    Dog,
    Cat,
    Frog,
    /// Any race name outside the table. Its power passes through unchanged.
    Other(String),
}

impl Race {
    pub fn from_name(name: &str) -> Self {
        match name.trim() {
            n if n.eq_ignore_ascii_case("dog") => Self::Dog,
            n if n.eq_ignore_ascii_case("cat") => Self::Cat,
            n if n.eq_ignore_ascii_case("frog") => Self::Frog,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Dog => "Dog",
            Self::Cat => "Cat",
            Self::Frog => "Frog",
            Self::Other(name) => name,
        }
    }

    pub fn is_known(&self) -> bool {
        !matches!(self, Self::Other(_))
    }
}

impl From<String> for Race {
    fn from(value: String) -> Self {
        Self::from_name(&value)
    }
}

impl From<Race> for String {
    fn from(value: Race) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for Race {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Mode {
    #[serde(rename = "ATK", alias = "atk")]
    Atk,
    #[serde(rename = "DEF", alias = "def")]
    Def,
}

impl Mode {
    pub const fn opposite(self) -> Self {
        match self {
            Self::Atk => Self::Def,
            Self::Def => Self::Atk,
        }
    }

    /// The race Lite mode tracks individually: Cat attacks, Dog defends.
    pub fn major_race(self) -> Race {
        match self {
            Self::Atk => Race::Cat,
            Self::Def => Race::Dog,
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "ATK" => Some(Self::Atk),
            "DEF" => Some(Self::Def),
            _ => None,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Atk => "ATK",
            Self::Def => "DEF",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CalcMode {
    #[default]
    Full,
    Lite,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RaceMultipliers {
    pub atk: f64,
    pub def: f64,
}

impl RaceMultipliers {
    pub const fn for_mode(self, mode: Mode) -> f64 {
        match mode {
            Mode::Atk => self.atk,
            Mode::Def => self.def,
        }
    }
}

/// Per-race, per-mode power multipliers.
///
/// Two tables exist in the wild. [`MultiplierTable::standard`] is the default;
/// [`MultiplierTable::revised`] can be selected through configuration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MultiplierTable {
    pub frog: RaceMultipliers,
    pub cat: RaceMultipliers,
    pub dog: RaceMultipliers,
}

impl MultiplierTable {
    pub const fn standard() -> Self {
        Self {
            frog: RaceMultipliers { atk: 1.5, def: 1.5 },
            cat: RaceMultipliers { atk: 5.2, def: 2.5 },
            dog: RaceMultipliers { atk: 2.5, def: 5.2 },
        }
    }

    pub const fn revised() -> Self {
        Self {
            frog: RaceMultipliers { atk: 2.5, def: 2.5 },
            cat: RaceMultipliers { atk: 5.0, def: 2.5 },
            dog: RaceMultipliers { atk: 2.5, def: 5.0 },
        }
    }

    pub fn preset(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "standard" => Some(Self::standard()),
            "revised" => Some(Self::revised()),
            _ => None,
        }
    }

    /// Multiplier for a race in a mode; `None` for races outside the table.
    pub fn multiplier(&self, race: &Race, mode: Mode) -> Option<f64> {
        let row = match race {
            Race::Frog => self.frog,
            Race::Cat => self.cat,
            Race::Dog => self.dog,
            Race::Other(_) => return None,
        };
        Some(row.for_mode(mode))
    }

    pub fn effective_power(&self, race: &Race, base_power: f64, mode: Mode) -> f64 {
        match self.multiplier(race, mode) {
            Some(multiplier) => base_power * multiplier,
            None => base_power,
        }
    }
}

impl Default for MultiplierTable {
    fn default() -> Self {
        Self::standard()
    }
}

/// Effective power under the standard table.
pub fn effective_power(race: &Race, base_power: f64, mode: Mode) -> f64 {
    MultiplierTable::standard().effective_power(race, base_power, mode)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_table_matches_expected_multipliers() {
        let cases = [
            (Race::Frog, Mode::Atk, 1.5),
            (Race::Frog, Mode::Def, 1.5),
            (Race::Cat, Mode::Atk, 5.2),
            (Race::Cat, Mode::Def, 2.5),
            (Race::Dog, Mode::Atk, 2.5),
            (Race::Dog, Mode::Def, 5.2),
        ];
        for (race, mode, multiplier) in cases {
            let out = effective_power(&race, 100.0, mode);
            assert!(
                (out - 100.0 * multiplier).abs() < 1e-9,
                "{race} {} expected {}, got {out}",
                mode.as_str(),
                100.0 * multiplier
            );
        }
    }

    #[test]
    fn unknown_race_passes_power_through() {
        let race = Race::from_name("Bird");
        assert_eq!(race, Race::Other("Bird".to_string()));
        assert_eq!(effective_power(&race, 321.0, Mode::Atk), 321.0);
        assert_eq!(effective_power(&race, 321.0, Mode::Def), 321.0);
    }

    #[test]
    fn revised_table_changes_frog_and_major_multipliers() {
        let table = MultiplierTable::revised();
        assert_eq!(table.effective_power(&Race::Frog, 10.0, Mode::Def), 25.0);
        assert_eq!(table.effective_power(&Race::Cat, 10.0, Mode::Atk), 50.0);
        assert_eq!(table.effective_power(&Race::Dog, 10.0, Mode::Def), 50.0);
    }

    #[test]
    fn race_names_are_case_insensitive_and_serialize_canonically() {
        assert_eq!(Race::from_name(" cat "), Race::Cat);
        let json = serde_json::to_string(&Race::from_name("DOG")).unwrap();
        assert_eq!(json, "\"Dog\"");
        let back: Race = serde_json::from_str("\"frog\"").unwrap();
        assert_eq!(back, Race::Frog);
    }

    #[test]
    fn modes_are_complementary() {
        assert_eq!(Mode::Atk.opposite(), Mode::Def);
        assert_eq!(Mode::Def.opposite(), Mode::Atk);
        assert_eq!(Mode::Atk.major_race(), Race::Cat);
        assert_eq!(Mode::Def.major_race(), Race::Dog);
    }
}
