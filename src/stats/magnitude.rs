//! Human-entered stat values such as `2M`, `4.1M`, `500K` or `1500`.

use serde::{Deserialize, Deserializer, Serialize};

const MILLION: f64 = 1_000_000.0;
const THOUSAND: f64 = 1_000.0;

/// A stat as typed by a user or returned by a model: either already numeric
/// or free text with an optional magnitude suffix.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StatInput {
    Number(f64),
    Text(String),
}

impl From<&str> for StatInput {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for StatInput {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<u64> for StatInput {
    fn from(value: u64) -> Self {
        Self::Number(value as f64)
    }
}

impl From<i64> for StatInput {
    fn from(value: i64) -> Self {
        Self::Number(value as f64)
    }
}

impl From<f64> for StatInput {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

/// Parses a stat, never failing: anything unreadable is 0.
///
/// Text is trimmed, stripped of spaces and uppercased. An `M` anywhere scales
/// the remainder by one million, otherwise a `K` scales it by one thousand.
/// The result is truncated toward zero; negative values floor at 0.
pub fn parse_stat(input: impl Into<StatInput>) -> u64 {
    match input.into() {
        StatInput::Number(value) => truncate(value),
        StatInput::Text(text) => parse_text(&text),
    }
}

fn parse_text(raw: &str) -> u64 {
    let normalized = raw.trim().to_uppercase().replace(' ', "");
    let (digits, scale) = if normalized.contains('M') {
        (normalized.replace('M', ""), MILLION)
    } else if normalized.contains('K') {
        (normalized.replace('K', ""), THOUSAND)
    } else {
        (normalized, 1.0)
    };

    match digits.parse::<f64>() {
        Ok(number) if scale == 1.0 => truncate(number),
        Ok(number) => truncate(snap_to_integer(number * scale)),
        Err(_) => 0,
    }
}

/// `4.1 * 1e6` lands a hair under 4_100_000 in binary floating point.
fn snap_to_integer(value: f64) -> f64 {
    let nearest = value.round();
    if (value - nearest).abs() <= value.abs().max(1.0) * 1e-9 {
        nearest
    } else {
        value
    }
}

fn truncate(value: f64) -> u64 {
    if !value.is_finite() || value <= 0.0 {
        return 0;
    }
    value.trunc() as u64
}

/// Short display form: `2.5M`, `1.5K`, or the plain integer below 1000.
pub fn format_stat(value: u64) -> String {
    if value >= 1_000_000 {
        format!("{:.1}M", value as f64 / MILLION)
    } else if value >= 1_000 {
        format!("{:.1}K", value as f64 / THOUSAND)
    } else {
        value.to_string()
    }
}

/// Serde helper for stat fields: accepts numbers, magnitude strings or null.
pub fn deserialize_lenient<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<StatInput>::deserialize(deserializer)?;
    Ok(raw.map(parse_stat).unwrap_or(0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_magnitude_suffixes() {
        assert_eq!(parse_stat("2M"), 2_000_000);
        assert_eq!(parse_stat("4.1M"), 4_100_000);
        assert_eq!(parse_stat("2.2M"), 2_200_000);
        assert_eq!(parse_stat("500K"), 500_000);
        assert_eq!(parse_stat("1.5k"), 1_500);
        assert_eq!(parse_stat(" 9 . 5 m "), 9_500_000);
    }

    #[test]
    fn parses_plain_numbers_and_passes_numeric_input_through() {
        assert_eq!(parse_stat("1500"), 1_500);
        assert_eq!(parse_stat("1500.9"), 1_500);
        assert_eq!(parse_stat(1500u64), 1_500);
        assert_eq!(parse_stat(1500.7f64), 1_500);
    }

    #[test]
    fn invalid_input_yields_zero() {
        assert_eq!(parse_stat("abc"), 0);
        assert_eq!(parse_stat(""), 0);
        assert_eq!(parse_stat("   "), 0);
        assert_eq!(parse_stat("M"), 0);
        assert_eq!(parse_stat("2MK"), 0);
        assert_eq!(parse_stat("nan"), 0);
        assert_eq!(parse_stat("-5"), 0);
    }

    #[test]
    fn snapping_does_not_round_genuine_fractions_up() {
        assert_eq!(parse_stat("4.0999999M"), 4_099_999);
        assert_eq!(parse_stat("1.0005K"), 1_000);
    }

    #[test]
    fn formats_with_one_decimal() {
        assert_eq!(format_stat(2_500_000), "2.5M");
        assert_eq!(format_stat(1_500), "1.5K");
        assert_eq!(format_stat(999), "999");
        assert_eq!(format_stat(1_000_000), "1.0M");
        assert_eq!(format_stat(0), "0");
    }

    #[test]
    fn lenient_deserializer_accepts_mixed_shapes() {
        #[derive(Deserialize)]
        struct Row {
            #[serde(default, deserialize_with = "deserialize_lenient")]
            atk: u64,
        }
        let a: Row = serde_json::from_str(r#"{"atk": 12}"#).unwrap();
        let b: Row = serde_json::from_str(r#"{"atk": "3M"}"#).unwrap();
        let c: Row = serde_json::from_str(r#"{"atk": null}"#).unwrap();
        let d: Row = serde_json::from_str(r#"{}"#).unwrap();
        assert_eq!((a.atk, b.atk, c.atk, d.atk), (12, 3_000_000, 0, 0));
    }
}
