pub mod clan;
pub mod magnitude;
pub mod member;

pub use clan::{validate_pin, Clan, ClanBook, ClanSummary};
pub use magnitude::{format_stat, parse_stat, StatInput};
pub use member::{
    normalize_key, parse_import_payload, ImportMode, MemberStore, StatMember, StoreTotals,
    UpsertOutcome,
};

use chrono::Utc;

pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S UTC";

pub fn utc_timestamp() -> String {
    Utc::now().format(TIMESTAMP_FORMAT).to_string()
}
