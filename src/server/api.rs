use serde::{Deserialize, Serialize};

use crate::power::{
    CalcMode, Member, Mode, MultiplierTable, PowerBoard, Race, RosterSide, SideView,
};
use crate::stats::magnitude::deserialize_lenient;
use crate::stats::{ClanSummary, MemberStore, StatMember, StoreTotals};

#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: &'static str,
    pub version: &'static str,
}

pub fn health_payload() -> HealthResponse {
    HealthResponse {
        status: "ok",
        service: "clanstats",
        version: env!("CARGO_PKG_VERSION"),
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BoardResponse {
    pub calc_mode: CalcMode,
    pub clan1_mode: Mode,
    pub multipliers: MultiplierTable,
    pub clan1: SideView,
    pub clan2: SideView,
}

pub fn board_payload(board: &PowerBoard) -> BoardResponse {
    BoardResponse {
        calc_mode: board.calc_mode(),
        clan1_mode: board.mode(RosterSide::Clan1),
        multipliers: *board.table(),
        clan1: board.view(RosterSide::Clan1),
        clan2: board.view(RosterSide::Clan2),
    }
}

/// Body for adding or editing a calculator member. `power` accepts
/// magnitude strings such as `"1.2M"`.
#[derive(Debug, Clone, Deserialize)]
pub struct PowerMemberRequest {
    pub race: Race,
    #[serde(default, deserialize_with = "deserialize_lenient")]
    pub power: u64,
    #[serde(default = "default_level")]
    pub level: u32,
}

fn default_level() -> u32 {
    1
}

impl From<PowerMemberRequest> for Member {
    fn from(req: PowerMemberRequest) -> Self {
        Member::new(req.race, req.power, req.level)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CalcModeRequest {
    pub calc_mode: CalcMode,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ClanTotalRequest {
    #[serde(default, deserialize_with = "deserialize_lenient")]
    pub clan_total_power: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ModeToggleResponse {
    pub clan1_mode: Mode,
    pub clan2_mode: Mode,
}

#[derive(Debug, Clone, Serialize)]
pub struct MemberAddedResponse {
    pub index: usize,
    pub side: SideView,
}

/// Body for a stat upsert. `atk`/`def` accept numbers or magnitude strings.
#[derive(Debug, Clone, Deserialize)]
pub struct UpsertRequest {
    pub name: String,
    #[serde(default, deserialize_with = "deserialize_lenient")]
    pub atk: u64,
    #[serde(default, deserialize_with = "deserialize_lenient")]
    pub def: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct MemberEntry {
    pub key: String,
    #[serde(flatten)]
    pub member: StatMember,
    pub atk_display: String,
    pub def_display: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct TotalsView {
    #[serde(flatten)]
    pub totals: StoreTotals,
    pub total_atk_display: String,
    pub total_def_display: String,
}

impl From<StoreTotals> for TotalsView {
    fn from(totals: StoreTotals) -> Self {
        Self {
            total_atk_display: totals.formatted_atk(),
            total_def_display: totals.formatted_def(),
            totals,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MembersResponse {
    pub members: Vec<MemberEntry>,
    pub totals: TotalsView,
}

/// Members in key order with display strings and store totals.
pub fn members_payload(store: &MemberStore) -> MembersResponse {
    let members = store
        .iter()
        .map(|(key, member)| MemberEntry {
            key: key.clone(),
            atk_display: crate::stats::format_stat(member.atk),
            def_display: crate::stats::format_stat(member.def),
            member: member.clone(),
        })
        .collect();
    MembersResponse {
        members,
        totals: store.totals().into(),
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DeletedResponse {
    pub status: &'static str,
    pub deleted: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ClearedResponse {
    pub status: &'static str,
    pub cleared: usize,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ImportParams {
    pub mode: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateClanRequest {
    pub name: String,
    pub pin: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UnlockRequest {
    pub pin: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ClansResponse {
    pub clans: Vec<ClanSummary>,
}

#[derive(Debug, Clone, Serialize)]
pub struct UnlockResponse {
    pub clan: String,
    #[serde(flatten)]
    pub members: MembersResponse,
}
