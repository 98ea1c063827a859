use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{ClanError, Result};
use crate::power::formula::{
    CalcMode, Mode, MultiplierTable, Race, BIAS, LITE_REMAINDER_MULTIPLIER,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    pub race: Race,
    pub power: u64,
    /// Display only; no formula reads it.
    #[serde(default = "default_level")]
    pub level: u32,
}

fn default_level() -> u32 {
    1
}

impl Member {
    pub fn new(race: Race, power: u64, level: u32) -> Self {
        Self { race, power, level }
    }

    fn validate(&self) -> Result<()> {
        if self.power == 0 {
            return Err(ClanError::validation("power must be at least 1"));
        }
        if self.level == 0 {
            return Err(ClanError::validation("level must be at least 1"));
        }
        Ok(())
    }
}

/// Ordered members of one side. Positions are the handles for edit and delete.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Roster {
    #[serde(default)]
    pub members: Vec<Member>,
    /// Declared raw power of the whole clan, used by Lite totals.
    #[serde(default)]
    pub clan_total_power: u64,
}

impl Roster {
    pub fn from_members(members: Vec<Member>) -> Self {
        Self {
            members,
            clan_total_power: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn push(&mut self, member: Member) -> Result<usize> {
        member.validate()?;
        self.members.push(member);
        Ok(self.members.len() - 1)
    }

    pub fn replace(&mut self, index: usize, member: Member) -> Result<()> {
        member.validate()?;
        let slot = self
            .members
            .get_mut(index)
            .ok_or_else(|| ClanError::NotFound(format!("no member at position {index}")))?;
        *slot = member;
        Ok(())
    }

    pub fn remove(&mut self, index: usize) -> Result<Member> {
        if index >= self.members.len() {
            return Err(ClanError::NotFound(format!("no member at position {index}")));
        }
        Ok(self.members.remove(index))
    }

    pub fn clear(&mut self) {
        self.members.clear();
    }
}

/// `BIAS * Σ effective_power` over every member.
pub fn total_power_full(roster: &Roster, mode: Mode, table: &MultiplierTable) -> f64 {
    let sum: f64 = roster
        .members
        .iter()
        .map(|m| table.effective_power(&m.race, m.power as f64, mode))
        .sum();
    BIAS * sum
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LiteBreakdown {
    pub major_race: Race,
    pub clan_total_power: u64,
    pub major_raw_sum: u64,
    pub major_effective: f64,
    /// Raw power not covered by tracked major-race members, floored at zero.
    pub remaining_raw: f64,
    /// True when the declared total was below the tracked major-race sum.
    pub remaining_clamped: bool,
    pub remaining_effective: f64,
    pub total: f64,
}

/// Lite total: major-race members are counted exactly, everyone else is
/// approximated from the declared clan total.
pub fn total_power_lite(
    roster: &Roster,
    mode: Mode,
    clan_total_power: u64,
    table: &MultiplierTable,
) -> LiteBreakdown {
    let major_race = mode.major_race();
    let (major_raw_sum, major_effective) = roster
        .members
        .iter()
        .filter(|m| m.race == major_race)
        .fold((0u64, 0.0f64), |(raw, effective), m| {
            (
                raw.saturating_add(m.power),
                effective + table.effective_power(&major_race, m.power as f64, mode),
            )
        });

    let unclamped = clan_total_power as f64 - major_raw_sum as f64;
    let remaining_clamped = unclamped < 0.0;
    let remaining_raw = unclamped.max(0.0);
    let remaining_effective = remaining_raw * LITE_REMAINDER_MULTIPLIER;

    LiteBreakdown {
        major_race,
        clan_total_power,
        major_raw_sum,
        major_effective,
        remaining_raw,
        remaining_clamped,
        remaining_effective,
        total: (major_effective + remaining_effective) * BIAS,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RosterSide {
    Clan1,
    Clan2,
}

impl RosterSide {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "clan1" | "1" => Some(Self::Clan1),
            "clan2" | "2" => Some(Self::Clan2),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MemberRow {
    pub index: usize,
    pub race: Race,
    pub power: u64,
    pub level: u32,
    pub effective_power: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct SideTotals {
    pub calc_mode: CalcMode,
    pub total: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lite: Option<LiteBreakdown>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SideView {
    pub side: RosterSide,
    pub mode: Mode,
    pub clan_total_power: u64,
    pub members: Vec<MemberRow>,
    pub totals: SideTotals,
}

/// The two-roster calculator. clan2 always runs in the mode opposite clan1.
#[derive(Debug, Clone)]
pub struct PowerBoard {
    clan1: Roster,
    clan2: Roster,
    clan1_mode: Mode,
    calc_mode: CalcMode,
    table: MultiplierTable,
}

impl PowerBoard {
    pub fn new(table: MultiplierTable) -> Self {
        Self {
            clan1: Roster::default(),
            clan2: Roster::default(),
            clan1_mode: Mode::Atk,
            calc_mode: CalcMode::Full,
            table,
        }
    }

    pub fn table(&self) -> &MultiplierTable {
        &self.table
    }

    pub fn calc_mode(&self) -> CalcMode {
        self.calc_mode
    }

    pub fn set_calc_mode(&mut self, calc_mode: CalcMode) {
        self.calc_mode = calc_mode;
    }

    pub fn mode(&self, side: RosterSide) -> Mode {
        match side {
            RosterSide::Clan1 => self.clan1_mode,
            RosterSide::Clan2 => self.clan1_mode.opposite(),
        }
    }

    /// Flips both sides at once and returns clan1's new mode.
    pub fn toggle_mode(&mut self) -> Mode {
        self.clan1_mode = self.clan1_mode.opposite();
        debug!(clan1_mode = self.clan1_mode.as_str(), "power mode toggled");
        self.clan1_mode
    }

    pub fn roster(&self, side: RosterSide) -> &Roster {
        match side {
            RosterSide::Clan1 => &self.clan1,
            RosterSide::Clan2 => &self.clan2,
        }
    }

    fn roster_mut(&mut self, side: RosterSide) -> &mut Roster {
        match side {
            RosterSide::Clan1 => &mut self.clan1,
            RosterSide::Clan2 => &mut self.clan2,
        }
    }

    fn check_lite_race(&self, side: RosterSide, race: &Race) -> Result<()> {
        if self.calc_mode != CalcMode::Lite {
            return Ok(());
        }
        let major = self.mode(side).major_race();
        if *race != major {
            return Err(ClanError::validation(format!(
                "lite mode only accepts {major} members while in {} mode",
                self.mode(side).as_str()
            )));
        }
        Ok(())
    }

    pub fn add_member(&mut self, side: RosterSide, member: Member) -> Result<usize> {
        self.check_lite_race(side, &member.race)?;
        self.roster_mut(side).push(member)
    }

    pub fn edit_member(&mut self, side: RosterSide, index: usize, member: Member) -> Result<()> {
        self.check_lite_race(side, &member.race)?;
        self.roster_mut(side).replace(index, member)
    }

    pub fn remove_member(&mut self, side: RosterSide, index: usize) -> Result<Member> {
        self.roster_mut(side).remove(index)
    }

    pub fn clear(&mut self, side: RosterSide) {
        self.roster_mut(side).clear();
    }

    pub fn set_clan_total_power(&mut self, side: RosterSide, total: u64) {
        self.roster_mut(side).clan_total_power = total;
    }

    pub fn totals(&self, side: RosterSide) -> SideTotals {
        let roster = self.roster(side);
        let mode = self.mode(side);
        match self.calc_mode {
            CalcMode::Full => SideTotals {
                calc_mode: CalcMode::Full,
                total: total_power_full(roster, mode, &self.table),
                lite: None,
            },
            CalcMode::Lite => {
                let breakdown =
                    total_power_lite(roster, mode, roster.clan_total_power, &self.table);
                SideTotals {
                    calc_mode: CalcMode::Lite,
                    total: breakdown.total,
                    lite: Some(breakdown),
                }
            }
        }
    }

    pub fn view(&self, side: RosterSide) -> SideView {
        let roster = self.roster(side);
        let mode = self.mode(side);
        let members = roster
            .members
            .iter()
            .enumerate()
            .map(|(index, m)| MemberRow {
                index,
                race: m.race.clone(),
                power: m.power,
                level: m.level,
                effective_power: self.table.effective_power(&m.race, m.power as f64, mode),
            })
            .collect();
        SideView {
            side,
            mode,
            clan_total_power: roster.clan_total_power,
            members,
            totals: self.totals(side),
        }
    }
}

impl Default for PowerBoard {
    fn default() -> Self {
        Self::new(MultiplierTable::standard())
    }
}
