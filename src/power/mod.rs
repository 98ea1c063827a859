pub mod formula;
pub mod roster;

pub use formula::{
    effective_power, CalcMode, Mode, MultiplierTable, Race, RaceMultipliers, BIAS,
    LITE_REMAINDER_MULTIPLIER,
};
pub use roster::{
    total_power_full, total_power_lite, LiteBreakdown, Member, MemberRow, PowerBoard, Roster,
    RosterSide, SideTotals, SideView,
};
