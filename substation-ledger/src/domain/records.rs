use time::Date;

use super::{BalanceGroup, GroupSnapshot, MeterCounts};

#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Substation {
    pub id: i64,
    pub name: String,
}

/// Cumulative counts as of a single date.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct PointRecord {
    pub substation_id: i64,
    pub balance_group: BalanceGroup,
    pub date: Date,
    pub counts: MeterCounts,
}

/// Cumulative counts as of the last event recorded within a month.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct MonthlyAggregate {
    pub substation_id: i64,
    pub balance_group: BalanceGroup,
    pub year: i32,
    pub month: u8,
    pub counts: MeterCounts,
}

/// Cumulative counts as of the last event recorded within a year.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct YearlyAggregate {
    pub substation_id: i64,
    pub balance_group: BalanceGroup,
    pub year: i32,
    pub counts: MeterCounts,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, sqlx::FromRow)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct TechnicalMeterStats {
    pub quantity: i64,
    pub under_voltage: i64,
}

/// Dates at which each family of balance groups is read for a summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SummaryDates {
    pub residential: Date,
    pub legal: Date,
    pub general_metering: Date,
}

impl SummaryDates {
    pub fn all_at(date: Date) -> Self {
        Self {
            residential: date,
            legal: date,
            general_metering: date,
        }
    }

    pub fn for_group(&self, group: BalanceGroup) -> Date {
        match group {
            BalanceGroup::Residential => self.residential,
            BalanceGroup::LegalEntityA | BalanceGroup::LegalEntityB => self.legal,
            BalanceGroup::GeneralMeteringA | BalanceGroup::GeneralMeteringB => self.general_metering,
        }
    }
}

/// Dashboard snapshot of a substation.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct SubstationSummary {
    pub substation: Substation,
    pub dates: SummaryDates,
    pub residential: GroupSnapshot,
    pub legal_entity_a: GroupSnapshot,
    pub legal_entity_b: GroupSnapshot,
    pub general_metering_a: GroupSnapshot,
    pub general_metering_b: GroupSnapshot,
    pub technical: TechnicalMeterStats,
}
