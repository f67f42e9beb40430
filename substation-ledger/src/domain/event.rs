use time::Date;

use super::{BalanceGroup, MeterCounts};

/// New meters installed (some of them possibly already registered) for one
/// balance group of a substation on a given date.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct InstallationEvent {
    pub substation_id: i64,
    pub balance_group: BalanceGroup,
    pub date: Date,
    pub total_installed: i64,
    pub registered_count: i64,
}

impl InstallationEvent {
    pub fn delta(&self) -> MeterCounts {
        MeterCounts::new(self.total_installed, self.registered_count)
    }
}

/// Previously installed meters entered into the billing system on a date.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RegistrationEvent {
    pub substation_id: i64,
    pub balance_group: BalanceGroup,
    pub date: Date,
    pub registered_count: i64,
}

impl RegistrationEvent {
    pub fn delta(&self) -> MeterCounts {
        MeterCounts::registered_only(self.registered_count)
    }
}

/// Technical (non-billing) meters reported for a substation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TechnicalMeterReport {
    pub substation_id: i64,
    pub quantity: i64,
    pub under_voltage: i64,
}
