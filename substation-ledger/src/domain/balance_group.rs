use std::{fmt, str::FromStr};

use crate::error::LedgerError;

/// Billing category a meter is accounted under.
///
/// The legal-entity and general-building groups are split by the billing
/// system their readings are reported through. The string forms returned by
/// [`BalanceGroup::as_str`] are what the stores persist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum BalanceGroup {
    Residential,
    LegalEntityA,
    LegalEntityB,
    GeneralMeteringA,
    GeneralMeteringB,
}

impl BalanceGroup {
    pub const ALL: [BalanceGroup; 5] = [
        BalanceGroup::Residential,
        BalanceGroup::LegalEntityA,
        BalanceGroup::LegalEntityB,
        BalanceGroup::GeneralMeteringA,
        BalanceGroup::GeneralMeteringB,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            BalanceGroup::Residential => "residential",
            BalanceGroup::LegalEntityA => "legal_entity_a",
            BalanceGroup::LegalEntityB => "legal_entity_b",
            BalanceGroup::GeneralMeteringA => "general_metering_a",
            BalanceGroup::GeneralMeteringB => "general_metering_b",
        }
    }
}

impl fmt::Display for BalanceGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BalanceGroup {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        BalanceGroup::ALL
            .into_iter()
            .find(|g| g.as_str() == s.trim())
            .ok_or_else(|| LedgerError::UnknownBalanceGroup(s.to_string()))
    }
}
