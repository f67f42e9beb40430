/// Installed/registered meter counts.
///
/// Used both for cumulative snapshots stored in the ledger and for the deltas
/// an event contributes to them. The unregistered count is always derived.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MeterCounts {
    pub total_installed: i64,
    pub registered: i64,
}

impl MeterCounts {
    pub const ZERO: MeterCounts = MeterCounts {
        total_installed: 0,
        registered: 0,
    };

    pub fn new(total_installed: i64, registered: i64) -> Self {
        Self {
            total_installed,
            registered,
        }
    }

    /// A registration-only contribution: meters already installed that have
    /// now been entered into billing.
    pub fn registered_only(registered: i64) -> Self {
        Self::new(0, registered)
    }

    pub fn unregistered(&self) -> i64 {
        self.total_installed - self.registered
    }

    /// Componentwise sum, `None` if either count overflows.
    pub fn checked_add(self, rhs: MeterCounts) -> Option<MeterCounts> {
        Some(MeterCounts {
            total_installed: self.total_installed.checked_add(rhs.total_installed)?,
            registered: self.registered.checked_add(rhs.registered)?,
        })
    }
}

/// Counts of one balance group as seen on a dashboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct GroupSnapshot {
    pub registered: i64,
    pub unregistered: i64,
    pub total_installed: i64,
}

impl From<MeterCounts> for GroupSnapshot {
    fn from(c: MeterCounts) -> Self {
        GroupSnapshot {
            registered: c.registered,
            unregistered: c.unregistered(),
            total_installed: c.total_installed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unregistered_is_derived() {
        let c = MeterCounts::new(15, 12);
        assert_eq!(c.unregistered(), 3);
        assert_eq!(GroupSnapshot::from(c).unregistered, 3);
    }

    #[test]
    fn counts_add_componentwise() {
        let c = MeterCounts::new(15, 12).checked_add(MeterCounts::registered_only(2));
        assert_eq!(c, Some(MeterCounts::new(15, 14)));
    }

    #[test]
    fn overflowing_add_is_none() {
        assert_eq!(MeterCounts::new(i64::MAX, 0).checked_add(MeterCounts::new(1, 0)), None);
        assert_eq!(MeterCounts::new(5, i64::MAX).checked_add(MeterCounts::registered_only(1)), None);
    }
}
