mod balance_group;
mod counts;
mod event;
mod records;

pub use balance_group::BalanceGroup;
pub use counts::{GroupSnapshot, MeterCounts};
pub use event::{InstallationEvent, RegistrationEvent, TechnicalMeterReport};
pub use records::{
    MonthlyAggregate, PointRecord, Substation, SubstationSummary, SummaryDates,
    TechnicalMeterStats, YearlyAggregate,
};
