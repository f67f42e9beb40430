//! Cumulative meter-installation ledger for transformer substations.
//!
//! Installation and registration events are folded into running totals kept
//! per date, per month and per year for every (substation, balance group).
//! See [`engine`] for how an event reaches every later record and
//! [`query`] for the read side.

pub mod cache;
pub mod db;
pub mod domain;
pub mod engine;
pub mod error;
pub mod ledger;
pub mod query;
pub mod validation;

pub use cache::SummaryCache;
pub use engine::{Accumulated, AccumulationOutcome};
pub use error::LedgerError;
pub use ledger::{Ledger, RetryPolicy};
pub use validation::{validate_installation, ValidationError};
