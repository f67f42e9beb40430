pub mod ledger;

pub use ledger::LedgerSink;
