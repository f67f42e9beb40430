pub mod pipeline;
pub mod config;
pub mod http;
pub mod sources;
pub mod sinks;
pub mod transform;
pub mod observability;
pub mod metrics_server;

pub use pipeline::{Pipeline, Envelope};
