pub mod pipeline;
pub mod config;
pub mod sources;
pub mod sinks;
pub mod transform;
pub mod observability;
pub mod metrics_server;
pub mod runner;

pub use pipeline::{Pipeline, Envelope, RawPayload};
