pub mod configuration;
pub mod error;
pub mod snapshot;
pub mod startup;
pub mod store;
pub mod telemetry;
