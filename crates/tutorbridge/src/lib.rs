pub mod config;
pub mod error;
pub mod marketplace;
pub mod store;
pub mod telemetry;
