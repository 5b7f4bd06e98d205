pub mod config;
pub mod error;
pub mod housing;
pub mod telemetry;
