pub mod config;
pub mod error;
pub mod gateway;
pub mod providers;
pub mod telemetry;
