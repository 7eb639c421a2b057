pub mod config;
pub mod engine;
pub mod generator;
pub mod market_data;
pub mod telemetry;
