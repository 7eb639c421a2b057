// Mock price generator: simulated quotes served over HTTP for local runs and tests
pub mod prices;  // bounded random walk per (asset, market)
pub mod server;  // axum routes

pub use prices::{GeneratorConfig, GeneratorError, PriceBook};
pub use server::{app, serve};
