//! Regional forecast pipeline for Tenki
//!
//! Loads the JMA region hierarchy, fetches per-region forecasts, normalizes
//! them per calendar day and keeps every fetch in a local SQLite history,
//! falling back to that history when the network fails.

pub mod catalog;
pub mod display;
pub mod error;
pub mod parser;
pub mod provider;
pub mod service;
pub mod store;
pub mod types;

pub use catalog::{Center, Office, RegionCatalog, RegionGroup};
pub use display::{cards, ForecastCard, WeatherIcon};
pub use error::ForecastError;
pub use parser::{parse_forecast, ForecastDocument};
pub use provider::ForecastClient;
pub use service::{FetchState, ForecastService};
pub use store::ForecastStore;
pub use types::*;
