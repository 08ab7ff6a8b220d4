//! Capability handlers: the tools a conversation can call.
//!
//! Each tool implements [`runtime::Tool`] with a typed argument record and
//! reaches its data through a small trait, so handlers can be exercised
//! against fakes:
//!
//! - [`WeatherTool`]: [`Geocoder`] ([`NominatimGeocoder`]) then
//!   [`ForecastSource`] ([`OpenMeteoForecast`] or [`AemetForecast`]).
//! - [`PopulationTool`]: [`PopulationSource`] ([`IneDataset`]).
//! - [`GitCloneTool`]: runs `git clone` in a working directory.
//!
//! [`Catalog`] turns a [`CapabilitiesConfig`] into a ready
//! [`runtime::ToolRegistry`] with the default keyword filters from
//! [`keywords`].

pub mod aemet;
mod catalog;
mod error;
pub mod forecast;
pub mod geocoding;
pub mod git;
mod http;
pub mod keywords;
pub mod population;
pub mod weather;

pub use aemet::AemetForecast;
pub use catalog::{ALL_TOOLS, CapabilitiesConfig, Catalog, ForecastProvider, KeywordOverride};
pub use error::{CatalogError, SourceError};
pub use forecast::{DailyForecast, ForecastSource, OpenMeteoForecast};
pub use geocoding::{Candidate, Country, Geocoder, NominatimGeocoder};
pub use git::GitCloneTool;
pub use population::{IneDataset, PlaceRecord, PopulationSource, PopulationTool};
pub use weather::{Clock, WeatherTool, today_at};
