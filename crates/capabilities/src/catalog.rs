//! Builds a ready tool registry from configuration.

use crate::aemet::{AEMET_URL, AemetForecast};
use crate::forecast::{ForecastSource, OPEN_METEO_URL, OpenMeteoForecast};
use crate::geocoding::{Country, NOMINATIM_URL, NominatimGeocoder};
use crate::git::{self, GitCloneTool};
use crate::population::{self, INE_TABLE_URL, IneDataset, PopulationTool};
use crate::weather::{self, Clock, WeatherTool};
use crate::{CatalogError, keywords};
use chrono_tz::Tz;
use runtime::{RangePolicy, RelevanceFilter, ToolRegistry};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;
use tracing::debug;

/// Every tool this crate provides, in registration order.
pub const ALL_TOOLS: &[&str] = &[weather::TOOL_NAME, population::TOOL_NAME, git::TOOL_NAME];

/// Where the weather tool gets its forecasts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ForecastProvider {
    #[default]
    OpenMeteo,
    /// AEMET OpenData, Spain only. Needs `aemet_api_key`.
    Aemet,
}

/// Replaces a tool's default keywords.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KeywordOverride {
    pub include: Option<Vec<String>>,
    pub exclude: Option<Vec<String>>,
    /// Offer the tool on every turn.
    pub always: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CapabilitiesConfig {
    pub enabled: Vec<String>,
    pub range_policy: RangePolicy,
    pub call_timeout_secs: u64,
    pub country: Country,
    /// IANA zone forecast dates and "today" are reckoned in.
    pub timezone: String,
    pub forecast: ForecastProvider,
    pub nominatim_url: String,
    pub open_meteo_url: String,
    pub aemet_url: String,
    pub aemet_api_key: Option<String>,
    pub ine_url: String,
    pub git_workdir: PathBuf,
    pub keywords: BTreeMap<String, KeywordOverride>,
}

impl Default for CapabilitiesConfig {
    fn default() -> Self {
        Self {
            enabled: ALL_TOOLS.iter().map(|s| s.to_string()).collect(),
            range_policy: RangePolicy::Clamp,
            call_timeout_secs: 60,
            country: Country::default(),
            timezone: "Europe/Madrid".to_string(),
            forecast: ForecastProvider::OpenMeteo,
            nominatim_url: NOMINATIM_URL.to_string(),
            open_meteo_url: OPEN_METEO_URL.to_string(),
            aemet_url: AEMET_URL.to_string(),
            aemet_api_key: None,
            ine_url: INE_TABLE_URL.to_string(),
            git_workdir: PathBuf::from("repos"),
            keywords: BTreeMap::new(),
        }
    }
}

/// Assembles the configured tools into a [`ToolRegistry`].
#[derive(Debug, Clone)]
pub struct Catalog {
    config: CapabilitiesConfig,
    clock: Clock,
}

impl Catalog {
    pub fn new(config: CapabilitiesConfig) -> Self {
        Self {
            config,
            clock: Clock::System,
        }
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn build(&self) -> Result<ToolRegistry, CatalogError> {
        let config = &self.config;
        let timezone: Tz = config
            .timezone
            .parse()
            .map_err(|_| CatalogError::InvalidTimezone(config.timezone.clone()))?;
        let mut registry = ToolRegistry::new()
            .with_range_policy(config.range_policy)
            .with_call_timeout(Duration::from_secs(config.call_timeout_secs));

        for name in &config.enabled {
            match name.as_str() {
                weather::TOOL_NAME => {
                    let relevance = self.relevance(name, keywords::weather());
                    match config.forecast {
                        ForecastProvider::OpenMeteo => {
                            let source = OpenMeteoForecast::new(&config.open_meteo_url)
                                .with_timezone(timezone);
                            registry.register(self.weather(source, timezone), relevance)?;
                        }
                        ForecastProvider::Aemet => {
                            let key = config
                                .aemet_api_key
                                .as_deref()
                                .filter(|k| !k.trim().is_empty())
                                .ok_or(CatalogError::MissingApiKey("aemet"))?;
                            let source = AemetForecast::new(&config.aemet_url, key);
                            registry.register(self.weather(source, timezone), relevance)?;
                        }
                    }
                }
                population::TOOL_NAME => {
                    let tool = PopulationTool::new(IneDataset::new(&config.ine_url));
                    registry.register(tool, self.relevance(name, keywords::population()))?;
                }
                git::TOOL_NAME => {
                    let tool = GitCloneTool::new(&config.git_workdir);
                    registry.register(tool, self.relevance(name, keywords::git()))?;
                }
                other => return Err(CatalogError::UnknownTool(other.to_string())),
            }
            debug!(tool = %name, "tool enabled");
        }
        Ok(registry)
    }

    fn weather<F: ForecastSource>(
        &self,
        source: F,
        timezone: Tz,
    ) -> WeatherTool<NominatimGeocoder, F> {
        WeatherTool::new(NominatimGeocoder::new(&self.config.nominatim_url), source)
            .with_country(self.config.country.clone())
            .with_timezone(timezone)
            .with_clock(self.clock)
    }

    fn relevance(&self, tool: &str, default: RelevanceFilter) -> RelevanceFilter {
        let Some(custom) = self.config.keywords.get(tool) else {
            return default;
        };
        if custom.always {
            return RelevanceFilter::always();
        }
        let include = custom
            .include
            .clone()
            .unwrap_or_else(|| default.include().to_vec());
        let exclude = custom
            .exclude
            .clone()
            .unwrap_or_else(|| default.exclude().to_vec());
        RelevanceFilter::new(include, exclude)
    }
}
