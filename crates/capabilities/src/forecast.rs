//! Daily weather forecasts.

use crate::SourceError;
use crate::http::get_json;
use chrono::NaiveDate;
use chrono_tz::Tz;
use serde::Deserialize;
use std::future::Future;
use std::time::Duration;

pub const OPEN_METEO_URL: &str = "https://api.open-meteo.com";

/// Longest forecast Open-Meteo serves.
pub const OPEN_METEO_MAX_DAYS: u32 = 16;

const TIMEOUT: Duration = Duration::from_secs(15);
const DAILY_METRICS: &str =
    "temperature_2m_max,temperature_2m_min,precipitation_probability_max,weathercode,windspeed_10m_max";

/// One forecast day.
#[derive(Debug, Clone, PartialEq)]
pub struct DailyForecast {
    pub date: NaiveDate,
    pub min_temp: f64,
    pub max_temp: f64,
    /// Maximum precipitation probability, percent.
    pub precipitation: Option<f64>,
    /// WMO weather interpretation code.
    pub weather_code: Option<i64>,
    /// Sky description given by the source itself, preferred over the code.
    pub summary: Option<String>,
    /// Maximum wind speed, km/h.
    pub wind: Option<f64>,
}

pub trait ForecastSource: Send + Sync + 'static {
    /// The longest forecast, in days, this source can produce.
    fn max_days(&self) -> u32;

    fn daily(
        &self,
        latitude: f64,
        longitude: f64,
        days: u32,
    ) -> impl Future<Output = Result<Vec<DailyForecast>, SourceError>> + Send;
}

#[derive(Debug, Deserialize)]
struct ApiForecast {
    daily: ApiDaily,
}

#[derive(Debug, Deserialize)]
struct ApiDaily {
    time: Vec<String>,
    #[serde(default)]
    temperature_2m_max: Vec<Option<f64>>,
    #[serde(default)]
    temperature_2m_min: Vec<Option<f64>>,
    #[serde(default)]
    precipitation_probability_max: Vec<Option<f64>>,
    #[serde(default)]
    weathercode: Vec<Option<i64>>,
    #[serde(default)]
    windspeed_10m_max: Vec<Option<f64>>,
}

impl ApiDaily {
    fn into_days(self) -> Result<Vec<DailyForecast>, SourceError> {
        let at = |v: &[Option<f64>], i: usize| v.get(i).copied().flatten();
        let mut days = Vec::with_capacity(self.time.len());
        for (i, time) in self.time.iter().enumerate() {
            let date = NaiveDate::parse_from_str(time, "%Y-%m-%d").map_err(|e| {
                SourceError::Decode {
                    service: "open-meteo",
                    message: format!("bad date {time:?}: {e}"),
                }
            })?;
            let (Some(max_temp), Some(min_temp)) =
                (at(&self.temperature_2m_max, i), at(&self.temperature_2m_min, i))
            else {
                continue;
            };
            days.push(DailyForecast {
                date,
                min_temp,
                max_temp,
                precipitation: at(&self.precipitation_probability_max, i),
                weather_code: self.weathercode.get(i).copied().flatten(),
                summary: None,
                wind: at(&self.windspeed_10m_max, i),
            });
        }
        Ok(days)
    }
}

/// Open-Meteo `/v1/forecast`.
pub struct OpenMeteoForecast {
    client: reqwest::Client,
    base_url: String,
    timezone: Tz,
}

impl Default for OpenMeteoForecast {
    fn default() -> Self {
        Self::new(OPEN_METEO_URL)
    }
}

impl OpenMeteoForecast {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            timezone: chrono_tz::Europe::Madrid,
        }
    }

    /// IANA zone the daily dates are computed in.
    pub fn with_timezone(mut self, timezone: Tz) -> Self {
        self.timezone = timezone;
        self
    }
}

impl ForecastSource for OpenMeteoForecast {
    fn max_days(&self) -> u32 {
        OPEN_METEO_MAX_DAYS
    }

    async fn daily(
        &self,
        latitude: f64,
        longitude: f64,
        days: u32,
    ) -> Result<Vec<DailyForecast>, SourceError> {
        let days = days.clamp(1, OPEN_METEO_MAX_DAYS);
        let request = self
            .client
            .get(format!("{}/v1/forecast", self.base_url))
            .query(&[
                ("latitude", latitude.to_string()),
                ("longitude", longitude.to_string()),
                ("daily", DAILY_METRICS.to_string()),
                ("timezone", self.timezone.name().to_string()),
                ("forecast_days", days.to_string()),
            ]);
        let forecast: ApiForecast = get_json("open-meteo", request, TIMEOUT).await?;
        forecast.daily.into_days()
    }
}
