//! AEMET OpenData forecasts, for Spanish municipalities.
//!
//! Every AEMET endpoint answers with an envelope whose `datos` field is the
//! URL of the actual payload, so each lookup is two requests. The forecast
//! is per municipality: coordinates are mapped to the nearest entry of the
//! `maestro/municipios` register first.

use crate::SourceError;
use crate::forecast::{DailyForecast, ForecastSource};
use crate::http::{get_json, get_latin1_json};
use chrono::NaiveDate;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

pub const AEMET_URL: &str = "https://opendata.aemet.es/opendata/api";

/// Longest daily forecast AEMET serves.
pub const AEMET_MAX_DAYS: u32 = 7;

const SERVICE: &str = "aemet";
const TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(default)]
    descripcion: String,
    estado: u16,
    datos: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Municipality {
    id: String,
    nombre: String,
    latitud_dec: Value,
    longitud_dec: Value,
}

impl Municipality {
    fn coordinates(&self) -> Option<(f64, f64)> {
        Some((number(&self.latitud_dec)?, number(&self.longitud_dec)?))
    }

    /// Forecast code, the register id without its `id` prefix.
    fn code(&self) -> &str {
        self.id.strip_prefix("id").unwrap_or(&self.id)
    }
}

/// The register sends coordinates as strings, tolerate numbers too.
fn number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

#[derive(Debug, Deserialize)]
struct Prediction {
    prediccion: PredictionDays,
}

#[derive(Debug, Deserialize)]
struct PredictionDays {
    #[serde(default)]
    dia: Vec<Day>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Day {
    fecha: String,
    #[serde(default)]
    temperatura: Temperature,
    #[serde(default)]
    prob_precipitacion: Vec<Period>,
    #[serde(default)]
    estado_cielo: Vec<Sky>,
    #[serde(default)]
    viento: Vec<Wind>,
}

#[derive(Debug, Default, Deserialize)]
struct Temperature {
    maxima: Option<f64>,
    minima: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct Period {
    value: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct Sky {
    #[serde(default)]
    descripcion: String,
}

#[derive(Debug, Deserialize)]
struct Wind {
    velocidad: Option<f64>,
}

impl Day {
    fn into_forecast(self) -> Result<Option<DailyForecast>, SourceError> {
        let date = self.fecha.split('T').next().unwrap_or_default();
        let date = NaiveDate::parse_from_str(date, "%Y-%m-%d").map_err(|e| SourceError::Decode {
            service: SERVICE,
            message: format!("bad date {:?}: {e}", self.fecha),
        })?;
        let (Some(max_temp), Some(min_temp)) = (self.temperatura.maxima, self.temperatura.minima)
        else {
            return Ok(None);
        };
        let max = |values: Vec<Option<f64>>| values.into_iter().flatten().reduce(f64::max);
        Ok(Some(DailyForecast {
            date,
            min_temp,
            max_temp,
            precipitation: max(self.prob_precipitacion.into_iter().map(|p| p.value).collect()),
            weather_code: None,
            summary: self
                .estado_cielo
                .into_iter()
                .map(|s| s.descripcion)
                .find(|d| !d.trim().is_empty()),
            wind: max(self.viento.into_iter().map(|w| w.velocidad).collect()),
        }))
    }
}

/// AEMET `prediccion/especifica/municipio/diaria`.
pub struct AemetForecast {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl AemetForecast {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        }
    }

    /// Follow the `datos` link of the envelope at `path`.
    async fn fetch<T: DeserializeOwned>(&self, path: &str) -> Result<T, SourceError> {
        let request = self
            .client
            .get(format!("{}/{path}", self.base_url))
            .query(&[("api_key", self.api_key.as_str())]);
        let envelope: Envelope = get_json(SERVICE, request, TIMEOUT).await?;
        if envelope.estado != 200 {
            debug!(estado = envelope.estado, descripcion = %envelope.descripcion, "aemet refused");
            return Err(SourceError::Status {
                service: SERVICE,
                status: envelope.estado,
            });
        }
        let datos = envelope.datos.ok_or_else(|| SourceError::Decode {
            service: SERVICE,
            message: "envelope without a data link".into(),
        })?;
        get_latin1_json(SERVICE, self.client.get(datos), TIMEOUT).await
    }

    async fn nearest_municipality(
        &self,
        latitude: f64,
        longitude: f64,
    ) -> Result<Municipality, SourceError> {
        let register: Vec<Municipality> = self.fetch("maestro/municipios").await?;
        let scale = latitude.to_radians().cos();
        register
            .into_iter()
            .filter_map(|m| {
                let (lat, lon) = m.coordinates()?;
                let distance = (lat - latitude).powi(2) + ((lon - longitude) * scale).powi(2);
                Some((distance, m))
            })
            .min_by(|a, b| a.0.total_cmp(&b.0))
            .map(|(_, m)| m)
            .ok_or_else(|| SourceError::Decode {
                service: SERVICE,
                message: "municipality register is empty".into(),
            })
    }
}

impl ForecastSource for AemetForecast {
    fn max_days(&self) -> u32 {
        AEMET_MAX_DAYS
    }

    async fn daily(
        &self,
        latitude: f64,
        longitude: f64,
        days: u32,
    ) -> Result<Vec<DailyForecast>, SourceError> {
        let municipality = self.nearest_municipality(latitude, longitude).await?;
        debug!(code = municipality.code(), name = %municipality.nombre, "aemet municipality");

        let path = format!(
            "prediccion/especifica/municipio/diaria/{}",
            municipality.code()
        );
        let predictions: Vec<Prediction> = self.fetch(&path).await?;
        let Some(prediction) = predictions.into_iter().next() else {
            return Ok(Vec::new());
        };

        let mut forecast = Vec::new();
        for day in prediction.prediccion.dia {
            if let Some(day) = day.into_forecast()? {
                forecast.push(day);
            }
        }
        forecast.truncate(days.clamp(1, AEMET_MAX_DAYS) as usize);
        Ok(forecast)
    }
}
