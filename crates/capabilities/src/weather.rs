//! The weather forecast tool.

use crate::forecast::{DailyForecast, ForecastSource};
use crate::geocoding::{Country, Geocoder};
use chrono::{DateTime, Datelike, NaiveDate, Utc, Weekday};
use chrono_tz::Tz;
use runtime::{ParamKind, ParamSpec, Tool, ToolFailure, ToolSchema};
use serde::Deserialize;
use std::fmt::Write;
use tracing::{debug, info};

pub const TOOL_NAME: &str = "obtener_pronostico_temperatura";
pub const DEFAULT_DAYS: i64 = 3;

/// Source of "today" for relative day labels.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Clock {
    #[default]
    System,
    Fixed(NaiveDate),
}

impl Clock {
    /// Today's date in `timezone`, the zone the forecast dates are in.
    pub fn today(self, timezone: Tz) -> NaiveDate {
        match self {
            Self::System => today_at(Utc::now(), timezone),
            Self::Fixed(date) => date,
        }
    }
}

pub fn today_at(now: DateTime<Utc>, timezone: Tz) -> NaiveDate {
    now.with_timezone(&timezone).date_naive()
}

/// Spanish description of a WMO weather code.
pub fn describe_weather_code(code: i64) -> &'static str {
    match code {
        0 => "Despejado",
        1 => "Mayormente despejado",
        2 => "Parcialmente nublado",
        3 => "Nublado",
        45 => "Niebla",
        48 => "Niebla con escarcha",
        51 => "Llovizna ligera",
        53 => "Llovizna",
        55 => "Llovizna intensa",
        61 => "Lluvia ligera",
        63 => "Lluvia",
        65 => "Lluvia intensa",
        71 => "Nevada ligera",
        73 => "Nevada",
        75 => "Nevada intensa",
        80 => "Chubascos",
        81 => "Chubascos fuertes",
        82 => "Chubascos muy fuertes",
        95 => "Tormenta",
        96 => "Tormenta con granizo",
        99 => "Tormenta fuerte",
        _ => "Variable",
    }
}

fn weekday_name(weekday: Weekday) -> &'static str {
    match weekday {
        Weekday::Mon => "Lunes",
        Weekday::Tue => "Martes",
        Weekday::Wed => "Miércoles",
        Weekday::Thu => "Jueves",
        Weekday::Fri => "Viernes",
        Weekday::Sat => "Sábado",
        Weekday::Sun => "Domingo",
    }
}

fn day_label(date: NaiveDate, today: NaiveDate) -> String {
    match (date - today).num_days() {
        0 => "HOY".to_string(),
        1 => "MAÑANA".to_string(),
        _ => date.format("%d/%m").to_string(),
    }
}

/// Render a forecast as the text handed back to the model.
pub fn format_forecast(place: &str, days: &[DailyForecast], today: NaiveDate) -> String {
    let mut out = format!("Pronóstico para {place}:\n");
    for day in days {
        let description = day
            .summary
            .as_deref()
            .unwrap_or_else(|| day.weather_code.map_or("Variable", describe_weather_code));
        // Missing readings are "n/d", never a fake zero.
        let rain = day
            .precipitation
            .map_or_else(|| "n/d".to_string(), |p| format!("{p:.0}%"));
        let wind = day
            .wind
            .map_or_else(|| "n/d".to_string(), |w| format!("{w:.0} km/h"));
        let _ = writeln!(
            out,
            "{} ({}): {:.0}-{:.0}°C, {description}, lluvia {rain}, viento {wind}",
            day_label(day.date, today),
            weekday_name(day.date.weekday()),
            day.min_temp,
            day.max_temp,
        );
    }
    out.trim_end().to_string()
}

#[derive(Debug, Deserialize)]
pub struct WeatherArgs {
    pub ciudad: String,
    pub dias: i64,
}

/// Multi-day forecast for a place in the configured country.
pub struct WeatherTool<G, F> {
    geocoder: G,
    forecast: F,
    country: Country,
    timezone: Tz,
    clock: Clock,
}

impl<G: Geocoder, F: ForecastSource> WeatherTool<G, F> {
    pub fn new(geocoder: G, forecast: F) -> Self {
        Self {
            geocoder,
            forecast,
            country: Country::default(),
            timezone: chrono_tz::Europe::Madrid,
            clock: Clock::System,
        }
    }

    pub fn with_country(mut self, country: Country) -> Self {
        self.country = country;
        self
    }

    /// Zone "today" is taken in for the HOY/MAÑANA labels.
    pub fn with_timezone(mut self, timezone: Tz) -> Self {
        self.timezone = timezone;
        self
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }
}

impl<G: Geocoder, F: ForecastSource> Tool for WeatherTool<G, F> {
    type Args = WeatherArgs;

    fn schema(&self) -> ToolSchema {
        let max_days = i64::from(self.forecast.max_days());
        ToolSchema::new(
            TOOL_NAME,
            format!(
                "Obtiene el pronóstico del tiempo (temperaturas, lluvia y viento) para cualquier \
                 ciudad o pueblo de {}. Usar SOLO para preguntas sobre tiempo, clima o temperatura.",
                self.country.name
            ),
        )
        .param(ParamSpec::required(
            "ciudad",
            ParamKind::String,
            "Nombre de la ciudad o pueblo (ej: Madrid, Mataró, Alcobendas)",
        ))
        .param(
            ParamSpec::optional(
                "dias",
                ParamKind::Integer,
                format!("Número de días de pronóstico, entre 1 y {max_days}. Por defecto {DEFAULT_DAYS}."),
            )
            .with_default(DEFAULT_DAYS)
            .with_range(1, max_days),
        )
    }

    async fn call(&self, args: WeatherArgs) -> Result<String, ToolFailure> {
        let city = args.ciudad.trim();
        if city.is_empty() {
            return Err(ToolFailure::InvalidInput("'ciudad' is empty".into()));
        }

        let candidates = self.geocoder.search(city, &self.country).await?;
        debug!(city, candidates = candidates.len(), "geocoded");
        let Some(place) = candidates.into_iter().find(|c| c.is_in(&self.country)) else {
            info!(city, "place not found");
            return Ok(format!(
                "No encontré la ciudad '{city}' en {}. Verifica el nombre e intenta de nuevo.",
                self.country.name
            ));
        };

        let days = u32::try_from(args.dias)
            .unwrap_or(1)
            .clamp(1, self.forecast.max_days());
        let forecast = self
            .forecast
            .daily(place.latitude, place.longitude, days)
            .await?;
        if forecast.is_empty() {
            return Err(ToolFailure::Execution(
                "the forecast service returned no days".into(),
            ));
        }

        Ok(format_forecast(&place.name, &forecast, self.clock.today(self.timezone)))
    }
}
