//! The place population tool, backed by the INE municipal register.

use crate::SourceError;
use crate::http::get_json;
use runtime::tools::fold;
use runtime::{ParamKind, ParamSpec, Tool, ToolFailure, ToolSchema};
use serde::Deserialize;
use serde_json::Value;
use std::future::Future;
use std::time::Duration;
use tracing::debug;

pub const TOOL_NAME: &str = "consultar_poblacion_ine";

/// Population by province and capital, table 2852.
pub const INE_TABLE_URL: &str = "https://servicios.ine.es/wstempus/js/ES/DATOS_TABLA/2852?tip=AM";

const TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    pub year: i32,
    pub value: Option<f64>,
}

/// One named series of the dataset.
#[derive(Debug, Clone, PartialEq)]
pub struct PlaceRecord {
    pub name: String,
    pub code: String,
    pub observations: Vec<Observation>,
}

impl PlaceRecord {
    /// Whether this is the all-sexes series for `query`.
    fn matches(&self, query: &str) -> bool {
        let name = fold(&self.name);
        name.contains(query)
            && name.contains("total")
            && !name.contains("hombres")
            && !name.contains("mujeres")
    }

    fn year_range(&self) -> Option<(i32, i32)> {
        let years = self
            .observations
            .iter()
            .filter(|o| o.value.is_some())
            .map(|o| o.year);
        let min = years.clone().min()?;
        let max = years.max()?;
        Some((min, max))
    }
}

/// A whole-dataset population source; filtering happens client side.
pub trait PopulationSource: Send + Sync + 'static {
    fn records(&self) -> impl Future<Output = Result<Vec<PlaceRecord>, SourceError>> + Send;
}

#[derive(Debug, Deserialize)]
struct ApiRecord {
    #[serde(rename = "Nombre")]
    name: String,
    #[serde(rename = "COD", default)]
    code: String,
    #[serde(rename = "Data", default)]
    data: Vec<ApiObservation>,
}

#[derive(Debug, Deserialize)]
struct ApiObservation {
    #[serde(rename = "Anyo")]
    year: i32,
    #[serde(rename = "Valor")]
    value: Option<f64>,
}

/// INE Tempus3 table fetch.
pub struct IneDataset {
    client: reqwest::Client,
    url: String,
}

impl Default for IneDataset {
    fn default() -> Self {
        Self::new(INE_TABLE_URL)
    }
}

impl IneDataset {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
        }
    }
}

impl PopulationSource for IneDataset {
    async fn records(&self) -> Result<Vec<PlaceRecord>, SourceError> {
        let request = self
            .client
            .get(&self.url)
            .header(reqwest::header::USER_AGENT, crate::geocoding::USER_AGENT)
            .header(reqwest::header::ACCEPT, "application/json");
        let raw: Vec<Value> = get_json("ine", request, TIMEOUT).await?;
        let total = raw.len();
        let records: Vec<PlaceRecord> = raw
            .into_iter()
            .filter_map(|v| serde_json::from_value::<ApiRecord>(v).ok())
            .map(|r| PlaceRecord {
                name: r.name,
                code: r.code,
                observations: r
                    .data
                    .into_iter()
                    .map(|o| Observation {
                        year: o.year,
                        value: o.value,
                    })
                    .collect(),
            })
            .collect();
        debug!(total, usable = records.len(), "ine dataset fetched");
        Ok(records)
    }
}

/// Format with `.` as the thousands separator.
pub fn format_thousands(n: i64) -> String {
    let digits = n.unsigned_abs().to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3 + 1);
    if n < 0 {
        out.push('-');
    }
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push('.');
        }
        out.push(c);
    }
    out
}

/// Answer a population question from `records`.
pub fn lookup(records: &[PlaceRecord], place: &str, year: i32) -> String {
    let query = fold(place.trim());
    let Some(record) = records.iter().find(|r| r.matches(&query)) else {
        return format!(
            "No se encontró '{place}' en la base de datos del INE. \
             Incluye provincias y capitales de provincia de España."
        );
    };

    let value = record
        .observations
        .iter()
        .find(|o| o.year == year)
        .and_then(|o| o.value);
    match value {
        Some(value) => format!(
            "Población de {place} en {year}:\n\
             - Lugar: {}\n\
             - Código INE: {}\n\
             - Población: {} habitantes\n\
             - Fuente: INE (www.ine.es)",
            record.name,
            if record.code.is_empty() { "N/A" } else { record.code.as_str() },
            format_thousands(value.round() as i64),
        ),
        None => {
            let mut message =
                format!("Se encontró {place} pero no hay datos para el año {year}.");
            if let Some((first, last)) = record.year_range() {
                message.push_str(&format!(" Hay datos entre {first} y {last}."));
            }
            message
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct PopulationArgs {
    pub lugar: String,
    #[serde(rename = "año")]
    pub year: i64,
}

/// Population of a Spanish province or capital for one year.
pub struct PopulationTool<S> {
    source: S,
}

impl<S: PopulationSource> PopulationTool<S> {
    pub fn new(source: S) -> Self {
        Self { source }
    }
}

impl<S: PopulationSource> Tool for PopulationTool<S> {
    type Args = PopulationArgs;

    fn schema(&self) -> ToolSchema {
        ToolSchema::new(
            TOOL_NAME,
            "Consulta la población oficial de provincias y capitales de España en el \
             Instituto Nacional de Estadística (INE).",
        )
        .param(ParamSpec::required(
            "lugar",
            ParamKind::String,
            "Nombre de la provincia o ciudad (ej: Madrid, Sevilla, Zaragoza)",
        ))
        .param(ParamSpec::required(
            "año",
            ParamKind::Integer,
            "Año para el que se consulta la población",
        ))
    }

    async fn call(&self, args: PopulationArgs) -> Result<String, ToolFailure> {
        if args.lugar.trim().is_empty() {
            return Err(ToolFailure::InvalidInput("'lugar' is empty".into()));
        }
        let year = i32::try_from(args.year)
            .map_err(|_| ToolFailure::InvalidInput(format!("year {} is out of range", args.year)))?;
        let records = self.source.records().await?;
        Ok(lookup(&records, &args.lugar, year))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use tiny_http::{Response, Server};

    fn record(name: &str, code: &str, data: &[(i32, f64)]) -> PlaceRecord {
        PlaceRecord {
            name: name.into(),
            code: code.into(),
            observations: data
                .iter()
                .map(|&(year, value)| Observation {
                    year,
                    value: Some(value),
                })
                .collect(),
        }
    }

    fn dataset() -> Vec<PlaceRecord> {
        vec![
            record("Sevilla. Hombres. ", "41", &[(2021, 937_000.0)]),
            record("Sevilla. Total. ", "41", &[(2020, 1_950_219.0), (2021, 1_948_393.0)]),
            record("Ávila. Total. ", "05", &[(2021, 158_421.0)]),
        ]
    }

    #[test]
    fn thousands_separator() {
        assert_eq!(format_thousands(0), "0");
        assert_eq!(format_thousands(999), "999");
        assert_eq!(format_thousands(1_948_393), "1.948.393");
        assert_eq!(format_thousands(-12_000), "-12.000");
    }

    #[test]
    fn finds_total_series() {
        let text = lookup(&dataset(), "sevilla", 2021);
        assert!(text.contains("- Lugar: Sevilla. Total."));
        assert!(text.contains("- Código INE: 41"));
        assert!(text.contains("1.948.393 habitantes"));
    }

    #[test]
    fn accent_insensitive_match() {
        let text = lookup(&dataset(), "avila", 2021);
        assert!(text.contains("158.421"));
    }

    #[test]
    fn missing_year_lists_range() {
        let text = lookup(&dataset(), "Sevilla", 2030);
        assert_eq!(
            text,
            "Se encontró Sevilla pero no hay datos para el año 2030. Hay datos entre 2020 y 2021."
        );
    }

    #[test]
    fn unknown_place() {
        let text = lookup(&dataset(), "Gotham", 2021);
        assert!(text.starts_with("No se encontró 'Gotham'"));
    }

    #[tokio::test]
    async fn fetches_and_skips_malformed_records() {
        let server = Server::http("127.0.0.1:0").unwrap();
        let addr = server.server_addr().to_ip().unwrap();
        thread::spawn(move || {
            let request = server.recv().unwrap();
            let body = r#"[
                {"COD": "DPOP160", "Nombre": "Madrid. Total. ", "Data": [{"Anyo": 2021, "Valor": 6751251.0}]},
                "garbage",
                {"COD": "X"}
            ]"#;
            let _ = request.respond(Response::from_string(body));
        });

        let tool = PopulationTool::new(IneDataset::new(format!("http://{addr}/tabla")));
        let text = tool
            .call(PopulationArgs {
                lugar: "Madrid".into(),
                year: 2021,
            })
            .await
            .unwrap();
        assert!(text.contains("6.751.251 habitantes"));
    }
}
