//! Place name geocoding.

use crate::SourceError;
use crate::http::get_json;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;

pub const NOMINATIM_URL: &str = "https://nominatim.openstreetmap.org";
pub const USER_AGENT: &str = concat!("charla/", env!("CARGO_PKG_VERSION"));

const TIMEOUT: Duration = Duration::from_secs(10);
const MAX_CANDIDATES: u8 = 5;

/// The country place lookups are restricted to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Country {
    /// Name appended to queries and used in messages, e.g. `España`.
    pub name: String,
    /// ISO 3166-1 alpha-2 code, lowercase.
    pub code: String,
}

impl Default for Country {
    fn default() -> Self {
        Self {
            name: "España".to_string(),
            code: "es".to_string(),
        }
    }
}

/// One geocoding match.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
    /// Lowercase ISO country code, when the service reported one.
    pub country_code: Option<String>,
}

impl Candidate {
    pub fn is_in(&self, country: &Country) -> bool {
        self.country_code
            .as_deref()
            .is_some_and(|code| code.eq_ignore_ascii_case(&country.code))
    }
}

/// Resolves free-text place names to coordinates.
///
/// An empty result is a valid answer, not an error.
pub trait Geocoder: Send + Sync + 'static {
    fn search(
        &self,
        query: &str,
        country: &Country,
    ) -> impl Future<Output = Result<Vec<Candidate>, SourceError>> + Send;
}

#[derive(Debug, Deserialize)]
struct ApiPlace {
    lat: String,
    lon: String,
    #[serde(default)]
    display_name: String,
    #[serde(default)]
    address: ApiAddress,
}

#[derive(Debug, Default, Deserialize)]
struct ApiAddress {
    city: Option<String>,
    town: Option<String>,
    village: Option<String>,
    municipality: Option<String>,
    country_code: Option<String>,
}

/// OpenStreetMap Nominatim search.
pub struct NominatimGeocoder {
    client: reqwest::Client,
    base_url: String,
}

impl Default for NominatimGeocoder {
    fn default() -> Self {
        Self::new(NOMINATIM_URL)
    }
}

impl NominatimGeocoder {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn to_candidate(place: ApiPlace, query: &str) -> Option<Candidate> {
        let latitude = place.lat.trim().parse().ok()?;
        let longitude = place.lon.trim().parse().ok()?;
        let address = place.address;
        let name = address
            .city
            .or(address.town)
            .or(address.village)
            .or(address.municipality)
            .or_else(|| {
                place
                    .display_name
                    .split(',')
                    .next()
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
            })
            .unwrap_or_else(|| query.trim().to_string());
        Some(Candidate {
            name,
            latitude,
            longitude,
            country_code: address.country_code.map(|c| c.to_lowercase()),
        })
    }
}

impl Geocoder for NominatimGeocoder {
    async fn search(&self, query: &str, country: &Country) -> Result<Vec<Candidate>, SourceError> {
        let q = format!("{}, {}", query.trim(), country.name);
        let limit = MAX_CANDIDATES.to_string();
        let request = self
            .client
            .get(format!("{}/search", self.base_url))
            .header(reqwest::header::USER_AGENT, USER_AGENT)
            .query(&[
                ("q", q.as_str()),
                ("format", "json"),
                ("limit", limit.as_str()),
                ("addressdetails", "1"),
                ("countrycodes", country.code.as_str()),
                ("accept-language", "es"),
            ]);
        let places: Vec<ApiPlace> = get_json("nominatim", request, TIMEOUT).await?;
        Ok(places
            .into_iter()
            .filter_map(|place| Self::to_candidate(place, query))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use tiny_http::{Response, Server};

    #[tokio::test]
    async fn parses_nominatim_results() {
        let server = Server::http("127.0.0.1:0").unwrap();
        let addr = server.server_addr().to_ip().unwrap();
        let handle = thread::spawn(move || {
            let request = server.recv().unwrap();
            let url = request.url().to_string();
            let body = r#"[
                {"lat": "40.4167", "lon": "-3.7033", "display_name": "Madrid, Comunidad de Madrid, España",
                 "address": {"city": "Madrid", "country_code": "es"}},
                {"lat": "x", "lon": "y", "display_name": "broken"},
                {"lat": "14.9", "lon": "-85.1", "display_name": "Madrid, Honduras",
                 "address": {"village": "Madrid", "country_code": "hn"}}
            ]"#;
            let _ = request.respond(Response::from_string(body));
            url
        });

        let geocoder = NominatimGeocoder::new(format!("http://{addr}"));
        let candidates = geocoder.search("Madrid", &Country::default()).await.unwrap();

        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0].name, "Madrid");
        assert!(candidates[0].is_in(&Country::default()));
        assert!(!candidates[1].is_in(&Country::default()));

        let url = handle.join().unwrap();
        assert!(url.starts_with("/search?"));
        assert!(url.contains("countrycodes=es"));
        assert!(url.contains("addressdetails=1"));
    }

    #[tokio::test]
    async fn http_error_is_reported() {
        let server = Server::http("127.0.0.1:0").unwrap();
        let addr = server.server_addr().to_ip().unwrap();
        thread::spawn(move || {
            let request = server.recv().unwrap();
            let _ = request.respond(Response::from_string("slow down").with_status_code(429));
        });

        let geocoder = NominatimGeocoder::new(format!("http://{addr}"));
        let err = geocoder.search("Madrid", &Country::default()).await.unwrap_err();
        assert!(matches!(err, SourceError::Status { status: 429, .. }));
    }

    #[test]
    fn display_name_fallback() {
        let place = ApiPlace {
            lat: "41.5".into(),
            lon: "2.4".into(),
            display_name: "Mataró, Maresme, Barcelona, España".into(),
            address: ApiAddress::default(),
        };
        let candidate = NominatimGeocoder::to_candidate(place, "mataro").unwrap();
        assert_eq!(candidate.name, "Mataró");
        assert_eq!(candidate.country_code, None);
    }
}
