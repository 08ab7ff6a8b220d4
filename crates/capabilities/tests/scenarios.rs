//! End-to-end turns through the conversation loop with fake services.

use capabilities::population::{Observation, PlaceRecord};
use capabilities::weather::Clock;
use capabilities::{
    Candidate, Country, DailyForecast, ForecastSource, Geocoder, PopulationSource,
    PopulationTool, SourceError, WeatherTool, keywords,
};
use chrono::NaiveDate;
use runtime::{
    Backend, Conversation, ConversationConfig, ModelError, ModelRequest, ModelResponse,
    ToolRegistry, Usage,
};
use serde_json::{Value, json};
use std::sync::{Arc, Mutex};
use storage::{Message, Role, ToolCallRequest};

/// Requests one tool call when tools are offered, then answers with the
/// tool output it was given.
struct RelayModel {
    call: ToolCallRequest,
    offered: Mutex<Vec<Vec<String>>>,
}

impl RelayModel {
    fn new(tool: &str, arguments: Value) -> Self {
        Self {
            call: ToolCallRequest::new(tool, arguments),
            offered: Mutex::new(Vec::new()),
        }
    }
}

impl Backend for RelayModel {
    async fn call(&self, request: ModelRequest<'_>) -> Result<ModelResponse, ModelError> {
        let names = request.tools.iter().map(|t| t.name.clone()).collect();
        self.offered.lock().unwrap().push(names);

        let last = request
            .messages
            .last()
            .ok_or_else(|| ModelError::InvalidResponse("no messages".into()))?;
        let message = match last.role {
            Role::User if !request.tools.is_empty() => {
                Message::assistant_with_calls("", vec![self.call.clone()])
            }
            Role::Tool => Message::assistant(format!("Esto es lo que sé:\n{}", last.content)),
            _ => Message::assistant("No puedo ayudarte con eso."),
        };
        Ok(ModelResponse {
            message,
            usage: Usage::default(),
        })
    }
}

struct FakeGeocoder;

impl Geocoder for FakeGeocoder {
    async fn search(&self, query: &str, _country: &Country) -> Result<Vec<Candidate>, SourceError> {
        assert_eq!(query, "Madrid");
        Ok(vec![Candidate {
            name: "Madrid".into(),
            latitude: 40.4167,
            longitude: -3.7033,
            country_code: Some("es".into()),
        }])
    }
}

struct FakeForecast {
    requested: Mutex<Option<u32>>,
}

impl ForecastSource for FakeForecast {
    fn max_days(&self) -> u32 {
        16
    }

    async fn daily(&self, _lat: f64, _lon: f64, days: u32) -> Result<Vec<DailyForecast>, SourceError> {
        *self.requested.lock().unwrap() = Some(days);
        let today = NaiveDate::from_ymd_opt(2026, 10, 15).unwrap();
        Ok((0..days)
            .map(|i| DailyForecast {
                date: today + chrono::Days::new(u64::from(i)),
                min_temp: 9.0 + f64::from(i),
                max_temp: 21.0 + f64::from(i),
                precipitation: Some(20.0),
                weather_code: Some(61),
                summary: None,
                wind: Some(18.0),
            })
            .collect())
    }
}

struct FakeIne;

impl PopulationSource for FakeIne {
    async fn records(&self) -> Result<Vec<PlaceRecord>, SourceError> {
        Ok(vec![PlaceRecord {
            name: "Sevilla. Total. ".into(),
            code: "41".into(),
            observations: (1996..=2021)
                .map(|year| Observation {
                    year,
                    value: Some(1_900_000.0),
                })
                .collect(),
        }])
    }
}

fn registry() -> Arc<ToolRegistry> {
    let weather = WeatherTool::new(
        FakeGeocoder,
        FakeForecast {
            requested: Mutex::new(None),
        },
    )
    .with_clock(Clock::Fixed(NaiveDate::from_ymd_opt(2026, 10, 15).unwrap()));

    let mut registry = ToolRegistry::new();
    registry.register(weather, keywords::weather()).unwrap();
    registry
        .register(PopulationTool::new(FakeIne), keywords::population())
        .unwrap();
    Arc::new(registry)
}

#[tokio::test]
async fn tomorrow_in_madrid() {
    let model = RelayModel::new(
        "obtener_pronostico_temperatura",
        json!({"ciudad": "Madrid", "dias": "3"}),
    );
    let mut conversation = Conversation::new(&model, registry(), ConversationConfig::default());

    let outcome = conversation
        .turn("¿Qué tiempo hará mañana en Madrid?")
        .await
        .unwrap();

    assert_eq!(
        *model.offered.lock().unwrap(),
        [vec!["obtener_pronostico_temperatura".to_string()], vec![]]
    );
    assert_eq!(outcome.invocations.len(), 1);
    assert!(!outcome.invocations[0].result.is_error);

    let tomorrow = outcome
        .answer
        .lines()
        .find(|line| line.starts_with("MAÑANA"))
        .unwrap();
    assert_eq!(
        tomorrow,
        "MAÑANA (Viernes): 10-22°C, Lluvia ligera, lluvia 20%, viento 18 km/h"
    );
}

#[tokio::test]
async fn sevilla_population_without_data_for_year() {
    let model = RelayModel::new(
        "consultar_poblacion_ine",
        json!({"lugar": "Sevilla", "año": 2030}),
    );
    let mut conversation = Conversation::new(&model, registry(), ConversationConfig::default());

    let outcome = conversation
        .turn("¿Cuántos habitantes tiene Sevilla en 2030?")
        .await
        .unwrap();

    assert_eq!(
        *model.offered.lock().unwrap(),
        [vec!["consultar_poblacion_ine".to_string()], vec![]]
    );
    let result = &outcome.invocations[0].result;
    assert!(!result.is_error);
    assert!(result.text.contains("no hay datos para el año 2030"));
    assert!(result.text.contains("entre 1996 y 2021"));
    assert!(outcome.answer.contains("Se encontró Sevilla"));
}

#[tokio::test]
async fn twenty_days_become_sixteen() {
    let model = RelayModel::new(
        "obtener_pronostico_temperatura",
        json!({"ciudad": "Madrid", "dias": 20}),
    );
    let mut conversation = Conversation::new(&model, registry(), ConversationConfig::default());

    let outcome = conversation
        .turn("Pronóstico de temperatura en Madrid para 20 días")
        .await
        .unwrap();

    let result = &outcome.invocations[0].result;
    assert!(!result.is_error);
    // header plus one line per day
    assert_eq!(result.text.lines().count(), 17);
}

#[tokio::test]
async fn missing_argument_is_reported_to_the_model() {
    let model = RelayModel::new("consultar_poblacion_ine", json!({"lugar": "Sevilla"}));
    let mut conversation = Conversation::new(&model, registry(), ConversationConfig::default());

    let outcome = conversation
        .turn("¿Cuántos habitantes tiene Sevilla?")
        .await
        .unwrap();

    let result = &outcome.invocations[0].result;
    assert!(result.is_error);
    assert!(result.text.starts_with("ERROR:"));
    assert!(result.text.contains("año"));
    let roles: Vec<_> = conversation.messages().iter().map(|m| m.role).collect();
    assert_eq!(
        roles,
        [Role::User, Role::Assistant, Role::Tool, Role::Assistant]
    );
}

#[tokio::test]
async fn small_talk_offers_no_tools() {
    let model = RelayModel::new("obtener_pronostico_temperatura", json!({}));
    let mut conversation = Conversation::new(&model, registry(), ConversationConfig::default());

    let outcome = conversation.turn("Cuéntame un chiste").await.unwrap();

    assert!(!outcome.used_tools());
    assert_eq!(*model.offered.lock().unwrap(), [Vec::<String>::new()]);
}
