//! Default relevance keywords per tool.

use runtime::RelevanceFilter;

pub const WEATHER_INCLUDE: &[&str] = &[
    "temperatura", "tiempo", "clima", "lluvia", "viento", "pronostico", "calor", "frio",
    "grados", "soleado", "nublado", "despejado", "meteorolog", "nevar", "nieve", "tormenta",
    "cielo", "semana", "hoy", "mañana", "hará", "estará",
];

/// Population and general-knowledge words that must not trigger a forecast.
pub const WEATHER_EXCLUDE: &[&str] = &[
    "habitantes", "poblacion", "gente", "personas", "demografia", "superficie", "extension",
    "economia", "historia", "cultura",
];

pub const POPULATION_INCLUDE: &[&str] = &[
    "habitantes", "poblacion", "censo", "padron", "demografia", "cuanta gente",
    "cuantas personas", "vecinos", "instituto nacional de estadistica",
];

pub const POPULATION_EXCLUDE: &[&str] = &["temperatura", "lluvia", "pronostico"];

pub const GIT_INCLUDE: &[&str] = &[
    "clonar", "clone", "git", "repositorio", "repo", "github", "gitlab", "bitbucket",
    "descargar código", "bajar repo", "obtener código",
];

pub fn weather() -> RelevanceFilter {
    RelevanceFilter::new(WEATHER_INCLUDE.iter().copied(), WEATHER_EXCLUDE.iter().copied())
}

pub fn population() -> RelevanceFilter {
    RelevanceFilter::new(
        POPULATION_INCLUDE.iter().copied(),
        POPULATION_EXCLUDE.iter().copied(),
    )
}

pub fn git() -> RelevanceFilter {
    RelevanceFilter::new(GIT_INCLUDE.iter().copied(), std::iter::empty::<&str>())
}
