//! Persona profiles.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use storage::SessionId;
use tracing::debug;

/// Who the assistant plays in a persona session.
///
/// Stored as `<contexts_dir>/<session>.json`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersonaProfile {
    #[serde(rename = "nombre", default)]
    pub name: String,
    #[serde(rename = "relacion", default)]
    pub relationship: String,
    #[serde(rename = "personalidad", default)]
    pub personality: String,
    #[serde(rename = "proyectos", default)]
    pub projects: Vec<String>,
}

impl PersonaProfile {
    /// Load the profile for `session`. A missing file is not an error.
    pub fn load(dir: &Path, session: &SessionId) -> Result<Option<Self>> {
        let path = dir.join(format!("{}.json", session.as_str()));
        let raw = match std::fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "no persona profile");
                return Ok(None);
            }
            Err(e) => return Err(Error::Storage(e.into())),
        };
        let profile = serde_json::from_str(&raw)
            .map_err(|e| Error::Persona(format!("{}: {e}", path.display())))?;
        Ok(Some(profile))
    }

    /// Render the profile as a system prompt.
    pub fn system_prompt(&self) -> String {
        let mut prompt = format!(
            "Nombre: {}\nRelación con el usuario: {}\nPersonalidad: {}\n",
            self.name, self.relationship, self.personality
        );
        if !self.projects.is_empty() {
            prompt.push_str("Proyectos y actividades:\n");
            for project in &self.projects {
                prompt.push_str("- ");
                prompt.push_str(project);
                prompt.push('\n');
            }
        }
        prompt.trim_end().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_prompt() {
        let profile = PersonaProfile {
            name: "Jandro".into(),
            relationship: "amigo de la infancia".into(),
            personality: "bromista".into(),
            projects: vec!["huerto urbano".into(), "banda de rock".into()],
        };
        assert_eq!(
            profile.system_prompt(),
            "Nombre: Jandro\n\
             Relación con el usuario: amigo de la infancia\n\
             Personalidad: bromista\n\
             Proyectos y actividades:\n\
             - huerto urbano\n\
             - banda de rock"
        );
    }

    #[test]
    fn loads_from_json() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("jandro.json"),
            r#"{"nombre": "Jandro", "relacion": "amigo", "personalidad": "tranquilo"}"#,
        )
        .unwrap();

        let session = SessionId::parse("Jandro").unwrap();
        let profile = PersonaProfile::load(dir.path(), &session).unwrap().unwrap();
        assert_eq!(profile.name, "Jandro");
        assert!(profile.projects.is_empty());
        assert!(!profile.system_prompt().contains("Proyectos"));
    }

    #[test]
    fn missing_profile_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let session = SessionId::parse("nadie").unwrap();
        assert_eq!(PersonaProfile::load(dir.path(), &session).unwrap(), None);
    }

    #[test]
    fn malformed_profile_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("roto.json"), "{nombre").unwrap();
        let session = SessionId::parse("roto").unwrap();
        assert!(matches!(
            PersonaProfile::load(dir.path(), &session),
            Err(Error::Persona(_))
        ));
    }
}
