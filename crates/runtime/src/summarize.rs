//! History summarization.
//!
//! A long history is compressed into one user/assistant pair by the model.
//! The previous history is always backed up by the store before it is
//! replaced, so nothing is lost.

use crate::model::{Backend, ModelError, ModelRequest};
use crate::{Error, Result};
use storage::{Backup, HistoryStore, Message, Role, SessionId};
use tracing::info;

const SUMMARIZER_SYSTEM_PROMPT: &str = "Eres un asistente que resume sin añadir explicaciones.";

/// Content of the user message that opens a summarized history.
pub const SUMMARY_MARKER: &str = "Resumen del historial previo";

const SUMMARY_TEMPERATURE: f32 = 0.3;

/// What a summarization did.
#[derive(Debug, Clone)]
pub struct SummaryOutcome {
    pub summary: String,
    pub backup: Backup,
    /// Number of messages that were replaced.
    pub replaced: usize,
}

/// Replace the history of `session` with a model-written summary.
///
/// `speaker` labels the assistant's lines in the transcript shown to the
/// model, usually the persona's display name. If the model call fails the
/// stored history is left untouched.
pub async fn summarize<S, B>(
    store: &S,
    backend: &B,
    session: &SessionId,
    speaker: &str,
) -> Result<SummaryOutcome>
where
    S: HistoryStore + ?Sized,
    B: Backend,
{
    let history = store.load(session)?;
    let transcript = transcript(&history, speaker);
    if transcript.trim().is_empty() {
        return Err(Error::NothingToSummarize(session.to_string()));
    }

    let messages = [
        Message::system(SUMMARIZER_SYSTEM_PROMPT),
        Message::user(summary_prompt(&transcript)),
    ];
    let request = ModelRequest::new(&messages).with_temperature(Some(SUMMARY_TEMPERATURE));
    let response = backend.call(request).await?;

    let summary = response.message.content.trim().to_string();
    if summary.is_empty() {
        return Err(Error::Model(ModelError::InvalidResponse(
            "empty summary".into(),
        )));
    }

    let backup = store.replace(
        session,
        &[Message::user(SUMMARY_MARKER), Message::assistant(&summary)],
    )?;
    info!(session = %session, replaced = history.len(), backup = %backup, "history summarized");

    Ok(SummaryOutcome {
        summary,
        backup,
        replaced: history.len(),
    })
}

/// Render a history as the plain-text transcript the summarizer reads.
pub fn transcript(messages: &[Message], speaker: &str) -> String {
    let mut out = String::new();
    for message in messages {
        let content = message.content.trim();
        if content.is_empty() {
            continue;
        }
        let label = match message.role {
            Role::System => continue,
            Role::User => "Usuario".to_string(),
            Role::Assistant => speaker.to_string(),
            Role::Tool => format!(
                "[{}]",
                message.tool_name.as_deref().unwrap_or("herramienta")
            ),
        };
        out.push_str(&label);
        out.push_str(": ");
        out.push_str(content);
        out.push('\n');
    }
    out
}

fn summary_prompt(transcript: &str) -> String {
    format!(
        "Eres un asistente que resume historiales de conversación.

Resumen SOLO del siguiente historial:

--------------------------------
{}
--------------------------------

Instrucciones:
- Haz un resumen breve y claro.
- No digas que falta contexto.
- No pidas más información.
- No menciones que no entiendes algo.
- No añadas explicaciones del proceso.
- NO DIGAS \"Aquí está el resumen\", solo entrega el contenido.

DEVUELVE ÚNICAMENTE EL RESUMEN, NADA MÁS.",
        transcript.trim_end()
    )
}
