//! The tool-augmented conversation loop.

use crate::model::{Backend, ModelRequest, Usage};
use crate::tools::{ToolRegistry, ToolResult, ToolSchema};
use crate::{Error, Result};
use serde_json::Value;
use std::sync::Arc;
use storage::{HistoryStore, Message, Role, SessionId};
use tracing::{debug, info, warn};

/// Default sampling temperature of the post-tool model call.
pub const DEFAULT_FOLLOWUP_TEMPERATURE: f32 = 0.3;

/// Model-call settings for a conversation.
#[derive(Debug, Clone)]
pub struct ConversationConfig {
    pub system_prompt: Option<String>,
    /// Temperature of the first call. `None` leaves the model default.
    pub temperature: Option<f32>,
    /// Temperature of the call that follows tool execution.
    pub followup_temperature: Option<f32>,
}

impl Default for ConversationConfig {
    fn default() -> Self {
        Self {
            system_prompt: None,
            temperature: None,
            followup_temperature: Some(DEFAULT_FOLLOWUP_TEMPERATURE),
        }
    }
}

impl ConversationConfig {
    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }
}

/// Where a turn is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnState {
    AwaitingInput,
    ModelTurn1,
    ExecutingTools,
    ModelTurn2,
    Done,
}

/// One tool call executed during a turn.
#[derive(Debug, Clone)]
pub struct ToolInvocation {
    pub name: String,
    pub arguments: Value,
    pub result: ToolResult,
}

/// The result of a completed turn.
#[derive(Debug, Clone)]
pub struct TurnOutcome {
    pub answer: String,
    pub invocations: Vec<ToolInvocation>,
    /// Names of the tools offered on the first model call.
    pub offered_tools: Vec<String>,
    pub usage: Usage,
}

impl TurnOutcome {
    pub fn used_tools(&self) -> bool {
        !self.invocations.is_empty()
    }
}

struct Attached {
    store: Box<dyn HistoryStore>,
    session: SessionId,
}

/// A single conversation with a model and a tool registry.
///
/// Turns must not overlap; `turn` takes `&mut self` so the borrow checker
/// enforces one turn at a time.
pub struct Conversation<B: Backend> {
    backend: B,
    registry: Arc<ToolRegistry>,
    config: ConversationConfig,
    messages: Vec<Message>,
    history: Option<Attached>,
}

impl<B: Backend> Conversation<B> {
    pub fn new(backend: B, registry: Arc<ToolRegistry>, config: ConversationConfig) -> Self {
        let messages = config
            .system_prompt
            .iter()
            .map(Message::system)
            .collect();
        Self {
            backend,
            registry,
            config,
            messages,
            history: None,
        }
    }

    /// Persist completed turns to `store` under `session`.
    ///
    /// The stored history is loaded into memory first. Stored system
    /// messages are skipped; the configured prompt always leads.
    pub fn with_history(
        mut self,
        store: Box<dyn HistoryStore>,
        session: SessionId,
    ) -> Result<Self> {
        let stored = store.load(&session)?;
        debug!(session = %session, messages = stored.len(), "history loaded");
        self.messages
            .extend(stored.into_iter().filter(|m| m.role != Role::System));
        self.history = Some(Attached { store, session });
        Ok(self)
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn session(&self) -> Option<&SessionId> {
        self.history.as_ref().map(|h| &h.session)
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Forget the in-memory history. The system prompt and any stored
    /// history are kept.
    pub fn clear(&mut self) {
        let keep = usize::from(self.config.system_prompt.is_some());
        self.messages.truncate(keep);
    }

    /// Run one user turn to completion.
    pub async fn turn(&mut self, input: &str) -> Result<TurnOutcome> {
        let input = input.trim();
        if input.is_empty() {
            return Err(Error::EmptyInput);
        }

        let start = self.messages.len();
        trace_state(TurnState::AwaitingInput);
        self.messages.push(Message::user(input));
        let active: Vec<ToolSchema> = self.registry.active_schemas(input);
        let offered_tools: Vec<String> = active.iter().map(|s| s.name.clone()).collect();
        debug!(tools = ?offered_tools, "active tools");

        trace_state(TurnState::ModelTurn1);
        let request = ModelRequest::new(&self.messages)
            .with_tools(&active)
            .with_temperature(self.config.temperature);
        let first = match self.backend.call(request).await {
            Ok(response) => response,
            Err(e) => {
                warn!("model call failed, discarding input: {e}");
                self.messages.truncate(start);
                return Err(Error::Model(e));
            }
        };
        let mut usage = first.usage;
        let reply = assistant(first.message);
        let calls = reply.tool_calls.clone();
        self.messages.push(reply);

        if calls.is_empty() {
            trace_state(TurnState::Done);
            let answer = self.messages[self.messages.len() - 1].content.clone();
            self.persist(start, &answer)?;
            return Ok(TurnOutcome {
                answer,
                invocations: Vec::new(),
                offered_tools,
                usage,
            });
        }

        trace_state(TurnState::ExecutingTools);
        let mut invocations = Vec::with_capacity(calls.len());
        for call in calls {
            let result = match self.registry.dispatch(&call.name, &call.arguments).await {
                Ok(result) => result,
                Err(e) => {
                    warn!(tool = %call.name, "model requested an unavailable tool");
                    ToolResult::error(e)
                }
            };
            info!(tool = %call.name, error = result.is_error, "tool finished");
            self.messages.push(Message::tool(&call.name, &result.text));
            invocations.push(ToolInvocation {
                name: call.name,
                arguments: call.arguments,
                result,
            });
        }

        trace_state(TurnState::ModelTurn2);
        let request =
            ModelRequest::new(&self.messages).with_temperature(self.config.followup_temperature);
        let second = self.backend.call(request).await.map_err(|e| {
            warn!("follow-up model call failed: {e}");
            Error::FollowUp(e)
        })?;
        usage += second.usage;
        let mut reply = assistant(second.message);
        if reply.has_tool_calls() {
            debug!(
                calls = reply.tool_calls.len(),
                "ignoring tool calls on follow-up reply"
            );
            reply.tool_calls.clear();
        }
        let answer = reply.content.clone();
        self.messages.push(reply);

        trace_state(TurnState::Done);
        self.persist(start, &answer)?;
        Ok(TurnOutcome {
            answer,
            invocations,
            offered_tools,
            usage,
        })
    }

    fn persist(&self, start: usize, answer: &str) -> Result<()> {
        let Some(history) = &self.history else {
            return Ok(());
        };
        let increment = &self.messages[start..];
        history
            .store
            .append_all(&history.session, increment)
            .map_err(|source| Error::Persist {
                answer: answer.to_string(),
                source,
            })?;
        debug!(session = %history.session, messages = increment.len(), "turn persisted");
        Ok(())
    }
}

fn trace_state(state: TurnState) {
    debug!(?state, "turn state");
}

fn assistant(mut message: Message) -> Message {
    message.role = Role::Assistant;
    message.tool_name = None;
    message
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ModelError;
    use crate::testing::ScriptedBackend;
    use crate::tools::{ParamKind, ParamSpec, RelevanceFilter, Tool, ToolFailure};
    use serde::Deserialize;
    use serde_json::json;
    use storage::{FileHistoryStore, ToolCallRequest};

    struct Upper;

    #[derive(Deserialize)]
    struct UpperArgs {
        texto: String,
    }

    impl Tool for Upper {
        type Args = UpperArgs;

        fn schema(&self) -> ToolSchema {
            ToolSchema::new("mayusculas", "Pasa un texto a mayúsculas")
                .param(ParamSpec::required("texto", ParamKind::String, "texto"))
        }

        async fn call(&self, args: UpperArgs) -> std::result::Result<String, ToolFailure> {
            Ok(args.texto.to_uppercase())
        }
    }

    fn registry() -> Arc<ToolRegistry> {
        let mut registry = ToolRegistry::new();
        registry
            .register(Upper, RelevanceFilter::new(["mayusculas"], ["minusculas"]))
            .unwrap();
        Arc::new(registry)
    }

    fn call(name: &str, arguments: Value) -> ToolCallRequest {
        ToolCallRequest::new(name, arguments)
    }

    #[tokio::test]
    async fn plain_answer_without_tools() {
        let backend = ScriptedBackend::new().reply(Message::assistant("¡Hola!"));
        let mut conversation = Conversation::new(&backend, registry(), ConversationConfig::default());

        let outcome = conversation.turn("hola").await.unwrap();

        assert_eq!(outcome.answer, "¡Hola!");
        assert!(!outcome.used_tools());
        assert!(outcome.offered_tools.is_empty());
        assert_eq!(conversation.messages().len(), 2);
        let seen = backend.seen();
        assert_eq!(seen.len(), 1);
        assert!(seen[0].tools.is_empty());
    }

    #[tokio::test]
    async fn relevant_tools_are_offered() {
        let backend = ScriptedBackend::new().reply(Message::assistant("vale"));
        let mut conversation = Conversation::new(&backend, registry(), ConversationConfig::default());

        let outcome = conversation.turn("pon esto en MAYÚSCULAS").await.unwrap();

        assert_eq!(outcome.offered_tools, ["mayusculas"]);
        assert_eq!(backend.seen()[0].tools, ["mayusculas"]);
    }

    #[tokio::test]
    async fn each_call_yields_one_tool_message_in_order() {
        let calls = vec![
            call("mayusculas", json!({"texto": "uno"})),
            call("desconocida", json!({})),
            call("mayusculas", json!({})),
            call("mayusculas", json!({"texto": "dos"})),
        ];
        let backend = ScriptedBackend::new()
            .reply(Message::assistant_with_calls("", calls))
            .reply(Message::assistant("UNO y DOS"));
        let mut conversation = Conversation::new(&backend, registry(), ConversationConfig::default());

        let outcome = conversation.turn("mayusculas por favor").await.unwrap();

        assert_eq!(outcome.answer, "UNO y DOS");
        assert_eq!(outcome.invocations.len(), 4);
        assert_eq!(outcome.usage.total(), 30);

        let seen = backend.seen();
        assert_eq!(seen.len(), 2);
        assert!(seen[1].tools.is_empty());
        assert_eq!(seen[1].temperature, Some(DEFAULT_FOLLOWUP_TEMPERATURE));

        // user, assistant(calls), 4 tool messages
        let sent = &seen[1].messages;
        assert_eq!(sent.len(), 6);
        let tool_messages: Vec<_> = sent[2..].iter().collect();
        assert!(tool_messages.iter().all(|m| m.role == Role::Tool));
        assert_eq!(tool_messages[0].content, "UNO");
        assert!(tool_messages[1].content.starts_with("ERROR:"));
        assert!(tool_messages[1].content.contains("desconocida"));
        assert!(tool_messages[2].content.contains("texto"));
        assert_eq!(tool_messages[3].content, "DOS");
        assert_eq!(tool_messages[3].tool_name.as_deref(), Some("mayusculas"));

        assert_eq!(conversation.messages().len(), 7);
    }

    #[tokio::test]
    async fn first_call_failure_rolls_back_input() {
        let backend = ScriptedBackend::new().fail(ModelError::Network("connection refused".into()));
        let config = ConversationConfig::default().with_system_prompt("Eres Jandro");
        let mut conversation = Conversation::new(&backend, registry(), config);

        let err = conversation.turn("hola").await.unwrap_err();

        assert!(matches!(err, Error::Model(ModelError::Network(_))));
        assert_eq!(conversation.messages(), [Message::system("Eres Jandro")]);
    }

    #[tokio::test]
    async fn second_call_failure_keeps_tool_messages() {
        let backend = ScriptedBackend::new()
            .reply(Message::assistant_with_calls(
                "",
                vec![call("mayusculas", json!({"texto": "hola"}))],
            ))
            .fail(ModelError::Timeout { seconds: 120 });
        let mut conversation = Conversation::new(&backend, registry(), ConversationConfig::default());

        let err = conversation.turn("mayusculas").await.unwrap_err();

        assert!(matches!(err, Error::FollowUp(ModelError::Timeout { .. })));
        let roles: Vec<_> = conversation.messages().iter().map(|m| m.role).collect();
        assert_eq!(roles, [Role::User, Role::Assistant, Role::Tool]);
    }

    #[tokio::test]
    async fn empty_input_is_rejected() {
        let backend = ScriptedBackend::new();
        let mut conversation = Conversation::new(&backend, registry(), ConversationConfig::default());

        assert!(matches!(conversation.turn("   ").await, Err(Error::EmptyInput)));
        assert!(conversation.messages().is_empty());
        assert!(backend.seen().is_empty());
    }

    #[tokio::test]
    async fn completed_turns_are_persisted() {
        let dir = tempfile::tempdir().unwrap();
        let session = SessionId::parse("jandro").unwrap();
        let backend = ScriptedBackend::new()
            .reply(Message::assistant_with_calls(
                "",
                vec![call("mayusculas", json!({"texto": "hola"}))],
            ))
            .reply(Message::assistant("HOLA"))
            .fail(ModelError::Api("boom".into()));
        let mut conversation = Conversation::new(&backend, registry(), ConversationConfig::default())
            .with_history(Box::new(FileHistoryStore::new(dir.path())), session.clone())
            .unwrap();

        conversation.turn("mayusculas hola").await.unwrap();
        assert!(conversation.turn("otra").await.is_err());

        let stored = FileHistoryStore::new(dir.path()).load(&session).unwrap();
        let roles: Vec<_> = stored.iter().map(|m| m.role).collect();
        assert_eq!(
            roles,
            [Role::User, Role::Assistant, Role::Tool, Role::Assistant]
        );
        assert_eq!(stored[3].content, "HOLA");
    }

    #[tokio::test]
    async fn history_seeds_conversation() {
        let dir = tempfile::tempdir().unwrap();
        let session = SessionId::parse("ana").unwrap();
        let store = FileHistoryStore::new(dir.path());
        store
            .append_all(
                &session,
                &[Message::user("¿Te acuerdas?"), Message::assistant("Claro")],
            )
            .unwrap();

        let backend = ScriptedBackend::new().reply(Message::assistant("Sí"));
        let config = ConversationConfig::default().with_system_prompt("Eres Ana");
        let mut conversation = Conversation::new(&backend, registry(), config)
            .with_history(Box::new(store), session)
            .unwrap();
        conversation.turn("¿y ahora?").await.unwrap();

        let sent = &backend.seen()[0].messages;
        assert_eq!(sent.len(), 4);
        assert_eq!(sent[0], Message::system("Eres Ana"));
        assert_eq!(sent[1].content, "¿Te acuerdas?");

        conversation.clear();
        assert_eq!(conversation.messages(), [Message::system("Eres Ana")]);
    }
}
