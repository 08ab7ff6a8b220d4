mod config;
mod error;
mod logging;

use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use capabilities::{Catalog, GitCloneTool, git};
use chrono::{Local, TimeZone};
use clap::{ArgAction, Parser, Subcommand};
use runtime::{
    Conversation, ConversationConfig, OllamaBackend, PersonaProfile, ToolRegistry, TurnOutcome,
};
use serde_json::Value;
use storage::{FileHistoryStore, HistoryStore, SessionId, SqliteHistoryStore};
use tracing::{debug, info, warn};

use config::{Config, HistoryBackend};
use error::{Error, Result};

const SYSTEM_PROMPT: &str = "Eres un asistente útil. Responde en español, de forma clara y \
                             concisa. Usa las herramientas solo cuando la pregunta lo requiera.";
const SQLITE_FILE: &str = "historial.db";

#[derive(Parser)]
#[command(name = "charla")]
#[command(about = "Tool-augmented conversations with a local Ollama model", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file (default: ./charla.toml if present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Increase log output (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    /// Only log errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start an interactive chat session
    Chat {
        /// Persona whose profile and history to use
        #[arg(short, long)]
        persona: Option<String>,
    },
    /// Ask a single question and print the answer
    Ask {
        /// The question
        #[arg(required = true, num_args = 1..)]
        question: Vec<String>,
        /// Persona whose profile and history to use
        #[arg(short, long)]
        persona: Option<String>,
    },
    /// Replace a persona's history with a model-written summary
    Summarize {
        #[arg(short, long)]
        persona: String,
    },
    /// List stored sessions
    Sessions {
        /// Show only the last N sessions
        #[arg(short, long, default_value = "10")]
        limit: usize,
    },
    /// Print a persona's stored history
    History {
        #[arg(short, long)]
        persona: String,
        /// Show only the last N messages
        #[arg(short, long)]
        limit: Option<usize>,
    },
    /// Call a tool directly, bypassing the model
    Tool {
        /// Tool name
        name: String,
        /// Arguments as a JSON object
        #[arg(short, long)]
        args: Option<String>,
    },
    /// Serve the configured tools over MCP on stdio
    Mcp,
    /// Check Ollama, the configured model and git
    Doctor,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    logging::init(cli.verbose, cli.quiet);

    if let Err(e) = run(cli).await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let (mut config, source) = Config::discover(cli.config.as_deref())?;
    config.apply_env(|key| std::env::var(key).ok());
    match &source {
        Some(path) => debug!(path = %path.display(), "config loaded"),
        None => debug!("no config file, using defaults"),
    }
    let app = App { config, source };

    match cli.command {
        Some(Commands::Chat { persona }) => cmd_chat(&app, persona.as_deref()).await,
        None => cmd_chat(&app, None).await,
        Some(Commands::Ask { question, persona }) => {
            cmd_ask(&app, &question.join(" "), persona.as_deref()).await
        }
        Some(Commands::Summarize { persona }) => cmd_summarize(&app, &persona).await,
        Some(Commands::Sessions { limit }) => cmd_sessions(&app, limit),
        Some(Commands::History { persona, limit }) => cmd_history(&app, &persona, limit),
        Some(Commands::Tool { name, args }) => cmd_tool(&app, &name, args.as_deref()).await,
        Some(Commands::Mcp) => cmd_mcp(&app).await,
        Some(Commands::Doctor) => cmd_doctor(&app).await,
    }
}

/// Resolved configuration plus the constructors every command shares.
struct App {
    config: Config,
    source: Option<PathBuf>,
}

impl App {
    fn backend(&self) -> OllamaBackend {
        let model = &self.config.model;
        let mut builder = OllamaBackend::builder()
            .base_url(&model.url)
            .model(&model.name)
            .timeout(Duration::from_secs(model.timeout_secs));
        if let Some(keep_alive) = &model.keep_alive {
            builder = builder.keep_alive(keep_alive);
        }
        builder.build()
    }

    fn registry(&self) -> Result<Arc<ToolRegistry>> {
        let registry = Catalog::new(self.config.tools.clone()).build()?;
        debug!(tools = ?registry.names(), "tool registry ready");
        Ok(Arc::new(registry))
    }

    fn history_dir(&self) -> PathBuf {
        self.config
            .history
            .dir
            .clone()
            .or_else(|| dirs_data_dir().map(|d| d.join("historial")))
            .unwrap_or_else(|| PathBuf::from(".charla/historial"))
    }

    fn store(&self) -> Result<Box<dyn HistoryStore>> {
        let dir = self.history_dir();
        Ok(match self.config.history.backend {
            HistoryBackend::File => Box::new(FileHistoryStore::new(dir)),
            HistoryBackend::Sqlite => {
                std::fs::create_dir_all(&dir)?;
                Box::new(SqliteHistoryStore::open(dir.join(SQLITE_FILE))?)
            }
        })
    }

    fn persona(&self, session: &SessionId) -> Result<Option<PersonaProfile>> {
        Ok(PersonaProfile::load(&self.config.history.contexts_dir, session)?)
    }

    /// A conversation for `persona`, or an unsaved one when `persist` is off
    /// and no persona is given.
    fn conversation(
        &self,
        persona: Option<&str>,
        persist: bool,
    ) -> Result<Conversation<OllamaBackend>> {
        let model = &self.config.model;
        let session = match persona {
            Some(name) => Some(SessionId::parse(name)?),
            None if persist => Some(SessionId::generate()),
            None => None,
        };

        let profile = match &session {
            Some(session) => self.persona(session)?,
            None => None,
        };
        let prompt = match &profile {
            Some(profile) => profile.system_prompt(),
            None => model
                .system_prompt
                .clone()
                .unwrap_or_else(|| SYSTEM_PROMPT.to_string()),
        };
        let config = ConversationConfig {
            system_prompt: Some(prompt),
            temperature: model.temperature,
            followup_temperature: Some(model.followup_temperature),
        };

        let conversation = Conversation::new(self.backend(), self.registry()?, config);
        match session {
            Some(session) => Ok(conversation.with_history(self.store()?, session)?),
            None => Ok(conversation),
        }
    }
}

async fn cmd_chat(app: &App, persona: Option<&str>) -> Result<()> {
    println!("charla v{}", env!("CARGO_PKG_VERSION"));

    let mut conversation = app.conversation(persona, true)?;
    let backend = conversation.backend();
    println!("Model: {} @ {}", backend.model(), backend.base_url());
    println!("Tools: {}", conversation.registry().names().join(", "));
    if let Some(session) = conversation.session() {
        let loaded = conversation
            .messages()
            .iter()
            .filter(|m| m.role != storage::Role::System)
            .count();
        println!("Session: {session} ({loaded} messages loaded)");
    }
    println!("Type /help for commands, /bye or Ctrl+D to exit.\n");

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    loop {
        print!("> ");
        stdout.flush()?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            // EOF
            break;
        }

        let input = line.trim();
        match input {
            "" => continue,
            "/bye" | "/exit" | "/quit" => break,
            "/clear" => {
                conversation.clear();
                println!("Conversation cleared.\n");
            }
            "/help" => print_chat_help(),
            "/tools" => print_tools(conversation.registry()),
            command if command.starts_with('/') => {
                println!("Unknown command {command}. Type /help.\n");
            }
            _ => match conversation.turn(input).await {
                Ok(outcome) => print_outcome(&outcome),
                Err(runtime::Error::Persist { answer, source }) => {
                    println!("\n{answer}\n");
                    eprintln!("Warning: answer not saved: {source}\n");
                }
                Err(e) => eprintln!("Error: {e}\n"),
            },
        }
    }

    println!("\nBye.");
    Ok(())
}

fn print_outcome(outcome: &TurnOutcome) {
    for invocation in &outcome.invocations {
        let marker = if invocation.result.is_error { "failed" } else { "ok" };
        println!("  [{} {marker}]", invocation.name);
    }
    println!("\n{}\n", outcome.answer);
    debug!(
        prompt_tokens = outcome.usage.prompt_tokens,
        completion_tokens = outcome.usage.completion_tokens,
        "turn usage"
    );
}

fn print_chat_help() {
    println!("  /tools   list the available tools");
    println!("  /clear   forget this conversation (stored history is kept)");
    println!("  /help    show this help");
    println!("  /bye     exit\n");
}

fn print_tools(registry: &ToolRegistry) {
    if registry.is_empty() {
        println!("No tools enabled.\n");
        return;
    }
    for schema in registry.list_schemas() {
        println!("  {}", schema.name);
        println!("      {}", schema.description);
        for param in &schema.params {
            let required = if param.required { "required" } else { "optional" };
            println!("      - {} ({required}): {}", param.name, param.description);
        }
    }
    println!();
}

async fn cmd_ask(app: &App, question: &str, persona: Option<&str>) -> Result<()> {
    let mut conversation = app.conversation(persona, false)?;
    match conversation.turn(question).await {
        Ok(outcome) => {
            info!(tools = outcome.invocations.len(), "answered");
            println!("{}", outcome.answer);
            Ok(())
        }
        Err(runtime::Error::Persist { answer, source }) => {
            println!("{answer}");
            warn!("answer not saved: {source}");
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

async fn cmd_summarize(app: &App, persona: &str) -> Result<()> {
    let session = SessionId::parse(persona)?;
    let speaker = app
        .persona(&session)?
        .map(|p| p.name)
        .filter(|name| !name.trim().is_empty())
        .unwrap_or_else(|| session.display_name());

    let store = app.store()?;
    let backend = app.backend();
    let outcome = runtime::summarize(store.as_ref(), &backend, &session, &speaker).await?;

    println!(
        "Summarized {} messages of '{session}'. Backup: {}\n",
        outcome.replaced, outcome.backup
    );
    println!("{}", outcome.summary);
    Ok(())
}

fn cmd_sessions(app: &App, limit: usize) -> Result<()> {
    let store = app.store()?;
    let sessions = store.list_sessions()?;

    if sessions.is_empty() {
        println!("No sessions found in {}.", app.history_dir().display());
        return Ok(());
    }

    println!("{:<36}  {:<8}  LAST ACTIVITY", "SESSION", "MSGS");
    println!("{}", "-".repeat(64));

    for summary in sessions.into_iter().take(limit) {
        let last = summary
            .last_activity
            .map(|t| {
                Local
                    .from_utc_datetime(&t.naive_utc())
                    .format("%Y-%m-%d %H:%M")
                    .to_string()
            })
            .unwrap_or_else(|| "-".to_string());
        println!("{:<36}  {:<8}  {last}", summary.id, summary.message_count);
    }

    Ok(())
}

fn cmd_history(app: &App, persona: &str, limit: Option<usize>) -> Result<()> {
    let session = SessionId::parse(persona)?;
    let messages = app.store()?.load(&session)?;

    if messages.is_empty() {
        println!("No history for '{session}'.");
        return Ok(());
    }

    let skip = limit.map_or(0, |n| messages.len().saturating_sub(n));
    println!("Session: {session} ({} messages)\n", messages.len());
    println!(
        "{}",
        runtime::transcript(&messages[skip..], &session.display_name())
    );
    Ok(())
}

async fn cmd_tool(app: &App, name: &str, args: Option<&str>) -> Result<()> {
    let arguments: Value = match args {
        Some(raw) => serde_json::from_str(raw)
            .map_err(|e| Error::InvalidArgs(format!("--args is not valid JSON: {e}")))?,
        None => Value::Object(Default::default()),
    };

    let registry = app.registry()?;
    let result = registry.dispatch(name, &arguments).await?;
    if result.is_error {
        return Err(Error::ToolFailed(result.text));
    }
    println!("{}", result.text);
    Ok(())
}

async fn cmd_mcp(app: &App) -> Result<()> {
    let registry = app.registry()?;
    info!(tools = registry.len(), "serving tools over stdio");
    mcp::serve_stdio(registry).await?;
    Ok(())
}

async fn cmd_doctor(app: &App) -> Result<()> {
    let mut failures = 0;
    let mut check = |ok: bool, name: &str, detail: String| {
        if !ok {
            failures += 1;
        }
        let status = if ok { "ok" } else { "FAIL" };
        println!("[{status:<4}] {name:<8} {detail}");
    };

    let config = match &app.source {
        Some(path) => path.display().to_string(),
        None => "defaults".to_string(),
    };
    check(true, "config", config);

    let backend = app.backend();
    let health = backend.health_check().await;
    check(
        health.reachable,
        "ollama",
        if health.reachable {
            format!("reachable at {}", backend.base_url())
        } else {
            format!("not reachable at {} (is `ollama serve` running?)", backend.base_url())
        },
    );
    if health.reachable {
        check(
            health.model_available,
            "model",
            if health.model_available {
                backend.model().to_string()
            } else {
                format!(
                    "{} not installed, run `ollama pull {}` (installed: {})",
                    backend.model(),
                    backend.model(),
                    health.models.join(", ")
                )
            },
        );
    }

    let tools = &app.config.tools;
    if tools.enabled.iter().any(|t| t == git::TOOL_NAME) {
        let tool = GitCloneTool::new(&tools.git_workdir);
        match tool.git_version().await {
            Ok(version) => check(true, "git", version),
            Err(e) => check(false, "git", e.to_string()),
        }
    }

    check(
        true,
        "history",
        format!("{:?} in {}", app.config.history.backend, app.history_dir().display()),
    );

    match failures {
        0 => Ok(()),
        n => Err(Error::Unhealthy(n)),
    }
}

fn dirs_data_dir() -> Option<PathBuf> {
    #[cfg(target_os = "macos")]
    {
        std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".local/share/charla"))
    }
    #[cfg(target_os = "linux")]
    {
        std::env::var_os("XDG_DATA_HOME")
            .map(PathBuf::from)
            .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".local/share")))
            .map(|p| p.join("charla"))
    }
    #[cfg(target_os = "windows")]
    {
        std::env::var_os("APPDATA").map(|h| PathBuf::from(h).join("charla"))
    }
    #[cfg(not(any(target_os = "macos", target_os = "linux", target_os = "windows")))]
    {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use storage::Message;

    fn app(dir: &std::path::Path, backend: HistoryBackend) -> App {
        let mut config = Config::default();
        config.history.backend = backend;
        config.history.dir = Some(dir.join("historial"));
        config.history.contexts_dir = dir.join("contextos");
        App {
            config,
            source: None,
        }
    }

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_subcommands() {
        let cli = Cli::try_parse_from(["charla", "-vv", "ask", "¿Qué", "tiempo", "hace?"]).unwrap();
        assert_eq!(cli.verbose, 2);
        match cli.command {
            Some(Commands::Ask { question, persona }) => {
                assert_eq!(question.join(" "), "¿Qué tiempo hace?");
                assert_eq!(persona, None);
            }
            _ => panic!("expected ask"),
        }

        let cli = Cli::try_parse_from([
            "charla",
            "tool",
            "consultar_poblacion_ine",
            "--args",
            r#"{"lugar":"Sevilla"}"#,
            "--config",
            "otro.toml",
        ])
        .unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("otro.toml")));
        assert!(matches!(cli.command, Some(Commands::Tool { .. })));

        assert!(Cli::try_parse_from(["charla", "-q", "-v", "doctor"]).is_err());
        assert!(Cli::try_parse_from(["charla", "summarize"]).is_err());
    }

    #[test]
    fn stores_follow_the_configured_backend() {
        let dir = tempfile::tempdir().unwrap();
        let session = SessionId::parse("jandro").unwrap();

        for backend in [HistoryBackend::File, HistoryBackend::Sqlite] {
            let app = app(dir.path(), backend);
            let store = app.store().unwrap();
            store.append(&session, &Message::user("Hola")).unwrap();
            assert_eq!(app.store().unwrap().load(&session).unwrap().len(), 1);
        }
        assert!(dir.path().join("historial").join(SQLITE_FILE).exists());
    }

    #[test]
    fn persona_profile_becomes_system_prompt() {
        let dir = tempfile::tempdir().unwrap();
        let app = app(dir.path(), HistoryBackend::File);
        std::fs::create_dir_all(&app.config.history.contexts_dir).unwrap();
        std::fs::write(
            app.config.history.contexts_dir.join("jandro.json"),
            r#"{"nombre": "Jandro", "relacion": "amigo", "personalidad": "bromista"}"#,
        )
        .unwrap();

        let conversation = app.conversation(Some("Jandro"), false).unwrap();
        assert_eq!(conversation.session().map(|s| s.as_str()), Some("jandro"));
        assert!(conversation.messages()[0].content.starts_with("Nombre: Jandro"));

        let anonymous = app.conversation(None, false).unwrap();
        assert!(anonymous.session().is_none());
        assert_eq!(anonymous.messages()[0].content, SYSTEM_PROMPT);
    }

    #[test]
    fn invalid_persona_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let app = app(dir.path(), HistoryBackend::File);
        assert!(matches!(
            app.conversation(Some("../etc"), false),
            Err(Error::Storage(storage::Error::InvalidSessionId(_)))
        ));
    }

    #[tokio::test]
    async fn tool_command_rejects_bad_json() {
        let dir = tempfile::tempdir().unwrap();
        let app = app(dir.path(), HistoryBackend::File);
        assert!(matches!(
            cmd_tool(&app, "consultar_poblacion_ine", Some("{lugar")).await,
            Err(Error::InvalidArgs(_))
        ));
        assert!(matches!(
            cmd_tool(&app, "no_existe", None).await,
            Err(Error::Tool(runtime::ToolError::UnknownTool(_)))
        ));
    }

    #[tokio::test]
    async fn tool_errors_fail_the_command() {
        let dir = tempfile::tempdir().unwrap();
        let app = app(dir.path(), HistoryBackend::File);
        let err = cmd_tool(&app, "consultar_poblacion_ine", Some(r#"{"lugar":"Sevilla"}"#))
            .await
            .unwrap_err();
        match err {
            Error::ToolFailed(text) => assert!(text.starts_with("ERROR:")),
            other => panic!("unexpected {other:?}"),
        }
    }
}
