mod config;
mod error;
mod server;

use std::future::Future;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{Local, TimeZone};
use clap::{Parser, Subcommand};
use mcp::Connection;
use runtime::{AnthropicBackend, Host, Registry, Router};
use storage::{ConversationStore, Event, EventKind, EventStore, Identity, SessionToken};
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};

use config::{Config, LogFormat, LoggingConfig};
use error::{Error, Result};

const CONFIG_FILE: &str = "gangway.toml";

#[derive(Parser)]
#[command(name = "gangway")]
#[command(about = "Chat with an assistant whose tool calls you approve first", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start an interactive chat session
    Chat {
        /// Logged-in user id, used as the default for tool arguments
        #[arg(long)]
        user_id: Option<String>,
        #[arg(long, requires = "user_id")]
        name: Option<String>,
        #[arg(long, requires = "user_id")]
        email: Option<String>,
    },
    /// Serve the chat and authorization endpoints over HTTP
    Serve {
        /// Address to bind to
        #[arg(long, default_value = "127.0.0.1")]
        bind: String,
        #[arg(short, long, default_value_t = 8000)]
        port: u16,
    },
    /// List the tools offered by the configured providers
    Tools,
    /// List recorded sessions
    Sessions {
        /// Show only the last N sessions
        #[arg(short, long, default_value = "10")]
        limit: usize,
    },
    /// Show the audit log for a session
    Logs {
        /// Session token (prefix match supported)
        #[arg(short, long)]
        session: String,
        /// Filter by event kind (message, tool_proposed, tool_approved,
        /// tool_denied, tool_result, tool_failed)
        #[arg(short, long)]
        kind: Option<String>,
    },
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();
    let (config, base) = load_config(cli.config.as_deref())?;
    init_logging(&config.logging);

    match cli.command {
        Some(Commands::Chat {
            user_id,
            name,
            email,
        }) => {
            let identity = user_id.map(|id| Identity {
                id,
                name: name.unwrap_or_default(),
                email: email.unwrap_or_default(),
            });
            cmd_chat(&config, &base, identity).await
        }
        None => cmd_chat(&config, &base, None).await,
        Some(Commands::Serve { bind, port }) => cmd_serve(&config, &base, &bind, port).await,
        Some(Commands::Tools) => cmd_tools(&config, &base).await,
        Some(Commands::Sessions { limit }) => cmd_sessions(&config, limit),
        Some(Commands::Logs { session, kind }) => cmd_logs(&config, &session, kind.as_deref()),
    }
}

/// Load the explicit config, else `./gangway.toml`, else defaults. Returns
/// the directory relative provider paths are resolved against.
fn load_config(path: Option<&Path>) -> Result<(Config, PathBuf)> {
    let path = match path {
        Some(path) => Some(path.to_path_buf()),
        None => Some(PathBuf::from(CONFIG_FILE)).filter(|p| p.exists()),
    };

    match path {
        Some(path) => {
            let config = Config::load(&path)?;
            let base = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .map(Path::to_path_buf)
                .unwrap_or_else(|| PathBuf::from("."));
            Ok((config, base))
        }
        None => Ok((Config::default(), PathBuf::from("."))),
    }
}

fn init_logging(logging: &LoggingConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&logging.level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    match logging.format {
        LogFormat::Compact => builder.compact().init(),
        LogFormat::Pretty => builder.pretty().init(),
        LogFormat::Json => builder.json().init(),
    }
}

/// Connect the providers and assemble the host with its audit log.
async fn start_host(config: &Config, base: &Path) -> Result<Host<Connection, AnthropicBackend>> {
    let mut backend = AnthropicBackend::builder(config.api_key()?, &config.backend.model);
    if let Some(max_tokens) = config.backend.max_tokens {
        backend = backend.max_tokens(max_tokens);
    }
    let backend = Arc::new(backend.build());

    let db_path = audit_path(config);
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let audit = Arc::new(EventStore::open(&db_path)?);

    let registry = Registry::start(config.launch_configs(base)?).await?;
    let providers = registry.len().await;

    println!("Audit log: {}", db_path.display());
    println!("Model: {backend}");
    println!("Providers: {providers}");

    Ok(Host::new(
        registry,
        backend,
        ConversationStore::with_audit(audit),
        config.host_config(),
    ))
}

async fn cmd_chat(config: &Config, base: &Path, identity: Option<Identity>) -> Result<()> {
    println!("gangway v{}", env!("CARGO_PKG_VERSION"));

    let host = start_host(config, base).await?;
    let session = SessionToken::new();
    println!("Session: {session}");
    println!("Type 'quit' or Ctrl+D to exit.\n");

    let result = chat_loop(&host, session, identity).await;

    host.shutdown().await;
    println!("\nSession ended.");
    result
}

async fn cmd_serve(config: &Config, base: &Path, bind: &str, port: u16) -> Result<()> {
    println!("gangway v{}", env!("CARGO_PKG_VERSION"));

    let host = Arc::new(start_host(config, base).await?);
    let address = format!("{bind}:{port}");
    println!("Listening on http://{address}");

    let result = server::serve(host.clone(), &address).await;

    host.shutdown().await;
    Ok(result?)
}

async fn chat_loop<P, B>(
    host: &Host<P, B>,
    session: SessionToken,
    mut identity: Option<Identity>,
) -> Result<()>
where
    P: runtime::ToolProvider,
    B: runtime::LlmBackend,
{
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        let Some(line) = prompt_line(&mut lines, "> ").await? else {
            break;
        };
        let input = line.trim();
        if input.is_empty() {
            continue;
        }
        if input == "quit" || input == "exit" {
            break;
        }

        let submitted = host.submit(input, Some(session.clone()), identity.take());
        let Some(mut reply) = until(submitted, interrupted()).await else {
            break;
        };

        if let Some(auth) = reply.authorization.clone() {
            println!("\n{}\n", reply.reply);
            let Some(answer) = prompt_line(&mut lines, "Authorize? [y/N] ").await? else {
                break;
            };
            let approved = matches!(answer.trim().to_lowercase().as_str(), "y" | "yes");

            let Some(resolved) = until(host.resolve_auth(auth.request, approved), interrupted()).await
            else {
                break;
            };
            reply = match resolved {
                Ok(reply) => reply,
                Err(e) => {
                    eprintln!("Error: {e}\n");
                    continue;
                }
            };
        }

        println!("\n{}\n", reply.reply);
    }

    Ok(())
}

/// Print `prompt` and read one line. `None` on EOF or Ctrl-C.
async fn prompt_line(lines: &mut Lines<BufReader<Stdin>>, prompt: &str) -> Result<Option<String>> {
    print!("{prompt}");
    std::io::stdout().flush()?;

    match until(lines.next_line(), interrupted()).await {
        Some(line) => Ok(line?),
        None => Ok(None),
    }
}

/// Run `work` to completion unless `stop` resolves first.
async fn until<T>(work: impl Future<Output = T>, stop: impl Future<Output = ()>) -> Option<T> {
    tokio::select! {
        out = work => Some(out),
        () = stop => None,
    }
}

async fn interrupted() {
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("interrupted");
}

async fn cmd_tools(config: &Config, base: &Path) -> Result<()> {
    let registry = Registry::start(config.launch_configs(base)?).await?;

    for connection in registry.snapshot().await {
        let tools = Router::new(std::slice::from_ref(&connection)).catalog().await;
        println!("{} ({} tools)", connection.id, tools.len());
        for tool in tools {
            println!("  {:<24}  {}", tool.name, tool.description.lines().next().unwrap_or(""));
        }
    }

    registry.stop().await;
    Ok(())
}

fn cmd_sessions(config: &Config, limit: usize) -> Result<()> {
    let store = open_store(config)?;
    let sessions = store.list_sessions()?;

    if sessions.is_empty() {
        println!("No sessions found.");
        return Ok(());
    }

    println!(
        "{:<36}  {:<16}  {:<16}  {:<6}  TOOLS",
        "SESSION", "STARTED", "LAST ACTIVE", "MSGS"
    );
    println!("{}", "-".repeat(90));

    for summary in sessions.into_iter().take(limit) {
        println!(
            "{:<36}  {:<16}  {:<16}  {:<6}  {}",
            summary.session,
            local(&summary.first_at).format("%Y-%m-%d %H:%M"),
            local(&summary.last_at).format("%Y-%m-%d %H:%M"),
            summary.message_count,
            summary.tool_call_count
        );
    }

    Ok(())
}

fn cmd_logs(config: &Config, session_prefix: &str, kind_filter: Option<&str>) -> Result<()> {
    let store = open_store(config)?;

    let mut matching = store.matching_sessions(session_prefix)?;
    let session = match matching.len() {
        0 => {
            return Err(Error::SessionNotFound {
                prefix: session_prefix.to_string(),
            });
        }
        1 => matching.remove(0),
        _ => {
            return Err(Error::AmbiguousSession {
                prefix: session_prefix.to_string(),
                matches: matching.iter().map(ToString::to_string).collect(),
            });
        }
    };

    let events = store.load_events(&session, kind_filter)?;

    if events.is_empty() {
        println!("No events found for session {session}");
        return Ok(());
    }

    println!("Session: {session}\n");

    for event in events {
        print_event(&event);
    }

    Ok(())
}

fn print_event(event: &Event) {
    let time = local(&event.timestamp).format("%H:%M:%S");

    match &event.kind {
        EventKind::Message { role, content } => {
            println!(
                "[{time}] {}: {}",
                role.label().to_uppercase(),
                truncate(content, 200)
            );
        }
        EventKind::ToolProposed {
            request,
            name,
            input,
        } => {
            println!("[{time}] PROPOSED {name} {input} (request {request})");
        }
        EventKind::ToolApproved { request, name } => {
            println!("[{time}] APPROVED {name} (request {request})");
        }
        EventKind::ToolDenied { request, name } => {
            println!("[{time}] DENIED {name} (request {request})");
        }
        EventKind::ToolResult { name, output } => {
            println!("[{time}] RESULT {name}: {}", truncate(output, 200));
        }
        EventKind::ToolFailed { name, error } => {
            println!("[{time}] FAILED {name}: {error}");
        }
    }
}

fn truncate(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((end, _)) => format!("{}...", &text[..end]),
        None => text.to_string(),
    }
}

fn local(at: &chrono::DateTime<chrono::Utc>) -> chrono::DateTime<Local> {
    Local.from_utc_datetime(&at.naive_utc())
}

fn open_store(config: &Config) -> Result<EventStore> {
    let db_path = audit_path(config);

    if !db_path.exists() {
        return Err(Error::DatabaseNotFound { path: db_path });
    }

    Ok(EventStore::open(&db_path)?)
}

fn audit_path(config: &Config) -> PathBuf {
    config.audit.path.clone().unwrap_or_else(|| {
        dirs_data_dir()
            .unwrap_or_else(|| ".gangway".into())
            .join("audit.db")
    })
}

fn dirs_data_dir() -> Option<PathBuf> {
    #[cfg(target_os = "macos")]
    {
        std::env::var_os("HOME").map(|h| PathBuf::from(h).join("Library/Application Support/gangway"))
    }
    #[cfg(target_os = "linux")]
    {
        std::env::var_os("XDG_DATA_HOME")
            .map(PathBuf::from)
            .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".local/share")))
            .map(|p| p.join("gangway"))
    }
    #[cfg(target_os = "windows")]
    {
        std::env::var_os("APPDATA").map(|h| PathBuf::from(h).join("gangway"))
    }
    #[cfg(not(any(target_os = "macos", target_os = "linux", target_os = "windows")))]
    {
        None
    }
}
