use std::collections::HashMap;
use std::io::{BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use turnstone_agents::{
    ChatBackend, CurrentTimeTool, GroqBackend, ModelInvoker, ModelRegistry, OpenAiBackend,
    RetryPolicy, ToolRegistry, TurnEngine,
};
use turnstone_config::{AppConfig, ConfigLoader, ProviderCredentials};
use turnstone_db::{CheckpointStore, SqliteCheckpointStore};

const SYSTEM_PROMPT: &str = "You are a helpful assistant. Use the available tools when they \
help you answer, and keep replies concise.";

#[derive(Parser)]
#[command(name = "turnstone", about = "Resilient conversational agent backend", version)]
struct Cli {
    /// Path to the TOML config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Override the database path
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Interactive chat on one thread
    Chat {
        /// Thread to continue or create
        #[arg(long, default_value = "default")]
        thread: String,

        /// Use a specific provider (with --model)
        #[arg(long, requires = "model")]
        provider: Option<String>,

        /// Use a specific model (with --provider)
        #[arg(long, requires = "provider")]
        model: Option<String>,
    },

    /// Continue an interrupted turn on a thread
    Resume {
        #[arg(long, default_value = "default")]
        thread: String,
    },

    /// List the available models
    Models,

    /// Show checkpoint history for a thread
    History {
        #[arg(long, default_value = "default")]
        thread: String,
    },

    /// Delete a thread and all of its checkpoints
    Delete {
        #[arg(long)]
        thread: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let mut config = ConfigLoader::load(cli.config.as_deref())?;
    if let Some(db) = &cli.db {
        config.database.path = db.display().to_string();
    }

    match cli.command {
        Command::Chat {
            thread,
            provider,
            model,
        } => {
            let engine = build_engine(&config)?;
            let model_override = match (&provider, &model) {
                (Some(p), Some(m)) => Some((p.as_str(), m.as_str())),
                _ => None,
            };
            chat_loop(&engine, &thread, model_override).await
        }
        Command::Resume { thread } => {
            let engine = build_engine(&config)?;
            match engine.resume_turn(&thread).await? {
                Some(outcome) => {
                    println!("{}", outcome.reply.content);
                    Ok(())
                }
                None => {
                    println!("nothing to resume on thread '{thread}'");
                    Ok(())
                }
            }
        }
        Command::Models => {
            let registry = ModelRegistry::builtin(&config.llm.default_provider);
            for name in registry.all_names() {
                println!("{name}");
            }
            Ok(())
        }
        Command::History { thread } => {
            let store = open_store(&config)?;
            for entry in store.history(&thread).await? {
                println!("{:>4}  {:?}  {}", entry.step, entry.phase, entry.created_at);
            }
            Ok(())
        }
        Command::Delete { thread } => {
            let store = open_store(&config)?;
            if store.delete_thread(&thread).await? {
                println!("deleted thread '{thread}'");
            } else {
                println!("no such thread '{thread}'");
            }
            Ok(())
        }
    }
}

fn open_store(config: &AppConfig) -> Result<Arc<SqliteCheckpointStore>> {
    let store = SqliteCheckpointStore::open(std::path::Path::new(&config.database.path))
        .context("failed to open checkpoint store")?;
    Ok(Arc::new(store))
}

fn build_engine(config: &AppConfig) -> Result<TurnEngine> {
    let registry = Arc::new(ModelRegistry::builtin(&config.llm.default_provider));
    let backends = build_backends(&config.providers)?;
    if backends.is_empty() {
        anyhow::bail!(
            "no providers configured; add a [[providers]] entry with api_key_env to the config"
        );
    }

    let invoker = Arc::new(ModelInvoker::new(
        registry,
        backends,
        &config.llm.default_model,
        RetryPolicy {
            max_attempts: config.llm.max_call_retries,
            ..RetryPolicy::default()
        },
    ));

    let mut tools = ToolRegistry::new();
    tools.register(Arc::new(CurrentTimeTool));

    let checkpoints: Arc<dyn CheckpointStore> = open_store(config)?;
    let memory = Arc::new(
        turnstone_db::KeywordMemoryStore::open(std::path::Path::new(&config.database.path))
            .context("failed to open memory store")?,
    );

    Ok(TurnEngine::new(
        invoker,
        Arc::new(tools),
        checkpoints,
        Some(memory),
        SYSTEM_PROMPT,
        config.llm.max_context_tokens,
        Duration::from_secs(config.turn.timeout_secs),
        config.turn.max_tool_rounds,
    ))
}

fn build_backends(
    providers: &[ProviderCredentials],
) -> Result<HashMap<String, Arc<dyn ChatBackend>>> {
    let mut backends: HashMap<String, Arc<dyn ChatBackend>> = HashMap::new();
    for creds in providers {
        let Ok(api_key) = std::env::var(&creds.api_key_env) else {
            warn!(
                provider = %creds.provider,
                env = %creds.api_key_env,
                "api key env var not set, skipping provider"
            );
            continue;
        };

        let backend: Arc<dyn ChatBackend> = match creds.provider.as_str() {
            "groq" => Arc::new(GroqBackend::new(api_key, creds.base_url.clone())),
            "openai" => Arc::new(OpenAiBackend::new(api_key, creds.base_url.clone())),
            other => {
                anyhow::bail!("unsupported provider '{other}' in config");
            }
        };
        info!(provider = %creds.provider, "backend configured");
        backends.insert(creds.provider.clone(), backend);
    }
    Ok(backends)
}

async fn chat_loop(
    engine: &TurnEngine,
    thread: &str,
    model_override: Option<(&str, &str)>,
) -> Result<()> {
    println!("chatting on thread '{thread}' (ctrl-d to exit)");
    let stdin = std::io::stdin();
    let mut stdout = std::io::stdout();

    loop {
        print!("> ");
        stdout.flush()?;
        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        match engine.run_turn(thread, line, model_override).await {
            Ok(outcome) => println!("{}", outcome.reply.content),
            Err(e) => eprintln!("error: {e}"),
        }
    }
    Ok(())
}
