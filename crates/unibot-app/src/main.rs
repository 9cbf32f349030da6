//! Unibot application binary - composition root.
//!
//! 1. Parse CLI args and load configuration from TOML
//! 2. Open SQLite and the knowledge index, pick the LLM provider
//! 3. Build the conversation pipeline and the bot manager
//! 4. Start enabled bots, the keyword watcher and the status API
//! 5. On Ctrl-C, stop every bot within the configured timeout

mod cli;
mod console;

use std::error::Error;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use unibot_api::auth::load_or_generate_token;
use unibot_api::AppState;
use unibot_bot::{BotManager, ChannelAdapter, IdleChannel, WorkerDeps, WorkerSettings};
use unibot_chat::{ConversationPipeline, KeywordStore, MessageRouter, ResponseSynthesizer};
use unibot_core::config::{BotConfig, LlmConfig, UnibotConfig};
use unibot_core::{MockGenerator, StudentDirectory, TextGenerator};
use unibot_llm::{ClientSettings, OpenAiClient};
use unibot_storage::{Database, SqliteDirectory};
use unibot_vector::knowledge::read_csv;
use unibot_vector::{DynEmbeddingService, KnowledgeEngine, MockEmbedding, RetrievalSettings};

use crate::cli::{expand_home, CliArgs, Command};
use crate::console::{spawn_stdin_reader, ConsoleChannel};

/// How often the keyword file's mtime is checked.
const KEYWORD_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Long-lived collaborators shared by every command.
struct Services {
    generator: Arc<dyn TextGenerator>,
    knowledge: Arc<KnowledgeEngine>,
    directory: Arc<dyn StudentDirectory>,
    keywords: Arc<KeywordStore>,
}

impl Services {
    fn pipeline(&self) -> ConversationPipeline {
        ConversationPipeline::new(
            MessageRouter::new(Arc::clone(&self.keywords)),
            ResponseSynthesizer::new(Arc::clone(&self.generator)),
            Arc::clone(&self.knowledge),
            Arc::clone(&self.directory),
        )
    }
}

/// Generation and embedding providers: the HTTP client, or in-process mocks
/// when running offline.
fn providers(
    llm: &LlmConfig,
) -> unibot_core::Result<(Arc<dyn TextGenerator>, Arc<dyn DynEmbeddingService>)> {
    if llm.offline {
        info!("Offline mode: using mock generator and embeddings");
        let generator: Arc<dyn TextGenerator> = Arc::new(MockGenerator::new());
        let embedder: Arc<dyn DynEmbeddingService> = Arc::new(MockEmbedding::new());
        return Ok((generator, embedder));
    }
    let client = Arc::new(OpenAiClient::new(ClientSettings::from_config(llm)?)?);
    info!(base_url = %llm.base_url, model = %llm.model, "LLM client ready");
    let generator: Arc<dyn TextGenerator> = client.clone();
    let embedder: Arc<dyn DynEmbeddingService> = client;
    Ok((generator, embedder))
}

/// Resolve `path` against `base` unless it is absolute or home-relative.
fn resolve_in(base: &Path, path: &str) -> PathBuf {
    let expanded = expand_home(path);
    if expanded.is_absolute() {
        expanded
    } else {
        base.join(expanded)
    }
}

fn build_services(config: &UnibotConfig, data_dir: &Path) -> unibot_core::Result<Services> {
    let db_path = data_dir.join(&config.storage.db_file);
    let db = Arc::new(Database::new(&db_path)?);
    info!(path = %db_path.display(), "SQLite database opened");
    let directory: Arc<dyn StudentDirectory> = Arc::new(SqliteDirectory::new(db));

    let (generator, embedder) = providers(&config.llm)?;

    let index_path = resolve_in(data_dir, &config.retrieval.index_path);
    let knowledge = Arc::new(
        KnowledgeEngine::new(
            embedder,
            Arc::clone(&generator),
            RetrievalSettings::from(&config.retrieval),
        )
        .with_persistence(index_path),
    );

    let keywords = Arc::new(KeywordStore::open(expand_home(&config.keywords.path)));

    Ok(Services {
        generator,
        knowledge,
        directory,
        keywords,
    })
}

/// Load the persisted index, or build it from the CSV when there is none.
async fn prepare_knowledge(knowledge: &KnowledgeEngine, csv: &Path) {
    match knowledge.load_persisted() {
        Ok(0) => {}
        Ok(chunks) => {
            info!(chunks, "Knowledge index loaded");
            return;
        }
        Err(e) => warn!(error = %e, "Failed to load knowledge index"),
    }
    if !csv.exists() {
        warn!(path = %csv.display(), "No knowledge index and no CSV; FAQ answers unavailable");
        return;
    }
    match knowledge.ingest_csv(csv).await {
        Ok(report) => info!(rows = report.rows, chunks = report.chunks, "Knowledge index built"),
        Err(e) => error!(error = %e, path = %csv.display(), "Knowledge ingestion failed"),
    }
}

/// Poll the keyword file and hot-reload it when it changes.
async fn keyword_watcher(store: Arc<KeywordStore>, shutdown: CancellationToken) {
    let Some(path) = store.path().map(Path::to_path_buf) else {
        return;
    };
    info!(path = %path.display(), "Watching keyword file");
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = tokio::time::sleep(KEYWORD_POLL_INTERVAL) => {}
        }
        match store.reload_if_modified() {
            Ok(true) => info!(path = %path.display(), "Keywords reloaded"),
            Ok(false) => {}
            Err(e) => warn!(error = %e, "Keyword reload failed; keeping current keywords"),
        }
    }
}

/// Wait for a background task at shutdown. A panic or abort is logged, not
/// propagated. Returns whether the task finished normally.
async fn join_background(name: &str, task: tokio::task::JoinHandle<()>) -> bool {
    match task.await {
        Ok(()) => true,
        Err(e) => {
            warn!(task = name, error = %e, "Background task did not exit cleanly");
            false
        }
    }
}

async fn run(config: UnibotConfig, data_dir: PathBuf) -> Result<(), Box<dyn Error>> {
    let services = build_services(&config, &data_dir)?;
    prepare_knowledge(&services.knowledge, &expand_home(&config.retrieval.faq_csv_path)).await;

    let deps = WorkerDeps {
        pipeline: Arc::new(services.pipeline()),
        directory: Arc::clone(&services.directory),
        settings: WorkerSettings::from(&config.worker),
    };
    let stop_timeout = deps.settings.stop_timeout;

    // The first enabled bot talks on the console; the rest idle.
    let console_bot = config.enabled_bots().next().map(|b| b.name.clone());
    let input = spawn_stdin_reader();
    let channels = move |bot: &BotConfig| -> Box<dyn ChannelAdapter> {
        if console_bot.as_deref() == Some(bot.name.as_str()) {
            Box::new(ConsoleChannel::new(&bot.name, Arc::clone(&input)))
        } else {
            Box::new(IdleChannel::new(&bot.name))
        }
    };
    let manager = Arc::new(BotManager::new(deps, Arc::new(channels)));

    let shutdown = CancellationToken::new();
    let watcher = tokio::spawn(keyword_watcher(
        Arc::clone(&services.keywords),
        shutdown.clone(),
    ));

    for bot in config.enabled_bots() {
        if let Err(e) = manager.start(bot).await {
            error!(bot = %bot.name, error = %e, "Failed to start bot");
        }
    }

    let token = load_or_generate_token(&data_dir.join("api_token"));
    let state = AppState::new(
        &config,
        Arc::clone(&manager),
        Arc::clone(&services.keywords),
        Arc::clone(&services.knowledge),
        token,
    );
    let server_shutdown = shutdown.clone();
    let mut server = tokio::spawn(async move {
        unibot_api::start_server(state, async move { server_shutdown.cancelled().await }).await
    });

    let server_exit = tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            signal?;
            info!("Shutdown requested");
            None
        }
        joined = &mut server => Some(joined),
    };

    shutdown.cancel();
    if let Err(e) = manager.stop_all(stop_timeout).await {
        warn!(error = %e, "Some bots did not stop cleanly");
    }
    join_background("keyword watcher", watcher).await;

    let server_result = match server_exit {
        Some(joined) => joined,
        None => server.await,
    };
    server_result??;
    info!("Unibot stopped");
    Ok(())
}

async fn ingest(services: &Services, csv: &Path, append: bool) -> Result<(), Box<dyn Error>> {
    let report = if append {
        services.knowledge.load_persisted()?;
        let rows = read_csv(csv)?;
        services.knowledge.add_rows(&rows).await?
    } else {
        services.knowledge.ingest_csv(csv).await?
    };
    let summary = serde_json::json!({
        "csv": csv.display().to_string(),
        "rows": report.rows,
        "chunks": report.chunks,
        "total_chunks": services.knowledge.chunk_count(),
    });
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

async fn ask(
    services: &Services,
    question: &str,
    salutation: &str,
    interface: Option<&str>,
) -> Result<(), Box<dyn Error>> {
    let chunks = services.knowledge.load_persisted()?;
    if chunks == 0 {
        warn!("Knowledge index is empty; run `unibot ingest` first");
    }
    let output = match interface {
        Some(interface) => {
            let answer = services
                .knowledge
                .query(question, salutation, Some(interface))
                .await;
            serde_json::to_string_pretty(&answer)?
        }
        None => {
            let result = services
                .pipeline()
                .process(question, "cli", "cli", salutation, &[])
                .await;
            serde_json::to_string_pretty(&result)?
        }
    };
    println!("{}", output);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let args = CliArgs::parse();

    let config_file = args.resolve_config_path();
    let mut config = UnibotConfig::load_or_default(&config_file);
    args.apply_overrides(&mut config);

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.general.log_level)),
        )
        .init();

    info!("Starting Unibot v{}", env!("CARGO_PKG_VERSION"));
    info!(path = %config_file.display(), "Configuration loaded");

    if let Err(e) = config.validate() {
        error!(error = %e, "Invalid configuration");
        return Err(e.into());
    }

    let data_dir = expand_home(&config.general.data_dir);
    if let Err(e) = std::fs::create_dir_all(&data_dir) {
        error!(path = %data_dir.display(), error = %e, "Failed to create data directory");
        return Err(e.into());
    }

    match args.command() {
        Command::Run => run(config, data_dir).await,
        Command::Ingest { csv, append } => {
            let services = build_services(&config, &data_dir)?;
            let csv = csv.unwrap_or_else(|| expand_home(&config.retrieval.faq_csv_path));
            ingest(&services, &csv, append).await
        }
        Command::Ask {
            question,
            salutation,
            interface,
        } => {
            let services = build_services(&config, &data_dir)?;
            ask(&services, &question, &salutation, interface.as_deref()).await
        }
    }
}
