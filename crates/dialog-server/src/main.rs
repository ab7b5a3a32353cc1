use axum::http::{header, Method};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info};

use dialog_api::{
    create_router, metrics::spawn_sampler, metrics::DialogMetrics, mode_store::InMemoryModeStore,
    AppState,
};
use dialog_core::{
    ChatDispatcher, ConversationManager, GenerationEngine, ManagerConfig, PromptFormat,
    SessionStore,
};
use dialog_infrastructure::{create_pool, LlamaServerEngine, RedisSessionStore};
use dialog_shared::config::AppConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env
    dotenvy::dotenv().ok();

    // Load configuration
    let config = match AppConfig::load() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    // Initialize telemetry; the guard flushes file logs on exit
    let _log_guard = dialog_shared::telemetry::init_telemetry(&config.log)?;

    info!(env = %config.app.env, "{} starting...", config.app.name);

    // Connect to Redis
    info!("Connecting to redis at {}...", config.redis.url);
    let pool = match create_pool(&config.redis.url, config.redis.max_connections).await {
        Ok(pool) => pool,
        Err(e) => {
            error!("Failed to connect to redis: {}", e);
            return Err(e.into());
        }
    };
    info!("Redis connection established.");

    let store: Arc<dyn SessionStore> = Arc::new(RedisSessionStore::new(pool));
    let engine: Arc<dyn GenerationEngine> = Arc::new(LlamaServerEngine::new(config.engine.clone())?);
    info!(base_url = %config.engine.base_url, "Generation engine configured");

    let manager_config = ManagerConfig {
        system_prompt: config.conversation.system_prompt.clone(),
        prompt_format: PromptFormat::default(),
        max_compaction_rounds: config.conversation.max_compaction_rounds,
        generation_timeout: config.conversation.generation_timeout(),
    };
    let manager = Arc::new(ConversationManager::new(
        store.clone(),
        engine,
        manager_config,
    ));
    let dispatcher = ChatDispatcher::new(
        manager,
        config.conversation.mailbox_capacity,
        config.conversation.idle_worker_timeout(),
    );

    // Metrics sampler
    let metrics = Arc::new(DialogMetrics::new()?);
    let sampler = spawn_sampler(metrics.clone(), store, config.metrics.sample_interval());

    // Create App State
    let state = AppState {
        dispatcher: Arc::new(dispatcher),
        modes: Arc::new(InMemoryModeStore::new()),
        metrics,
    };

    // Build router
    let app = create_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
                .allow_headers([header::CONTENT_TYPE]),
        );

    // Bind address
    let host: std::net::IpAddr = config.app.host.parse()?;
    let addr = SocketAddr::from((host, config.app.port));
    info!("Listening on {}", addr);

    // Start server
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    sampler.abort();
    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
    }
    info!("Shutdown signal received");
}
