// src/main.rs
//! Process entry point: parse CLI overrides, initialize logging, open the
//! shared SQLite pool, run migrations, build the adapter registry and
//! `AppState`, then serve the HTTP router.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use sqlx::sqlite::SqlitePoolOptions;
use tower_http::cors::{Any, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::EnvFilter;

use dagchat::adapters::AdapterRegistry;
use dagchat::api::http;
use dagchat::config::CONFIG;
use dagchat::state::AppState;
use dagchat::store::{ConversationStore, MessageStore, SqliteConversationStore, SqliteMessageStore};

/// CLI overrides for the environment-driven configuration; unset flags fall
/// back to `CONFIG`'s own env/default resolution.
#[derive(Parser, Debug)]
#[command(name = "dagchat")]
#[command(about = "DAG conversation engine: branch-and-merge chat history, streamed over SSE")]
struct Args {
    #[arg(long, env = "API_HOST")]
    host: Option<String>,

    #[arg(long, env = "API_PORT")]
    port: Option<u16>,

    #[arg(long, env = "DATABASE_URL")]
    database_url: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();

    let host = args.host.unwrap_or_else(|| CONFIG.api_host.clone());
    let port = args.port.unwrap_or(CONFIG.api_port);
    let database_url = args.database_url.unwrap_or_else(|| CONFIG.database_url.clone());

    info!("connecting to database at {database_url}");
    let pool = SqlitePoolOptions::new().max_connections(10).connect(&database_url).await?;

    let conversation_store = SqliteConversationStore::new(pool.clone());
    conversation_store.migrate().await?;
    let message_store = SqliteMessageStore::new(pool);
    message_store.migrate().await?;

    let conversations: Arc<dyn ConversationStore> = Arc::new(conversation_store);
    let messages: Arc<dyn MessageStore> = Arc::new(message_store);
    let adapters = Arc::new(AdapterRegistry::from_env());

    info!("registered models: {:?}", adapters.list_models().iter().map(|m| &m.name).collect::<Vec<_>>());

    let state = Arc::new(AppState::new(conversations, messages, adapters));

    // Generous global ceiling above the per-chat deadline so a runaway
    // non-streaming request can't hang the connection forever, without
    // cutting short a healthy in-progress SSE stream.
    let request_timeout = CONFIG.chat_total_timeout + Duration::from_secs(30);

    let cors = CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any);

    let app = http::router(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(request_timeout));

    let addr: SocketAddr = format!("{host}:{port}").parse()?;
    info!("listening on {addr}");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
