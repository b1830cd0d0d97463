use axum::routing::{get, post};
use axum::Router;
use tracing_subscriber::EnvFilter;

use passage_search::api;
use passage_search::config::Config;
use passage_search::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_env();
    tracing::info!("Passage source: {}", config.chunks_file.display());
    tracing::info!("LLM provider: {} ({})", config.llm.provider, config.llm.base_url);

    let state = AppState::new(config.clone()).await?;

    let app = Router::new()
        .route("/", get(api::search::root))
        .route("/semantic_search", post(api::search::semantic_search))
        .route("/keyword_search", post(api::search::keyword_search))
        .route("/hybrid_search", post(api::search::hybrid_search))
        .route("/advanced_search", post(api::search::advanced_search))
        .route("/ab_test", post(api::search::ab_test))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    tracing::info!("Server listening on {}", config.bind_addr);

    axum::serve(listener, app).await?;
    Ok(())
}
