use axum::http::HeaderValue;
use axum::{routing::get, Router};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use promptguessr::config::ServerConfig;
use promptguessr::imagegen::ImageGenConfig;
use promptguessr::state::AppState;
use promptguessr::store::{spawn_ttl_sweeper, MemoryStore};
use promptguessr::{api, ws};

#[tokio::main]
async fn main() {
    // Load .env file if present (before any env var reads)
    if let Err(e) = dotenvy::dotenv() {
        // Not an error if .env doesn't exist, only log if it's a different issue
        if !matches!(e, dotenvy::Error::Io(_)) {
            eprintln!("Warning: Failed to load .env file: {}", e);
        }
    }

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "promptguessr=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Prompt Guessr...");

    let config = ServerConfig::from_env();

    // Initialize the room store and its TTL sweeper
    let memory_store = Arc::new(MemoryStore::with_ttl(config.room_ttl));
    spawn_ttl_sweeper(memory_store.clone());

    // Initialize image generation providers
    let imagegen_config = ImageGenConfig::from_env();
    let images = match imagegen_config.build_chain() {
        Ok(chain) => {
            tracing::info!("Image provider initialized: {}", chain.name());
            Some(Arc::new(chain))
        }
        Err(e) => {
            tracing::warn!(
                "Failed to initialize image providers: {}. Rounds will stall at generation.",
                e
            );
            None
        }
    };

    let state = Arc::new(AppState::new(memory_store, images));

    let cors = if config.allows_any_origin() {
        CorsLayer::permissive()
    } else {
        let origins: Vec<HeaderValue> = config
            .cors_origins
            .iter()
            .filter_map(|origin| origin.parse().ok())
            .collect();
        CorsLayer::new().allow_origin(AllowOrigin::list(origins))
    };

    let app = Router::new()
        .route("/ws", get(ws::ws_handler))
        .merge(api::routes())
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("Listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await.unwrap();
    axum::serve(listener, app).await.unwrap();
}
