use axum::{Extension, Router};
use std::sync::Arc;
use tower_http::cors::CorsLayer;

mod db;
mod gemini_client;
mod handlers;
mod middleware;
mod models;
mod qdrant_client;
mod services;

// AppState holds every external dependency resolved at startup. Handlers and
// middleware receive it through an Extension layer instead of reading process
// globals.
pub struct AppState {
    pub db_pool: sqlx::PgPool,
    pub gemini_client: Option<gemini_client::GeminiClient>,
    pub qdrant_client: Option<qdrant_client::QdrantClient>,
    pub admin_secret: Option<String>,
    pub context_char_budget: usize,
}

#[tokio::main]
async fn main() {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    init_logging().expect("Failed to initialize logging");

    // Create the database connection pool
    let db_pool = db::create_pool()
        .await
        .expect("Failed to create database pool.");

    // Initialize Gemini client if API key is provided
    let gemini_client = match std::env::var("GEMINI_API_KEY").ok() {
        Some(api_key) if !api_key.is_empty() => {
            tracing::info!("Initializing Gemini AI client (2.5 Flash)...");
            Some(gemini_client::GeminiClient::new(api_key))
        }
        _ => {
            tracing::warn!("GEMINI_API_KEY not found. Chat replies will degrade to a fixed apology.");
            None
        }
    };

    // Initialize Qdrant client if configured; retrieval falls back to the
    // single-key textbook lookup without it.
    let qdrant_client = match std::env::var("QDRANT_URL").ok() {
        Some(url) if !url.is_empty() => {
            tracing::info!("Initializing Qdrant vector database...");
            let api_key = std::env::var("QDRANT_API_KEY").ok();

            match qdrant_client::QdrantClient::new(url, api_key).await {
                Ok(client) => match client.create_collection().await {
                    Ok(_) => {
                        tracing::info!("Qdrant initialized successfully");
                        Some(client)
                    }
                    Err(e) => {
                        tracing::error!("Failed to initialize Qdrant collection: {}", e);
                        None
                    }
                },
                Err(e) => {
                    tracing::error!("Failed to connect to Qdrant: {}", e);
                    None
                }
            }
        }
        _ => {
            tracing::info!("QDRANT_URL not set. Using single-key textbook retrieval.");
            None
        }
    };

    let admin_secret = std::env::var("ADMIN_SECRET").ok().filter(|s| !s.is_empty());
    if admin_secret.is_none() {
        tracing::warn!("ADMIN_SECRET not set. Admin endpoints will reject all requests.");
    }

    let context_char_budget = std::env::var("CONTEXT_CHAR_BUDGET")
        .ok()
        .and_then(|v| v.parse::<usize>().ok())
        .unwrap_or(services::retrieval::DEFAULT_CONTEXT_CHAR_BUDGET);
    tracing::info!("Retrieval context budget: {} chars", context_char_budget);

    // Create the shared state
    let shared_state = Arc::new(AppState {
        db_pool,
        gemini_client,
        qdrant_client,
        admin_secret,
        context_char_budget,
    });

    // Build our application with all routes and shared state
    let app = Router::new()
        .merge(handlers::chat::chat_routes())
        .merge(handlers::sessions::session_routes())
        .merge(handlers::profile::profile_routes())
        .merge(handlers::curriculum::curriculum_routes())
        .merge(handlers::admin::admin_routes())
        .route("/", axum::routing::get(home))
        .route("/api/status", axum::routing::get(api_status))
        .layer(axum::middleware::from_fn(middleware::logging::request_logging_middleware))
        .layer(CorsLayer::permissive())
        .layer(Extension(shared_state.clone()));

    let port = std::env::var("PORT")
        .ok()
        .and_then(|p| p.parse::<u16>().ok())
        .unwrap_or(3000);
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port))
        .await
        .expect("Failed to bind listener");
    tracing::info!("listening on {}", listener.local_addr().unwrap());
    axum::serve(listener, app).await.expect("Server error");
}

fn init_logging() -> Result<(), Box<dyn std::error::Error>> {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, fmt, Layer};

    let log_level = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cfg!(debug_assertions) {
            "debug,tutor_backend=trace,sqlx=info,reqwest=info,hyper=info,tower=info".to_string()
        } else {
            "info,tutor_backend=info,sqlx=warn,reqwest=warn,hyper=warn,tower=warn".to_string()
        }
    });

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&log_level))?;

    // JSON logging for production log aggregation, human-readable otherwise
    let fmt_layer = if std::env::var("LOG_FORMAT").as_deref() == Ok("json") {
        fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(false)
            .with_target(true)
            .boxed()
    } else {
        fmt::layer()
            .with_target(true)
            .with_file(true)
            .with_line_number(true)
            .boxed()
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();

    tracing::info!("Tutor backend starting up...");
    tracing::info!("Version: {}", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        "Configuration - Database: {}, Gemini AI: {}, Qdrant: {}, Admin: {}",
        if std::env::var("DATABASE_URL").is_ok() { "set" } else { "missing" },
        if std::env::var("GEMINI_API_KEY").is_ok() { "set" } else { "missing" },
        if std::env::var("QDRANT_URL").is_ok() { "set" } else { "missing" },
        if std::env::var("ADMIN_SECRET").is_ok() { "set" } else { "missing" },
    );

    Ok(())
}

async fn home() -> axum::response::Json<serde_json::Value> {
    axum::response::Json(serde_json::json!({ "status": "Tutor AI System Operational" }))
}

async fn api_status(
    Extension(state): Extension<Arc<AppState>>,
) -> axum::response::Json<serde_json::Value> {
    use serde_json::json;

    let db_status = match sqlx::query("SELECT 1").fetch_one(&state.db_pool).await {
        Ok(_) => "healthy",
        Err(_) => "unhealthy",
    };

    let gemini_status = if state.gemini_client.is_some() { "configured" } else { "not_configured" };
    let qdrant_status = if state.qdrant_client.is_some() { "configured" } else { "not_configured" };

    axum::response::Json(json!({
        "status": "operational",
        "version": env!("CARGO_PKG_VERSION"),
        "services": {
            "database": db_status,
            "gemini_ai": gemini_status,
            "qdrant_vector_db": qdrant_status,
        },
        "features": {
            "vector_retrieval": qdrant_status == "configured",
            "admin_api": state.admin_secret.is_some(),
        }
    }))
}
