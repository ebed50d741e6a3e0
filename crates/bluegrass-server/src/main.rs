mod ai;
mod cache;
mod db;
mod fetcher;
mod guard;
mod media;
mod routes;
mod summarizer;

use ai::AiClient;
use axum::http::HeaderValue;
use axum::routing::{delete, get, post, put};
use axum::Router;
use bluegrass_core::config::AppConfig;
use bluegrass_core::feeds::FeedsFile;
use db::Db;
use fetcher::IngestCtx;
use media::MediaStore;
use routes::AppState;
use std::sync::Arc;
use tower::limit::ConcurrencyLimitLayer;
use tower_http::compression::CompressionLayer;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::set_header::SetResponseHeaderLayer;
use tracing::info;

const FEEDS_TOML: &str = include_str!("../../../feeds.toml");

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cfg = AppConfig::from_env();
    let db_path = std::env::var("DATABASE_PATH").unwrap_or_else(|_| "/data/bluegrass.db".into());
    let media_dir = std::env::var("MEDIA_DIR").unwrap_or_else(|_| "/data/media".into());
    let api_key = std::env::var("ANTHROPIC_API_KEY").unwrap_or_default();
    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(8080);

    let db = Arc::new(Db::open(&db_path).expect("Failed to open SQLite database"));

    // Seed feeds from feeds.toml if the table is empty
    if db.feed_count().unwrap_or(0) == 0 {
        if let Ok(file) = FeedsFile::from_toml(FEEDS_TOML) {
            let mut seeded = 0;
            for seed in file.feeds {
                match seed.into_feed() {
                    Ok(feed) => {
                        if db.put_feed(&feed).is_ok() {
                            seeded += 1;
                        }
                    }
                    Err(e) => tracing::warn!(error = %e, "Skipping invalid seed feed"),
                }
            }
            info!(count = seeded, "Seeded feeds from feeds.toml");
        }
    }

    let http_client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(30))
        .user_agent("BluegrassWire/1.0")
        .gzip(true)
        .brotli(true)
        .build()
        .expect("Failed to build HTTP client");

    let media_store = Arc::new(MediaStore::new(&media_dir));
    let ai = AiClient::new(http_client.clone(), api_key, cfg.ai_model.clone());

    let ingest = Arc::new(IngestCtx {
        db: Arc::clone(&db),
        client: http_client.clone(),
        ai,
        store: Arc::clone(&media_store),
        cfg: cfg.clone(),
    });

    // Spawn background ingestion
    tokio::spawn(fetcher::run(Arc::clone(&ingest)));

    let state = Arc::new(AppState {
        db,
        http_client,
        media: media_store,
        cfg,
        ingest,
    });

    let api_routes = Router::new()
        .route("/api/feeds", get(routes::get_feeds))
        .route("/api/items", get(routes::get_items))
        .route("/api/items/:id", get(routes::get_item))
        .route("/api/search", get(routes::search))
        .route("/api/counties", get(routes::get_counties))
        .route("/api/media/*key", get(routes::serve_media))
        .route("/api/open-proxy", get(routes::open_proxy))
        .route("/api/admin/ingest", post(routes::trigger_ingest))
        .route("/api/admin/feeds", get(routes::admin_list_feeds))
        .route("/api/admin/feeds", post(routes::admin_put_feed))
        .route("/api/admin/feeds/:feed_id", put(routes::admin_put_feed_by_id))
        .route("/api/admin/feeds/:feed_id", delete(routes::admin_delete_feed))
        .route("/api/admin/review-queue", get(routes::admin_review_queue))
        .route(
            "/api/admin/review-queue/:item_id",
            post(routes::admin_review_decide),
        )
        .route("/health", get(routes::health))
        .with_state(state);

    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::any())
        .allow_methods([
            axum::http::Method::GET,
            axum::http::Method::POST,
            axum::http::Method::PUT,
            axum::http::Method::DELETE,
            axum::http::Method::OPTIONS,
        ])
        .allow_headers([
            axum::http::header::CONTENT_TYPE,
            axum::http::header::AUTHORIZATION,
            axum::http::header::IF_NONE_MATCH,
            axum::http::HeaderName::from_static("x-admin-token"),
        ]);

    let app = api_routes
        .layer(ConcurrencyLimitLayer::new(256))
        .layer(CompressionLayer::new())
        .layer(cors)
        .layer(SetResponseHeaderLayer::overriding(
            axum::http::header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            axum::http::header::X_FRAME_OPTIONS,
            HeaderValue::from_static("DENY"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            axum::http::header::REFERRER_POLICY,
            HeaderValue::from_static("strict-origin-when-cross-origin"),
        ));

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{port}"))
        .await
        .expect("Failed to bind");

    info!(port, "Server starting");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("Failed to install CTRL+C handler");
    info!("Shutdown signal received");
}
