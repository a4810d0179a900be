//! Server Binary - Single-node deployment
//!
//! Wires up:
//! - Redis documents and filesystem objects
//! - ffmpeg probing and the motion-vector engine
//! - HTTP inbound adapter

use flowchain::adapters::local::{http, listener, MotionEngine, RedisPool};
use flowchain::adapters::{FfprobeProber, FsObjectStore};
use flowchain::{FlowConfig, FlowService};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let config = FlowConfig::from_env();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    // 1. Adapters
    let documents = match RedisPool::new(&config.redis_url) {
        Ok(pool) => pool,
        Err(e) => {
            eprintln!("Failed to connect to Redis: {}", e);
            std::process::exit(1);
        }
    };

    let objects = match FsObjectStore::open(config.data_dir.join("objects")).await {
        Ok(store) => store,
        Err(e) => {
            eprintln!("Failed to open object store: {}", e);
            std::process::exit(1);
        }
    };

    // 2. Application
    let service = FlowService::new(
        Arc::new(documents),
        Arc::new(objects),
        Arc::new(MotionEngine::new()),
        Arc::new(FfprobeProber::new()),
        &config,
    );

    match service.artifact_ids().await {
        Ok(ids) => tracing::info!("Engine artifacts: {:?}", ids),
        Err(e) => {
            eprintln!("Failed to fingerprint engine artifacts: {}", e);
            std::process::exit(1);
        }
    }

    listener::start(service.hub());

    // 3. HTTP Layer
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);
    let app = http::router(service).layer(cors);

    // 4. Start Server
    let tcp = tokio::net::TcpListener::bind(format!("{}:{}", config.addr, config.port))
        .await
        .expect("Failed to bind TCP listener");
    tracing::info!("Listening at {}:{}", config.addr, config.port);
    axum::serve(tcp, app).await.expect("Server failed to start");
}
