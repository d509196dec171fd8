//! Phishing URL Classifier - Prediction API Server
//!
//! Accepts a CSV of precomputed URL features, scores every row with a
//! pretrained random forest and records one job per request.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                  PHISHING CLASSIFIER API                    │
//! ├─────────────────────────────────────────────────────────────┤
//! │  ┌───────────┐  ┌─────────────┐  ┌───────────────────────┐ │
//! │  │  API      │  │  Feature    │  │  Predictor            │ │
//! │  │  (Axum)   │─▶│  Validator  │─▶│  (Random Forest)      │ │
//! │  └─────┬─────┘  └─────────────┘  └───────────▲───────────┘ │
//! │        │                                     │ startup     │
//! │        ▼                                     │             │
//! │  ┌─────────────┐                      ┌──────┴──────┐      │
//! │  │  MongoDB    │                      │   AWS S3    │      │
//! │  │  (jobs)     │                      │   (model)   │      │
//! │  └─────────────┘                      └─────────────┘      │
//! └─────────────────────────────────────────────────────────────┘
//! ```

mod config;
mod db;
mod error;
mod features;
mod handlers;
mod model;
mod models;
mod predictor;

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, post},
};
use tower_http::{
    cors::{CorsLayer, Any},
    trace::TraceLayer,
    compression::CompressionLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::db::{JobLedger, LedgerError};
use crate::model::{ObjectStore, S3Store};
use crate::predictor::Predictor;

pub use error::{AppError, AppResult};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "phishing_classifier=debug,tower_http=debug".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    dotenvy::dotenv().ok();
    let config = config::Config::from_env();
    config.validate()?;

    tracing::info!("Phishing Classifier API starting...");
    tracing::debug!("{:?}", config);

    let store = S3Store::new(
        &config.aws_region,
        &config.aws_access_key_id,
        &config.aws_secret_access_key,
    );
    let state = initialize(&config, &store, || async {
        let ledger = db::connect(&config.mongo_uri, &config.mongo_database, &config.mongo_collection).await?;
        Ok::<_, LedgerError>(Arc::new(ledger) as Arc<dyn JobLedger>)
    })
    .await;
    if !state.is_ready() {
        tracing::error!("Startup incomplete: /predict will answer 503 until restart");
    }

    let app = create_router(state, config.max_upload_bytes);

    // Start server
    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .with_context(|| format!("invalid bind address {}:{}", config.host, config.port))?;
    tracing::info!("🚀 Server listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub predictor: Arc<Predictor>,
    /// `None` when the ledger was unreachable (or never tried) at startup
    pub ledger: Option<Arc<dyn JobLedger>>,
}

impl AppState {
    /// Model and ledger both came up
    pub fn is_ready(&self) -> bool {
        self.predictor.is_loaded() && self.ledger.is_some()
    }
}

/// Load the model, then connect the ledger. A failure in either leaves the
/// service up but unable to predict; the ledger is skipped if the model fails.
async fn initialize<F, Fut>(config: &config::Config, store: &dyn ObjectStore, connect_ledger: F) -> AppState
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<Arc<dyn JobLedger>, LedgerError>>,
{
    tracing::info!("Loading ML model into memory from S3...");
    let loaded = model::load_model(
        store,
        &config.s3_bucket_name,
        &config.model_s3_key,
        &config.local_model_path,
    )
    .await;

    let predictor = match loaded {
        Ok(loaded) => {
            tracing::info!("✅ Model {} (sha256 {}) ready for prediction", loaded.version, loaded.checksum);
            Predictor::new(Box::new(loaded.model), loaded.version)
        }
        Err(e) => {
            tracing::error!("❌ FATAL STARTUP ERROR: {}", e);
            return AppState {
                predictor: Arc::new(Predictor::unloaded(config.model_s3_key.clone())),
                ledger: None,
            };
        }
    };

    tracing::info!("Attempting to connect to MongoDB...");
    let ledger = match connect_ledger().await {
        Ok(ledger) => Some(ledger),
        Err(e) => {
            tracing::error!("❌ FATAL STARTUP ERROR: {}", e);
            None
        }
    };

    AppState {
        predictor: Arc::new(predictor),
        ledger,
    }
}

/// Create the main router with all routes
fn create_router(state: AppState, max_upload_bytes: usize) -> Router {
    Router::new()
        .route("/health", get(handlers::health::check))
        .route("/predict", post(handlers::predict::predict))
        .route("/jobs/:id", get(handlers::jobs::get))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any)
        )
        .with_state(state)
}
