use anyhow::{Context, Result};
use axum::{extract::FromRef, Router};
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::admin::BackOffice;
use crate::backend::{Backend, InMemoryBackend, RestBackend};
use crate::catalog::{CatalogService, RetryPolicy};
use crate::checkout::CheckoutService;
use crate::config::Settings;
use crate::messaging::{ChatLinkMessenger, Messenger};
use crate::payment::{GatewayVerifier, PaymentVerifier};
use crate::realtime::ChangeFeed;

// Declare modules
mod admin;
mod auth_middleware;
mod backend;
mod catalog;
mod checkout;
mod config;
mod error;
mod messaging;
mod models;
mod payment;
mod realtime;
mod routes;

const CHANGE_FEED_CAPACITY: usize = 64;

// Define the application state struct
#[derive(Clone, FromRef)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub catalog: Arc<CatalogService>,
    pub checkout: Arc<CheckoutService>,
    pub back_office: BackOffice,
    pub feed: ChangeFeed,
}

impl AppState {
    // Wire every service to the same backend and change feed
    pub fn new(
        settings: Arc<Settings>,
        backend: Arc<dyn Backend>,
        messenger: Arc<dyn Messenger>,
        verifier: Option<Arc<dyn PaymentVerifier>>,
    ) -> Self {
        let feed = ChangeFeed::new(CHANGE_FEED_CAPACITY);
        let retry = RetryPolicy {
            max_attempts: settings.fetch_max_attempts,
            base_delay: Duration::from_millis(settings.fetch_base_delay_ms),
            ..RetryPolicy::default()
        };
        AppState {
            catalog: Arc::new(CatalogService::new(backend.clone(), retry)),
            checkout: Arc::new(CheckoutService::new(backend.clone(), messenger, verifier, settings.clone())),
            back_office: BackOffice::new(backend, feed.clone()),
            feed,
            settings,
        }
    }
}

fn build_backend(settings: &Settings) -> Result<Arc<dyn Backend>> {
    if settings.backend_url.is_none() {
        tracing::warn!("No backend_url configured; using an empty in-memory backend.");
        return Ok(Arc::new(InMemoryBackend::new()));
    }
    let backend = RestBackend::new(settings).context("Failed to build backend client")?;
    tracing::info!("Backend client created.");
    Ok(Arc::new(backend))
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file first. Ignore errors (e.g., file not found)
    dotenv::dotenv().ok();

    // Initialize logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "motors_storefront=info,tower_http=info".into()))
        .with(fmt::layer())
        .init();

    tracing::info!("Initializing storefront server...");

    // Load configuration
    let settings = match Settings::new() {
        Ok(s) => {
            tracing::info!("Configuration loaded successfully.");
            s
        }
        Err(e) => {
            tracing::error!("Failed to load configuration: {}", e);
            return Err(e);
        }
    };
    if settings.payment_public_key.is_none() {
        tracing::warn!("Payment gateway public key not configured; online payment is disabled.");
    }
    let settings = Arc::new(settings);

    let backend = build_backend(&settings)?;
    let verifier: Option<Arc<dyn PaymentVerifier>> = if settings.verify_payments {
        tracing::info!("Server-side payment verification enabled.");
        Some(Arc::new(GatewayVerifier::new(&settings)?))
    } else {
        None
    };
    let app_state = AppState::new(settings.clone(), backend, Arc::new(ChatLinkMessenger), verifier);

    // Initial snapshot, then refetch on every change notification
    app_state.catalog.refresh().await;
    let _listener_task = app_state.catalog.clone().spawn_change_listener(&app_state.feed);

    let app: Router = routes::create_router(app_state).layer(TraceLayer::new_for_http());

    // Parse the server address from settings
    let addr: SocketAddr = settings
        .server_address
        .parse()
        .with_context(|| format!("Invalid server address format: {}", settings.server_address))?;

    let listener = match TcpListener::bind(&addr).await {
        Ok(l) => {
            tracing::info!("Server listening on {}", addr);
            l
        }
        Err(e) => {
            tracing::error!("Failed to bind to address {}: {}", addr, e);
            return Err(e.into());
        }
    };

    axum::serve(listener, app.into_make_service()).await?;

    Ok(())
}
