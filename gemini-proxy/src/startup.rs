//! Application startup and lifecycle management.

use crate::config::ProxyConfig;
use crate::handlers::app::{health_check, proxy_endpoint};
use crate::handlers::ProxyHandler;
use crate::services::providers::gemini::GeminiClient;
use crate::services::UpstreamClient;
use axum::{
    extract::DefaultBodyLimit,
    middleware::from_fn,
    routing::{any, get},
    Router,
};
use service_core::error::AppError;
use service_core::middleware::{request_id_middleware, REQUEST_ID_HEADER};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

/// Path the browser client posts prompts to.
pub const PROXY_PATH: &str = "/gemini-proxy";

/// Largest request body buffered for the proxy endpoint. Anything bigger is
/// answered as `PROMPT_TOO_LONG` without being read.
pub const MAX_BODY_BYTES: usize = 4 * 1024 * 1024;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub handler: ProxyHandler,
}

impl AppState {
    pub fn new(handler: ProxyHandler) -> Self {
        Self { handler }
    }

    /// Wire a handler to the real Gemini API from configuration.
    pub fn from_config(config: &ProxyConfig) -> Result<Self, AppError> {
        let client = GeminiClient::new(config.gemini.client_config())
            .map_err(|e| AppError::InternalError(anyhow::anyhow!("Failed to create HTTP client: {}", e)))?;
        let upstream: Arc<dyn UpstreamClient> = Arc::new(client);

        tracing::info!(
            model = %config.gemini.model,
            timeout_secs = config.gemini.timeout_secs,
            api_key_configured = config.gemini.api_key.is_some(),
            "Initialized Gemini client"
        );

        let handler = ProxyHandler::new(upstream, config.gemini.api_key.clone())
            .with_diagnostics(config.diagnostics_enabled());
        Ok(Self::new(handler))
    }
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route(PROXY_PATH, any(proxy_endpoint))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &axum::http::Request<_>| {
                let request_id = request
                    .headers()
                    .get(REQUEST_ID_HEADER)
                    .and_then(|value| value.to_str().ok())
                    .unwrap_or("-");

                tracing::info_span!(
                    "http_request",
                    request_id = %request_id,
                    method = %request.method(),
                    uri = %request.uri(),
                )
            }),
        )
        .layer(from_fn(request_id_middleware))
        .with_state(state)
}

/// Application container for managing server lifecycle.
pub struct Application {
    port: u16,
    listener: TcpListener,
    router: Router,
}

impl Application {
    /// Build against the real Gemini API.
    pub async fn build(config: ProxyConfig) -> Result<Self, AppError> {
        let state = AppState::from_config(&config)?;
        Self::build_with_state(&config, state).await
    }

    /// Build with a caller-supplied state (port 0 = random port for testing).
    pub async fn build_with_state(config: &ProxyConfig, state: AppState) -> Result<Self, AppError> {
        let address = config.common.address();
        let listener = TcpListener::bind(&address).await.map_err(|e| {
            tracing::error!("Failed to bind TCP listener to {}: {}", address, e);
            AppError::from(e)
        })?;
        let port = listener.local_addr()?.port();

        tracing::info!("gemini-proxy listening on port {}", port);

        Ok(Self {
            port,
            listener,
            router: build_router(state),
        })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Serve until a shutdown signal arrives.
    pub async fn run_until_stopped(self) -> std::io::Result<()> {
        axum::serve(self.listener, self.router)
            .with_graceful_shutdown(shutdown_signal())
            .await
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
