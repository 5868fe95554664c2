//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create the Axum Router with the `/config` handlers and the admin API
//! - Wire up middleware (request ID, tracing, timeout, body limits)
//! - Serve on a plain or TLS listener until shutdown

use arc_swap::ArcSwap;
use axum::{
    body::Body,
    extract::DefaultBodyLimit,
    http::{header, HeaderValue, Request},
    middleware::{self, Next},
    response::Response,
    routing::{get, post},
    Router,
};
use axum_server::tls_rustls::RustlsConfig;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower_http::{
    limit::RequestBodyLimitLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    set_header::SetResponseHeaderLayer,
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::admin::setup_admin_router;
use crate::commit::CommitEngine;
use crate::config::ServiceConfig;
use crate::http::handlers;
use crate::http::request::X_REQUEST_ID;
use crate::lifecycle::Shutdown;
use crate::observability::metrics;

/// How long in-flight requests get to finish once shutdown starts.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<CommitEngine>,
    /// Current settings; swapped on reload.
    pub settings: Arc<ArcSwap<ServiceConfig>>,
}

impl AppState {
    pub fn new(engine: Arc<CommitEngine>, settings: ServiceConfig) -> Self {
        Self {
            engine,
            settings: Arc::new(ArcSwap::from_pointee(settings)),
        }
    }
}

/// HTTP server for the configuration API.
pub struct HttpServer {
    router: Router,
}

impl HttpServer {
    pub fn new(state: AppState) -> Self {
        Self {
            router: build_router(state),
        }
    }

    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Run the server, accepting connections on the given listener.
    pub async fn run(self, listener: TcpListener, shutdown: Shutdown) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move {
                shutdown.wait().await;
                tracing::info!("Shutdown signal received");
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }

    /// Run the server over TLS on `addr`.
    pub async fn run_tls(
        self,
        addr: SocketAddr,
        tls: RustlsConfig,
        shutdown: Shutdown,
    ) -> Result<(), std::io::Error> {
        let handle = axum_server::Handle::new();
        {
            let handle = handle.clone();
            tokio::spawn(async move {
                shutdown.wait().await;
                tracing::info!("Shutdown signal received");
                handle.graceful_shutdown(Some(DRAIN_TIMEOUT));
            });
        }

        tracing::info!(address = %addr, "HTTPS server starting");
        axum_server::bind_rustls(addr, tls)
            .handle(handle)
            .serve(self.router.into_make_service())
            .await?;

        tracing::info!("HTTPS server stopped");
        Ok(())
    }
}

/// Build the Axum router with all middleware layers.
///
/// Timeout and body limit are read once; changing them needs a restart.
#[allow(deprecated)]
pub fn build_router(state: AppState) -> Router {
    let settings = state.settings.load_full();

    let config_routes = Router::new()
        .route(
            "/config",
            get(handlers::get_config)
                .post(handlers::set_value)
                .delete(handlers::delete_value),
        )
        .route("/config/generate", post(handlers::generate))
        .route("/config/validate", post(handlers::validate))
        .route("/config/apply", post(handlers::apply))
        .route("/config/commit", post(handlers::commit))
        .route("/config/discard", post(handlers::discard))
        .route("/config/history", get(handlers::history))
        .route("/config/history/{version}", get(handlers::history_entry))
        .route("/config/diff", post(handlers::diff))
        .route("/config/rollback", post(handlers::rollback))
        .route("/config/export", get(handlers::export_config))
        .route("/config/import", post(handlers::import_config))
        .route("/config/search", post(handlers::search))
        .route("/config/bulk", post(handlers::bulk))
        .route("/config/stats", get(handlers::get_stats))
        .with_state(state.clone());

    let router = if settings.admin.enabled {
        config_routes.merge(setup_admin_router(state))
    } else {
        config_routes
    };

    router
        .layer(middleware::from_fn(track_requests))
        .layer(PropagateRequestIdLayer::new(X_REQUEST_ID))
        .layer(SetResponseHeaderLayer::if_not_present(
            header::CACHE_CONTROL,
            HeaderValue::from_static("no-store"),
        ))
        .layer(DefaultBodyLimit::max(settings.engine.max_body_bytes))
        .layer(RequestBodyLimitLayer::new(settings.engine.max_body_bytes))
        .layer(TimeoutLayer::new(Duration::from_secs(
            settings.engine.request_timeout_secs,
        )))
        .layer(TraceLayer::new_for_http().make_span_with(|request: &Request<Body>| {
            let request_id = request
                .headers()
                .get(&X_REQUEST_ID)
                .and_then(|v| v.to_str().ok())
                .unwrap_or("unknown");
            tracing::info_span!(
                "request",
                method = %request.method(),
                path = %request.uri().path(),
                request_id = %request_id,
            )
        }))
        .layer(SetRequestIdLayer::new(X_REQUEST_ID, MakeRequestUuid))
}

async fn track_requests(request: Request<Body>, next: Next) -> Response {
    let method = request.method().clone();
    let response = next.run(request).await;
    metrics::record_request(method.as_str(), response.status().as_u16());
    response
}
