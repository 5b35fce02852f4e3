//! Axum server setup, shared application state, and graceful shutdown.
//!
//! Contains [`AppState`] (the `Arc`-shared state holding targets, HTTP
//! client, request buffer, drain controller, and counters),
//! [`build_router`] for constructing the Axum router with middleware
//! layers, [`build_http_client`] for the connection-pooled hyper client,
//! and [`shutdown_signal`] for SIGTERM / SIGHUP / Ctrl+C handling.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::Router;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use tower::ServiceBuilder;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

use crate::buffer::RequestBuffer;
use crate::drain::DrainController;
use crate::ids::IdGenerator;
use crate::proxy;
use crate::target::Target;

#[derive(Debug)]
pub struct Stats {
    pub broadcasts: AtomicU64,
    pub primary_relayed: AtomicU64,
    pub primary_failed: AtomicU64,
    pub secondary_failed: AtomicU64,
}

impl Default for Stats {
    fn default() -> Self {
        Self::new()
    }
}

impl Stats {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            broadcasts: AtomicU64::new(0),
            primary_relayed: AtomicU64::new(0),
            primary_failed: AtomicU64::new(0),
            secondary_failed: AtomicU64::new(0),
        }
    }

    pub fn log_summary(&self) {
        tracing::info!(
            broadcasts = self.broadcasts.load(Ordering::Relaxed),
            primary_relayed = self.primary_relayed.load(Ordering::Relaxed),
            primary_failed = self.primary_failed.load(Ordering::Relaxed),
            secondary_failed = self.secondary_failed.load(Ordering::Relaxed),
            "broadcast totals"
        );
    }
}

pub type HttpsConnector =
    hyper_rustls::HttpsConnector<hyper_util::client::legacy::connect::HttpConnector>;
pub type HttpClient = Client<HttpsConnector, Body>;

pub struct AppState {
    /// Ordered targets; index 0 is the primary.
    pub targets: Arc<[Target]>,
    pub http_client: HttpClient,
    pub buffer: RequestBuffer,
    pub drain: Arc<DrainController>,
    pub ids: Arc<dyn IdGenerator>,
    /// Per-delivery timeout.
    pub timeout: Duration,
    pub stats: Arc<Stats>,
}

#[must_use]
pub fn build_http_client() -> HttpClient {
    // When multiple rustls crypto providers are compiled in, rustls cannot
    // auto-detect which one to use. Explicitly install `ring`.
    let _ = rustls::crypto::ring::default_provider().install_default();

    let https = hyper_rustls::HttpsConnectorBuilder::new()
        .with_webpki_roots()
        .https_or_http()
        .enable_http1()
        .build();
    Client::builder(TokioExecutor::new())
        .pool_idle_timeout(Duration::from_secs(30))
        .build(https)
}

pub fn build_router(state: Arc<AppState>, max_body: Option<usize>) -> Router {
    Router::new()
        .fallback(proxy::broadcast_handler)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(RequestBodyLimitLayer::new(max_body.unwrap_or(usize::MAX))),
        )
        .with_state(state)
}

pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = wait_for_unix_signal(tokio::signal::unix::SignalKind::terminate(), "SIGTERM");
    #[cfg(unix)]
    let hangup = wait_for_unix_signal(tokio::signal::unix::SignalKind::hangup(), "SIGHUP");

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();
    #[cfg(not(unix))]
    let hangup = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => tracing::info!("received Ctrl+C"),
        () = terminate => tracing::info!("received SIGTERM"),
        () = hangup => tracing::info!("received SIGHUP"),
    }
}

#[cfg(unix)]
async fn wait_for_unix_signal(kind: tokio::signal::unix::SignalKind, name: &'static str) {
    match tokio::signal::unix::signal(kind) {
        Ok(mut signal) => {
            signal.recv().await;
        }
        Err(e) => {
            tracing::error!(error = %e, signal = name, "failed to install signal handler");
            std::future::pending::<()>().await;
        }
    }
}
