use std::net::SocketAddr;
use std::sync::Arc;

use axum::{Router, routing::get};
use covidrecord_providers::{
    BlueButtonProvider, HealthProvider, InMemoryStateStore, LighthouseProvider, StateStore,
};
use tower_http::trace::TraceLayer;

use crate::config::{AppConfig, DemoConfig};
use crate::handlers;

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub bluebutton: Arc<dyn HealthProvider>,
    pub lighthouse: Arc<dyn HealthProvider>,
    pub states: Arc<dyn StateStore>,
    pub demo: Arc<DemoConfig>,
}

impl AppState {
    /// Builds both provider clients and an in-memory state store.
    pub fn from_config(cfg: &AppConfig) -> anyhow::Result<Self> {
        let bluebutton = BlueButtonProvider::new(
            cfg.bluebutton_config().map_err(anyhow::Error::msg)?,
        )?;
        let lighthouse = LighthouseProvider::new(
            cfg.lighthouse_config().map_err(anyhow::Error::msg)?,
        )?;

        Ok(Self {
            bluebutton: Arc::new(bluebutton),
            lighthouse: Arc::new(lighthouse),
            states: Arc::new(InMemoryStateStore::new(cfg.state.ttl)),
            demo: Arc::new(cfg.demo.clone()),
        })
    }
}

pub fn build_app(state: AppState) -> Router {
    Router::new()
        .route("/", get(handlers::index))
        .route("/healthz", get(handlers::healthz))
        .route("/login/{provider}", get(handlers::login))
        .route("/bbcallback", get(handlers::bluebutton_callback))
        .route("/callback", get(handlers::lighthouse_callback))
        .route("/showCallback", get(handlers::show_callback))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|req: &axum::http::Request<_>| {
                    // Query strings carry authorization codes; log the path only.
                    tracing::info_span!(
                        "http.request",
                        http.method = %req.method(),
                        http.target = %req.uri().path(),
                        http.status_code = tracing::field::Empty,
                    )
                })
                .on_response(
                    |res: &axum::http::Response<_>,
                     latency: std::time::Duration,
                     span: &tracing::Span| {
                        span.record(
                            "http.status_code",
                            tracing::field::display(res.status().as_u16()),
                        );
                        tracing::info!(
                            http.status = %res.status().as_u16(),
                            elapsed_ms = %latency.as_millis(),
                            "request handled"
                        );
                    },
                ),
        )
        .with_state(state)
}

pub struct CovidRecordServer {
    addr: SocketAddr,
    app: Router,
}

impl CovidRecordServer {
    pub fn new(cfg: &AppConfig, state: AppState) -> Self {
        Self {
            addr: cfg.addr(),
            app: build_app(state),
        }
    }

    pub async fn run(self) -> anyhow::Result<()> {
        let listener = tokio::net::TcpListener::bind(self.addr).await?;
        tracing::info!("listening on {}", self.addr);
        axum::serve(listener, self.app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;
        Ok(())
    }
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("shutdown signal received");
}
