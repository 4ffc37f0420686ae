use crate::Metrics;
use anyhow::{Error as AnyhowError, Result};
use axum::{Router, routing::get, extract::State};
use std::future::Future;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use tracing::info;

#[derive(Clone, Debug)]
pub struct MetricsServerConfig {
    pub metrics_address: IpAddr,
    pub metrics_port: u16,
}

impl From<&MetricsServerConfig> for SocketAddr {
    fn from(config: &MetricsServerConfig) -> Self {
        SocketAddr::from((config.metrics_address, config.metrics_port))
    }
}

async fn prometheus_metrics_handler(State(metrics): State<Arc<Metrics>>) -> String {
    metrics.gather()
}

/// Liveness plus sync progress, for probes that do not scrape prometheus.
async fn health_handler(State(metrics): State<Arc<Metrics>>) -> String {
    let target = metrics
        .target_height()
        .map_or_else(|| "none".to_string(), |height| height.to_string());
    format!("ok current_height={} target_height={}", metrics.current_height(), target)
}

pub fn router(metrics: Arc<Metrics>) -> Router {
    Router::new()
        .route("/metrics", get(prometheus_metrics_handler))
        .route("/health", get(health_handler))
        .with_state(metrics)
}

/// Serve `/metrics` and `/health` until `shutdown` resolves.
pub async fn run_metrics_server<F>(config: MetricsServerConfig, metrics: Arc<Metrics>, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let addr = SocketAddr::from(&config);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(%addr, "Metrics server listening");

    axum::serve(listener, router(metrics).into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(AnyhowError::new)?;

    info!(%addr, "Metrics server stopped");
    Ok(())
}
