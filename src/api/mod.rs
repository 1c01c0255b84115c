//! HTTP surface for the gateway.
//!
//! Three routes make up the public API: a liveness banner at `/`, a health
//! probe at `/health`, and the gated inference endpoint at `/predict`. When
//! metrics are enabled a Prometheus exposition endpoint is mounted at
//! `/metrics`, added after the metric layer so that scrapes don't count
//! themselves.

pub mod handlers;
pub mod models;

use axum::{
    Router,
    routing::{get, post},
};
use axum_prometheus::PrometheusMetricLayer;
use tower_http::trace::TraceLayer;

use crate::AppState;
use crate::storage::AccountStore;

/// Build the application router.
pub fn router<S>(state: AppState<S>, enable_metrics: bool) -> Router
where
    S: AccountStore + Clone + Send + Sync + 'static,
{
    let router = Router::new()
        .route("/", get(handlers::root))
        .route("/health", get(handlers::health))
        .route("/predict", post(handlers::predict::<S>))
        .with_state(state)
        .layer(TraceLayer::new_for_http());

    if enable_metrics {
        let (prometheus_layer, metric_handle) = PrometheusMetricLayer::pair();
        router
            .layer(prometheus_layer)
            .route("/metrics", get(move || async move { metric_handle.render() }))
    } else {
        router
    }
}
