use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use eyre::Result;
use health::HealthRegistry;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use crate::credentials::CredentialStore;

/// What the status endpoints look at.
#[derive(Clone)]
pub struct ServerState {
    pub liveness: HealthRegistry,
    pub store: CredentialStore,
}

pub async fn listen(app: Router, bind: String) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(bind).await?;

    axum::serve(listener, app).await?;

    Ok(())
}

async fn index() -> &'static str {
    "roster import"
}

async fn liveness(State(state): State<ServerState>) -> Response {
    state.liveness.get_status().into_response()
}

// Ready once a service token has been published.
async fn readiness(State(state): State<ServerState>) -> Response {
    match state.store.has_token() {
        true => (StatusCode::OK, "token published").into_response(),
        false => (StatusCode::INTERNAL_SERVER_ERROR, "no token yet").into_response(),
    }
}

/// Installs the global Prometheus recorder. Call once per process.
pub fn setup_metrics_recorder() -> Result<PrometheusHandle> {
    const BUCKETS: &[f64] = &[
        1.0, 5.0, 10.0, 50.0, 100.0, 250.0, 500.0, 1000.0, 2000.0, 5000.0, 10000.0, 30000.0,
    ];

    let handle = PrometheusBuilder::new()
        .set_buckets(BUCKETS)?
        .install_recorder()?;
    Ok(handle)
}

pub fn app(state: ServerState, metrics: Option<PrometheusHandle>) -> Router {
    let router = Router::new()
        .route("/", get(index))
        .route("/_readiness", get(readiness))
        .route("/_liveness", get(liveness))
        .with_state(state);

    // The recorder is global, tests leave it out
    match metrics {
        Some(handle) => router.route(
            "/metrics",
            get(move || std::future::ready(handle.render())),
        ),
        None => router,
    }
}
