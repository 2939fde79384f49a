use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::Request;
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::Router;
use tower::ServiceBuilder;
use tracing::{info, warn};

use crate::routes;
use crate::state::AppState;

/// `WEBSERVICE_HTTPD_ERROR_LOG_INTERVAL` (spec §4.5/§6): how often the
/// accumulated 4xx/5xx counters get folded into a log entry.
const ERROR_LOG_INTERVAL: Duration = Duration::from_secs(60);

/// Atomic counters the error-count logging task drains periodically.
/// `qmc-iface`'s routes don't touch this directly — it is driven by a
/// `tower` middleware layer wrapping the whole router.
#[derive(Default)]
pub struct HttpErrorCounters {
    client_errors: AtomicU64,
    server_errors: AtomicU64,
}

impl HttpErrorCounters {
    pub fn record(&self, status: axum::http::StatusCode) {
        if status.is_client_error() {
            self.client_errors.fetch_add(1, Ordering::Relaxed);
        } else if status.is_server_error() {
            self.server_errors.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn take(&self) -> (u64, u64) {
        (self.client_errors.swap(0, Ordering::Relaxed), self.server_errors.swap(0, Ordering::Relaxed))
    }
}

async fn count_errors(
    axum::extract::State(counters): axum::extract::State<Arc<HttpErrorCounters>>,
    request: Request,
    next: Next,
) -> Response {
    let response = next.run(request).await;
    counters.record(response.status());
    response
}

/// Builds the full router (spec §6) by merging one sub-router per
/// resource, all sharing a single `AppState`.
pub fn build_router(state: AppState, counters: Arc<HttpErrorCounters>) -> Router {
    Router::new()
        .merge(routes::session::router())
        .merge(routes::users::router())
        .merge(routes::motors::router())
        .merge(routes::log::router())
        .merge(routes::system::router())
        .merge(routes::time::router())
        .merge(routes::motd::router())
        .merge(routes::reset::router())
        .merge(routes::settings::router())
        .merge(routes::fwupload::router())
        .layer(ServiceBuilder::new().layer(middleware::from_fn_with_state(counters, count_errors)))
        .with_state(state)
}

/// Runs the server until the process exits.
pub async fn serve(addr: SocketAddr, state: AppState, counters: Arc<HttpErrorCounters>) -> anyhow::Result<()> {
    let app = build_router(state, counters);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "qmc-iface listening");
    axum::serve(listener, app).await?;
    Ok(())
}

/// Periodic `ErrorCount` log entry task (spec §4.5): drains the 4xx/5xx
/// counters every `ERROR_LOG_INTERVAL` and only logs when something
/// actually happened.
pub async fn run_error_logging_task(counters: Arc<HttpErrorCounters>) {
    let mut interval = tokio::time::interval(ERROR_LOG_INTERVAL);
    loop {
        interval.tick().await;
        let (client, server) = counters.take();
        if client == 0 && server == 0 {
            continue;
        }
        warn!(client_errors = client, server_errors = server, "webservice error count");
    }
}
