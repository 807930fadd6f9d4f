use crate::snapshot::Snapshot;
use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use std::collections::HashMap;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

/// Software version reported by `/version`.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub const VERSION_ENDPOINT: &str = "version";
pub const CURRENT_DATA_ENDPOINT: &str = "currentdata";

/// Builds the router with the endpoints that are switched on in
/// `webservices`. Returns `None` if nothing is enabled.
pub fn router(snapshot: Snapshot, webservices: &HashMap<String, bool>) -> Option<Router> {
    let mut router = Router::new();
    let mut enabled = 0;

    for (name, on) in webservices {
        if !on {
            continue;
        }
        router = match name.as_str() {
            VERSION_ENDPOINT => router.route("/version", get(http_get_version)),
            CURRENT_DATA_ENDPOINT => router.route("/currentdata", get(http_read_current_data)),
            unknown => {
                warn!("unknown webservice {unknown:?} ignored");
                continue;
            }
        };
        enabled += 1;
    }

    (enabled > 0).then(|| router.with_state(snapshot))
}

/// Serves `router` on `listener` until the task is dropped.
pub async fn serve(listener: TcpListener, router: Router) {
    match listener.local_addr() {
        Ok(addr) => info!("Starting webserver on {addr}"),
        Err(e) => warn!("webserver address unknown: {e}"),
    }
    if let Err(e) = axum::serve(listener, router).await {
        error!("webserver stopped: {e}");
    }
}

async fn http_get_version() -> &'static str {
    VERSION
}

/// Supplies the current wallbox measurement.
async fn http_read_current_data(State(snapshot): State<Snapshot>) -> Response {
    match serde_json::to_string_pretty(&snapshot.read()) {
        Ok(body) => ([(header::CONTENT_TYPE, "application/json")], body).into_response(),
        Err(e) => {
            error!("currentdata marshal: {e}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
