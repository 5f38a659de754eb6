use std::net::SocketAddr;

use axum::{Json, Router, routing::get};
use eyre::Result;
use serde::{Deserialize, Serialize};
use tokio::{net::TcpListener, sync::watch};
use tracing::info;

use crate::shutdown::stopped;

/// Body of the `/health` endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Always `ok` while the process serves requests
    pub status: String,
}

/// Health check handler returning `{ "status": "ok" }`.
pub async fn handler() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok".to_owned() })
}

/// Create a router exposing the `/health` endpoint.
pub fn router() -> Router {
    Router::new().route("/health", get(handler))
}

/// Serve `/health` plus the routes of `app` on `addr` until `stop` is set.
pub async fn serve(addr: SocketAddr, app: Router, stop: watch::Receiver<bool>) -> Result<()> {
    let listener = TcpListener::bind(addr).await?;
    serve_listener(listener, app, stop).await
}

/// Like [`serve`], on an already bound listener.
pub async fn serve_listener(
    listener: TcpListener,
    app: Router,
    stop: watch::Receiver<bool>,
) -> Result<()> {
    info!(addr = %listener.local_addr()?, "Starting status server");
    let app = router().merge(app);
    axum::serve(listener, app.into_make_service()).with_graceful_shutdown(stopped(stop)).await?;
    info!("Status server stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::shutdown::stop_channel;

    #[tokio::test]
    async fn health_endpoint_reports_ok() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, rx) = stop_channel();
        let server = tokio::spawn(serve_listener(listener, Router::new(), rx));

        let body: HealthResponse = reqwest::get(format!("http://{addr}/health"))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(body, HealthResponse { status: "ok".to_owned() });

        tx.send_replace(true);
        server.await.unwrap().unwrap();
    }
}
